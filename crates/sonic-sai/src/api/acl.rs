//! SAI ACL API surface.

use crate::error::SaiResult;
use crate::types::{AclEntryOid, AclTableOid, PortOid};

/// Pipeline stage an ACL table is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclStage {
    Ingress,
    Egress,
}

impl AclStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AclStage::Ingress => "ingress",
            AclStage::Egress => "egress",
        }
    }
}

/// Packet action of an ACL entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AclPacketAction {
    Drop,
    Forward,
}

/// ACL table creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclTableConfig {
    pub name: String,
    pub stage: AclStage,
    /// Ports the table is bound to at creation.
    pub ports: Vec<PortOid>,
}

/// ACL entry (rule) creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntryConfig {
    pub table: AclTableOid,
    pub name: String,
    pub priority: u32,
    /// Matches SAI_ACL_ENTRY_ATTR_FIELD_TC.
    pub match_tc: u8,
    pub action: AclPacketAction,
}

/// ACL object management.
pub trait AclApi: Send + Sync {
    fn create_acl_table(&self, config: &AclTableConfig) -> SaiResult<AclTableOid>;

    fn remove_acl_table(&self, table: AclTableOid) -> SaiResult<()>;

    fn create_acl_entry(&self, config: &AclEntryConfig) -> SaiResult<AclEntryOid>;

    fn remove_acl_entry(&self, entry: AclEntryOid) -> SaiResult<()>;

    /// Binds an existing table to one more port.
    fn bind_acl_table(&self, table: AclTableOid, port: PortOid) -> SaiResult<()>;

    fn unbind_acl_table(&self, table: AclTableOid, port: PortOid) -> SaiResult<()>;
}
