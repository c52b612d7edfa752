//! SAI buffer API surface: pools, profiles and ingress priority groups.

use crate::error::SaiResult;
use crate::types::{BufferPoolOid, BufferProfileOid, IngressPriorityGroupOid};

/// Direction a buffer pool serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferPoolType {
    Ingress,
    Egress,
}

/// Pool threshold mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThresholdMode {
    #[default]
    Dynamic,
    Static,
}

/// Buffer pool creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferPoolConfig {
    pub pool_type: BufferPoolType,
    /// Pool size in bytes.
    pub size: u64,
    pub threshold_mode: ThresholdMode,
}

/// Buffer profile creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferProfileConfig {
    pub pool: BufferPoolOid,
    pub threshold_mode: ThresholdMode,
    /// Reserved buffer size in bytes.
    pub reserved_size: u64,
    /// Dynamic threshold exponent (SAI_BUFFER_PROFILE_ATTR_SHARED_DYNAMIC_TH).
    pub shared_dynamic_th: i8,
}

/// Buffer object management.
pub trait BufferApi: Send + Sync {
    fn create_buffer_pool(&self, config: &BufferPoolConfig) -> SaiResult<BufferPoolOid>;

    fn remove_buffer_pool(&self, pool: BufferPoolOid) -> SaiResult<()>;

    fn create_buffer_profile(&self, config: &BufferProfileConfig) -> SaiResult<BufferProfileOid>;

    fn remove_buffer_profile(&self, profile: BufferProfileOid) -> SaiResult<()>;

    /// Reads SAI_INGRESS_PRIORITY_GROUP_ATTR_BUFFER_PROFILE.
    fn get_pg_buffer_profile(&self, pg: IngressPriorityGroupOid) -> SaiResult<BufferProfileOid>;

    /// Writes SAI_INGRESS_PRIORITY_GROUP_ATTR_BUFFER_PROFILE.
    fn set_pg_buffer_profile(
        &self,
        pg: IngressPriorityGroupOid,
        profile: BufferProfileOid,
    ) -> SaiResult<()>;
}
