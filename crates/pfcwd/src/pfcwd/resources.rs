//! Hardware objects shared by every stormed queue.
//!
//! [`AclTableRegistry`] holds one ingress and one egress drop table per
//! traffic class; a table is created with its rule by the first port that
//! needs it and later ports only bind to it. [`ZeroBufferProfiles`] holds
//! the lazily created zero-size pool and profile per direction.
//!
//! Both registries are plain values owned by the watchdog engine and are
//! mutated only from its event loop.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use sonic_sai::{
    AclApi, AclEntryConfig, AclEntryOid, AclPacketAction, AclStage, AclTableConfig, AclTableOid,
    BufferApi, BufferPoolConfig, BufferPoolOid, BufferPoolType, BufferProfileConfig,
    BufferProfileOid, PortOid, SaiResult, ThresholdMode,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

/// Priority of the per-traffic-class drop rule.
pub const ACL_RULE_PRIORITY: u32 = 999;

pub fn acl_table_name(stage: AclStage, tc: u8) -> String {
    match stage {
        AclStage::Ingress => format!("IngressTable_PfcWdAclHandler_{}", tc),
        AclStage::Egress => format!("EgressTable_PfcWdAclHandler_{}", tc),
    }
}

pub fn acl_rule_name(tc: u8) -> String {
    format!("Rule_PfcWdAclHandler_{}", tc)
}

/// One shared drop table and the ports currently bound to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedAclTable {
    pub name: String,
    pub stage: AclStage,
    pub tc: u8,
    pub table_id: AclTableOid,
    pub rule_id: AclEntryOid,
    pub bound_ports: BTreeSet<PortOid>,
}

/// Drop tables keyed by synthesized name, one per (traffic class, stage).
#[derive(Debug, Default)]
pub struct AclTableRegistry {
    tables: BTreeMap<String, SharedAclTable>,
}

impl AclTableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes sure `port` drops traffic class `tc` at `stage`.
    ///
    /// Creates the table (bound to `port`) and its rule on first use,
    /// otherwise binds `port` to the existing table. Binding a port that is
    /// already bound does nothing.
    pub fn acquire<S: AclApi + ?Sized>(
        &mut self,
        sai: &S,
        tc: u8,
        stage: AclStage,
        port: PortOid,
    ) -> SaiResult<()> {
        let name = acl_table_name(stage, tc);

        if let Some(table) = self.tables.get_mut(&name) {
            if table.bound_ports.contains(&port) {
                debug!(table = %name, port = %port, "Port already bound to PFC watchdog ACL table");
                return Ok(());
            }
            sai.bind_acl_table(table.table_id, port)?;
            table.bound_ports.insert(port);
            debug!(table = %name, port = %port, "Bound port to PFC watchdog ACL table");
            return Ok(());
        }

        let table_id = sai.create_acl_table(&AclTableConfig {
            name: name.clone(),
            stage,
            ports: vec![port],
        })?;

        let rule_name = acl_rule_name(tc);
        let rule_id = match sai.create_acl_entry(&AclEntryConfig {
            table: table_id,
            name: rule_name.clone(),
            priority: ACL_RULE_PRIORITY,
            match_tc: tc,
            action: AclPacketAction::Drop,
        }) {
            Ok(id) => id,
            Err(e) => {
                if let Err(remove_err) = sai.remove_acl_table(table_id) {
                    error!(table = %name, error = %remove_err, "Failed to remove ACL table after rule failure");
                }
                return Err(e);
            }
        };

        info!(table = %name, rule = %rule_name, tc, "Created PFC watchdog ACL table");
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "PfcWdAclRegistry",
            "create_acl_table"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(name.clone())
        .with_object_type("acl_table")
        .with_details(serde_json::json!({
            "stage": stage.as_str(),
            "tc": tc,
            "rule": rule_name,
            "priority": ACL_RULE_PRIORITY,
        })));

        self.tables.insert(
            name.clone(),
            SharedAclTable {
                name,
                stage,
                tc,
                table_id,
                rule_id,
                bound_ports: BTreeSet::from([port]),
            },
        );
        Ok(())
    }

    /// Unbinds `port`. The table and rule stay for other ports.
    pub fn release<S: AclApi + ?Sized>(
        &mut self,
        sai: &S,
        tc: u8,
        stage: AclStage,
        port: PortOid,
    ) -> SaiResult<()> {
        let name = acl_table_name(stage, tc);
        let Some(table) = self.tables.get_mut(&name) else {
            debug!(table = %name, "No PFC watchdog ACL table to unbind from");
            return Ok(());
        };
        if !table.bound_ports.contains(&port) {
            return Ok(());
        }

        sai.unbind_acl_table(table.table_id, port)?;
        table.bound_ports.remove(&port);
        debug!(table = %name, port = %port, "Unbound port from PFC watchdog ACL table");
        Ok(())
    }

    /// Removes every rule and table. Failures are logged and the entry is
    /// forgotten anyway.
    pub fn clear<S: AclApi + ?Sized>(&mut self, sai: &S) {
        for (name, table) in std::mem::take(&mut self.tables) {
            for port in &table.bound_ports {
                if let Err(e) = sai.unbind_acl_table(table.table_id, *port) {
                    error!(table = %name, port = %port, error = %e, "Failed to unbind ACL table");
                }
            }
            if let Err(e) = sai.remove_acl_entry(table.rule_id) {
                error!(table = %name, error = %e, "Failed to remove ACL rule");
            }
            let record = AuditRecord::new(
                AuditCategory::ResourceDelete,
                "PfcWdAclRegistry",
                "remove_acl_table",
            )
            .with_object_id(name.clone())
            .with_object_type("acl_table");
            match sai.remove_acl_table(table.table_id) {
                Ok(()) => {
                    audit_log!(record.with_outcome(AuditOutcome::Success));
                }
                Err(e) => {
                    error!(table = %name, error = %e, "Failed to remove ACL table");
                    audit_log!(record
                        .with_details(serde_json::json!({ "status": e.status_name() }))
                        .with_error(e.to_string()));
                }
            }
        }
    }

    pub fn contains(&self, tc: u8, stage: AclStage) -> bool {
        self.tables.contains_key(&acl_table_name(stage, tc))
    }

    pub fn get(&self, tc: u8, stage: AclStage) -> Option<&SharedAclTable> {
        self.tables.get(&acl_table_name(stage, tc))
    }

    pub fn bound_ports(&self, tc: u8, stage: AclStage) -> Option<&BTreeSet<PortOid>> {
        self.get(tc, stage).map(|t| &t.bound_ports)
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }
}

/// A zero-size pool and the profile carved from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZeroBuffer {
    pub pool: BufferPoolOid,
    pub profile: BufferProfileOid,
}

/// Zero buffer profiles, one per direction, created on first use.
#[derive(Debug, Default)]
pub struct ZeroBufferProfiles {
    ingress: Option<ZeroBuffer>,
    egress: Option<ZeroBuffer>,
}

impl ZeroBufferProfiles {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, direction: BufferPoolType) -> &mut Option<ZeroBuffer> {
        match direction {
            BufferPoolType::Ingress => &mut self.ingress,
            BufferPoolType::Egress => &mut self.egress,
        }
    }

    /// Returns the zero profile of a direction, creating pool and profile
    /// if they do not exist yet.
    pub fn get_or_create<S: BufferApi + ?Sized>(
        &mut self,
        sai: &S,
        direction: BufferPoolType,
    ) -> SaiResult<BufferProfileOid> {
        if let Some(zero) = self.get(direction) {
            return Ok(zero.profile);
        }

        let pool = sai.create_buffer_pool(&BufferPoolConfig {
            pool_type: direction,
            size: 0,
            threshold_mode: ThresholdMode::Dynamic,
        })?;

        let profile = match sai.create_buffer_profile(&BufferProfileConfig {
            pool,
            threshold_mode: ThresholdMode::Dynamic,
            reserved_size: 0,
            shared_dynamic_th: 1,
        }) {
            Ok(profile) => profile,
            Err(e) => {
                if let Err(remove_err) = sai.remove_buffer_pool(pool) {
                    error!(pool = %pool, error = %remove_err, "Failed to remove zero buffer pool");
                }
                return Err(e);
            }
        };

        info!(direction = direction_name(direction), profile = %profile, "Created zero buffer profile");
        audit_log!(AuditRecord::new(
            AuditCategory::ResourceCreate,
            "PfcWdZeroBuffer",
            "create_zero_buffer_profile"
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(profile.to_sai_string())
        .with_object_type("buffer_profile")
        .with_details(serde_json::json!({
            "direction": direction_name(direction),
            "pool": pool.to_sai_string(),
            "size": 0,
        })));

        *self.slot(direction) = Some(ZeroBuffer { pool, profile });
        Ok(profile)
    }

    pub fn get(&self, direction: BufferPoolType) -> Option<ZeroBuffer> {
        match direction {
            BufferPoolType::Ingress => self.ingress,
            BufferPoolType::Egress => self.egress,
        }
    }

    /// Removes both profiles and then their pools.
    pub fn destroy_all<S: BufferApi + ?Sized>(&mut self, sai: &S) {
        for direction in [BufferPoolType::Ingress, BufferPoolType::Egress] {
            let Some(zero) = self.slot(direction).take() else {
                continue;
            };

            let record = AuditRecord::new(
                AuditCategory::ResourceDelete,
                "PfcWdZeroBuffer",
                "remove_zero_buffer_profile",
            )
            .with_object_id(zero.profile.to_sai_string())
            .with_object_type("buffer_profile");

            if let Err(e) = sai.remove_buffer_profile(zero.profile) {
                error!(direction = direction_name(direction), error = %e, "Failed to remove zero buffer profile");
                audit_log!(record.with_error(e.to_string()));
                continue;
            }
            if let Err(e) = sai.remove_buffer_pool(zero.pool) {
                error!(direction = direction_name(direction), error = %e, "Failed to remove zero buffer pool");
                audit_log!(record.with_error(e.to_string()));
                continue;
            }
            audit_log!(record.with_outcome(AuditOutcome::Success));
        }
    }
}

fn direction_name(direction: BufferPoolType) -> &'static str {
    match direction {
        BufferPoolType::Ingress => "ingress",
        BufferPoolType::Egress => "egress",
    }
}

/// Everything shared between handlers.
#[derive(Debug, Default)]
pub struct PfcWdResources {
    pub acl: AclTableRegistry,
    pub zero_buffer: ZeroBufferProfiles,
}

impl PfcWdResources {
    pub fn new() -> Self {
        Self::default()
    }
}
