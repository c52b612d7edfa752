//! PFC Watchdog orchestration logic.

use super::engine::{EngineProfile, NotificationOutcome, PfcWdEngine};
use super::types::{PfcWdConfig, PfcWdError, PFC_WD_TC_MAX};
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use crate::ports::PortInventory;
use async_trait::async_trait;
use sonic_orch_common::{
    Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Notification, Operation, Orch, Table,
};
use sonic_sai::{PortStat, QueueAttr, QueueStat, SwitchApi};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// CONFIG_DB table holding per-port watchdog configuration.
pub const PFC_WD_TABLE: &str = "PFC_WD";
/// PFC_WD_DB table polled by the detector.
pub const PFC_WD_STATE_TABLE: &str = "PFC_WD_STATE_TABLE";
pub const COUNTERS_TABLE: &str = "COUNTERS";
/// COUNTERS_DB channel the detector reports on.
pub const PFC_WD_NOTIFICATION_CHANNEL: &str = "PFC_WD";

const PFC_WD_ORCH_PRIORITY: i32 = 40;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PfcWdOrchConfig {
    /// Detector polling interval; part of every metadata key.
    pub poll_interval_ms: u32,
    pub profile: EngineProfile,
    pub port_stat_ids: Vec<PortStat>,
    pub queue_stat_ids: Vec<QueueStat>,
    pub queue_attr_ids: Vec<QueueAttr>,
}

impl Default for PfcWdOrchConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            profile: EngineProfile::default(),
            port_stat_ids: (0..PFC_WD_TC_MAX).map(PortStat::PfcRxPkts).collect(),
            queue_stat_ids: vec![
                QueueStat::Packets,
                QueueStat::DroppedPackets,
                QueueStat::CurrOccupancyBytes,
            ],
            queue_attr_ids: vec![QueueAttr::PauseStatus],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PfcWdOrchStats {
    pub configs_applied: u64,
    pub configs_rejected: u64,
    pub ports_unregistered: u64,
    pub storms_detected: u64,
    pub storms_restored: u64,
    pub notifications_ignored: u64,
}

/// Applies `PFC_WD` configuration and detector notifications.
pub struct PfcWdOrch {
    consumer: Consumer,
    inventory: Arc<dyn PortInventory>,
    engine: PfcWdEngine,
    stats: PfcWdOrchStats,
}

impl PfcWdOrch {
    pub fn new(
        config: PfcWdOrchConfig,
        sai: Arc<dyn SwitchApi>,
        inventory: Arc<dyn PortInventory>,
        counters: Arc<dyn Table>,
        metadata: Arc<dyn Table>,
    ) -> Self {
        info!(
            profile = %config.profile,
            poll_interval_ms = config.poll_interval_ms,
            "Creating PfcWdOrch"
        );
        Self {
            consumer: Consumer::new(
                ConsumerConfig::new(PFC_WD_TABLE).with_priority(PFC_WD_ORCH_PRIORITY),
            ),
            inventory,
            engine: PfcWdEngine::new(config, sai, counters, metadata),
            stats: PfcWdOrchStats::default(),
        }
    }

    pub fn engine(&self) -> &PfcWdEngine {
        &self.engine
    }

    pub fn stats(&self) -> &PfcWdOrchStats {
        &self.stats
    }

    /// Applies a SET record for a port. Nothing changes unless every field
    /// is valid and the port is a physical port. Returns the number of
    /// monitored queues.
    pub fn configure(&mut self, key: &str, fvs: &[FieldValue]) -> Result<usize, PfcWdError> {
        let result = self.try_configure(key, fvs);

        let record = AuditRecord::new(
            AuditCategory::ConfigurationChange,
            "PfcWdOrch",
            "configure_port",
        )
        .with_object_id(key)
        .with_object_type("port");
        match &result {
            Ok(queues) => {
                self.stats.configs_applied += 1;
                audit_log!(record
                    .with_outcome(AuditOutcome::Success)
                    .with_details(serde_json::json!({ "queues": queues })));
            }
            Err(e) => {
                self.stats.configs_rejected += 1;
                error!(port = %key, error = %e, "Rejected PFC watchdog configuration");
                audit_log!(record.with_error(e.to_string()));
            }
        }
        result
    }

    fn try_configure(&mut self, key: &str, fvs: &[FieldValue]) -> Result<usize, PfcWdError> {
        let port = self
            .inventory
            .get_port(key)
            .ok_or_else(|| PfcWdError::PortNotFound(key.to_string()))?;
        if !port.is_physical() {
            return Err(PfcWdError::NotPhysicalPort(key.to_string()));
        }

        let config = PfcWdConfig::from_fields(fvs).map_err(|source| PfcWdError::InvalidConfig {
            port: key.to_string(),
            source,
        })?;

        self.engine.register_port(&port, &config)
    }

    /// Applies a DEL record for a port.
    pub fn unconfigure(&mut self, key: &str) -> Result<usize, PfcWdError> {
        match self.engine.unregister_port(key) {
            Ok(queues) => {
                self.stats.ports_unregistered += 1;
                audit_log!(AuditRecord::new(
                    AuditCategory::ConfigurationChange,
                    "PfcWdOrch",
                    "unconfigure_port"
                )
                .with_outcome(AuditOutcome::Success)
                .with_object_id(key)
                .with_object_type("port")
                .with_details(serde_json::json!({ "queues": queues })));
                Ok(queues)
            }
            Err(e) => {
                warn!(port = %key, error = %e, "Failed to stop PFC watchdog");
                Err(e)
            }
        }
    }

    /// Applies a detector notification.
    pub fn handle_notification(&mut self, notification: &Notification) -> NotificationOutcome {
        let outcome = self.engine.handle_notification(notification);
        match outcome {
            NotificationOutcome::StormStarted(_) => self.stats.storms_detected += 1,
            NotificationOutcome::Restored => self.stats.storms_restored += 1,
            _ => self.stats.notifications_ignored += 1,
        }
        outcome
    }

    fn process(&mut self, entry: KeyOpFieldsValues) {
        match entry.op {
            // Failures are already logged and audited by configure/unconfigure.
            Operation::Set => match self.configure(&entry.key, &entry.fvs) {
                Ok(queues) => debug!(port = %entry.key, queues, "Applied PFC_WD SET"),
                Err(_) => {}
            },
            Operation::Del => match self.unconfigure(&entry.key) {
                Ok(queues) => debug!(port = %entry.key, queues, "Applied PFC_WD DEL"),
                Err(_) => {}
            },
        }
    }
}

#[async_trait]
impl Orch for PfcWdOrch {
    fn name(&self) -> &str {
        "PfcWdOrch"
    }

    async fn do_task(&mut self) {
        if !self.inventory.is_init_done() {
            debug!(
                pending = self.consumer.pending_count(),
                "Ports not ready, deferring PFC watchdog configuration"
            );
            return;
        }
        for entry in self.consumer.drain() {
            self.process(entry);
        }
    }

    fn priority(&self) -> i32 {
        self.consumer.priority()
    }

    fn add_to_sync(&mut self, table: &str, entries: Vec<KeyOpFieldsValues>) {
        if table == self.consumer.table_name() {
            self.consumer.add_to_sync(entries);
        }
    }

    fn has_pending_tasks(&self) -> bool {
        self.consumer.has_pending()
    }

    fn dump_pending_tasks(&self) -> Vec<String> {
        self.consumer.dump()
    }

    fn on_notification(&mut self, channel: &str, notification: &Notification) {
        if channel == PFC_WD_NOTIFICATION_CHANNEL {
            self.handle_notification(notification);
        }
    }

    async fn shutdown(&mut self) {
        info!(
            stormed = self.engine.stormed_count(),
            "Shutting down PfcWdOrch"
        );
        self.engine.shutdown();
    }
}
