//! OrchDaemon implementation.
//!
//! The OrchDaemon owns every registered Orch and runs the single event
//! loop that feeds them. Table records and notifications arrive on one
//! channel from the subscribers; after each event, and on every heartbeat,
//! Orchs with pending work get a `do_task()` call in priority order.
//! Because everything runs on this one loop, a notification never
//! interleaves with configuration processing.

use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use sonic_orch_common::redis_backend::RedisEvent;
use sonic_orch_common::{KeyOpFieldsValues, Notification, Orch};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Configuration for the OrchDaemon.
#[derive(Debug, Clone)]
pub struct OrchDaemonConfig {
    /// Heartbeat interval in milliseconds; deferred work is retried on each tick
    pub heartbeat_interval_ms: u64,
    /// Capacity of the event channel
    pub channel_capacity: usize,
}

impl Default for OrchDaemonConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            channel_capacity: 1024,
        }
    }
}

/// Input to the event loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonEvent {
    Table {
        table: String,
        entries: Vec<KeyOpFieldsValues>,
    },
    Notification {
        channel: String,
        notification: Notification,
    },
    /// Stop the loop and shut every Orch down.
    Shutdown,
}

impl From<RedisEvent> for DaemonEvent {
    fn from(event: RedisEvent) -> Self {
        match event {
            RedisEvent::Table { table, entries } => DaemonEvent::Table { table, entries },
            RedisEvent::Notification {
                channel,
                notification,
            } => DaemonEvent::Notification {
                channel,
                notification,
            },
        }
    }
}

/// The main orchestration daemon.
pub struct OrchDaemon {
    config: OrchDaemonConfig,
    /// Registered Orchs sorted by priority
    orchs: BTreeMap<i32, Vec<Box<dyn Orch>>>,
    rx: mpsc::Receiver<DaemonEvent>,
    events_processed: u64,
}

impl OrchDaemon {
    pub fn new(config: OrchDaemonConfig, rx: mpsc::Receiver<DaemonEvent>) -> Self {
        Self {
            config,
            orchs: BTreeMap::new(),
            rx,
            events_processed: 0,
        }
    }

    /// Registers an Orch with the daemon.
    ///
    /// Orchs are ordered by priority (lower = higher priority).
    pub fn register_orch(&mut self, orch: Box<dyn Orch>) {
        let priority = orch.priority();
        let orch_name = orch.name().to_string();
        info!("Registering {} with priority {}", orch_name, priority);

        let record = AuditRecord::new(
            AuditCategory::ResourceCreate,
            "OrchDaemon",
            format!("register_orch: {}", orch_name),
        )
        .with_outcome(AuditOutcome::Success)
        .with_object_id(&orch_name)
        .with_object_type("orch_module")
        .with_details(serde_json::json!({
            "priority": priority,
        }));
        audit_log!(record);

        self.orchs.entry(priority).or_default().push(orch);
    }

    pub fn orch_count(&self) -> usize {
        self.orchs.values().map(Vec::len).sum()
    }

    pub fn events_processed(&self) -> u64 {
        self.events_processed
    }

    /// Runs the event loop until a [`DaemonEvent::Shutdown`] arrives or
    /// every sender is gone, then shuts all Orchs down.
    pub async fn run(&mut self) {
        info!("Starting OrchDaemon event loop");

        let record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "OrchDaemon",
            "event_loop_started",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "heartbeat_interval_ms": self.config.heartbeat_interval_ms,
            "orch_count": self.orch_count(),
        }));
        audit_log!(record);

        let mut heartbeat =
            tokio::time::interval(Duration::from_millis(self.config.heartbeat_interval_ms.max(1)));
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let received = tokio::select! {
                event = self.rx.recv() => Some(event),
                _ = heartbeat.tick() => None,
            };

            match received {
                Some(Some(DaemonEvent::Shutdown)) => {
                    info!("Shutdown requested");
                    break;
                }
                Some(Some(event)) => {
                    self.events_processed += 1;
                    self.dispatch(event);
                }
                Some(None) => {
                    info!("Event channel closed");
                    break;
                }
                None => {}
            }

            self.do_tasks().await;
        }

        self.shutdown().await;

        let stop_record = AuditRecord::new(
            AuditCategory::SystemLifecycle,
            "OrchDaemon",
            "event_loop_stopped",
        )
        .with_outcome(AuditOutcome::Success)
        .with_details(serde_json::json!({
            "events_processed": self.events_processed,
        }));
        audit_log!(stop_record);
    }

    fn dispatch(&mut self, event: DaemonEvent) {
        match event {
            DaemonEvent::Table { table, entries } => {
                debug!("Dispatching {} records from {}", entries.len(), table);
                for orch in self.orchs.values_mut().flatten() {
                    orch.add_to_sync(&table, entries.clone());
                }
            }
            DaemonEvent::Notification {
                channel,
                notification,
            } => {
                debug!("Dispatching notification {} on {}", notification.op, channel);
                for orch in self.orchs.values_mut().flatten() {
                    orch.on_notification(&channel, &notification);
                }
            }
            DaemonEvent::Shutdown => {}
        }
    }

    /// Gives every Orch with pending work one `do_task()` call, in priority order.
    pub async fn do_tasks(&mut self) {
        for orch in self.orchs.values_mut().flatten() {
            if orch.has_pending_tasks() {
                debug!("Processing tasks for {}", orch.name());
                orch.do_task().await;
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down {} orchs", self.orch_count());
        for orch in self.orchs.values_mut().flatten() {
            orch.shutdown().await;
        }
    }

    /// Pending work of every Orch, one line per record.
    pub fn dump(&self) -> Vec<String> {
        let mut lines = Vec::new();
        for orch in self.orchs.values().flatten() {
            for task in orch.dump_pending_tasks() {
                lines.push(format!("{}: {}", orch.name(), task));
            }
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    struct RecordingOrch {
        name: String,
        priority: i32,
        table: String,
        pending: Vec<KeyOpFieldsValues>,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingOrch {
        fn new(name: &str, priority: i32, table: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                priority,
                table: table.to_string(),
                pending: Vec::new(),
                log: log.clone(),
            }
        }

        fn record(&self, line: String) {
            self.log.lock().unwrap().push(line);
        }
    }

    #[async_trait]
    impl Orch for RecordingOrch {
        fn name(&self) -> &str {
            &self.name
        }

        async fn do_task(&mut self) {
            for entry in std::mem::take(&mut self.pending) {
                self.record(format!("{} task {}", self.name, entry.key));
            }
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn add_to_sync(&mut self, table: &str, entries: Vec<KeyOpFieldsValues>) {
            if table == self.table {
                self.pending.extend(entries);
            }
        }

        fn has_pending_tasks(&self) -> bool {
            !self.pending.is_empty()
        }

        fn dump_pending_tasks(&self) -> Vec<String> {
            self.pending.iter().map(|e| e.key.clone()).collect()
        }

        fn on_notification(&mut self, channel: &str, notification: &Notification) {
            self.record(format!("{} notify {} {}", self.name, channel, notification.op));
        }

        async fn shutdown(&mut self) {
            self.record(format!("{} shutdown", self.name));
        }
    }

    fn daemon() -> (mpsc::Sender<DaemonEvent>, OrchDaemon) {
        let config = OrchDaemonConfig {
            heartbeat_interval_ms: 10,
            ..Default::default()
        };
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        (tx, OrchDaemon::new(config, rx))
    }

    #[tokio::test]
    async fn test_events_dispatched_in_order_then_shutdown() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut daemon) = daemon();
        daemon.register_orch(Box::new(RecordingOrch::new("late", 50, "B", &log)));
        daemon.register_orch(Box::new(RecordingOrch::new("early", 10, "A", &log)));
        assert_eq!(daemon.orch_count(), 2);

        tx.send(DaemonEvent::Table {
            table: "A".to_string(),
            entries: vec![KeyOpFieldsValues::del("Ethernet0")],
        })
        .await
        .unwrap();
        tx.send(DaemonEvent::Notification {
            channel: "PFC_WD".to_string(),
            notification: Notification::new("oid:0x1", "storm", vec![]),
        })
        .await
        .unwrap();
        tx.send(DaemonEvent::Shutdown).await.unwrap();

        daemon.run().await;

        assert_eq!(daemon.events_processed(), 2);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "early task Ethernet0",
                "early notify PFC_WD oid:0x1",
                "late notify PFC_WD oid:0x1",
                "early shutdown",
                "late shutdown",
            ]
        );
    }

    #[tokio::test]
    async fn test_closed_channel_stops_loop() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut daemon) = daemon();
        daemon.register_orch(Box::new(RecordingOrch::new("only", 0, "A", &log)));
        drop(tx);

        daemon.run().await;

        assert_eq!(*log.lock().unwrap(), vec!["only shutdown"]);
    }

    #[test]
    fn test_dump_pending() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (_tx, mut daemon) = daemon();
        daemon.register_orch(Box::new(RecordingOrch::new("orch", 0, "A", &log)));
        daemon.dispatch(DaemonEvent::Table {
            table: "A".to_string(),
            entries: vec![
                KeyOpFieldsValues::del("Ethernet0"),
                KeyOpFieldsValues::del("Ethernet4"),
            ],
        });

        assert_eq!(daemon.dump(), vec!["orch: Ethernet0", "orch: Ethernet4"]);
    }

    #[test]
    fn test_from_redis_event() {
        let event = RedisEvent::Notification {
            channel: "PFC_WD".to_string(),
            notification: Notification::new("oid:0x1", "restore", vec![]),
        };
        assert!(matches!(
            DaemonEvent::from(event),
            DaemonEvent::Notification { ref channel, .. } if channel == "PFC_WD"
        ));
    }
}
