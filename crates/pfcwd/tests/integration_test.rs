//! End-to-end tests of the PFC watchdog against the virtual switch.
//!
//! Each test drives a `PfcWdOrch` the way the daemon does (configuration
//! records and detector notifications) and checks what a reader of the
//! switch, the `COUNTERS` table and the polling metadata would observe.

use pretty_assertions::assert_eq;
use sonic_orch_common::{FieldValue, KeyOpFieldsValues, MemoryTable, Notification, Orch, Table};
use sonic_pfcwd::daemon::{DaemonEvent, OrchDaemon, OrchDaemonConfig};
use sonic_pfcwd::pfcwd::counters::{
    PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED, PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED, PFC_WD_STATUS,
};
use sonic_pfcwd::pfcwd::engine::{POLL_ACTION, POLL_DETECTION_TIME, POLL_RESTORATION_TIME};
use sonic_pfcwd::pfcwd::{
    EngineProfile, HandlerKind, NotificationOutcome, PfcWdAction, PfcWdConfigError, PfcWdError,
    PfcWdOrch, PfcWdOrchConfig, COUNTERS_TABLE, PFC_WD_NOTIFICATION_CHANNEL, PFC_WD_STATE_TABLE,
    PFC_WD_TABLE,
};
use sonic_pfcwd::ports::Port;
use sonic_pfcwd::vs::{PortSpec, VirtualSwitch};
use sonic_sai::{AclPacketAction, PortApi, QueueOid};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::mpsc;

const INGRESS_TC3: &str = "IngressTable_PfcWdAclHandler_3";
const EGRESS_TC3: &str = "EgressTable_PfcWdAclHandler_3";

struct Fixture {
    vs: Arc<VirtualSwitch>,
    counters: Arc<MemoryTable>,
    metadata: Arc<MemoryTable>,
    orch: PfcWdOrch,
}

impl Fixture {
    fn new(profile: EngineProfile) -> Self {
        let vs = Arc::new(VirtualSwitch::new());
        let counters = Arc::new(MemoryTable::new(COUNTERS_TABLE));
        let metadata = Arc::new(MemoryTable::new(PFC_WD_STATE_TABLE));
        let config = PfcWdOrchConfig {
            profile,
            ..Default::default()
        };
        let orch = PfcWdOrch::new(
            config,
            vs.clone(),
            vs.clone(),
            counters.clone(),
            metadata.clone(),
        );
        Self {
            vs,
            counters,
            metadata,
            orch,
        }
    }

    fn port(&self, alias: &str, pfc_mask: u8) -> Port {
        self.vs.add_port(PortSpec::new(alias, pfc_mask)).unwrap()
    }

    fn storm(&mut self, queue: QueueOid) -> NotificationOutcome {
        self.orch
            .handle_notification(&Notification::new(queue.to_sai_string(), "storm", vec![]))
    }

    fn restore(&mut self, queue: QueueOid) -> NotificationOutcome {
        self.orch
            .handle_notification(&Notification::new(queue.to_sai_string(), "restore", vec![]))
    }

    fn counter(&self, queue: QueueOid, field: &str) -> Option<String> {
        self.counters.hget(&queue.to_sai_string(), field).unwrap()
    }

    /// (detected, restored, status)
    fn counters_of(&self, queue: QueueOid) -> (String, String, String) {
        (
            self.counter(queue, PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED)
                .unwrap_or_default(),
            self.counter(queue, PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED)
                .unwrap_or_default(),
            self.counter(queue, PFC_WD_STATUS).unwrap_or_default(),
        )
    }

    fn poll_field(&self, queue: QueueOid, field: &str) -> Option<String> {
        let key = self.orch.engine().queue_key(queue);
        self.metadata.hget(&key, field).unwrap()
    }
}

fn fvs(pairs: &[(&str, &str)]) -> Vec<FieldValue> {
    pairs
        .iter()
        .map(|(f, v)| (f.to_string(), v.to_string()))
        .collect()
}

fn counts(detected: &str, restored: &str, status: &str) -> (String, String, String) {
    (detected.to_string(), restored.to_string(), status.to_string())
}

#[test]
fn test_drop_storm_and_restore_on_ethernet0() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1000);
    let queue = port.queue_ids[3];

    let monitored = fx
        .orch
        .configure(
            "Ethernet0",
            &fvs(&[
                ("detection_time", "400"),
                ("restoration_time", "1000"),
                ("action", "drop"),
            ]),
        )
        .unwrap();

    assert_eq!(monitored, 1);
    assert_eq!(fx.orch.engine().queue_count(), 1);
    assert_eq!(fx.counters_of(queue), counts("0", "0", "operational"));
    assert_eq!(fx.poll_field(queue, POLL_DETECTION_TIME).as_deref(), Some("400"));
    assert_eq!(fx.poll_field(queue, POLL_RESTORATION_TIME).as_deref(), Some("1000"));
    assert_eq!(fx.poll_field(queue, POLL_ACTION).as_deref(), Some("drop"));

    assert_eq!(
        fx.storm(queue),
        NotificationOutcome::StormStarted(HandlerKind::AclDrop)
    );
    assert_eq!(fx.counters_of(queue), counts("1", "0", "stormed"));
    for table in [INGRESS_TC3, EGRESS_TC3] {
        let rules = fx.vs.acl_rules(table);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].match_tc, 3);
        assert_eq!(rules[0].priority, 999);
        assert_eq!(rules[0].action, AclPacketAction::Drop);
        assert_eq!(fx.vs.acl_bindings(table), Some(BTreeSet::from([port.port_id])));
    }

    assert_eq!(fx.restore(queue), NotificationOutcome::Restored);
    assert_eq!(fx.counters_of(queue), counts("1", "1", "operational"));
    assert!(fx.orch.engine().queue_entry(queue).unwrap().handler().is_none());
    // Tables and rules outlive their last binding.
    assert_eq!(fx.vs.acl_table_count(), 2);
    assert_eq!(fx.vs.acl_entry_count(), 2);
    assert_eq!(fx.vs.acl_bindings(INGRESS_TC3), Some(BTreeSet::new()));
}

#[test]
fn test_bogus_action_leaves_prior_config() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1000);
    let queue = port.queue_ids[3];
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "alert")]))
        .unwrap();

    let err = fx
        .orch
        .configure("Ethernet0", &fvs(&[("detection_time", "300"), ("action", "bogus")]))
        .unwrap_err();

    assert_eq!(
        err,
        PfcWdError::InvalidConfig {
            port: "Ethernet0".to_string(),
            source: PfcWdConfigError::InvalidAction("bogus".to_string()),
        }
    );
    assert_eq!(fx.orch.engine().queue_count(), 1);
    assert_eq!(
        fx.orch.engine().queue_entry(queue).unwrap().action,
        PfcWdAction::Alert
    );
    assert_eq!(fx.poll_field(queue, POLL_DETECTION_TIME).as_deref(), Some("200"));
    assert_eq!(fx.orch.stats().configs_rejected, 1);
}

#[test]
fn test_bogus_action_on_new_port_creates_nothing() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    fx.port("Ethernet0", 0b0000_1000);

    assert!(fx
        .orch
        .configure("Ethernet0", &fvs(&[("detection_time", "300"), ("action", "bogus")]))
        .is_err());
    assert_eq!(fx.orch.engine().queue_count(), 0);
    assert!(fx.metadata.is_empty());
    assert!(fx.counters.is_empty());
}

#[test]
fn test_threshold_ranges() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let queue = fx.port("Ethernet0", 0b0000_1000).queue_ids[3];

    let cases = [
        ("99", "0", false),
        ("100", "0", true),
        ("5000", "0", true),
        ("5001", "0", false),
        ("200", "99", false),
        ("200", "100", true),
        ("200", "60000", true),
        ("200", "60001", false),
        ("0", "0", false),
    ];
    for (detection, restoration, accepted) in cases {
        let before = fx.poll_field(queue, POLL_DETECTION_TIME);
        let result = fx.orch.configure(
            "Ethernet0",
            &fvs(&[
                ("detection_time", detection),
                ("restoration_time", restoration),
            ]),
        );
        assert_eq!(result.is_ok(), accepted, "detection {} restoration {}", detection, restoration);
        if accepted {
            assert_eq!(fx.poll_field(queue, POLL_DETECTION_TIME).as_deref(), Some(detection));
        } else {
            assert_eq!(fx.poll_field(queue, POLL_DETECTION_TIME), before);
        }
    }
}

#[test]
fn test_restoration_zero_publishes_empty_threshold() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let queue = fx.port("Ethernet0", 0b0000_1000).queue_ids[3];

    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200")]))
        .unwrap();

    assert_eq!(fx.poll_field(queue, POLL_RESTORATION_TIME).as_deref(), Some(""));
    assert_eq!(fx.poll_field(queue, POLL_ACTION).as_deref(), Some("drop"));
}

#[test]
fn test_mask_bits_select_queues() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1001);

    let monitored = fx
        .orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200")]))
        .unwrap();

    assert_eq!(monitored, 2);
    assert_eq!(
        fx.orch.engine().port_queues("Ethernet0"),
        Some(&[port.queue_ids[0], port.queue_ids[3]][..])
    );
    let mut keys = fx.metadata.keys().unwrap();
    keys.sort();
    let mut expected = vec![
        fx.orch.engine().queue_key(port.queue_ids[0]),
        fx.orch.engine().queue_key(port.queue_ids[3]),
        fx.orch.engine().port_key(port.port_id),
    ];
    expected.sort();
    assert_eq!(keys, expected);
    for tc in [1, 2, 4, 5, 6, 7] {
        assert!(fx.orch.engine().queue_entry(port.queue_ids[tc]).is_none());
    }
}

#[test]
fn test_duplicate_storm_keeps_handler() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let queue = fx.port("Ethernet0", 0b0000_1000).queue_ids[3];
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "alert")]))
        .unwrap();

    assert_eq!(
        fx.storm(queue),
        NotificationOutcome::StormStarted(HandlerKind::Alert)
    );
    assert_eq!(fx.storm(queue), NotificationOutcome::StormAlreadyActive);
    assert_eq!(fx.counters_of(queue), counts("1", "0", "stormed"));

    assert_eq!(fx.restore(queue), NotificationOutcome::Restored);
    assert_eq!(fx.restore(queue), NotificationOutcome::AlreadyOperational);
    assert_eq!(fx.counters_of(queue), counts("1", "1", "operational"));
    assert_eq!(fx.orch.stats().storms_detected, 1);
    assert_eq!(fx.orch.stats().notifications_ignored, 2);
}

#[test]
fn test_ports_share_acl_table_per_traffic_class() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let p0 = fx.port("Ethernet0", 0b0000_1000);
    let p4 = fx.port("Ethernet4", 0b0000_1000);
    for alias in ["Ethernet0", "Ethernet4"] {
        fx.orch
            .configure(alias, &fvs(&[("detection_time", "200"), ("action", "drop")]))
            .unwrap();
    }

    fx.storm(p0.queue_ids[3]);
    fx.storm(p4.queue_ids[3]);
    assert_eq!(fx.vs.acl_table_count(), 2);
    assert_eq!(fx.vs.acl_entry_count(), 2);
    assert_eq!(
        fx.vs.acl_bindings(INGRESS_TC3),
        Some(BTreeSet::from([p0.port_id, p4.port_id]))
    );

    fx.restore(p0.queue_ids[3]);
    assert_eq!(fx.vs.acl_rules(INGRESS_TC3).len(), 1);
    assert_eq!(fx.vs.acl_rules(EGRESS_TC3).len(), 1);
    assert_eq!(
        fx.vs.acl_bindings(EGRESS_TC3),
        Some(BTreeSet::from([p4.port_id]))
    );
}

#[test]
fn test_forward_maps_to_alert_under_acl_profile() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1000);
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "forward")]))
        .unwrap();

    assert_eq!(
        fx.storm(port.queue_ids[3]),
        NotificationOutcome::StormStarted(HandlerKind::Alert)
    );
    assert_eq!(fx.vs.acl_table_count(), 0);
    assert_eq!(fx.vs.pfc_mask(port.port_id), Some(0b0000_1000));
}

#[test]
fn test_forward_disables_pfc_under_zero_buffer_profile() {
    let mut fx = Fixture::new(EngineProfile::ZeroBuffer);
    let port = fx.port("Ethernet0", 0b0001_1000);
    let original = fx.vs.queue_profile(port.queue_ids[3]);
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "forward")]))
        .unwrap();

    assert_eq!(
        fx.storm(port.queue_ids[3]),
        NotificationOutcome::StormStarted(HandlerKind::PfcDisable)
    );
    assert_eq!(fx.vs.pfc_mask(port.port_id), Some(0b0001_0000));
    assert_eq!(fx.vs.queue_profile(port.queue_ids[3]), original);
    assert_eq!(fx.vs.buffer_profile_count(), 0);

    fx.restore(port.queue_ids[3]);
    assert_eq!(fx.vs.pfc_mask(port.port_id), Some(0b0001_1000));
}

#[tokio::test]
async fn test_zero_buffer_interleaved_restores() {
    let mut fx = Fixture::new(EngineProfile::ZeroBuffer);
    let port = fx.port("Ethernet0", 0b0001_1000);
    let (q3, q4) = (port.queue_ids[3], port.queue_ids[4]);
    let (pg3, pg4) = (port.pg_ids[3], port.pg_ids[4]);
    let original_q3 = fx.vs.queue_profile(q3).unwrap();
    let original_q4 = fx.vs.queue_profile(q4).unwrap();
    let original_pg3 = fx.vs.pg_profile(pg3).unwrap();
    let original_pg4 = fx.vs.pg_profile(pg4).unwrap();
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "drop")]))
        .unwrap();

    assert_eq!(
        fx.storm(q3),
        NotificationOutcome::StormStarted(HandlerKind::ZeroBuffer)
    );
    fx.storm(q4);
    assert_eq!(fx.vs.pfc_mask(port.port_id), Some(0));
    assert_eq!(fx.vs.queue_profile(q3), fx.vs.queue_profile(q4));
    assert_ne!(fx.vs.queue_profile(q3), Some(original_q3));
    assert_eq!(fx.vs.buffer_profile_count(), 2);
    assert_eq!(fx.vs.buffer_pool_count(), 2);

    fx.restore(q3);
    assert_eq!(fx.vs.queue_profile(q3), Some(original_q3));
    assert_eq!(fx.vs.pg_profile(pg3), Some(original_pg3));
    assert_ne!(fx.vs.queue_profile(q4), Some(original_q4));
    assert_eq!(fx.vs.pfc_mask(port.port_id), Some(0b0000_1000));

    fx.restore(q4);
    assert_eq!(fx.vs.queue_profile(q4), Some(original_q4));
    assert_eq!(fx.vs.pg_profile(pg4), Some(original_pg4));
    assert_eq!(fx.vs.pfc_mask(port.port_id), Some(0b0001_1000));

    // The zero profiles stay until shutdown.
    assert_eq!(fx.vs.buffer_profile_count(), 2);
    fx.orch.shutdown().await;
    assert_eq!(fx.vs.buffer_profile_count(), 0);
    assert_eq!(fx.vs.buffer_pool_count(), 0);
}

#[test]
fn test_reconfigure_keeps_live_handler() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1000);
    let queue = port.queue_ids[3];
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "alert")]))
        .unwrap();
    fx.storm(queue);

    fx.vs.set_pfc_mask(port.port_id, 0b0001_1000).unwrap();
    let monitored = fx
        .orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "drop")]))
        .unwrap();

    assert_eq!(monitored, 2);
    let entry = fx.orch.engine().queue_entry(queue).unwrap();
    assert_eq!(entry.action, PfcWdAction::Drop);
    assert_eq!(entry.handler_kind(), Some(HandlerKind::Alert));
    assert_eq!(fx.counters_of(queue), counts("1", "0", "stormed"));

    fx.restore(queue);
    assert_eq!(
        fx.storm(queue),
        NotificationOutcome::StormStarted(HandlerKind::AclDrop)
    );
}

#[test]
fn test_unregister_while_stormed_restores() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1000);
    let queue = port.queue_ids[3];
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200"), ("action", "drop")]))
        .unwrap();
    fx.storm(queue);

    assert_eq!(fx.orch.unconfigure("Ethernet0"), Ok(1));

    assert_eq!(fx.orch.engine().queue_count(), 0);
    assert!(!fx.orch.engine().is_port_registered("Ethernet0"));
    assert!(fx.metadata.is_empty());
    assert_eq!(fx.vs.acl_bindings(INGRESS_TC3), Some(BTreeSet::new()));
    assert_eq!(fx.counters_of(queue), counts("1", "1", "operational"));
    assert_eq!(fx.restore(queue), NotificationOutcome::UnregisteredQueue);

    assert_eq!(
        fx.orch.unconfigure("Ethernet0"),
        Err(PfcWdError::PortNotRegistered("Ethernet0".to_string()))
    );
}

#[test]
fn test_restart_keeps_counts_and_clears_stale_storm() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let queue = fx.port("Ethernet0", 0b0000_1000).queue_ids[3];
    fx.counters
        .set(
            &queue.to_sai_string(),
            &fvs(&[
                (PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED, "5"),
                (PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED, "4"),
                (PFC_WD_STATUS, "stormed"),
            ]),
        )
        .unwrap();

    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200")]))
        .unwrap();
    assert_eq!(fx.counters_of(queue), counts("5", "4", "operational"));

    fx.storm(queue);
    fx.restore(queue);
    assert_eq!(fx.counters_of(queue), counts("6", "5", "operational"));
}

#[test]
fn test_notification_protocol_errors_are_ignored() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1000);
    fx.orch
        .configure("Ethernet0", &fvs(&[("detection_time", "200")]))
        .unwrap();

    let unknown_event = Notification::new(port.queue_ids[3].to_sai_string(), "melt", vec![]);
    assert_eq!(
        fx.orch.handle_notification(&unknown_event),
        NotificationOutcome::UnknownEvent
    );
    assert_eq!(
        fx.storm(port.queue_ids[0]),
        NotificationOutcome::UnregisteredQueue
    );
    let malformed = Notification::new("Ethernet0", "storm", vec![]);
    assert_eq!(
        fx.orch.handle_notification(&malformed),
        NotificationOutcome::MalformedQueueId
    );
    assert_eq!(fx.orch.engine().stormed_count(), 0);
    assert_eq!(fx.counters_of(port.queue_ids[3]), counts("0", "0", "operational"));
}

#[test]
#[should_panic(expected = "Unknown PFC WD action")]
fn test_unknown_action_reaching_dispatch_panics() {
    EngineProfile::ZeroBuffer.handler_for(PfcWdAction::Unknown);
}

#[tokio::test]
async fn test_daemon_applies_config_then_notifications() {
    let fx = Fixture::new(EngineProfile::Acl);
    let port = fx.port("Ethernet0", 0b0000_1000);
    let queue = port.queue_ids[3];
    let Fixture {
        vs, counters, orch, ..
    } = fx;

    let config = OrchDaemonConfig {
        heartbeat_interval_ms: 10,
        ..Default::default()
    };
    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let mut daemon = OrchDaemon::new(config, rx);
    daemon.register_orch(Box::new(orch));

    tx.send(DaemonEvent::Table {
        table: PFC_WD_TABLE.to_string(),
        entries: vec![KeyOpFieldsValues::set(
            "Ethernet0",
            fvs(&[("detection_time", "200"), ("action", "drop")]),
        )],
    })
    .await
    .unwrap();
    tx.send(DaemonEvent::Notification {
        channel: PFC_WD_NOTIFICATION_CHANNEL.to_string(),
        notification: Notification::new(queue.to_sai_string(), "storm", vec![]),
    })
    .await
    .unwrap();
    tx.send(DaemonEvent::Shutdown).await.unwrap();

    daemon.run().await;

    // Shutdown restored the storm and removed the shared tables.
    let detected = counters
        .hget(&queue.to_sai_string(), PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED)
        .unwrap();
    let status = counters.hget(&queue.to_sai_string(), PFC_WD_STATUS).unwrap();
    assert_eq!(detected.as_deref(), Some("1"));
    assert_eq!(status.as_deref(), Some("operational"));
    assert_eq!(vs.acl_table_count(), 0);
    assert_eq!(vs.acl_entry_count(), 0);
}

#[tokio::test]
async fn test_config_waits_for_port_init() {
    let mut fx = Fixture::new(EngineProfile::Acl);
    fx.port("Ethernet0", 0b0000_1000);
    fx.vs.set_init_done(false);

    fx.orch.add_to_sync(
        PFC_WD_TABLE,
        vec![KeyOpFieldsValues::set("Ethernet0", fvs(&[("detection_time", "200")]))],
    );
    fx.orch.do_task().await;
    assert_eq!(fx.orch.engine().queue_count(), 0);
    assert!(fx.orch.has_pending_tasks());

    fx.vs.set_init_done(true);
    fx.orch.do_task().await;
    assert_eq!(fx.orch.engine().queue_count(), 1);
}
