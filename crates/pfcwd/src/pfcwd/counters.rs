//! Per-queue watchdog counters in the `COUNTERS` table.
//!
//! Records are keyed by the serialized queue oid. The watchdog owns three
//! fields; the packet counters in the same record are written by the flex
//! counter poller and only read here.

use sonic_orch_common::{FieldValue, Table};
use sonic_sai::{QueueOid, QueueStat};
use std::sync::Arc;
use tracing::{debug, warn};

pub const PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED: &str = "PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED";
pub const PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED: &str = "PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED";
pub const PFC_WD_STATUS: &str = "PFC_WD_STATUS";
pub const PFC_WD_STATUS_OPERATIONAL: &str = "operational";
pub const PFC_WD_STATUS_STORMED: &str = "stormed";

/// Watchdog view of one queue's counter record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PfcWdCounters {
    pub detect_count: u64,
    pub restore_count: u64,
    /// False while the queue is stormed.
    pub operational: bool,
    pub tx_pkt: u64,
    pub tx_drop_pkt: u64,
}

impl Default for PfcWdCounters {
    fn default() -> Self {
        Self {
            detect_count: 0,
            restore_count: 0,
            operational: true,
            tx_pkt: 0,
            tx_drop_pkt: 0,
        }
    }
}

impl PfcWdCounters {
    pub fn status(&self) -> &'static str {
        if self.operational {
            PFC_WD_STATUS_OPERATIONAL
        } else {
            PFC_WD_STATUS_STORMED
        }
    }

    fn watchdog_fields(&self) -> Vec<FieldValue> {
        vec![
            (
                PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED.to_string(),
                self.detect_count.to_string(),
            ),
            (
                PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED.to_string(),
                self.restore_count.to_string(),
            ),
            (PFC_WD_STATUS.to_string(), self.status().to_string()),
        ]
    }
}

/// Reads and writes watchdog counters.
#[derive(Clone)]
pub struct CounterStore {
    table: Arc<dyn Table>,
}

impl CounterStore {
    pub fn new(table: Arc<dyn Table>) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &Arc<dyn Table> {
        &self.table
    }

    /// Reads a queue's counters. Never fails: a missing record, a backend
    /// error, or an unparsable field all read as the zero/operational value.
    pub fn read_counters(&self, queue: QueueOid) -> PfcWdCounters {
        let key = queue.to_sai_string();
        let mut counters = PfcWdCounters::default();

        let fvs = match self.table.get(&key) {
            Ok(Some(fvs)) => fvs,
            Ok(None) => return counters,
            Err(e) => {
                warn!(queue = %key, error = %e, "Failed to read PFC watchdog counters");
                return counters;
            }
        };

        for (field, value) in &fvs {
            match field.as_str() {
                PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED => {
                    counters.detect_count = parse_count(&key, field, value)
                }
                PFC_WD_QUEUE_STATS_DEADLOCK_RESTORED => {
                    counters.restore_count = parse_count(&key, field, value)
                }
                PFC_WD_STATUS => counters.operational = value == PFC_WD_STATUS_OPERATIONAL,
                f if f == QueueStat::Packets.sai_name() => {
                    counters.tx_pkt = parse_count(&key, field, value)
                }
                f if f == QueueStat::DroppedPackets.sai_name() => {
                    counters.tx_drop_pkt = parse_count(&key, field, value)
                }
                _ => {}
            }
        }

        counters
    }

    /// Overwrites the detect count, restore count and status fields. The
    /// packet counters are left to the poller that owns them.
    pub fn write_counters(&self, queue: QueueOid, counters: &PfcWdCounters) {
        let key = queue.to_sai_string();
        if let Err(e) = self.table.set(&key, &counters.watchdog_fields()) {
            warn!(queue = %key, error = %e, "Failed to write PFC watchdog counters");
        }
    }

    /// Writes the zero/operational baseline unless the queue already has a
    /// record. An existing record keeps its counts; a stale `stormed` status
    /// is rewritten to `operational` since no mitigation survives a restart.
    pub fn init_if_absent(&self, queue: QueueOid) {
        let key = queue.to_sai_string();
        let existing = match self.table.hget(&key, PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED) {
            Ok(value) => value,
            Err(e) => {
                warn!(queue = %key, error = %e, "Failed to probe PFC watchdog counters");
                None
            }
        };

        if existing.is_none() {
            self.write_counters(queue, &PfcWdCounters::default());
            return;
        }

        let mut counters = self.read_counters(queue);
        if !counters.operational {
            debug!(queue = %key, "Resetting stale stormed status");
            counters.operational = true;
            self.write_counters(queue, &counters);
        }
    }
}

fn parse_count(key: &str, field: &str, value: &str) -> u64 {
    value.trim().parse().unwrap_or_else(|_| {
        warn!(queue = %key, field, value, "Unparsable counter value, reading as 0");
        0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_orch_common::MemoryTable;

    fn queue() -> QueueOid {
        QueueOid::from_raw_unchecked(0x15000000000a3)
    }

    fn store() -> (Arc<MemoryTable>, CounterStore) {
        let table = Arc::new(MemoryTable::new("COUNTERS"));
        (table.clone(), CounterStore::new(table))
    }

    #[test]
    fn test_read_missing_record_is_zero() {
        let (_, store) = store();
        assert_eq!(store.read_counters(queue()), PfcWdCounters::default());
    }

    #[test]
    fn test_read_backend_failure_is_zero() {
        let (table, store) = store();
        table.set_failing(true);
        assert_eq!(store.read_counters(queue()), PfcWdCounters::default());
    }

    #[test]
    fn test_write_then_read() {
        let (table, store) = store();
        let counters = PfcWdCounters {
            detect_count: 3,
            restore_count: 2,
            operational: false,
            ..Default::default()
        };
        store.write_counters(queue(), &counters);

        assert_eq!(store.read_counters(queue()), counters);
        assert_eq!(
            table
                .hget("oid:0x15000000000a3", PFC_WD_STATUS)
                .unwrap()
                .as_deref(),
            Some("stormed")
        );
    }

    #[test]
    fn test_write_keeps_poller_fields() {
        let (table, store) = store();
        table
            .set(
                "oid:0x15000000000a3",
                &[("SAI_QUEUE_STAT_PACKETS".to_string(), "1500".to_string())],
            )
            .unwrap();

        store.write_counters(queue(), &PfcWdCounters::default());

        let counters = store.read_counters(queue());
        assert_eq!(counters.tx_pkt, 1500);
        assert!(counters.operational);
    }

    #[test]
    fn test_init_if_absent_writes_baseline() {
        let (table, store) = store();
        store.init_if_absent(queue());

        assert_eq!(
            table
                .hget("oid:0x15000000000a3", PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED)
                .unwrap()
                .as_deref(),
            Some("0")
        );
        assert!(store.read_counters(queue()).operational);
    }

    #[test]
    fn test_init_if_absent_preserves_counts_and_clears_stormed() {
        let (_, store) = store();
        store.write_counters(
            queue(),
            &PfcWdCounters {
                detect_count: 7,
                restore_count: 6,
                operational: false,
                ..Default::default()
            },
        );

        store.init_if_absent(queue());

        let counters = store.read_counters(queue());
        assert_eq!(counters.detect_count, 7);
        assert_eq!(counters.restore_count, 6);
        assert!(counters.operational);
    }

    #[test]
    fn test_unparsable_count_reads_as_zero() {
        let (table, store) = store();
        table
            .set(
                "oid:0x15000000000a3",
                &[(
                    PFC_WD_QUEUE_STATS_DEADLOCK_DETECTED.to_string(),
                    "lots".to_string(),
                )],
            )
            .unwrap();

        assert_eq!(store.read_counters(queue()).detect_count, 0);
    }
}
