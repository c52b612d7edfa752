//! Per-queue watchdog state.
//!
//! The engine turns a validated port configuration into one monitored entry
//! per PFC-enabled traffic class, publishes what the detector must poll, and
//! moves queues between operational and stormed as notifications arrive.
//! A queue has a live [`PfcWdHandler`] exactly while it is stormed.

use super::counters::CounterStore;
use super::handler::{HandlerContext, HandlerEnv, HandlerKind, PfcWdHandler};
use super::orch::PfcWdOrchConfig;
use super::resources::PfcWdResources;
use super::types::{PfcWdAction, PfcWdConfig, PfcWdError, PFC_WD_TC_MAX};
use crate::ports::Port;
use sonic_orch_common::{FieldValue, Notification, Table};
use sonic_sai::{IngressPriorityGroupOid, PortOid, QueueOid, SwitchApi};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Polling metadata fields in `PFC_WD_STATE_TABLE`.
pub const PFC_WD_PORT_COUNTER_ID_LIST: &str = "PFC_WD_PORT_COUNTER_ID_LIST";
pub const PFC_WD_QUEUE_COUNTER_ID_LIST: &str = "PFC_WD_QUEUE_COUNTER_ID_LIST";
pub const PFC_WD_QUEUE_ATTR_ID_LIST: &str = "PFC_WD_QUEUE_ATTR_ID_LIST";
pub const POLL_DETECTION_TIME: &str = "PFC_WD_DETECTION_TIME";
pub const POLL_RESTORATION_TIME: &str = "PFC_WD_RESTORATION_TIME";
pub const POLL_ACTION: &str = "PFC_WD_ACTION";

/// Notification events sent by the detector.
pub const EVENT_STORM: &str = "storm";
pub const EVENT_RESTORE: &str = "restore";

/// Which mitigations the configured actions map to.
///
/// | Profile       | drop         | forward      | alert   |
/// |---------------|--------------|--------------|---------|
/// | `Acl`         | `AclDrop`    | `Alert`      | `Alert` |
/// | `ZeroBuffer`  | `ZeroBuffer` | `PfcDisable` | `Alert` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineProfile {
    #[default]
    Acl,
    ZeroBuffer,
}

impl EngineProfile {
    /// Picks the handler for a queue's configured action.
    ///
    /// # Panics
    ///
    /// On [`PfcWdAction::Unknown`]. Configuration parsing never produces it,
    /// so reaching it here is a programming error.
    pub fn handler_for(&self, action: PfcWdAction) -> HandlerKind {
        match (self, action) {
            (_, PfcWdAction::Alert) => HandlerKind::Alert,
            (EngineProfile::Acl, PfcWdAction::Drop) => HandlerKind::AclDrop,
            (EngineProfile::Acl, PfcWdAction::Forward) => HandlerKind::Alert,
            (EngineProfile::ZeroBuffer, PfcWdAction::Drop) => HandlerKind::ZeroBuffer,
            (EngineProfile::ZeroBuffer, PfcWdAction::Forward) => HandlerKind::PfcDisable,
            (_, PfcWdAction::Unknown) => panic!("Unknown PFC WD action"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineProfile::Acl => "acl",
            EngineProfile::ZeroBuffer => "zero-buffer",
        }
    }
}

impl fmt::Display for EngineProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "acl" => Ok(EngineProfile::Acl),
            "zero-buffer" => Ok(EngineProfile::ZeroBuffer),
            _ => Err(format!("Unknown engine profile: {}", s)),
        }
    }
}

/// What a notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    StormStarted(HandlerKind),
    /// Storm for a queue that is already stormed; nothing changed.
    StormAlreadyActive,
    Restored,
    /// Restore for a queue that is not stormed; nothing changed.
    AlreadyOperational,
    UnknownEvent,
    UnregisteredQueue,
    MalformedQueueId,
}

/// A monitored queue.
#[derive(Debug)]
pub struct PfcWdQueueEntry {
    pub action: PfcWdAction,
    pub port_id: PortOid,
    pub port_alias: String,
    /// Traffic class of the queue.
    pub index: u8,
    pub pg_id: Option<IngressPriorityGroupOid>,
    handler: Option<PfcWdHandler>,
}

impl PfcWdQueueEntry {
    pub fn is_stormed(&self) -> bool {
        self.handler.is_some()
    }

    pub fn handler(&self) -> Option<&PfcWdHandler> {
        self.handler.as_ref()
    }

    pub fn handler_kind(&self) -> Option<HandlerKind> {
        self.handler.as_ref().map(PfcWdHandler::kind)
    }
}

#[derive(Debug, Clone)]
struct PortRegistration {
    port_id: PortOid,
    queues: Vec<QueueOid>,
}

/// Watchdog state of every registered port and queue.
pub struct PfcWdEngine {
    config: PfcWdOrchConfig,
    sai: Arc<dyn SwitchApi>,
    counters: CounterStore,
    metadata: Arc<dyn Table>,
    resources: PfcWdResources,
    queues: HashMap<QueueOid, PfcWdQueueEntry>,
    ports: BTreeMap<String, PortRegistration>,
}

impl PfcWdEngine {
    /// `counters` is the `COUNTERS` table; `metadata` is
    /// `PFC_WD_STATE_TABLE`, read by the detector.
    pub fn new(
        config: PfcWdOrchConfig,
        sai: Arc<dyn SwitchApi>,
        counters: Arc<dyn Table>,
        metadata: Arc<dyn Table>,
    ) -> Self {
        Self {
            config,
            sai,
            counters: CounterStore::new(counters),
            metadata,
            resources: PfcWdResources::new(),
            queues: HashMap::new(),
            ports: BTreeMap::new(),
        }
    }

    /// Starts monitoring every PFC-enabled traffic class of `port`.
    ///
    /// Registering a port again updates the action of its entries (a live
    /// handler keeps running until restore), republishes metadata, and adds
    /// entries for newly enabled classes. Returns the number of queues
    /// monitored on the port.
    pub fn register_port(&mut self, port: &Port, config: &PfcWdConfig) -> Result<usize, PfcWdError> {
        let mask = self
            .sai
            .get_pfc_mask(port.port_id)
            .map_err(|e| PfcWdError::sai(&port.alias, e))?;

        if !self.config.port_stat_ids.is_empty() {
            let ids = join_ids(self.config.port_stat_ids.iter().map(|s| s.sai_name()));
            self.publish(
                &self.port_key(port.port_id),
                vec![(PFC_WD_PORT_COUNTER_ID_LIST.to_string(), ids)],
            );
        }

        // A stormed queue may have its PFC bit cleared by its handler; entries
        // already registered on the port are updated regardless of the mask.
        let registered = self.registered_tcs(&port.alias);

        let mut monitored = Vec::new();
        for tc in 0..PFC_WD_TC_MAX {
            if (mask | registered) & (1 << tc) == 0 {
                continue;
            }
            let Some(queue_id) = port.queue_id(tc) else {
                error!(port = %port.alias, tc, "Port has no queue for PFC-enabled traffic class");
                continue;
            };

            match self.queues.get_mut(&queue_id) {
                Some(entry) => {
                    debug!(port = %port.alias, tc, action = %config.action, "Updating PFC watchdog queue");
                    entry.action = config.action;
                }
                None => {
                    self.queues.insert(
                        queue_id,
                        PfcWdQueueEntry {
                            action: config.action,
                            port_id: port.port_id,
                            port_alias: port.alias.clone(),
                            index: tc,
                            pg_id: port.pg_id(tc),
                            handler: None,
                        },
                    );
                    self.counters.init_if_absent(queue_id);
                }
            }

            self.publish_queue(queue_id, config);
            monitored.push(queue_id);
        }

        let registration = self
            .ports
            .entry(port.alias.clone())
            .or_insert_with(|| PortRegistration {
                port_id: port.port_id,
                queues: Vec::new(),
            });
        for queue_id in monitored {
            if !registration.queues.contains(&queue_id) {
                registration.queues.push(queue_id);
            }
        }

        info!(
            port = %port.alias,
            pfc_mask = mask,
            queues = registration.queues.len(),
            action = %config.action,
            "Started PFC watchdog on port"
        );
        Ok(registration.queues.len())
    }

    fn registered_tcs(&self, alias: &str) -> u8 {
        self.ports.get(alias).map_or(0, |registration| {
            registration
                .queues
                .iter()
                .filter_map(|queue_id| self.queues.get(queue_id))
                .fold(0, |tcs, entry| tcs | (1 << entry.index))
        })
    }

    /// Stops monitoring a port. Stormed queues are restored first; counters
    /// are left in place. Returns the number of queues removed.
    pub fn unregister_port(&mut self, alias: &str) -> Result<usize, PfcWdError> {
        let registration = self
            .ports
            .remove(alias)
            .ok_or_else(|| PfcWdError::PortNotRegistered(alias.to_string()))?;

        for queue_id in &registration.queues {
            if let Some(mut entry) = self.queues.remove(queue_id) {
                if let Some(handler) = entry.handler.take() {
                    info!(port = %alias, tc = entry.index, "Restoring stormed queue on unregistration");
                    let mut env = HandlerEnv {
                        sai: self.sai.as_ref(),
                        counters: &self.counters,
                        resources: &mut self.resources,
                    };
                    handler.restore(&mut env);
                }
            }
            self.unpublish(&self.queue_key(*queue_id));
        }

        if !self.config.port_stat_ids.is_empty() {
            self.unpublish(&self.port_key(registration.port_id));
        }

        info!(port = %alias, queues = registration.queues.len(), "Stopped PFC watchdog on port");
        Ok(registration.queues.len())
    }

    /// Applies a detector notification: `op` is the queue id, `data` the
    /// event.
    pub fn handle_notification(&mut self, notification: &Notification) -> NotificationOutcome {
        let queue_str = notification.op.as_str();
        let event = notification.data.as_str();

        let queue_id = match queue_str.parse::<QueueOid>() {
            Ok(id) => id,
            Err(e) => {
                error!(queue = %queue_str, error = %e, "Malformed queue id in PFC watchdog notification");
                return NotificationOutcome::MalformedQueueId;
            }
        };

        let Some(entry) = self.queues.get_mut(&queue_id) else {
            error!(queue = %queue_str, "Queue is not registered");
            return NotificationOutcome::UnregisteredQueue;
        };

        info!(queue = %queue_str, event, "Received PFC watchdog notification");
        let mut env = HandlerEnv {
            sai: self.sai.as_ref(),
            counters: &self.counters,
            resources: &mut self.resources,
        };

        match event {
            EVENT_STORM => {
                if entry.handler.is_some() {
                    debug!(queue = %queue_str, "Queue already stormed");
                    return NotificationOutcome::StormAlreadyActive;
                }
                let kind = self.config.profile.handler_for(entry.action);
                let ctx = HandlerContext {
                    port_id: entry.port_id,
                    queue_id,
                    tc: entry.index,
                    pg_id: entry.pg_id,
                };
                entry.handler = Some(PfcWdHandler::start(kind, ctx, &mut env));
                NotificationOutcome::StormStarted(kind)
            }
            EVENT_RESTORE => match entry.handler.take() {
                Some(handler) => {
                    handler.restore(&mut env);
                    NotificationOutcome::Restored
                }
                None => {
                    debug!(queue = %queue_str, "Queue already operational");
                    NotificationOutcome::AlreadyOperational
                }
            },
            other => {
                error!(queue = %queue_str, event = other, "Received unknown event from plugin");
                NotificationOutcome::UnknownEvent
            }
        }
    }

    /// Restores every stormed queue and removes the shared ACL tables and
    /// zero buffer profiles.
    pub fn shutdown(&mut self) {
        for entry in self.queues.values_mut() {
            if let Some(handler) = entry.handler.take() {
                let mut env = HandlerEnv {
                    sai: self.sai.as_ref(),
                    counters: &self.counters,
                    resources: &mut self.resources,
                };
                handler.restore(&mut env);
            }
        }
        self.resources.acl.clear(self.sai.as_ref());
        self.resources.zero_buffer.destroy_all(self.sai.as_ref());
    }

    pub fn config(&self) -> &PfcWdOrchConfig {
        &self.config
    }

    pub fn queue_entry(&self, queue_id: QueueOid) -> Option<&PfcWdQueueEntry> {
        self.queues.get(&queue_id)
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    pub fn stormed_count(&self) -> usize {
        self.queues.values().filter(|e| e.is_stormed()).count()
    }

    pub fn is_port_registered(&self, alias: &str) -> bool {
        self.ports.contains_key(alias)
    }

    /// Queues monitored on a port, in registration order.
    pub fn port_queues(&self, alias: &str) -> Option<&[QueueOid]> {
        self.ports.get(alias).map(|r| r.queues.as_slice())
    }

    pub fn resources(&self) -> &PfcWdResources {
        &self.resources
    }

    pub fn counters(&self) -> &CounterStore {
        &self.counters
    }

    /// Metadata key of a queue: `<queue oid>:<poll interval>`.
    pub fn queue_key(&self, queue_id: QueueOid) -> String {
        format!("{}:{}", queue_id.to_sai_string(), self.config.poll_interval_ms)
    }

    pub fn port_key(&self, port_id: PortOid) -> String {
        format!("{}:{}", port_id.to_sai_string(), self.config.poll_interval_ms)
    }

    fn publish_queue(&self, queue_id: QueueOid, config: &PfcWdConfig) {
        let mut fvs: Vec<FieldValue> = Vec::new();
        if !self.config.queue_stat_ids.is_empty() {
            fvs.push((
                PFC_WD_QUEUE_COUNTER_ID_LIST.to_string(),
                join_ids(self.config.queue_stat_ids.iter().map(|s| s.sai_name())),
            ));
        }
        if !self.config.queue_attr_ids.is_empty() {
            fvs.push((
                PFC_WD_QUEUE_ATTR_ID_LIST.to_string(),
                join_ids(self.config.queue_attr_ids.iter().map(|a| a.sai_name())),
            ));
        }
        fvs.push((
            POLL_DETECTION_TIME.to_string(),
            config.detection_time.value().to_string(),
        ));
        let restoration = if config.restoration_time.is_disabled() {
            String::new()
        } else {
            config.restoration_time.value().to_string()
        };
        fvs.push((POLL_RESTORATION_TIME.to_string(), restoration));
        fvs.push((POLL_ACTION.to_string(), config.action.as_str().to_string()));

        // Replace rather than merge so a shorter id list leaves nothing stale.
        let key = self.queue_key(queue_id);
        self.unpublish(&key);
        self.publish(&key, fvs);
    }

    fn publish(&self, key: &str, fvs: Vec<FieldValue>) {
        if let Err(e) = self.metadata.set(key, &fvs) {
            warn!(key, error = %e, "Failed to publish PFC watchdog polling metadata");
        }
    }

    fn unpublish(&self, key: &str) {
        if let Err(e) = self.metadata.del(key) {
            warn!(key, error = %e, "Failed to remove PFC watchdog polling metadata");
        }
    }
}

fn join_ids<S: AsRef<str>>(ids: impl Iterator<Item = S>) -> String {
    ids.map(|id| id.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(",")
}
