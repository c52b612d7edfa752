//! Storm mitigation handlers.
//!
//! A handler exists exactly while its queue is stormed. [`PfcWdHandler::start`]
//! counts the storm and applies the mitigation of its [`HandlerKind`];
//! [`PfcWdHandler::restore`] consumes the handler, reverts the mitigation and
//! counts the restoration. The variants build on each other:
//!
//! | Kind         | Mitigation                                                  |
//! |--------------|-------------------------------------------------------------|
//! | `Alert`      | none, counters only                                         |
//! | `AclDrop`    | bind the port to the shared TC drop tables (both stages)    |
//! | `PfcDisable` | clear the TC bit in the port PFC mask                       |
//! | `ZeroBuffer` | `PfcDisable`, then swap queue and PG to the zero profiles    |
//!
//! Hardware failures are logged and the remaining steps of that mitigation
//! are skipped. Steps already applied are not rolled back.

use super::counters::{CounterStore, PfcWdCounters};
use super::resources::PfcWdResources;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::audit_log;
use sonic_sai::{
    AclStage, BufferPoolType, BufferProfileOid, IngressPriorityGroupOid, PortOid, QueueOid,
    QueueStat, SaiResult, SwitchApi,
};
use std::fmt;
use tracing::{error, info, warn};

/// Mitigation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKind {
    Alert,
    AclDrop,
    PfcDisable,
    ZeroBuffer,
}

impl HandlerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandlerKind::Alert => "alert",
            HandlerKind::AclDrop => "acl_drop",
            HandlerKind::PfcDisable => "pfc_disable",
            HandlerKind::ZeroBuffer => "zero_buffer",
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The queue a handler acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerContext {
    pub port_id: PortOid,
    pub queue_id: QueueOid,
    pub tc: u8,
    /// Ingress priority group of the same traffic class, if the port has one.
    pub pg_id: Option<IngressPriorityGroupOid>,
}

/// What handlers need from their owner while starting or restoring.
pub struct HandlerEnv<'a> {
    pub sai: &'a dyn SwitchApi,
    pub counters: &'a CounterStore,
    pub resources: &'a mut PfcWdResources,
}

/// Live mitigation of one stormed queue.
#[derive(Debug)]
pub struct PfcWdHandler {
    ctx: HandlerContext,
    kind: HandlerKind,
    entry_counters: PfcWdCounters,
    original_queue_profile: Option<BufferProfileOid>,
    original_pg_profile: Option<BufferProfileOid>,
}

impl PfcWdHandler {
    /// Records the storm and applies the mitigation.
    pub fn start(kind: HandlerKind, ctx: HandlerContext, env: &mut HandlerEnv<'_>) -> Self {
        let queue = ctx.queue_id.to_sai_string();
        info!(
            queue = %queue,
            port = %ctx.port_id.to_sai_string(),
            tc = ctx.tc,
            handler = %kind,
            "PFC watchdog detected PFC storm"
        );

        let mut counters = env.counters.read_counters(ctx.queue_id);
        snapshot_tx(env.sai, ctx.queue_id, &mut counters);
        counters.detect_count += 1;
        counters.operational = false;
        env.counters.write_counters(ctx.queue_id, &counters);

        let mut handler = Self {
            ctx,
            kind,
            entry_counters: counters,
            original_queue_profile: None,
            original_pg_profile: None,
        };

        match kind {
            HandlerKind::Alert => {}
            HandlerKind::AclDrop => handler.start_acl_drop(env),
            HandlerKind::PfcDisable => {
                handler.start_pfc_disable(env);
            }
            HandlerKind::ZeroBuffer => {
                if handler.start_pfc_disable(env) {
                    handler.start_zero_buffer(env);
                }
            }
        }

        audit_log!(AuditRecord::new(AuditCategory::PfcStorm, "PfcWdHandler", "storm_detected")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(queue)
            .with_object_type("pfc_wd_queue")
            .with_details(serde_json::json!({
                "port": ctx.port_id.to_sai_string(),
                "tc": ctx.tc,
                "handler": kind.as_str(),
                "detect_count": counters.detect_count,
            })));

        handler
    }

    /// Reverts the mitigation and records the restoration.
    pub fn restore(self, env: &mut HandlerEnv<'_>) {
        match self.kind {
            HandlerKind::Alert => {}
            HandlerKind::AclDrop => self.restore_acl_drop(env),
            HandlerKind::PfcDisable => self.restore_pfc_disable(env),
            HandlerKind::ZeroBuffer => {
                self.restore_zero_buffer(env);
                self.restore_pfc_disable(env);
            }
        }

        let queue = self.ctx.queue_id.to_sai_string();
        let mut counters = env.counters.read_counters(self.ctx.queue_id);
        snapshot_tx(env.sai, self.ctx.queue_id, &mut counters);
        info!(
            queue = %queue,
            port = %self.ctx.port_id.to_sai_string(),
            tx_packets = counters.tx_pkt.saturating_sub(self.entry_counters.tx_pkt),
            dropped_packets = counters.tx_drop_pkt.saturating_sub(self.entry_counters.tx_drop_pkt),
            "Queue restored from PFC storm"
        );

        counters.restore_count += 1;
        counters.operational = true;
        env.counters.write_counters(self.ctx.queue_id, &counters);

        audit_log!(AuditRecord::new(AuditCategory::PfcStorm, "PfcWdHandler", "storm_restored")
            .with_outcome(AuditOutcome::Success)
            .with_object_id(queue)
            .with_object_type("pfc_wd_queue")
            .with_details(serde_json::json!({
                "port": self.ctx.port_id.to_sai_string(),
                "tc": self.ctx.tc,
                "handler": self.kind.as_str(),
                "restore_count": counters.restore_count,
            })));
    }

    pub fn kind(&self) -> HandlerKind {
        self.kind
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    /// Queue profile saved before the zero profile was applied.
    pub fn original_queue_profile(&self) -> Option<BufferProfileOid> {
        self.original_queue_profile
    }

    /// PG profile saved before the zero profile was applied.
    pub fn original_pg_profile(&self) -> Option<BufferProfileOid> {
        self.original_pg_profile
    }

    fn start_acl_drop(&self, env: &mut HandlerEnv<'_>) {
        for stage in [AclStage::Ingress, AclStage::Egress] {
            if let Err(e) = env
                .resources
                .acl
                .acquire(env.sai, self.ctx.tc, stage, self.ctx.port_id)
            {
                error!(
                    port = %self.ctx.port_id.to_sai_string(),
                    tc = self.ctx.tc,
                    stage = stage.as_str(),
                    error = %e,
                    "Failed to apply PFC watchdog ACL drop"
                );
            }
        }
    }

    fn restore_acl_drop(&self, env: &mut HandlerEnv<'_>) {
        for stage in [AclStage::Ingress, AclStage::Egress] {
            if let Err(e) = env
                .resources
                .acl
                .release(env.sai, self.ctx.tc, stage, self.ctx.port_id)
            {
                error!(
                    port = %self.ctx.port_id.to_sai_string(),
                    tc = self.ctx.tc,
                    stage = stage.as_str(),
                    error = %e,
                    "Failed to unbind PFC watchdog ACL table"
                );
            }
        }
    }

    /// Returns false if the PFC mask could not be updated.
    fn start_pfc_disable(&self, env: &HandlerEnv<'_>) -> bool {
        let bit = 1u8 << self.ctx.tc;
        let result = env
            .sai
            .get_pfc_mask(self.ctx.port_id)
            .and_then(|mask| env.sai.set_pfc_mask(self.ctx.port_id, mask & !bit));
        if let Err(e) = result {
            error!(
                port = %self.ctx.port_id.to_sai_string(),
                tc = self.ctx.tc,
                error = %e,
                "Failed to disable PFC on storming queue"
            );
            return false;
        }
        true
    }

    fn restore_pfc_disable(&self, env: &HandlerEnv<'_>) {
        let bit = 1u8 << self.ctx.tc;
        let result = env
            .sai
            .get_pfc_mask(self.ctx.port_id)
            .and_then(|mask| env.sai.set_pfc_mask(self.ctx.port_id, mask | bit));
        if let Err(e) = result {
            error!(
                port = %self.ctx.port_id.to_sai_string(),
                tc = self.ctx.tc,
                error = %e,
                "Failed to re-enable PFC on restored queue"
            );
        }
    }

    fn start_zero_buffer(&mut self, env: &mut HandlerEnv<'_>) {
        let queue = self.ctx.queue_id;
        let original = match swap_profile(
            env,
            BufferPoolType::Egress,
            |sai| sai.get_queue_buffer_profile(queue),
            |sai, profile| sai.set_queue_buffer_profile(queue, profile),
        ) {
            Ok(original) => original,
            Err(e) => {
                error!(queue = %queue.to_sai_string(), error = %e, "Failed to apply zero buffer profile to queue");
                return;
            }
        };
        self.original_queue_profile = Some(original);

        let Some(pg) = self.ctx.pg_id else {
            error!(
                port = %self.ctx.port_id.to_sai_string(),
                tc = self.ctx.tc,
                "Port has no priority group for traffic class"
            );
            return;
        };
        match swap_profile(
            env,
            BufferPoolType::Ingress,
            |sai| sai.get_pg_buffer_profile(pg),
            |sai, profile| sai.set_pg_buffer_profile(pg, profile),
        ) {
            Ok(original) => self.original_pg_profile = Some(original),
            Err(e) => {
                error!(pg = %pg.to_sai_string(), error = %e, "Failed to apply zero buffer profile to priority group");
            }
        }
    }

    /// Puts back the saved profiles. The queue and the PG are restored
    /// independently so a failure on one does not strand the other.
    fn restore_zero_buffer(&self, env: &HandlerEnv<'_>) {
        if let Some(profile) = self.original_queue_profile {
            if let Err(e) = env
                .sai
                .set_queue_buffer_profile(self.ctx.queue_id, profile)
            {
                error!(queue = %self.ctx.queue_id.to_sai_string(), error = %e, "Failed to restore queue buffer profile");
            }
        }
        if let (Some(pg), Some(profile)) = (self.ctx.pg_id, self.original_pg_profile) {
            if let Err(e) = env.sai.set_pg_buffer_profile(pg, profile) {
                error!(pg = %pg.to_sai_string(), error = %e, "Failed to restore priority group buffer profile");
            }
        }
    }
}

/// Reads the current profile, applies the zero profile of `direction`, and
/// returns the profile that was replaced. Nothing is saved unless the write
/// succeeded.
fn swap_profile(
    env: &mut HandlerEnv<'_>,
    direction: BufferPoolType,
    get: impl FnOnce(&dyn SwitchApi) -> SaiResult<BufferProfileOid>,
    set: impl FnOnce(&dyn SwitchApi, BufferProfileOid) -> SaiResult<()>,
) -> SaiResult<BufferProfileOid> {
    let original = get(env.sai)?;
    let zero = env.resources.zero_buffer.get_or_create(env.sai, direction)?;
    set(env.sai, zero)?;
    Ok(original)
}

/// Replaces the stored tx counters with a hardware read when one succeeds.
fn snapshot_tx(sai: &dyn SwitchApi, queue: QueueOid, counters: &mut PfcWdCounters) {
    match sai.get_queue_stats(queue, &[QueueStat::Packets, QueueStat::DroppedPackets]) {
        Ok(values) if values.len() == 2 => {
            counters.tx_pkt = values[0];
            counters.tx_drop_pkt = values[1];
        }
        Ok(_) => {}
        Err(e) => {
            warn!(queue = %queue.to_sai_string(), error = %e, "Failed to read queue counters");
        }
    }
}
