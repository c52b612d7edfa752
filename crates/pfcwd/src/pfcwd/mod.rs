//! PfcWdOrch - Priority Flow Control watchdog.
//!
//! A PFC storm is a queue that stays paused by its peer long enough to
//! suggest a deadlock. An external detector polls the counters published
//! here and reports `storm`/`restore` per queue; this module applies and
//! reverts the configured mitigation.
//!
//! - [`types`]: configuration parsing and errors
//! - [`counters`]: per-queue counters in the `COUNTERS` table
//! - [`resources`]: shared ACL tables and zero buffer profiles
//! - [`handler`]: the mitigation variants
//! - [`engine`]: per-queue state and the storm/restore state machine
//! - [`orch`]: the `Orch` consuming the `PFC_WD` table and notifications

pub mod counters;
pub mod engine;
pub mod handler;
pub mod orch;
pub mod resources;
pub mod types;

pub use counters::{CounterStore, PfcWdCounters};
pub use engine::{EngineProfile, NotificationOutcome, PfcWdEngine, PfcWdQueueEntry};
pub use handler::{HandlerContext, HandlerEnv, HandlerKind, PfcWdHandler};
pub use orch::{
    PfcWdOrch, PfcWdOrchConfig, PfcWdOrchStats, COUNTERS_TABLE, PFC_WD_NOTIFICATION_CHANNEL,
    PFC_WD_STATE_TABLE, PFC_WD_TABLE,
};
pub use resources::{AclTableRegistry, PfcWdResources, ZeroBufferProfiles};
pub use types::{
    DetectionTime, PfcWdAction, PfcWdConfig, PfcWdConfigError, PfcWdError, RestorationTime,
};
