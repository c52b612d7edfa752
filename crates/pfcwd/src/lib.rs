//! SONiC PFC watchdog orchestration.
//!
//! Detects nothing by itself: an external detector polls the counters this
//! crate registers and publishes `storm` / `restore` events per queue. This
//! crate turns port configuration into those registrations and applies (and
//! later reverts) the configured mitigation when a queue storms.
//!
//! ```text
//! CONFIG_DB:PFC_WD ──> PfcWdOrch ──> PfcWdEngine ──> PFC_WD_DB:PFC_WD_STATE_TABLE
//!                                        │   ▲                (polling metadata)
//!                                        │   └── COUNTERS_DB "PFC_WD" channel
//!                                        ▼                    (storm / restore)
//!                                  PfcWdHandler ──> SAI (PFC mask, buffers, ACL)
//!                                        └──────> COUNTERS_DB:COUNTERS
//! ```
//!
//! # Key Components
//!
//! - [`pfcwd::PfcWdOrch`]: configuration parsing and dispatch
//! - [`pfcwd::PfcWdEngine`]: per-queue state machine
//! - [`pfcwd::PfcWdHandler`]: mitigation strategies
//! - [`pfcwd::PfcWdResources`]: shared ACL tables and zero buffer profiles
//! - [`daemon::OrchDaemon`]: event loop
//! - [`vs::VirtualSwitch`]: in-memory switch and port inventory

pub mod audit;
pub mod daemon;
pub mod pfcwd;
pub mod ports;
pub mod vs;
