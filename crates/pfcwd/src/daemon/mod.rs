//! Daemon event loop.

mod orchdaemon;

pub use orchdaemon::{DaemonEvent, OrchDaemon, OrchDaemonConfig};
