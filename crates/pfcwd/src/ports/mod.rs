//! Port inventory as seen by the watchdog.
//!
//! Port creation and queue/PG discovery belong to the port orchestrator. The
//! watchdog only resolves an alias to a [`Port`] and waits until the
//! inventory reports that initialization is complete.

mod port;

pub use port::{Port, PortInventory, PortType};
