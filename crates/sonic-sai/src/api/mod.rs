//! Switch control interfaces.
//!
//! Each submodule defines the slice of one SAI API the watchdog drives:
//!
//! - [`port`]: PFC enable mask and port statistics ids
//! - [`queue`]: queue buffer profile, queue statistics and attribute ids
//! - [`buffer`]: buffer pools, buffer profiles and priority groups
//! - [`acl`]: ACL tables, entries and port bindings
//!
//! The traits take `&self` and are `Send + Sync`; implementations own their
//! interior mutability.

pub mod acl;
pub mod buffer;
pub mod port;
pub mod queue;

pub use acl::{AclApi, AclEntryConfig, AclPacketAction, AclStage, AclTableConfig};
pub use buffer::{BufferApi, BufferPoolConfig, BufferPoolType, BufferProfileConfig, ThresholdMode};
pub use port::{PortApi, PortStat};
pub use queue::{QueueApi, QueueAttr, QueueStat};

/// Everything the watchdog needs from a switch, as one object.
pub trait SwitchApi: PortApi + QueueApi + BufferApi + AclApi {}

impl<T> SwitchApi for T where T: PortApi + QueueApi + BufferApi + AclApi {}
