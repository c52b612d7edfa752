//! Safe Rust view of the SAI (Switch Abstraction Interface) surface used by
//! the PFC watchdog.
//!
//! - [`types`]: type-safe object ids and their `oid:0x..` wire form
//! - [`error`]: the [`SaiError`] type
//! - [`api`]: the port, queue, buffer and ACL interfaces the watchdog calls,
//!   combined as [`SwitchApi`]
//!
//! The traits are implemented by whatever talks to the ASIC (sairedis, a
//! vendor SDK, or an in-memory virtual switch).

pub mod api;
pub mod error;
pub mod types;

pub use api::{
    AclApi, AclEntryConfig, AclPacketAction, AclStage, AclTableConfig, BufferApi,
    BufferPoolConfig, BufferPoolType, BufferProfileConfig, PortApi, PortStat, QueueApi, QueueAttr,
    QueueStat, SwitchApi, ThresholdMode,
};
pub use error::{SaiError, SaiResult};
pub use types::{
    AclEntryKind, AclEntryOid, AclTableKind, AclTableOid, BufferPoolKind, BufferPoolOid,
    BufferProfileKind, BufferProfileOid, IngressPriorityGroupKind, IngressPriorityGroupOid,
    PortKind, PortOid, QueueKind, QueueOid, RawSaiObjectId, SaiObjectId, SaiObjectKind,
    SwitchKind, SwitchOid,
};
