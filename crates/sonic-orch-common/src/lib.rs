//! Common orchestration abstractions for SONiC.
//!
//! This crate provides the plumbing shared by orchestration agents:
//!
//! - [`Orch`]: Base trait for orchestration agents
//! - [`Consumer`]: Arrival-ordered queue of table records awaiting processing
//! - [`Table`]: Key to field/value store (Redis hash table or [`MemoryTable`])
//! - [`Notification`]: Message received on a notification channel
//!
//! # Architecture
//!
//! 1. Configuration changes are written to Redis (CONFIG_DB)
//! 2. A subscriber turns them into [`KeyOpFieldsValues`] records
//! 3. The daemon event loop hands records to the owning Orch's consumer
//! 4. Orchs translate configuration into SAI calls
//! 5. State is written back through [`Table`]s (COUNTERS_DB, PFC_WD_DB)

mod consumer;
mod notification;
mod orch;
mod table;

#[cfg(feature = "redis")]
pub mod redis_backend;

pub use consumer::{Consumer, ConsumerConfig, FieldValue, KeyOpFieldsValues, Operation};
pub use notification::{Notification, NotificationError};
pub use orch::Orch;
pub use table::{MemoryTable, Table, TableError, TableResult};
