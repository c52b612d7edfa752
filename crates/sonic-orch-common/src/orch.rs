//! Base Orch trait.

use async_trait::async_trait;

use crate::{KeyOpFieldsValues, Notification};

/// Base trait for all orchestration agents.
///
/// Each Orch module implements this trait to participate in the daemon event
/// loop. The daemon hands it table records through [`Orch::add_to_sync`],
/// notifications through [`Orch::on_notification`], and calls
/// [`Orch::do_task`] to apply whatever is queued.
///
/// # Lifecycle
///
/// 1. Construction: Orch is created with its collaborators
/// 2. Registration: Orch is registered with the daemon
/// 3. Event Loop: records, notifications and `do_task()` calls, one at a time
/// 4. Shutdown: `shutdown()` reverts anything that must not outlive the process
#[async_trait]
pub trait Orch: Send + Sync {
    /// Returns the name of this Orch (for logging and debugging).
    fn name(&self) -> &str;

    /// Processes pending records from all consumers.
    async fn do_task(&mut self);

    /// Returns the priority of this Orch (lower = higher priority).
    fn priority(&self) -> i32 {
        0
    }

    /// Queues records read from `table`. Orchs ignore tables they don't own.
    fn add_to_sync(&mut self, _table: &str, _entries: Vec<KeyOpFieldsValues>) {}

    /// Returns true if this Orch has pending work.
    fn has_pending_tasks(&self) -> bool {
        false
    }

    /// Dumps pending tasks for debugging.
    fn dump_pending_tasks(&self) -> Vec<String> {
        vec![]
    }

    /// Handles a message received on a notification channel.
    fn on_notification(&mut self, _channel: &str, _notification: &Notification) {}

    /// Called once by the daemon before it exits.
    async fn shutdown(&mut self) {}
}
