//! Persistence of webhooks and hook tasks.
//!
//! The engine only talks to [`HookStore`]. Two implementations ship with
//! the crate: [`MemoryStore`] for tests and embedding, and [`FileStore`],
//! which keeps the same tables in a JSON file that several processes may
//! share.

mod file;
mod memory;

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::future::Future;
use std::io;

use thiserror::Error;

use crate::model::{HookStatus, HookTask, NewHookTask, Webhook};

/// Number of ids returned by one [`HookStore::find_undelivered_task_ids`] page.
pub const UNDELIVERED_PAGE_SIZE: usize = 100;

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("webhook {0} does not exist")]
    WebhookNotFound(i64),

    #[error("hook task {0} does not exist")]
    TaskNotFound(i64),

    #[error("hook task {uuid} of webhook {hook_id} does not exist")]
    TaskUuidNotFound { hook_id: i64, uuid: String },

    /// A thread panicked while holding the table lock.
    #[error("store lock poisoned")]
    Poisoned,

    #[error("failed to read store file: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write store file: {0}")]
    Write(#[source] io::Error),

    /// The advisory lock guarding store writes could not be taken.
    #[error("failed to lock store file: {0}")]
    Lock(#[source] io::Error),

    #[error("failed to serialize store: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The store file exists but cannot be used.
    #[error("store file is corrupted: {reason}")]
    Corrupted { reason: String },

    #[error("store task failed: {0}")]
    Join(String),
}

/// Storage for webhooks and their tasks.
///
/// [`mark_task_delivered`](Self::mark_task_delivered) is the single
/// serialization point of delivery: it flips `is_delivered` from `false` to
/// `true` atomically and reports whether this caller won.
pub trait HookStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`StoreError::WebhookNotFound`] for an unknown id.
    fn get_webhook(&self, id: i64) -> impl Future<Output = Result<Webhook, StoreError>> + Send;

    /// Stores `webhook`, assigning the next id when `webhook.id` is 0.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be written.
    fn insert_webhook(
        &self,
        webhook: Webhook,
    ) -> impl Future<Output = Result<Webhook, StoreError>> + Send;

    /// Creates a pending task with a fresh id and v4 uuid.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be written.
    fn create_task(
        &self,
        task: NewHookTask,
    ) -> impl Future<Output = Result<HookTask, StoreError>> + Send;

    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown id.
    fn get_task(&self, id: i64) -> impl Future<Output = Result<HookTask, StoreError>> + Send;

    /// # Errors
    ///
    /// Returns [`StoreError::TaskUuidNotFound`] when no task of `hook_id`
    /// has `uuid`.
    fn find_task_by_uuid(
        &self,
        hook_id: i64,
        uuid: &str,
    ) -> impl Future<Output = Result<HookTask, StoreError>> + Send;

    /// Claims the task: `true` when this call flipped `is_delivered`,
    /// `false` when it was already set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown id.
    fn mark_task_delivered(&self, id: i64)
    -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Replaces the stored task with the same id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] for an unknown id.
    fn update_task(&self, task: &HookTask) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Ids of undelivered tasks above `lower_id`, ascending, at most
    /// [`UNDELIVERED_PAGE_SIZE`].
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn find_undelivered_task_ids(
        &self,
        lower_id: i64,
    ) -> impl Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// Ids of tasks that were claimed but never completed.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot be read.
    fn find_unfinalized_task_ids(&self) -> impl Future<Output = Result<Vec<i64>, StoreError>> + Send;

    /// # Errors
    ///
    /// Returns [`StoreError::WebhookNotFound`] for an unknown id.
    fn update_webhook_last_status(
        &self,
        hook_id: i64,
        status: HookStatus,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
