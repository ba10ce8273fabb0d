//! In-memory store.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use uuid::Uuid;

use super::{HookStore, StoreError, UNDELIVERED_PAGE_SIZE};
use crate::model::{HookStatus, HookTask, NewHookTask, Webhook};

#[derive(Debug, Default)]
pub(super) struct Tables {
    pub webhooks: BTreeMap<i64, Webhook>,
    pub tasks: BTreeMap<i64, HookTask>,
}

impl Tables {
    fn next_id<V>(table: &BTreeMap<i64, V>) -> i64 {
        table.last_key_value().map_or(1, |(id, _)| id + 1)
    }
}

/// Keeps every table behind one mutex.
///
/// No lock is held across an await point.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn from_tables(tables: Tables) -> Self {
        Self {
            tables: Mutex::new(tables),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Copies of all rows, in id order.
    pub(super) fn snapshot(&self) -> Result<(Vec<Webhook>, Vec<HookTask>), StoreError> {
        let tables = self.lock()?;
        Ok((
            tables.webhooks.values().cloned().collect(),
            tables.tasks.values().cloned().collect(),
        ))
    }

    pub(super) fn webhook(&self, id: i64) -> Result<Webhook, StoreError> {
        self.lock()?
            .webhooks
            .get(&id)
            .cloned()
            .ok_or(StoreError::WebhookNotFound(id))
    }

    pub(super) fn put_webhook(&self, mut webhook: Webhook) -> Result<Webhook, StoreError> {
        let mut tables = self.lock()?;
        if webhook.id == 0 {
            webhook.id = Tables::next_id(&tables.webhooks);
        }
        tables.webhooks.insert(webhook.id, webhook.clone());
        Ok(webhook)
    }

    pub(super) fn new_task(&self, task: NewHookTask) -> Result<HookTask, StoreError> {
        let mut tables = self.lock()?;
        let id = Tables::next_id(&tables.tasks);
        let task = task.into_task(id, Uuid::new_v4().to_string());
        tables.tasks.insert(id, task.clone());
        Ok(task)
    }

    pub(super) fn task(&self, id: i64) -> Result<HookTask, StoreError> {
        self.lock()?
            .tasks
            .get(&id)
            .cloned()
            .ok_or(StoreError::TaskNotFound(id))
    }

    pub(super) fn task_by_uuid(&self, hook_id: i64, uuid: &str) -> Result<HookTask, StoreError> {
        self.lock()?
            .tasks
            .values()
            .find(|t| t.hook_id == hook_id && t.uuid == uuid)
            .cloned()
            .ok_or_else(|| StoreError::TaskUuidNotFound {
                hook_id,
                uuid: uuid.to_string(),
            })
    }

    pub(super) fn claim(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.lock()?;
        let task = tables
            .tasks
            .get_mut(&id)
            .ok_or(StoreError::TaskNotFound(id))?;
        if task.is_delivered {
            return Ok(false);
        }
        task.is_delivered = true;
        Ok(true)
    }

    pub(super) fn replace_task(&self, task: &HookTask) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let slot = tables
            .tasks
            .get_mut(&task.id)
            .ok_or(StoreError::TaskNotFound(task.id))?;
        *slot = task.clone();
        Ok(())
    }

    pub(super) fn undelivered_ids(&self, lower_id: i64) -> Result<Vec<i64>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .tasks
            .range(lower_id.saturating_add(1)..)
            .filter(|(_, t)| !t.is_delivered)
            .map(|(id, _)| *id)
            .take(UNDELIVERED_PAGE_SIZE)
            .collect())
    }

    pub(super) fn unfinalized_ids(&self) -> Result<Vec<i64>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .tasks
            .values()
            .filter(|t| t.is_unfinalized())
            .map(|t| t.id)
            .collect())
    }

    pub(super) fn set_last_status(&self, hook_id: i64, status: HookStatus) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        let webhook = tables
            .webhooks
            .get_mut(&hook_id)
            .ok_or(StoreError::WebhookNotFound(hook_id))?;
        webhook.last_status = status;
        Ok(())
    }
}

impl HookStore for MemoryStore {
    async fn get_webhook(&self, id: i64) -> Result<Webhook, StoreError> {
        self.webhook(id)
    }

    async fn insert_webhook(&self, webhook: Webhook) -> Result<Webhook, StoreError> {
        self.put_webhook(webhook)
    }

    async fn create_task(&self, task: NewHookTask) -> Result<HookTask, StoreError> {
        self.new_task(task)
    }

    async fn get_task(&self, id: i64) -> Result<HookTask, StoreError> {
        self.task(id)
    }

    async fn find_task_by_uuid(&self, hook_id: i64, uuid: &str) -> Result<HookTask, StoreError> {
        self.task_by_uuid(hook_id, uuid)
    }

    async fn mark_task_delivered(&self, id: i64) -> Result<bool, StoreError> {
        self.claim(id)
    }

    async fn update_task(&self, task: &HookTask) -> Result<(), StoreError> {
        self.replace_task(task)
    }

    async fn find_undelivered_task_ids(&self, lower_id: i64) -> Result<Vec<i64>, StoreError> {
        self.undelivered_ids(lower_id)
    }

    async fn find_unfinalized_task_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.unfinalized_ids()
    }

    async fn update_webhook_last_status(
        &self,
        hook_id: i64,
        status: HookStatus,
    ) -> Result<(), StoreError> {
        self.set_last_status(hook_id, status)
    }
}
