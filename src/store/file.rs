//! JSON file backed store.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use fs4::FileExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::memory::{MemoryStore, Tables};
use super::{HookStore, StoreError};
use crate::model::{HookStatus, HookTask, NewHookTask, Webhook};

/// Current store file format version.
///
/// Files with any other version are rejected.
const STORE_FILE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreFile {
    version: u32,

    /// Unix seconds of the write, for operators only.
    #[serde(skip_serializing_if = "Option::is_none")]
    saved_at: Option<String>,

    webhooks: Vec<Webhook>,
    tasks: Vec<HookTask>,
}

impl StoreFile {
    fn new(webhooks: Vec<Webhook>, tasks: Vec<HookTask>) -> Self {
        let saved_at = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Self {
            version: STORE_FILE_VERSION,
            saved_at: Some(saved_at.to_string()),
            webhooks,
            tasks,
        }
    }
}

/// Webhooks and tasks kept in a JSON file shared by every process that
/// opens the same path.
///
/// Each operation works on the current file contents. Changes are made
/// while holding an exclusive advisory lock on `{path}.lock`: the file is
/// read again, changed, written to `{path}.tmp` and renamed over `{path}`.
/// Readers therefore see either the old or the new state, and concurrent
/// writers (a `run` process and a `submit` command, say) never drop each
/// other's rows or hand out the same id twice.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl FileStore {
    /// Opens the store at `path`; a missing file is an empty store.
    ///
    /// Nothing is written until the first change.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Read`] when the file cannot be read and
    /// [`StoreError::Corrupted`] when it does not decode or has another
    /// format version.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        Self::load(&path)?;

        // store.json -> store.json.lock
        let lock_path = PathBuf::from(format!("{}.lock", path.display()));
        Ok(Self { path, lock_path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(content: &str) -> Result<Tables, StoreError> {
        let file: StoreFile = serde_json::from_str(content).map_err(|e| StoreError::Corrupted {
            reason: format!("invalid JSON: {e}"),
        })?;
        if file.version != STORE_FILE_VERSION {
            return Err(StoreError::Corrupted {
                reason: format!(
                    "incompatible version: expected {STORE_FILE_VERSION}, got {}",
                    file.version
                ),
            });
        }

        Ok(Tables {
            webhooks: file.webhooks.into_iter().map(|w| (w.id, w)).collect(),
            tasks: file.tasks.into_iter().map(|t| (t.id, t)).collect(),
        })
    }

    fn load(path: &Path) -> Result<MemoryStore, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(MemoryStore::from_tables(Self::decode(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "Store file not found, starting empty");
                Ok(MemoryStore::new())
            }
            Err(e) => Err(StoreError::Read(e)),
        }
    }

    fn create_parent(path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::Write)?;
            }
        }
        Ok(())
    }

    /// The returned handle holds the lock until it is dropped.
    fn lock_exclusive(path: &Path, lock_path: &Path) -> Result<File, StoreError> {
        Self::create_parent(path)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(lock_path)
            .map_err(StoreError::Lock)?;
        file.lock_exclusive().map_err(StoreError::Lock)?;
        Ok(file)
    }

    fn save_blocking(path: &Path, file: &StoreFile) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(file).map_err(StoreError::Serialize)?;

        // store.json -> store.json.tmp
        let temp_path = PathBuf::from(format!("{}.tmp", path.display()));
        std::fs::write(&temp_path, content).map_err(StoreError::Write)?;
        std::fs::rename(&temp_path, path).map_err(StoreError::Write)?;

        Ok(())
    }

    /// Runs `op` against the current file contents.
    async fn read<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryStore) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || op(&Self::load(&path)?))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Runs `op` against the current file contents under the exclusive
    /// lock and writes the result back.
    ///
    /// When `op` or the write fails the file keeps its previous state.
    async fn write<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&MemoryStore) -> Result<T, StoreError> + Send + 'static,
    {
        let path = self.path.clone();
        let lock_path = self.lock_path.clone();

        tokio::task::spawn_blocking(move || {
            let _lock = Self::lock_exclusive(&path, &lock_path)?;
            let memory = Self::load(&path)?;
            let value = op(&memory)?;

            let (webhooks, tasks) = memory.snapshot()?;
            Self::save_blocking(&path, &StoreFile::new(webhooks, tasks))?;
            trace!(path = %path.display(), "Store file written");
            Ok(value)
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

impl HookStore for FileStore {
    async fn get_webhook(&self, id: i64) -> Result<Webhook, StoreError> {
        self.read(move |memory| memory.webhook(id)).await
    }

    async fn insert_webhook(&self, webhook: Webhook) -> Result<Webhook, StoreError> {
        self.write(move |memory| memory.put_webhook(webhook)).await
    }

    async fn create_task(&self, task: NewHookTask) -> Result<HookTask, StoreError> {
        self.write(move |memory| memory.new_task(task)).await
    }

    async fn get_task(&self, id: i64) -> Result<HookTask, StoreError> {
        self.read(move |memory| memory.task(id)).await
    }

    async fn find_task_by_uuid(&self, hook_id: i64, uuid: &str) -> Result<HookTask, StoreError> {
        let uuid = uuid.to_string();
        self.read(move |memory| memory.task_by_uuid(hook_id, &uuid)).await
    }

    async fn mark_task_delivered(&self, id: i64) -> Result<bool, StoreError> {
        self.write(move |memory| memory.claim(id)).await
    }

    async fn update_task(&self, task: &HookTask) -> Result<(), StoreError> {
        let task = task.clone();
        self.write(move |memory| memory.replace_task(&task)).await
    }

    async fn find_undelivered_task_ids(&self, lower_id: i64) -> Result<Vec<i64>, StoreError> {
        self.read(move |memory| memory.undelivered_ids(lower_id)).await
    }

    async fn find_unfinalized_task_ids(&self) -> Result<Vec<i64>, StoreError> {
        self.read(MemoryStore::unfinalized_ids).await
    }

    async fn update_webhook_last_status(
        &self,
        hook_id: i64,
        status: HookStatus,
    ) -> Result<(), StoreError> {
        self.write(move |memory| memory.set_last_status(hook_id, status)).await
    }
}
