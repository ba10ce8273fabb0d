//! Engine lifecycle: dispatcher, recovery scan and operator entry points.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::deliverer::{Deliverer, panic_message};
use super::queue::{QueueError, UniqueQueue};
use crate::crypto::AuthorizationCipher;
use crate::handler::HandlerRegistry;
use crate::model::{HookTask, NewHookTask};
use crate::repo::RepositoryReader;
use crate::store::{HookStore, StoreError};
use crate::transport::{HttpClient, ReqwestClient, TransportConfig, TransportError};

/// Settings of a running engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of concurrent deliveries.
    pub workers: usize,
    /// Claim and finalize tasks without sending anything.
    pub deliveries_disabled: bool,
    /// Upper bound on waiting for in-flight deliveries at shutdown.
    pub shutdown_timeout: Duration,
    /// Pause between scans for tasks created outside this engine; `None`
    /// scans once at startup only.
    pub rescan_interval: Option<Duration>,
    pub transport: TransportConfig,
    /// Public URL of the forge, announced to CI builders.
    pub app_url: String,
    /// Key protecting stored `Authorization` values.
    pub secret_key: String,
}

/// Errors from starting or driving the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("delivery workers must be at least 1")]
    NoWorkers,

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Entry point for starting the delivery engine.
pub struct Engine;

impl Engine {
    /// Builds the shared HTTP client and handler registry and starts the
    /// engine.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when `workers` is 0 or the transport cannot
    /// be built (invalid allow-list, client construction failure).
    pub fn init<S: HookStore + 'static>(
        config: &EngineConfig,
        store: Arc<S>,
        repo: Arc<dyn RepositoryReader>,
    ) -> Result<EngineHandle<S>, EngineError> {
        if config.workers == 0 {
            return Err(EngineError::NoWorkers);
        }

        let deliverer = Self::deliverer(config, store, repo)?;
        Ok(Self::start(deliverer, config))
    }

    /// Builds a production deliverer without starting any background task.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Transport`] when the transport cannot be built.
    pub fn deliverer<S: HookStore>(
        config: &EngineConfig,
        store: Arc<S>,
        repo: Arc<dyn RepositoryReader>,
    ) -> Result<Deliverer<S, ReqwestClient>, EngineError> {
        let client = ReqwestClient::from_config(&config.transport)?;
        let registry = Arc::new(HandlerRegistry::new(repo, config.app_url.clone()));

        Ok(Deliverer::new(
            store,
            client,
            registry,
            AuthorizationCipher::new(&config.secret_key),
        )
        .with_deliveries_disabled(config.deliveries_disabled))
    }

    /// Starts the dispatcher and the recovery scan for a ready deliverer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S, H>(deliverer: Deliverer<S, H>, config: &EngineConfig) -> EngineHandle<S>
    where
        S: HookStore + 'static,
        H: HttpClient + 'static,
    {
        let store = Arc::clone(deliverer.store());
        let queue = Arc::new(UniqueQueue::new());
        let cancel = CancellationToken::new();
        let workers = config.workers.max(1);

        info!(workers, disabled = config.deliveries_disabled, "Starting delivery engine");

        let dispatcher = tokio::spawn(dispatch(
            Arc::new(deliverer),
            Arc::clone(&queue),
            workers,
            cancel.clone(),
        ));

        let (recovered_tx, recovered) = watch::channel(false);
        {
            let store = Arc::clone(&store);
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            let rescan_interval = config.rescan_interval;
            tokio::spawn(async move {
                if let Err(e) = populate_queue(store.as_ref(), &queue, &cancel).await {
                    error!(error = %e, "Recovery scan failed");
                }
                recovered_tx.send_replace(true);

                if let Some(interval) = rescan_interval {
                    rescan(store.as_ref(), &queue, interval, &cancel).await;
                }
            });
        }

        EngineHandle {
            store,
            queue,
            cancel,
            dispatcher,
            recovered,
            shutdown_timeout: config.shutdown_timeout,
        }
    }
}

/// A running engine.
///
/// Dropping the handle without [`shutdown`](Self::shutdown) leaves the
/// dispatcher running until the runtime stops.
pub struct EngineHandle<S> {
    store: Arc<S>,
    queue: Arc<UniqueQueue>,
    cancel: CancellationToken,
    dispatcher: JoinHandle<()>,
    recovered: watch::Receiver<bool>,
    shutdown_timeout: Duration,
}

impl<S: HookStore + 'static> EngineHandle<S> {
    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    #[must_use]
    pub fn queue(&self) -> &UniqueQueue {
        &self.queue
    }

    /// Queues an existing task; `Ok(false)` when it is already queued or
    /// in flight.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after shutdown started.
    pub fn enqueue(&self, task_id: i64) -> Result<bool, QueueError> {
        self.queue.push(task_id)
    }

    /// Stores a new task and queues it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the store write fails or the queue is
    /// closed. A stored but unqueued task is picked up by the next
    /// recovery scan.
    pub async fn submit(&self, task: NewHookTask) -> Result<HookTask, EngineError> {
        let task = self.store.create_task(task).await?;
        debug!(task_id = task.id, hook_id = task.hook_id, event = %task.event_type, "Task created");
        self.queue.push(task.id)?;
        Ok(task)
    }

    /// Re-creates the task `uuid` of webhook `hook_id` and queues the copy.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the task does not exist, the store write
    /// fails or the queue is closed.
    pub async fn replay(&self, hook_id: i64, uuid: &str) -> Result<HookTask, EngineError> {
        let task = replay_hook_task(self.store.as_ref(), hook_id, uuid).await?;
        info!(hook_id, uuid, task_id = task.id, "Task replayed");
        self.queue.push(task.id)?;
        Ok(task)
    }

    /// Waits for the recovery scan and then until nothing is queued or in
    /// flight.
    pub async fn wait_idle(&self) {
        let mut recovered = self.recovered.clone();
        // Err means the scan task is gone, which also ends the wait.
        let _ = recovered.wait_for(|done| *done).await;
        self.queue.wait_idle().await;
    }

    /// Stops pulling new work, cancels in-flight requests and waits for
    /// their outcomes to be recorded, at most the shutdown timeout.
    pub async fn shutdown(self) {
        info!("Stopping delivery engine");
        self.cancel.cancel();
        self.queue.close();

        match tokio::time::timeout(self.shutdown_timeout, self.dispatcher).await {
            Ok(Ok(())) => info!("Delivery engine stopped"),
            Ok(Err(e)) => error!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                pending = self.queue.len(),
                "Shutdown timed out with deliveries in flight"
            ),
        }
    }
}

/// Pulls ids and runs each delivery on its own task, at most `workers` at a
/// time. Returns after cancellation once in-flight deliveries finished.
async fn dispatch<S, H>(
    deliverer: Arc<Deliverer<S, H>>,
    queue: Arc<UniqueQueue>,
    workers: usize,
    cancel: CancellationToken,
) where
    S: HookStore + 'static,
    H: HttpClient + 'static,
{
    let permits = Arc::new(Semaphore::new(workers));
    let mut running = JoinSet::new();

    loop {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let task_id = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            id = queue.pop() => match id {
                Some(id) => id,
                None => break,
            },
        };

        while let Some(finished) = running.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "Delivery task failed");
            }
        }

        let deliverer = Arc::clone(&deliverer);
        let queue = Arc::clone(&queue);
        let cancel = cancel.clone();
        running.spawn(async move {
            let _permit = permit;
            run_isolated(&deliverer, task_id, &cancel).await;
            queue.done(task_id);
        });
    }

    debug!(in_flight = running.len(), "Dispatcher stopping");
    while let Some(finished) = running.join_next().await {
        if let Err(e) = finished {
            error!(error = %e, "Delivery task failed");
        }
    }
}

/// Runs one delivery; errors and panics are logged and never escape.
async fn run_isolated<S: HookStore, H: HttpClient>(
    deliverer: &Deliverer<S, H>,
    task_id: i64,
    cancel: &CancellationToken,
) {
    match AssertUnwindSafe(deliverer.deliver(task_id, cancel))
        .catch_unwind()
        .await
    {
        Ok(Ok(_)) => {}
        Ok(Err(e)) => error!(task_id, error = %e, "Cannot deliver task"),
        Err(panic) => {
            error!(task_id, panic = %panic_message(panic.as_ref()), "Delivery worker panicked");
        }
    }
}

/// Queues every undelivered task, page by page.
///
/// Tasks that were claimed but never finished are listed in the log and
/// left alone; an operator can replay them. A cancelled scan stops early
/// with a warning.
///
/// # Errors
///
/// Returns [`StoreError`] when a page cannot be read.
pub async fn populate_queue<S: HookStore>(
    store: &S,
    queue: &UniqueQueue,
    cancel: &CancellationToken,
) -> Result<usize, StoreError> {
    match store.find_unfinalized_task_ids().await {
        Ok(stuck) if !stuck.is_empty() => warn!(
            count = stuck.len(),
            task_ids = ?stuck,
            "Tasks were claimed but never finished; replay them to deliver again"
        ),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Cannot list unfinished tasks"),
    }

    let queued = queue_undelivered(store, queue, cancel).await?;
    info!(queued, "Recovery scan finished");
    Ok(queued)
}

/// Walks the undelivered pages and queues every id not already queued or
/// in flight.
async fn queue_undelivered<S: HookStore>(
    store: &S,
    queue: &UniqueQueue,
    cancel: &CancellationToken,
) -> Result<usize, StoreError> {
    let mut lower_id = 0;
    let mut queued = 0;
    loop {
        if cancel.is_cancelled() {
            warn!(lower_id, queued, "Task scan cancelled before finishing");
            return Ok(queued);
        }

        let ids = store.find_undelivered_task_ids(lower_id).await?;
        let Some(&last) = ids.last() else {
            break;
        };

        for id in ids {
            match queue.push(id) {
                Ok(true) => queued += 1,
                Ok(false) => {}
                Err(QueueError::Closed) => {
                    warn!(lower_id, queued, "Queue closed during task scan");
                    return Ok(queued);
                }
            }
        }
        lower_id = last;
    }
    Ok(queued)
}

/// Repeats the undelivered scan every `interval` until cancelled, so tasks
/// written by other processes sharing the store get delivered.
async fn rescan<S: HookStore>(
    store: &S,
    queue: &UniqueQueue,
    interval: Duration,
    cancel: &CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(interval) => {}
        }

        match queue_undelivered(store, queue, cancel).await {
            Ok(0) => {}
            Ok(queued) => info!(queued, "Queued tasks found by rescan"),
            Err(e) => warn!(error = %e, "Task rescan failed"),
        }
    }
}

/// Creates a fresh copy of the task `uuid` of webhook `hook_id`.
///
/// The copy has a new id and uuid and the same event type, payload and
/// payload version.
///
/// # Errors
///
/// Returns [`StoreError::TaskUuidNotFound`] when there is no such task.
pub async fn replay_hook_task<S: HookStore>(
    store: &S,
    hook_id: i64,
    uuid: &str,
) -> Result<HookTask, StoreError> {
    let original = store.find_task_by_uuid(hook_id, uuid).await?;
    store.create_task(NewHookTask::from(&original)).await
}
