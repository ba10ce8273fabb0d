//! Application execution logic.
//!
//! This module opens the store and either runs the delivery engine until a
//! shutdown signal arrives, or delivers a single submitted or replayed task.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use forge_hooks::config::ValidatedConfig;
use forge_hooks::delivery::{
    Deliverer, DeliveryError, DeliveryOutcome, Engine, EngineError, SkipReason, replay_hook_task,
};
use forge_hooks::model::{HookEventType, HookTask, NewHookTask};
use forge_hooks::repo::{GitCliReader, RepositoryReader};
use forge_hooks::store::{FileStore, HookStore, StoreError};
use forge_hooks::transport::HttpClient;

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;

/// Error type for runtime execution failures.
#[derive(Debug, Error)]
pub enum RunError {
    /// The store could not be opened, read or written.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The delivery engine could not be started.
    #[error("Failed to start delivery engine: {0}")]
    Engine(#[from] EngineError),

    /// A single delivery could not even be attempted.
    #[error("Failed to deliver task: {0}")]
    Delivery(#[from] DeliveryError),

    /// Failed to read the payload file of `submit`.
    #[error("Failed to read payload file '{}': {source}", path.display())]
    PayloadRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The payload file of `submit` is not JSON.
    #[error("Payload file '{}' is not valid JSON: {source}", path.display())]
    PayloadParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The single delivery was attempted and failed.
    #[error("Delivery of task {task_id} failed")]
    DeliveryFailed { task_id: i64 },
}

/// What to do once the store is open.
#[derive(Debug)]
pub enum Action {
    /// Deliver pending tasks until interrupted.
    Serve,
    /// Copy task `uuid` of webhook `hook_id` and deliver the copy.
    Replay { hook_id: i64, uuid: String },
    /// Create a task from a payload file and deliver it.
    Submit {
        hook_id: i64,
        event: HookEventType,
        payload: PathBuf,
        legacy: bool,
    },
}

/// Executes `action` against the configured store.
///
/// # Errors
///
/// Returns an error if:
/// - The store cannot be opened
/// - The engine or the HTTP client cannot be built
/// - A submitted payload cannot be read, or its webhook does not exist
/// - A single delivery fails
pub async fn execute(config: ValidatedConfig, action: Action) -> Result<(), RunError> {
    let store = Arc::new(FileStore::open(&config.store_path)?);
    tracing::info!("Store: {}", store.path().display());

    let reader: Arc<dyn RepositoryReader> =
        Arc::new(GitCliReader::new(config.repository_root.clone()));

    if config.engine.deliveries_disabled {
        tracing::info!("Deliveries disabled - tasks will be recorded but not sent");
    }

    match action {
        Action::Serve => serve(&config, store, reader).await,
        Action::Replay { hook_id, uuid } => {
            let task = replay_hook_task(store.as_ref(), hook_id, &uuid).await?;
            tracing::info!("Replaying task {uuid} of webhook {hook_id} as task {}", task.id);
            let deliverer = Engine::deliverer(&config.engine, store, reader)?;
            deliver_once(&deliverer, &task).await
        }
        Action::Submit {
            hook_id,
            event,
            payload,
            legacy,
        } => {
            let task = create_task(store.as_ref(), hook_id, event, &payload, legacy).await?;
            tracing::info!("Submitted {event} task {} for webhook {hook_id}", task.id);
            let deliverer = Engine::deliverer(&config.engine, store, reader)?;
            deliver_once(&deliverer, &task).await
        }
    }
}

/// Runs the engine until a shutdown signal arrives.
async fn serve(
    config: &ValidatedConfig,
    store: Arc<FileStore>,
    reader: Arc<dyn RepositoryReader>,
) -> Result<(), RunError> {
    let engine = Engine::init(&config.engine, store, reader)?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping...");

    engine.shutdown().await;
    Ok(())
}

/// Stores a task for `hook_id` with the contents of `payload`.
async fn create_task<S: HookStore>(
    store: &S,
    hook_id: i64,
    event: HookEventType,
    payload: &Path,
    legacy: bool,
) -> Result<HookTask, RunError> {
    // Unknown webhooks fail before anything is written.
    store.get_webhook(hook_id).await?;

    let content = tokio::fs::read_to_string(payload)
        .await
        .map_err(|source| RunError::PayloadRead {
            path: payload.to_path_buf(),
            source,
        })?;
    serde_json::from_str::<serde_json::Value>(&content).map_err(|source| {
        RunError::PayloadParse {
            path: payload.to_path_buf(),
            source,
        }
    })?;

    let mut task = NewHookTask::new(hook_id, event, content);
    if legacy {
        task = task.legacy();
    }
    Ok(store.create_task(task).await?)
}

/// Delivers one task; a shutdown signal cancels the request in flight.
async fn deliver_once<S: HookStore, H: HttpClient>(
    deliverer: &Deliverer<S, H>,
    task: &HookTask,
) -> Result<(), RunError> {
    let cancel = CancellationToken::new();
    let watcher = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, cancelling delivery...");
            cancel.cancel();
        }
    });

    let outcome = deliverer.deliver(task.id, &cancel).await;
    watcher.abort();

    report(task, outcome?)
}

/// Prints the outcome of a single delivery.
fn report(task: &HookTask, outcome: DeliveryOutcome) -> Result<(), RunError> {
    let summary = match outcome {
        DeliveryOutcome::Succeeded => "delivered",
        DeliveryOutcome::Failed => "failed",
        DeliveryOutcome::AlreadyClaimed => "already claimed by another worker",
        DeliveryOutcome::Skipped(SkipReason::DeliveriesDisabled) => {
            "recorded without sending (deliveries disabled)"
        }
        DeliveryOutcome::Skipped(SkipReason::Inactive) => {
            "recorded without sending (webhook inactive)"
        }
    };
    println!("Task {} ({}): {summary}", task.id, task.uuid);

    if outcome == DeliveryOutcome::Failed {
        return Err(RunError::DeliveryFailed { task_id: task.id });
    }
    Ok(())
}

/// Returns a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
