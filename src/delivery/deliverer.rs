//! One delivery attempt: claim, build, send, record.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use http::HeaderValue;
use http::header::AUTHORIZATION;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::crypto::AuthorizationCipher;
use crate::handler::HandlerRegistry;
use crate::model::{HookRequest, HookResponse, HookStatus, HookTask, Webhook};
use crate::store::{HookStore, StoreError};
use crate::time::{Clock, SystemClock};
use crate::transport::{HttpClient, HttpError, HttpRequest, header_record};

const REDACTED: &str = "******";

/// Why a claimed task was finished without a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Deliveries are switched off for the whole process.
    DeliveriesDisabled,
    /// The webhook is not active.
    Inactive,
}

/// Result of [`Deliverer::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Another worker owns the task.
    AlreadyClaimed,
    Succeeded,
    Failed,
    /// Claimed and finalized as not succeeded.
    Skipped(SkipReason),
}

/// Failures before the task was claimed.
///
/// Nothing was recorded; once a task is claimed every problem becomes a
/// [`DeliveryOutcome::Failed`] instead.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Value stored in place of an `Authorization` header.
///
/// The scheme is kept for `Bearer` and `Basic`, the credentials never.
#[must_use]
pub fn redact_authorization(value: &str) -> String {
    ["Bearer ", "Basic "]
        .into_iter()
        .find(|scheme| value.starts_with(scheme))
        .map_or_else(|| REDACTED.to_string(), |scheme| format!("{scheme}{REDACTED}"))
}

pub(super) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn failure(body: String) -> HookResponse {
    HookResponse {
        body,
        ..HookResponse::default()
    }
}

/// Delivers hook tasks.
///
/// Cheap to share behind an `Arc`; the store, client and registry are
/// process wide.
pub struct Deliverer<S, H> {
    store: Arc<S>,
    client: H,
    registry: Arc<HandlerRegistry>,
    cipher: AuthorizationCipher,
    clock: Arc<dyn Clock>,
    deliveries_disabled: bool,
}

impl<S: HookStore, H: HttpClient> Deliverer<S, H> {
    pub fn new(
        store: Arc<S>,
        client: H,
        registry: Arc<HandlerRegistry>,
        cipher: AuthorizationCipher,
    ) -> Self {
        Self {
            store,
            client,
            registry,
            cipher,
            clock: Arc::new(SystemClock),
            deliveries_disabled: false,
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub const fn with_deliveries_disabled(mut self, disabled: bool) -> Self {
        self.deliveries_disabled = disabled;
        self
    }

    #[must_use]
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Runs at most one attempt for `task_id`.
    ///
    /// The task is claimed first; a task claimed elsewhere is left alone.
    /// After a successful claim the attempt is always recorded, including
    /// when it panics or `cancel` fires during the request.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] when the task or its webhook cannot be
    /// loaded or claimed.
    pub async fn deliver(
        &self,
        task_id: i64,
        cancel: &CancellationToken,
    ) -> Result<DeliveryOutcome, DeliveryError> {
        let mut task = self.store.get_task(task_id).await?;
        let webhook = self.store.get_webhook(task.hook_id).await?;

        if !self.store.mark_task_delivered(task_id).await? {
            debug!(task_id, "Task already claimed");
            return Ok(DeliveryOutcome::AlreadyClaimed);
        }
        task.is_delivered = true;

        let attempt = AssertUnwindSafe(self.attempt(&webhook, &mut task, cancel))
            .catch_unwind()
            .await;
        let outcome = match attempt {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(
                    task_id,
                    hook_id = webhook.id,
                    url = %webhook.url,
                    panic = %message,
                    "Delivery panicked"
                );
                task.is_succeed = false;
                task.response_info = Some(failure(format!("Delivery: panic: {message}")));
                DeliveryOutcome::Failed
            }
        };

        self.finalize(&mut task).await;
        debug!(task_id, ?outcome, "Delivery finished");
        Ok(outcome)
    }

    async fn attempt(
        &self,
        webhook: &Webhook,
        task: &mut HookTask,
        cancel: &CancellationToken,
    ) -> DeliveryOutcome {
        let request = match self.build_request(webhook, task).await {
            Ok(request) => request,
            Err(message) => {
                warn!(
                    task_id = task.id,
                    hook_id = webhook.id,
                    error = %message,
                    "Cannot build request"
                );
                task.response_info = Some(failure(format!("Delivery: {message}")));
                return DeliveryOutcome::Failed;
            }
        };

        if self.deliveries_disabled {
            info!(task_id = task.id, "Deliveries disabled, skipping task");
            return DeliveryOutcome::Skipped(SkipReason::DeliveriesDisabled);
        }
        if !webhook.is_active {
            trace!(
                task_id = task.id,
                hook_id = webhook.id,
                "Webhook inactive, skipping task"
            );
            return DeliveryOutcome::Skipped(SkipReason::Inactive);
        }

        let response = tokio::select! {
            result = self.client.request(request) => result,
            () = cancel.cancelled() => Err(HttpError::Cancelled),
        };

        match response {
            Ok(response) => {
                task.is_succeed = response.is_success();
                task.response_info = Some(HookResponse {
                    status: response.status.as_u16(),
                    headers: header_record(&response.headers),
                    body: response.body_lossy(),
                });
                if task.is_succeed {
                    DeliveryOutcome::Succeeded
                } else {
                    DeliveryOutcome::Failed
                }
            }
            Err(e) => {
                warn!(task_id = task.id, url = %webhook.url, error = %e, "Delivery failed");
                let body = match e {
                    HttpError::ReadBody(_) => e.to_string(),
                    other => format!("Delivery: {other}"),
                };
                task.response_info = Some(failure(body));
                DeliveryOutcome::Failed
            }
        }
    }

    /// Builds the request and records it on `task` with credentials redacted.
    async fn build_request(
        &self,
        webhook: &Webhook,
        task: &mut HookTask,
    ) -> Result<HttpRequest, String> {
        let handler = self
            .registry
            .resolve(webhook, task)
            .map_err(|e| e.to_string())?;
        let mut request = handler
            .new_request(webhook, task)
            .await
            .map_err(|e| e.to_string())?;

        let mut record = HookRequest {
            url: request.url.to_string(),
            http_method: request.method.to_string(),
            headers: header_record(&request.headers),
            body: String::from_utf8_lossy(request.body_bytes()).into_owned(),
        };

        if !webhook.header_authorization_encrypted.is_empty() {
            let authorization = self
                .cipher
                .decrypt(&webhook.header_authorization_encrypted)
                .map_err(|e| format!("authorization header: {e}"))?;
            let value = HeaderValue::from_str(&authorization)
                .map_err(|e| format!("authorization header: {e}"))?;
            request.headers.insert(AUTHORIZATION, value);
            record
                .headers
                .insert("Authorization".to_string(), redact_authorization(&authorization));
        }

        task.request_info = Some(record);
        Ok(request)
    }

    /// Stamps the completion time and persists the task and webhook status.
    ///
    /// Store errors are logged only.
    async fn finalize(&self, task: &mut HookTask) {
        task.delivered = Some(self.clock.now_nanos());

        if let Err(e) = self.store.update_task(task).await {
            error!(task_id = task.id, error = %e, "Failed to record delivery");
        }

        let status = if task.is_succeed {
            HookStatus::Succeed
        } else {
            HookStatus::Fail
        };
        if let Err(e) = self
            .store
            .update_webhook_last_status(task.hook_id, status)
            .await
        {
            error!(hook_id = task.hook_id, error = %e, "Failed to update webhook status");
        }
    }
}
