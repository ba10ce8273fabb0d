//! Provider adapters that turn a hook task into an HTTP request.
//!
//! One [`Handler`] exists per [`HookType`]. The [`HandlerRegistry`] picks the
//! handler for a task; legacy tasks (payload version 1) always go through
//! the default handler whatever the webhook type.

mod builds;
mod chat;
mod default;
mod matrix;
mod packagist;
mod slack;

#[cfg(test)]
mod chat_tests;
#[cfg(test)]
mod test_fixtures;

pub use builds::{BuildsHandler, BuildsMeta};
pub use chat::{
    ChatAttachment, ChatConvertor, ChatMessage, HtmlMarkup, Markup, PlainMarkup, SlackMarkup,
};
pub use default::DefaultHandler;
pub use matrix::{MatrixHandler, MatrixMeta};
pub use packagist::{PackagistHandler, PackagistMeta};
pub use slack::{SlackHandler, SlackMeta};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::InvalidHeaderValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::model::{HookEventType, HookTask, HookType, Webhook};
use crate::payload::{EventPayload, PayloadError};
use crate::repo::{RepoError, RepositoryReader};
use crate::signature::add_default_headers;
use crate::transport::HttpRequest;

pub(crate) const JSON_CONTENT_TYPE: &str = "application/json";
pub(crate) const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Why a handler could not build a request.
///
/// Every variant fails the current task only.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The webhook settings are unusable (meta, method, content type, URL).
    #[error("invalid webhook configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The provider has no representation for the event.
    #[error("{event} events are not supported by {hook_type} webhooks")]
    UnsupportedEvent {
        hook_type: HookType,
        event: HookEventType,
    },

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error("failed to serialize request body: {0}")]
    Serialize(String),
}

/// Decoded provider settings of a webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookMetadata {
    Slack(SlackMeta),
    Matrix(MatrixMeta),
    Packagist(PackagistMeta),
    Builds(BuildsMeta),
}

/// Builds the outbound request for one webhook type.
#[async_trait]
pub trait Handler: Send + Sync {
    fn hook_type(&self) -> HookType;

    /// Provider settings decoded from [`Webhook::meta`], `None` when the
    /// type has none or the blob does not decode.
    fn metadata(&self, webhook: &Webhook) -> Option<HookMetadata>;

    /// Builds the request for `task`, signed where the provider expects it.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when the settings, payload or repository
    /// data do not allow a request to be built.
    async fn new_request(
        &self,
        webhook: &Webhook,
        task: &HookTask,
    ) -> Result<HttpRequest, HandlerError>;
}

/// Handlers by webhook type.
pub struct HandlerRegistry {
    handlers: HashMap<HookType, Arc<dyn Handler>>,
    legacy: Arc<dyn Handler>,
}

impl HandlerRegistry {
    /// Registers one handler per built-in webhook type.
    ///
    /// `app_url` is announced to the CI builder as the submitter.
    pub fn new(reader: Arc<dyn RepositoryReader>, app_url: impl Into<String>) -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(DefaultHandler::new(HookType::Forgejo)));
        registry.register(Arc::new(DefaultHandler::new(HookType::Gitea)));
        registry.register(Arc::new(DefaultHandler::new(HookType::Gogs)));
        registry.register(Arc::new(SlackHandler::new()));
        registry.register(Arc::new(MatrixHandler::new()));
        registry.register(Arc::new(PackagistHandler));
        registry.register(Arc::new(BuildsHandler::new(reader, app_url)));
        registry
    }

    /// A registry with only the legacy handler.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
            legacy: Arc::new(DefaultHandler::new(HookType::Forgejo)),
        }
    }

    /// Adds or replaces the handler for its type.
    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.hook_type(), handler);
    }

    #[must_use]
    pub fn get(&self, hook_type: HookType) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&hook_type).cloned()
    }

    /// Picks the handler for `task` on `webhook`.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError::Config`] when no handler is registered for the
    /// webhook type.
    pub fn resolve(
        &self,
        webhook: &Webhook,
        task: &HookTask,
    ) -> Result<Arc<dyn Handler>, HandlerError> {
        if task.is_legacy_payload() {
            return Ok(Arc::clone(&self.legacy));
        }
        self.get(webhook.hook_type).ok_or_else(|| {
            HandlerError::Config(format!("no handler for {} webhooks", webhook.hook_type))
        })
    }
}

pub(crate) fn parse_url(raw: &str) -> Result<Url, HandlerError> {
    Url::parse(raw).map_err(|e| HandlerError::Config(format!("invalid url {raw:?}: {e}")))
}

/// Decodes the webhook meta blob; an empty blob decodes as `{}`.
pub(crate) fn decode_meta<T: DeserializeOwned>(webhook: &Webhook) -> Result<T, HandlerError> {
    let meta = if webhook.meta.trim().is_empty() {
        "{}"
    } else {
        webhook.meta.as_str()
    };
    serde_json::from_str(meta)
        .map_err(|e| HandlerError::Config(format!("invalid {} meta: {e}", webhook.hook_type)))
}

/// Like [`decode_meta`] but logs and discards the error.
pub(crate) fn lookup_meta<T: DeserializeOwned>(webhook: &Webhook) -> Option<T> {
    decode_meta(webhook)
        .inspect_err(|e| warn!(hook_id = webhook.id, error = %e, "Undecodable webhook meta"))
        .ok()
}

pub(crate) fn decode_payload(task: &HookTask) -> Result<EventPayload, HandlerError> {
    Ok(EventPayload::decode(
        task.event_type,
        task.payload_content.as_bytes(),
    )?)
}

/// A POST carrying `payload` as indented JSON.
pub(crate) fn json_request<T: Serialize>(
    webhook: &Webhook,
    payload: &T,
) -> Result<HttpRequest, HandlerError> {
    let url = parse_url(&webhook.url)?;
    let body =
        serde_json::to_vec_pretty(payload).map_err(|e| HandlerError::Serialize(e.to_string()))?;
    Ok(HttpRequest::post(url)
        .with_body(body)
        .with_content_type(JSON_CONTENT_TYPE))
}

/// Signs the request body and adds the delivery headers.
pub(crate) fn with_default_headers(
    mut request: HttpRequest,
    webhook: &Webhook,
    task: &HookTask,
) -> Result<HttpRequest, HandlerError> {
    let body = request.body.as_deref().unwrap_or_default();
    add_default_headers(&mut request.headers, webhook.secret.as_bytes(), task, body)
        .map_err(invalid_header)?;
    Ok(request)
}

/// Adds the delivery headers with signatures over `signed` instead of the
/// body, for requests that carry the payload elsewhere.
pub(crate) fn with_signed_headers(
    mut request: HttpRequest,
    webhook: &Webhook,
    task: &HookTask,
    signed: &[u8],
) -> Result<HttpRequest, HandlerError> {
    add_default_headers(&mut request.headers, webhook.secret.as_bytes(), task, signed)
        .map_err(invalid_header)?;
    Ok(request)
}

fn invalid_header(e: InvalidHeaderValue) -> HandlerError {
    HandlerError::Config(format!("invalid delivery header: {e}"))
}

/// Appends `id` as a final, escaped path segment.
pub(crate) fn append_path_segment(url: &mut Url, id: &str) -> Result<(), HandlerError> {
    if url.cannot_be_a_base() {
        return Err(HandlerError::Config(format!("url {url} cannot take a path")));
    }
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push(id);
    }
    Ok(())
}
