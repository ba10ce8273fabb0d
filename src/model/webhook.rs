//! Webhook configuration record.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Receiver family of a webhook.
///
/// Determines which handler turns a task into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookType {
    Forgejo,
    Gitea,
    Gogs,
    Slack,
    Matrix,
    SourcehutBuilds,
    Packagist,
}

impl HookType {
    /// All receiver families, in registration order.
    pub const ALL: [Self; 7] = [
        Self::Forgejo,
        Self::Gitea,
        Self::Gogs,
        Self::Slack,
        Self::Matrix,
        Self::SourcehutBuilds,
        Self::Packagist,
    ];

    /// Wire name used in configuration and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Forgejo => "forgejo",
            Self::Gitea => "gitea",
            Self::Gogs => "gogs",
            Self::Slack => "slack",
            Self::Matrix => "matrix",
            Self::SourcehutBuilds => "sourcehut_builds",
            Self::Packagist => "packagist",
        }
    }
}

impl fmt::Display for HookType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`HookType`].
#[derive(Debug, Error)]
#[error("unknown webhook type: {0}")]
pub struct ParseHookTypeError(pub String);

impl FromStr for HookType {
    type Err = ParseHookTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ParseHookTypeError(s.to_string()))
    }
}

/// Body encoding for the default handler family.
///
/// Unrecognized stored values deserialize to [`ContentType::Unknown`],
/// which handlers reject when building a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Json,
    Form,
    #[serde(other)]
    Unknown,
}

/// Outcome of the most recent delivery to a webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HookStatus {
    #[default]
    None,
    Succeed,
    Fail,
}

/// A configured receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: i64,
    pub hook_type: HookType,
    pub url: String,
    /// Empty means POST.
    #[serde(default)]
    pub http_method: String,
    #[serde(default)]
    pub content_type: ContentType,
    /// Raw HMAC key; may be empty.
    #[serde(default)]
    pub secret: String,
    /// Provider specific settings as a JSON document.
    #[serde(default)]
    pub meta: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub last_status: HookStatus,
    /// Encrypted `Authorization` header value, empty when unset.
    #[serde(default)]
    pub header_authorization_encrypted: String,
}

const fn default_active() -> bool {
    true
}

impl Webhook {
    /// Creates an active webhook with no secret, meta or authorization.
    #[must_use]
    pub fn new(hook_type: HookType, url: impl Into<String>) -> Self {
        Self {
            id: 0,
            hook_type,
            url: url.into(),
            http_method: String::new(),
            content_type: ContentType::Json,
            secret: String::new(),
            meta: String::new(),
            is_active: true,
            last_status: HookStatus::None,
            header_authorization_encrypted: String::new(),
        }
    }

    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    #[must_use]
    pub fn with_meta(mut self, meta: impl Into<String>) -> Self {
        self.meta = meta.into();
        self
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.http_method = method.into();
        self
    }

    #[must_use]
    pub const fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    #[must_use]
    pub const fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    #[must_use]
    pub fn with_authorization(mut self, encrypted: impl Into<String>) -> Self {
        self.header_authorization_encrypted = encrypted.into();
        self
    }
}
