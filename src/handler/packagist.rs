//! Packagist update-package notifications.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, HandlerError, HookMetadata, decode_meta, json_request, lookup_meta};
use crate::model::{HookTask, HookType, Webhook};
use crate::transport::HttpRequest;

/// Packagist settings stored in the webhook meta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackagistMeta {
    pub username: String,
    pub api_token: String,
    pub package_url: String,
}

#[derive(Debug, Serialize)]
struct PackagistPayload<'a> {
    repository: PackagistRepository<'a>,
}

#[derive(Debug, Serialize)]
struct PackagistRepository<'a> {
    url: &'a str,
}

/// Asks Packagist to re-read the package; every event sends the same body.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackagistHandler;

#[async_trait]
impl Handler for PackagistHandler {
    fn hook_type(&self) -> HookType {
        HookType::Packagist
    }

    fn metadata(&self, webhook: &Webhook) -> Option<HookMetadata> {
        lookup_meta(webhook).map(HookMetadata::Packagist)
    }

    async fn new_request(
        &self,
        webhook: &Webhook,
        _task: &HookTask,
    ) -> Result<HttpRequest, HandlerError> {
        let meta: PackagistMeta = decode_meta(webhook)?;
        if meta.package_url.is_empty() {
            return Err(HandlerError::Config("packagist package url is empty".into()));
        }

        json_request(
            webhook,
            &PackagistPayload {
                repository: PackagistRepository {
                    url: &meta.package_url,
                },
            },
        )
    }
}
