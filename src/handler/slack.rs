//! Slack incoming webhooks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::chat::{ChatConvertor, SlackMarkup};
use super::{
    Handler, HandlerError, HookMetadata, decode_meta, decode_payload, json_request, lookup_meta,
    with_default_headers,
};
use crate::model::{HookTask, HookType, Webhook};
use crate::payload::{Conversion, PayloadConvertor};
use crate::transport::HttpRequest;

/// Slack settings stored in the webhook meta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackMeta {
    pub channel: String,
    pub username: String,
    pub icon_url: String,
    pub color: String,
}

#[derive(Debug, Serialize)]
struct SlackPayload<'a> {
    channel: &'a str,
    text: String,
    #[serde(skip_serializing_if = "str::is_empty")]
    username: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    icon_url: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    color: String,
    title: String,
    title_link: String,
    text: String,
}

/// Posts a rendered summary to a Slack channel.
pub struct SlackHandler {
    convertor: ChatConvertor<SlackMarkup>,
}

impl SlackHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            convertor: ChatConvertor::new(),
        }
    }
}

impl Default for SlackHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for SlackHandler {
    fn hook_type(&self) -> HookType {
        HookType::Slack
    }

    fn metadata(&self, webhook: &Webhook) -> Option<HookMetadata> {
        lookup_meta(webhook).map(HookMetadata::Slack)
    }

    async fn new_request(
        &self,
        webhook: &Webhook,
        task: &HookTask,
    ) -> Result<HttpRequest, HandlerError> {
        let meta: SlackMeta = decode_meta(webhook)?;
        if meta.channel.trim().is_empty() {
            return Err(HandlerError::Config("slack channel is empty".into()));
        }

        let payload = decode_payload(task)?;
        let message = match self.convertor.convert(&payload) {
            Conversion::Payload(rendered) => {
                rendered.map_err(|e| HandlerError::Serialize(e.to_string()))?
            }
            Conversion::Unsupported => {
                return Err(HandlerError::UnsupportedEvent {
                    hook_type: HookType::Slack,
                    event: task.event_type,
                });
            }
        };

        let attachments = message
            .attachment
            .map(|a| SlackAttachment {
                color: meta.color.clone(),
                title: a.title,
                title_link: a.title_link,
                text: a.text,
            })
            .into_iter()
            .collect();

        let body = SlackPayload {
            channel: &meta.channel,
            text: message.text,
            username: &meta.username,
            icon_url: &meta.icon_url,
            attachments,
        };

        with_default_headers(json_request(webhook, &body)?, webhook, task)
    }
}
