//! Matrix room messages via the client-server API.
//!
//! Messages are sent with `PUT .../send/m.room.message/<txn>`, where the
//! transaction id is the SHA-1 of the body so that a replayed body is
//! deduplicated by the homeserver.

use async_trait::async_trait;
use handlebars::RenderError;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use super::chat::{ChatConvertor, ChatMessage, HtmlMarkup, PlainMarkup};
use super::{
    Handler, HandlerError, HookMetadata, append_path_segment, decode_meta, decode_payload,
    json_request, lookup_meta, with_default_headers,
};
use crate::model::{HookTask, HookType, Webhook};
use crate::payload::{Conversion, EventPayload, PayloadConvertor};
use crate::transport::HttpRequest;

const HTML_FORMAT: &str = "org.matrix.custom.html";

/// Matrix settings stored in the webhook meta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixMeta {
    pub homeserver_url: String,
    pub room_id: String,
    /// 1 for `m.text`, anything else for `m.notice`.
    pub message_type: i64,
}

impl MatrixMeta {
    #[must_use]
    pub const fn msgtype(&self) -> &'static str {
        match self.message_type {
            1 => "m.text",
            _ => "m.notice",
        }
    }
}

#[derive(Debug, Serialize)]
struct MatrixPayload {
    body: String,
    msgtype: &'static str,
    format: &'static str,
    formatted_body: String,
}

/// Sends a room message with plain and HTML bodies.
pub struct MatrixHandler {
    plain: ChatConvertor<PlainMarkup>,
    html: ChatConvertor<HtmlMarkup>,
}

impl MatrixHandler {
    #[must_use]
    pub fn new() -> Self {
        Self {
            plain: ChatConvertor::new(),
            html: ChatConvertor::new(),
        }
    }

    fn render<C>(
        convertor: &C,
        payload: &EventPayload,
        task: &HookTask,
        separator: &str,
    ) -> Result<String, HandlerError>
    where
        C: PayloadConvertor<Output = Result<ChatMessage, RenderError>>,
    {
        match convertor.convert(payload) {
            Conversion::Payload(rendered) => rendered
                .map(|m| m.full_text(separator))
                .map_err(|e| HandlerError::Serialize(e.to_string())),
            Conversion::Unsupported => Err(HandlerError::UnsupportedEvent {
                hook_type: HookType::Matrix,
                event: task.event_type,
            }),
        }
    }
}

impl Default for MatrixHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for MatrixHandler {
    fn hook_type(&self) -> HookType {
        HookType::Matrix
    }

    fn metadata(&self, webhook: &Webhook) -> Option<HookMetadata> {
        lookup_meta(webhook).map(HookMetadata::Matrix)
    }

    async fn new_request(
        &self,
        webhook: &Webhook,
        task: &HookTask,
    ) -> Result<HttpRequest, HandlerError> {
        let meta: MatrixMeta = decode_meta(webhook)?;
        let payload = decode_payload(task)?;

        let body = MatrixPayload {
            body: Self::render(&self.plain, &payload, task, "\n")?,
            msgtype: meta.msgtype(),
            format: HTML_FORMAT,
            formatted_body: Self::render(&self.html, &payload, task, "<br>")?,
        };

        let mut request = json_request(webhook, &body)?;
        let txn_id = hex::encode(Sha1::digest(request.body_bytes()));
        append_path_segment(&mut request.url, &txn_id)?;
        request.method = http::Method::PUT;

        with_default_headers(request, webhook, task)
    }
}
