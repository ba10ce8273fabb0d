//! Handler for generic receivers.
//!
//! The payload content is sent as stored; only its encoding depends on the
//! webhook method and content type. Signatures always cover the content,
//! also when a GET carries it in the query.

use async_trait::async_trait;
use sha1::{Digest, Sha1};
use tracing::info;
use url::form_urlencoded;

use super::{
    FORM_CONTENT_TYPE, Handler, HandlerError, HookMetadata, JSON_CONTENT_TYPE,
    append_path_segment, parse_url, with_default_headers, with_signed_headers,
};
use crate::model::{ContentType, HookTask, HookType, Webhook};
use crate::transport::HttpRequest;

/// Sends the stored payload unchanged.
///
/// Registered for the forge families and used for every legacy task.
#[derive(Debug, Clone, Copy)]
pub struct DefaultHandler {
    hook_type: HookType,
}

impl DefaultHandler {
    #[must_use]
    pub const fn new(hook_type: HookType) -> Self {
        Self { hook_type }
    }
}

#[async_trait]
impl Handler for DefaultHandler {
    fn hook_type(&self) -> HookType {
        self.hook_type
    }

    fn metadata(&self, _webhook: &Webhook) -> Option<HookMetadata> {
        None
    }

    async fn new_request(
        &self,
        webhook: &Webhook,
        task: &HookTask,
    ) -> Result<HttpRequest, HandlerError> {
        let method = if webhook.http_method.is_empty() {
            info!(hook_id = webhook.id, "HTTP method not set, using POST");
            "POST".to_string()
        } else {
            webhook.http_method.to_ascii_uppercase()
        };

        let mut url = parse_url(&webhook.url)?;
        let content = &task.payload_content;

        let request = match method.as_str() {
            "POST" => match webhook.content_type {
                ContentType::Json => HttpRequest::post(url)
                    .with_body(content.as_bytes().to_vec())
                    .with_content_type(JSON_CONTENT_TYPE),
                ContentType::Form => {
                    let body = form_urlencoded::Serializer::new(String::new())
                        .append_pair("payload", content)
                        .finish();
                    HttpRequest::post(url)
                        .with_body(body.into_bytes())
                        .with_content_type(FORM_CONTENT_TYPE)
                }
                ContentType::Unknown => {
                    return Err(HandlerError::Config("invalid content type".into()));
                }
            },
            "GET" => {
                url.query_pairs_mut().append_pair("payload", content);
                return with_signed_headers(
                    HttpRequest::get(url),
                    webhook,
                    task,
                    content.as_bytes(),
                );
            }
            "PUT" if webhook.hook_type == HookType::Matrix => {
                let txn_id = hex::encode(Sha1::digest(content.as_bytes()));
                append_path_segment(&mut url, &txn_id)?;
                HttpRequest::put(url).with_body(content.as_bytes().to_vec())
            }
            other => {
                return Err(HandlerError::Config(format!("invalid http method {other:?}")));
            }
        };

        with_default_headers(request, webhook, task)
    }
}
