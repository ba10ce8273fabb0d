//! Hook task record and its delivery audit fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::HookEventType;

/// Payload format of a task.
pub type PayloadVersion = u8;

/// Recorded request, with the `Authorization` value redacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookRequest {
    pub url: String,
    pub http_method: String,
    /// Multi-valued headers are joined with `,`.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// Recorded response, or the transport error in `body`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// One delivery of one event to one webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookTask {
    pub id: i64,
    pub uuid: String,
    pub hook_id: i64,
    pub event_type: HookEventType,
    pub payload_content: String,
    pub payload_version: PayloadVersion,
    pub is_delivered: bool,
    pub is_succeed: bool,
    /// Completion time in Unix nanoseconds.
    pub delivered: Option<i64>,
    pub request_info: Option<HookRequest>,
    pub response_info: Option<HookResponse>,
}

impl HookTask {
    /// Raw passthrough payload, always sent by the default handler.
    pub const LEGACY_PAYLOAD: PayloadVersion = 1;
    /// Canonical payload converted by the webhook's own handler.
    pub const TYPED_PAYLOAD: PayloadVersion = 2;

    #[must_use]
    pub const fn is_legacy_payload(&self) -> bool {
        self.payload_version == Self::LEGACY_PAYLOAD
    }

    /// Claimed by a worker but never stamped with a completion time.
    #[must_use]
    pub const fn is_unfinalized(&self) -> bool {
        self.is_delivered && self.delivered.is_none()
    }
}

/// Fields an event source provides when creating a task.
///
/// The store assigns `id` and `uuid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHookTask {
    pub hook_id: i64,
    pub event_type: HookEventType,
    pub payload_content: String,
    pub payload_version: PayloadVersion,
}

impl NewHookTask {
    /// A typed-payload task.
    #[must_use]
    pub fn new(hook_id: i64, event_type: HookEventType, payload_content: impl Into<String>) -> Self {
        Self {
            hook_id,
            event_type,
            payload_content: payload_content.into(),
            payload_version: HookTask::TYPED_PAYLOAD,
        }
    }

    #[must_use]
    pub const fn legacy(mut self) -> Self {
        self.payload_version = HookTask::LEGACY_PAYLOAD;
        self
    }

    /// Builds the pending task record for the given identity.
    #[must_use]
    pub fn into_task(self, id: i64, uuid: String) -> HookTask {
        HookTask {
            id,
            uuid,
            hook_id: self.hook_id,
            event_type: self.event_type,
            payload_content: self.payload_content,
            payload_version: self.payload_version,
            is_delivered: false,
            is_succeed: false,
            delivered: None,
            request_info: None,
            response_info: None,
        }
    }
}

impl From<&HookTask> for NewHookTask {
    fn from(task: &HookTask) -> Self {
        Self {
            hook_id: task.hook_id,
            event_type: task.event_type,
            payload_content: task.payload_content.clone(),
            payload_version: task.payload_version,
        }
    }
}
