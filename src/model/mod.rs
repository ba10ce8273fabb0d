//! Persistent records handled by the delivery engine.
//!
//! - [`Webhook`]: a receiver configured by a repository owner
//! - [`HookTask`]: one queued delivery of one event to one webhook
//! - [`HookEventType`]: the closed set of events a task can carry

mod event;
mod task;
mod webhook;

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;

pub use event::{HookEventType, ParseEventTypeError};
pub use task::{HookRequest, HookResponse, HookTask, NewHookTask, PayloadVersion};
pub use webhook::{ContentType, HookStatus, HookType, ParseHookTypeError, Webhook};
