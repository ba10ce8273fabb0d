//! Delivery engine.
//!
//! Task ids flow through a deduplicating [`UniqueQueue`] into a dispatcher
//! that runs each [`Deliverer::deliver`] on its own task, bounded by the
//! configured worker count. A delivery claims its task in the store before
//! anything else, so a task gets at most one automatic attempt; operators
//! retry by replaying it as a new task.

mod deliverer;
mod engine;
mod queue;

#[cfg(test)]
#[path = "engine_tests.rs"]
mod engine_tests;

pub use deliverer::{Deliverer, DeliveryError, DeliveryOutcome, SkipReason, redact_authorization};
pub use engine::{
    Engine, EngineConfig, EngineError, EngineHandle, populate_queue, replay_hook_task,
};
pub use queue::{QueueError, UniqueQueue};
