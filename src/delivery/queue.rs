//! Deduplicating task id queue.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, Notify, mpsc};

/// Errors returned by [`UniqueQueue::push`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("delivery queue is closed")]
    Closed,
}

#[derive(Debug)]
struct QueueState {
    /// Queued and in-flight ids.
    ids: HashSet<i64>,
    /// `None` once the queue is closed.
    sender: Option<mpsc::UnboundedSender<i64>>,
}

/// FIFO of task ids in which an id is present at most once.
///
/// An id stays in the dedup set from [`push`](Self::push) until the consumer
/// calls [`done`](Self::done), so an id cannot be queued again while its
/// delivery is running.
#[derive(Debug)]
pub struct UniqueQueue {
    state: Mutex<QueueState>,
    receiver: AsyncMutex<mpsc::UnboundedReceiver<i64>>,
    idle: Notify,
}

impl Default for UniqueQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl UniqueQueue {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Mutex::new(QueueState {
                ids: HashSet::new(),
                sender: Some(sender),
            }),
            receiver: AsyncMutex::new(receiver),
            idle: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // The state stays consistent even if a holder panicked.
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Queues `id`; `Ok(false)` when it is already queued or in flight.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] after [`close`](Self::close).
    pub fn push(&self, id: i64) -> Result<bool, QueueError> {
        let mut state = self.lock();
        let Some(sender) = state.sender.clone() else {
            return Err(QueueError::Closed);
        };
        if !state.ids.insert(id) {
            return Ok(false);
        }
        if sender.send(id).is_err() {
            state.ids.remove(&id);
            return Err(QueueError::Closed);
        }
        Ok(true)
    }

    /// Next queued id, or `None` once the queue is closed and drained.
    ///
    /// Meant for a single consumer.
    pub async fn pop(&self) -> Option<i64> {
        self.receiver.lock().await.recv().await
    }

    /// Releases `id` after its delivery finished.
    pub fn done(&self, id: i64) {
        let mut state = self.lock();
        state.ids.remove(&id);
        if state.ids.is_empty() {
            self.idle.notify_waiters();
        }
    }

    /// Rejects further pushes; already queued ids can still be popped.
    pub fn close(&self) {
        self.lock().sender = None;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().sender.is_none()
    }

    #[must_use]
    pub fn contains(&self, id: i64) -> bool {
        self.lock().ids.contains(&id)
    }

    /// Queued plus in-flight ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Waits until no id is queued or in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}
