//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the in-process pub/sub used between services and plugins:
//!
//! ```text
//! JobPostService ── persist ──► repository
//!        │
//!        └─ publish ──► EventBus ──► search plugin (enqueue reindex job)
//!                                └─► other subscribers
//! ```
//!
//! Guarantees are deliberately weak: broadcast fan-out, at-least-once, no
//! persistence. The repository is the source of truth; a subscriber that
//! misses an event converges on the next one for the same entity.

use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvError, RecvTimeoutError, TryRecvError};
use std::time::Duration;

/// A subscription to an event stream.
///
/// Each subscription receives a copy of every message published after it was
/// created. Intended for a single consuming thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Wait up to `timeout` for the next message accepted by `pred`,
    /// discarding the ones it rejects.
    ///
    /// This is the typed-subscriber helper: callers that only care about one
    /// event kind pass a predicate on the payload.
    pub fn recv_matching(
        &self,
        timeout: Duration,
        mut pred: impl FnMut(&M) -> bool,
    ) -> Result<M, RecvTimeoutError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                return Err(RecvTimeoutError::Timeout);
            }
            let msg = self.receiver.recv_timeout(remaining)?;
            if pred(&msg) {
                return Ok(msg);
            }
        }
    }
}

/// Transport-agnostic pub/sub contract.
///
/// `publish()` may fail (poisoned lock, closed transport). Callers that have
/// already persisted their write surface the failure but do not roll back.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
