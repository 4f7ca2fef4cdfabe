//! Dispatch queue abstraction (mechanics only).
//!
//! This module provides the **work-queue pattern** used to hand job references to
//! a pool of workers.
//!
//! ## Delivery Semantics
//!
//! The queue is intentionally **lightweight** and makes minimal assumptions:
//!
//! - **Transport-agnostic**: Works with in-memory channels, Redis lists, brokers, etc.
//! - **At-least-once delivery**: A message may be delivered more than once; workers must
//!   be idempotent (the job store's compare-and-set gate provides that)
//! - **No ordering guarantees**: Messages for different jobs may arrive in any order
//! - **Competing consumers**: Each delivery goes to exactly one `dequeue` caller
//!
//! Delayed re-delivery is part of the contract (`enqueue_after`), so that a worker can
//! back off without blocking its own task.

use std::sync::Arc;
use std::time::Duration;

use crate::message::DispatchMessage;

/// Queue operation error.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue was shut down; no more messages will be delivered.
    #[error("dispatch queue closed")]
    Closed,

    /// The underlying transport failed (connection, command error, ...).
    #[error("queue transport error: {0}")]
    Transport(String),

    /// A message could not be encoded or decoded.
    #[error("queue codec error: {0}")]
    Codec(String),
}

/// Shared queue of dispatch messages.
///
/// ## Thread Safety
///
/// The trait requires `Send + Sync`; many workers call `dequeue` concurrently and
/// each message is handed to one of them.
#[async_trait::async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Make a message available for delivery now.
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), QueueError>;

    /// Make a message available for delivery once `delay` has elapsed.
    ///
    /// Must return without waiting for the delay.
    async fn enqueue_after(&self, message: DispatchMessage, delay: Duration) -> Result<(), QueueError>;

    /// Wait for the next message.
    ///
    /// Returns `QueueError::Closed` once the queue has been shut down and drained.
    async fn dequeue(&self) -> Result<DispatchMessage, QueueError>;
}

#[async_trait::async_trait]
impl<Q> DispatchQueue for Arc<Q>
where
    Q: DispatchQueue + ?Sized,
{
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), QueueError> {
        (**self).enqueue(message).await
    }

    async fn enqueue_after(&self, message: DispatchMessage, delay: Duration) -> Result<(), QueueError> {
        (**self).enqueue_after(message, delay).await
    }

    async fn dequeue(&self) -> Result<DispatchMessage, QueueError> {
        (**self).dequeue().await
    }
}
