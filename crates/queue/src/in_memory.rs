//! In-memory dispatch queue for tests/dev.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, Notify, mpsc};
use tracing::debug;

use crate::message::DispatchMessage;
use crate::queue::{DispatchQueue, QueueError};

/// In-memory work queue.
///
/// - Unbounded FIFO channel, shared receiver (competing consumers)
/// - Delayed messages are held by a timer task, then sent
/// - Messages are lost on process exit
#[derive(Debug)]
pub struct InMemoryDispatchQueue {
    tx: mpsc::UnboundedSender<DispatchMessage>,
    rx: Mutex<mpsc::UnboundedReceiver<DispatchMessage>>,
    closed: Arc<AtomicBool>,
    closed_notify: Notify,
}

impl InMemoryDispatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next ready message without waiting.
    ///
    /// Returns `None` while another consumer is parked in `dequeue`.
    pub async fn try_dequeue(&self) -> Option<DispatchMessage> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    /// Stop accepting messages. Already buffered messages are still delivered,
    /// after which `dequeue` reports `Closed`. Pending delayed messages are
    /// dropped.
    ///
    /// Never takes the receiver lock, so consumers parked in `dequeue` are woken.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.closed_notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryDispatchQueue {
    fn default() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            closed: Arc::new(AtomicBool::new(false)),
            closed_notify: Notify::new(),
        }
    }
}

#[async_trait::async_trait]
impl DispatchQueue for InMemoryDispatchQueue {
    async fn enqueue(&self, message: DispatchMessage) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        self.tx.send(message).map_err(|_| QueueError::Closed)
    }

    async fn enqueue_after(&self, message: DispatchMessage, delay: Duration) -> Result<(), QueueError> {
        if delay.is_zero() {
            return self.enqueue(message).await;
        }
        if self.is_closed() {
            return Err(QueueError::Closed);
        }

        let tx = self.tx.clone();
        let closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if closed.load(Ordering::SeqCst) || tx.send(message).is_err() {
                debug!(job_id = %message.job_id(), "queue closed before delayed message became ready");
            }
        });

        Ok(())
    }

    async fn dequeue(&self) -> Result<DispatchMessage, QueueError> {
        let mut rx = self.rx.lock().await;
        loop {
            // Registered before the flag check so a concurrent `close` cannot be missed.
            let notified = self.closed_notify.notified();
            if self.is_closed() {
                return rx.try_recv().map_err(|_| QueueError::Closed);
            }

            tokio::select! {
                biased;
                message = rx.recv() => return message.ok_or(QueueError::Closed),
                _ = notified => continue,
            }
        }
    }
}
