//! Serial request queue with a fixed delay before every operation.
//!
//! A single worker task drains a FIFO channel, so at most one operation runs at a
//! time and operation starts are spaced by at least the configured delay, no
//! matter how many callers enqueue concurrently.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::chat::error::{ChatError, ChatResult};

/// A queued operation, already bound to the channel that resolves its caller.
type PendingOperation = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handle to the serial request queue.
///
/// Dropping the handle closes the queue; operations already enqueued still run.
pub struct RequestQueue {
    sender: mpsc::UnboundedSender<PendingOperation>,
    pending: Arc<AtomicUsize>,
    delay: Duration,
}

impl RequestQueue {
    /// Spawn the queue worker on the current Tokio runtime.
    ///
    /// # Errors
    /// Returns an error if called outside a Tokio runtime.
    pub fn spawn(delay: Duration) -> ChatResult<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatError::Config(format!("request queue needs a Tokio runtime: {e}")))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        runtime.spawn(run_worker(receiver, delay, Arc::clone(&pending)));

        Ok(Self {
            sender,
            pending,
            delay,
        })
    }

    /// Delay applied before each operation.
    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Operations queued or running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Append `operation` to the queue and wait for its result.
    ///
    /// The operation starts only after every earlier operation has finished and
    /// the queue delay has elapsed. Once enqueued it runs to completion even if
    /// the returned future is dropped.
    ///
    /// # Errors
    /// Returns the operation's own error, or a cancellation error if the queue has
    /// shut down or the operation panicked.
    pub async fn enqueue<T, F, Fut>(&self, operation: F) -> ChatResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ChatResult<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: PendingOperation = Box::pin(async move {
            // The caller may have stopped waiting; the result is simply discarded.
            let _ = tx.send(operation().await);
        });

        let depth = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        if self.sender.send(job).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(ChatError::cancelled("request queue is closed"));
        }
        debug!(pending = depth, "Queued chat request");

        rx.await
            .map_err(|_| ChatError::cancelled("queued request was dropped before completing"))?
    }
}

/// Drain the channel one operation at a time until every sender is gone.
async fn run_worker(
    mut receiver: mpsc::UnboundedReceiver<PendingOperation>,
    delay: Duration,
    pending: Arc<AtomicUsize>,
) {
    while let Some(job) = receiver.recv().await {
        tokio::time::sleep(delay).await;
        // Own task so a panicking operation cannot take the worker down with it.
        if let Err(err) = tokio::spawn(job).await {
            warn!(?err, "Queued chat request aborted");
        }
        pending.fetch_sub(1, Ordering::SeqCst);
    }
    debug!("Request queue closed");
}
