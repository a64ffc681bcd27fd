//! Delegate callback queues
//!
//! Every delegate callback of a call runs on one [`DelegateQueue`]: a
//! dedicated thread driving a single-threaded tokio runtime that executes
//! submitted futures one at a time, in submission order. A callback that
//! awaits holds up the callbacks queued behind it.
//!
//! [`DelegateQueue::main`] is the process-wide default queue, created on
//! first use.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

type Job = BoxFuture<'static, ()>;

static MAIN_QUEUE: Lazy<DelegateQueue> = Lazy::new(|| DelegateQueue::new("main"));

/// Serial execution context for delegate callbacks
#[derive(Clone)]
pub struct DelegateQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    label: String,
    sender: mpsc::UnboundedSender<Job>,
}

impl DelegateQueue {
    /// Start a new queue with its own worker thread
    ///
    /// The worker exits once every handle to the queue has been dropped and
    /// the pending callbacks have run.
    pub fn new(label: impl Into<String>) -> Self {
        let label = label.into();
        let (sender, receiver) = mpsc::unbounded_channel::<Job>();

        let worker_label = label.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("voxlink-{}", label))
            .spawn(move || run_worker(worker_label, receiver));
        if let Err(e) = spawned {
            error!(queue = %label, error = %e, "failed to start delegate queue thread");
        }

        Self {
            inner: Arc::new(QueueInner { label, sender }),
        }
    }

    /// The process-wide default queue
    pub fn main() -> Self {
        MAIN_QUEUE.clone()
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// Queue a callback behind everything already submitted
    pub fn dispatch<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.sender.send(Box::pin(job)).is_err() {
            warn!(queue = %self.inner.label, "delegate queue is not running, callback dropped");
        }
    }

    /// Wait until every callback submitted before this call has run
    ///
    /// ```rust
    /// # tokio_test::block_on(async {
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use voxlink_client_core::DelegateQueue;
    ///
    /// let queue = DelegateQueue::new("ui");
    /// let seen = Arc::new(AtomicUsize::new(0));
    /// let counter = seen.clone();
    /// queue.dispatch(async move {
    ///     counter.fetch_add(1, Ordering::SeqCst);
    /// });
    /// queue.flush().await;
    /// assert_eq!(seen.load(Ordering::SeqCst), 1);
    /// # });
    /// ```
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.dispatch(async move {
            let _ = done_tx.send(());
        });
        let _ = done_rx.await;
    }

    /// Whether both handles refer to the same queue
    pub fn same_queue(&self, other: &DelegateQueue) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DelegateQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegateQueue")
            .field("label", &self.inner.label)
            .finish()
    }
}

impl Default for DelegateQueue {
    fn default() -> Self {
        Self::main()
    }
}

fn run_worker(label: String, mut receiver: mpsc::UnboundedReceiver<Job>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(queue = %label, error = %e, "failed to build delegate queue runtime");
            return;
        }
    };

    runtime.block_on(async move {
        debug!(queue = %label, "delegate queue started");
        while let Some(job) = receiver.recv().await {
            if AssertUnwindSafe(job).catch_unwind().await.is_err() {
                error!(queue = %label, "delegate callback panicked");
            }
        }
        debug!(queue = %label, "delegate queue stopped");
    });
}
