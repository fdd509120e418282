//! Sequential asynchronous workers.
//!
//! An [`AsyncWorker`] owns a queue of items and processes them one at a time on the tokio
//! runtime it was created on. Processing never blocks: a [`Worker`] that is not ready to make
//! progress returns [`Pending`] with the delay after which the same item should be retried.

mod batch;
pub use batch::{BatchWorker, Batchable};

use crate::constants::DEFAULT_PAUSE_INTERVAL;
use async_trait::async_trait;
use std::{
    collections::VecDeque,
    fmt::Display,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::runtime::Handle;
use tracing::{debug, trace};

/// Signals that an item can not be handled yet and must be retried after `timeout`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("pending for {timeout:?}: {reason}")]
pub struct Pending {
    /// Delay before the item is handled again.
    pub timeout: Duration,
    /// Human readable reason.
    pub reason: String,
}

impl Pending {
    /// Creates a new [`Pending`].
    pub fn new(timeout: Duration, reason: impl Into<String>) -> Self {
        Self { timeout, reason: reason.into() }
    }
}

/// Outcome of a failed [`Worker::work`] call.
#[derive(Debug, thiserror::Error)]
pub enum WorkError<E> {
    /// The item is not ready yet, see [`Pending`].
    #[error(transparent)]
    Pending(#[from] Pending),
    /// The item failed and is retried after the pause interval.
    #[error("{0}")]
    Failed(E),
}

impl<E> WorkError<E> {
    /// Shortcut for [`WorkError::Pending`].
    pub fn pending(timeout: Duration, reason: impl Into<String>) -> Self {
        Self::Pending(Pending::new(timeout, reason))
    }

    /// Returns the pending signal, if any.
    pub fn as_pending(&self) -> Option<&Pending> {
        match self {
            Self::Pending(pending) => Some(pending),
            Self::Failed(_) => None,
        }
    }
}

/// Item handler driven by an [`AsyncWorker`].
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Item type.
    type Item: Send + 'static;
    /// Failure type passed to [`Worker::on_failure`].
    type Error: Display + Send + 'static;

    /// Takes the next item to handle from the queue.
    ///
    /// Returning [`Pending`] leaves the queue untouched and retries after the timeout.
    fn prepare(&self, queue: &mut VecDeque<Self::Item>) -> Result<Option<Self::Item>, Pending> {
        Ok(queue.pop_front())
    }

    /// Handles a single item.
    async fn work(&self, item: &mut Self::Item) -> Result<(), WorkError<Self::Error>>;

    /// Invoked with the item after [`Worker::work`] succeeded.
    fn complete(&self, _item: Self::Item) {}

    /// Invoked when [`Worker::work`] failed with anything but [`Pending`].
    fn on_failure(&self, item: &Self::Item, err: &Self::Error);
}

/// Shared pause flag.
///
/// Several workers may share one handle so that pausing one of them stops all of them.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    /// Whether the flag is set.
    pub fn is_paused(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Sets or clears the flag.
    pub fn set_paused(&self, paused: bool) {
        self.0.store(paused, Ordering::SeqCst);
    }
}

struct Inner<W: Worker> {
    worker: W,
    queue: Mutex<VecDeque<W::Item>>,
    working: AtomicBool,
    paused: PauseHandle,
    pause_interval: Duration,
    runtime: Handle,
}

/// Pausable single-flight worker processing queued items in sequence.
///
/// At most one [`Worker::work`] call is in flight per instance. Failed items are retried
/// forever until the worker is paused.
pub struct AsyncWorker<W: Worker> {
    inner: Arc<Inner<W>>,
}

impl<W: Worker> std::fmt::Debug for AsyncWorker<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncWorker")
            .field("pending", &self.pending_count())
            .field("working", &self.is_working())
            .field("paused", &self.is_paused())
            .field("pause_interval", &self.inner.pause_interval)
            .finish()
    }
}

impl<W: Worker> Clone for AsyncWorker<W> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<W: Worker> AsyncWorker<W> {
    /// Creates a new [`AsyncWorker`] with the default pause interval.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(worker: W) -> Self {
        Self::with_pause(worker, PauseHandle::default(), DEFAULT_PAUSE_INTERVAL)
    }

    /// Creates a new [`AsyncWorker`] sharing the given [`PauseHandle`].
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn with_pause(worker: W, paused: PauseHandle, pause_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                worker,
                queue: Mutex::new(VecDeque::new()),
                working: AtomicBool::new(false),
                paused,
                pause_interval,
                runtime: Handle::current(),
            }),
        }
    }

    /// Returns the wrapped [`Worker`].
    pub fn worker(&self) -> &W {
        &self.inner.worker
    }

    /// Number of queued items.
    pub fn pending_count(&self) -> usize {
        self.inner.queue().len()
    }

    /// Whether the worker currently has a running loop.
    pub fn is_working(&self) -> bool {
        self.inner.working.load(Ordering::SeqCst)
    }

    /// Whether the worker is paused.
    pub fn is_paused(&self) -> bool {
        self.inner.paused.is_paused()
    }

    /// Pauses or resumes the worker.
    pub fn set_paused(&self, paused: bool) {
        self.inner.paused.set_paused(paused);
    }

    /// Returns the pause flag of this worker.
    pub fn pause_handle(&self) -> &PauseHandle {
        &self.inner.paused
    }

    /// Delay used when paused and after failures.
    pub fn pause_interval(&self) -> Duration {
        self.inner.pause_interval
    }

    /// Appends an item to the end of the queue.
    pub fn submit(&self, item: W::Item) {
        self.push(item, false);
    }

    /// Puts an item at the head of the queue.
    pub fn submit_first(&self, item: W::Item) {
        self.push(item, true);
    }

    fn push(&self, item: W::Item, as_first: bool) {
        {
            let mut queue = self.inner.queue();
            if as_first {
                queue.push_front(item);
            } else {
                queue.push_back(item);
            }
        }

        if self
            .inner
            .working
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.runtime.spawn(self.inner.clone().run());
        }
    }
}

impl<W: Worker> Inner<W> {
    fn queue(&self) -> MutexGuard<'_, VecDeque<W::Item>> {
        // a panicking worker must not take the queue down with it
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Marks the worker idle if nothing is left to do.
    fn try_idle(&self) -> bool {
        let queue = self.queue();
        if queue.is_empty() {
            self.working.store(false, Ordering::SeqCst);
            return true;
        }
        false
    }

    async fn run(self: Arc<Self>) {
        loop {
            if self.paused.is_paused() {
                tokio::time::sleep(self.pause_interval).await;
                continue;
            }

            let prepared = {
                let mut queue = self.queue();
                self.worker.prepare(&mut queue)
            };

            let mut item = match prepared {
                Ok(Some(item)) => item,
                Ok(None) => {
                    if self.try_idle() {
                        return;
                    }
                    continue;
                }
                Err(pending) => {
                    trace!(reason = %pending.reason, timeout = ?pending.timeout, "Preparation pending");
                    tokio::time::sleep(pending.timeout).await;
                    continue;
                }
            };

            match self.worker.work(&mut item).await {
                Ok(()) => {
                    self.worker.complete(item);
                    if self.try_idle() {
                        return;
                    }
                    tokio::task::yield_now().await;
                }
                Err(WorkError::Pending(pending)) => {
                    debug!(reason = %pending.reason, timeout = ?pending.timeout, "Work pending");
                    self.queue().push_front(item);
                    tokio::time::sleep(pending.timeout).await;
                }
                Err(WorkError::Failed(err)) => {
                    self.worker.on_failure(&item, &err);
                    self.queue().push_front(item);
                    tokio::time::sleep(self.pause_interval).await;
                }
            }
        }
    }
}
