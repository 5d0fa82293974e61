use crate::batchable::Batchable;
use crate::config::BatchConfig;
use crate::error::BatchError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use tokio::sync::mpsc;
use tracing::error;
use tracing::warn;

/// Provides the shared accumulation of events, used concurrently by all the producers.
///
/// The current batch is handed off to the [BatchDriver](crate::BatchDriver)
/// either when it reaches the maximum batch size or when the driver flushes it on timer.
/// Both paths go through the same take-and-reset operation, performed under the lock,
/// so a given event is handed off exactly once.
pub struct Batcher<B: Batchable> {
    inner: Arc<Inner<B>>,
}

impl<B: Batchable> Clone for Batcher<B> {
    fn clone(&self) -> Self {
        Batcher {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<B> {
    config: BatchConfig,
    state: Mutex<State<B>>,
    pending: AtomicUsize,
}

struct State<B> {
    events: Vec<B>,
    /// None once the batcher has been closed
    output: Option<mpsc::UnboundedSender<Vec<B>>>,
}

/// The receiving end of the batches handed off by a [Batcher].
pub struct BatchReceiver<B> {
    receiver: mpsc::UnboundedReceiver<Vec<B>>,
}

impl<B> BatchReceiver<B> {
    /// Receive the next batch, or `None` when the batcher is closed and all batches consumed.
    pub async fn recv(&mut self) -> Option<Vec<B>> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<B>> {
        self.receiver.try_recv().ok()
    }
}

impl<B: Batchable> Batcher<B> {
    /// Create a Batcher with the specified config.
    pub fn new(config: BatchConfig) -> (Batcher<B>, BatchReceiver<B>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = State {
            events: Vec::with_capacity(config.max_batch_size()),
            output: Some(sender),
        };
        let batcher = Batcher {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                pending: AtomicUsize::new(0),
            }),
        };

        (batcher, BatchReceiver { receiver })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.inner.config
    }

    /// Add an event to the current batch.
    ///
    /// If the batch is then full, it's handed off for dispatch and a new batch is started.
    pub fn add(&self, event: B) -> Result<(), BatchError> {
        let mut guard = self.inner.lock();
        let state = &mut *guard;
        if state.output.is_none() {
            return Err(BatchError::Closed);
        }

        state.events.push(event);
        if state.events.len() >= self.inner.config.max_batch_size() {
            self.inner.hand_off(state);
            // The batch driver is gone, so this event will never be dispatched
            if state.output.is_none() {
                return Err(BatchError::Closed);
            }
        }

        Ok(())
    }

    /// Hand off the current batch for dispatch, if not empty.
    ///
    /// Return the number of events handed off.
    pub fn flush(&self) -> usize {
        let mut guard = self.inner.lock();
        self.inner.hand_off(&mut guard)
    }

    /// Stop accepting events and hand off what remains.
    ///
    /// Once the last batch has been consumed, the [BatchReceiver] returns `None`.
    pub fn close(&self) -> usize {
        let mut guard = self.inner.lock();
        let flushed = self.inner.hand_off(&mut guard);
        guard.output = None;
        flushed
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().output.is_none()
    }

    /// Number of events in the current, not yet handed off, batch.
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of events handed off but not yet dispatched.
    pub fn pending(&self) -> usize {
        self.inner.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn dispatched(&self, count: usize) {
        self.inner.pending.fetch_sub(count, Ordering::SeqCst);
    }
}

impl<B> Inner<B> {
    fn lock(&self) -> MutexGuard<'_, State<B>> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn hand_off(&self, state: &mut State<B>) -> usize {
        if state.events.is_empty() {
            return 0;
        }
        let Some(output) = &state.output else {
            return 0;
        };

        let batch = std::mem::replace(
            &mut state.events,
            Vec::with_capacity(self.config.max_batch_size()),
        );
        let size = batch.len();

        let pending = self.pending.fetch_add(size, Ordering::SeqCst) + size;
        let capacity = self.config.buffer_capacity();
        if crosses_capacity(pending - size, pending, capacity) {
            warn!(pending, capacity, "Events waiting for dispatch exceed the buffer capacity");
        }

        if output.send(batch).is_err() {
            self.pending.fetch_sub(size, Ordering::SeqCst);
            error!(events = size, "The batch driver is not running: dropping events");
            state.output = None;
            return 0;
        }

        size
    }
}

/// True only for the hand-off that moves the pending count above the capacity
fn crosses_capacity(before: usize, after: usize, capacity: usize) -> bool {
    before <= capacity && after > capacity
}
