use crate::batchable::Batchable;
use crate::batcher::BatchReceiver;
use crate::batcher::Batcher;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::interval_at;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;

/// The consumer of the batches produced by a [Batcher].
///
/// A handler is called by a single task, one batch at a time, and never while the batcher is locked.
/// Errors have to be handled by the handler itself: a batch is never retried.
#[async_trait]
pub trait FlushHandler<B>: Send + Sync + 'static {
    async fn flush(&self, batch: Vec<B>);
}

#[async_trait]
impl<B, H> FlushHandler<B> for Arc<H>
where
    B: Send + 'static,
    H: FlushHandler<B>,
{
    async fn flush(&self, batch: Vec<B>) {
        self.as_ref().flush(batch).await
    }
}

/// Drives the dispatch of the batches:
/// - forwarding to the flush handler the batches handed off when full,
/// - flushing the current batch on a fixed interval.
///
/// Runs until the batcher is closed and all its batches dispatched.
pub struct BatchDriver<B: Batchable, F> {
    batcher: Batcher<B>,
    receiver: BatchReceiver<B>,
    handler: F,
}

impl<B: Batchable, F: FlushHandler<B>> BatchDriver<B, F> {
    pub fn new(batcher: Batcher<B>, receiver: BatchReceiver<B>, handler: F) -> Self {
        BatchDriver {
            batcher,
            receiver,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        "Event batcher"
    }

    pub async fn run(mut self) {
        let period = self.batcher.config().flush_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                batch = self.receiver.recv() => match batch {
                    Some(batch) => self.dispatch(batch).await,
                    None => break, // batcher closed, and all its batches consumed
                },
                _ = ticker.tick() => {
                    let flushed = self.batcher.flush();
                    if flushed > 0 {
                        debug!(events = flushed, "Flush interval elapsed");
                    }
                }
            }
        }

        info!("{} stopped", self.name());
    }

    async fn dispatch(&mut self, batch: Vec<B>) {
        let size = batch.len();
        self.handler.flush(batch).await;
        self.batcher.dispatched(size);
    }
}
