use crate::batchable::Batchable;
use crate::batcher::Batcher;
use crate::config::BatchConfig;
use crate::driver::BatchDriver;
use crate::driver::FlushHandler;
use crate::error::BatchError;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// A [Batcher] along with the background task dispatching its batches.
pub struct BatchingService<B: Batchable> {
    batcher: Batcher<B>,
    driver: JoinHandle<()>,
}

impl<B: Batchable> BatchingService<B> {
    /// Spawn the batch driver on the current tokio runtime.
    pub fn start<F: FlushHandler<B>>(config: BatchConfig, handler: F) -> Self {
        let (batcher, receiver) = Batcher::new(config);
        let driver = BatchDriver::new(batcher.clone(), receiver, handler);
        let driver = tokio::spawn(driver.run());

        BatchingService { batcher, driver }
    }

    /// The handle to be used by the producers.
    pub fn batcher(&self) -> Batcher<B> {
        self.batcher.clone()
    }

    /// Stop accepting events, flush the remaining ones and wait for all the batches to be dispatched.
    ///
    /// If the dispatch takes longer than `timeout`, it's aborted and the undelivered events are lost.
    pub async fn drain(mut self, timeout: Duration) -> Result<(), BatchError> {
        let remaining = self.batcher.close();
        info!(
            events = remaining,
            pending = self.batcher.pending(),
            "Flushing remaining events"
        );

        match tokio::time::timeout(timeout, &mut self.driver).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(BatchError::DriverFailure(err.to_string())),
            Err(_) => {
                self.driver.abort();
                Err(BatchError::DrainTimeout {
                    timeout,
                    pending: self.batcher.pending(),
                })
            }
        }
    }
}
