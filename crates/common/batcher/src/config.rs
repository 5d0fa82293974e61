use std::time::Duration;

/// The parameters for the batching process.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BatchConfig {
    max_batch_size: usize,
    buffer_capacity: usize,
    flush_interval: Duration,
}

impl BatchConfig {
    /// Get the number of events that closes a batch.
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    /// Get the number of events that can wait for dispatch before warnings are raised.
    pub fn buffer_capacity(&self) -> usize {
        self.buffer_capacity
    }

    /// Get the interval at which the current batch is flushed, whatever its size.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }
}

#[derive(thiserror::Error, Debug, Eq, PartialEq)]
pub enum BatchConfigError {
    #[error("The maximum batch size must be greater than zero")]
    ZeroBatchSize,

    #[error("The buffer capacity ({buffer_capacity}) must not be lower than the maximum batch size ({max_batch_size})")]
    CapacityBelowBatchSize {
        buffer_capacity: usize,
        max_batch_size: usize,
    },

    #[error("The flush interval must be greater than zero")]
    ZeroFlushInterval,
}

/// Used to configure the parameters for batching. Start here.
#[derive(Debug, Clone)]
pub struct BatchConfigBuilder {
    max_batch_size: usize,
    buffer_capacity: Option<usize>,
    flush_interval: Duration,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        BatchConfigBuilder {
            max_batch_size: 1000,
            buffer_capacity: None,
            flush_interval: Duration::from_secs(1),
        }
    }
}

impl BatchConfigBuilder {
    /// Start configuring the batching parameters.
    pub fn new() -> BatchConfigBuilder {
        BatchConfigBuilder::default()
    }

    /// Set the number of events that closes a batch.
    pub fn max_batch_size(self, max_batch_size: usize) -> Self {
        Self {
            max_batch_size,
            ..self
        }
    }

    /// Set the soft limit on events waiting for dispatch.
    ///
    /// Defaults to ten times the maximum batch size.
    pub fn buffer_capacity(self, buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity: Some(buffer_capacity),
            ..self
        }
    }

    /// Set the interval at which batches are flushed even if not full.
    pub fn flush_interval(self, flush_interval: Duration) -> Self {
        Self {
            flush_interval,
            ..self
        }
    }

    /// Finalise the batching parameters.
    pub fn build(self) -> Result<BatchConfig, BatchConfigError> {
        if self.max_batch_size == 0 {
            return Err(BatchConfigError::ZeroBatchSize);
        }

        let buffer_capacity = self
            .buffer_capacity
            .unwrap_or_else(|| self.max_batch_size.saturating_mul(10));
        if buffer_capacity < self.max_batch_size {
            return Err(BatchConfigError::CapacityBelowBatchSize {
                buffer_capacity,
                max_batch_size: self.max_batch_size,
            });
        }

        if self.flush_interval.is_zero() {
            return Err(BatchConfigError::ZeroFlushInterval);
        }

        Ok(BatchConfig {
            max_batch_size: self.max_batch_size,
            buffer_capacity,
            flush_interval: self.flush_interval,
        })
    }
}
