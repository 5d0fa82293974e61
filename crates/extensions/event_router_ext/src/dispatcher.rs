use crate::event::Event;
use crate::metrics::FlushMetrics;
use crate::sink::IngestSink;
use crate::sink::SinkError;
use async_trait::async_trait;
use batcher::FlushHandler;
use batcher::PartitionedBatch;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing::error;

/// What happened to the rows of a datasource when a batch was flushed.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum FlushOutcome {
    Delivered {
        datasource: Arc<str>,
        rows: usize,
    },
    Failed {
        datasource: Arc<str>,
        rows: usize,
        error: String,
    },
}

/// Delivers the flushed batches to the ingestion sink, one call per datasource.
///
/// A failure for one datasource doesn't prevent the delivery of the others.
/// Failed rows are not retried.
pub struct FlushDispatcher {
    sink: Arc<dyn IngestSink>,
    metrics: Arc<dyn FlushMetrics>,
    flush_timeout: Duration,
}

impl FlushDispatcher {
    pub fn new(
        sink: Arc<dyn IngestSink>,
        metrics: Arc<dyn FlushMetrics>,
        flush_timeout: Duration,
    ) -> Self {
        FlushDispatcher {
            sink,
            metrics,
            flush_timeout,
        }
    }

    pub async fn dispatch(&self, batch: Vec<Event>) -> Vec<FlushOutcome> {
        let partitions = PartitionedBatch::new(batch);
        let mut outcomes = Vec::with_capacity(partitions.len());

        for (datasource, events) in partitions {
            let rows: Vec<Value> = events.into_iter().map(Event::into_row).collect();
            let count = rows.len();

            match self.ingest(&datasource, &rows).await {
                Ok(()) => {
                    debug!(datasource = %datasource, rows = count, "Rows ingested");
                    self.metrics.flushed_rows(&datasource, count);
                    outcomes.push(FlushOutcome::Delivered {
                        datasource,
                        rows: count,
                    });
                }
                Err(err) => {
                    error!(datasource = %datasource, rows = count, error = %err, "Error ingesting");
                    outcomes.push(FlushOutcome::Failed {
                        datasource,
                        rows: count,
                        error: err.to_string(),
                    });
                }
            }
        }

        outcomes
    }

    async fn ingest(&self, datasource: &str, rows: &[Value]) -> Result<(), SinkError> {
        match tokio::time::timeout(self.flush_timeout, self.sink.ingest(datasource, rows)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.flush_timeout)),
        }
    }
}

#[async_trait]
impl FlushHandler<Event> for FlushDispatcher {
    async fn flush(&self, batch: Vec<Event>) {
        self.dispatch(batch).await;
    }
}
