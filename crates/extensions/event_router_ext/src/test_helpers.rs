use crate::sink::IngestSink;
use crate::sink::SinkError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// An ingestion sink that records the calls it receives.
///
/// The calls for a given datasource can be made to fail or to never complete.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    called: Notify,
    failing: Option<String>,
    stalling: Option<String>,
}

impl RecordingSink {
    pub fn failing_for(datasource: &str) -> Self {
        RecordingSink {
            failing: Some(datasource.to_string()),
            ..Default::default()
        }
    }

    pub fn stalling_for(datasource: &str) -> Self {
        RecordingSink {
            stalling: Some(datasource.to_string()),
            ..Default::default()
        }
    }

    /// The calls received so far, failed ones included.
    pub fn calls(&self) -> Vec<(String, Vec<Value>)> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Wait until at least `count` calls have been received, returning all of them.
    ///
    /// Panics after 10 seconds.
    pub async fn wait_for_calls(&self, count: usize) -> Vec<(String, Vec<Value>)> {
        let wait = async {
            loop {
                let notified = self.called.notified();
                let calls = self.calls();
                if calls.len() >= count {
                    return calls;
                }
                notified.await;
            }
        };
        match tokio::time::timeout(Duration::from_secs(10), wait).await {
            Ok(calls) => calls,
            Err(_) => panic!(
                "Expected {count} ingest calls, received: {:?}",
                self.calls()
            ),
        }
    }
}

#[async_trait]
impl IngestSink for RecordingSink {
    async fn ingest(&self, datasource: &str, rows: &[Value]) -> Result<(), SinkError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((datasource.to_string(), rows.to_vec()));
        self.called.notify_waiters();

        if self.stalling.as_deref() == Some(datasource) {
            std::future::pending::<()>().await;
        }

        if self.failing.as_deref() == Some(datasource) {
            return Err(SinkError::UnexpectedStatus {
                status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
                body: format!("{datasource} is not available"),
            });
        }

        Ok(())
    }
}
