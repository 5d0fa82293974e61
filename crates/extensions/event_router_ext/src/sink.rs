use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("Failed to encode rows: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Cannot use {0:?} as ingestion base url")]
    InvalidUrl(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("Ingestion failed with status {status}: {body}")]
    UnexpectedStatus { status: StatusCode, body: String },

    #[error("Ingestion did not complete within {0:?}")]
    Timeout(Duration),
}

/// The downstream store where the batched rows are ingested, one datasource at a time.
#[async_trait]
pub trait IngestSink: Send + Sync + 'static {
    async fn ingest(&self, datasource: &str, rows: &[Value]) -> Result<(), SinkError>;
}

/// Ingests rows over HTTP, posting them as newline-delimited JSON
/// to `{base_url}/v0/events?name=<datasource>`.
#[derive(Debug, Clone)]
pub struct HttpIngestSink {
    endpoint: Url,
    token: String,
    client: reqwest::Client,
}

/// The counts reported by the ingestion endpoint
#[derive(Debug, Deserialize)]
struct IngestReport {
    #[serde(default)]
    successful_rows: usize,
    #[serde(default)]
    quarantined_rows: usize,
}

impl HttpIngestSink {
    pub fn new(base_url: &Url, token: impl Into<String>) -> Result<Self, SinkError> {
        let mut endpoint = base_url.clone();
        endpoint
            .path_segments_mut()
            .map_err(|_| SinkError::InvalidUrl(base_url.to_string()))?
            .pop_if_empty()
            .extend(["v0", "events"]);

        let client = reqwest::Client::builder().build()?;

        Ok(HttpIngestSink {
            endpoint,
            token: token.into(),
            client,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl IngestSink for HttpIngestSink {
    async fn ingest(&self, datasource: &str, rows: &[Value]) -> Result<(), SinkError> {
        let mut body = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut body, row)?;
            body.push(b'\n');
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .query(&[("name", datasource)])
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SinkError::UnexpectedStatus { status, body });
        }

        if let Ok(report) = serde_json::from_str::<IngestReport>(&body) {
            if report.quarantined_rows > 0 {
                warn!(
                    datasource,
                    successful_rows = report.successful_rows,
                    quarantined_rows = report.quarantined_rows,
                    "Rows quarantined by the ingestion endpoint"
                );
            }
        }

        Ok(())
    }
}
