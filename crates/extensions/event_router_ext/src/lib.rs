//! Receives JSON events over HTTP and forwards them in batches to an ingestion endpoint.
//!
//! Events are posted to `POST /v0/events?name=<datasource>`
//! and accumulated by a [Batcher](batcher::Batcher),
//! which hands them off to a [FlushDispatcher] either when a batch is full or on a timer.
//! The dispatcher groups each batch by datasource and ingests each group with a single call to an [IngestSink].
//! The rows delivered per datasource are exported on `GET /metrics` by [RouterMetrics].
mod auth;
mod decode;
mod dispatcher;
mod error;
mod event;
mod handler;
mod metrics;
mod server;
mod sink;

pub mod test_helpers;

pub use auth::AuthError;
pub use auth::Authorizer;
pub use auth::BearerTokenAuthorizer;
pub use decode::JsonStreamDecoder;
pub use dispatcher::FlushDispatcher;
pub use dispatcher::FlushOutcome;
pub use error::IngestError;
pub use event::Event;
pub use handler::event_router;
pub use handler::IngestParams;
pub use handler::IngestResponse;
pub use handler::RouterState;
pub use handler::DEFAULT_MAX_BODY_SIZE;
pub use metrics::FlushMetrics;
pub use metrics::RouterMetrics;
pub use metrics::FLUSHED_ROWS_METRIC;
pub use server::RouterServer;
pub use sink::HttpIngestSink;
pub use sink::IngestSink;
pub use sink::SinkError;
