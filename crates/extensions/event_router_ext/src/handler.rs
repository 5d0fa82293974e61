//! This module defines the axum route and handler of the event ingestion API:
//!
//! - `POST /v0/events?name=<datasource>`: buffers the JSON values of the request body,
//!   to be forwarded in batches to the ingestion sink.
//! - `GET /metrics`: exports the router metrics in Prometheus text format.
use crate::auth::Authorizer;
use crate::decode::JsonStreamDecoder;
use crate::error::IngestError;
use crate::event::Event;
use crate::metrics::RouterMetrics;
use axum::body::Body;
use axum::extract::rejection::QueryRejection;
use axum::extract::Query;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use axum::Router;
use batcher::BatchError;
use batcher::Batcher;
use futures::StreamExt;
use http_body_util::Limited;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;
use tracing::warn;
use tracing::Span;

/// The default bound on the size of a request body: 10 MiB
pub const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct RouterState {
    batcher: Batcher<Event>,
    authorizer: Arc<dyn Authorizer>,
    auth_token: Arc<str>,
    metrics: RouterMetrics,
    max_body_size: usize,
}

impl RouterState {
    pub fn new(
        batcher: Batcher<Event>,
        authorizer: Arc<dyn Authorizer>,
        auth_token: impl Into<Arc<str>>,
        metrics: RouterMetrics,
    ) -> Self {
        RouterState {
            batcher,
            authorizer,
            auth_token: auth_token.into(),
            metrics,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Requests with a larger body are rejected with `413 Payload Too Large`,
    /// keeping the rows received before the limit was reached.
    pub fn with_max_body_size(self, max_body_size: usize) -> Self {
        Self {
            max_body_size,
            ..self
        }
    }

    fn accept(
        &self,
        datasource: &Arc<str>,
        rows: impl Iterator<Item = Value>,
    ) -> Result<usize, BatchError> {
        let mut accepted = 0;
        for row in rows {
            self.batcher.add(Event::new(datasource.clone(), row))?;
            accepted += 1;
        }
        Ok(accepted)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestParams {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub successful_rows: usize,
    pub quarantined_rows: usize,
}

pub fn event_router(state: RouterState) -> Router {
    Router::new()
        .route("/v0/events", post(ingest_events))
        .route("/metrics", get(export_metrics))
        .with_state(state)
}

#[instrument(name = "eventrouter", skip_all, fields(datasource))]
async fn ingest_events(
    State(state): State<RouterState>,
    query: Result<Query<IngestParams>, QueryRejection>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, IngestError> {
    let credential = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    state
        .authorizer
        .authorize(&state.auth_token, credential)
        .await?;

    let Query(params) = query?;
    let datasource: Arc<str> = match params.name {
        Some(name) if !name.is_empty() => name.into(),
        _ => return Err(IngestError::MissingDatasource),
    };
    Span::current().record("datasource", &*datasource);

    let mut chunks = Body::new(Limited::new(body, state.max_body_size)).into_data_stream();
    let mut decoder = JsonStreamDecoder::default();
    let mut rows = Vec::new();
    let mut accepted = 0;
    loop {
        // Rows are buffered chunk by chunk,
        // so a request cancelled midway keeps what has been accepted so far.
        let (decoded, end_of_stream) = match chunks.next().await {
            Some(Ok(chunk)) => (decoder.decode(&chunk, &mut rows), false),
            Some(Err(err)) => {
                let err = IngestError::reading_body(err, state.max_body_size);
                warn!(accepted, error = %err, "Error reading request body");
                return Err(err);
            }
            None => (decoder.finish(&mut rows), true),
        };
        accepted += state.accept(&datasource, rows.drain(..))?;

        if let Err(err) = decoded {
            warn!(accepted, error = %err, "Error decoding row");
            return Err(IngestError::Decode(err));
        }
        if end_of_stream {
            break;
        }
    }

    let response = IngestResponse {
        successful_rows: accepted,
        quarantined_rows: 0,
    };
    let body = serde_json::to_vec(&response).map_err(IngestError::Serialization)?;
    Ok(([(CONTENT_TYPE, "application/json")], body).into_response())
}

async fn export_metrics(State(state): State<RouterState>) -> Result<Response, IngestError> {
    let body = state.metrics.encode()?;
    Ok(([(CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::BearerTokenAuthorizer;
    use crate::dispatcher::FlushDispatcher;
    use crate::test_helpers::RecordingSink;
    use assert_json_diff::assert_json_eq;
    use batcher::BatchConfigBuilder;
    use batcher::BatchReceiver;
    use http_body_util::BodyExt as _;
    use hyper::Method;
    use hyper::Request;
    use hyper::StatusCode;
    use serde_json::json;
    use std::time::Duration;
    use tower::Service;

    const TOKEN: &str = "test-token";

    struct TestHandle {
        app: Router,
        batcher: Batcher<Event>,
        batches: BatchReceiver<Event>,
        metrics: RouterMetrics,
    }

    fn setup(max_batch_size: usize) -> TestHandle {
        setup_with_body_limit(max_batch_size, DEFAULT_MAX_BODY_SIZE)
    }

    fn setup_with_body_limit(max_batch_size: usize, max_body_size: usize) -> TestHandle {
        let config = BatchConfigBuilder::new()
            .max_batch_size(max_batch_size)
            .build()
            .unwrap();
        let (batcher, batches) = Batcher::new(config);
        let metrics = RouterMetrics::new().unwrap();
        let state = RouterState::new(
            batcher.clone(),
            Arc::new(BearerTokenAuthorizer),
            TOKEN,
            metrics.clone(),
        )
        .with_max_body_size(max_body_size);

        TestHandle {
            app: event_router(state),
            batcher,
            batches,
            metrics,
        }
    }

    fn post_events(uri: &str, body: impl Into<Body>) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("Authorization", format!("Bearer {TOKEN}"))
            .body(body.into())
            .expect("request builder")
    }

    async fn body_text(response: Response) -> String {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(body.to_vec()).unwrap()
    }

    fn rows(batch: Vec<Event>) -> Vec<Value> {
        batch.into_iter().map(Event::into_row).collect()
    }

    #[tokio::test]
    async fn accept_concatenated_json_values() {
        let TestHandle {
            mut app,
            batcher,
            mut batches,
            ..
        } = setup(10);

        let response = app
            .call(post_events("/v0/events?name=ds1", r#"{"a":1}{"b":2}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_json_eq!(body, json!({"successfulRows": 2, "quarantinedRows": 0}));

        // Below the batch size: nothing flushed yet
        assert!(batches.try_recv().is_none());
        assert_eq!(batcher.len(), 2);
    }

    #[tokio::test]
    async fn a_full_batch_is_handed_off_across_requests() {
        let TestHandle {
            mut app,
            mut batches,
            ..
        } = setup(2);

        let response = app
            .call(post_events("/v0/events?name=ds1", r#"{"v":1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(batches.try_recv().is_none());

        let response = app
            .call(post_events("/v0/events?name=ds1", r#"{"v":2}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let batch = batches.try_recv().expect("a full batch");
        assert!(batch.iter().all(|event| event.datasource() == "ds1"));
        assert_eq!(rows(batch), vec![json!({"v": 1}), json!({"v": 2})]);
        assert!(batches.try_recv().is_none());
    }

    #[tokio::test]
    async fn an_empty_body_is_accepted() {
        let TestHandle { mut app, batcher, .. } = setup(10);

        let response = app
            .call(post_events("/v0/events?name=ds1", Body::empty()))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            r#"{"successfulRows":0,"quarantinedRows":0}"#
        );
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn reject_requests_without_credential() {
        let TestHandle { mut app, batcher, .. } = setup(10);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/v0/events?name=ds1")
            .body(Body::from(r#"{"a":1}"#))
            .expect("request builder");
        let response = app.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_text(response).await, "Unauthorized");
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn reject_requests_with_a_wrong_token() {
        let TestHandle { mut app, batcher, .. } = setup(10);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/v0/events?name=ds1")
            .header("Authorization", "Bearer not-the-token")
            .body(Body::from(r#"{"a":1}"#))
            .expect("request builder");
        let response = app.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn authorization_is_checked_before_the_datasource() {
        let TestHandle { mut app, .. } = setup(10);

        let req = Request::builder()
            .method(Method::POST)
            .uri("/v0/events")
            .body(Body::empty())
            .expect("request builder");
        let response = app.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn reject_requests_without_datasource() {
        let TestHandle { mut app, batcher, .. } = setup(10);

        for uri in ["/v0/events", "/v0/events?name=", "/v0/events?other=ds1"] {
            let response = app.call(post_events(uri, r#"{"a":1}"#)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body_text(response).await, "missing ?name=");
        }
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn rows_decoded_before_an_error_are_accepted() {
        let TestHandle { mut app, batcher, .. } = setup(10);

        let response = app
            .call(post_events(
                "/v0/events?name=ds1",
                r#"{"a":1} {"b":2} {"c": oops} {"d":4}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.starts_with("expected value"));
        assert_eq!(batcher.len(), 2);
    }

    #[tokio::test]
    async fn a_row_followed_by_an_invalid_byte_is_kept() {
        let TestHandle { mut app, batcher, .. } = setup(10);

        let response = app
            .call(post_events("/v0/events?name=ds1", r#"{"a":1} 2x"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.starts_with("expected value"));
        assert_eq!(batcher.len(), 2);
    }

    #[tokio::test]
    async fn an_error_on_the_first_row_accepts_nothing() {
        let TestHandle { mut app, batcher, .. } = setup(10);

        let response = app
            .call(post_events("/v0/events?name=ds1", "oops"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn accept_rows_split_across_body_chunks() {
        let TestHandle {
            mut app,
            mut batches,
            ..
        } = setup(3);

        let chunks = futures::stream::iter(
            [r#"{"a""#, r#":1} 2"#, r#"3 ["x""#, r#"]"#]
                .into_iter()
                .map(Ok::<_, std::io::Error>),
        );
        let response = app
            .call(post_events("/v0/events?name=ds1", Body::from_stream(chunks)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_text(response).await,
            r#"{"successfulRows":3,"quarantinedRows":0}"#
        );
        assert_eq!(
            rows(batches.try_recv().unwrap()),
            vec![json!({"a": 1}), json!(23), json!(["x"])]
        );
    }

    #[tokio::test]
    async fn reject_a_body_larger_than_the_limit() {
        let TestHandle { mut app, batcher, .. } = setup_with_body_limit(10, 16);

        let response = app
            .call(post_events(
                "/v0/events?name=ds1",
                r#"{"a":1} {"b":2} {"c":3}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            body_text(response).await,
            "Request body exceeds the limit of 16 bytes"
        );
        assert!(batcher.is_empty());
    }

    #[tokio::test]
    async fn rows_received_before_the_body_limit_are_kept() {
        let TestHandle { mut app, batcher, .. } = setup_with_body_limit(10, 16);

        let chunks = futures::stream::iter(
            [r#"{"a":1} "#, r#"{"b":2} {"c":3}"#]
                .into_iter()
                .map(Ok::<_, std::io::Error>),
        );
        let response = app
            .call(post_events("/v0/events?name=ds1", Body::from_stream(chunks)))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(batcher.len(), 1);
    }

    #[tokio::test]
    async fn a_body_at_the_limit_is_accepted() {
        let TestHandle { mut app, batcher, .. } = setup_with_body_limit(10, 16);

        let response = app
            .call(post_events("/v0/events?name=ds1", r#"{"a":1} {"b":22}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(batcher.len(), 2);
    }

    #[tokio::test]
    async fn flushed_rows_are_exported_as_prometheus_metrics() {
        let TestHandle {
            mut app,
            mut batches,
            metrics,
            ..
        } = setup(3);

        let response = app
            .call(post_events("/v0/events?name=ds1", "1 2 3"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let sink = Arc::new(RecordingSink::default());
        let dispatcher = FlushDispatcher::new(
            sink.clone(),
            Arc::new(metrics.clone()),
            Duration::from_secs(1),
        );
        dispatcher.dispatch(batches.try_recv().unwrap()).await;
        assert_eq!(sink.calls().len(), 1);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/metrics")
            .body(Body::empty())
            .expect("request builder");
        let response = app.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            prometheus::TEXT_FORMAT
        );
        let text = body_text(response).await;
        assert!(text.contains(r#"event_router_flushed_rows_total{datasource="ds1"} 3"#));
    }

    #[tokio::test]
    async fn reject_events_once_closed() {
        let TestHandle { mut app, batcher, .. } = setup(10);
        batcher.close();

        let response = app
            .call(post_events("/v0/events?name=ds1", r#"{"a":1}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_text(response).await, "Service is shutting down");
    }

    #[tokio::test]
    async fn only_post_is_routed() {
        let TestHandle { mut app, .. } = setup(10);

        let req = Request::builder()
            .method(Method::GET)
            .uri("/v0/events?name=ds1")
            .body(Body::empty())
            .expect("request builder");
        let response = app.call(req).await.unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
