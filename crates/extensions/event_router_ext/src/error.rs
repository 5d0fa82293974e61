use crate::auth::AuthError;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use batcher::BatchError;
use http_body_util::LengthLimitError;

#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    #[error("missing ?name=")]
    MissingDatasource,

    #[error(transparent)]
    InvalidQuery(#[from] QueryRejection),

    #[error(transparent)]
    Decode(serde_json::Error),

    #[error("Failed to read request body: {0}")]
    ReadBody(#[from] axum::Error),

    #[error("Request body exceeds the limit of {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error(transparent)]
    ShuttingDown(#[from] BatchError),

    #[error("Failed to serialize response: {0}")]
    Serialization(serde_json::Error),

    #[error("Failed to encode metrics: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl IngestError {
    pub(crate) fn reading_body(err: axum::Error, limit: usize) -> Self {
        let err = err.into_inner();
        if err.is::<LengthLimitError>() {
            IngestError::PayloadTooLarge { limit }
        } else {
            IngestError::ReadBody(axum::Error::new(err))
        }
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        use IngestError as E;
        let error_message = self.to_string();
        match self {
            E::Unauthorized(err) => {
                tracing::warn!(error = %err, "Failed to authorize request");
                (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
            }
            E::MissingDatasource | E::InvalidQuery(_) | E::Decode(_) | E::ReadBody(_) => {
                (StatusCode::BAD_REQUEST, error_message).into_response()
            }
            E::PayloadTooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, error_message).into_response()
            }
            E::ShuttingDown(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Service is shutting down",
            )
                .into_response(),
            E::Serialization(_) | E::Metrics(_) => {
                tracing::error!("{error_message}");
                (StatusCode::INTERNAL_SERVER_ERROR, error_message).into_response()
            }
        }
    }
}
