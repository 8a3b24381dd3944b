//! Maps service failures onto HTTP responses with a JSON error body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use services::AggregationError;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] AggregationError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::Service(err) => {
                let status = match err {
                    AggregationError::MissingAuthor { .. } => StatusCode::BAD_GATEWAY,
                    AggregationError::ListingNotFound(_) => StatusCode::NOT_FOUND,
                    AggregationError::QueryError(_) | AggregationError::Validation(_) => {
                        StatusCode::BAD_REQUEST
                    }
                    AggregationError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                    AggregationError::ParseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.code())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            error!(error = %self, code, "request failed");
        }
        let body = ErrorBody {
            error: code,
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
