use crate::error::SettlementError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

/// Client-facing text for a failed enrollment write. Store details stay in
/// the logs.
pub const UPSTREAM_WRITE_MESSAGE: &str =
    "We could not complete your enrollment. Please contact support before retrying a payment.";

/// `{status: "success", message, data}`
#[derive(Debug, Serialize)]
pub struct Success<T: Serialize> {
    status: &'static str,
    message: String,
    data: T,
}

impl<T: Serialize> Success<T> {
    pub fn new(message: impl Into<String>, data: T) -> Self {
        Self {
            status: "success",
            message: message.into(),
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

#[derive(Debug, Serialize)]
struct Failure<'a> {
    status: &'static str,
    kind: &'a str,
    message: String,
}

/// HTTP status for each error kind.
pub fn status_for(err: &SettlementError) -> StatusCode {
    match err {
        SettlementError::BadRequest(_) | SettlementError::ValidationError(_) => {
            StatusCode::BAD_REQUEST
        }
        SettlementError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        SettlementError::Forbidden(_) => StatusCode::FORBIDDEN,
        SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::UpstreamPayment(_) => StatusCode::BAD_GATEWAY,
        SettlementError::UpstreamWrite { .. } => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for SettlementError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = match &self {
            SettlementError::BadRequest(message)
            | SettlementError::NotFound(message)
            | SettlementError::Unauthorized(message)
            | SettlementError::Forbidden(message) => message.clone(),
            SettlementError::UpstreamWrite { .. } => {
                error!(error = %self, "enrollment write failed");
                UPSTREAM_WRITE_MESSAGE.to_string()
            }
            err if status == StatusCode::INTERNAL_SERVER_ERROR => {
                error!(error = %err, "request failed");
                "Internal server error".to_string()
            }
            err => err.to_string(),
        };
        let body = Failure {
            status: "error",
            kind: self.kind(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SettlementError::BadRequest("x".into()), 400),
            (SettlementError::ValidationError("x".into()), 400),
            (SettlementError::Unauthorized("x".into()), 401),
            (SettlementError::Forbidden("x".into()), 403),
            (SettlementError::NotFound("x".into()), 404),
            (SettlementError::UpstreamPayment("x".into()), 502),
            (
                SettlementError::UpstreamWrite {
                    enrollment_written: true,
                    payment_written: false,
                    reason: "x".into(),
                },
                503,
            ),
            (SettlementError::internal("x"), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(status_for(&err).as_u16(), expected, "{err}");
        }
    }

    #[tokio::test]
    async fn test_write_failure_body_hides_store_error() {
        use http_body_util::BodyExt;

        let response = SettlementError::UpstreamWrite {
            enrollment_written: true,
            payment_written: false,
            reason: "rocksdb: IO error: No space left on device".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["kind"], "upstream_write_failure");
        assert_eq!(body["message"], UPSTREAM_WRITE_MESSAGE);
        assert!(!bytes.windows(5).any(|w| w == b"space"));
    }

    #[test]
    fn test_internal_details_are_not_leaked() {
        let response = SettlementError::internal("db password is hunter2").into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
