use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Message returned to callers that exceed the upload rate limit.
pub const RATE_LIMITED_MESSAGE: &str = "Too many uploads. Please wait a minute.";

/// Errors that can occur when running the Ephemera server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error (e.g. binding the listener).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A broker-level error surfaced through the API.
    #[error("broker error: {0}")]
    Broker(#[from] ephemera_broker::BrokerError),

    /// The request body was malformed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request body exceeded the configured ceiling.
    #[error("payload too large: {0}")]
    PayloadTooLarge(String),

    /// Authentication failed (missing or invalid shared secret).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds until the caller can retry.
        retry_after: u64,
    },
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        use ephemera_broker::BrokerError;

        let (status, message, retry_after) = match &self {
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),
            Self::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg.clone(), None),
            Self::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), None),
            Self::Io(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), None),
            Self::Broker(BrokerError::Validation(e)) => (StatusCode::BAD_REQUEST, e.to_string(), None),
            Self::Broker(BrokerError::NotFound) => (StatusCode::NOT_FOUND, "not found".to_owned(), None),
            Self::Broker(BrokerError::Expired) => (StatusCode::GONE, "expired".to_owned(), None),
            Self::Broker(e) if e.is_transient() => (
                StatusCode::SERVICE_UNAVAILABLE,
                "storage temporarily unavailable".to_owned(),
                None,
            ),
            Self::Broker(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error".to_owned(),
                None,
            ),
            Self::RateLimited { retry_after } => (
                StatusCode::TOO_MANY_REQUESTS,
                RATE_LIMITED_MESSAGE.to_owned(),
                Some(*retry_after),
            ),
        };

        let body = serde_json::json!({ "ok": false, "error": message });
        let mut response = (status, axum::Json(body)).into_response();

        if let Some(retry) = retry_after {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, retry.into());
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemera_broker::BrokerError;
    use ephemera_core::ValidationError;
    use ephemera_store::StoreError;

    #[test]
    fn rate_limited_sets_retry_after() {
        let response = ServerError::RateLimited { retry_after: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(axum::http::header::RETRY_AFTER).unwrap(),
            "42"
        );
    }

    #[test]
    fn broker_errors_map_to_statuses() {
        let cases = [
            (BrokerError::Validation(ValidationError::EmptyPayload), StatusCode::BAD_REQUEST),
            (BrokerError::NotFound, StatusCode::NOT_FOUND),
            (BrokerError::Expired, StatusCode::GONE),
            (
                BrokerError::Store(StoreError::Connection("down".into())),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (BrokerError::Access("sign".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }
    }
}
