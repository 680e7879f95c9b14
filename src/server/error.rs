//! Server and API error types.

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::api::ErrorBody;
use super::handlers::apply_rate_limit_headers;
use crate::rate_limit::RateLimitCheck;
use crate::session::SessionError;
use crate::store::StoreError;

/// Errors that can occur while running the HTTP server.
#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("Failed to bind to {address}: {source}")]
    BindError {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// Server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Error returned by API handlers, rendered as `{"error", "message"}`.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Malformed or invalid request.
    #[error("{0}")]
    BadRequest(String),

    /// Failure from the session layer.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Too many teaching turns for this agent.
    #[error("Too many teaching turns, retry in {} seconds", .0.reset_after_seconds)]
    RateLimited(RateLimitCheck),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Session(SessionError::from(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Session(err) => match err {
                SessionError::UnknownConcept(_) | SessionError::EmptyMessage => {
                    StatusCode::BAD_REQUEST
                }
                SessionError::SessionClosed(_) => StatusCode::CONFLICT,
                err if err.is_not_found() => StatusCode::NOT_FOUND,
                SessionError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::RateLimited(_) => "rate_limited",
            Self::Session(err) => match err {
                SessionError::UnknownConcept(_) => "unknown_concept",
                SessionError::EmptyMessage => "empty_message",
                SessionError::SessionClosed(_) => "session_closed",
                err if err.is_not_found() => "not_found",
                SessionError::Store(_) => "internal",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        let body = ErrorBody {
            error: self.code().to_string(),
            message,
        };
        let mut response = (status, Json(body)).into_response();
        if let Self::RateLimited(check) = self {
            apply_rate_limit_headers(&mut response, check);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_bind_error_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "address in use");
        let error = ServerError::BindError {
            address: "127.0.0.1:8080".to_string(),
            source: io_error,
        };
        assert!(error
            .to_string()
            .contains("Failed to bind to 127.0.0.1:8080"));
        assert!(error.to_string().contains("address in use"));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApiError::BadRequest("bad".into()), StatusCode::BAD_REQUEST, "bad_request"),
            (
                ApiError::Session(SessionError::EmptyMessage),
                StatusCode::BAD_REQUEST,
                "empty_message",
            ),
            (
                ApiError::Session(SessionError::UnknownConcept("x".into())),
                StatusCode::BAD_REQUEST,
                "unknown_concept",
            ),
            (
                ApiError::Session(SessionError::SessionClosed(Uuid::nil())),
                StatusCode::CONFLICT,
                "session_closed",
            ),
            (
                ApiError::from(StoreError::AgentNotFound(Uuid::nil())),
                StatusCode::NOT_FOUND,
                "not_found",
            ),
            (
                ApiError::from(StoreError::TaskCancelled),
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
            ),
        ];

        for (error, status, code) in cases {
            assert_eq!(error.status(), status);
            assert_eq!(error.code(), code);
        }
    }

    #[test]
    fn test_rate_limited_response_headers() {
        let error = ApiError::RateLimited(RateLimitCheck {
            allowed: false,
            limit: 20,
            remaining: 0,
            reset_after_seconds: 42,
        });
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["ratelimit-limit"], "20");
        assert_eq!(response.headers()["ratelimit-remaining"], "0");
        assert_eq!(response.headers()["retry-after"], "42");
    }
}
