use http::StatusCode;
use thiserror::Error;

use crate::clients::ollama::UpstreamError;
use crate::models::chat_request::ShapeError;
use crate::models::response::ErrorBody;

const GENERIC_MESSAGE: &str = "Something went wrong";

/// Everything a request can fail with, as seen by the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    InvalidShape(#[from] ShapeError),

    #[error("Please provide an API key in the x-api-key header or Authorization header")]
    AuthMissing,

    #[error("The provided API key is invalid")]
    AuthInvalid,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Route {0} not found")]
    NotFound(String),

    #[error("Request body exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("{0}")]
    Unhandled(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidShape(_) => StatusCode::BAD_REQUEST,
            ApiError::AuthMissing => StatusCode::UNAUTHORIZED,
            ApiError::AuthInvalid => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Upstream(_) | ApiError::Unhandled(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ApiError::InvalidShape(shape) => shape.label(),
            ApiError::AuthMissing => "API key is required",
            ApiError::AuthInvalid => "Invalid API key",
            ApiError::NotFound(_) => "Not found",
            ApiError::PayloadTooLarge(_) => "Payload too large",
            ApiError::Upstream(_) | ApiError::Unhandled(_) => "Internal server error",
        }
    }

    /// Unhandled failures only reveal their message in development.
    pub fn to_body(&self, expose_details: bool) -> ErrorBody {
        let message = match self {
            ApiError::Unhandled(_) if !expose_details => GENERIC_MESSAGE.to_string(),
            other => other.to_string(),
        };
        ErrorBody::new(self.label(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_errors_are_distinct() {
        assert_eq!(ApiError::AuthMissing.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::AuthInvalid.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::AuthMissing.to_body(false).error, "API key is required");
        assert_eq!(ApiError::AuthInvalid.to_body(false).error, "Invalid API key");
    }

    #[test]
    fn test_shape_errors_are_bad_requests() {
        let err = ApiError::from(ShapeError::MissingMessages);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_body(false),
            ErrorBody::new(
                "Invalid request",
                "Messages array is required and must not be empty"
            )
        );
    }

    #[test]
    fn test_upstream_messages_are_always_shown() {
        let err = ApiError::from(UpstreamError::ConnectionRefused);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_body(false).message,
            "Ollama service is not running. Please start Ollama first."
        );
    }

    #[test]
    fn test_unhandled_message_is_hidden_outside_development() {
        let err = ApiError::Unhandled("task panicked".to_string());
        assert_eq!(err.to_body(false).message, "Something went wrong");
        assert_eq!(err.to_body(true).message, "task panicked");
    }
}
