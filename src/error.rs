use axum::{ http::StatusCode, response::{ IntoResponse, Response }, Json };
use log::error;
use thiserror::Error;

use crate::config::prompt::PromptError;
use crate::models::api::ErrorBody;

/// Errors surfaced to HTTP callers. Each variant maps to one status code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    BadRequest(String),

    #[error("Server misconfigured: {0}")]
    Misconfigured(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Payment required: {0}")]
    PaymentRequired(String),

    #[error("{message}")]
    Unknown {
        status: Option<u16>,
        message: String,
    },
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::PaymentRequired(_) => StatusCode::PAYMENT_REQUIRED,
            AppError::Misconfigured(_) | AppError::Unknown { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        AppError::Unknown { status: None, message: message.into() }
    }
}

impl From<PromptError> for AppError {
    fn from(err: PromptError) -> Self {
        AppError::Misconfigured(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("Request failed with {}: {}", status, self);
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_categories() {
        assert_eq!(AppError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AppError::RateLimited("x".into()).status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::PaymentRequired("x".into()).status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::Misconfigured("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::unknown("boom").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(AppError::BadRequest("x".into()).status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unknown_displays_message_only() {
        let err = AppError::Unknown { status: Some(503), message: "upstream down".into() };
        assert_eq!(err.to_string(), "upstream down");
    }
}
