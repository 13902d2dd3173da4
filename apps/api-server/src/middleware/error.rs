//! Error handling - RFC 7807 compliant responses.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use marker_core::QuotaExceeded;
use marker_core::domain::QuotaDecision;
use marker_shared::ErrorResponse;
use std::fmt;

use super::rate_limit::rate_limit_headers;

/// Application-level error type that converts to RFC 7807 responses.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    Forbidden(String),
    /// Quota exhausted. Carries the decision for headers and retry hint.
    RateLimited(QuotaDecision),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Forbidden(msg) => write!(f, "Forbidden: {}", msg),
            AppError::RateLimited(decision) => write!(
                f,
                "Rate limit exceeded, retry after {} seconds",
                decision.retry_after_seconds
            ),
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        let error = match self {
            AppError::NotFound(detail) => ErrorResponse::not_found(detail),
            AppError::Forbidden(detail) => ErrorResponse::forbidden().with_detail(detail),
            AppError::RateLimited(decision) => {
                for header in rate_limit_headers(decision) {
                    builder.insert_header(header);
                }
                builder.insert_header(("Retry-After", decision.retry_after_seconds.to_string()));
                ErrorResponse::too_many_requests(decision.retry_after_seconds)
            }
        };

        builder.json(error)
    }
}

impl From<QuotaExceeded> for AppError {
    fn from(err: QuotaExceeded) -> Self {
        AppError::RateLimited(err.decision)
    }
}

/// Result type alias for handlers.
pub type AppResult<T> = Result<T, AppError>;
