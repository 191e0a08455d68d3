// API error taxonomy
// Maps every failure class onto an HTTP status and the `{"error": ...}`
// body shape the frontend expects.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad input, reported synchronously and never retried.
    #[error("{0}")]
    Validation(String),

    /// Cool-down or daily quota. `next_scan_allowed` is set for the
    /// per-repository cool-down so the client knows when to retry.
    #[error("{message}")]
    RateLimited {
        message: String,
        next_scan_allowed: Option<String>,
    },

    /// No token presented.
    #[error("Access denied. Token missing.")]
    Unauthorized,

    /// Token presented but invalid or expired.
    #[error("Invalid or expired token.")]
    Forbidden,

    /// Covers both missing records and records owned by someone else;
    /// the two must be indistinguishable.
    #[error("Scan not found or access denied")]
    NotFound,

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let ApiError::Database(e) = self {
            tracing::error!("database error: {}", e);
        }

        let mut body = serde_json::json!({ "error": self.to_string() });
        if let ApiError::RateLimited {
            next_scan_allowed: Some(next),
            ..
        } = self
        {
            body["nextScanAllowed"] = serde_json::json!(next);
        }

        HttpResponse::build(self.status_code()).json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(
            ApiError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::RateLimited {
                message: "wait".into(),
                next_scan_allowed: None
            }
            .status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ApiError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn rate_limit_body_carries_next_scan_allowed() {
        let err = ApiError::RateLimited {
            message: "You must wait".into(),
            next_scan_allowed: Some("2025-01-01T00:10:00.000Z".into()),
        };
        let response = err.error_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
