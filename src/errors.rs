use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Missing credential or misconfigured provider. A deployment defect,
    /// never retried.
    #[error("Provider configuration error: {0}")]
    ConfigError(String),

    /// Upstream returned a definitive HTTP status.
    #[error("{provider} returned HTTP {status}")]
    UpstreamStatus { provider: &'static str, status: u16 },

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AppError {
    /// Whether a retry with backoff could plausibly succeed.
    ///
    /// 4xx statuses other than 429 indicate a bad request and fail
    /// immediately; network errors, 5xx and rate limits are transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::UpstreamStatus { status, .. } => {
                *status == 429 || !(400..500).contains(status)
            }
            AppError::ExternalServiceError(_) => true,
            _ => false,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ConfigError(msg) => {
                tracing::error!("Provider configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Provider configuration error".to_string(),
                )
            }
            AppError::UpstreamStatus { .. } => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::ExternalServiceError(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal database error".to_string(),
                )
            }
        };

        (status, axum::Json(ErrorResponse { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_4xx_not_retryable() {
        let err = AppError::UpstreamStatus {
            provider: "openweather",
            status: 404,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_429_retryable() {
        let err = AppError::UpstreamStatus {
            provider: "openweather",
            status: 429,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_5xx_retryable() {
        let err = AppError::UpstreamStatus {
            provider: "noaa",
            status: 503,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_network_error_retryable() {
        assert!(AppError::ExternalServiceError("connection reset".into()).is_retryable());
    }

    #[test]
    fn test_config_error_not_retryable() {
        assert!(!AppError::ConfigError("OPENWEATHER_API_KEY not set".into()).is_retryable());
    }
}
