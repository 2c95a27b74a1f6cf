use axum::response::{IntoResponse, Response};
use axum_helpers::AppError;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("{0}")]
    EmptyInput(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The deployed column width disagrees with the configured backend.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid input: {0}")]
    Validation(String),

    /// Rate limiting, auth failure or transport error from the embedding backend.
    #[error("Embedding backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

impl From<reqwest::Error> for EmbeddingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmbeddingError::Backend(format!("request timed out: {}", err))
        } else {
            EmbeddingError::Backend(err.to_string())
        }
    }
}

impl From<serde_json::Error> for EmbeddingError {
    fn from(err: serde_json::Error) -> Self {
        EmbeddingError::Internal(format!("JSON error: {}", err))
    }
}

impl From<DbErr> for EmbeddingError {
    fn from(err: DbErr) -> Self {
        EmbeddingError::Database(err.to_string())
    }
}

/// Convert EmbeddingError to AppError for standardized HTTP error responses
impl From<EmbeddingError> for AppError {
    fn from(err: EmbeddingError) -> Self {
        match err {
            EmbeddingError::EmptyInput(msg) => AppError::BadRequest(msg),
            err @ EmbeddingError::DimensionMismatch { .. } => AppError::BadRequest(err.to_string()),
            EmbeddingError::Validation(msg) => AppError::BadRequest(msg),
            EmbeddingError::Backend(msg) => {
                AppError::ServiceUnavailable(format!("Embedding backend error: {}", msg))
            }
            EmbeddingError::SchemaMismatch(msg) => {
                AppError::InternalServerError(format!("Schema mismatch: {}", msg))
            }
            EmbeddingError::Config(msg) => {
                AppError::InternalServerError(format!("Config error: {}", msg))
            }
            EmbeddingError::Database(msg) => {
                AppError::InternalServerError(format!("Database error: {}", msg))
            }
            EmbeddingError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for EmbeddingError {
    fn into_response(self) -> Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (EmbeddingError::EmptyInput("Query text is required".into()), StatusCode::BAD_REQUEST),
            (
                EmbeddingError::DimensionMismatch { expected: 384, actual: 1536 },
                StatusCode::BAD_REQUEST,
            ),
            (EmbeddingError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (EmbeddingError::Backend("429".into()), StatusCode::SERVICE_UNAVAILABLE),
            (EmbeddingError::Config("no key".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (EmbeddingError::SchemaMismatch("384 vs 1536".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (EmbeddingError::Database("gone".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (EmbeddingError::Internal("oops".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
