//! Error types for ClaimRAG
//!
//! Provides a single error enum shared by the indexer, the agents and the
//! QA suite, with:
//! - Distinct variants for each failure mode
//! - Numeric error codes for log correlation
//! - Retry classification for upstream calls

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,

    // Resource errors (4xxx)
    TableNotFound,

    // Database errors (7xxx)
    DatabaseError,
    ConnectionError,

    // External service errors (8xxx)
    UpstreamError,
    EmbeddingError,
    LlmError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,
    IoError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            ErrorCode::ValidationError => 1001,

            ErrorCode::TableNotFound => 4002,

            ErrorCode::DatabaseError => 7001,
            ErrorCode::ConnectionError => 7002,

            ErrorCode::UpstreamError => 8001,
            ErrorCode::EmbeddingError => 8002,
            ErrorCode::LlmError => 8003,

            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,
            ErrorCode::IoError => 9004,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    // Resource errors
    #[error("Table {table} does not exist, run the indexer setup first")]
    TableNotFound { table: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Database query error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Database connection error: {message}")]
    DatabaseConnection { message: String },

    // External service errors
    #[error("Embedding service error: {message}")]
    EmbeddingError {
        message: String,
        status: Option<u16>,
    },

    #[error("Language model error: {message}")]
    LlmError {
        message: String,
        status: Option<u16>,
    },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::TableNotFound { .. } => ErrorCode::TableNotFound,
            AppError::Database(_) | AppError::Sqlx(_) => ErrorCode::DatabaseError,
            AppError::DatabaseConnection { .. } => ErrorCode::ConnectionError,
            AppError::EmbeddingError { .. } => ErrorCode::EmbeddingError,
            AppError::LlmError { .. } => ErrorCode::LlmError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Io(_) => ErrorCode::IoError,
        }
    }

    /// Whether retrying the same upstream call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::LlmError {
                status: Some(status),
                ..
            }
            | AppError::EmbeddingError {
                status: Some(status),
                ..
            } => *status == 429 || *status >= 500,
            AppError::HttpClient(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            _ => false,
        }
    }

    /// Shorthand for an embedding failure without an HTTP status
    pub fn embedding(message: impl Into<String>) -> Self {
        AppError::EmbeddingError {
            message: message.into(),
            status: None,
        }
    }

    /// Shorthand for a language model failure without an HTTP status
    pub fn llm(message: impl Into<String>) -> Self {
        AppError::LlmError {
            message: message.into(),
            status: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_mapping() {
        let err = AppError::TableNotFound {
            table: "claim_chunks".into(),
        };
        assert_eq!(err.code(), ErrorCode::TableNotFound);
        assert_eq!(err.code().as_code(), 4002);
        assert!(err.to_string().contains("claim_chunks"));
    }

    #[test]
    fn test_retryable_llm_status() {
        let throttled = AppError::LlmError {
            message: "slow down".into(),
            status: Some(429),
        };
        let bad_request = AppError::LlmError {
            message: "bad".into(),
            status: Some(400),
        };
        let upstream = AppError::LlmError {
            message: "boom".into(),
            status: Some(503),
        };
        assert!(throttled.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(upstream.is_retryable());
        assert!(!AppError::llm("no status").is_retryable());
    }

    #[test]
    fn test_retryable_embedding_status() {
        let unauthorized = AppError::EmbeddingError {
            message: "bad key".into(),
            status: Some(401),
        };
        let overloaded = AppError::EmbeddingError {
            message: "busy".into(),
            status: Some(502),
        };
        assert!(!unauthorized.is_retryable());
        assert!(overloaded.is_retryable());
        assert!(!AppError::embedding("count mismatch").is_retryable());
    }

    #[test]
    fn test_io_error_conversion() {
        let err: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.code(), ErrorCode::IoError);
    }
}
