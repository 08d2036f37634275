//! QA suite error types

use claimrag_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QaError {
    #[error("Invalid test dataset {path}: {message}")]
    Dataset { path: String, message: String },

    #[error("Invalid test case {id}: {message}")]
    InvalidTest { id: String, message: String },

    #[error("Grader setup failed: {0}")]
    Grader(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    App(#[from] AppError),
}

pub type Result<T> = std::result::Result<T, QaError>;
