//! Indexer error types

use claimrag_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("PDF parse error for {path}: {message}")]
    PdfParseError { path: String, message: String },

    #[error("Metadata error for {path}: {message}")]
    MetadataError { path: String, message: String },

    #[error("No pages with metadata found in {0}")]
    NoPages(String),

    #[error("Summary generation failed for {page_id}: {source}")]
    SummaryFailed {
        page_id: String,
        #[source]
        source: AppError,
    },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    App(#[from] AppError),
}
