//! ClaimRAG Common Library
//!
//! Shared code for the indexer, the query agents and the QA suite including:
//! - Claim document model (pages, needle chunks, page summaries)
//! - Vector store trait with pgvector and in-memory implementations
//! - Embedding and chat model client abstractions
//! - Error types and handling
//! - Configuration management
//! - Metrics and tracing setup

pub mod config;
pub mod db;
pub mod docstore;
pub mod document;
pub mod embeddings;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod retry;
pub mod store;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use docstore::DocStore;
pub use document::{ClaimPage, NeedleChunk, PageKind, PageMetadata, PageSummary, Route};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use llm::{ChatModel, ChatRequest};
pub use store::{ClaimStore, InMemoryStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// Default chat model for summaries, routing, answers and grading
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
