//! ClaimRAG query agents
//!
//! Two retrieval strategies over the claim document:
//! - Needle agent (small chunks, auto-merged with their parent page)
//! - Summary agent (page summaries, overview pages always included)
//!
//! A routing agent picks one strategy per question and the
//! [`QueryEngine`] ties the three together.

pub mod engine;
pub mod needle;
pub mod prompts;
pub mod router;
pub mod summary;

pub use engine::{QueryEngine, QueryResponse};
pub use needle::NeedleAgent;
pub use router::RoutingAgent;
pub use summary::SummaryAgent;

use claimrag_common::document::{PageKind, Route, ScoredChunk, ScoredSummary};
use claimrag_common::errors::Result;
use serde::{Deserialize, Serialize};

/// Reply when retrieval returns nothing
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find relevant information to answer your question.";

/// Reply when the answer model fails
pub const GENERATION_FAILED_ANSWER: &str = "An error occurred while generating the answer.";

/// A retrieved item that backed an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub page: i32,
    pub header: String,
    /// Chunk id for needle sources, summary id for summary sources
    pub source_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: PageKind,
    pub score: f32,
}

impl From<&ScoredChunk> for Source {
    fn from(scored: &ScoredChunk) -> Self {
        let chunk = &scored.chunk;
        Self {
            page: chunk.page_number,
            header: chunk.header.clone(),
            source_id: chunk.chunk_id.clone(),
            content: chunk.content.clone(),
            kind: chunk.kind,
            score: scored.score,
        }
    }
}

impl From<&ScoredSummary> for Source {
    fn from(scored: &ScoredSummary) -> Self {
        let summary = &scored.summary;
        Self {
            page: summary.page_number,
            header: summary.header.clone(),
            source_id: summary.summary_id.clone(),
            content: summary.content.clone(),
            kind: summary.kind,
            score: scored.score,
        }
    }
}

/// Answer produced by one agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentAnswer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub chunks_used: usize,
    /// Parent pages added to the context by auto-merge
    pub parent_pages_used: usize,
    pub summaries_used: usize,
}

impl AgentAnswer {
    pub fn no_context() -> Self {
        Self {
            answer: NO_CONTEXT_ANSWER.to_string(),
            ..Self::default()
        }
    }
}

/// Common trait for the retrieval agents
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// Retrieve context and answer the question
    async fn answer(&self, query: &str) -> Result<AgentAnswer>;

    /// Route this agent serves
    fn route(&self) -> Route;
}
