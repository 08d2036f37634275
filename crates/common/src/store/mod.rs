//! Vector store abstraction for the two claim indexes
//!
//! The Postgres/pgvector implementation lives in [`crate::db::Repository`];
//! [`InMemoryStore`] ranks with cosine similarity in process and backs tests.

use crate::document::{NeedleChunk, PageKind, PageSummary, ScoredChunk, ScoredSummary};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::sync::RwLock;

/// Storage operations needed by the indexer and the agents
#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Create (or drop and recreate) both index tables
    async fn ensure_schema(&self, recreate: bool) -> Result<()>;

    /// Whether both index tables exist
    async fn tables_exist(&self) -> Result<bool>;

    /// Insert or replace a needle chunk keyed by chunk id
    async fn upsert_chunk(&self, chunk: &NeedleChunk, embedding: &[f32]) -> Result<()>;

    /// Insert or replace a page summary keyed by summary id
    async fn upsert_summary(&self, summary: &PageSummary, embedding: &[f32]) -> Result<()>;

    /// Top-k chunks by cosine similarity, best first
    async fn search_chunks(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>>;

    /// Every overview summary, in page order
    async fn overview_summaries(&self) -> Result<Vec<PageSummary>>;

    /// Top-k non-overview summaries by cosine similarity, best first
    async fn search_detail_summaries(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredSummary>>;

    async fn count_chunks(&self) -> Result<u64>;

    async fn count_summaries(&self) -> Result<u64>;
}

/// Cosine similarity, zero for empty or zero-norm vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

#[derive(Default)]
struct Tables {
    created: bool,
    chunks: Vec<(NeedleChunk, Vec<f32>)>,
    summaries: Vec<(PageSummary, Vec<f32>)>,
}

/// Process-local store with the same contract as the pgvector tables
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| AppError::Internal {
            message: "in-memory store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| AppError::Internal {
            message: "in-memory store lock poisoned".to_string(),
        })
    }
}

/// Stable sort by descending score, ties keep insertion order
fn rank<T>(mut scored: Vec<(T, f32)>, limit: usize) -> Vec<(T, f32)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn ensure_schema(&self, recreate: bool) -> Result<()> {
        let mut tables = self.write()?;
        if recreate {
            tables.chunks.clear();
            tables.summaries.clear();
        }
        tables.created = true;
        Ok(())
    }

    async fn tables_exist(&self) -> Result<bool> {
        Ok(self.read()?.created)
    }

    async fn upsert_chunk(&self, chunk: &NeedleChunk, embedding: &[f32]) -> Result<()> {
        let mut tables = self.write()?;
        let entry = (chunk.clone(), embedding.to_vec());
        match tables.chunks.iter_mut().find(|(c, _)| c.chunk_id == chunk.chunk_id) {
            Some(existing) => *existing = entry,
            None => tables.chunks.push(entry),
        }
        Ok(())
    }

    async fn upsert_summary(&self, summary: &PageSummary, embedding: &[f32]) -> Result<()> {
        let mut tables = self.write()?;
        let entry = (summary.clone(), embedding.to_vec());
        match tables
            .summaries
            .iter_mut()
            .find(|(s, _)| s.summary_id == summary.summary_id)
        {
            Some(existing) => *existing = entry,
            None => tables.summaries.push(entry),
        }
        Ok(())
    }

    async fn search_chunks(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        let tables = self.read()?;
        let scored = tables
            .chunks
            .iter()
            .map(|(chunk, emb)| (chunk.clone(), cosine_similarity(query, emb)))
            .collect();

        Ok(rank(scored, top_k)
            .into_iter()
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect())
    }

    async fn overview_summaries(&self) -> Result<Vec<PageSummary>> {
        let tables = self.read()?;
        let mut overviews: Vec<PageSummary> = tables
            .summaries
            .iter()
            .filter(|(s, _)| s.kind == PageKind::Overview)
            .map(|(s, _)| s.clone())
            .collect();
        overviews.sort_by_key(|s| s.page_number);
        Ok(overviews)
    }

    async fn search_detail_summaries(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredSummary>> {
        let tables = self.read()?;
        let scored = tables
            .summaries
            .iter()
            .filter(|(s, _)| s.kind != PageKind::Overview)
            .map(|(s, emb)| (s.clone(), cosine_similarity(query, emb)))
            .collect();

        Ok(rank(scored, limit)
            .into_iter()
            .map(|(summary, score)| ScoredSummary { summary, score })
            .collect())
    }

    async fn count_chunks(&self) -> Result<u64> {
        Ok(self.read()?.chunks.len() as u64)
    }

    async fn count_summaries(&self) -> Result<u64> {
        Ok(self.read()?.summaries.len() as u64)
    }
}
