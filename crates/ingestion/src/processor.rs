//! Indexing pipeline
//!
//! Core logic for building both indexes: table setup, needle chunks with the
//! parent page store, and per-page summaries.

use crate::chunker::chunk_pages;
use crate::errors::IngestionError;
use crate::metadata::{enrich_pages, load_metadata};
use crate::pdf::extract_pages;
use crate::summarizer::PageSummarizer;
use claimrag_common::config::AppConfig;
use claimrag_common::db::{CHUNKS_TABLE, SUMMARIES_TABLE};
use claimrag_common::document::ClaimPage;
use claimrag_common::errors::AppError;
use claimrag_common::metrics::{record_indexed, IndexKind};
use claimrag_common::{ChatModel, ClaimStore, DocStore, Embedder};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Which index a run builds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexTarget {
    Needle,
    Summary,
}

/// Options for one indexer run
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Drop and recreate the tables during setup
    pub recreate: bool,
    pub skip_setup: bool,
    /// Build only one index, both when unset
    pub only: Option<IndexTarget>,
    pub pdf_path: PathBuf,
    pub metadata_path: PathBuf,
}

impl IndexOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            recreate: true,
            skip_setup: false,
            only: None,
            pdf_path: config.paths.pdf_path.clone(),
            metadata_path: config.paths.metadata_path.clone(),
        }
    }

    fn builds(&self, target: IndexTarget) -> bool {
        self.only.map(|only| only == target).unwrap_or(true)
    }
}

/// Counters for one built index
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub pages: usize,
    pub items: usize,
    pub elapsed_ms: u64,
}

/// Result of a full run
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub needle: Option<IndexStats>,
    pub summary: Option<IndexStats>,
    pub chunks_in_store: u64,
    pub summaries_in_store: u64,
}

/// Builds the needle and summary indexes into a [`ClaimStore`]
pub struct IndexingPipeline {
    store: Arc<dyn ClaimStore>,
    embedder: Arc<dyn Embedder>,
    summarizer: PageSummarizer,
    config: Arc<AppConfig>,
}

impl IndexingPipeline {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        config: Arc<AppConfig>,
    ) -> Self {
        let summarizer = PageSummarizer::new(chat, config.llm.summary_temperature);
        Self {
            store,
            embedder,
            summarizer,
            config,
        }
    }

    /// Create (or recreate) both index tables
    #[instrument(skip(self))]
    pub async fn setup_schema(&self, recreate: bool) -> Result<(), IngestionError> {
        info!("Setting up index tables");
        self.store.ensure_schema(recreate).await?;
        info!(chunks_table = CHUNKS_TABLE, summaries_table = SUMMARIES_TABLE, "Index tables ready");
        Ok(())
    }

    async fn require_tables(&self, table: &str) -> Result<(), IngestionError> {
        if !self.store.tables_exist().await? {
            return Err(AppError::TableNotFound {
                table: table.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Read the PDF and keep the pages that have metadata
    #[instrument(skip(self, options), fields(pdf = %options.pdf_path.display()))]
    pub fn load_pages(&self, options: &IndexOptions) -> Result<Vec<ClaimPage>, IngestionError> {
        let metadata = load_metadata(&options.metadata_path)?;
        let pages = enrich_pages(extract_pages(&options.pdf_path)?, &metadata);

        if pages.is_empty() {
            return Err(IngestionError::NoPages(options.pdf_path.display().to_string()));
        }
        Ok(pages)
    }

    /// Chunk every page, persist the parent pages and index the chunks
    #[instrument(skip(self, pages), fields(pages = pages.len()))]
    pub async fn build_needle_index(&self, pages: &[ClaimPage]) -> Result<IndexStats, IngestionError> {
        self.require_tables(CHUNKS_TABLE).await?;
        let started = Instant::now();

        DocStore::from_pages(pages).save(&self.config.paths.docstore_path)?;

        let chunks = chunk_pages(pages, &self.config.chunking);
        info!(chunks = chunks.len(), "Pages chunked");

        let batch_size = self.config.embedding.batch_size.max(1);
        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != batch.len() {
                return Err(AppError::embedding(format!(
                    "Expected {} embeddings, received {}",
                    batch.len(),
                    embeddings.len()
                ))
                .into());
            }

            for (chunk, embedding) in batch.iter().zip(embeddings.iter()) {
                self.store.upsert_chunk(chunk, embedding).await?;
                debug!(chunk_id = %chunk.chunk_id, size = chunk.chunk_size(), "Chunk indexed");
            }
        }

        record_indexed(IndexKind::Chunks, chunks.len());
        let stats = IndexStats {
            pages: pages.len(),
            items: chunks.len(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(chunks = stats.items, elapsed_ms = stats.elapsed_ms, "Needle index built");
        Ok(stats)
    }

    /// Summarize every page and index the summaries
    #[instrument(skip(self, pages), fields(pages = pages.len()))]
    pub async fn build_summary_index(&self, pages: &[ClaimPage]) -> Result<IndexStats, IngestionError> {
        self.require_tables(SUMMARIES_TABLE).await?;
        let started = Instant::now();

        let mut indexed = 0;
        for page in pages {
            let summary = self.summarizer.summarize(page).await?;
            let embedding = self.embedder.embed(&summary.content).await?;
            self.store.upsert_summary(&summary, &embedding).await?;
            indexed += 1;
        }

        record_indexed(IndexKind::Summaries, indexed);
        let stats = IndexStats {
            pages: pages.len(),
            items: indexed,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(summaries = stats.items, elapsed_ms = stats.elapsed_ms, "Summary index built");
        Ok(stats)
    }

    /// Setup, then the needle index, then the summary index
    ///
    /// Stops at the first failing step.
    #[instrument(skip(self, options))]
    pub async fn run(&self, options: &IndexOptions) -> Result<IndexReport, IngestionError> {
        if options.skip_setup {
            warn!("Skipping table setup");
        } else {
            self.setup_schema(options.recreate).await?;
        }

        let pages = self.load_pages(options)?;
        let mut report = IndexReport::default();

        if options.builds(IndexTarget::Needle) {
            report.needle = Some(self.build_needle_index(&pages).await?);
        }
        if options.builds(IndexTarget::Summary) {
            report.summary = Some(self.build_summary_index(&pages).await?);
        }

        report.chunks_in_store = self.store.count_chunks().await?;
        report.summaries_in_store = self.store.count_summaries().await?;
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimrag_common::document::{PageKind, PageMetadata};
    use claimrag_common::embeddings::MockEmbedder;
    use claimrag_common::llm::MockChatModel;
    use claimrag_common::InMemoryStore;

    fn page(n: i32, kind: PageKind, text: &str) -> ClaimPage {
        ClaimPage::new(
            text,
            PageMetadata {
                page_number: n,
                header: format!("Page {} header", n),
                involved_parties: vec!["Sarah Mitchell".to_string()],
                date: "2024-03-15".to_string(),
                kind,
                character_count: None,
            },
        )
    }

    fn pages() -> Vec<ClaimPage> {
        vec![
            page(1, PageKind::Overview, "Claim CLM-2024-001 was filed. The total is $12,500."),
            page(2, PageKind::Details, "The tow truck arrived at 9:40 AM. The driver was Tom Reyes."),
        ]
    }

    fn pipeline(store: Arc<InMemoryStore>, tag: &str) -> IndexingPipeline {
        let mut config = AppConfig::default();
        config.paths.docstore_path = std::env::temp_dir()
            .join(format!("claimrag-index-{}-{}", tag, std::process::id()))
            .join("docstore.json");

        IndexingPipeline::new(
            store,
            Arc::new(MockEmbedder::new(64)),
            Arc::new(MockChatModel::constant("A short page summary.")),
            Arc::new(config),
        )
    }

    #[tokio::test]
    async fn test_indexing_requires_tables() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(store, "notables");

        let err = pipeline.build_needle_index(&pages()).await.unwrap_err();
        assert!(matches!(err, IngestionError::App(AppError::TableNotFound { .. })));
    }

    #[tokio::test]
    async fn test_needle_index_persists_parents() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(store.clone(), "needle");
        pipeline.setup_schema(true).await.unwrap();

        let stats = pipeline.build_needle_index(&pages()).await.unwrap();
        assert_eq!(stats.pages, 2);
        assert_eq!(stats.items, 2);
        assert_eq!(store.count_chunks().await.unwrap(), 2);

        let docstore = DocStore::load(&pipeline.config.paths.docstore_path).unwrap();
        assert_eq!(docstore.len(), 2);
        assert!(docstore.text_of("page_2").unwrap().contains("Tom Reyes"));

        if let Some(dir) = pipeline.config.paths.docstore_path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[tokio::test]
    async fn test_summary_index_keeps_overview_kind() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(store.clone(), "summary");
        pipeline.setup_schema(false).await.unwrap();

        let stats = pipeline.build_summary_index(&pages()).await.unwrap();
        assert_eq!(stats.items, 2);

        let overviews = store.overview_summaries().await.unwrap();
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].summary_id, "page_1_summary");
        assert_eq!(overviews[0].content, "A short page summary.");
    }

    #[tokio::test]
    async fn test_summary_failure_aborts() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_schema(false).await.unwrap();
        let pipeline = IndexingPipeline::new(
            store.clone(),
            Arc::new(MockEmbedder::new(16)),
            Arc::new(MockChatModel::failing("quota exceeded")),
            Arc::new(AppConfig::default()),
        );

        let err = tokio_test::assert_err!(pipeline.build_summary_index(&pages()).await);
        assert!(matches!(err, IngestionError::SummaryFailed { .. }));
        assert_eq!(store.count_summaries().await.unwrap(), 0);
    }

    /// Returns one vector fewer than requested
    struct ShortEmbedder(MockEmbedder);

    #[async_trait::async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed(&self, text: &str) -> claimrag_common::Result<Vec<f32>> {
            self.0.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> claimrag_common::Result<Vec<Vec<f32>>> {
            let mut vectors = self.0.embed_batch(texts).await?;
            vectors.pop();
            Ok(vectors)
        }

        fn model_name(&self) -> &str {
            "short"
        }

        fn dimension(&self) -> usize {
            self.0.dimension()
        }
    }

    #[tokio::test]
    async fn test_short_embedding_batch_aborts() {
        let store = Arc::new(InMemoryStore::new());
        store.ensure_schema(false).await.unwrap();
        let mut config = AppConfig::default();
        config.paths.docstore_path = std::env::temp_dir()
            .join(format!("claimrag-index-short-{}", std::process::id()))
            .join("docstore.json");
        let pipeline = IndexingPipeline::new(
            store.clone(),
            Arc::new(ShortEmbedder(MockEmbedder::new(16))),
            Arc::new(MockChatModel::constant("unused")),
            Arc::new(config),
        );

        let err = tokio_test::assert_err!(pipeline.build_needle_index(&pages()).await);
        assert!(matches!(err, IngestionError::App(AppError::EmbeddingError { .. })));
        assert_eq!(store.count_chunks().await.unwrap(), 0);

        if let Some(dir) = pipeline.config.paths.docstore_path.parent() {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[test]
    fn test_options_target_selection() {
        let mut options = IndexOptions::from_config(&AppConfig::default());
        assert!(options.builds(IndexTarget::Needle));
        assert!(options.builds(IndexTarget::Summary));

        options.only = Some(IndexTarget::Summary);
        assert!(!options.builds(IndexTarget::Needle));
        assert!(options.builds(IndexTarget::Summary));
    }

    #[tokio::test]
    async fn test_run_fails_without_pdf() {
        let store = Arc::new(InMemoryStore::new());
        let pipeline = pipeline(store.clone(), "nopdf");
        let mut options = IndexOptions::from_config(&AppConfig::default());
        options.pdf_path = PathBuf::from("/nonexistent/claim.pdf");
        options.metadata_path = PathBuf::from("/nonexistent/claim_metadata.json");

        let err = pipeline.run(&options).await.unwrap_err();
        assert!(matches!(err, IngestionError::FileNotFound(_)));
        assert!(store.tables_exist().await.unwrap());
    }
}
