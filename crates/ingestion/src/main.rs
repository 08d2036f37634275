//! ClaimRAG Indexer
//!
//! Builds both retrieval indexes for the claim document:
//! 1. Creates the pgvector tables
//! 2. Extracts PDF pages and joins them with their metadata
//! 3. Chunks pages into the needle index and saves the parent page store
//! 4. Summarizes pages into the summary index

mod chunker;
mod errors;
mod metadata;
mod pdf;
mod processor;
mod summarizer;

use clap::{Parser, ValueEnum};
use claimrag_common::config::{AppConfig, ObservabilityConfig};
use claimrag_common::db::{DbPool, Repository};
use claimrag_common::embeddings::create_embedder;
use claimrag_common::llm::create_chat_model;
use claimrag_common::metrics::register_metrics;
use claimrag_common::telemetry::init_tracing;
use claimrag_common::VERSION;
use processor::{IndexOptions, IndexTarget, IndexingPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Only {
    Needle,
    Summary,
}

#[derive(Debug, Parser)]
#[command(name = "indexer", version, about = "Build the needle and summary indexes")]
struct Args {
    /// Keep existing tables and upsert into them
    #[arg(long)]
    no_recreate: bool,

    /// Do not touch the table schema
    #[arg(long)]
    skip_setup: bool,

    /// Build a single index
    #[arg(long, value_enum)]
    only: Option<Only>,

    /// Claim PDF, overrides `paths.pdf_path`
    #[arg(long)]
    pdf: Option<PathBuf>,

    /// Page metadata JSON, overrides `paths.metadata_path`
    #[arg(long)]
    metadata: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Load configuration
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&ObservabilityConfig::default());
            error!(error = %e, "Failed to load configuration");
            return Err(e.into());
        }
    };

    init_tracing(&config.observability);
    register_metrics();
    info!("Starting ClaimRAG Indexer v{}", VERSION);

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(e.into());
    }
    let config = Arc::new(config);

    let mut options = IndexOptions::from_config(&config);
    options.recreate = !args.no_recreate;
    options.skip_setup = args.skip_setup;
    options.only = args.only.map(|only| match only {
        Only::Needle => IndexTarget::Needle,
        Only::Summary => IndexTarget::Summary,
    });
    if let Some(pdf) = args.pdf {
        options.pdf_path = pdf;
    }
    if let Some(metadata) = args.metadata {
        options.metadata_path = metadata;
    }

    // Initialize database connection
    let pool = DbPool::new(&config.database).await?;
    let store = Arc::new(Repository::new(pool, config.embedding.dimension));

    let embedder = create_embedder(&config.embedding)?;
    let chat = create_chat_model(&config.llm)?;
    info!(
        embedding_model = embedder.model_name(),
        chat_model = chat.model_name(),
        "Models configured"
    );

    let pipeline = IndexingPipeline::new(store, embedder, chat, config.clone());
    match pipeline.run(&options).await {
        Ok(report) => {
            info!(
                chunks = report.chunks_in_store,
                summaries = report.summaries_in_store,
                "Indexing complete"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Indexing failed");
            Err(e.into())
        }
    }
}
