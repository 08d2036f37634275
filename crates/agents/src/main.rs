//! ClaimRAG ask
//!
//! Answers questions about the indexed claim, either one question from the
//! command line or interactively until `exit`, `quit` or end of input.

use clap::{Parser, ValueEnum};
use claimrag_agents::{QueryEngine, QueryResponse};
use claimrag_common::config::{AppConfig, ObservabilityConfig};
use claimrag_common::db::{DbPool, Repository};
use claimrag_common::document::Route;
use claimrag_common::embeddings::create_embedder;
use claimrag_common::llm::create_chat_model;
use claimrag_common::metrics::register_metrics;
use claimrag_common::telemetry::init_tracing;
use claimrag_common::{DocStore, VERSION};
use std::io::{BufRead, Write};
use std::sync::Arc;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RouteArg {
    Needle,
    Summary,
}

impl From<RouteArg> for Route {
    fn from(arg: RouteArg) -> Self {
        match arg {
            RouteArg::Needle => Route::Needle,
            RouteArg::Summary => Route::Summary,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "ask", version, about = "Ask questions about the insurance claim")]
struct Args {
    /// Question to answer; starts an interactive session when omitted
    question: Option<String>,

    /// Skip the router and use this agent
    #[arg(long, value_enum)]
    route: Option<RouteArg>,

    /// Print the full response as JSON
    #[arg(long)]
    json: bool,
}

fn print_response(response: &QueryResponse, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
        return Ok(());
    }

    println!("\n[{}] {}\n", response.route.as_str().to_uppercase(), response.answer);
    println!("Sources:");
    for source in &response.sources {
        println!("  - Page {}: {} ({})", source.page, source.header, source.source_id);
    }
    if response.parent_pages_used > 0 {
        println!("Full pages added by auto-merge: {}", response.parent_pages_used);
    }
    Ok(())
}

async fn answer(engine: &QueryEngine, question: &str, route: Option<Route>) -> anyhow::Result<QueryResponse> {
    let response = match route {
        Some(route) => engine.ask_with_route(question, route).await?,
        None => engine.ask(question).await?,
    };
    Ok(response)
}

async fn interactive(engine: &QueryEngine, route: Option<Route>, json: bool) -> anyhow::Result<()> {
    println!("Insurance claim assistant. Type 'exit' or 'quit' to leave.");
    let stdin = std::io::stdin();
    let mut line = String::new();

    loop {
        print!("\nQuestion: ");
        std::io::stdout().flush()?;

        line.clear();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_ascii_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match answer(engine, question, route).await {
            Ok(response) => print_response(&response, json)?,
            Err(e) => {
                error!(error = %e, "Query failed");
                println!("Error: {}", e);
            }
        }
    }

    Ok(())
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
    info!("Starting ClaimRAG ask v{}", VERSION);
    config.validate()?;

    let pool = DbPool::new(&config.database).await?;
    let store = Arc::new(Repository::new(pool, config.embedding.dimension));
    let embedder = create_embedder(&config.embedding)?;
    let chat = create_chat_model(&config.llm)?;
    let docstore = Arc::new(DocStore::load(&config.paths.docstore_path)?);

    let engine = QueryEngine::from_parts(&config, store, embedder, chat, docstore);
    let route = args.route.map(Route::from);

    match args.question {
        Some(question) => {
            let response = answer(&engine, &question, route).await?;
            print_response(&response, args.json)
        }
        None => interactive(&engine, route, args.json).await,
    }
}
