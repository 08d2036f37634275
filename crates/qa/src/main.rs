//! ClaimRAG QA runner
//!
//! `qa run` collects (or reuses cached) answers for the needle, summary and
//! routing datasets, grades them and merges the scores into the JSON report.
//! `qa hitl` walks a reviewer through the human-graded dataset.

use anyhow::Context;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use claimrag_agents::QueryEngine;
use claimrag_common::config::{AppConfig, ObservabilityConfig};
use claimrag_common::db::{DbPool, Repository};
use claimrag_common::embeddings::create_embedder;
use claimrag_common::llm::create_chat_model;
use claimrag_common::metrics::register_metrics;
use claimrag_common::telemetry::init_tracing;
use claimrag_common::{DocStore, VERSION};
use claimrag_qa::dataset::filter_by_kind;
use claimrag_qa::graders::{CodeGrader, HitlGrader, HitlSession, ModelGrader};
use claimrag_qa::{load_tests, AnswerCache, AnswerCollector, AnswerRecord, QaReport, TestCase, TestKind};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TestType {
    Needle,
    Summary,
    Routing,
    All,
}

impl TestType {
    fn kinds(self) -> Vec<TestKind> {
        match self {
            TestType::Needle => vec![TestKind::Needle],
            TestType::Summary => vec![TestKind::Summary],
            TestType::Routing => vec![TestKind::Routing],
            TestType::All => TestKind::ALL.to_vec(),
        }
    }

    fn kind(self) -> Option<TestKind> {
        match self {
            TestType::All => None,
            other => other.kinds().first().copied(),
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "qa", version, about = "Grade the claim agents against the QA datasets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Collect answers and run the automated graders
    Run(RunArgs),
    /// Review answers interactively
    Hitl(HitlArgs),
}

#[derive(Debug, ClapArgs)]
struct RunArgs {
    #[arg(long, value_enum, default_value = "all")]
    test_type: TestType,

    /// Only run the regex grader
    #[arg(long, conflicts_with = "model_only")]
    code_only: bool,

    /// Only run the LLM judge
    #[arg(long)]
    model_only: bool,

    /// Reuse cached answers whose question is unchanged
    #[arg(long)]
    cached: bool,

    /// Replace the report instead of merging into it
    #[arg(long)]
    clear_results: bool,
}

#[derive(Debug, ClapArgs)]
struct HitlArgs {
    #[arg(long, value_enum, default_value = "all")]
    test_type: TestType,

    /// Only review tests without a rating in the existing report
    #[arg(long)]
    resume: bool,

    /// Name recorded with each rating
    #[arg(long, default_value = "user")]
    reviewer: String,
}

/// Connections built on first use, so fully cached runs never touch the
/// database or the answer model
struct Suite {
    config: Arc<AppConfig>,
    engine: Option<Arc<QueryEngine>>,
}

impl Suite {
    fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            engine: None,
        }
    }

    async fn collector(&mut self) -> anyhow::Result<AnswerCollector> {
        if let Some(engine) = &self.engine {
            return Ok(AnswerCollector::new(engine.clone()));
        }

        let config = &self.config;
        config.validate()?;
        let pool = DbPool::new(&config.database).await?;
        let store = Arc::new(Repository::new(pool, config.embedding.dimension));
        let embedder = create_embedder(&config.embedding)?;
        let chat = create_chat_model(&config.llm)?;
        let docstore = Arc::new(
            DocStore::load(&config.paths.docstore_path).context("parent page store missing, run the indexer first")?,
        );

        let engine = Arc::new(QueryEngine::from_parts(config, store, embedder, chat, docstore));
        self.engine = Some(engine.clone());
        Ok(AnswerCollector::new(engine))
    }

    fn dataset_path(&self, kind: TestKind) -> &PathBuf {
        match kind {
            TestKind::Needle => &self.config.qa.needle_tests,
            TestKind::Summary => &self.config.qa.summary_tests,
            TestKind::Routing => &self.config.qa.routing_tests,
        }
    }

    /// Answers for `tests`, from the cache when allowed, collecting the rest
    async fn answers(
        &mut self,
        kind: TestKind,
        tests: &[TestCase],
        use_cache: bool,
    ) -> anyhow::Result<BTreeMap<String, AnswerRecord>> {
        let cache_path = self.config.qa.cached_answers.clone();
        let (mut answers, missing) = if use_cache {
            AnswerCache::load(&cache_path)?.fresh(kind, tests)
        } else {
            (Vec::new(), tests.iter().collect())
        };

        if !missing.is_empty() {
            let collected = self.collector().await?.collect(kind, &missing).await;
            AnswerCache::merge_and_save(&cache_path, kind, &collected)?;
            answers.extend(collected);
        }

        Ok(answers.into_iter().map(|a| (a.test_id.clone(), a)).collect())
    }
}

async fn run(suite: &mut Suite, args: RunArgs) -> anyhow::Result<()> {
    let config = suite.config.clone();
    let code_grader = CodeGrader::new(config.qa.pass_threshold);
    let model_grader = if args.code_only {
        None
    } else {
        let judge = create_chat_model(&config.grader_llm())?;
        info!(model = judge.model_name(), "Model grader ready");
        Some(ModelGrader::new(judge, config.grader_delay(), config.qa.pass_threshold))
    };

    let mut report = QaReport::new();
    for kind in args.test_type.kinds() {
        let graded_by_code = !args.model_only && kind != TestKind::Summary;
        let graded_by_model = model_grader.is_some() && kind != TestKind::Routing;
        if !graded_by_code && !graded_by_model {
            warn!(kind = %kind, "No grader selected for these tests, skipping");
            continue;
        }

        let tests = load_tests(suite.dataset_path(kind))?;
        if tests.is_empty() {
            warn!(kind = %kind, "No tests to run");
            continue;
        }

        let answers = suite.answers(kind, &tests, args.cached).await?;
        let code = graded_by_code.then(|| code_grader.grade_batch(kind, &tests, &answers));
        if let Some(batch) = &code {
            info!(kind = %kind, passed = batch.passed_tests, total = batch.total_tests, average = batch.average_score, "Code grading finished");
        }

        if kind == TestKind::Routing {
            if let Some(batch) = code {
                report.add_routing(batch);
            }
            continue;
        }

        let model = match (&model_grader, graded_by_model) {
            (Some(grader), true) => {
                let batch = grader.grade_batch(kind, &tests, &answers).await;
                info!(kind = %kind, passed = batch.passed_tests, total = batch.total_tests, average = batch.average_score, "Model grading finished");
                Some(batch)
            }
            _ => None,
        };
        report.add_graded(kind, code, model);
    }

    let report = report.save(&config.qa.results_json, !args.clear_results)?;
    println!("{}", report.render_summary());
    Ok(())
}

async fn hitl(suite: &mut Suite, args: HitlArgs) -> anyhow::Result<()> {
    let config = suite.config.clone();
    let tests = filter_by_kind(load_tests(&config.qa.hitl_tests)?, args.test_type.kind());
    if tests.is_empty() {
        warn!("No HITL tests to review");
        return Ok(());
    }

    let mut answers = BTreeMap::new();
    for kind in TestKind::ALL {
        let of_kind: Vec<TestCase> = tests.iter().filter(|t| t.query_type == Some(kind)).cloned().collect();
        if !of_kind.is_empty() {
            answers.extend(suite.answers(kind, &of_kind, true).await?);
        }
    }

    let previous = if args.resume && config.qa.results_json.exists() {
        QaReport::load(&config.qa.results_json)?.detailed_results.hitl_tests
    } else {
        Vec::new()
    };
    let completed = HitlSession::completed_ids(&previous);
    let remaining: Vec<TestCase> = tests.iter().filter(|t| !completed.contains(&t.id)).cloned().collect();
    if remaining.is_empty() {
        info!("All HITL tests already have a rating");
        return Ok(());
    }
    if args.resume {
        info!(remaining = remaining.len(), "Resuming HITL session");
    }

    let stdin = std::io::stdin();
    let session = HitlGrader::new(stdin.lock(), std::io::stdout())
        .with_reviewer(args.reviewer)
        .grade_batch(&remaining, &answers)?;
    let session = if args.resume {
        HitlSession::resume(previous, session, tests.len())
    } else {
        session
    };

    let mut report = QaReport::new();
    report.set_hitl(session);
    let report = report.save(&config.qa.results_json, true)?;
    println!("{}", report.render_summary());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

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
    info!("Starting ClaimRAG QA v{}", VERSION);

    let mut suite = Suite::new(config);
    match cli.command {
        Command::Run(args) => run(&mut suite, args).await,
        Command::Hitl(args) => hitl(&mut suite, args).await,
    }
}
