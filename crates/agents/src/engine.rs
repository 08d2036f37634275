//! Query engine: route, then answer with the chosen agent

use crate::needle::NeedleAgent;
use crate::router::RoutingAgent;
use crate::summary::SummaryAgent;
use crate::{Agent, AgentAnswer, Source};
use claimrag_common::config::AppConfig;
use claimrag_common::document::Route;
use claimrag_common::errors::Result;
use claimrag_common::metrics::record_query;
use claimrag_common::{ChatModel, ClaimStore, DocStore, Embedder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Answer to one question, with the route that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub query: String,
    pub route: Route,
    pub answer: String,
    pub sources: Vec<Source>,
    pub chunks_used: usize,
    pub parent_pages_used: usize,
    pub summaries_used: usize,
    pub elapsed_ms: u64,
}

impl QueryResponse {
    fn new(query: &str, route: Route, answer: AgentAnswer, elapsed_ms: u64) -> Self {
        Self {
            query: query.to_string(),
            route,
            answer: answer.answer,
            sources: answer.sources,
            chunks_used: answer.chunks_used,
            parent_pages_used: answer.parent_pages_used,
            summaries_used: answer.summaries_used,
            elapsed_ms,
        }
    }
}

pub struct QueryEngine {
    router: RoutingAgent,
    needle: NeedleAgent,
    summary: SummaryAgent,
}

impl QueryEngine {
    pub fn new(router: RoutingAgent, needle: NeedleAgent, summary: SummaryAgent) -> Self {
        Self {
            router,
            needle,
            summary,
        }
    }

    /// Wire all three agents to shared clients
    pub fn from_parts(
        config: &AppConfig,
        store: Arc<dyn ClaimStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        docstore: Arc<DocStore>,
    ) -> Self {
        let router = RoutingAgent::new(chat.clone());
        let needle = NeedleAgent::new(
            store.clone(),
            embedder.clone(),
            chat.clone(),
            docstore,
            &config.retrieval,
        );
        let summary = SummaryAgent::new(store, embedder, chat, config.retrieval.summary_top_k);
        Self::new(router, needle, summary)
    }

    pub fn router(&self) -> &RoutingAgent {
        &self.router
    }

    pub fn agent(&self, route: Route) -> &dyn Agent {
        match route {
            Route::Needle => &self.needle,
            Route::Summary => &self.summary,
        }
    }

    /// Route the question and answer it
    #[instrument(skip(self))]
    pub async fn ask(&self, query: &str) -> Result<QueryResponse> {
        let route = self.router.route(query).await;
        self.ask_with_route(query, route).await
    }

    /// Answer with a fixed route, bypassing the router
    #[instrument(skip(self))]
    pub async fn ask_with_route(&self, query: &str, route: Route) -> Result<QueryResponse> {
        let started = Instant::now();
        let answer = self.agent(route).answer(query).await?;

        let elapsed = started.elapsed();
        record_query(route.as_str(), elapsed.as_secs_f64());
        info!(
            route = %route,
            sources = answer.sources.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Query answered"
        );

        Ok(QueryResponse::new(query, route, answer, elapsed.as_millis() as u64))
    }
}
