//! Answer collection
//!
//! Runs each test question through the query engine. Needle and summary
//! tests record the router's decision but are always answered by the agent
//! under test; routing tests only record the decision.

use crate::cache::AnswerRecord;
use crate::dataset::{TestCase, TestKind};
use chrono::Utc;
use claimrag_agents::QueryEngine;
use claimrag_common::document::Route;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

pub struct AnswerCollector {
    engine: Arc<QueryEngine>,
}

impl AnswerCollector {
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }

    /// Collect answers for a batch of tests, one record per test
    pub async fn collect(&self, kind: TestKind, tests: &[&TestCase]) -> Vec<AnswerRecord> {
        info!(kind = %kind, tests = tests.len(), "Collecting answers");
        let mut records = Vec::with_capacity(tests.len());

        for (i, test) in tests.iter().enumerate() {
            info!(test_id = %test.id, progress = format!("{}/{}", i + 1, tests.len()), "Collecting");
            let record = match kind.route() {
                Some(route) => self.collect_answer(test, route).await,
                None => self.collect_route(test).await,
            };
            records.push(record);
        }

        let failed = records.iter().filter(|r| r.is_error()).count();
        info!(kind = %kind, collected = records.len() - failed, failed, "Collection finished");
        records
    }

    #[instrument(skip(self, test), fields(test_id = %test.id))]
    async fn collect_answer(&self, test: &TestCase, agent: Route) -> AnswerRecord {
        let started = Instant::now();
        let mut record = AnswerRecord::for_test(test);
        record.agent_type = Some(agent);
        record.route = Some(self.engine.router().route(&test.question).await);

        match self.engine.ask_with_route(&test.question, agent).await {
            Ok(response) => {
                record.answer = Some(response.answer);
                record.sources = response.sources;
                record.chunks_used = Some(response.chunks_used);
                record.parent_pages_used = Some(response.parent_pages_used);
                record.summaries_used = Some(response.summaries_used);
            }
            Err(e) => {
                error!(error = %e, code = e.code().as_code(), "Failed to collect answer");
                record.error = Some(e.to_string());
            }
        }

        record.execution_time = started.elapsed().as_secs_f64();
        record.timestamp = Utc::now();
        record
    }

    #[instrument(skip(self, test), fields(test_id = %test.id))]
    async fn collect_route(&self, test: &TestCase) -> AnswerRecord {
        let started = Instant::now();
        let mut record = AnswerRecord::for_test(test);

        let route = self.engine.router().route(&test.question).await;
        record.route = Some(route);
        record.expected_route = test.expected_route;
        record.correct = test.expected_route.map(|expected| expected == route);

        record.execution_time = started.elapsed().as_secs_f64();
        record.timestamp = Utc::now();
        record
    }
}
