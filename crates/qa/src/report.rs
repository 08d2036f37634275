//! QA report
//!
//! Per-test results from every grader are kept under `detailed_results`;
//! agent, grader and overall scores are always derived from that detail, so
//! a report merged from several runs stays consistent.

use crate::dataset::TestKind;
use crate::errors::Result;
use crate::graders::hitl::{HitlGrade, HitlSession};
use crate::graders::{mean, CodeGrade, GradeBatch, ModelGrade};
use chrono::{DateTime, Utc};
use claimrag_common::document::Route;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

const REPORT_TYPE: &str = "qa_testing_suite";
const REPORT_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub report_generated: DateTime<Utc>,
    pub report_type: String,
    pub version: String,
    pub run_id: Uuid,
}

impl Default for ReportMetadata {
    fn default() -> Self {
        Self {
            report_generated: Utc::now(),
            report_type: REPORT_TYPE.to_string(),
            version: REPORT_VERSION.to_string(),
            run_id: Uuid::new_v4(),
        }
    }
}

/// Code and model grades for one test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedResult {
    pub test_id: String,
    pub test_type: TestKind,
    pub graded_at: DateTime<Utc>,
    pub code_grader: Option<CodeGrade>,
    pub model_grader: Option<ModelGrade>,
    pub combined_score: f64,
}

impl CombinedResult {
    fn new(test_id: String, test_type: TestKind, code: Option<CodeGrade>, model: Option<ModelGrade>) -> Self {
        let scores = code
            .as_ref()
            .map(|c| c.score)
            .into_iter()
            .chain(model.as_ref().map(|m| m.overall_score));
        Self {
            test_id,
            test_type,
            graded_at: Utc::now(),
            combined_score: mean(scores).unwrap_or(0.0),
            code_grader: code,
            model_grader: model,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentScore {
    pub total_tests: usize,
    pub average_code_score: Option<f64>,
    pub average_model_score: Option<f64>,
    pub average_combined_score: f64,
}

impl AgentScore {
    fn from_results(results: &[CombinedResult]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }
        Some(Self {
            total_tests: results.len(),
            average_code_score: mean(results.iter().filter_map(|r| r.code_grader.as_ref().map(|c| c.score))),
            average_model_score: mean(
                results
                    .iter()
                    .filter_map(|r| r.model_grader.as_ref().map(|m| m.overall_score)),
            ),
            average_combined_score: mean(results.iter().map(|r| r.combined_score)).unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingScore {
    pub total_tests: usize,
    pub correct_routes: usize,
    pub accuracy: f64,
    pub needle_accuracy: f64,
    pub summary_accuracy: f64,
}

impl RoutingScore {
    fn from_results(results: &[CodeGrade]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }

        let accuracy_for = |route: Route| {
            let expected: Vec<&CodeGrade> = results.iter().filter(|r| r.expected_route == Some(route)).collect();
            let correct = expected.iter().filter(|r| r.passed == Some(true)).count();
            correct as f64 / expected.len().max(1) as f64
        };

        Some(Self {
            total_tests: results.len(),
            correct_routes: results.iter().filter(|r| r.passed == Some(true)).count(),
            accuracy: mean(results.iter().map(|r| r.score)).unwrap_or(0.0),
            needle_accuracy: accuracy_for(Route::Needle),
            summary_accuracy: accuracy_for(Route::Summary),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentScores {
    pub needle_agent: Option<AgentScore>,
    pub summary_agent: Option<AgentScore>,
    pub routing_agent: Option<RoutingScore>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraderScore {
    pub average_score: f64,
    pub needle_score: Option<f64>,
    pub summary_score: Option<f64>,
}

impl GraderScore {
    fn from_scores(needle: &[f64], summary: &[f64]) -> Self {
        Self {
            average_score: mean(needle.iter().chain(summary).copied()).unwrap_or(0.0),
            needle_score: mean(needle.iter().copied()),
            summary_score: mean(summary.iter().copied()),
        }
    }

    fn is_empty(&self) -> bool {
        self.needle_score.is_none() && self.summary_score.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlKindScore {
    pub total_tests: usize,
    pub average_rating: f64,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlSummary {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub skipped_tests: usize,
    pub average_rating: f64,
    pub average_score: f64,
    pub by_agent_type: BTreeMap<TestKind, HitlKindScore>,
}

impl HitlSummary {
    fn from_results(results: &[HitlGrade]) -> Option<Self> {
        if results.is_empty() {
            return None;
        }

        let completed: Vec<&HitlGrade> = results.iter().filter(|r| !r.skipped).collect();
        let averages = |grades: &[&HitlGrade]| {
            (
                mean(grades.iter().filter_map(|g| g.rating.map(f64::from))).unwrap_or(0.0),
                mean(grades.iter().filter_map(|g| g.score)).unwrap_or(0.0),
            )
        };

        let mut by_agent_type = BTreeMap::new();
        for kind in TestKind::ALL {
            let graded: Vec<&HitlGrade> = completed.iter().copied().filter(|g| g.query_type == Some(kind)).collect();
            if graded.is_empty() {
                continue;
            }
            let (average_rating, average_score) = averages(&graded);
            by_agent_type.insert(
                kind,
                HitlKindScore {
                    total_tests: graded.len(),
                    average_rating,
                    average_score,
                },
            );
        }

        let (average_rating, average_score) = averages(&completed);
        Some(Self {
            total_tests: results.len(),
            completed_tests: completed.len(),
            skipped_tests: results.len() - completed.len(),
            average_rating,
            average_score,
            by_agent_type,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraderScores {
    pub code_grader: GraderScore,
    pub model_grader: GraderScore,
    pub hitl_grader: Option<HitlSummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverallScores {
    pub system_score: f64,
    pub agent_performance: BTreeMap<String, f64>,
    pub grader_performance: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetailedResults {
    pub needle_tests: Vec<CombinedResult>,
    pub summary_tests: Vec<CombinedResult>,
    pub routing_tests: Vec<CodeGrade>,
    pub hitl_tests: Vec<HitlGrade>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QaReport {
    pub metadata: ReportMetadata,
    pub overall_scores: OverallScores,
    pub agent_scores: AgentScores,
    pub grader_scores: GraderScores,
    pub detailed_results: DetailedResults,
}

impl QaReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record code and model grades for needle or summary tests
    pub fn add_graded(
        &mut self,
        kind: TestKind,
        code: Option<GradeBatch<CodeGrade>>,
        model: Option<GradeBatch<ModelGrade>>,
    ) {
        let mut combined: BTreeMap<String, (Option<CodeGrade>, Option<ModelGrade>)> = BTreeMap::new();
        for grade in code.into_iter().flat_map(|b| b.individual_results) {
            let id = grade.test_id.clone();
            combined.entry(id).or_default().0 = Some(grade);
        }
        for grade in model.into_iter().flat_map(|b| b.individual_results) {
            let id = grade.test_id.clone();
            combined.entry(id).or_default().1 = Some(grade);
        }

        let results = combined
            .into_iter()
            .map(|(id, (code, model))| CombinedResult::new(id, kind, code, model))
            .collect();
        match kind {
            TestKind::Needle => self.detailed_results.needle_tests = results,
            TestKind::Summary => self.detailed_results.summary_tests = results,
            TestKind::Routing => warn!("Routing grades are added with add_routing"),
        }
        self.recompute();
    }

    pub fn add_routing(&mut self, batch: GradeBatch<CodeGrade>) {
        self.detailed_results.routing_tests = batch.individual_results;
        self.recompute();
    }

    pub fn set_hitl(&mut self, session: HitlSession) {
        self.detailed_results.hitl_tests = session.individual_results;
        self.recompute();
    }

    /// Derive every score from the detailed results
    pub fn recompute(&mut self) {
        let detail = &self.detailed_results;

        self.agent_scores = AgentScores {
            needle_agent: AgentScore::from_results(&detail.needle_tests),
            summary_agent: AgentScore::from_results(&detail.summary_tests),
            routing_agent: RoutingScore::from_results(&detail.routing_tests),
        };

        let code_scores = |results: &[CombinedResult]| -> Vec<f64> {
            results
                .iter()
                .filter_map(|r| r.code_grader.as_ref().map(|c| c.score))
                .collect()
        };
        let model_scores = |results: &[CombinedResult]| -> Vec<f64> {
            results
                .iter()
                .filter_map(|r| r.model_grader.as_ref().map(|m| m.overall_score))
                .collect()
        };
        self.grader_scores = GraderScores {
            code_grader: GraderScore::from_scores(&code_scores(&detail.needle_tests), &code_scores(&detail.summary_tests)),
            model_grader: GraderScore::from_scores(
                &model_scores(&detail.needle_tests),
                &model_scores(&detail.summary_tests),
            ),
            hitl_grader: HitlSummary::from_results(&detail.hitl_tests),
        };

        let mut agent_performance = BTreeMap::new();
        if let Some(score) = &self.agent_scores.needle_agent {
            agent_performance.insert("needle_agent".to_string(), score.average_combined_score);
        }
        if let Some(score) = &self.agent_scores.summary_agent {
            agent_performance.insert("summary_agent".to_string(), score.average_combined_score);
        }
        if let Some(score) = &self.agent_scores.routing_agent {
            agent_performance.insert("routing_agent".to_string(), score.accuracy);
        }

        let mut grader_performance = BTreeMap::new();
        if !self.grader_scores.code_grader.is_empty() {
            grader_performance.insert("code_grader".to_string(), self.grader_scores.code_grader.average_score);
        }
        if !self.grader_scores.model_grader.is_empty() {
            grader_performance.insert("model_grader".to_string(), self.grader_scores.model_grader.average_score);
        }
        if let Some(hitl) = &self.grader_scores.hitl_grader {
            grader_performance.insert("hitl_grader".to_string(), hitl.average_score);
        }

        self.overall_scores = OverallScores {
            system_score: mean(agent_performance.values().copied()).unwrap_or(0.0),
            agent_performance,
            grader_performance,
        };
    }

    /// Fold a new run into an existing report
    ///
    /// Non-empty sections of `new` replace the matching sections of
    /// `existing`; all scores are then recomputed.
    pub fn merge(mut existing: QaReport, new: QaReport) -> QaReport {
        let incoming = new.detailed_results;
        let detail = &mut existing.detailed_results;
        if !incoming.needle_tests.is_empty() {
            detail.needle_tests = incoming.needle_tests;
        }
        if !incoming.summary_tests.is_empty() {
            detail.summary_tests = incoming.summary_tests;
        }
        if !incoming.routing_tests.is_empty() {
            detail.routing_tests = incoming.routing_tests;
        }
        if !incoming.hitl_tests.is_empty() {
            detail.hitl_tests = incoming.hitl_tests;
        }

        existing.metadata = new.metadata;
        existing.recompute();
        existing
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write the report, merging into the existing file when asked
    ///
    /// Returns the report as written.
    pub fn save(self, path: &Path, merge: bool) -> Result<QaReport> {
        let report = if merge && path.exists() {
            match Self::load(path) {
                Ok(existing) => {
                    info!(path = %path.display(), "Merging with existing results");
                    Self::merge(existing, self)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Could not load existing results, replacing them");
                    self
                }
            }
        } else {
            self
        };

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        info!(path = %path.display(), run_id = %report.metadata.run_id, "Report saved");
        Ok(report)
    }

    /// Console summary of the overall scores
    pub fn render_summary(&self) -> String {
        let rule = "=".repeat(70);
        let mut out = String::new();
        let _ = writeln!(out, "\n{}\nQA TEST RESULTS SUMMARY\n{}", rule, rule);
        let _ = writeln!(out, "\nOverall System Score: {:.3}", self.overall_scores.system_score);

        let _ = writeln!(out, "\nAgent Performance:");
        for (agent, score) in &self.overall_scores.agent_performance {
            let _ = writeln!(out, "  {}: {:.3}", agent, score);
        }

        if let Some(routing) = &self.agent_scores.routing_agent {
            let _ = writeln!(
                out,
                "\nRouting: {}/{} correct (needle {:.3}, summary {:.3})",
                routing.correct_routes, routing.total_tests, routing.needle_accuracy, routing.summary_accuracy
            );
        }

        if !self.overall_scores.grader_performance.is_empty() {
            let _ = writeln!(out, "\nGrader Performance:");
            for (grader, score) in &self.overall_scores.grader_performance {
                let _ = writeln!(out, "  {}: {:.3}", grader, score);
            }
        }
        let _ = writeln!(out, "{}", rule);
        out
    }
}
