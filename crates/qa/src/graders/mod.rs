//! Graders for collected answers
//!
//! - [`code::CodeGrader`]: regex checks and route equality
//! - [`model::ModelGrader`]: LLM judge scoring named criteria
//! - [`hitl::HitlGrader`]: interactive human ratings

pub mod code;
pub mod hitl;
pub mod model;

pub use code::{CodeGrade, CodeGrader};
pub use hitl::{HitlGrader, HitlSession};
pub use model::{ModelGrade, ModelGrader};

use crate::dataset::TestKind;
use serde::{Deserialize, Serialize};

/// Scores for one batch of tests of a single kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeBatch<T> {
    pub test_type: TestKind,
    pub total_tests: usize,
    pub passed_tests: usize,
    pub average_score: f64,
    pub individual_results: Vec<T>,
}

impl<T> GradeBatch<T> {
    /// Build a batch from per-test results and their scores
    pub fn from_results(test_type: TestKind, results: Vec<T>, score: impl Fn(&T) -> f64, pass_threshold: f64) -> Self {
        let total: f64 = results.iter().map(&score).sum();
        let passed_tests = results.iter().filter(|r| score(r) >= pass_threshold).count();
        let average_score = if results.is_empty() {
            0.0
        } else {
            total / results.len() as f64
        };

        Self {
            test_type,
            total_tests: results.len(),
            passed_tests,
            average_score,
            individual_results: results,
        }
    }
}

/// Mean of a score list, `None` when empty
pub(crate) fn mean(scores: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = scores
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), s| (sum + s, count + 1));
    (count > 0).then(|| sum / count as f64)
}
