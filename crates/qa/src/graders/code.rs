//! Deterministic grading with regex checks and route comparison

use super::GradeBatch;
use crate::cache::AnswerRecord;
use crate::dataset::{TestCase, TestKind};
use claimrag_common::document::Route;
use regex_lite::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_name: String,
    pub pattern: String,
    pub passed: bool,
    pub matched: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGrade {
    pub test_id: String,
    pub test_type: TestKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<CheckResult>,
    pub passed_checks: usize,
    pub total_checks: usize,
    pub score: f64,
    pub details: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

impl CodeGrade {
    fn empty(test_id: &str, test_type: TestKind) -> Self {
        Self {
            test_id: test_id.to_string(),
            test_type,
            checks: Vec::new(),
            passed_checks: 0,
            total_checks: 0,
            score: 0.0,
            details: Vec::new(),
            expected_route: None,
            actual_route: None,
            passed: None,
        }
    }
}

/// Case-insensitive search for `pattern` in `text`
pub fn check_pattern(text: &str, name: &str, pattern: &str) -> CheckResult {
    let mut result = CheckResult {
        check_name: name.to_string(),
        pattern: pattern.to_string(),
        passed: false,
        matched: None,
        error: None,
    };

    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(regex) => {
            if let Some(m) = regex.find(text) {
                result.passed = true;
                result.matched = Some(m.as_str().to_string());
            }
        }
        Err(e) => result.error = Some(format!("Invalid regex: {}", e)),
    }
    result
}

pub struct CodeGrader {
    pass_threshold: f64,
}

impl CodeGrader {
    pub fn new(pass_threshold: f64) -> Self {
        Self { pass_threshold }
    }

    /// Score an answer by the fraction of its checks that match
    pub fn grade_checks(&self, test: &TestCase, kind: TestKind, answer: &str) -> CodeGrade {
        let mut grade = CodeGrade::empty(&test.id, kind);
        grade.total_checks = test.code_grader_checks.len();

        if test.code_grader_checks.is_empty() {
            grade.score = 1.0;
            grade.details.push("No code grader checks defined".to_string());
            return grade;
        }

        for (name, pattern) in test.code_grader_checks.iter() {
            let check = check_pattern(answer, name, pattern);
            match (&check.matched, &check.error) {
                (Some(matched), _) => {
                    grade.passed_checks += 1;
                    grade.details.push(format!("[PASS] {}: Found '{}'", name, matched));
                }
                (None, Some(error)) => grade.details.push(format!("[FAIL] {}: {}", name, error)),
                (None, None) => grade
                    .details
                    .push(format!("[FAIL] {}: Pattern '{}' not found", name, pattern)),
            }
            grade.checks.push(check);
        }

        grade.score = grade.passed_checks as f64 / grade.total_checks as f64;
        debug!(test_id = %test.id, score = grade.score, "Code graded");
        grade
    }

    /// Exact route comparison, 1.0 or 0.0
    pub fn grade_route(&self, test: &TestCase, actual: Route) -> CodeGrade {
        let mut grade = CodeGrade::empty(&test.id, TestKind::Routing);
        let passed = test.expected_route == Some(actual);

        grade.total_checks = 1;
        grade.passed_checks = usize::from(passed);
        grade.score = if passed { 1.0 } else { 0.0 };
        grade.expected_route = test.expected_route;
        grade.actual_route = Some(actual);
        grade.passed = Some(passed);
        grade.details.push(match test.expected_route {
            _ if passed => format!("[PASS] Correct routing: {}", actual),
            Some(expected) => format!("[FAIL] Incorrect routing: expected '{}', got '{}'", expected, actual),
            None => format!("[FAIL] No expected route, got '{}'", actual),
        });
        grade
    }

    fn grade_one(&self, kind: TestKind, test: &TestCase, record: Option<&AnswerRecord>) -> CodeGrade {
        let unanswered = |reason: String| {
            let mut grade = CodeGrade::empty(&test.id, kind);
            grade.expected_route = test.expected_route;
            grade.details.push(reason);
            grade
        };

        let record = match record {
            Some(record) => record,
            None => return unanswered("Test not answered".to_string()),
        };
        if let Some(error) = &record.error {
            return unanswered(format!("Answer collection failed: {}", error));
        }

        match kind {
            TestKind::Routing => match record.route {
                Some(route) => self.grade_route(test, route),
                None => unanswered("No route recorded".to_string()),
            },
            _ => self.grade_checks(test, kind, record.answer.as_deref().unwrap_or_default()),
        }
    }

    /// Grade every test, unanswered ones score zero
    pub fn grade_batch(
        &self,
        kind: TestKind,
        tests: &[TestCase],
        answers: &BTreeMap<String, AnswerRecord>,
    ) -> GradeBatch<CodeGrade> {
        let results = tests
            .iter()
            .map(|test| self.grade_one(kind, test, answers.get(&test.id)))
            .collect();
        GradeBatch::from_results(kind, results, |g: &CodeGrade| g.score, self.pass_threshold)
    }
}
