//! Test datasets
//!
//! Each dataset file is `{"tests": [...]}`. Needle, summary and routing
//! tests share one [`TestCase`] shape; HITL tests add the evaluation fields
//! and a `query_type`.

use crate::errors::{QaError, Result};
use claimrag_common::document::Route;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use tracing::{info, warn};
use validator::Validate;

/// Which agent a test exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Needle,
    Summary,
    Routing,
}

impl TestKind {
    pub const ALL: [TestKind; 3] = [TestKind::Needle, TestKind::Summary, TestKind::Routing];

    pub fn as_str(&self) -> &'static str {
        match self {
            TestKind::Needle => "needle",
            TestKind::Summary => "summary",
            TestKind::Routing => "routing",
        }
    }

    /// Agent that answers this kind of test, none for routing
    pub fn route(&self) -> Option<Route> {
        match self {
            TestKind::Needle => Some(Route::Needle),
            TestKind::Summary => Some(Route::Summary),
            TestKind::Routing => None,
        }
    }
}

impl fmt::Display for TestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationType {
    #[default]
    Rating,
    Binary,
}

/// Named regex checks, kept in file order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Checks(pub Vec<(String, String)>);

impl Checks {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, pattern)| (name.as_str(), pattern.as_str()))
    }
}

impl Serialize for Checks {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, pattern) in &self.0 {
            map.serialize_entry(name, pattern)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Checks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct ChecksVisitor;

        impl<'de> Visitor<'de> for ChecksVisitor {
            type Value = Checks;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of check names to regex patterns")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Checks, A::Error> {
                let mut checks = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, pattern)) = access.next_entry::<String, String>()? {
                    checks.push((name, pattern));
                }
                Ok(Checks(checks))
            }
        }

        deserializer.deserialize_map(ChecksVisitor)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct TestCase {
    #[validate(length(min = 1))]
    pub id: String,

    #[validate(length(min = 1))]
    pub question: String,

    #[serde(default)]
    pub ground_truth: Option<String>,

    #[serde(default)]
    pub code_grader_checks: Checks,

    #[serde(default)]
    pub expected_route: Option<Route>,

    #[serde(default)]
    pub model_grader_criteria: Vec<String>,

    /// Agent under review, HITL datasets only
    #[serde(default)]
    pub query_type: Option<TestKind>,

    #[serde(default)]
    pub evaluation_criteria: Vec<String>,

    #[serde(default)]
    pub evaluation_type: EvaluationType,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    #[serde(default)]
    tests: Vec<TestCase>,
}

/// Load and validate a dataset, a missing file yields no tests
pub fn load_tests(path: &Path) -> Result<Vec<TestCase>> {
    if !path.exists() {
        warn!(path = %path.display(), "Test file not found");
        return Ok(Vec::new());
    }

    let raw = std::fs::read_to_string(path)?;
    let dataset: Dataset = serde_json::from_str(&raw).map_err(|e| QaError::Dataset {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    for test in &dataset.tests {
        test.validate().map_err(|e| QaError::InvalidTest {
            id: test.id.clone(),
            message: e.to_string(),
        })?;
    }

    info!(path = %path.display(), tests = dataset.tests.len(), "Loaded tests");
    Ok(dataset.tests)
}

/// HITL tests of one kind, all when `kind` is unset
pub fn filter_by_kind(tests: Vec<TestCase>, kind: Option<TestKind>) -> Vec<TestCase> {
    match kind {
        None => tests,
        Some(kind) => tests.into_iter().filter(|t| t.query_type == Some(kind)).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEEDLE_JSON: &str = r#"{
        "tests": [
            {
                "id": "needle_01",
                "question": "What time did the collision occur?",
                "ground_truth": "The collision occurred at 7:42 AM.",
                "code_grader_checks": {"time": "7:42", "meridiem": "AM|a\\.m\\.", "date": "March 15"},
                "model_grader_criteria": ["factual_accuracy"]
            },
            {"id": "routing_01", "question": "What was the total claim value?", "expected_route": "summary"}
        ]
    }"#;

    #[test]
    fn test_parse_keeps_check_order() {
        let dataset: Dataset = serde_json::from_str(NEEDLE_JSON).unwrap();
        let names: Vec<&str> = dataset.tests[0].code_grader_checks.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["time", "meridiem", "date"]);
        assert_eq!(dataset.tests[1].expected_route, Some(Route::Summary));
        assert_eq!(dataset.tests[1].evaluation_type, EvaluationType::Rating);
        assert!(dataset.tests[1].code_grader_checks.is_empty());
    }

    #[test]
    fn test_load_rejects_empty_question() {
        let path = std::env::temp_dir().join(format!("claimrag-tests-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"tests": [{"id": "needle_09", "question": ""}]}"#).unwrap();

        let err = load_tests(&path).unwrap_err();
        assert!(matches!(err, QaError::InvalidTest { ref id, .. } if id == "needle_09"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_file_is_empty() {
        assert!(load_tests(Path::new("/nonexistent/tests.json")).unwrap().is_empty());
    }

    #[test]
    fn test_filter_by_kind() {
        let tests: Vec<TestCase> = serde_json::from_str::<Dataset>(
            r#"{"tests": [
                {"id": "h1", "question": "q1", "query_type": "needle"},
                {"id": "h2", "question": "q2", "query_type": "routing", "evaluation_type": "binary"}
            ]}"#,
        )
        .unwrap()
        .tests;

        let routing = filter_by_kind(tests.clone(), Some(TestKind::Routing));
        assert_eq!(routing.len(), 1);
        assert_eq!(routing[0].evaluation_type, EvaluationType::Binary);
        assert_eq!(filter_by_kind(tests, None).len(), 2);
    }
}
