//! Cached answers
//!
//! Collected answers are kept per test kind, keyed by test id. A cached
//! entry is reused only while the hash of its question still matches the
//! dataset, so editing a question forces a fresh answer.

use crate::dataset::{TestCase, TestKind};
use crate::errors::Result;
use chrono::{DateTime, Utc};
use claimrag_agents::Source;
use claimrag_common::document::Route;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

const CACHE_VERSION: &str = "1.0.0";
const CACHE_DESCRIPTION: &str = "Cached answers from QA test runs";

/// Hex SHA-256 of a question
pub fn question_hash(question: &str) -> String {
    hex::encode(Sha256::digest(question.as_bytes()))
}

/// One collected answer, or the error that prevented it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub test_id: String,
    pub question: String,
    pub question_hash: String,

    /// Route picked by the router
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_used: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_pages_used: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summaries_used: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_route: Option<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,

    /// Seconds
    pub execution_time: f64,
    pub timestamp: DateTime<Utc>,

    /// Agent that produced the answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<Route>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

impl AnswerRecord {
    /// Empty record for a test, filled in by the collector
    pub fn for_test(test: &TestCase) -> Self {
        Self {
            test_id: test.id.clone(),
            question: test.question.clone(),
            question_hash: question_hash(&test.question),
            route: None,
            answer: None,
            sources: Vec::new(),
            chunks_used: None,
            parent_pages_used: None,
            summaries_used: None,
            expected_route: None,
            correct: None,
            execution_time: 0.0,
            timestamp: Utc::now(),
            agent_type: None,
            error: None,
            cached_at: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub last_updated: Option<DateTime<Utc>>,
    pub version: String,
    pub description: String,
}

impl Default for CacheMetadata {
    fn default() -> Self {
        Self {
            last_updated: None,
            version: CACHE_VERSION.to_string(),
            description: CACHE_DESCRIPTION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerCache {
    #[serde(rename = "_metadata", default)]
    pub metadata: CacheMetadata,

    #[serde(default)]
    pub needle_answers: BTreeMap<String, AnswerRecord>,

    #[serde(default)]
    pub summary_answers: BTreeMap<String, AnswerRecord>,

    #[serde(default)]
    pub routing_answers: BTreeMap<String, AnswerRecord>,
}

impl AnswerCache {
    /// Load the cache, empty when the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No answer cache yet");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn section(&self, kind: TestKind) -> &BTreeMap<String, AnswerRecord> {
        match kind {
            TestKind::Needle => &self.needle_answers,
            TestKind::Summary => &self.summary_answers,
            TestKind::Routing => &self.routing_answers,
        }
    }

    fn section_mut(&mut self, kind: TestKind) -> &mut BTreeMap<String, AnswerRecord> {
        match kind {
            TestKind::Needle => &mut self.needle_answers,
            TestKind::Summary => &mut self.summary_answers,
            TestKind::Routing => &mut self.routing_answers,
        }
    }

    /// Store answers under their test ids, replacing older entries
    pub fn merge(&mut self, kind: TestKind, answers: &[AnswerRecord]) {
        let now = Utc::now();
        let section = self.section_mut(kind);
        for answer in answers {
            let mut record = answer.clone();
            record.cached_at = Some(now);
            section.insert(record.test_id.clone(), record);
        }
        self.metadata.last_updated = Some(now);
    }

    /// Merge answers into the cache file
    pub fn merge_and_save(path: &Path, kind: TestKind, answers: &[AnswerRecord]) -> Result<()> {
        let mut cache = Self::load(path)?;
        cache.merge(kind, answers);
        cache.save(path)?;
        info!(kind = %kind, answers = answers.len(), path = %path.display(), "Cached answers saved");
        Ok(())
    }

    /// Split tests into cached answers that are still valid and tests
    /// that need collecting
    pub fn fresh<'a>(&self, kind: TestKind, tests: &'a [TestCase]) -> (Vec<AnswerRecord>, Vec<&'a TestCase>) {
        let section = self.section(kind);
        let mut hits = Vec::new();
        let mut misses = Vec::new();

        for test in tests {
            match section.get(&test.id) {
                Some(record) if record.question_hash == question_hash(&test.question) => {
                    hits.push(record.clone())
                }
                _ => misses.push(test),
            }
        }

        info!(kind = %kind, cached = hits.len(), missing = misses.len(), "Checked answer cache");
        (hits, misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_case(id: &str, question: &str) -> TestCase {
        serde_json::from_value(serde_json::json!({"id": id, "question": question})).unwrap()
    }

    fn record(test: &TestCase, answer: &str) -> AnswerRecord {
        AnswerRecord {
            answer: Some(answer.to_string()),
            agent_type: Some(Route::Needle),
            route: Some(Route::Needle),
            ..AnswerRecord::for_test(test)
        }
    }

    #[test]
    fn test_question_hash_is_stable() {
        assert_eq!(question_hash("abc"), question_hash("abc"));
        assert_eq!(question_hash("abc").len(), 64);
        assert_ne!(question_hash("abc"), question_hash("abd"));
    }

    #[test]
    fn test_fresh_detects_edited_questions() {
        let original = test_case("needle_01", "What time did the collision occur?");
        let mut cache = AnswerCache::default();
        cache.merge(TestKind::Needle, &[record(&original, "7:42 AM")]);

        let tests = vec![
            original.clone(),
            test_case("needle_02", "Who was the adjuster?"),
        ];
        let (hits, misses) = cache.fresh(TestKind::Needle, &tests);
        assert_eq!(hits.len(), 1);
        assert!(hits[0].cached_at.is_some());
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].id, "needle_02");

        let edited = vec![test_case("needle_01", "At what time did the collision occur?")];
        let (hits, misses) = cache.fresh(TestKind::Needle, &edited);
        assert!(hits.is_empty());
        assert_eq!(misses.len(), 1);
    }

    #[test]
    fn test_sections_are_separate() {
        let test = test_case("t1", "q");
        let mut cache = AnswerCache::default();
        cache.merge(TestKind::Summary, &[record(&test, "a")]);

        let (hits, _) = cache.fresh(TestKind::Needle, std::slice::from_ref(&test));
        assert!(hits.is_empty());
        assert_eq!(cache.section(TestKind::Summary).len(), 1);
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("claimrag-cache-{}.json", std::process::id()));
        let test = test_case("routing_01", "Summarize the claim");

        let mut routing = AnswerRecord::for_test(&test);
        routing.route = Some(Route::Summary);
        routing.expected_route = Some(Route::Summary);
        routing.correct = Some(true);
        AnswerCache::merge_and_save(&path, TestKind::Routing, &[routing]).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"_metadata\""));
        assert!(raw.contains("Cached answers from QA test runs"));
        assert!(!raw.contains("\"answer\""));

        let loaded = AnswerCache::load(&path).unwrap();
        assert_eq!(loaded.routing_answers["routing_01"].correct, Some(true));
        assert!(loaded.metadata.last_updated.is_some());
        std::fs::remove_file(path).ok();
    }
}
