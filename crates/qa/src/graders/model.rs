//! LLM-as-judge grading
//!
//! The judge compares an answer with the test's ground truth and returns a
//! JSON object of per-criterion scores in `[0, 1]`, an `overall_score` and a
//! short `reasoning`. Judge calls are paced by a token bucket so a batch
//! never exceeds one call per configured delay.

use super::{mean, GradeBatch};
use crate::cache::AnswerRecord;
use crate::dataset::{TestCase, TestKind};
use crate::errors::{QaError, Result};
use claimrag_common::{ChatModel, ChatRequest};
use governor::{
    clock::QuantaClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub type JudgeRateLimiter = RateLimiter<NotKeyed, InMemoryState, QuantaClock>;

const JUDGE_SYSTEM_PROMPT: &str = "You are an expert evaluator grading AI agent responses. Return only valid JSON.";
const JUDGE_TEMPERATURE: f32 = 0.1;
const JUDGE_MAX_TOKENS: u32 = 1000;

pub const NEEDLE_CRITERIA: [&str; 4] = ["factual_accuracy", "completeness", "precision", "no_hallucination"];
pub const SUMMARY_CRITERIA: [&str; 5] = ["comprehensiveness", "coherence", "synthesis", "relevance", "accuracy"];

pub fn criteria_for(kind: TestKind) -> &'static [&'static str] {
    match kind {
        TestKind::Summary => &SUMMARY_CRITERIA,
        _ => &NEEDLE_CRITERIA,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelGrade {
    pub test_id: String,
    pub test_type: TestKind,
    pub model_used: String,
    pub scores: BTreeMap<String, f64>,
    pub overall_score: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModelGrade {
    fn failed(test_id: &str, kind: TestKind, model: &str, reasoning: String, error: Option<String>) -> Self {
        Self {
            test_id: test_id.to_string(),
            test_type: kind,
            model_used: model.to_string(),
            scores: BTreeMap::new(),
            overall_score: 0.0,
            reasoning,
            error,
        }
    }
}

pub fn needle_judge_prompt(question: &str, ground_truth: &str, answer: &str) -> String {
    format!(
        r#"You are evaluating an AI agent's answer to a factual question about an insurance claim.

Question: {question}

Ground Truth Answer: {ground_truth}

Agent's Answer: {answer}

Evaluate the agent's answer on the following criteria (score each from 0.0 to 1.0):

1. Factual Accuracy: Are all facts in the agent's answer correct when compared to the ground truth?
2. Completeness: Does the answer include all key information from the ground truth?
3. Precision: Are specific details (numbers, names, dates, times) stated precisely?
4. No Hallucination: Does the answer only include information that could reasonably come from the source?

Use 1.0 when the criterion is fully met, 0.5 when partly met and 0.0 when not met.

Return ONLY a JSON object with this structure (keep reasoning under 50 words):
{{
  "factual_accuracy": <score>,
  "completeness": <score>,
  "precision": <score>,
  "no_hallucination": <score>,
  "overall_score": <average of all scores>,
  "reasoning": "<brief 1-2 sentence explanation>"
}}"#
    )
}

pub fn summary_judge_prompt(question: &str, ground_truth: &str, answer: &str) -> String {
    format!(
        r#"You are evaluating a summary generated by an AI agent against a reference summary.
The agent does not need to use the same words as the reference. Judge whether it conveys the same key information and meaning.

Question: {question}

Reference Summary (Ground Truth): {ground_truth}

Agent's Summary: {answer}

Evaluate the agent's summary on the following criteria (score each from 0.0 to 1.0):

1. Comprehensiveness: Does it cover all major points from the reference?
2. Coherence: Is it well organized with a logical flow?
3. Synthesis: Does it integrate the information into one narrative rather than isolated facts?
4. Relevance: Does it address the question without unnecessary information?
5. Accuracy: Are its facts semantically correct compared to the reference?

Use 1.0 when the criterion is fully met, 0.5 when partly met and 0.0 when not met.

Return ONLY a JSON object with this structure (keep reasoning under 50 words):
{{
  "comprehensiveness": <score>,
  "coherence": <score>,
  "synthesis": <score>,
  "relevance": <score>,
  "accuracy": <score>,
  "overall_score": <average of all scores>,
  "reasoning": "<brief 1-2 sentence explanation>"
}}"#
    )
}

/// Drop a surrounding markdown code fence
fn strip_code_fence(reply: &str) -> &str {
    if let Some(start) = reply.find("```json") {
        let body = &reply[start + 7..];
        return match body.find("```") {
            Some(end) => body[..end].trim(),
            None => reply,
        };
    }
    if let Some(rest) = reply.trim_start().strip_prefix("```") {
        let body = rest.split("```").next().unwrap_or(rest);
        return body.strip_prefix("json").unwrap_or(body).trim();
    }
    reply.trim()
}

/// Replace raw line breaks inside string literals with spaces
fn flatten_string_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            escaped = false;
            out.push(c);
            continue;
        }
        match c {
            '\\' => {
                escaped = true;
                out.push(c);
            }
            '"' => {
                in_string = !in_string;
                out.push(c);
            }
            '\n' | '\r' if in_string => out.push(' '),
            _ => out.push(c),
        }
    }
    out
}

/// Parse a judge reply into a JSON object, tolerating fences and trailing commas
pub fn parse_judge_reply(reply: &str) -> Result<Map<String, Value>> {
    let text = flatten_string_newlines(strip_code_fence(reply));

    match serde_json::from_str(&text) {
        Ok(parsed) => Ok(parsed),
        Err(first) => {
            warn!(error = %first, "Judge reply is not valid JSON, removing trailing commas");
            let trailing = Regex::new(r",\s*([}\]])").map_err(|e| QaError::Grader(e.to_string()))?;
            let fixed = trailing.replace_all(&text, "$1");
            serde_json::from_str(&fixed).map_err(|_| QaError::Json(first))
        }
    }
}

/// Criterion scores and the overall score from a parsed reply
fn scores_from(kind: TestKind, parsed: &Map<String, Value>) -> (BTreeMap<String, f64>, f64) {
    let scores: BTreeMap<String, f64> = parsed
        .iter()
        .filter(|(key, _)| key.as_str() != "overall_score")
        .filter_map(|(key, value)| value.as_f64().map(|v| (key.clone(), v)))
        .collect();

    let overall = parsed
        .get("overall_score")
        .and_then(Value::as_f64)
        .or_else(|| mean(criteria_for(kind).iter().filter_map(|c| scores.get(*c).copied())))
        .unwrap_or(0.0);

    (scores, overall)
}

pub struct ModelGrader {
    judge: Arc<dyn ChatModel>,
    limiter: Option<JudgeRateLimiter>,
    pass_threshold: f64,
}

impl ModelGrader {
    /// A zero delay disables pacing
    pub fn new(judge: Arc<dyn ChatModel>, delay: Duration, pass_threshold: f64) -> Self {
        Self {
            judge,
            limiter: Quota::with_period(delay).map(RateLimiter::direct),
            pass_threshold,
        }
    }

    pub fn model_name(&self) -> &str {
        self.judge.model_name()
    }

    /// Judge one answer, any failure scores zero with the error attached
    pub async fn grade(&self, kind: TestKind, test: &TestCase, answer: &str) -> ModelGrade {
        let ground_truth = test.ground_truth.as_deref().unwrap_or_default();
        let prompt = match kind {
            TestKind::Summary => summary_judge_prompt(&test.question, ground_truth, answer),
            _ => needle_judge_prompt(&test.question, ground_truth, answer),
        };
        let request = ChatRequest::new(prompt)
            .system(JUDGE_SYSTEM_PROMPT)
            .temperature(JUDGE_TEMPERATURE)
            .max_tokens(JUDGE_MAX_TOKENS)
            .json();

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        let parsed = match self.judge.complete(&request).await {
            Ok(reply) => parse_judge_reply(&reply),
            Err(e) => Err(e.into()),
        };

        match parsed {
            Ok(parsed) => {
                let (scores, overall_score) = scores_from(kind, &parsed);
                ModelGrade {
                    test_id: test.id.clone(),
                    test_type: kind,
                    model_used: self.model_name().to_string(),
                    scores,
                    overall_score,
                    reasoning: parsed
                        .get("reasoning")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                    error: None,
                }
            }
            Err(e) => {
                error!(test_id = %test.id, error = %e, "Model grading failed");
                ModelGrade::failed(
                    &test.id,
                    kind,
                    self.model_name(),
                    format!("Grading failed: {}", e),
                    Some(e.to_string()),
                )
            }
        }
    }

    /// Judge every answered test in order
    pub async fn grade_batch(
        &self,
        kind: TestKind,
        tests: &[TestCase],
        answers: &BTreeMap<String, AnswerRecord>,
    ) -> GradeBatch<ModelGrade> {
        let mut results = Vec::with_capacity(tests.len());

        for (i, test) in tests.iter().enumerate() {
            info!(test_id = %test.id, progress = format!("{}/{}", i + 1, tests.len()), "Model grading");
            let grade = match answers.get(&test.id) {
                Some(record) if record.error.is_none() => {
                    self.grade(kind, test, record.answer.as_deref().unwrap_or_default())
                        .await
                }
                Some(record) => ModelGrade::failed(
                    &test.id,
                    kind,
                    self.model_name(),
                    "Answer collection failed".to_string(),
                    record.error.clone(),
                ),
                None => ModelGrade::failed(
                    &test.id,
                    kind,
                    self.model_name(),
                    "Test not answered".to_string(),
                    None,
                ),
            };
            results.push(grade);
        }

        GradeBatch::from_results(kind, results, |g: &ModelGrade| g.overall_score, self.pass_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimrag_common::llm::MockChatModel;

    fn test_case(id: &str) -> TestCase {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "question": "What time did the collision occur?",
            "ground_truth": "7:42 AM on March 15, 2024"
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "Here you go:\n```json\n{\"precision\": 0.5, \"reasoning\": \"ok\"}\n```";
        let parsed = parse_judge_reply(reply).unwrap();
        assert_eq!(parsed["precision"], 0.5);
    }

    #[test]
    fn test_parse_repairs_newlines_and_trailing_commas() {
        let reply = "{\"accuracy\": 1.0, \"reasoning\": \"line one\nline two\",}";
        let parsed = parse_judge_reply(reply).unwrap();
        assert_eq!(parsed["reasoning"], "line one line two");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_judge_reply("not json at all").is_err());
    }

    #[test]
    fn test_overall_falls_back_to_criteria_mean() {
        let parsed = parse_judge_reply(r#"{"factual_accuracy": 1.0, "completeness": 0.5, "precision": 1.0, "no_hallucination": 0.5}"#).unwrap();
        let (scores, overall) = scores_from(TestKind::Needle, &parsed);
        assert_eq!(scores.len(), 4);
        assert!((overall - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_grade_uses_reply_overall() {
        let judge = Arc::new(MockChatModel::constant(
            r#"{"factual_accuracy": 1.0, "completeness": 1.0, "precision": 0.5, "no_hallucination": 1.0, "overall_score": 0.875, "reasoning": "Precise time, date vague."}"#,
        ));
        let grader = ModelGrader::new(judge.clone(), Duration::ZERO, 0.7);

        let grade = grader.grade(TestKind::Needle, &test_case("needle_01"), "7:42 AM").await;
        assert_eq!(grade.overall_score, 0.875);
        assert_eq!(grade.reasoning, "Precise time, date vague.");
        assert!(!grade.scores.contains_key("overall_score"));

        let request = &judge.requests()[0];
        assert!(request.json_mode);
        assert_eq!(request.max_tokens, 1000);
        assert!(request.user.contains("Ground Truth Answer: 7:42 AM on March 15, 2024"));
    }

    #[tokio::test]
    async fn test_batch_handles_failures_and_missing_answers() {
        let judge = Arc::new(MockChatModel::constant(r#"{"overall_score": 1.0}"#));
        judge.push_error("quota exceeded");
        let grader = ModelGrader::new(judge.clone(), Duration::from_millis(1), 0.7);

        let tests = vec![test_case("needle_01"), test_case("needle_02"), test_case("needle_03")];
        let mut answers = BTreeMap::new();
        for test in &tests[..2] {
            let mut record = AnswerRecord::for_test(test);
            record.answer = Some("7:42 AM".to_string());
            answers.insert(test.id.clone(), record);
        }

        let batch = grader.grade_batch(TestKind::Needle, &tests, &answers).await;
        assert_eq!(batch.individual_results[0].overall_score, 0.0);
        assert!(batch.individual_results[0].error.is_some());
        assert_eq!(batch.individual_results[1].overall_score, 1.0);
        assert_eq!(batch.individual_results[2].reasoning, "Test not answered");
        assert_eq!(batch.passed_tests, 1);
        assert_eq!(judge.call_count(), 2);
    }
}
