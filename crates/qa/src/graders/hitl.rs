//! Human-in-the-loop grading
//!
//! Reads ratings from any `BufRead` and writes prompts to any `Write`, so the
//! `qa hitl` command drives it from the terminal and tests script it. End of
//! input stops the session and keeps the ratings given so far.

use super::mean;
use crate::cache::AnswerRecord;
use crate::dataset::{EvaluationType, TestCase, TestKind};
use chrono::{DateTime, Utc};
use claimrag_common::document::Route;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::{self, BufRead, Write};
use tracing::{info, warn};

const DEFAULT_REVIEWER: &str = "user";
const RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlGrade {
    pub test_id: String,
    pub query_type: Option<TestKind>,
    pub skipped: bool,
    pub rating: Option<u8>,
    pub score: Option<f64>,
    pub feedback: String,
    pub reviewer: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub criteria: Vec<String>,
    pub evaluation_type: EvaluationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_route: Option<Route>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_route: Option<Route>,
}

impl HitlGrade {
    fn skipped(test: &TestCase, reviewer: &str, feedback: &str) -> Self {
        Self {
            test_id: test.id.clone(),
            query_type: test.query_type,
            skipped: true,
            rating: None,
            score: None,
            feedback: feedback.to_string(),
            reviewer: reviewer.to_string(),
            timestamp: Utc::now(),
            criteria: test.evaluation_criteria.clone(),
            evaluation_type: test.evaluation_type,
            expected_route: test.expected_route,
            actual_route: None,
        }
    }

    fn rated(test: &TestCase, reviewer: &str, rating: u8, score: f64) -> Self {
        Self {
            skipped: false,
            rating: Some(rating),
            score: Some(score),
            ..Self::skipped(test, reviewer, "")
        }
    }
}

/// Map a 1-5 rating onto `[0, 1]`
pub fn rating_score(rating: u8) -> f64 {
    f64::from(rating.clamp(1, 5) - 1) / 4.0
}

/// Ratings from one or more review sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HitlSession {
    pub total_tests: usize,
    pub completed_tests: usize,
    pub skipped_tests: usize,
    pub average_score: f64,
    pub average_rating: f64,
    pub individual_results: Vec<HitlGrade>,
    pub session_start: DateTime<Utc>,
    pub session_end: DateTime<Utc>,
}

impl HitlSession {
    pub fn new(total_tests: usize, results: Vec<HitlGrade>, session_start: DateTime<Utc>) -> Self {
        let completed: Vec<&HitlGrade> = results.iter().filter(|r| !r.skipped).collect();
        let average_score = mean(completed.iter().filter_map(|r| r.score)).unwrap_or(0.0);
        let average_rating =
            mean(completed.iter().filter_map(|r| r.rating.map(f64::from))).unwrap_or(0.0);

        Self {
            total_tests,
            completed_tests: completed.len(),
            skipped_tests: results.len() - completed.len(),
            average_score,
            average_rating,
            individual_results: results,
            session_start,
            session_end: Utc::now(),
        }
    }

    /// Ids of tests that already have a rating
    pub fn completed_ids(results: &[HitlGrade]) -> HashSet<String> {
        results
            .iter()
            .filter(|r| !r.skipped)
            .map(|r| r.test_id.clone())
            .collect()
    }

    /// Combine earlier results with a resumed session
    ///
    /// Entries for tests graded again are replaced, so a test skipped before
    /// and rated now appears once.
    pub fn resume(previous: Vec<HitlGrade>, resumed: HitlSession, total_tests: usize) -> Self {
        let regraded: HashSet<&str> = resumed
            .individual_results
            .iter()
            .map(|r| r.test_id.as_str())
            .collect();

        let mut results: Vec<HitlGrade> = previous
            .into_iter()
            .filter(|r| !regraded.contains(r.test_id.as_str()))
            .collect();
        let session_start = results
            .iter()
            .map(|r| r.timestamp)
            .min()
            .unwrap_or(resumed.session_start);
        results.extend(resumed.individual_results);

        Self::new(total_tests, results, session_start)
    }
}

enum Reply<T> {
    Value(T),
    Skip,
    Eof,
}

pub struct HitlGrader<R, W> {
    input: R,
    output: W,
    reviewer: String,
}

impl<R: BufRead, W: Write> HitlGrader<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            input,
            output,
            reviewer: DEFAULT_REVIEWER.to_string(),
        }
    }

    pub fn with_reviewer(mut self, reviewer: impl Into<String>) -> Self {
        self.reviewer = reviewer.into();
        self
    }

    fn rule(&mut self) -> io::Result<()> {
        writeln!(self.output, "{}", "=".repeat(RULE_WIDTH))
    }

    /// Prompt and read one trimmed line, `None` at end of input
    fn ask(&mut self, prompt: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn read_rating(&mut self) -> io::Result<Reply<u8>> {
        loop {
            let prompt = "\nRate this answer (1=Poor, 2=Fair, 3=Good, 4=Very Good, 5=Excellent, or 's' to skip): ";
            let Some(reply) = self.ask(prompt)? else {
                return Ok(Reply::Eof);
            };
            let reply = reply.to_lowercase();
            if reply == "s" {
                return Ok(Reply::Skip);
            }
            match reply.parse::<u8>() {
                Ok(rating) if (1..=5).contains(&rating) => return Ok(Reply::Value(rating)),
                _ => writeln!(self.output, "[ERROR] Please enter a number between 1 and 5, or 's' to skip.")?,
            }
        }
    }

    fn read_verdict(&mut self) -> io::Result<Reply<bool>> {
        loop {
            let Some(reply) = self.ask("\nWas the routing decision CORRECT? (y/n, or 's' to skip): ")? else {
                return Ok(Reply::Eof);
            };
            match reply.to_lowercase().as_str() {
                "s" => return Ok(Reply::Skip),
                "y" | "yes" => return Ok(Reply::Value(true)),
                "n" | "no" => return Ok(Reply::Value(false)),
                _ => writeln!(self.output, "[ERROR] Please enter 'y' for yes, 'n' for no, or 's' to skip.")?,
            }
        }
    }

    /// Review one answer, `None` when input ended
    pub fn grade_one(
        &mut self,
        test: &TestCase,
        record: &AnswerRecord,
        position: usize,
        total: usize,
    ) -> io::Result<Option<HitlGrade>> {
        writeln!(self.output)?;
        self.rule()?;
        writeln!(self.output, "HUMAN-IN-THE-LOOP EVALUATION ({}/{})", position, total)?;
        self.rule()?;
        writeln!(self.output, "\nTest ID: {}", test.id)?;
        let kind = test.query_type.map(|k| k.as_str().to_uppercase());
        writeln!(self.output, "Type: {}", kind.as_deref().unwrap_or("UNKNOWN"))?;
        writeln!(self.output, "\nQuestion:\n  {}", test.question)?;

        let binary = test.evaluation_type == EvaluationType::Binary && test.query_type == Some(TestKind::Routing);
        if binary {
            let decision = record.route.map(|r| r.as_str().to_uppercase());
            writeln!(self.output, "\nRouting Agent Decision: {}", decision.as_deref().unwrap_or("N/A"))?;
            self.rule()?;

            return Ok(match self.read_verdict()? {
                Reply::Eof => None,
                Reply::Skip => Some(HitlGrade::skipped(test, &self.reviewer, "")),
                Reply::Value(correct) => {
                    let (rating, score) = if correct { (5, 1.0) } else { (1, 0.0) };
                    let mut grade = HitlGrade::rated(test, &self.reviewer, rating, score);
                    grade.actual_route = record.route;
                    writeln!(
                        self.output,
                        "\n[SAVED] Routing {} (Score: {:.2})",
                        if correct { "CORRECT" } else { "INCORRECT" },
                        score
                    )?;
                    Some(grade)
                }
            });
        }

        writeln!(self.output, "\nAgent's Answer:\n  {}", record.answer.as_deref().unwrap_or_default())?;
        if !test.evaluation_criteria.is_empty() {
            writeln!(self.output, "\nEvaluation Criteria:")?;
            for (i, criterion) in test.evaluation_criteria.iter().enumerate() {
                writeln!(self.output, "  {}. {}", i + 1, criterion)?;
            }
        }
        self.rule()?;

        let rating = match self.read_rating()? {
            Reply::Eof => return Ok(None),
            Reply::Skip => return Ok(Some(HitlGrade::skipped(test, &self.reviewer, ""))),
            Reply::Value(rating) => rating,
        };
        let feedback = self.ask("Feedback (optional, press Enter to skip): ")?;

        let score = rating_score(rating);
        let mut grade = HitlGrade::rated(test, &self.reviewer, rating, score);
        grade.feedback = feedback.unwrap_or_default();
        writeln!(self.output, "\n[SAVED] Rating: {}/5 (Score: {:.2})", rating, score)?;
        Ok(Some(grade))
    }

    /// Review every test in order until done or input ends
    pub fn grade_batch(
        &mut self,
        tests: &[TestCase],
        answers: &BTreeMap<String, AnswerRecord>,
    ) -> io::Result<HitlSession> {
        let started = Utc::now();
        let mut results = Vec::with_capacity(tests.len());

        writeln!(self.output)?;
        self.rule()?;
        writeln!(self.output, "HUMAN-IN-THE-LOOP EVALUATION SESSION")?;
        self.rule()?;
        writeln!(self.output, "\nTotal tests to review: {}", tests.len())?;
        writeln!(self.output, "Enter 's' to skip a test. End input (Ctrl+D) to stop and keep progress.")?;

        for (i, test) in tests.iter().enumerate() {
            let record = match answers.get(&test.id) {
                Some(record) if !record.is_error() => record,
                _ => {
                    warn!(test_id = %test.id, "No agent answer, skipping");
                    results.push(HitlGrade::skipped(test, &self.reviewer, "No agent answer available"));
                    continue;
                }
            };

            match self.grade_one(test, record, i + 1, tests.len())? {
                Some(grade) => results.push(grade),
                None => {
                    writeln!(self.output, "\n[INTERRUPTED] Keeping progress...")?;
                    break;
                }
            }
        }

        let session = HitlSession::new(tests.len(), results, started);
        writeln!(self.output)?;
        self.rule()?;
        writeln!(self.output, "EVALUATION SESSION COMPLETE")?;
        writeln!(self.output, "Completed: {}/{}", session.completed_tests, session.total_tests)?;
        writeln!(self.output, "Skipped: {}", session.skipped_tests)?;
        if session.completed_tests > 0 {
            writeln!(self.output, "Average Rating: {:.2}/5", session.average_rating)?;
            writeln!(self.output, "Average Score: {:.2}", session.average_score)?;
        }
        self.rule()?;

        info!(
            completed = session.completed_tests,
            skipped = session.skipped_tests,
            "HITL session finished"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn hitl_test(id: &str, kind: &str, evaluation_type: &str) -> TestCase {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "question": format!("Question {}", id),
            "query_type": kind,
            "evaluation_type": evaluation_type,
            "evaluation_criteria": ["Completeness", "Clarity"]
        }))
        .unwrap()
    }

    fn answers(tests: &[TestCase]) -> BTreeMap<String, AnswerRecord> {
        tests
            .iter()
            .map(|t| {
                let mut record = AnswerRecord::for_test(t);
                record.answer = Some(format!("Answer to {}", t.id));
                record.route = Some(Route::Summary);
                (t.id.clone(), record)
            })
            .collect()
    }

    fn run(input: &str, tests: &[TestCase]) -> (HitlSession, String) {
        let mut output = Vec::new();
        let session = HitlGrader::new(Cursor::new(input.to_string()), &mut output)
            .grade_batch(tests, &answers(tests))
            .unwrap();
        (session, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_rating_scale() {
        assert_eq!(rating_score(1), 0.0);
        assert_eq!(rating_score(3), 0.5);
        assert_eq!(rating_score(5), 1.0);
    }

    #[test]
    fn test_ratings_with_reprompt_and_feedback() {
        let tests = vec![hitl_test("h1", "needle", "rating"), hitl_test("h2", "summary", "rating")];
        let (session, output) = run("7\nabc\n4\nClear answer\ns\n", &tests);

        assert_eq!(session.completed_tests, 1);
        assert_eq!(session.skipped_tests, 1);
        assert_eq!(session.individual_results[0].rating, Some(4));
        assert_eq!(session.individual_results[0].score, Some(0.75));
        assert_eq!(session.individual_results[0].feedback, "Clear answer");
        assert_eq!(output.matches("[ERROR] Please enter a number").count(), 2);
        assert!(output.contains("1. Completeness"));
    }

    #[test]
    fn test_binary_routing() {
        let tests = vec![hitl_test("r1", "routing", "binary"), hitl_test("r2", "routing", "binary")];
        let (session, output) = run("maybe\ny\nn\n", &tests);

        assert!(output.contains("Routing Agent Decision: SUMMARY"));
        assert_eq!(session.individual_results[0].score, Some(1.0));
        assert_eq!(session.individual_results[0].rating, Some(5));
        assert_eq!(session.individual_results[0].actual_route, Some(Route::Summary));
        assert_eq!(session.individual_results[1].score, Some(0.0));
        assert_eq!(session.average_rating, 3.0);
    }

    #[test]
    fn test_eof_keeps_progress() {
        let tests = vec![
            hitl_test("h1", "needle", "rating"),
            hitl_test("h2", "needle", "rating"),
            hitl_test("h3", "needle", "rating"),
        ];
        let (session, output) = run("5\n\n", &tests);

        assert_eq!(session.total_tests, 3);
        assert_eq!(session.individual_results.len(), 1);
        assert_eq!(session.average_score, 1.0);
        assert!(output.contains("[INTERRUPTED]"));
    }

    #[test]
    fn test_resume_replaces_regraded_entries() {
        let tests = vec![hitl_test("h1", "needle", "rating"), hitl_test("h2", "needle", "rating")];
        let (first, _) = run("3\n\ns\n", &tests);
        assert_eq!(HitlSession::completed_ids(&first.individual_results).len(), 1);

        let remaining: Vec<TestCase> = tests
            .iter()
            .filter(|t| !HitlSession::completed_ids(&first.individual_results).contains(&t.id))
            .cloned()
            .collect();
        let (second, _) = run("5\n\n", &remaining);

        let merged = HitlSession::resume(first.individual_results, second, tests.len());
        assert_eq!(merged.individual_results.len(), 2);
        assert_eq!(merged.completed_tests, 2);
        assert_eq!(merged.skipped_tests, 0);
        assert!((merged.average_score - 0.75).abs() < 1e-9);
    }
}
