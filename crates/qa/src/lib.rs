//! ClaimRAG QA suite
//!
//! Collects answers from the query agents, grades them with deterministic
//! regex checks, an LLM judge or a human reviewer, and writes a JSON report
//! that accumulates across runs.

pub mod cache;
pub mod collector;
pub mod dataset;
pub mod errors;
pub mod graders;
pub mod report;

pub use cache::{AnswerCache, AnswerRecord};
pub use collector::AnswerCollector;
pub use dataset::{load_tests, TestCase, TestKind};
pub use errors::{QaError, Result};
pub use report::QaReport;
