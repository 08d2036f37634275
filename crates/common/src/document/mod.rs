//! Claim document model
//!
//! A claim file is a short PDF where every page carries hand-written
//! metadata (header, date, parties, page type). Pages are indexed twice:
//! as small needle chunks for fact lookup and as one summary per page.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of claim page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PageKind {
    /// Claim-level overview, always included in summary answers
    Overview,
    /// Any other page (timeline entries, reports, invoices)
    #[serde(other)]
    Details,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Overview => "Overview",
            PageKind::Details => "Details",
        }
    }

    /// Lenient parse, unknown labels are treated as detail pages
    pub fn from_label(label: &str) -> Self {
        if label.eq_ignore_ascii_case("overview") {
            PageKind::Overview
        } else {
            PageKind::Details
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata attached to one PDF page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMetadata {
    pub page_number: i32,
    pub header: String,
    #[serde(default)]
    pub involved_parties: Vec<String>,
    #[serde(default)]
    pub date: String,
    #[serde(rename = "type")]
    pub kind: PageKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_count: Option<usize>,
}

impl PageMetadata {
    pub fn parties_joined(&self) -> String {
        self.involved_parties.join(", ")
    }
}

/// Page id used as the parent id of its chunks
pub fn page_id(page_number: i32) -> String {
    format!("page_{}", page_number)
}

/// A PDF page enriched with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimPage {
    pub page_id: String,
    pub text: String,
    pub metadata: PageMetadata,
}

impl ClaimPage {
    pub fn new(text: impl Into<String>, metadata: PageMetadata) -> Self {
        Self {
            page_id: page_id(metadata.page_number),
            text: text.into(),
            metadata,
        }
    }
}

/// Small sentence-aligned chunk for precise retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeedleChunk {
    pub chunk_id: String,
    pub parent_id: String,
    pub page_number: i32,
    pub chunk_index: i32,
    pub content: String,
    pub num_sentences: usize,
    pub header: String,
    pub date: String,
    pub involved_parties: String,
    pub kind: PageKind,
}

impl NeedleChunk {
    pub fn chunk_id_for(page_id: &str, index: usize) -> String {
        format!("{}_chunk_{}", page_id, index)
    }

    pub fn chunk_size(&self) -> usize {
        self.content.chars().count()
    }

    /// Metadata document stored next to the embedding
    pub fn metadata_json(&self) -> serde_json::Value {
        serde_json::json!({
            "page_number": self.page_number,
            "header": self.header,
            "date": self.date,
            "involved_parties": self.involved_parties,
            "type": self.kind.as_str(),
            "chunk_index": self.chunk_index,
            "parent_id": self.parent_id,
            "chunk_id": self.chunk_id,
            "chunk_size": self.chunk_size(),
            "num_sentences": self.num_sentences,
        })
    }
}

/// One LLM-written summary per page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub summary_id: String,
    pub page_number: i32,
    pub kind: PageKind,
    pub header: String,
    pub date: String,
    pub involved_parties: String,
    pub original_length: usize,
    pub content: String,
}

impl PageSummary {
    pub fn summary_id_for(page_id: &str) -> String {
        format!("{}_summary", page_id)
    }

    pub fn metadata_json(&self) -> serde_json::Value {
        serde_json::json!({
            "page_number": self.page_number,
            "summary_id": self.summary_id,
            "summary_type": self.kind.as_str(),
            "header": self.header,
            "date": self.date,
            "involved_parties": self.involved_parties,
            "original_length": self.original_length,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: NeedleChunk,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredSummary {
    pub summary: PageSummary,
    pub score: f32,
}

/// Retrieval strategy chosen for a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    Needle,
    Summary,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Needle => "needle",
            Route::Summary => "summary",
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "needle" => Ok(Route::Needle),
            "summary" => Ok(Route::Summary),
            other => Err(format!("unknown route '{}', expected needle or summary", other)),
        }
    }
}
