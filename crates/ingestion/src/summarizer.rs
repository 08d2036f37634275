//! Page summaries for the summary index
//!
//! One short LLM-written summary per page. Overview pages and detail pages
//! get different prompts so claim-level facts (claim id, policyholder, total
//! value) survive summarization on the overview.

use crate::errors::IngestionError;
use claimrag_common::document::{ClaimPage, PageKind, PageSummary};
use claimrag_common::llm::{ChatModel, ChatRequest};
use std::sync::Arc;
use tracing::{info, instrument};

const SUMMARY_MAX_TOKENS: u32 = 300;

pub fn overview_prompt(page: &ClaimPage) -> String {
    let meta = &page.metadata;
    let date = date_or_unknown(&meta.date);
    format!(
        "You are analyzing an insurance claim overview page.\n\n\
         Page Header: {header}\n\
         Claim Date: {date}\n\
         Involved Parties: {parties}\n\
         Content: {content}\n\n\
         Create a brief summary (75-100 words maximum) that captures:\n\
         1. Claim ID and date (use Claim Date: {date})\n\
         2. Policyholder name and vehicle\n\
         3. Incident type, location, and when it occurred\n\
         4. Total estimated claim value\n\n\
         Include the specific date. Keep it concise and factual. Summary:",
        header = meta.header,
        date = date,
        parties = parties_or_unknown(page),
        content = page.text,
    )
}

pub fn detail_prompt(page: &ClaimPage) -> String {
    let meta = &page.metadata;
    let date = date_or_unknown(&meta.date);
    format!(
        "You are analyzing an insurance claim detail page.\n\n\
         Page Header: {header}\n\
         Event Date: {date}\n\
         Involved Parties: {parties}\n\
         Content: {content}\n\n\
         Create a brief summary (75-100 words maximum) that captures:\n\
         1. When this event occurred (use the Event Date: {date})\n\
         2. What happened (2-3 key actions)\n\
         3. Key people/organizations involved (from the Involved Parties listed above)\n\
         4. Most important finding or detail\n\
         5. Any costs or financial amounts mentioned\n\n\
         Include the specific date and relevant parties in your summary. \
         Be concise and focus on facts only. Summary:",
        header = meta.header,
        date = date,
        parties = parties_or_unknown(page),
        content = page.text,
    )
}

fn date_or_unknown(date: &str) -> &str {
    if date.trim().is_empty() {
        "date not specified"
    } else {
        date
    }
}

fn parties_or_unknown(page: &ClaimPage) -> String {
    if page.metadata.involved_parties.is_empty() {
        "not specified".to_string()
    } else {
        page.metadata.parties_joined()
    }
}

/// Writes one summary per page with the configured chat model
pub struct PageSummarizer {
    chat: Arc<dyn ChatModel>,
    temperature: f32,
}

impl PageSummarizer {
    pub fn new(chat: Arc<dyn ChatModel>, temperature: f32) -> Self {
        Self { chat, temperature }
    }

    #[instrument(skip(self, page), fields(page_id = %page.page_id))]
    pub async fn summarize(&self, page: &ClaimPage) -> Result<PageSummary, IngestionError> {
        let prompt = match page.metadata.kind {
            PageKind::Overview => overview_prompt(page),
            PageKind::Details => detail_prompt(page),
        };

        let request = ChatRequest::new(prompt)
            .temperature(self.temperature)
            .max_tokens(SUMMARY_MAX_TOKENS);

        let content = self
            .chat
            .complete(&request)
            .await
            .map_err(|source| IngestionError::SummaryFailed {
                page_id: page.page_id.clone(),
                source,
            })?;

        let original_length = page.text.chars().count();
        info!(
            original_length,
            summary_length = content.chars().count(),
            "Summary created"
        );

        let meta = &page.metadata;
        Ok(PageSummary {
            summary_id: PageSummary::summary_id_for(&page.page_id),
            page_number: meta.page_number,
            kind: meta.kind,
            header: meta.header.clone(),
            date: meta.date.clone(),
            involved_parties: meta.parties_joined(),
            original_length,
            content: content.trim().to_string(),
        })
    }
}
