//! Summary agent: overview answers from page summaries
//!
//! Overview summaries are always in the context. The remaining slots up to
//! `summary_top_k` go to the detail summaries most similar to the question.

use crate::prompts::{summary_user_prompt, SUMMARY_SYSTEM_PROMPT};
use crate::{Agent, AgentAnswer, Source, GENERATION_FAILED_ANSWER};
use claimrag_common::document::{Route, ScoredSummary};
use claimrag_common::errors::Result;
use claimrag_common::{ChatModel, ChatRequest, ClaimStore, Embedder};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

const ANSWER_TEMPERATURE: f32 = 0.3;
const ANSWER_MAX_TOKENS: u32 = 700;

/// Detail slots left once every overview is included
pub fn detail_slots(top_k: usize, overview_count: usize) -> usize {
    top_k.saturating_sub(overview_count)
}

pub fn build_context(summaries: &[ScoredSummary]) -> String {
    summaries
        .iter()
        .map(|scored| {
            let summary = &scored.summary;
            format!("[Page {}: {}]\n{}", summary.page_number, summary.header, summary.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct SummaryAgent {
    store: Arc<dyn ClaimStore>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    top_k: usize,
}

impl SummaryAgent {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        top_k: usize,
    ) -> Self {
        Self {
            store,
            embedder,
            chat,
            top_k,
        }
    }

    /// Overviews first (page order), then the best matching detail pages
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredSummary>> {
        let overviews = self.store.overview_summaries().await?;
        let slots = detail_slots(self.top_k, overviews.len());

        let details = if slots > 0 {
            let embedding = self.embedder.embed(query).await?;
            self.store.search_detail_summaries(&embedding, slots).await?
        } else {
            Vec::new()
        };

        info!(overviews = overviews.len(), details = details.len(), "Summaries selected");
        for scored in &details {
            debug!(page = scored.summary.page_number, score = scored.score, "Detail summary retrieved");
        }

        let mut selected: Vec<ScoredSummary> = overviews
            .into_iter()
            .map(|summary| ScoredSummary { summary, score: 1.0 })
            .collect();
        selected.extend(details);
        Ok(selected)
    }
}

#[async_trait::async_trait]
impl Agent for SummaryAgent {
    #[instrument(skip(self))]
    async fn answer(&self, query: &str) -> Result<AgentAnswer> {
        let summaries = self.search(query).await?;
        if summaries.is_empty() {
            return Ok(AgentAnswer::no_context());
        }

        let context = build_context(&summaries);
        let request = ChatRequest::new(summary_user_prompt(&context, query))
            .system(SUMMARY_SYSTEM_PROMPT)
            .temperature(ANSWER_TEMPERATURE)
            .max_tokens(ANSWER_MAX_TOKENS);

        let answer = match self.chat.complete(&request).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Failed to generate summary answer");
                GENERATION_FAILED_ANSWER.to_string()
            }
        };

        Ok(AgentAnswer {
            answer,
            sources: summaries.iter().map(Source::from).collect(),
            chunks_used: 0,
            parent_pages_used: 0,
            summaries_used: summaries.len(),
        })
    }

    fn route(&self) -> Route {
        Route::Summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NO_CONTEXT_ANSWER;
    use claimrag_common::document::{PageKind, PageSummary};
    use claimrag_common::embeddings::MockEmbedder;
    use claimrag_common::llm::MockChatModel;
    use claimrag_common::InMemoryStore;

    fn summary(page: i32, kind: PageKind, content: &str) -> PageSummary {
        PageSummary {
            summary_id: format!("page_{}_summary", page),
            page_number: page,
            kind,
            header: format!("Header {}", page),
            date: String::new(),
            involved_parties: String::new(),
            original_length: 1000,
            content: content.to_string(),
        }
    }

    async fn agent_with(summaries: &[PageSummary], chat: Arc<MockChatModel>, top_k: usize) -> SummaryAgent {
        let embedder = Arc::new(MockEmbedder::new(128));
        let store = Arc::new(InMemoryStore::new());
        store.ensure_schema(false).await.unwrap();
        for s in summaries {
            let emb = embedder.embed(&s.content).await.unwrap();
            store.upsert_summary(s, &emb).await.unwrap();
        }
        SummaryAgent::new(store, embedder, chat, top_k)
    }

    fn claim_summaries() -> Vec<PageSummary> {
        vec![
            summary(1, PageKind::Overview, "Claim CLM-2024-001 for Sarah Mitchell totals $23,800."),
            summary(2, PageKind::Details, "Police report assigned fault to the other driver."),
            summary(3, PageKind::Details, "Medical treatment at the emergency room for whiplash."),
            summary(4, PageKind::Details, "Repair estimate for the rear bumper from AutoFix."),
        ]
    }

    #[test]
    fn test_detail_slots_saturate() {
        assert_eq!(detail_slots(6, 1), 5);
        assert_eq!(detail_slots(2, 2), 0);
        assert_eq!(detail_slots(1, 3), 0);
    }

    #[tokio::test]
    async fn test_overview_always_first() {
        let agent = agent_with(&claim_summaries(), Arc::new(MockChatModel::constant("ok")), 2).await;

        let selected = agent.search("medical treatment emergency room").await.unwrap();
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0].summary.kind, PageKind::Overview);
        assert_eq!(selected[1].summary.page_number, 3);
    }

    #[tokio::test]
    async fn test_overviews_fill_budget() {
        let mut summaries = claim_summaries();
        summaries.push(summary(5, PageKind::Overview, "Second overview page."));
        let agent = agent_with(&summaries, Arc::new(MockChatModel::constant("ok")), 1).await;

        let selected = agent.search("anything").await.unwrap();
        assert_eq!(selected.len(), 2);
        assert!(selected.iter().all(|s| s.summary.kind == PageKind::Overview));
    }

    #[tokio::test]
    async fn test_answer_context_and_settings() {
        let chat = Arc::new(MockChatModel::constant("The other driver was at fault."));
        let agent = agent_with(&claim_summaries(), chat.clone(), 6).await;

        let answer = agent.answer("Who was at fault?").await.unwrap();
        assert_eq!(answer.summaries_used, 4);
        assert_eq!(answer.sources[0].source_id, "page_1_summary");

        let request = &chat.requests()[0];
        assert!(request.user.starts_with("Insurance claim summaries:\n\n[Page 1: Header 1]\n"));
        assert_eq!(request.max_tokens, 700);
        assert!((request.temperature - 0.3).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_index() {
        let chat = Arc::new(MockChatModel::constant("unused"));
        let agent = agent_with(&[], chat.clone(), 6).await;

        let answer = agent.answer("What happened?").await.unwrap();
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure() {
        let agent = agent_with(&claim_summaries(), Arc::new(MockChatModel::failing("down")), 6).await;
        let answer = agent.answer("Summarize the claim").await.unwrap();
        assert_eq!(answer.answer, GENERATION_FAILED_ANSWER);
        assert_eq!(answer.sources.len(), 4);
    }
}
