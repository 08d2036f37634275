//! Needle agent: precise answers from small chunks
//!
//! Retrieves the top-K chunks by similarity. When at least
//! `auto_merge_threshold` of them come from the same page, that full page is
//! appended to the context after the chunks.

use crate::prompts::{needle_user_prompt, NEEDLE_SYSTEM_PROMPT};
use crate::{Agent, AgentAnswer, Source, GENERATION_FAILED_ANSWER};
use claimrag_common::config::RetrievalConfig;
use claimrag_common::document::{Route, ScoredChunk};
use claimrag_common::errors::Result;
use claimrag_common::metrics::record_auto_merge;
use claimrag_common::{ChatModel, ChatRequest, ClaimStore, DocStore, Embedder};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

const ANSWER_TEMPERATURE: f32 = 0.1;
const ANSWER_MAX_TOKENS: u32 = 500;
const SEPARATOR_WIDTH: usize = 70;

/// Parents whose retrieved chunk count reaches the threshold, in order of
/// first appearance
pub fn parents_to_merge(chunks: &[ScoredChunk], threshold: usize, enabled: bool) -> Vec<String> {
    if !enabled {
        return Vec::new();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for scored in chunks {
        *counts.entry(scored.chunk.parent_id.as_str()).or_default() += 1;
    }

    let mut merged: Vec<String> = Vec::new();
    for scored in chunks {
        let parent = scored.chunk.parent_id.as_str();
        let count = counts.get(parent).copied().unwrap_or_default();
        if count >= threshold && !merged.iter().any(|p| p == parent) {
            merged.push(parent.to_string());
        }
    }
    merged
}

/// Needle context and the number of parent pages actually added
pub fn build_context(chunks: &[ScoredChunk], merge: &[String], docstore: &DocStore) -> (String, usize) {
    let mut parts: Vec<String> = chunks
        .iter()
        .enumerate()
        .map(|(i, scored)| {
            let chunk = &scored.chunk;
            format!(
                "[Chunk {} - Page {}: {}]\n{}",
                i + 1,
                chunk.page_number,
                chunk.header,
                chunk.content
            )
        })
        .collect();

    let mut added = 0;
    if !merge.is_empty() {
        let rule = "=".repeat(SEPARATOR_WIDTH);
        parts.push(format!("\n{}", rule));
        parts.push("[ADDITIONAL CONTEXT - Full Parent Pages]".to_string());
        parts.push(format!("{}\n", rule));

        for parent_id in merge {
            let first = chunks.iter().find(|c| &c.chunk.parent_id == parent_id);
            match (first, docstore.text_of(parent_id)) {
                (Some(scored), Some(text)) if !text.is_empty() => {
                    parts.push(format!(
                        "[FULL PAGE - Page {}: {}]\n{}\n",
                        scored.chunk.page_number, scored.chunk.header, text
                    ));
                    added += 1;
                }
                _ => debug!(parent_id = %parent_id, "Parent page not in document store"),
            }
        }
    }

    (parts.join("\n\n"), added)
}

pub struct NeedleAgent {
    store: Arc<dyn ClaimStore>,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    docstore: Arc<DocStore>,
    top_k: usize,
    merge_threshold: usize,
    auto_merge: bool,
}

impl NeedleAgent {
    pub fn new(
        store: Arc<dyn ClaimStore>,
        embedder: Arc<dyn Embedder>,
        chat: Arc<dyn ChatModel>,
        docstore: Arc<DocStore>,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chat,
            docstore,
            top_k: retrieval.needle_top_k,
            merge_threshold: retrieval.auto_merge_threshold,
            auto_merge: retrieval.auto_merge,
        }
    }

    pub fn with_auto_merge(mut self, enabled: bool) -> Self {
        self.auto_merge = enabled;
        self
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(query).await?;
        let chunks = self.store.search_chunks(&embedding, self.top_k).await?;

        for (rank, scored) in chunks.iter().enumerate() {
            debug!(
                rank = rank + 1,
                chunk_id = %scored.chunk.chunk_id,
                page = scored.chunk.page_number,
                score = scored.score,
                "Chunk retrieved"
            );
        }
        Ok(chunks)
    }
}

#[async_trait::async_trait]
impl Agent for NeedleAgent {
    #[instrument(skip(self))]
    async fn answer(&self, query: &str) -> Result<AgentAnswer> {
        let chunks = self.search(query).await?;
        if chunks.is_empty() {
            return Ok(AgentAnswer::no_context());
        }

        let merge = parents_to_merge(&chunks, self.merge_threshold, self.auto_merge);
        if !merge.is_empty() {
            info!(parents = ?merge, threshold = self.merge_threshold, "Auto-merge threshold met");
        }

        let (context, parent_pages_used) = build_context(&chunks, &merge, &self.docstore);
        record_auto_merge(parent_pages_used);

        let request = ChatRequest::new(needle_user_prompt(&context, query))
            .system(NEEDLE_SYSTEM_PROMPT)
            .temperature(ANSWER_TEMPERATURE)
            .max_tokens(ANSWER_MAX_TOKENS);

        let answer = match self.chat.complete(&request).await {
            Ok(answer) => answer,
            Err(e) => {
                error!(error = %e, "Failed to generate needle answer");
                GENERATION_FAILED_ANSWER.to_string()
            }
        };

        Ok(AgentAnswer {
            answer,
            sources: chunks.iter().map(Source::from).collect(),
            chunks_used: chunks.len(),
            parent_pages_used,
            summaries_used: 0,
        })
    }

    fn route(&self) -> Route {
        Route::Needle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NO_CONTEXT_ANSWER;
    use claimrag_common::document::{ClaimPage, NeedleChunk, PageKind, PageMetadata};
    use claimrag_common::embeddings::MockEmbedder;
    use claimrag_common::llm::MockChatModel;
    use claimrag_common::InMemoryStore;

    fn chunk(page: i32, index: usize, content: &str) -> NeedleChunk {
        let parent = format!("page_{}", page);
        NeedleChunk {
            chunk_id: NeedleChunk::chunk_id_for(&parent, index),
            parent_id: parent,
            page_number: page,
            chunk_index: index as i32,
            content: content.to_string(),
            num_sentences: 1,
            header: format!("Header {}", page),
            date: "2024-03-15".to_string(),
            involved_parties: String::new(),
            kind: PageKind::Details,
        }
    }

    fn scored(page: i32, index: usize) -> ScoredChunk {
        ScoredChunk {
            chunk: chunk(page, index, &format!("chunk {} of page {}", index, page)),
            score: 0.9,
        }
    }

    fn docstore(pages: &[i32]) -> DocStore {
        let pages: Vec<ClaimPage> = pages
            .iter()
            .map(|&n| {
                ClaimPage::new(
                    format!("Full text of page {}.", n),
                    PageMetadata {
                        page_number: n,
                        header: format!("Header {}", n),
                        involved_parties: Vec::new(),
                        date: String::new(),
                        kind: PageKind::Details,
                        character_count: None,
                    },
                )
            })
            .collect();
        DocStore::from_pages(&pages)
    }

    #[test]
    fn test_parents_to_merge_threshold_and_order() {
        let chunks = vec![
            scored(4, 0),
            scored(2, 0),
            scored(2, 1),
            scored(4, 1),
            scored(2, 2),
            scored(4, 2),
            scored(7, 0),
        ];
        assert_eq!(parents_to_merge(&chunks, 3, true), vec!["page_4", "page_2"]);
        assert!(parents_to_merge(&chunks, 4, true).is_empty());
        assert!(parents_to_merge(&chunks, 3, false).is_empty());
    }

    #[test]
    fn test_context_without_merge() {
        let chunks = vec![scored(1, 0), scored(3, 2)];
        let (context, added) = build_context(&chunks, &[], &docstore(&[1, 3]));

        assert_eq!(added, 0);
        assert_eq!(
            context,
            "[Chunk 1 - Page 1: Header 1]\nchunk 0 of page 1\n\n[Chunk 2 - Page 3: Header 3]\nchunk 2 of page 3"
        );
    }

    #[test]
    fn test_context_appends_full_pages() {
        let chunks = vec![scored(2, 0), scored(2, 1), scored(5, 0), scored(2, 2)];
        let merge = vec!["page_2".to_string(), "page_5".to_string()];
        // page_5 is missing from the store and is skipped
        let (context, added) = build_context(&chunks, &merge, &docstore(&[2]));

        assert_eq!(added, 1);
        assert!(context.contains("[Chunk 4 - Page 2: Header 2]"));
        assert!(context.contains(&format!("\n\n\n{}\n\n[ADDITIONAL CONTEXT - Full Parent Pages]", "=".repeat(70))));
        assert!(context.ends_with("[FULL PAGE - Page 2: Header 2]\nFull text of page 2.\n"));
        assert_eq!(context.matches("[FULL PAGE").count(), 1);
    }

    async fn agent_with(chunks: &[NeedleChunk], chat: Arc<MockChatModel>, pages: &[i32]) -> NeedleAgent {
        let embedder = Arc::new(MockEmbedder::new(128));
        let store = Arc::new(InMemoryStore::new());
        store.ensure_schema(false).await.unwrap();
        for c in chunks {
            let emb = embedder.embed(&c.content).await.unwrap();
            store.upsert_chunk(c, &emb).await.unwrap();
        }
        NeedleAgent::new(
            store,
            embedder,
            chat,
            Arc::new(docstore(pages)),
            &RetrievalConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_answer_merges_dominant_page() {
        let chunks = vec![
            chunk(3, 0, "The tow truck arrived at 9:40 AM."),
            chunk(3, 1, "The tow truck driver was Tom Reyes."),
            chunk(3, 2, "The tow truck took the car to AutoFix."),
            chunk(5, 0, "The adjuster reviewed photos."),
        ];
        let chat = Arc::new(MockChatModel::constant("9:40 AM"));
        let agent = agent_with(&chunks, chat.clone(), &[3, 5]).await;

        let answer = agent.answer("When did the tow truck arrive?").await.unwrap();
        assert_eq!(answer.answer, "9:40 AM");
        assert_eq!(answer.chunks_used, 4);
        assert_eq!(answer.parent_pages_used, 1);
        assert_eq!(answer.sources.len(), 4);

        let request = &chat.requests()[0];
        assert!(request.user.contains("[FULL PAGE - Page 3: Header 3]"));
        assert!(request.user.ends_with("Question: When did the tow truck arrive?\n\nAnswer:"));
        assert_eq!(request.max_tokens, 500);
    }

    #[tokio::test]
    async fn test_answer_without_auto_merge() {
        let chunks = vec![
            chunk(3, 0, "The tow truck arrived at 9:40 AM."),
            chunk(3, 1, "The tow truck driver was Tom Reyes."),
            chunk(3, 2, "The tow truck took the car to AutoFix."),
        ];
        let chat = Arc::new(MockChatModel::constant("Tom Reyes"));
        let agent = agent_with(&chunks, chat.clone(), &[3]).await.with_auto_merge(false);

        let answer = agent.answer("Who drove the tow truck?").await.unwrap();
        assert_eq!(answer.parent_pages_used, 0);
        assert!(!chat.requests()[0].user.contains("ADDITIONAL CONTEXT"));
    }

    #[tokio::test]
    async fn test_empty_index_skips_model() {
        let chat = Arc::new(MockChatModel::constant("unused"));
        let agent = agent_with(&[], chat.clone(), &[]).await;

        let answer = agent.answer("Anything?").await.unwrap();
        assert_eq!(answer.answer, NO_CONTEXT_ANSWER);
        assert_eq!(answer.chunks_used, 0);
        assert_eq!(chat.call_count(), 0);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_sources() {
        let chunks = vec![chunk(1, 0, "Claim CLM-2024-001 was filed.")];
        let agent = agent_with(&chunks, Arc::new(MockChatModel::failing("500")), &[1]).await;

        let answer = agent.answer("Which claim?").await.unwrap();
        assert_eq!(answer.answer, GENERATION_FAILED_ANSWER);
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].source_id, "page_1_chunk_0");
    }
}
