//! Needle chunking module
//!
//! Splits each page into small chunks that always end on a sentence
//! boundary. Consecutive chunks share up to `chunk_overlap` characters of
//! whole trailing sentences, and a short tail is folded into the chunk
//! before it. Sizes are counted in characters, not bytes.

use claimrag_common::config::ChunkingConfig;
use claimrag_common::document::{ClaimPage, NeedleChunk};
use regex_lite::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Abbreviations whose period does not end a sentence
const ABBREVIATIONS: &[&str] = &[
    "Mr.", "Mrs.", "Ms.", "Dr.", "Prof.", "Sr.", "Jr.", "Inc.", "Ltd.", "Co.", "Corp.", "etc.",
    "vs.", "e.g.", "i.e.", "Ph.D.", "M.D.",
];

/// Whitespace after `.`, `!` or `?` when followed by a capital or a quote
const BOUNDARY: &str = r#"[.!?](\s+)["'A-Z]"#;

fn boundary() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(BOUNDARY).ok()).as_ref()
}

/// Masks start with a capital so a sentence opening with an abbreviation
/// still counts as a boundary
fn placeholder(index: usize) -> String {
    format!("ABBREV{}MASK", index)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split text into sentences
///
/// A boundary is a whitespace run following `.`, `!` or `?` when the next
/// character is an ASCII capital or a quote. Known abbreviations are masked
/// while splitting and restored afterwards.
pub fn split_into_sentences(text: &str) -> Vec<String> {
    let mut protected = text.to_string();
    for (i, abbrev) in ABBREVIATIONS.iter().enumerate() {
        protected = protected.replace(abbrev, &placeholder(i));
    }

    let mut pieces = Vec::new();
    let mut start = 0;
    if let Some(re) = boundary() {
        for caps in re.captures_iter(&protected) {
            if let Some(gap) = caps.get(1) {
                pieces.push(&protected[start..gap.start()]);
                start = gap.end();
            }
        }
    }
    pieces.push(&protected[start..]);

    pieces
        .into_iter()
        .map(|piece| {
            let mut restored = piece.to_string();
            for (i, abbrev) in ABBREVIATIONS.iter().enumerate() {
                restored = restored.replace(&placeholder(i), abbrev);
            }
            restored.trim().to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// Trailing whole sentences that fit in the overlap budget
fn overlap_tail<'a>(sentences: &[&'a str], budget: usize) -> Vec<&'a str> {
    let mut overlap = Vec::new();
    let mut overlap_len = 0;

    for sentence in sentences.iter().rev() {
        let len = char_len(sentence);
        if overlap_len + len <= budget {
            overlap.insert(0, *sentence);
            overlap_len += len + 1;
        } else {
            break;
        }
    }

    overlap
}

fn make_chunk(page: &ClaimPage, index: usize, sentences: &[&str]) -> NeedleChunk {
    let meta = &page.metadata;
    NeedleChunk {
        chunk_id: NeedleChunk::chunk_id_for(&page.page_id, index),
        parent_id: page.page_id.clone(),
        page_number: meta.page_number,
        chunk_index: index as i32,
        content: sentences.join(" "),
        num_sentences: sentences.len(),
        header: meta.header.clone(),
        date: meta.date.clone(),
        involved_parties: meta.parties_joined(),
        kind: meta.kind,
    }
}

/// Chunk one page into sentence-aligned needle chunks
pub fn chunk_page(page: &ClaimPage, config: &ChunkingConfig) -> Vec<NeedleChunk> {
    let sentences = split_into_sentences(&page.text);

    let mut chunks: Vec<NeedleChunk> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_len = 0;

    for sentence in &sentences {
        let sentence = sentence.as_str();
        let mut potential = current_len + char_len(sentence);
        if !current.is_empty() {
            potential += 1;
        }

        if !current.is_empty() && potential > config.chunk_size {
            chunks.push(make_chunk(page, chunks.len(), &current));

            current = overlap_tail(&current, config.chunk_overlap);
            current.push(sentence);
            current_len = current.iter().map(|s| char_len(s)).sum::<usize>() + current.len() - 1;
        } else {
            current.push(sentence);
            current_len = potential;
        }
    }

    if !current.is_empty() {
        let tail = current.join(" ");
        let merge_tail = !chunks.is_empty() && char_len(&tail) < config.min_chunk_size;

        if merge_tail {
            if let Some(prev) = chunks.last_mut() {
                debug!(page_id = %page.page_id, tail_len = char_len(&tail), "Merging short tail chunk");
                prev.content.push(' ');
                prev.content.push_str(&tail);
                prev.num_sentences += current.len();
            }
        } else {
            chunks.push(make_chunk(page, chunks.len(), &current));
        }
    }

    debug!(
        page_id = %page.page_id,
        sentences = sentences.len(),
        chunks = chunks.len(),
        "Page chunked"
    );

    chunks
}

/// Chunk every page, keeping page order
pub fn chunk_pages(pages: &[ClaimPage], config: &ChunkingConfig) -> Vec<NeedleChunk> {
    pages.iter().flat_map(|page| chunk_page(page, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimrag_common::document::{PageKind, PageMetadata};

    fn page(text: &str) -> ClaimPage {
        ClaimPage::new(
            text,
            PageMetadata {
                page_number: 2,
                header: "Incident Report".to_string(),
                involved_parties: vec!["Sarah Mitchell".to_string(), "Officer Davis".to_string()],
                date: "2024-03-15".to_string(),
                kind: PageKind::Details,
                character_count: None,
            },
        )
    }

    fn config(size: usize, overlap: usize, min: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: size,
            chunk_overlap: overlap,
            min_chunk_size: min,
        }
    }

    #[test]
    fn test_split_basic() {
        let sentences = split_into_sentences("The car stopped. Then it rained! Was anyone hurt? No.");
        assert_eq!(
            sentences,
            vec!["The car stopped.", "Then it rained!", "Was anyone hurt?", "No."]
        );
    }

    #[test]
    fn test_split_protects_abbreviations() {
        let sentences =
            split_into_sentences("Dr. Smith examined Mr. Jones at 5 p.m. today. He was fine.");
        assert_eq!(
            sentences,
            vec!["Dr. Smith examined Mr. Jones at 5 p.m. today.", "He was fine."]
        );

        let sentences = split_into_sentences("Repairs by AutoFix Co. Ltd. were quick. Costs rose.");
        assert_eq!(sentences.len(), 2);
        assert!(sentences[0].starts_with("Repairs by AutoFix Co. Ltd."));
    }

    #[test]
    fn test_split_before_leading_abbreviation() {
        assert_eq!(
            split_into_sentences("The car was towed. Mr. Jones called. Dr. Patel examined her."),
            vec!["The car was towed.", "Mr. Jones called.", "Dr. Patel examined her."]
        );
    }

    #[test]
    fn test_split_keeps_whitespace_run_out_of_sentences() {
        assert_eq!(
            split_into_sentences("Claim filed.\n\n  Adjuster assigned?   \"Yes.\""),
            vec!["Claim filed.", "Adjuster assigned?", "\"Yes.\""]
        );
    }

    #[test]
    fn test_split_requires_capital_or_quote() {
        assert_eq!(split_into_sentences("Total was 3.5 million. ok then").len(), 1);
        assert_eq!(
            split_into_sentences("He said. \"Stop now.\" Then left."),
            vec!["He said.", "\"Stop now.\" Then left."]
        );
    }

    #[test]
    fn test_split_drops_empty() {
        assert!(split_into_sentences("   ").is_empty());
        assert!(split_into_sentences("").is_empty());
    }

    #[test]
    fn test_single_short_page_is_one_chunk() {
        let chunks = chunk_page(&page("Short page. Only two sentences."), &ChunkingConfig::default());
        assert_eq!(chunks.len(), 1);
        let chunk = &chunks[0];
        assert_eq!(chunk.chunk_id, "page_2_chunk_0");
        assert_eq!(chunk.parent_id, "page_2");
        assert_eq!(chunk.num_sentences, 2);
        assert_eq!(chunk.involved_parties, "Sarah Mitchell, Officer Davis");
        assert_eq!(chunk.content, "Short page. Only two sentences.");
    }

    #[test]
    fn test_chunks_respect_size_and_overlap() {
        // Ten sentences of 19 characters each
        let text = (0..10)
            .map(|i| format!("Sentence number {:02}.", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_page(&page(&text), &config(60, 20, 0));

        // Three sentences (59 chars) fill a chunk, the next one would exceed 60
        assert_eq!(chunks[0].content, "Sentence number 00. Sentence number 01. Sentence number 02.");
        // One trailing sentence (19 <= 20) is carried over
        assert!(chunks[1].content.starts_with("Sentence number 02. Sentence number 03."));

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i as i32);
            assert!(chunk.content.ends_with('.'));
        }
    }

    #[test]
    fn test_short_tail_is_merged() {
        let text = format!("{} {} Tail.", "A".repeat(30) + ".", "B".repeat(30) + ".");
        let chunks = chunk_page(&page(&text), &config(35, 0, 20));

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].content.ends_with("Tail."));
        assert_eq!(chunks[1].num_sentences, 2);
    }

    #[test]
    fn test_long_tail_is_kept() {
        let text = format!("{} {}", "A".repeat(30) + ".", "B".repeat(30) + ".");
        let chunks = chunk_page(&page(&text), &config(40, 0, 20));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].num_sentences, 1);
    }

    #[test]
    fn test_oversized_sentence_is_own_chunk() {
        let long = format!("{}.", "x".repeat(100));
        let text = format!("Start here. {} End.", long.replace('x', "W"));
        let chunks = chunk_page(&page(&text), &config(50, 0, 0));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].num_sentences, 1);
        assert!(chunks[1].chunk_size() > 50);
    }

    #[test]
    fn test_empty_page() {
        assert!(chunk_page(&page(""), &ChunkingConfig::default()).is_empty());
    }
}
