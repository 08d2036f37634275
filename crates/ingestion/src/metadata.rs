//! Page metadata loading and enrichment
//!
//! `claim_metadata.json` maps `page_N` keys to hand-written page metadata.
//! Only pages that have an entry are indexed.

use crate::errors::IngestionError;
use crate::pdf::PdfPage;
use claimrag_common::document::{page_id, ClaimPage, PageMetadata};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

pub type MetadataMap = HashMap<String, PageMetadata>;

pub fn load_metadata(path: &Path) -> Result<MetadataMap, IngestionError> {
    if !path.exists() {
        return Err(IngestionError::FileNotFound(path.display().to_string()));
    }

    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| IngestionError::MetadataError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Join PDF pages with their metadata, in page order
pub fn enrich_pages(pages: Vec<PdfPage>, metadata: &MetadataMap) -> Vec<ClaimPage> {
    let mut enriched = Vec::with_capacity(pages.len());

    for page in pages {
        let key = page_id(page.number as i32);
        match metadata.get(&key) {
            Some(meta) => enriched.push(ClaimPage {
                page_id: key,
                text: page.text,
                metadata: meta.clone(),
            }),
            None => debug!(page = page.number, "No metadata for page, skipping"),
        }
    }

    info!(pages = enriched.len(), "Loaded pages with metadata");
    enriched
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimrag_common::document::PageKind;

    fn metadata() -> MetadataMap {
        serde_json::from_str(
            r#"{
                "page_1": {"page_number": 1, "header": "Claim Overview", "involved_parties": ["Sarah Mitchell"], "date": "2024-03-15", "type": "Overview", "character_count": 900},
                "page_3": {"page_number": 3, "header": "Repair Estimate", "involved_parties": ["AutoFix Co."], "date": "2024-03-20", "type": "Details"}
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_enrich_keeps_pages_with_metadata() {
        let pages = (1..=3)
            .map(|n| PdfPage {
                number: n,
                text: format!("page {} text", n),
            })
            .collect();

        let enriched = enrich_pages(pages, &metadata());
        assert_eq!(enriched.len(), 2);
        assert_eq!(enriched[0].page_id, "page_1");
        assert_eq!(enriched[0].metadata.kind, PageKind::Overview);
        assert_eq!(enriched[1].page_id, "page_3");
        assert_eq!(enriched[1].text, "page 3 text");
    }

    #[test]
    fn test_load_rejects_bad_json() {
        let path = std::env::temp_dir().join(format!("claimrag-meta-{}.json", std::process::id()));
        std::fs::write(&path, "{not json").unwrap();
        let err = load_metadata(&path).unwrap_err();
        assert!(matches!(err, IngestionError::MetadataError { .. }));
        std::fs::remove_file(path).ok();
    }
}
