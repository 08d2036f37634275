//! Parent page store
//!
//! Full page texts are kept in a local JSON file next to the vector index so
//! the needle agent can pull a whole page into its context when several of
//! its chunks are retrieved together.

use crate::document::ClaimPage;
use crate::errors::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocStore {
    pages: BTreeMap<String, ClaimPage>,
}

impl DocStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pages(pages: &[ClaimPage]) -> Self {
        let mut store = Self::new();
        for page in pages {
            store.insert(page.clone());
        }
        store
    }

    pub fn insert(&mut self, page: ClaimPage) {
        self.pages.insert(page.page_id.clone(), page);
    }

    pub fn get(&self, page_id: &str) -> Option<&ClaimPage> {
        self.pages.get(page_id)
    }

    /// Full text of a page, if stored
    pub fn text_of(&self, page_id: &str) -> Option<&str> {
        self.pages.get(page_id).map(|p| p.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Load the store, an absent file yields an empty store
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "Document store not found, auto-merge disabled until the indexer runs");
            return Ok(Self::new());
        }

        let raw = std::fs::read_to_string(path)?;
        let store: DocStore = serde_json::from_str(&raw)?;
        info!(path = %path.display(), pages = store.len(), "Loaded document store");
        Ok(store)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!(path = %path.display(), pages = self.len(), "Saved document store");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{PageKind, PageMetadata};

    fn page(n: i32) -> ClaimPage {
        ClaimPage::new(
            format!("Full text of page {}.", n),
            PageMetadata {
                page_number: n,
                header: format!("Header {}", n),
                involved_parties: vec!["Jane Doe".to_string()],
                date: "2024-02-01".to_string(),
                kind: PageKind::Details,
                character_count: None,
            },
        )
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("claimrag-docstore-{}", std::process::id()));
        let path = dir.join("docstore.json");

        let store = DocStore::from_pages(&[page(1), page(2)]);
        store.save(&path).unwrap();

        let loaded = DocStore::load(&path).unwrap();
        assert_eq!(loaded, store);
        assert_eq!(loaded.get("page_2").unwrap().metadata.header, "Header 2");
        assert_eq!(loaded.text_of("page_1"), Some("Full text of page 1."));

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_file_is_empty() {
        let store = DocStore::load(Path::new("/nonexistent/claimrag/docstore.json")).unwrap();
        assert!(store.is_empty());
        assert!(store.get("page_1").is_none());
        assert!(store.text_of("page_1").is_none());
    }
}
