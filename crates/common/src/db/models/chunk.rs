//! Needle chunk rows

use crate::document::{NeedleChunk, PageKind};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "claim_chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub chunk_id: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    pub page_number: Option<i32>,

    pub chunk_index: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub parent_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Rebuild the domain chunk from the row and its metadata document
    pub fn into_chunk(self) -> NeedleChunk {
        let meta = self.metadata.unwrap_or_default();
        let text = |key: &str| {
            meta.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        NeedleChunk {
            parent_id: self.parent_id.unwrap_or_else(|| text("parent_id")),
            page_number: self.page_number.unwrap_or_default(),
            chunk_index: self.chunk_index.unwrap_or_default(),
            num_sentences: meta
                .get("num_sentences")
                .and_then(|v| v.as_u64())
                .unwrap_or_default() as usize,
            header: text("header"),
            date: text("date"),
            involved_parties: text("involved_parties"),
            kind: PageKind::from_label(&text("type")),
            chunk_id: self.chunk_id,
            content: self.content,
        }
    }
}
