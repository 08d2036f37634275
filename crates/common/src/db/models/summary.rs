//! Page summary rows

use crate::document::{PageKind, PageSummary};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "claim_summaries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub summary_id: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub metadata: Option<Json>,

    pub page_number: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub summary_type: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    pub fn into_summary(self) -> PageSummary {
        let meta = self.metadata.unwrap_or_default();
        let text = |key: &str| {
            meta.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };

        PageSummary {
            page_number: self.page_number.unwrap_or_default(),
            kind: PageKind::from_label(self.summary_type.as_deref().unwrap_or_default()),
            header: text("header"),
            date: text("date"),
            involved_parties: text("involved_parties"),
            original_length: meta
                .get("original_length")
                .and_then(|v| v.as_u64())
                .unwrap_or_default() as usize,
            summary_id: self.summary_id,
            content: self.content,
        }
    }
}
