//! SeaORM entity models
//!
//! Row views of the two index tables. The `embedding` column is written and
//! searched through raw SQL and is not part of either model.

mod chunk;
mod summary;

pub use chunk::{
    Entity as ClaimChunkEntity,
    Model as ClaimChunk,
    Column as ClaimChunkColumn,
};

pub use summary::{
    Entity as ClaimSummaryEntity,
    Model as ClaimSummary,
    Column as ClaimSummaryColumn,
};
