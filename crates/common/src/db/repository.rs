//! Repository for the claim index tables
//!
//! Schema management and plain reads go through SeaORM. Statements that
//! carry a `vector` value go through the sqlx pool with `pgvector` types,
//! so similarity ranking happens inside Postgres.

use super::models::{
    ClaimChunk, ClaimChunkEntity, ClaimSummary, ClaimSummaryColumn, ClaimSummaryEntity,
};
use super::schema::{self, CHUNKS_TABLE, SUMMARIES_TABLE};
use crate::db::DbPool;
use crate::document::{NeedleChunk, PageKind, PageSummary, ScoredChunk, ScoredSummary};
use crate::errors::{AppError, Result};
use crate::store::ClaimStore;
use async_trait::async_trait;
use pgvector::Vector;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbBackend, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Statement,
};
use sqlx::postgres::PgRow;
use sqlx::Row;
use tracing::{debug, info, warn};

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
    dimension: usize,
}

impl Repository {
    /// Create a new repository for embeddings of the given dimension
    pub fn new(pool: DbPool, dimension: usize) -> Self {
        Self { pool, dimension }
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<()> {
        if embedding.len() != self.dimension {
            return Err(AppError::Validation {
                message: format!(
                    "embedding has {} dimensions, table expects {}",
                    embedding.len(),
                    self.dimension
                ),
                field: Some("embedding".to_string()),
            });
        }
        Ok(())
    }
}

fn parse_metadata(raw: Option<String>) -> Option<serde_json::Value> {
    raw.and_then(|text| serde_json::from_str(&text).ok())
}

fn chunk_from_row(row: &PgRow) -> Result<ScoredChunk> {
    let model = ClaimChunk {
        chunk_id: row.try_get("chunk_id")?,
        content: row.try_get("content")?,
        metadata: parse_metadata(row.try_get("metadata")?),
        page_number: row.try_get("page_number")?,
        chunk_index: row.try_get("chunk_index")?,
        parent_id: row.try_get("parent_id")?,
    };
    let score: f64 = row.try_get("score")?;

    Ok(ScoredChunk {
        chunk: model.into_chunk(),
        score: score as f32,
    })
}

fn summary_from_row(row: &PgRow) -> Result<ScoredSummary> {
    let model = ClaimSummary {
        summary_id: row.try_get("summary_id")?,
        content: row.try_get("content")?,
        metadata: parse_metadata(row.try_get("metadata")?),
        page_number: row.try_get("page_number")?,
        summary_type: row.try_get("summary_type")?,
    };
    let score: f64 = row.try_get("score")?;

    Ok(ScoredSummary {
        summary: model.into_summary(),
        score: score as f32,
    })
}

#[async_trait]
impl ClaimStore for Repository {
    async fn ensure_schema(&self, recreate: bool) -> Result<()> {
        let conn = self.pool.conn();

        info!("Enabling vector extension");
        conn.execute_unprepared("CREATE EXTENSION IF NOT EXISTS vector").await?;

        if recreate {
            info!("Dropping existing index tables");
            conn.execute_unprepared(&format!("DROP TABLE IF EXISTS {}", CHUNKS_TABLE))
                .await?;
            conn.execute_unprepared(&format!("DROP TABLE IF EXISTS {}", SUMMARIES_TABLE))
                .await?;
        }

        conn.execute_unprepared(&schema::create_chunks_table(self.dimension))
            .await?;
        conn.execute_unprepared(&schema::create_summaries_table(self.dimension))
            .await?;

        for grant in schema::grant_statements() {
            if let Err(e) = conn.execute_unprepared(&grant).await {
                debug!(error = %e, "Skipping PostgREST grant");
            }
        }
        if let Err(e) = conn.execute_unprepared("NOTIFY pgrst, 'reload schema'").await {
            warn!(error = %e, "Could not reload PostgREST schema cache");
        }

        if !self.tables_exist().await? {
            return Err(AppError::TableNotFound {
                table: format!("{}/{}", CHUNKS_TABLE, SUMMARIES_TABLE),
            });
        }

        info!(dimension = self.dimension, "Index tables ready");
        Ok(())
    }

    async fn tables_exist(&self) -> Result<bool> {
        let stmt = Statement::from_string(DbBackend::Postgres, schema::TABLES_EXIST_SQL);
        let count = self
            .pool
            .conn()
            .query_one(stmt)
            .await?
            .map(|row| row.try_get::<i64>("", "table_count"))
            .transpose()?
            .unwrap_or(0);

        Ok(count == 2)
    }

    async fn upsert_chunk(&self, chunk: &NeedleChunk, embedding: &[f32]) -> Result<()> {
        self.check_dimension(embedding)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {CHUNKS_TABLE}
                (chunk_id, content, embedding, metadata, page_number, chunk_index, parent_id)
            VALUES ($1, $2, $3, $4::jsonb, $5, $6, $7)
            ON CONFLICT (chunk_id) DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata,
                page_number = EXCLUDED.page_number,
                chunk_index = EXCLUDED.chunk_index,
                parent_id = EXCLUDED.parent_id
            "#
        ))
        .bind(&chunk.chunk_id)
        .bind(&chunk.content)
        .bind(Vector::from(embedding.to_vec()))
        .bind(chunk.metadata_json().to_string())
        .bind(chunk.page_number)
        .bind(chunk.chunk_index)
        .bind(&chunk.parent_id)
        .execute(self.pool.pg_pool())
        .await?;

        Ok(())
    }

    async fn upsert_summary(&self, summary: &PageSummary, embedding: &[f32]) -> Result<()> {
        self.check_dimension(embedding)?;

        sqlx::query(&format!(
            r#"
            INSERT INTO {SUMMARIES_TABLE}
                (summary_id, content, embedding, metadata, page_number, summary_type)
            VALUES ($1, $2, $3, $4::jsonb, $5, $6)
            ON CONFLICT (summary_id) DO UPDATE SET
                content = EXCLUDED.content,
                embedding = EXCLUDED.embedding,
                metadata = EXCLUDED.metadata,
                page_number = EXCLUDED.page_number,
                summary_type = EXCLUDED.summary_type
            "#
        ))
        .bind(&summary.summary_id)
        .bind(&summary.content)
        .bind(Vector::from(embedding.to_vec()))
        .bind(summary.metadata_json().to_string())
        .bind(summary.page_number)
        .bind(summary.kind.as_str())
        .execute(self.pool.pg_pool())
        .await?;

        Ok(())
    }

    async fn search_chunks(&self, query: &[f32], top_k: usize) -> Result<Vec<ScoredChunk>> {
        self.check_dimension(query)?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT
                chunk_id,
                content,
                metadata::text AS metadata,
                page_number,
                chunk_index,
                parent_id,
                (1 - (embedding <=> $1))::float8 AS score
            FROM {CHUNKS_TABLE}
            WHERE embedding IS NOT NULL
            ORDER BY embedding <=> $1
            LIMIT $2
            "#
        ))
        .bind(Vector::from(query.to_vec()))
        .bind(top_k as i64)
        .fetch_all(self.pool.pg_pool())
        .await?;

        rows.iter().map(chunk_from_row).collect()
    }

    async fn overview_summaries(&self) -> Result<Vec<PageSummary>> {
        let rows = ClaimSummaryEntity::find()
            .filter(ClaimSummaryColumn::SummaryType.eq(PageKind::Overview.as_str()))
            .order_by_asc(ClaimSummaryColumn::PageNumber)
            .all(self.pool.conn())
            .await?;

        Ok(rows.into_iter().map(ClaimSummary::into_summary).collect())
    }

    async fn search_detail_summaries(&self, query: &[f32], limit: usize) -> Result<Vec<ScoredSummary>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;

        let rows = sqlx::query(&format!(
            r#"
            SELECT
                summary_id,
                content,
                metadata::text AS metadata,
                page_number,
                summary_type,
                (1 - (embedding <=> $1))::float8 AS score
            FROM {SUMMARIES_TABLE}
            WHERE embedding IS NOT NULL
              AND summary_type IS DISTINCT FROM 'Overview'
            ORDER BY embedding <=> $1
            LIMIT $2
            "#
        ))
        .bind(Vector::from(query.to_vec()))
        .bind(limit as i64)
        .fetch_all(self.pool.pg_pool())
        .await?;

        rows.iter().map(summary_from_row).collect()
    }

    async fn count_chunks(&self) -> Result<u64> {
        Ok(ClaimChunkEntity::find().count(self.pool.conn()).await?)
    }

    async fn count_summaries(&self) -> Result<u64> {
        Ok(ClaimSummaryEntity::find().count(self.pool.conn()).await?)
    }
}
