//! Database layer for ClaimRAG
//!
//! Provides:
//! - SeaORM entity models for the two index tables
//! - Schema setup (pgvector extension, tables, grants)
//! - Repository implementing [`crate::store::ClaimStore`]
//! - Connection pool management

pub mod models;
mod repository;
mod schema;

pub use repository::Repository;
pub use schema::{CHUNKS_TABLE, SUMMARIES_TABLE};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let url = config.connection_url()?;
        info!("Connecting to database...");

        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    /// SeaORM connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Underlying sqlx pool, used for pgvector-typed statements
    pub fn pg_pool(&self) -> &sqlx::PgPool {
        self.conn.get_postgres_connection_pool()
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;
        Ok(())
    }
}
