//! DDL for the pgvector index tables

pub const CHUNKS_TABLE: &str = "claim_chunks";
pub const SUMMARIES_TABLE: &str = "claim_summaries";

pub(crate) fn create_chunks_table(dimension: usize) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {CHUNKS_TABLE} (
            chunk_id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            embedding VECTOR({dimension}),
            metadata JSONB,
            page_number INTEGER,
            chunk_index INTEGER,
            parent_id TEXT
        )
        "#
    )
}

pub(crate) fn create_summaries_table(dimension: usize) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {SUMMARIES_TABLE} (
            summary_id TEXT PRIMARY KEY,
            content TEXT NOT NULL,
            embedding VECTOR({dimension}),
            metadata JSONB,
            page_number INTEGER,
            summary_type TEXT
        )
        "#
    )
}

/// Grants for the Supabase PostgREST roles, absent on plain Postgres
pub(crate) fn grant_statements() -> Vec<String> {
    [CHUNKS_TABLE, SUMMARIES_TABLE]
        .iter()
        .map(|table| {
            format!(
                "GRANT ALL ON TABLE {} TO postgres, anon, authenticated, service_role",
                table
            )
        })
        .collect()
}

pub(crate) const TABLES_EXIST_SQL: &str = r#"
    SELECT COUNT(*)::BIGINT AS table_count
    FROM information_schema.tables
    WHERE table_schema = 'public'
      AND table_name IN ('claim_chunks', 'claim_summaries')
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ddl_uses_dimension() {
        let sql = create_chunks_table(1536);
        assert!(sql.contains("VECTOR(1536)"));
        assert!(sql.contains("chunk_id TEXT PRIMARY KEY"));
        assert!(create_summaries_table(8).contains("VECTOR(8)"));
    }

    #[test]
    fn test_grants_cover_both_tables() {
        let grants = grant_statements();
        assert_eq!(grants.len(), 2);
        assert!(grants[1].contains(SUMMARIES_TABLE));
    }
}
