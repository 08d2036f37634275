//! Metrics and observability utilities
//!
//! Counters and histograms are emitted through the `metrics` facade; the
//! binaries install no exporter, so they are no-ops unless a recorder is set.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all ClaimRAG metrics
pub const METRICS_PREFIX: &str = "claimrag";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total queries answered, by route"
    );

    describe_histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end query latency in seconds"
    );

    describe_counter!(
        format!("{}_auto_merges_total", METRICS_PREFIX),
        Unit::Count,
        "Parent pages merged into needle contexts"
    );

    describe_counter!(
        format!("{}_chunks_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Needle chunks written to the vector store"
    );

    describe_counter!(
        format!("{}_summaries_indexed_total", METRICS_PREFIX),
        Unit::Count,
        "Page summaries written to the vector store"
    );

    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total chat completion requests"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Chat completion latency in seconds, retries included"
    );

    tracing::debug!("Metrics registered");
}

/// Helper to record embedding metrics
pub fn record_embedding(duration_secs: f64, model: &str, batch_size: usize, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);

        histogram!(format!("{}_embedding_batch_size", METRICS_PREFIX)).record(batch_size as f64);
    }
}

/// Helper to record chat completion metrics
pub fn record_llm(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "model" => model.to_string()
    )
    .record(duration_secs);
}

/// Helper to record an answered query
pub fn record_query(route: &str, duration_secs: f64) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "route" => route.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_query_duration_seconds", METRICS_PREFIX),
        "route" => route.to_string()
    )
    .record(duration_secs);
}

pub fn record_auto_merge(pages: usize) {
    counter!(format!("{}_auto_merges_total", METRICS_PREFIX)).increment(pages as u64);
}

/// Helper to record index writes
pub fn record_indexed(kind: IndexKind, count: usize) {
    let name = match kind {
        IndexKind::Chunks => "chunks_indexed_total",
        IndexKind::Summaries => "summaries_indexed_total",
    };
    counter!(format!("{}_{}", METRICS_PREFIX, name)).increment(count as u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Chunks,
    Summaries,
}
