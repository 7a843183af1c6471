//! Prometheus metrics for flight-ledger.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};
use service_core::error::AppError;

/// Ledger computations by kind and outcome.
pub static LEDGER_COMPUTATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_computations_total",
        "Total number of ledger computations",
        &["kind", "status"]
    )
    .expect("Failed to register LEDGER_COMPUTATIONS")
});

pub static LEDGER_COMPUTATION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_computation_duration_seconds",
        "Ledger computation duration in seconds, retrieval included",
        &["kind"],
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .expect("Failed to register LEDGER_COMPUTATION_DURATION")
});

/// Pages fetched by the bulk retriever.
pub static RETRIEVAL_PAGES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_retrieval_pages_total",
        "Total number of store pages fetched",
        &["resource"]
    )
    .expect("Failed to register RETRIEVAL_PAGES")
});

/// Source records skipped with a processing note.
pub static RECORDS_SKIPPED: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "ledger_records_skipped_total",
        "Total number of source records skipped",
        &["reason"]
    )
    .expect("Failed to register RECORDS_SKIPPED")
});

pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "ledger_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&LEDGER_COMPUTATIONS);
    Lazy::force(&LEDGER_COMPUTATION_DURATION);
    Lazy::force(&RETRIEVAL_PAGES);
    Lazy::force(&RECORDS_SKIPPED);
    Lazy::force(&DB_QUERY_DURATION);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> Result<String, AppError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to encode metrics: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Metrics are not UTF-8: {}", e)))
}

pub fn record_computation(kind: &str, status: &str, duration_secs: f64) {
    LEDGER_COMPUTATIONS.with_label_values(&[kind, status]).inc();
    LEDGER_COMPUTATION_DURATION
        .with_label_values(&[kind])
        .observe(duration_secs);
}

pub fn record_retrieval_page(resource: &str) {
    RETRIEVAL_PAGES.with_label_values(&[resource]).inc();
}

pub fn record_skipped_record(reason: &str) {
    RECORDS_SKIPPED.with_label_values(&[reason]).inc();
}
