//! Prometheus metrics for history persistence and crawl mapping
//!
//! This module tracks:
//! - Fetch history: entries recorded
//! - Persistence: store writes and hits, preloaded records, journal lines and
//!   write errors
//! - Crawl mapping: URIs diverted per target node, duplicate diversions
//!   suppressed
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! Until then, and if initialization fails, metrics operations are no-ops.

use prometheus::{
    register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct RecrawlMetrics {
    history_entries: Counter,
    store_writes: Counter,
    store_hits: Counter,
    preloaded_records: Counter,
    journal_lines: Counter,
    journal_write_errors: Counter,
    diversions: CounterVec,
    diversions_suppressed: Counter,
}

static RECRAWL_METRICS: OnceLock<RecrawlMetrics> = OnceLock::new();

static METRICS_INIT_ATTEMPTED: OnceLock<bool> = OnceLock::new();

// ============================================================================
// Initialization
// ============================================================================

/// Register all metrics with the default Prometheus registry
///
/// Safe to call more than once; only the first call registers.
///
/// # Example
///
/// ```ignore
/// if let Err(e) = recrawl::metrics::init_metrics() {
///     eprintln!("Warning: Metrics initialization failed: {}", e);
/// }
/// ```
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    if METRICS_INIT_ATTEMPTED.get().is_some() {
        return Ok(());
    }
    METRICS_INIT_ATTEMPTED.set(true).ok();

    let metrics = RecrawlMetrics {
        history_entries: register_counter!(
            "recrawl_history_entries_total",
            "Fetch history entries recorded"
        )?,
        store_writes: register_counter!(
            "recrawl_store_writes_total",
            "History records written to the store"
        )?,
        store_hits: register_counter!(
            "recrawl_store_hits_total",
            "Prior history records merged into live URIs"
        )?,
        preloaded_records: register_counter!(
            "recrawl_preloaded_records_total",
            "History records preloaded from journals or prior stores"
        )?,
        journal_lines: register_counter!(
            "recrawl_journal_lines_total",
            "Data lines appended to recrawl journals"
        )?,
        journal_write_errors: register_counter!(
            "recrawl_journal_write_errors_total",
            "Journal writes dropped after I/O failure"
        )?,
        diversions: register_counter_vec!(
            "recrawl_diversions_total",
            "URIs diverted to another crawler node",
            &["target"]
        )?,
        diversions_suppressed: register_counter!(
            "recrawl_diversions_suppressed_total",
            "Diversions skipped because the URI was diverted recently"
        )?,
    };

    RECRAWL_METRICS
        .set(metrics)
        .map_err(|_| "Recrawl metrics already initialized")?;

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(())
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    RECRAWL_METRICS.get().is_some()
}

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

// ============================================================================
// Recording
// ============================================================================

pub fn record_history_entry() {
    if let Some(m) = RECRAWL_METRICS.get() {
        m.history_entries.inc();
    }
}

pub fn record_store_write() {
    if let Some(m) = RECRAWL_METRICS.get() {
        m.store_writes.inc();
    }
}

pub fn record_store_hit() {
    if let Some(m) = RECRAWL_METRICS.get() {
        m.store_hits.inc();
    }
}

pub fn record_preloaded(count: usize) {
    if count == 0 {
        return;
    }
    if let Some(m) = RECRAWL_METRICS.get() {
        m.preloaded_records.inc_by(count as f64);
    }
}

pub fn record_journal_line() {
    if let Some(m) = RECRAWL_METRICS.get() {
        m.journal_lines.inc();
    }
}

pub fn record_journal_write_error() {
    if let Some(m) = RECRAWL_METRICS.get() {
        m.journal_write_errors.inc();
    }
}

/// Record a URI diverted to `target`
pub fn record_diversion(target: &str) {
    if let Some(m) = RECRAWL_METRICS.get() {
        m.diversions.with_label_values(&[target]).inc();
    }
}

pub fn record_diversion_suppressed() {
    if let Some(m) = RECRAWL_METRICS.get() {
        m.diversions_suppressed.inc();
    }
}
