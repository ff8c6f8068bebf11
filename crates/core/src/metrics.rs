//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Remote catalog traffic (requests, retries, cache hits)
//! - Rate limiting
//! - Identify runs

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Remote Catalog Metrics
// =============================================================================

/// Remote catalog attempts by operation and result.
pub static REMOTE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "comicmeta_remote_requests_total",
            "Total remote catalog requests",
        ),
        &["operation", "result"], // result: "success", "error"
    )
    .unwrap()
});

/// Retries scheduled after a retryable failure.
pub static REMOTE_RETRIES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "comicmeta_remote_retries_total",
            "Total remote catalog retries",
        ),
        &["operation"],
    )
    .unwrap()
});

/// Response cache lookups by operation and result.
pub static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "comicmeta_cache_lookups_total",
            "Total response cache lookups",
        ),
        &["operation", "result"], // result: "hit", "miss"
    )
    .unwrap()
});

// =============================================================================
// Rate Limiting Metrics
// =============================================================================

/// Times a caller had to sleep for a request token.
pub static RATE_LIMIT_WAITS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "comicmeta_rate_limit_waits_total",
        "Total waits for a request token",
    )
    .unwrap()
});

// =============================================================================
// Identify Metrics
// =============================================================================

/// Results published per identify run.
pub static IDENTIFY_RESULTS: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "comicmeta_identify_results",
            "Number of results published per identify run",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &["state"], // "done", "aborted"
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(REMOTE_REQUESTS.clone()),
        Box::new(REMOTE_RETRIES.clone()),
        Box::new(CACHE_LOOKUPS.clone()),
        Box::new(RATE_LIMIT_WAITS.clone()),
        Box::new(IDENTIFY_RESULTS.clone()),
    ]
}
