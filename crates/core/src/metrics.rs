//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Conversions (results, duration, in-flight count)
//! - Progress events relayed from the transcode tool

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Conversion Metrics
// =============================================================================

/// Conversions total by terminal state.
pub static CONVERSIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("vidconv_conversions_total", "Total file conversions"),
        &["result"], // "succeeded", "failed", "probe_failed"
    )
    .unwrap()
});

/// Conversion duration in seconds.
pub static CONVERSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "vidconv_conversion_duration_seconds",
            "Duration of file conversions",
        )
        .buckets(vec![
            0.1, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 600.0, 1800.0, 3600.0,
        ]),
        &["result"],
    )
    .unwrap()
});

/// Conversions currently running.
pub static CONVERSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "vidconv_conversions_active",
        "Number of conversions currently running",
    )
    .unwrap()
});

// =============================================================================
// Progress Metrics
// =============================================================================

/// Progress events delivered to listeners.
pub static PROGRESS_EVENTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "vidconv_progress_events_total",
        "Total progress events parsed from transcode diagnostics",
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(CONVERSIONS_TOTAL.clone()),
        Box::new(CONVERSION_DURATION.clone()),
        Box::new(CONVERSIONS_ACTIVE.clone()),
        Box::new(PROGRESS_EVENTS_TOTAL.clone()),
    ]
}
