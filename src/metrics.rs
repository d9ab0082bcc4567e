// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the record engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `record_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `tier`: cache, durable, index, engine
//! - `operation`: fetch, save, incr, destroy, find
//! - `status`: success, error, hit, miss

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record one tier or engine operation
pub fn record_operation(tier: &str, operation: &str, status: &str) {
    counter!(
        "record_engine_operations_total",
        "tier" => tier.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(tier: &str, operation: &str, duration: Duration) {
    histogram!(
        "record_engine_operation_seconds",
        "tier" => tier.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record the outcome of a background cache repopulation
pub fn record_repopulation(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(
        "record_engine_repopulations_total",
        "status" => status
    )
    .increment(1);
}

/// Record a tier call outcome from its result
pub fn record_result<T, E>(tier: &str, operation: &str, result: &Result<T, E>) {
    record_operation(tier, operation, if result.is_ok() { "success" } else { "error" });
}

/// Timer guard that records latency on drop
pub struct LatencyTimer {
    tier: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(tier: &'static str, operation: &'static str) -> Self {
        Self {
            tier,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.tier, self.operation, self.start.elapsed());
    }
}
