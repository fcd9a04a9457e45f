//! Store metrics.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Store operations by entity, operation and outcome.
    pub const OPERATIONS_TOTAL: &str = "store_operations_total";

    /// Optimistic-lock retries by entity.
    pub const CONFLICTS_TOTAL: &str = "store_conflicts_total";

    /// Operation latency in seconds by entity and operation.
    pub const LATENCY_SECONDS: &str = "store_latency_seconds";
}

/// Record a finished store operation.
pub fn record_operation(entity: &'static str, operation: &'static str, ok: bool, latency_ms: f64) {
    counter!(
        names::OPERATIONS_TOTAL,
        "entity" => entity,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "entity" => entity,
        "operation" => operation
    )
    .record(latency_ms / 1000.0);
}

/// Record a WATCH conflict that forced a retry.
pub fn record_conflict(entity: &'static str) {
    counter!(names::CONFLICTS_TOTAL, "entity" => entity).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        assert!(names::OPERATIONS_TOTAL.starts_with("store_"));
        assert!(names::CONFLICTS_TOTAL.contains("conflicts"));
        assert!(names::LATENCY_SECONDS.ends_with("_seconds"));
    }
}
