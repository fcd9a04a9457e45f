//! Provider metrics.

use metrics::{counter, histogram};

pub mod names {
    /// Provider calls by provider, operation and outcome.
    pub const CALLS_TOTAL: &str = "provider_calls_total";

    /// Wall-clock time of local renders in seconds.
    pub const RENDER_SECONDS: &str = "provider_render_seconds";
}

pub fn record_call(provider: &'static str, operation: &'static str, ok: bool) {
    counter!(
        names::CALLS_TOTAL,
        "provider" => provider,
        "operation" => operation,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .increment(1);
}

pub fn record_render(provider: &'static str, ok: bool, secs: f64) {
    histogram!(
        names::RENDER_SECONDS,
        "provider" => provider,
        "outcome" => if ok { "ok" } else { "error" }
    )
    .record(secs);
}
