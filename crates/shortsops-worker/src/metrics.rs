//! Worker metrics.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Metric name constants for consistency.
pub mod names {
    pub const JOBS_STARTED_TOTAL: &str = "shortsops_jobs_started_total";
    pub const JOBS_FINISHED_TOTAL: &str = "shortsops_jobs_finished_total";
    pub const JOB_DURATION_SECONDS: &str = "shortsops_job_duration_seconds";
    pub const JOBS_SKIPPED_TOTAL: &str = "shortsops_jobs_skipped_total";
    pub const JOBS_IN_FLIGHT: &str = "shortsops_jobs_in_flight";
    pub const JOBS_RECLAIMED_TOTAL: &str = "shortsops_jobs_reclaimed_total";
    pub const RENDER_POLLS_TOTAL: &str = "shortsops_render_polls_total";
    pub const POSTS_TOTAL: &str = "shortsops_posts_total";
}

/// Serve Prometheus metrics on `addr`.
pub fn install_exporter(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

pub fn record_job_started(queue: &'static str) {
    counter!(names::JOBS_STARTED_TOTAL, "queue" => queue).increment(1);
}

/// `outcome` is one of `completed`, `retrying`, `dead_lettered`, `skipped`.
pub fn record_job_finished(queue: &'static str, outcome: &'static str, duration_secs: f64) {
    counter!(names::JOBS_FINISHED_TOTAL, "queue" => queue, "outcome" => outcome).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, "queue" => queue).record(duration_secs);
}

pub fn record_job_skipped(queue: &'static str) {
    counter!(names::JOBS_SKIPPED_TOTAL, "queue" => queue).increment(1);
}

pub fn set_jobs_in_flight(queue: &'static str, count: usize) {
    gauge!(names::JOBS_IN_FLIGHT, "queue" => queue).set(count as f64);
}

pub fn record_reclaimed(queue: &'static str, count: usize) {
    counter!(names::JOBS_RECLAIMED_TOTAL, "queue" => queue).increment(count as u64);
}

pub fn record_render_poll(provider: &str, state: &'static str) {
    counter!(
        names::RENDER_POLLS_TOTAL,
        "provider" => provider.to_string(),
        "state" => state
    )
    .increment(1);
}

pub fn record_post(platform: &'static str, ok: bool) {
    counter!(
        names::POSTS_TOTAL,
        "platform" => platform,
        "outcome" => if ok { "posted" } else { "failed" }
    )
    .increment(1);
}
