//! Worker configuration.

use std::net::SocketAddr;
use std::time::Duration;

use shortsops_queue::WorkerLimits;

/// Bounded status polling of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_attempts: 60,
        }
    }
}

impl PollPolicy {
    /// Longest a handler can spend polling.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// Settings the stage handlers read.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Voice requested for every voiceover
    pub tts_voice: String,
    /// Renderer selector put on render jobs
    pub render_provider: String,
    pub render_poll: PollPolicy,
    /// How long a POSTING attempt holds its task before another delivery
    /// may take it over
    pub post_lease: Duration,
    /// Storage URL of the watermark put on every render job
    pub watermark: Option<String>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            tts_voice: "default".to_string(),
            render_provider: "ffmpeg".to_string(),
            render_poll: PollPolicy::default(),
            post_lease: Duration::from_secs(300),
            watermark: None,
        }
    }
}

impl PipelineSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            tts_voice: std::env::var("TTS_VOICE").unwrap_or(defaults.tts_voice),
            render_provider: std::env::var("RENDER_PROVIDER")
                .map(|p| p.to_lowercase())
                .unwrap_or(defaults.render_provider),
            render_poll: PollPolicy {
                interval: Duration::from_secs(
                    std::env::var("RENDER_POLL_INTERVAL_SECS")
                        .ok()
                        .and_then(|s| s.parse().ok())
                        .unwrap_or(5),
                ),
                max_attempts: std::env::var("RENDER_POLL_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            },
            post_lease: Duration::from_secs(
                std::env::var("POST_LEASE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            watermark: std::env::var("RENDER_WATERMARK_URL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Per-queue concurrency and rate limits
    pub limits: WorkerLimits,
    pub pipeline: PipelineSettings,
    /// Work directory for render temp files
    pub work_dir: String,
    /// Kill FFmpeg after this long
    pub ffmpeg_timeout: Duration,
    /// Register the sora renderer as enabled
    pub enable_sora: bool,
    /// Sleep between empty reserve calls
    pub idle_poll: Duration,
    /// How often each pool scans for stalled jobs
    pub claim_interval: Duration,
    /// Minimum reservation age before a job counts as stalled
    pub claim_min_idle: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Prometheus listener
    pub metrics_addr: Option<SocketAddr>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            limits: WorkerLimits::default(),
            pipeline: PipelineSettings::default(),
            work_dir: "/tmp/shortsops".to_string(),
            ffmpeg_timeout: Duration::from_secs(600),
            enable_sora: false,
            idle_poll: Duration::from_millis(250),
            claim_interval: Duration::from_secs(30),
            // longer than the render poll budget and the post lease so a live
            // job is not stolen
            claim_min_idle: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(30),
            metrics_addr: None,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            limits: WorkerLimits::from_env(),
            pipeline: PipelineSettings::from_env(),
            work_dir: std::env::var("WORKER_WORK_DIR").unwrap_or(defaults.work_dir),
            ffmpeg_timeout: Duration::from_secs(
                std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            enable_sora: std::env::var("ENABLE_SORA")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            idle_poll: Duration::from_millis(
                std::env::var("WORKER_IDLE_POLL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(250),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            metrics_addr: std::env::var("METRICS_ADDR")
                .ok()
                .and_then(|s| s.parse().ok()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.limits.concurrency, 5);
        assert_eq!(config.limits.rate_limit_max, 10);
        assert_eq!(config.pipeline.render_provider, "ffmpeg");
        assert_eq!(config.pipeline.tts_voice, "default");
        assert_eq!(config.pipeline.render_poll.budget(), Duration::from_secs(300));
        assert!(config.claim_min_idle > config.pipeline.render_poll.budget());
        assert!(config.claim_min_idle > config.pipeline.post_lease);
    }
}
