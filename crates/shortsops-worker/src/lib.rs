//! ShortsOps pipeline worker.
//!
//! This crate provides:
//! - Stage handlers for script, voiceover, captions, render, schedule and post
//! - Job executor with per-queue concurrency and rate limits
//! - Orchestrator entry points for generation, scheduling and recovery
//! - Graceful shutdown that also cancels render polling

pub mod captions;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod templates;

pub use config::{PipelineSettings, PollPolicy, WorkerConfig};
pub use context::PipelineContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use handlers::{dispatch, HandlerOutcome};
pub use logging::JobLogger;
pub use orchestrator::Orchestrator;
