//! Persisted pipeline state.
//!
//! Media items, post tasks, social connections and campaigns live behind the
//! [`PipelineStore`] trait with Redis and in-memory backends. Mutations are
//! expressed as [`MediaItemUpdate`] / [`PostTaskUpdate`] values so every
//! backend applies them through the same state machine.

pub mod error;
pub mod memory;
pub mod metrics;
pub mod redis_store;
pub mod store;
pub mod update;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::{RedisStore, StoreConfig};
pub use store::PipelineStore;
pub use update::{MediaItemUpdate, PostTaskUpdate};
