//! Object storage for pipeline artifacts.
//!
//! This crate provides:
//! - The [`ObjectStorage`] contract used by handlers and renderers
//! - An S3-compatible client (AWS, MinIO) with presigned downloads
//! - An in-memory store for tests

pub mod client;
pub mod error;
pub mod memory;
pub mod object;

pub use client::{S3Config, S3Storage};
pub use error::{StorageError, StorageResult};
pub use memory::{MemoryStorage, StoredObject};
pub use object::{key_from_url, ObjectStorage, RENDER_URL_TTL};
