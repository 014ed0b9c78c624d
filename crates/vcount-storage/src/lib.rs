//! Analysis history storage.
//!
//! This crate provides:
//! - The append-only `HistoryStore` trait
//! - An in-memory store for tests and ephemeral deployments
//! - A JSON-lines file store with line-atomic appends

pub mod error;
pub mod file;
pub mod history;
pub mod memory;

pub use error::{StorageError, StorageResult};
pub use file::FileHistoryStore;
pub use history::{clamp_limit, HistoryStore, DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
pub use memory::MemoryHistoryStore;
