//! Storage Layer Module
//!
//! - Storage trait definition
//! - SQLite implementation for production
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::MemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use traits::{StateChanges, StateStore, StorageError, StorageResult};
