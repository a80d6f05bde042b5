/// State management module
///
/// This module handles all persisted application state, including:
/// - Shared data structures for shots and projects (data.rs)
/// - Slider adjustments and presets (edit.rs)
/// - Durable key-value storage with a quota (storage.rs)
/// - Storage keys and schema upgrades (schema.rs)
/// - The library that keeps everything consistent (library.rs)

pub mod data;
pub mod edit;
pub mod library;
pub mod schema;
pub mod storage;

pub use library::{CommitRequest, Library, LibraryError, SaveOutcome, Saved, WriteReport};
pub use storage::{KeyValueStore, MemoryStore, SqliteStore, StorageError};
