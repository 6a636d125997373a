//! statefile - a crash-safe, single-file JSON state store
//!
//! Holds one serde value in memory, persists it to one file, and commits
//! every mutation atomically.

pub mod store;

pub use store::{Store, StoreError, StoreResult};
