//! Vidcat Database Layer
//!
//! This crate provides the [`CatalogStore`] abstraction over catalog records and
//! its PostgreSQL implementation. An in-process store is available behind the
//! `memory` feature for tests of store consumers.
//!
// Module declarations
pub mod db;

// Re-exports: store abstraction
pub use db::store::{CatalogStore, MergeOutcome};

// Re-exports: repositories
#[cfg(any(test, feature = "memory"))]
pub use db::memory::InMemoryCatalogStore;
pub use db::video::VideoRepository;

// Re-exports: Transaction utilities
pub use db::transaction::TransactionGuard;
