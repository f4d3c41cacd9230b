//! Catalog repositories
//!
//! `store` defines the persistence contract the services depend on, `video`
//! implements it on PostgreSQL and `memory` keeps records in process.

pub mod store;
pub mod transaction;
pub mod video;

#[cfg(any(test, feature = "memory"))]
pub mod memory;
