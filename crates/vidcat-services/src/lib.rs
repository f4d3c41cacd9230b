//! Vidcat Services Layer
//!
//! This crate hosts the catalog's business operations: folding lifecycle events
//! into records ([`LifecycleReconciler`]), removing a record together with
//! every stored object derived from it ([`DeletionOrchestrator`]), and the
//! [`CatalogService`] facade that callers and consumers depend on.

pub mod catalog;
pub mod deletion;
pub mod reconciler;

pub use catalog::CatalogService;
pub use deletion::{
    DeletionOrchestrator, DeletionOutcome, DeletionPlan, DeletionReport, PrefixReport,
    StorageFailure,
};
pub use reconciler::LifecycleReconciler;
pub use vidcat_db::{CatalogStore, MergeOutcome};
pub use vidcat_storage::StorageGateway;
