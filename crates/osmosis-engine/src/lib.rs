//! Dataform Osmosis engine - reconciliation logic
//!
//! This crate implements:
//! - Column merge rules (warehouse enrichment, dependency inheritance, reorder)
//! - Definition file discovery
//! - The reconciliation pipeline that ties compiler, graph and warehouse together

pub mod merge;
pub mod discovery;
pub mod reconcile;

pub use merge::{enrich_from_warehouse, inherit_from_dependency, reorder_to_match, MergeChanges};
pub use discovery::{discover, DiscoveryError};
pub use reconcile::{warehouse_project, EnvironmentCheck, LoadError, Phase, ReconcileError, ReconcileOptions, Reconciler};
