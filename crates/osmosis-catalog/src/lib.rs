//! Warehouse catalog adapters
//!
//! Lists the tables of a dataset together with column descriptions and
//! policy tags, which reconciliation uses as its live source of metadata.
//!
//! ## Features
//!
//! - `bigquery` - Google BigQuery support
//!
//! ## Example
//!
//! ```rust,ignore
//! use osmosis_catalog::{BigQueryAdapter, WarehouseAdapter};
//!
//! let adapter = BigQueryAdapter::with_adc("my-project").await?;
//! let tables = adapter.list_tables("my-project", "dataform").await?;
//! ```

pub mod adapter;
pub mod bigquery;
pub mod mock;

pub use adapter::{WarehouseAdapter, WarehouseTable, WarehouseColumn, FetchError};
pub use bigquery::BigQueryAdapter;
pub use mock::{MockAdapter, MockAdapterBuilder};
