//! Mock warehouse adapter for testing
//!
//! Returns predefined tables per dataset without connecting to any warehouse.
//! Datasets that were never registered are reported as not found.
//!
//! ```rust,ignore
//! use osmosis_catalog::{MockAdapterBuilder, WarehouseTable, WarehouseColumn};
//!
//! let adapter = MockAdapterBuilder::new()
//!     .with_table(WarehouseTable::new("dataform", "t1")
//!         .with_column(WarehouseColumn::new("age").with_description("age description")))
//!     .with_latency(50)
//!     .build();
//!
//! let tables = adapter.list_tables("example-project", "dataform").await?;
//! assert_eq!(adapter.list_calls("dataform").await, 1);
//! ```

use crate::adapter::{FetchError, WarehouseAdapter, WarehouseTable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mock warehouse adapter for testing
///
/// Clones share state, so a clone handed to the code under test can be
/// inspected afterwards.
#[derive(Clone)]
pub struct MockAdapter {
    /// Tables by dataset, in insertion order
    datasets: Arc<RwLock<HashMap<String, Vec<WarehouseTable>>>>,

    /// Errors to return for specific datasets
    errors: Arc<RwLock<HashMap<String, FetchError>>>,

    /// `list_tables` calls per dataset
    calls: Arc<RwLock<HashMap<String, usize>>>,

    total_calls: Arc<AtomicUsize>,

    /// Project reported by `test_connection`
    project_id: String,

    fail_connection: bool,

    /// Simulated latency per call (milliseconds)
    latency_ms: u64,
}

impl MockAdapter {
    pub fn new() -> Self {
        MockAdapterBuilder::new().build()
    }

    /// Register a table under its dataset
    pub async fn add_table(&self, table: WarehouseTable) {
        self.datasets
            .write()
            .await
            .entry(table.dataset.clone())
            .or_default()
            .push(table);
    }

    /// Register a dataset with no tables
    pub async fn add_empty_dataset(&self, dataset: &str) {
        self.datasets.write().await.entry(dataset.to_string()).or_default();
    }

    /// Configure an error to be returned for a dataset
    pub async fn add_error_for_dataset(&self, dataset: &str, error: FetchError) {
        self.errors.write().await.insert(dataset.to_string(), error);
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Number of `list_tables` calls made for `dataset`
    pub async fn list_calls(&self, dataset: &str) -> usize {
        self.calls.read().await.get(dataset).copied().unwrap_or(0)
    }

    /// Number of `list_tables` calls across all datasets
    pub fn total_list_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    pub async fn table_count(&self) -> usize {
        self.datasets.read().await.values().map(Vec::len).sum()
    }

    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "Mock"
    }

    async fn test_connection(&self) -> Result<String, FetchError> {
        self.simulate_latency().await;

        if self.fail_connection {
            Err(FetchError::NetworkError("Simulated connection failure".to_string()))
        } else {
            Ok(self.project_id.clone())
        }
    }

    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<WarehouseTable>, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.write().await.entry(dataset.to_string()).or_insert(0) += 1;

        self.simulate_latency().await;

        if let Some(error) = self.errors.read().await.get(dataset) {
            return Err(error.clone());
        }

        self.datasets
            .read()
            .await
            .get(dataset)
            .cloned()
            .ok_or_else(|| FetchError::DatasetNotFound(format!("{}.{}", project, dataset)))
    }
}

/// Builder for a [`MockAdapter`] with predefined tables
pub struct MockAdapterBuilder {
    datasets: HashMap<String, Vec<WarehouseTable>>,
    errors: HashMap<String, FetchError>,
    project_id: String,
    fail_connection: bool,
    latency_ms: u64,
}

impl MockAdapterBuilder {
    pub fn new() -> Self {
        Self {
            datasets: HashMap::new(),
            errors: HashMap::new(),
            project_id: "mock-project".to_string(),
            fail_connection: false,
            latency_ms: 0,
        }
    }

    pub fn with_table(mut self, table: WarehouseTable) -> Self {
        self.datasets.entry(table.dataset.clone()).or_default().push(table);
        self
    }

    pub fn with_empty_dataset(mut self, dataset: &str) -> Self {
        self.datasets.entry(dataset.to_string()).or_default();
        self
    }

    pub fn with_error(mut self, dataset: &str, error: FetchError) -> Self {
        self.errors.insert(dataset.to_string(), error);
        self
    }

    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = project_id.into();
        self
    }

    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn build(self) -> MockAdapter {
        MockAdapter {
            datasets: Arc::new(RwLock::new(self.datasets)),
            errors: Arc::new(RwLock::new(self.errors)),
            calls: Arc::new(RwLock::new(HashMap::new())),
            total_calls: Arc::new(AtomicUsize::new(0)),
            project_id: self.project_id,
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
        }
    }
}

impl Default for MockAdapterBuilder {
    fn default() -> Self {
        Self::new()
    }
}
