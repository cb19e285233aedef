//! Warehouse adapter trait for listing dataset columns

use std::fmt;

/// One column as the warehouse reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseColumn {
    pub name: String,

    /// Column description, if set
    pub description: Option<String>,

    /// Policy tag resource names, if any are attached
    pub policy_tags: Option<Vec<String>>,
}

impl WarehouseColumn {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            policy_tags: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_policy_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy_tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }
}

/// A table and its columns in warehouse order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseTable {
    pub dataset: String,
    pub table: String,
    pub fields: Vec<WarehouseColumn>,
}

impl WarehouseTable {
    pub fn new(dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            dataset: dataset.into(),
            table: table.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_column(mut self, column: WarehouseColumn) -> Self {
        self.fields.push(column);
        self
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }
}

impl fmt::Display for WarehouseTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Errors that can occur when talking to the warehouse
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Dataset not found: {0}")]
    DatasetNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Query failed: {0}")]
    QueryError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timed out after {secs}s listing {dataset}")]
    Timeout { dataset: String, secs: u64 },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Trait for warehouse adapters that can list a dataset's tables and columns
#[async_trait::async_trait]
pub trait WarehouseAdapter: Send + Sync {
    /// Get the adapter name (e.g., "BigQuery")
    fn name(&self) -> &'static str;

    /// Check connectivity and return the project the client is bound to
    async fn test_connection(&self) -> Result<String, FetchError>;

    /// List every table in `project.dataset` with its columns
    ///
    /// A dataset that does not exist is reported as
    /// [`FetchError::DatasetNotFound`].
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<WarehouseTable>, FetchError>;
}
