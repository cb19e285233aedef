//! BigQuery warehouse adapter using INFORMATION_SCHEMA
//!
//! Column names come from `INFORMATION_SCHEMA.COLUMNS`; descriptions and
//! policy tags from `INFORMATION_SCHEMA.COLUMN_FIELD_PATHS`. The caller needs
//! `bigquery.tables.get` and `bigquery.tables.list` on the dataset.
//!
//! ## Authentication
//!
//! 1. Service account key file (`[warehouse] credentials` in osmosis.toml)
//! 2. Application Default Credentials (ADC)
//!
//! ```rust,ignore
//! let adapter = BigQueryAdapter::with_adc("my-project").await?;
//! let tables = adapter.list_tables("my-project", "dataform").await?;
//! ```
//!
//! A query that outlives the synchronous call is polled, and large results
//! are read page by page, until the job is complete with no page token left.
//!
//! Reference: https://cloud.google.com/bigquery/docs/information-schema-column-field-paths

use crate::adapter::{FetchError, WarehouseAdapter, WarehouseColumn, WarehouseTable};
use serde_json::Value;
use std::time::Duration;

#[cfg(feature = "bigquery")]
use gcp_bigquery_client::{
    model::{
        get_query_results_parameters::GetQueryResultsParameters, query_request::QueryRequest, table_row::TableRow,
    },
    Client as BigQueryClient,
};

/// Upper bound for one dataset listing when no timeout is configured
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(300);

/// Pause between polls of an unfinished query job
#[cfg(feature = "bigquery")]
const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[cfg(not(feature = "bigquery"))]
const NOT_COMPILED: &str = "BigQuery support not compiled. Rebuild with: cargo build --features bigquery";

/// BigQuery warehouse adapter
pub struct BigQueryAdapter {
    /// Project that runs the queries
    project_id: String,

    /// Limit for polling and paging one listing
    timeout: Option<Duration>,

    #[cfg(feature = "bigquery")]
    client: BigQueryClient,
}

impl BigQueryAdapter {
    /// Create an adapter using Application Default Credentials
    ///
    /// ADC is read from `GOOGLE_APPLICATION_CREDENTIALS`, the gcloud CLI
    /// default credentials or the GCE/GKE metadata service.
    #[cfg(feature = "bigquery")]
    pub async fn with_adc(project_id: impl Into<String>) -> Result<Self, FetchError> {
        let project_id = project_id.into();

        let client = BigQueryClient::from_application_default_credentials()
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to authenticate with ADC: {}. \
                 Ensure GOOGLE_APPLICATION_CREDENTIALS is set or run 'gcloud auth application-default login'",
                e
            )))?;

        Ok(Self {
            project_id,
            timeout: None,
            client,
        })
    }

    #[cfg(not(feature = "bigquery"))]
    pub async fn with_adc(project_id: impl Into<String>) -> Result<Self, FetchError> {
        let _ = project_id;
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    /// Create an adapter from a service account key file
    #[cfg(feature = "bigquery")]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, FetchError> {
        let project_id = project_id.into();
        let key_path = key_path.as_ref().to_string_lossy().to_string();

        let client = BigQueryClient::from_service_account_key_file(&key_path)
            .await
            .map_err(|e| FetchError::AuthenticationError(format!(
                "Failed to read service account key file '{}': {}",
                key_path, e
            )))?;

        Ok(Self {
            project_id,
            timeout: None,
            client,
        })
    }

    #[cfg(not(feature = "bigquery"))]
    pub async fn from_service_account_file(
        project_id: impl Into<String>,
        _key_path: impl AsRef<std::path::Path>,
    ) -> Result<Self, FetchError> {
        let _ = project_id;
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(DEFAULT_QUERY_TIMEOUT)
    }

    /// Column listing query for one dataset
    pub fn columns_query(project: &str, dataset: &str) -> String {
        format!(
            r#"
            SELECT
                c.table_name,
                c.column_name,
                f.description,
                ARRAY_TO_STRING(f.policy_tags, ',') AS policy_tags
            FROM `{project}.{dataset}.INFORMATION_SCHEMA.COLUMNS` AS c
            JOIN `{project}.{dataset}.INFORMATION_SCHEMA.COLUMN_FIELD_PATHS` AS f
                ON c.table_name = f.table_name AND c.column_name = f.field_path
            ORDER BY c.table_name, c.ordinal_position
            "#,
            project = project,
            dataset = dataset,
        )
    }

    /// Map a client error message onto a [`FetchError`]
    pub fn classify_error(project: &str, dataset: &str, message: String) -> FetchError {
        if message.contains("Not found") {
            FetchError::DatasetNotFound(format!("{}.{}", project, dataset))
        } else if message.contains("Access Denied") || message.contains("Permission") {
            FetchError::PermissionDenied(format!("Cannot access {}.{}: {}", project, dataset, message))
        } else {
            FetchError::QueryError(message)
        }
    }
}

/// One row of the column listing query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRow {
    pub table: String,
    pub column: String,
    pub description: Option<String>,
    pub policy_tags: Option<String>,
}

impl ColumnRow {
    /// Read a result row; cells follow the select list of [`BigQueryAdapter::columns_query`]
    pub fn from_cells(cells: &[Option<Value>]) -> Result<Self, FetchError> {
        let required = |index: usize, name: &str| {
            cell_string(cells, index, name)?
                .ok_or_else(|| FetchError::InvalidResponse(format!("Missing {} in result row", name)))
        };

        Ok(Self {
            table: required(0, "table_name")?,
            column: required(1, "column_name")?,
            description: cell_string(cells, 2, "description")?,
            policy_tags: cell_string(cells, 3, "policy_tags")?,
        })
    }
}

fn cell_string(cells: &[Option<Value>], index: usize, name: &str) -> Result<Option<String>, FetchError> {
    match cells.get(index) {
        None | Some(None) | Some(Some(Value::Null)) => Ok(None),
        Some(Some(Value::String(s))) => Ok(Some(s.clone())),
        Some(Some(other)) => Err(FetchError::InvalidResponse(format!(
            "Expected a string for {}, got {}",
            name, other
        ))),
    }
}

/// What to do after reading one query response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStep {
    /// The job is still running
    Pending,

    /// More rows follow under this page token
    Next(String),

    /// All rows have been read
    Done,
}

impl PageStep {
    pub fn of(job_complete: Option<bool>, page_token: Option<String>) -> Self {
        if job_complete == Some(false) {
            return Self::Pending;
        }
        match page_token.filter(|t| !t.is_empty()) {
            Some(token) => Self::Next(token),
            None => Self::Done,
        }
    }
}

/// Group ordered rows into tables, keeping row order within each table
pub fn group_rows(dataset: &str, rows: Vec<ColumnRow>) -> Vec<WarehouseTable> {
    let mut tables: Vec<WarehouseTable> = Vec::new();

    for row in rows {
        let column = WarehouseColumn {
            name: row.column,
            description: row.description.filter(|d| !d.is_empty()),
            policy_tags: row.policy_tags.as_deref().and_then(split_policy_tags),
        };

        match tables.last_mut() {
            Some(table) if table.table == row.table => table.fields.push(column),
            _ => tables.push(WarehouseTable::new(dataset, row.table).with_column(column)),
        }
    }

    tables
}

/// Split the comma-joined policy tag list; empty means no tags
pub fn split_policy_tags(joined: &str) -> Option<Vec<String>> {
    let tags: Vec<String> = joined
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();

    if tags.is_empty() {
        None
    } else {
        Some(tags)
    }
}

#[async_trait::async_trait]
impl WarehouseAdapter for BigQueryAdapter {
    fn name(&self) -> &'static str {
        "BigQuery"
    }

    #[cfg(feature = "bigquery")]
    async fn test_connection(&self) -> Result<String, FetchError> {
        let request = QueryRequest::new("SELECT 1".to_string());

        self.client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| FetchError::QueryError(format!("Connection test failed: {}", e)))?;

        Ok(self.project_id.clone())
    }

    #[cfg(not(feature = "bigquery"))]
    async fn test_connection(&self) -> Result<String, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }

    #[cfg(feature = "bigquery")]
    async fn list_tables(&self, project: &str, dataset: &str) -> Result<Vec<WarehouseTable>, FetchError> {
        let limit = self.timeout();
        let deadline = tokio::time::Instant::now() + limit;
        let timed_out = || FetchError::Timeout {
            dataset: dataset.to_string(),
            secs: limit.as_secs(),
        };

        let request = QueryRequest::new(Self::columns_query(project, dataset));
        let response = self
            .client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| Self::classify_error(project, dataset, e.to_string()))?;

        let job = response.job_reference;
        let mut rows = Vec::new();
        let mut complete = response.job_complete;
        let mut page_token = response.page_token;
        let mut page_rows = response.rows;
        let mut pages = 1;

        loop {
            if complete != Some(false) {
                collect_rows(&mut rows, page_rows.take())?;
            }

            let next = match PageStep::of(complete, page_token.take()) {
                PageStep::Done => break,
                PageStep::Pending => {
                    tracing::debug!(project, dataset, "Waiting for query job");
                    tokio::time::sleep(POLL_INTERVAL).await;
                    None
                }
                PageStep::Next(token) => Some(token),
            };
            if tokio::time::Instant::now() >= deadline {
                return Err(timed_out());
            }

            let job_id = job
                .as_ref()
                .and_then(|j| j.job_id.clone())
                .ok_or_else(|| FetchError::InvalidResponse("Query response has no job reference".to_string()))?;
            let parameters = GetQueryResultsParameters {
                page_token: next,
                location: job.as_ref().and_then(|j| j.location.clone()),
                ..Default::default()
            };

            let results = tokio::time::timeout_at(
                deadline,
                self.client.job().get_query_results(&self.project_id, &job_id, parameters),
            )
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| Self::classify_error(project, dataset, e.to_string()))?;

            complete = results.job_complete;
            page_token = results.page_token;
            page_rows = results.rows;
            pages += 1;
        }

        tracing::debug!(project, dataset, rows = rows.len(), pages, "Listed BigQuery columns");
        Ok(group_rows(dataset, rows))
    }

    #[cfg(not(feature = "bigquery"))]
    async fn list_tables(&self, _project: &str, _dataset: &str) -> Result<Vec<WarehouseTable>, FetchError> {
        Err(FetchError::ConfigError(NOT_COMPILED.to_string()))
    }
}

#[cfg(feature = "bigquery")]
fn collect_rows(rows: &mut Vec<ColumnRow>, page: Option<Vec<TableRow>>) -> Result<(), FetchError> {
    for row in page.unwrap_or_default() {
        let cells: Vec<Option<Value>> = row.columns.unwrap_or_default().into_iter().map(|c| c.value).collect();
        rows.push(ColumnRow::from_cells(&cells)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(table: &str, column: &str, description: Option<&str>, tags: Option<&str>) -> ColumnRow {
        ColumnRow {
            table: table.to_string(),
            column: column.to_string(),
            description: description.map(str::to_string),
            policy_tags: tags.map(str::to_string),
        }
    }

    #[test]
    fn rows_are_grouped_by_table() {
        let tables = group_rows(
            "dataform",
            vec![
                row("t0", "id", Some("id"), None),
                row("t0", "email", None, Some("projects/p/taxonomies/1/policyTags/2")),
                row("t1", "id", Some(""), Some("")),
                row("t1", "age", Some("age description"), None),
            ],
        );

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].to_string(), "dataform.t0");
        assert_eq!(tables[0].column_names(), ["id", "email"]);
        assert_eq!(
            tables[0].fields[1].policy_tags,
            Some(vec!["projects/p/taxonomies/1/policyTags/2".to_string()])
        );
        assert_eq!(tables[1].fields[0], WarehouseColumn::new("id"));
        assert_eq!(tables[1].fields[1].description.as_deref(), Some("age description"));
    }

    #[test]
    fn rows_are_read_by_position() {
        let cells = vec![
            Some(Value::String("t0".to_string())),
            Some(Value::String("id".to_string())),
            Some(Value::Null),
            None,
        ];
        assert_eq!(ColumnRow::from_cells(&cells).unwrap(), row("t0", "id", None, None));

        let cells = vec![
            Some(Value::String("t0".to_string())),
            Some(Value::String("email".to_string())),
            Some(Value::String("email address".to_string())),
            Some(Value::String("a,b".to_string())),
        ];
        assert_eq!(
            ColumnRow::from_cells(&cells).unwrap(),
            row("t0", "email", Some("email address"), Some("a,b"))
        );
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(matches!(
            ColumnRow::from_cells(&[Some(Value::String("t0".to_string()))]),
            Err(FetchError::InvalidResponse(_))
        ));
        assert!(matches!(
            ColumnRow::from_cells(&[Some(Value::String("t0".to_string())), Some(Value::Bool(true))]),
            Err(FetchError::InvalidResponse(_))
        ));
    }

    #[test]
    fn paging_continues_until_complete_without_token() {
        assert_eq!(PageStep::of(Some(false), None), PageStep::Pending);
        assert_eq!(PageStep::of(Some(false), Some("p2".to_string())), PageStep::Pending);
        assert_eq!(PageStep::of(Some(true), Some("p2".to_string())), PageStep::Next("p2".to_string()));
        assert_eq!(PageStep::of(Some(true), Some(String::new())), PageStep::Done);
        assert_eq!(PageStep::of(Some(true), None), PageStep::Done);
        assert_eq!(PageStep::of(None, None), PageStep::Done);
    }

    #[test]
    fn policy_tag_splitting() {
        assert_eq!(split_policy_tags(""), None);
        assert_eq!(split_policy_tags("a, b"), Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn query_targets_dataset() {
        let query = BigQueryAdapter::columns_query("example-project", "dataform");
        assert!(query.contains("`example-project.dataform.INFORMATION_SCHEMA.COLUMNS`"));
        assert!(query.contains("`example-project.dataform.INFORMATION_SCHEMA.COLUMN_FIELD_PATHS`"));
    }

    #[test]
    fn error_classification() {
        assert!(matches!(
            BigQueryAdapter::classify_error("p", "missing", "Not found: Dataset p:missing".to_string()),
            FetchError::DatasetNotFound(name) if name == "p.missing"
        ));
        assert!(matches!(
            BigQueryAdapter::classify_error("p", "d", "Access Denied: Table".to_string()),
            FetchError::PermissionDenied(_)
        ));
        assert!(matches!(
            BigQueryAdapter::classify_error("p", "d", "syntax".to_string()),
            FetchError::QueryError(_)
        ));
    }

    #[cfg(not(feature = "bigquery"))]
    #[tokio::test]
    async fn constructors_need_the_feature() {
        assert!(matches!(
            BigQueryAdapter::with_adc("p").await,
            Err(FetchError::ConfigError(_))
        ));
    }
}
