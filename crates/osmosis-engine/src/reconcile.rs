//! Reconciliation orchestrator
//!
//! Drives one run: discover files, compile the project, build and sort the
//! dependency graph, fetch warehouse columns per dataset, then merge and write
//! each file in topological order.
//!
//! Everything up to and including the fetch is all-or-nothing: a fatal error
//! there leaves every file untouched. From the merge phase on, failures are
//! per file and recorded in the [`RunReport`].

use crate::discovery::{self, DiscoveryError};
use crate::merge::{self, MergeChanges};
use futures::stream::{self, StreamExt};
use osmosis_catalog::{FetchError, WarehouseAdapter, WarehouseTable};
use osmosis_core::{
    Config, Diagnostic, DiagnosticCode, FileOutcome, FileStatus, MissingConfigPolicy, RunReport,
    WorkflowSettings,
};
use osmosis_dataform::{
    CompileError, GraphError, GraphIssue, NodeId, ProjectCompiler, ProjectGraph, TableDescriptor,
};
use osmosis_sqlx::{FragmentError, SqlxDocument};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Pipeline phase, used in logs and fatal errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Discovering,
    Compiling,
    GraphBuilding,
    Sorting,
    FetchingSchemas,
    Merging,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Discovering => "discovering",
            Self::Compiling => "compiling",
            Self::GraphBuilding => "graph-building",
            Self::Sorting => "sorting",
            Self::FetchingSchemas => "fetching-schemas",
            Self::Merging => "merging",
            Self::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Fatal errors; no file has been written when one of these is returned
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("Compile failed: {0}")]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Cycle(#[from] GraphError),

    #[error("Failed to list tables in dataset {dataset}: {source}")]
    Warehouse {
        dataset: String,
        #[source]
        source: FetchError,
    },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl ReconcileError {
    /// Phase the run was in when it failed
    pub fn phase(&self) -> Phase {
        match self {
            Self::Discovery(_) => Phase::Discovering,
            Self::Compile(_) => Phase::Compiling,
            Self::Cycle(_) => Phase::Sorting,
            Self::Warehouse { .. } => Phase::FetchingSchemas,
            Self::Environment(_) => Phase::Discovering,
        }
    }
}

/// Why a definition file could not be loaded
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read {0}: {1}")]
    Read(String, String),

    #[error("No config block found in {0}")]
    MissingBlock(String),

    #[error("Failed to parse config in {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: FragmentError,
    },
}

impl LoadError {
    pub fn code(&self) -> DiagnosticCode {
        match self {
            Self::Read(..) => DiagnosticCode::ReadFailed,
            Self::MissingBlock(_) => DiagnosticCode::ConfigBlockMissing,
            Self::Parse { .. } => DiagnosticCode::ConfigParseError,
        }
    }
}

/// Per-run options, normally taken from [`Config`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    pub missing_config: MissingConfigPolicy,
    pub reorder_columns: bool,
}

impl From<&Config> for ReconcileOptions {
    fn from(config: &Config) -> Self {
        Self {
            missing_config: config.missing_config,
            reorder_columns: config.reorder_columns,
        }
    }
}

/// Warehouse project: `[warehouse] project`, else `defaultProject`
pub fn warehouse_project(config: &Config, settings: &WorkflowSettings) -> Result<String, ReconcileError> {
    let project = config
        .warehouse
        .project
        .clone()
        .unwrap_or_else(|| settings.default_project.clone());

    if project.is_empty() {
        return Err(ReconcileError::Environment(
            "no warehouse project: set defaultProject in workflow_settings.yaml or [warehouse] project in osmosis.toml"
                .to_string(),
        ));
    }
    Ok(project)
}

/// Results of the environment checks behind the `valid` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentCheck {
    pub compiler_version: String,
    pub warehouse: &'static str,
    pub project_id: String,
}

/// Reconciles definition files against upstream tables and the warehouse
pub struct Reconciler {
    config: Config,
    settings: WorkflowSettings,
    options: ReconcileOptions,
    compiler: Arc<dyn ProjectCompiler>,
    warehouse: Arc<dyn WarehouseAdapter>,
}

impl Reconciler {
    pub fn new(
        config: Config,
        settings: WorkflowSettings,
        compiler: Arc<dyn ProjectCompiler>,
        warehouse: Arc<dyn WarehouseAdapter>,
    ) -> Self {
        let options = ReconcileOptions::from(&config);
        Self {
            config,
            settings,
            options,
            compiler,
            warehouse,
        }
    }

    pub fn with_options(mut self, options: ReconcileOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Warehouse project for this run, see [`warehouse_project`]
    pub fn warehouse_project(&self) -> Result<String, ReconcileError> {
        warehouse_project(&self.config, &self.settings)
    }

    /// Check that the compiler runs and the warehouse is reachable
    pub async fn check_environment(&self) -> Result<EnvironmentCheck, ReconcileError> {
        let compiler_version = self.compiler.version().await?;
        tracing::info!(version = %compiler_version, "Dataform CLI working");

        let project_id = self.warehouse.test_connection().await.map_err(|e| {
            ReconcileError::Environment(format!("{} client is not working: {}", self.warehouse.name(), e))
        })?;
        tracing::info!(project = %project_id, warehouse = self.warehouse.name(), "Warehouse client working");

        Ok(EnvironmentCheck {
            compiler_version,
            warehouse: self.warehouse.name(),
            project_id,
        })
    }

    /// Reconcile every definition file under `path`
    pub async fn run(&self, path: &Path) -> Result<RunReport, ReconcileError> {
        let mut report = RunReport::new();
        let project_id = self.warehouse_project()?;

        tracing::info!(phase = %Phase::Discovering, path = %path.display(), "Discovering definition files");
        let files = discovery::discover(&self.config, path)?;
        for file in &files {
            tracing::info!(file = %file, "Refactoring");
        }

        tracing::info!(phase = %Phase::Compiling, "Compiling Dataform project");
        let project = self.compiler.compile().await?;

        tracing::info!(phase = %Phase::GraphBuilding, files = files.len(), "Building dependency graph");
        let build = ProjectGraph::build(&project, &files, |descriptor| self.load(descriptor));
        let mut graph = build.graph;
        self.record_issues(build.issues, &mut report);

        tracing::info!(phase = %Phase::Sorting, nodes = graph.len(), "Sorting definition files");
        let order = graph.topological_sort()?;

        let datasets = graph.datasets(&order);
        tracing::info!(phase = %Phase::FetchingSchemas, datasets = datasets.len(), "Loading warehouse tables");
        let tables = self.fetch_datasets(&project_id, &datasets, &mut report).await?;

        tracing::info!(phase = %Phase::Merging, files = order.len(), "Merging column metadata");
        for id in order {
            let outcome = self.merge_node(&mut graph, id, &tables, &mut report).await;
            report.add_outcome(outcome);
        }

        tracing::info!(
            phase = %Phase::Done,
            updated = report.summary.updated,
            unchanged = report.summary.unchanged,
            skipped = report.summary.skipped,
            failed = report.summary.failed,
            "Reconciliation finished"
        );
        Ok(report)
    }

    /// Read and parse one definition file under the missing-block policy
    fn load(&self, descriptor: &TableDescriptor) -> Result<SqlxDocument, LoadError> {
        let file = &descriptor.file_name;
        let text = std::fs::read_to_string(self.config.resolve(Path::new(file)))
            .map_err(|e| LoadError::Read(file.clone(), e.to_string()))?;

        let document = SqlxDocument::parse(text).map_err(|source| LoadError::Parse {
            file: file.clone(),
            source,
        })?;

        if !document.has_block() {
            if self.options.missing_config == MissingConfigPolicy::Strict {
                return Err(LoadError::MissingBlock(file.clone()));
            }
            tracing::info!(file = %file, "No config block found; using an empty table config");
        }

        Ok(document)
    }

    fn record_issues(&self, issues: Vec<GraphIssue<LoadError>>, report: &mut RunReport) {
        for issue in issues {
            match issue {
                GraphIssue::DescriptorMissing { file } => {
                    report.add_diagnostic(
                        Diagnostic::warn(
                            DiagnosticCode::DescriptorMissing,
                            "File is not part of the compiled project",
                        )
                        .with_file(file.clone()),
                    );
                    report.add_outcome(
                        FileOutcome::new(file, FileStatus::Skipped).with_reason(DiagnosticCode::DescriptorMissing.as_str()),
                    );
                }
                GraphIssue::DependencyUnresolved { file, target } => {
                    report.add_diagnostic(
                        Diagnostic::warn(
                            DiagnosticCode::DependencyUnresolved,
                            format!("Dependency {} matches no table or declaration", target),
                        )
                        .with_file(file),
                    );
                }
                GraphIssue::LoadFailed { file, requested: true, error } => {
                    tracing::error!(file = %file, error = %error, "Failed to load definition file");
                    report.add_diagnostic(Diagnostic::error(error.code(), error.to_string()).with_file(file.clone()));
                    report.add_outcome(FileOutcome::new(file, FileStatus::Failed).with_reason(error.code().as_str()));
                }
                GraphIssue::LoadFailed { file, requested: false, error } => {
                    tracing::warn!(file = %file, error = %error, "Skipping dependency that failed to load");
                    report.add_diagnostic(
                        Diagnostic::warn(DiagnosticCode::DependencyLoadFailed, error.to_string()).with_file(file),
                    );
                }
            }
        }
    }

    /// List every dataset concurrently; results keyed by `(dataset, table)`
    async fn fetch_datasets(
        &self,
        project_id: &str,
        datasets: &[String],
        report: &mut RunReport,
    ) -> Result<HashMap<(String, String), WarehouseTable>, ReconcileError> {
        let limit = self.config.warehouse.max_concurrent_fetches.max(1);
        let timeout = self.config.warehouse.timeout();

        let results: Vec<(String, Result<Vec<WarehouseTable>, FetchError>)> = stream::iter(datasets.iter().cloned())
            .map(|dataset| {
                let warehouse = Arc::clone(&self.warehouse);
                async move {
                    tracing::info!(dataset = %dataset, "Loading warehouse tables");
                    let listing = warehouse.list_tables(project_id, &dataset);
                    let result = match timeout {
                        Some(limit) => tokio::time::timeout(limit, listing)
                            .await
                            .unwrap_or_else(|_| {
                                Err(FetchError::Timeout {
                                    dataset: dataset.clone(),
                                    secs: limit.as_secs(),
                                })
                            }),
                        None => listing.await,
                    };
                    (dataset, result)
                }
            })
            .buffered(limit)
            .collect()
            .await;

        let mut tables = HashMap::new();
        for (dataset, result) in results {
            match result {
                Ok(listed) => {
                    tracing::debug!(dataset = %dataset, tables = listed.len(), "Listed dataset");
                    for table in listed {
                        tables.insert((table.dataset.clone(), table.table.clone()), table);
                    }
                }
                Err(FetchError::DatasetNotFound(name)) => {
                    tracing::warn!(dataset = %dataset, "Dataset not found; its tables will be skipped");
                    report.add_diagnostic(Diagnostic::warn(
                        DiagnosticCode::DatasetNotFound,
                        format!("Dataset {} not found", name),
                    ));
                }
                Err(source) => return Err(ReconcileError::Warehouse { dataset, source }),
            }
        }

        Ok(tables)
    }

    /// Merge and write one requested node
    async fn merge_node(
        &self,
        graph: &mut ProjectGraph<SqlxDocument>,
        id: NodeId,
        tables: &HashMap<(String, String), WarehouseTable>,
        report: &mut RunReport,
    ) -> FileOutcome {
        let node = graph.node(id);
        let file = node.file_name().to_string();

        if !node.payload.has_block() {
            report.add_diagnostic(
                Diagnostic::warn(DiagnosticCode::ConfigBlockMissing, "No config block found; file left unchanged")
                    .with_file(file.clone()),
            );
            return FileOutcome::new(file, FileStatus::Skipped).with_reason(DiagnosticCode::ConfigBlockMissing.as_str());
        }

        let target = node.target();
        let Some(table) = tables.get(&(target.schema.clone(), target.name.clone())) else {
            tracing::warn!(file = %file, target = %target, "No warehouse table found");
            report.add_diagnostic(
                Diagnostic::warn(
                    DiagnosticCode::WarehouseTableMissing,
                    format!("No BigQuery table found for {}", target),
                )
                .with_file(file.clone()),
            );
            return FileOutcome::new(file, FileStatus::Skipped)
                .with_reason(DiagnosticCode::WarehouseTableMissing.as_str());
        };

        let inherited: Vec<_> = node
            .dependencies
            .iter()
            .map(|dep| graph.node(*dep).payload.fragment().columns().clone())
            .collect();

        let document = &mut graph.node_mut(id).payload;
        let columns = document.fragment_mut().columns_mut();

        let mut changes = merge::enrich_from_warehouse(columns, table);
        for dependency in &inherited {
            changes.extend(merge::inherit_from_dependency(columns, dependency));
        }
        let reordered = self.options.reorder_columns && merge::reorder_to_match(columns, table);
        log_changes(&file, &changes, reordered);

        let rendered = match document.render() {
            Ok(Some(text)) => text,
            Ok(None) => return FileOutcome::new(file, FileStatus::Skipped),
            Err(e) => {
                report.add_diagnostic(Diagnostic::error(DiagnosticCode::ConfigParseError, e.to_string()).with_file(file.clone()));
                return FileOutcome::new(file, FileStatus::Failed).with_reason(DiagnosticCode::ConfigParseError.as_str());
            }
        };

        if rendered == document.text() {
            tracing::info!(file = %file, "Already up to date");
            return FileOutcome::new(file, FileStatus::Unchanged);
        }

        let path = self.config.resolve(Path::new(&file));
        let written = tokio::task::spawn_blocking(move || write_atomically(&path, &rendered))
            .await
            .unwrap_or_else(|e| Err(std::io::Error::new(std::io::ErrorKind::Other, e)));
        match written {
            Ok(()) => {
                tracing::info!(file = %file, "Updated definition file");
                FileOutcome::new(file, FileStatus::Updated)
            }
            Err(e) => {
                tracing::error!(file = %file, error = %e, "Failed to write definition file");
                report.add_diagnostic(
                    Diagnostic::error(DiagnosticCode::WriteFailed, format!("Failed to write: {}", e)).with_file(file.clone()),
                );
                FileOutcome::new(file, FileStatus::Failed).with_reason(DiagnosticCode::WriteFailed.as_str())
            }
        }
    }
}

/// Replace `path` with `contents` through a sibling temp file
///
/// The target is either left as it was or fully rewritten.
fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    temp.write_all(contents.as_bytes())?;
    temp.as_file().sync_all()?;
    if let Ok(metadata) = std::fs::metadata(path) {
        temp.as_file().set_permissions(metadata.permissions())?;
    }
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn log_changes(file: &str, changes: &MergeChanges, reordered: bool) {
    tracing::debug!(
        file,
        added = ?changes.added,
        descriptions = ?changes.descriptions,
        policy_tags = ?changes.policy_tags,
        reordered,
        "Merged columns"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names() {
        assert_eq!(Phase::FetchingSchemas.to_string(), "fetching-schemas");
        assert_eq!(Phase::Done.to_string(), "done");
    }

    #[test]
    fn error_phases() {
        let err = ReconcileError::Cycle(GraphError::Cycle { files: vec!["a".to_string()] });
        assert_eq!(err.phase(), Phase::Sorting);

        let err = ReconcileError::Warehouse {
            dataset: "d".to_string(),
            source: FetchError::QueryError("boom".to_string()),
        };
        assert_eq!(err.phase(), Phase::FetchingSchemas);
        assert!(err.to_string().contains("dataset d"));
    }

    #[test]
    fn load_error_codes() {
        assert_eq!(LoadError::MissingBlock("f".into()).code(), DiagnosticCode::ConfigBlockMissing);
        assert_eq!(LoadError::Read("f".into(), "e".into()).code(), DiagnosticCode::ReadFailed);
    }

    #[test]
    fn warehouse_project_prefers_config_override() {
        let mut config = Config::default();
        let settings = WorkflowSettings {
            default_project: "from-settings".to_string(),
            ..WorkflowSettings::default()
        };
        assert_eq!(warehouse_project(&config, &settings).unwrap(), "from-settings");

        config.warehouse.project = Some("override".to_string());
        assert_eq!(warehouse_project(&config, &settings).unwrap(), "override");

        config.warehouse.project = None;
        assert!(matches!(
            warehouse_project(&config, &WorkflowSettings::default()),
            Err(ReconcileError::Environment(_))
        ));
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn atomic_write_replaces_contents() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("t.sqlx");
        std::fs::write(&path, "old contents that are longer").unwrap();

        write_atomically(&path, "new").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        assert_eq!(entries(dir.path()), vec!["t.sqlx"]);
    }

    #[test]
    fn failed_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("t.sqlx");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("keep"), "x").unwrap();

        assert!(write_atomically(&path, "new").is_err());
        assert_eq!(entries(dir.path()), vec!["t.sqlx"]);
        assert_eq!(std::fs::read_to_string(path.join("keep")).unwrap(), "x");
    }

    #[test]
    fn options_follow_config() {
        let mut config = Config::default();
        config.missing_config = MissingConfigPolicy::Strict;
        config.reorder_columns = true;

        let options = ReconcileOptions::from(&config);
        assert_eq!(options.missing_config, MissingConfigPolicy::Strict);
        assert!(options.reorder_columns);
    }
}
