//! Configuration schema (osmosis.toml)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the project root when no `--config` is given
pub const CONFIG_FILE_NAME: &str = "osmosis.toml";

/// What to do with a definition file that has no `config { ... }` block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingConfigPolicy {
    /// Treat the file as `{ type: "table", columns: {} }` and log it
    Lenient,

    /// Fail that file's processing
    Strict,
}

impl Default for MissingConfigPolicy {
    fn default() -> Self {
        Self::Lenient
    }
}

/// External compiler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Executable invoked as `<command> compile --json`
    #[serde(default = "default_compiler_command")]
    pub command: String,

    /// Abort compilation after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_compiler_command() -> String {
    "dataform".to_string()
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            command: default_compiler_command(),
            timeout_secs: None,
        }
    }
}

impl CompilerConfig {
    /// Compile timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Warehouse connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Overrides `defaultProject` from the workflow settings
    #[serde(default)]
    pub project: Option<String>,

    /// Service account key file; Application Default Credentials when absent
    #[serde(default)]
    pub credentials: Option<PathBuf>,

    /// Abort a single dataset listing after this many seconds
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Upper bound on dataset listings in flight at once
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

fn default_max_concurrent_fetches() -> usize {
    8
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project: None,
            credentials: None,
            timeout_secs: None,
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl WarehouseConfig {
    /// Per-dataset fetch timeout, if configured
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the definition files, relative to the project root
    #[serde(default = "default_definitions_dir")]
    pub definitions_dir: PathBuf,

    /// Definition file extension (without the dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Behaviour for files without a config block
    #[serde(default)]
    pub missing_config: MissingConfigPolicy,

    /// Reorder columns to match the warehouse table after merging
    #[serde(default)]
    pub reorder_columns: bool,

    /// External compiler settings
    #[serde(default)]
    pub compiler: CompilerConfig,

    /// Warehouse settings
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

fn default_definitions_dir() -> PathBuf {
    PathBuf::from("definitions")
}

fn default_extension() -> String {
    "sqlx".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            definitions_dir: default_definitions_dir(),
            extension: default_extension(),
            missing_config: MissingConfigPolicy::default(),
            reorder_columns: false,
            compiler: CompilerConfig::default(),
            warehouse: WarehouseConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load `osmosis.toml` from the project root, or fall back to defaults
    pub fn discover(project_root: &Path) -> Result<Self, ConfigError> {
        let path = project_root.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            Self::default()
        };
        config.project_root = project_root.to_path_buf();
        Ok(config)
    }

    /// Resolve a project-relative path against the project root
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.project_root.join(relative)
        }
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.definitions_dir, PathBuf::from("definitions"));
        assert_eq!(config.extension, "sqlx");
        assert_eq!(config.missing_config, MissingConfigPolicy::Lenient);
        assert_eq!(config.compiler.command, "dataform");
        assert_eq!(config.warehouse.max_concurrent_fetches, 8);
        assert!(!config.reorder_columns);
    }

    #[test]
    fn parse_partial_toml() {
        let config = Config::from_toml(
            r#"
            missing_config = "strict"
            reorder_columns = true

            [warehouse]
            project = "analytics-prod"
            timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.missing_config, MissingConfigPolicy::Strict);
        assert!(config.reorder_columns);
        assert_eq!(config.warehouse.project.as_deref(), Some("analytics-prod"));
        assert_eq!(config.warehouse.timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.warehouse.max_concurrent_fetches, 8);
        assert_eq!(config.compiler.timeout(), None);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = Config::from_toml(r#"missing_config = "sometimes""#).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn discover_without_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.project_root, dir.path());
        assert_eq!(config.resolve(Path::new("definitions/a.sqlx")), dir.path().join("definitions/a.sqlx"));
    }

    #[test]
    fn discover_reads_project_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "extension = \"sql\"\n").unwrap();
        let config = Config::discover(dir.path()).unwrap();
        assert_eq!(config.extension, "sql");
    }
}
