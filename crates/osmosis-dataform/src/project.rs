//! Compiled Dataform project (`dataform compile --json`)
//!
//! Only the fields reconciliation needs are modelled; everything else in the
//! compiler output is ignored.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Warehouse location of a table
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub schema: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
}

impl Target {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Key used for cross-reference resolution
    pub fn key(&self) -> TargetKey {
        TargetKey {
            schema: self.schema.clone(),
            name: self.name.clone(),
        }
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.database {
            Some(database) => write!(f, "{}.{}.{}", database, self.schema, self.name),
            None => write!(f, "{}.{}", self.schema, self.name),
        }
    }
}

/// `{schema, name}` pair; the database is not part of the lookup
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetKey {
    pub schema: String,
    pub name: String,
}

/// One compiled action (table, declaration, operation or assertion)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescriptor {
    /// Project-relative path of the defining file
    #[serde(default)]
    pub file_name: String,

    pub target: Target,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_target: Option<Target>,

    #[serde(default)]
    pub dependency_targets: Vec<Target>,

    /// Action type as reported by the compiler (`table`, `view`, ...)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub disabled: bool,
}

impl TableDescriptor {
    pub fn new(file_name: impl Into<String>, target: Target) -> Self {
        Self {
            file_name: file_name.into(),
            target,
            canonical_target: None,
            dependency_targets: Vec::new(),
            kind: None,
            disabled: false,
        }
    }

    pub fn with_dependency(mut self, target: Target) -> Self {
        self.dependency_targets.push(target);
        self
    }

    pub fn with_canonical_target(mut self, target: Target) -> Self {
        self.canonical_target = Some(target);
        self
    }

    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Compiler output
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledProject {
    #[serde(default)]
    pub tables: Vec<TableDescriptor>,

    #[serde(default)]
    pub declarations: Vec<TableDescriptor>,

    #[serde(default)]
    pub operations: Vec<TableDescriptor>,

    #[serde(default)]
    pub assertions: Vec<TableDescriptor>,

    #[serde(default)]
    pub project_config: Map<String, Value>,

    #[serde(default)]
    pub graph_errors: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataform_core_version: Option<String>,
}

impl CompiledProject {
    /// Load compiler output from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, ProjectError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ProjectError::IoError(path.display().to_string(), e.to_string()))?;

        Self::from_json(&contents)
    }

    /// Parse compiler output
    pub fn from_json(json: &str) -> Result<Self, ProjectError> {
        serde_json::from_str(json).map_err(|e| ProjectError::ParseError(e.to_string()))
    }

    /// Descriptor for a project-relative file path
    ///
    /// Lookup order: tables, declarations, operations, assertions.
    pub fn descriptor_for_file(&self, file_name: &str) -> Option<&TableDescriptor> {
        self.tables
            .iter()
            .chain(&self.declarations)
            .chain(&self.operations)
            .chain(&self.assertions)
            .find(|d| d.file_name == file_name)
    }

    /// Non-empty entries of `graphErrors`
    pub fn graph_error_entries(&self) -> Vec<(&str, &Value)> {
        self.graph_errors
            .iter()
            .filter(|(_, value)| !is_empty_value(value))
            .map(|(key, value)| (key.as_str(), value))
            .collect()
    }

    /// Fail when the compiler reported any graph error
    pub fn check_graph_errors(&self) -> Result<(), ProjectError> {
        let entries = self.graph_error_entries();
        if entries.is_empty() {
            return Ok(());
        }

        let details = entries
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect::<Vec<_>>()
            .join("; ");
        Err(ProjectError::GraphErrors(details))
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

/// Compiled project errors
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Failed to read compiled project {0}: {1}")]
    IoError(String, String),

    #[error("Failed to parse compiled project JSON: {0}")]
    ParseError(String),

    #[error("Compiler reported graph errors: {0}")]
    GraphErrors(String),
}
