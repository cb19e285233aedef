//! Dataform workflow settings
//!
//! `workflow_settings.yaml` is preferred; projects that predate it keep the
//! same values in `dataform.json`.

use serde::{Deserialize, Serialize};
use std::path::Path;

pub const WORKFLOW_SETTINGS_FILE: &str = "workflow_settings.yaml";
pub const LEGACY_SETTINGS_FILE: &str = "dataform.json";

/// Project-wide defaults from the workflow settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSettings {
    /// Google Cloud project id
    #[serde(default, alias = "defaultDatabase")]
    pub default_project: String,

    /// BigQuery location
    #[serde(default)]
    pub default_location: String,

    /// Dataset used when a definition does not name a schema
    #[serde(default, alias = "defaultSchema")]
    pub default_dataset: String,

    /// Dataset that receives assertion views
    #[serde(default, alias = "assertionSchema")]
    pub default_assertion_dataset: String,
}

impl WorkflowSettings {
    /// Load settings from `project_root`, preferring the YAML file
    pub fn load(project_root: &Path) -> Result<Self, SettingsError> {
        let yaml_path = project_root.join(WORKFLOW_SETTINGS_FILE);
        if yaml_path.exists() {
            let contents = read(&yaml_path)?;
            return Self::from_yaml(&contents).map_err(|e| SettingsError::Parse(yaml_path.display().to_string(), e));
        }

        let json_path = project_root.join(LEGACY_SETTINGS_FILE);
        if json_path.exists() {
            let contents = read(&json_path)?;
            return Self::from_json(&contents).map_err(|e| SettingsError::Parse(json_path.display().to_string(), e));
        }

        Err(SettingsError::NotFound(project_root.display().to_string()))
    }

    /// Parse `workflow_settings.yaml` contents
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| e.to_string())
    }

    /// Parse legacy `dataform.json` contents
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| e.to_string())
    }
}

fn read(path: &Path) -> Result<String, SettingsError> {
    std::fs::read_to_string(path).map_err(|e| SettingsError::Io(path.display().to_string(), e.to_string()))
}

/// Settings error types
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("workflow_settings.yaml file not found in {0} (no dataform.json either)")]
    NotFound(String),

    #[error("Failed to read {0}: {1}")]
    Io(String, String),

    #[error("Failed to parse {0}: {1}")]
    Parse(String, String),
}
