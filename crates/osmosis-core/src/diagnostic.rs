//! Diagnostic codes and per-file warnings
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    /// The file has no `config { ... }` block
    ConfigBlockMissing,

    /// The `config` block could not be parsed
    ConfigParseError,

    /// The compiled project has no descriptor for a discovered file
    DescriptorMissing,

    /// The definition file could not be read
    ReadFailed,

    /// A dependency target matches no table or declaration in the project
    DependencyUnresolved,

    /// A dependency's own definition file could not be loaded
    DependencyLoadFailed,

    /// No warehouse table exists for a file's target
    WarehouseTableMissing,

    /// A dataset referenced by the run does not exist in the warehouse
    DatasetNotFound,

    /// The rewritten file could not be saved
    WriteFailed,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigBlockMissing => "CONFIG_BLOCK_MISSING",
            Self::ConfigParseError => "CONFIG_PARSE_ERROR",
            Self::DescriptorMissing => "DESCRIPTOR_MISSING",
            Self::ReadFailed => "READ_FAILED",
            Self::DependencyUnresolved => "DEPENDENCY_UNRESOLVED",
            Self::DependencyLoadFailed => "DEPENDENCY_LOAD_FAILED",
            Self::WarehouseTableMissing => "WAREHOUSE_TABLE_MISSING",
            Self::DatasetNotFound => "DATASET_NOT_FOUND",
            Self::WriteFailed => "WRITE_FAILED",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Warning - reconciliation continued without this contribution
    Warn,

    /// Error - the file was not rewritten
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A diagnostic message attached to a definition file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Definition file the diagnostic belongs to, relative to the project root
    pub file: Option<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            file: None,
        }
    }

    /// Shorthand for a warning
    pub fn warn(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Warn, message)
    }

    /// Shorthand for an error
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self::new(code, Severity::Error, message)
    }

    /// Set the file
    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_code_stability() {
        assert_eq!(DiagnosticCode::ConfigBlockMissing.as_str(), "CONFIG_BLOCK_MISSING");
        assert_eq!(DiagnosticCode::WarehouseTableMissing.as_str(), "WAREHOUSE_TABLE_MISSING");
        assert_eq!(DiagnosticCode::DependencyUnresolved.to_string(), "DEPENDENCY_UNRESOLVED");
    }

    #[test]
    fn codes_serialize_as_their_identifier() {
        let codes = [
            DiagnosticCode::ConfigBlockMissing,
            DiagnosticCode::ConfigParseError,
            DiagnosticCode::DescriptorMissing,
            DiagnosticCode::ReadFailed,
            DiagnosticCode::DependencyUnresolved,
            DiagnosticCode::DependencyLoadFailed,
            DiagnosticCode::WarehouseTableMissing,
            DiagnosticCode::DatasetNotFound,
            DiagnosticCode::WriteFailed,
        ];
        for code in codes {
            assert_eq!(serde_json::to_value(code).unwrap(), serde_json::json!(code.as_str()));
        }
    }

    #[test]
    fn diagnostic_serialization() {
        let diag = Diagnostic::warn(
            DiagnosticCode::WarehouseTableMissing,
            "No BigQuery table found for dataform.users",
        )
        .with_file("definitions/users.sqlx");

        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("WAREHOUSE_TABLE_MISSING"));
        assert!(json.contains("\"warn\""));
        assert!(json.contains("definitions/users.sqlx"));
    }
}
