//! Dataform Osmosis Core
//!
//! Shared domain types: diagnostics, tool configuration, workflow settings
//! and the per-run report.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod config;
pub mod settings;
pub mod report;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity};
pub use config::{Config, ConfigError, CompilerConfig, WarehouseConfig, MissingConfigPolicy};
pub use settings::{WorkflowSettings, SettingsError};
pub use report::{RunReport, ReportVersion, RunSummary, FileOutcome, FileStatus};
