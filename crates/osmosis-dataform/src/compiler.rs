//! Project compiler collaborator

use crate::project::{CompiledProject, ProjectError};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

/// Errors from invoking the project compiler
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("Failed to launch `{command}`: {message}")]
    Launch { command: String, message: String },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("`{command}` reported errors: {stderr}")]
    Stderr { command: String, stderr: String },

    #[error("`{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Compiler command is empty")]
    EmptyCommand,

    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Turns a project directory into a [`CompiledProject`]
#[async_trait::async_trait]
pub trait ProjectCompiler: Send + Sync {
    /// Compiler version, used for environment checks
    async fn version(&self) -> Result<String, CompileError>;

    /// Compile the project once
    ///
    /// Implementations must reject output whose `graphErrors` hold any
    /// non-empty entry.
    async fn compile(&self) -> Result<CompiledProject, CompileError>;
}

/// Runs the Dataform CLI in the project root
#[derive(Debug, Clone)]
pub struct DataformCli {
    program: String,
    args: Vec<String>,
    project_root: PathBuf,
    timeout: Option<Duration>,
}

impl DataformCli {
    /// `command` may carry leading arguments (e.g. `npx dataform`)
    pub fn new(command: &str, project_root: impl Into<PathBuf>) -> Result<Self, CompileError> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(CompileError::EmptyCommand)?;

        Ok(Self {
            program,
            args: parts.collect(),
            project_root: project_root.into(),
            timeout: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    fn display(&self, extra: &[&str]) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .chain(extra.iter().copied())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run with extra arguments and return stdout
    async fn run(&self, extra: &[&str]) -> Result<String, CompileError> {
        let shown = self.display(extra);
        tracing::debug!(command = %shown, root = %self.project_root.display(), "Running compiler");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .args(extra)
            .current_dir(&self.project_root)
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, command.output())
                .await
                .map_err(|_| CompileError::Timeout {
                    command: shown.clone(),
                    secs: limit.as_secs(),
                })?,
            None => command.output().await,
        }
        .map_err(|e| CompileError::Launch {
            command: shown.clone(),
            message: e.to_string(),
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        if !output.status.success() {
            return Err(CompileError::Failed {
                command: shown,
                status: output.status.to_string(),
                stderr,
            });
        }

        if !stderr.is_empty() {
            return Err(CompileError::Stderr { command: shown, stderr });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait::async_trait]
impl ProjectCompiler for DataformCli {
    async fn version(&self) -> Result<String, CompileError> {
        Ok(self.run(&["--version"]).await?.trim().to_string())
    }

    async fn compile(&self) -> Result<CompiledProject, CompileError> {
        let stdout = self.run(&["compile", "--json"]).await?;
        let project = CompiledProject::from_json(&stdout)?;
        project.check_graph_errors()?;

        tracing::info!(
            tables = project.tables.len(),
            declarations = project.declarations.len(),
            operations = project.operations.len(),
            assertions = project.assertions.len(),
            "Compiled project"
        );
        Ok(project)
    }
}

/// Compiler returning a fixed project
#[derive(Debug, Clone)]
pub struct StaticCompiler {
    project: CompiledProject,
    version: String,
}

impl StaticCompiler {
    pub fn new(project: CompiledProject) -> Self {
        Self {
            project,
            version: "static".to_string(),
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

#[async_trait::async_trait]
impl ProjectCompiler for StaticCompiler {
    async fn version(&self) -> Result<String, CompileError> {
        Ok(self.version.clone())
    }

    async fn compile(&self) -> Result<CompiledProject, CompileError> {
        self.project.check_graph_errors()?;
        Ok(self.project.clone())
    }
}
