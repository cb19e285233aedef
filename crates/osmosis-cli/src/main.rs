use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use osmosis_catalog::{BigQueryAdapter, WarehouseAdapter};
use osmosis_core::{Config, FileStatus, MissingConfigPolicy, RunReport, Severity, WorkflowSettings};
use osmosis_dataform::{DataformCli, ProjectCompiler};
use osmosis_engine::{warehouse_project, ReconcileOptions, Reconciler};

/// Dataform Osmosis - fill column metadata in Dataform definition files
#[derive(Parser)]
#[command(name = "dataform-osmosis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: osmosis.toml in the project directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Dataform project directory
    #[arg(short = 'C', long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the Dataform CLI and the BigQuery client work
    Valid,

    /// Fill column descriptions and policy tags from BigQuery and upstream tables
    Refactor {
        /// File or directory to reconcile (default: the whole definitions directory)
        path: Option<PathBuf>,

        /// Write a JSON run report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Reorder columns to match the BigQuery table
        #[arg(long)]
        reorder: bool,

        /// Fail files that have no config block
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let project_dir = cli
        .project_dir
        .canonicalize()
        .with_context(|| format!("Project directory {} not found", cli.project_dir.display()))?;

    let mut config = match &cli.config {
        Some(path) => Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()))?,
        None => Config::discover(&project_dir)?,
    };
    config.project_root = project_dir.clone();
    tracing::debug!(config = ?config, "Loaded configuration");

    if cli.verbose {
        eprintln!("{} {}", "Project:".cyan(), project_dir.display());
    }

    let settings = WorkflowSettings::load(&project_dir)?;

    match cli.command {
        Commands::Valid => valid_command(config, settings).await,
        Commands::Refactor {
            path,
            output,
            reorder,
            strict,
        } => {
            let mut options = ReconcileOptions::from(&config);
            options.reorder_columns |= reorder;
            if strict {
                options.missing_config = MissingConfigPolicy::Strict;
            }
            refactor_command(config, settings, path, output.as_deref(), options, cli.verbose).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();
}

/// Valid command - check the compiler and warehouse before touching files
async fn valid_command(config: Config, settings: WorkflowSettings) -> Result<()> {
    let project = warehouse_project(&config, &settings)?;
    let compiler = dataform_compiler(&config)?;
    let warehouse = connect_warehouse(&config, &project).await?;

    let reconciler = Reconciler::new(config, settings, compiler, warehouse);
    let check = reconciler.check_environment().await?;

    println!("{} Dataform CLI {}", "✓".green(), check.compiler_version);
    println!("{} {} client for project {}", "✓".green(), check.warehouse, check.project_id);
    Ok(())
}

/// Refactor command - reconcile definition files and report per-file outcomes
async fn refactor_command(
    config: Config,
    settings: WorkflowSettings,
    path: Option<PathBuf>,
    output: Option<&Path>,
    options: ReconcileOptions,
    verbose: bool,
) -> Result<()> {
    let path = path.unwrap_or_else(|| config.definitions_dir.clone());
    let project = warehouse_project(&config, &settings)?;
    let compiler = dataform_compiler(&config)?;
    let warehouse = connect_warehouse(&config, &project).await?;

    if verbose {
        eprintln!("{} {}", "Reconciling".cyan(), path.display());
    }

    let reconciler = Reconciler::new(config, settings, compiler, warehouse).with_options(options);
    let report = reconciler.run(&path).await.map_err(|e| {
        let phase = e.phase();
        anyhow::Error::new(e).context(format!("Reconciliation failed while {}; no files were changed", phase))
    })?;

    print_summary(&report, verbose);

    if let Some(output) = output {
        report
            .save_to_file(output)
            .with_context(|| format!("Failed to write report to {}", output.display()))?;
        println!("{} {}", "Report written to".cyan(), output.display());
    }

    if report.has_failures() {
        std::process::exit(1);
    }
    Ok(())
}

fn dataform_compiler(config: &Config) -> Result<Arc<dyn ProjectCompiler>> {
    let compiler = DataformCli::new(&config.compiler.command, config.project_root.clone())?
        .with_timeout(config.compiler.timeout());
    Ok(Arc::new(compiler))
}

async fn connect_warehouse(config: &Config, project: &str) -> Result<Arc<dyn WarehouseAdapter>> {
    let adapter = match &config.warehouse.credentials {
        Some(key) => BigQueryAdapter::from_service_account_file(project, config.resolve(key)).await?,
        None => BigQueryAdapter::with_adc(project).await?,
    };
    Ok(Arc::new(adapter.with_timeout(config.warehouse.timeout())))
}

fn print_summary(report: &RunReport, verbose: bool) {
    for outcome in &report.files {
        let label = match outcome.status {
            FileStatus::Updated => "updated".green(),
            FileStatus::Unchanged => "unchanged".normal(),
            FileStatus::Skipped => "skipped".yellow(),
            FileStatus::Failed => "failed".red(),
        };
        if outcome.status == FileStatus::Unchanged && !verbose {
            continue;
        }
        match &outcome.reason {
            Some(reason) => println!("  {:<10} {} ({})", label, outcome.file, reason),
            None => println!("  {:<10} {}", label, outcome.file),
        }
    }

    for diagnostic in &report.diagnostics {
        let marker = match diagnostic.severity {
            Severity::Error => "✗".red(),
            Severity::Warn => "⚠".yellow(),
        };
        match &diagnostic.file {
            Some(file) => eprintln!("{} [{}] {}: {}", marker, diagnostic.code.as_str(), file, diagnostic.message),
            None => eprintln!("{} [{}] {}", marker, diagnostic.code.as_str(), diagnostic.message),
        }
    }

    let summary = &report.summary;
    let line = format!(
        "{} updated, {} unchanged, {} skipped, {} failed",
        summary.updated, summary.unchanged, summary.skipped, summary.failed
    );
    if summary.failed > 0 {
        println!("\n{}", line.red().bold());
    } else {
        println!("\n{}", line.green().bold());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn refactor_defaults() {
        let cli = Cli::try_parse_from(["dataform-osmosis", "refactor"]).unwrap();
        assert_eq!(cli.project_dir, PathBuf::from("."));
        match cli.command {
            Commands::Refactor {
                path,
                output,
                reorder,
                strict,
            } => {
                assert_eq!(path, None);
                assert_eq!(output, None);
                assert!(!reorder);
                assert!(!strict);
            }
            Commands::Valid => panic!("expected refactor"),
        }
    }

    #[test]
    fn refactor_with_flags() {
        let cli = Cli::try_parse_from([
            "dataform-osmosis",
            "-C",
            "/tmp/project",
            "refactor",
            "definitions/staging",
            "--output",
            "report.json",
            "--reorder",
            "--strict",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert_eq!(cli.project_dir, PathBuf::from("/tmp/project"));
        match cli.command {
            Commands::Refactor {
                path,
                output,
                reorder,
                strict,
            } => {
                assert_eq!(path, Some(PathBuf::from("definitions/staging")));
                assert_eq!(output, Some(PathBuf::from("report.json")));
                assert!(reorder);
                assert!(strict);
            }
            Commands::Valid => panic!("expected refactor"),
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        assert!(Cli::try_parse_from(["dataform-osmosis", "deploy"]).is_err());
    }
}
