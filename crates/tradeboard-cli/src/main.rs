use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tradeboard_core::{Config, Dataset, Severity, ValidationReport};
use tradeboard_service::{Catalog, DatasetOutcome, DatasetService};
use tradeboard_validate::{RawInput, Validator};

mod export;

use export::ExportFormat;

const DEFAULT_CONFIG: &str = "tradeboard.toml";

/// Tradeboard - validate, transform and export trade dashboard datasets
#[derive(Parser)]
#[command(name = "tradeboard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: $TRADEBOARD_CONFIG, then tradeboard.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an upload against a dataset kind's contract
    Check {
        /// CSV file to validate
        file: PathBuf,

        /// Dataset kind (market, competitor, supplier, ...)
        #[arg(short, long)]
        kind: String,

        /// Output file for the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate, transform and export an upload
    Process {
        /// CSV file to process
        file: PathBuf,

        /// Dataset kind (market, competitor, supplier, ...)
        #[arg(short, long)]
        kind: String,

        /// Output file for the processed dataset
        #[arg(short, long, default_value = "processed.csv")]
        output: PathBuf,

        /// Output format (inferred from the output extension if omitted)
        #[arg(short, long, value_enum)]
        format: Option<ExportFormat>,
    },

    /// Process every CSV file under a directory
    Batch {
        /// Directory to walk
        dir: PathBuf,

        /// Dataset kind (market, competitor, supplier, ...)
        #[arg(short, long)]
        kind: String,

        /// Directory for processed files (nothing is written if omitted)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },

    /// List the known dataset kinds with their contracts and pipelines
    Contracts,

    /// Write a config file with the default settings
    InitConfig {
        /// Where to write the config
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Check { file, kind, output } => {
            check_command(&config, &file, &kind, output.as_deref(), cli.verbose)
        }
        Commands::Process {
            file,
            kind,
            output,
            format,
        } => {
            let format = format.unwrap_or_else(|| ExportFormat::from_path(&output));
            process_command(&config, &file, &kind, &output, format, cli.verbose).await
        }
        Commands::Batch {
            dir,
            kind,
            output_dir,
        } => batch_command(&config, &dir, &kind, output_dir.as_deref(), cli.verbose).await,
        Commands::Contracts => contracts_command(&config),
        Commands::InitConfig { output, force } => init_config_command(&output, force),
    }
}

/// Resolve the config file: `--config`, then `TRADEBOARD_CONFIG`, then ./tradeboard.toml
fn load_config(explicit: Option<&Path>, verbose: bool) -> Result<Config> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("TRADEBOARD_CONFIG").map(PathBuf::from))
        .or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG);
            default.exists().then_some(default)
        });

    match path {
        Some(path) => {
            if verbose {
                eprintln!("{} {}", "Loading config from:".cyan(), path.display());
            }
            Config::from_file(&path).with_context(|| format!("Failed to load {}", path.display()))
        }
        None => {
            if verbose {
                eprintln!("{}", "No config file found, using defaults".yellow());
            }
            Ok(Config::default())
        }
    }
}

fn read_input(file: &Path, kind: &str) -> Result<RawInput> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    Ok(RawInput::from_bytes(bytes, kind))
}

/// Check command - validation only, no transform or cache
fn check_command(
    config: &Config,
    file: &Path,
    kind: &str,
    output: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let catalog = Catalog::from_config(config)?;
    let entry = catalog
        .resolve(kind)
        .ok_or_else(|| unknown_kind(kind, &catalog))?;

    if verbose {
        eprintln!("{} {} as '{}'", "Validating".cyan(), file.display(), kind);
    }

    let input = read_input(file, kind)?;
    let report = Validator::new()
        .with_severity(config.severity.clone())
        .validate(&input, &entry.contract)?;

    if let Some(output) = output {
        report.save_to_file(output)?;
        if verbose {
            eprintln!("{} {}", "Report saved to:".green(), output.display());
        }
    }

    print_report_summary(&report, file);

    if report.has_errors() {
        std::process::exit(1);
    }

    Ok(())
}

/// Process command - full service path, then export
async fn process_command(
    config: &Config,
    file: &Path,
    kind: &str,
    output: &Path,
    format: ExportFormat,
    verbose: bool,
) -> Result<()> {
    let service = DatasetService::from_config(config)?;
    let input = read_input(file, kind)?;

    if verbose {
        eprintln!("{} {} as '{}'", "Processing".cyan(), file.display(), kind);
    }

    match service.get_dataset(&input, kind).await? {
        DatasetOutcome::Ready(dataset) => {
            export::export(&dataset, output, format)?;
            println!(
                "{} {} rows x {} columns written to {}",
                "✓".green().bold(),
                dataset.row_count(),
                dataset.column_count(),
                output.display()
            );
            Ok(())
        }
        DatasetOutcome::Invalid(report) => {
            print_report_summary(&report, file);
            std::process::exit(1);
        }
    }
}

/// Batch command - every CSV under `dir` through one service and cache
async fn batch_command(
    config: &Config,
    dir: &Path,
    kind: &str,
    output_dir: Option<&Path>,
    verbose: bool,
) -> Result<()> {
    let service = DatasetService::from_config(config)?;

    if let Some(output_dir) = output_dir {
        if lies_within(output_dir, dir)? {
            return Err(anyhow::anyhow!(
                "Output directory {} must not be inside the input directory {}",
                output_dir.display(),
                dir.display()
            ));
        }
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
    }

    let files = csv_files(dir);
    if verbose {
        eprintln!("{} {} files under {}", "Found".cyan(), files.len(), dir.display());
    }

    let summary = run_batch(&service, dir, &files, kind, output_dir).await;

    let stats = service.cache_stats();
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Batch Summary".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();
    println!("Files:     {}", summary.files);
    println!("Succeeded: {}", summary.succeeded().to_string().green());
    if summary.failed > 0 {
        println!("Failed:    {}", summary.failed.to_string().red().bold());
    } else {
        println!("Failed:    {}", summary.failed.to_string().green());
    }
    println!(
        "Cache:     {} hits, {} misses, {} entries",
        stats.hits, stats.misses, stats.entries
    );
    println!();
    println!("{}", "=".repeat(60).bright_blue());

    if summary.failed > 0 {
        std::process::exit(1);
    }

    Ok(())
}

#[derive(Debug, Default, PartialEq, Eq)]
struct BatchSummary {
    files: usize,
    failed: usize,
}

impl BatchSummary {
    fn succeeded(&self) -> usize {
        self.files - self.failed
    }
}

/// Process `files` one by one; a file that cannot be read, validated,
/// transformed or written counts as failed and the batch moves on
///
/// Outputs mirror each file's path relative to `dir`, so equally named files
/// in different subdirectories never overwrite each other.
async fn run_batch(
    service: &DatasetService,
    dir: &Path,
    files: &[PathBuf],
    kind: &str,
    output_dir: Option<&Path>,
) -> BatchSummary {
    let mut summary = BatchSummary {
        files: files.len(),
        failed: 0,
    };

    for file in files {
        tracing::debug!(file = %file.display(), kind, "processing");

        let input = match read_input(file, kind) {
            Ok(input) => input,
            Err(e) => {
                summary.failed += 1;
                println!("  {} {}: {:#}", "✗".red(), file.display(), e);
                continue;
            }
        };

        match service.get_dataset(&input, kind).await {
            Ok(DatasetOutcome::Ready(dataset)) => {
                if let Some(output_dir) = output_dir {
                    let relative = file.strip_prefix(dir).unwrap_or(file);
                    let target = output_dir.join(relative);
                    if let Err(e) = write_output(&dataset, &target) {
                        summary.failed += 1;
                        println!("  {} {}: {:#}", "✗".red(), file.display(), e);
                        continue;
                    }
                }
                println!("  {} {} ({} rows)", "✓".green(), file.display(), dataset.row_count());
            }
            Ok(DatasetOutcome::Invalid(report)) => {
                summary.failed += 1;
                println!(
                    "  {} {} ({} errors)",
                    "✗".red(),
                    file.display(),
                    report.summary.errors.to_string().red()
                );
                for issue in report.errors() {
                    println!("      [{}] {}", issue.code, issue.message);
                }
            }
            Err(e) => {
                summary.failed += 1;
                println!("  {} {}: {}", "✗".red(), file.display(), e);
            }
        }
    }

    summary
}

fn write_output(dataset: &Dataset, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    export::export(dataset, target, ExportFormat::Csv)
}

/// Whether `path` is `dir` or lies below it, once symlinks and relative
/// components are resolved; `path` itself need not exist yet
fn lies_within(path: &Path, dir: &Path) -> Result<bool> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("Failed to resolve {}", dir.display()))?;

    let mut existing = std::env::current_dir()?.join(path);
    let mut missing = Vec::new();
    loop {
        if let Ok(resolved) = existing.canonicalize() {
            let resolved = missing.iter().rev().fold(resolved, |p, part| p.join(part));
            return Ok(resolved.starts_with(&dir));
        }
        match (existing.file_name(), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name.to_os_string());
                existing = parent.to_path_buf();
            }
            _ => return Ok(false),
        }
    }
}

/// CSV files under `dir`, in path order
fn csv_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
        })
        .collect();
    files.sort();
    files
}

/// Contracts command - list dataset kinds
fn contracts_command(config: &Config) -> Result<()> {
    let catalog = Catalog::from_config(config)?;

    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Dataset Kinds".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());

    for (name, entry) in catalog.entries() {
        println!();
        println!(
            "{} (contract v{}, {})",
            name.green().bold(),
            entry.contract.version(),
            &entry.contract.fingerprint()[..12.min(entry.contract.fingerprint().len())]
        );

        for column in entry.contract.columns() {
            let mut flags = Vec::new();
            if !column.required {
                flags.push("optional");
            }
            if !column.nullable {
                flags.push("not null");
            }
            let flags = if flags.is_empty() {
                String::new()
            } else {
                format!(" ({})", flags.join(", "))
            };
            println!("    {:<20} {}{}", column.name, column.column_type, flags);
        }

        if entry.pipeline.is_empty() {
            println!("  {} none", "Pipeline:".bold());
        } else {
            println!("  {} {}", "Pipeline:".bold(), entry.pipeline.step_names().join(" -> "));
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
    Ok(())
}

/// Init config command - write the defaults so they can be edited
fn init_config_command(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "{} already exists. Use --force to overwrite it.",
            output.display()
        ));
    }

    Config::default().save_to_file(output)?;
    println!("{} {}", "Config written to:".green(), output.display());
    Ok(())
}

fn unknown_kind(kind: &str, catalog: &Catalog) -> anyhow::Error {
    anyhow::anyhow!(
        "Unknown dataset kind '{}'. Known kinds: {}",
        kind,
        catalog.names().collect::<Vec<_>>().join(", ")
    )
}

/// Print report summary to stdout
fn print_report_summary(report: &ValidationReport, file: &Path) {
    println!("\n{}", "=".repeat(60).bright_blue());
    println!("{}", "Validation Report".bold().bright_blue());
    println!("{}", "=".repeat(60).bright_blue());
    println!();

    println!("File: {}", file.display());
    println!("Contract: {}", report.contract);
    println!("Version: {}", report.version);
    println!("Rows checked: {}", report.summary.rows_checked);
    println!();

    println!("{}", "Summary:".bold());
    println!("  Total issues: {}", report.summary.total);

    if report.summary.errors > 0 {
        println!("  Errors:   {}", format!("{}", report.summary.errors).red().bold());
    } else {
        println!("  Errors:   {}", format!("{}", report.summary.errors).green());
    }

    if report.summary.warnings > 0 {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).yellow());
    } else {
        println!("  Warnings: {}", format!("{}", report.summary.warnings).green());
    }

    println!("  Info:     {}", report.summary.info);
    println!();

    if report.issues.is_empty() {
        println!("{}", "✓ No issues found!".green().bold());
    } else {
        println!("{}", "Issues:".bold());
        for issue in &report.issues {
            let severity_str = match issue.severity {
                Severity::Error => "ERROR".red().bold(),
                Severity::Warn => "WARN".yellow().bold(),
                Severity::Info => "INFO".cyan(),
            };

            println!("  [{}] {}: {}", severity_str, issue.code, issue.message);

            if let Some(loc) = &issue.location {
                println!("    at {}", loc);
            }

            if let Some(exp) = &issue.expected {
                println!("    Expected: {}", exp);
            }
            if let Some(act) = &issue.actual {
                println!("    Actual:   {}", act);
            }
        }
    }

    println!();
    println!("{}", "=".repeat(60).bright_blue());
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_csv_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("march")).unwrap();
        std::fs::write(dir.path().join("b.csv"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("a.CSV"), "a\n1\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        std::fs::write(dir.path().join("march").join("c.csv"), "a\n1\n").unwrap();

        let names: Vec<_> = csv_files(dir.path())
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();

        assert_eq!(
            names,
            vec![
                PathBuf::from("a.CSV"),
                PathBuf::from("b.csv"),
                PathBuf::from("march").join("c.csv")
            ]
        );
    }

    const MARKET_HEADER: &str = "Consignee,Exporter,Kgs,Month,Year\n";

    fn write_upload(path: &Path, rows: &[&str]) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, format!("{}{}\n", MARKET_HEADER, rows.join("\n"))).unwrap();
    }

    fn line_count(path: &Path) -> usize {
        std::fs::read_to_string(path).unwrap().lines().count()
    }

    #[tokio::test]
    async fn test_batch_keeps_equally_named_files_apart() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        write_upload(&input.join("a").join("x.csv"), &["Stark,Acme,10,Jan,2024"]);
        write_upload(
            &input.join("b").join("x.csv"),
            &["Stark,Acme,10,Jan,2024", "Wayne,Globex,20,Feb,2024"],
        );

        let service = DatasetService::from_config(&Config::default()).unwrap();
        let files = csv_files(&input);
        let summary = run_batch(&service, &input, &files, "market", Some(output.as_path())).await;

        assert_eq!(summary, BatchSummary { files: 2, failed: 0 });
        assert_eq!(line_count(&output.join("a").join("x.csv")), 2);
        assert_eq!(line_count(&output.join("b").join("x.csv")), 3);
    }

    #[tokio::test]
    async fn test_batch_counts_unreadable_file_and_continues() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        let output = tmp.path().join("out");
        write_upload(&input.join("good.csv"), &["Stark,Acme,10,Jan,2024"]);

        let files = vec![input.join("gone.csv"), input.join("good.csv")];
        let service = DatasetService::from_config(&Config::default()).unwrap();
        let summary = run_batch(&service, &input, &files, "market", Some(output.as_path())).await;

        assert_eq!(summary, BatchSummary { files: 2, failed: 1 });
        assert_eq!(summary.succeeded(), 1);
        assert!(output.join("good.csv").exists());
    }

    #[tokio::test]
    async fn test_batch_refuses_output_inside_input() {
        let tmp = tempfile::tempdir().unwrap();
        let input = tmp.path().join("in");
        write_upload(&input.join("x.csv"), &["Stark,Acme,10,Jan,2024"]);

        assert!(lies_within(&input, &input).unwrap());
        assert!(lies_within(&input.join("processed").join("march"), &input).unwrap());
        assert!(!lies_within(&tmp.path().join("out"), &input).unwrap());

        let nested = input.join("processed");
        let result = batch_command(&Config::default(), &input, "market", Some(nested.as_path()), false).await;
        assert!(result.is_err());
        assert!(!nested.exists());
        assert_eq!(line_count(&input.join("x.csv")), 2);
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradeboard.toml");
        std::fs::write(&path, "[cache]\nmax_entries = 3\n").unwrap();

        let config = load_config(Some(&path), false).unwrap();
        assert_eq!(config.cache.max_entries, 3);
        assert_eq!(config.project_root, dir.path());
    }

    #[test]
    fn test_init_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tradeboard.toml");

        init_config_command(&path, false).unwrap();
        assert!(init_config_command(&path, false).is_err());
        init_config_command(&path, true).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.cache, Config::default().cache);
    }

    #[tokio::test]
    async fn test_process_writes_export() {
        let dir = tempfile::tempdir().unwrap();
        let upload = dir.path().join("market.csv");
        std::fs::write(
            &upload,
            "Consignee,Exporter,Kgs,Month,Year\nStark,Acme,1200,Jan,2024\nWayne,Globex,800,Feb,2024\n",
        )
        .unwrap();
        let output = dir.path().join("processed.json");

        process_command(&Config::default(), &upload, "market", &output, ExportFormat::Json, false)
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        let records = written.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["Period"], "2024-01-01");
        assert_eq!(records[1]["Consignee State"], "Unknown");
    }
}
