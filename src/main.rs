//! codeask - incremental LLM-driven code analysis.
//!
//! Usage:
//!   codeask [PATH] --filter GLOBS   Analyze matching files under PATH
//!   codeask providers               List supported AI providers
//!   codeask --help                  Show help

mod cli;
mod config;
mod console;
mod report;

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Context, Result, bail};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use codeask_analyze::{AiClient, AnalysisOrchestrator, AnalysisStore, RunReport};
use codeask_provider::{ProviderRegistry, api_key_env_vars};
use codeask_scan::{GlobFileSource, ScanOutcome};

use crate::cli::{Cli, Command};
use crate::config::{FileConfig, RunSettings, discover_config};
use crate::console::ConsoleProgress;
use crate::report::{ExportSummary, ReportExporter};

const VERBOSE_FILTER: &str =
    "warn,codeask=debug,codeask_core=debug,codeask_scan=debug,codeask_analyze=debug,codeask_provider=debug";

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Command::Providers) => {
            list_providers();
            Ok(())
        }
        None => run_analysis(&cli).await,
    }
}

/// Log to stderr, honouring `RUST_LOG` when set.
fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_FILTER } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .init();
}

fn list_providers() {
    let registry = ProviderRegistry::default();
    for name in registry.names() {
        println!("{name:<12} key from {}", api_key_env_vars(name).join(", "));
    }
}

async fn run_analysis(cli: &Cli) -> Result<()> {
    let root = cli
        .path
        .canonicalize()
        .with_context(|| format!("Invalid path {}", cli.path.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }

    let config_path = cli.config.clone().or_else(|| discover_config(&root));
    let file_config = match &config_path {
        Some(path) => {
            eprintln!("Using config {}", path.display());
            FileConfig::load(path)?
        }
        None => FileConfig::default(),
    };
    let settings = RunSettings::resolve(cli, &root, &file_config, |var| std::env::var(var).ok())?;

    let client: Arc<dyn AiClient> = Arc::from(
        ProviderRegistry::default()
            .create(&settings.provider, &settings.provider_settings)
            .context("Failed to configure AI provider")?,
    );

    eprintln!(
        "Scanning {} for {}...",
        root.display(),
        settings.scan.include_patterns.join(", ")
    );
    let source = GlobFileSource::new(&settings.root, settings.scan.clone());
    let mut outcome = tokio::task::spawn_blocking(move || source.scan())
        .await
        .context("Scan task failed")?
        .context("Scan failed")?;

    let exporter = ReportExporter::for_state_file(&settings.state_path);
    exporter.retain_sources(&root, &settings.state_path, &mut outcome.files);

    eprintln!(
        "Analyzing with {} ({} mode, {} workers)",
        settings.provider,
        if settings.incremental { "incremental" } else { "full" },
        settings.analyzer.worker_count()
    );

    let cancel = CancellationToken::new();
    let mut orchestrator = AnalysisOrchestrator::new(
        client,
        AnalysisStore::new(&settings.state_path),
        settings.analyzer.clone(),
    )
    .with_cancellation(cancel.clone());
    if settings.show_progress {
        orchestrator = orchestrator.with_progress(Arc::new(ConsoleProgress::new()));
    }

    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping after in-flight requests...");
            cancel.cancel();
        }
    });

    let files = std::mem::take(&mut outcome.files);
    let result = orchestrator.run(files, settings.incremental).await;
    interrupt.abort();
    let report = result.context("Analysis aborted")?;

    let export = exporter
        .export(&report.state, &report.pruned)
        .context("Failed to write reports")?;
    info!(
        written = export.written,
        unchanged = export.unchanged,
        removed = export.removed,
        "exported reports"
    );

    print_report(&root, &settings.state_path, &outcome, &report, &export);
    Ok(())
}

/// Print the run summary.
fn print_report(
    root: &Path,
    state_path: &Path,
    scan: &ScanOutcome,
    report: &RunReport,
    export: &ExportSummary,
) {
    println!();
    println!("{}", "─".repeat(60));
    println!(
        " {} - {} files, {}",
        root.display(),
        report.discovered,
        format_size(scan.total_bytes)
    );
    println!(
        " {} analyzed, {} unchanged, {} succeeded, {} failed, {} removed",
        report.analyzed,
        report.cached,
        report.succeeded,
        report.failed,
        report.pruned.len()
    );
    println!(" Summary: {}", report.summary);
    println!(" Finished in {:.2}s", report.elapsed.as_secs_f64());
    println!("{}", "─".repeat(60));

    if report.cancelled {
        println!();
        println!(" Run interrupted; unfinished files will be analyzed next time.");
    }

    let stats = report.state.stats();
    if stats.failed > 0 {
        println!();
        println!(" Failed files ({}):", stats.failed);
        for record in report.state.failed_records() {
            println!(
                "   {} ({}): {}",
                record.path,
                attempts(record.last_attempt_count),
                record.last_error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    if stats.pending > 0 {
        println!();
        println!(" {} file(s) not analyzed yet", stats.pending);
    }

    if !scan.skipped.is_empty() {
        println!();
        println!(" {} matching file(s) skipped during scan", scan.skipped.len());
    }

    println!();
    println!(" State file:   {}", state_path.display());
    match &export.summary {
        Some(path) => println!(" Summary file: {}", path.display()),
        None => println!(" Summary file: not written"),
    }
}

fn attempts(count: u32) -> String {
    if count == 1 {
        "1 attempt".to_string()
    } else {
        format!("{count} attempts")
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
