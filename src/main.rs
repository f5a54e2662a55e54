use anyhow::{bail, Context, Result};
use clap::Parser;
use collector::{CollectionReport, Collector};
use exporter::CsvExporter;
use labeler::Labeler;
use reddit_client::RedditClient;
use redlabel_core::{CollectorConfig, WorkflowConfig};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "redlabel=info,collector=info,reddit_client=info";

#[derive(Parser, Debug)]
#[command(name = "redlabel")]
#[command(about = "Collect Reddit comments by keyword search, label them and export CSV")]
struct Cli {
    /// TOML configuration file; built-in workflows are used when absent
    #[arg(long, env = "REDLABEL_CONFIG")]
    config: Option<PathBuf>,

    /// Workflow to run (repeatable); all configured workflows by default
    #[arg(long = "workflow", value_name = "NAME")]
    workflows: Vec<String>,

    /// Directory prepended to relative output paths
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let cli = Cli::parse();
    info!("Starting redlabel");

    let config = CollectorConfig::load_or_default(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))
        .context("Failed to load configuration")?;
    let workflows = select_workflows(&config, &cli.workflows)?;

    let credentials = config
        .credentials
        .resolve()
        .map_err(|e| anyhow::anyhow!(e.user_friendly_message()))
        .context("Reddit credentials are incomplete")?;
    let client = RedditClient::new(credentials).context("Failed to build Reddit client")?;

    let collector = Collector::new(client, &config.run, Labeler::new(&config.labeler));

    for workflow in workflows {
        let report = collector.run(workflow).await;

        let output = output_path(cli.output_dir.as_deref(), &workflow.output);
        let written = CsvExporter::new(workflow.columns.clone())
            .export(&output, &report.records)
            .with_context(|| format!("Failed to export {}", output.display()))?;
        info!(
            "Workflow {} wrote {} records to {}",
            workflow.name,
            written,
            output.display()
        );

        log_summary(&report);
    }

    let metrics = collector.retry_metrics();
    info!(
        "Done: {} forum attempts, {} retries, {} recovered, {} skipped",
        metrics.total_attempts,
        metrics.total_retries,
        metrics.recovered_operations,
        metrics.exhausted_operations
    );
    Ok(())
}

fn select_workflows<'a>(
    config: &'a CollectorConfig,
    names: &[String],
) -> Result<Vec<&'a WorkflowConfig>> {
    if names.is_empty() {
        return Ok(config.workflows.iter().collect());
    }

    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        match config.workflow(name) {
            Some(workflow) => selected.push(workflow),
            None => {
                let known: Vec<&str> = config.workflows.iter().map(|w| w.name.as_str()).collect();
                bail!("Unknown workflow '{}' (configured: {})", name, known.join(", "));
            }
        }
    }
    Ok(selected)
}

fn output_path(output_dir: Option<&Path>, output: &Path) -> PathBuf {
    match output_dir {
        Some(dir) if output.is_relative() => dir.join(output),
        _ => output.to_path_buf(),
    }
}

fn log_summary(report: &CollectionReport) {
    for outcome in &report.forums {
        match &outcome.error {
            None => info!(
                "  r/{}: {} posts, {} comments examined, {} records ({} attempts)",
                outcome.forum, outcome.posts, outcome.comments_examined, outcome.records, outcome.attempts
            ),
            Some(err) => error!(
                "  r/{}: skipped after {} attempts: {}",
                outcome.forum, outcome.attempts, err
            ),
        }
    }

    if report.label_counts.is_empty() {
        warn!("Workflow {} produced no labeled records", report.workflow);
    }
    for (label, count) in &report.label_counts {
        info!("  label {:?}: {}", label, count);
    }
}
