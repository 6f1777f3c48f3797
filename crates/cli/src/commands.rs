//! Subcommand implementations.

use crate::render::{print_run, run_line, EventPrinter};
use color_eyre::eyre::{bail, eyre, WrapErr};
use color_eyre::Result;
use colored::Colorize;
use pl_core::config::{load_config, AppConfig};
use pl_core::engine::{EngineError, PipelineEngine};
use pl_core::executor::StepExecutor;
use pl_core::generation::{GenerationService, HttpGenerationService, MockGenerationService};
use pl_core::persistence::FileRunStore;
use pl_core::runs::RunManager;
use pl_protocol::run_models::RunStatus;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

const EVENT_BUFFER: usize = 256;
const MOCK_CHUNK_DELAY: Duration = Duration::from_millis(60);

async fn load(root: &Path) -> Result<AppConfig> {
    load_config(root)
        .await
        .wrap_err_with(|| format!("failed to load configuration under {}", root.display()))
}

pub async fn list(root: &Path) -> Result<()> {
    let config = load(root).await?;

    if config.pipelines.is_empty() {
        println!("No pipelines found in {}", root.join(".promptline/pipelines").display());
        return Ok(());
    }

    for pipeline in &config.pipelines {
        println!(
            "{}  {} ({} steps)",
            pipeline.id.cyan().bold(),
            pipeline.name,
            pipeline.steps.len()
        );
        if !pipeline.description.is_empty() {
            println!("    {}", pipeline.description.dimmed());
        }
    }
    Ok(())
}

pub async fn run(
    root: &Path,
    pipeline_id: &str,
    overrides: HashMap<String, String>,
    mock: bool,
) -> Result<()> {
    let config = load(root).await?;
    let pipeline = config
        .find_pipeline(pipeline_id)
        .cloned()
        .ok_or_else(|| EngineError::PipelineNotFound(pipeline_id.to_string()))?;

    let generation: Arc<dyn GenerationService> = if mock {
        Arc::new(MockGenerationService::default().with_chunk_delay(MOCK_CHUNK_DELAY))
    } else {
        Arc::new(HttpGenerationService::from_settings(&config.settings))
    };
    if !generation.check_availability().await {
        warn!(url = %config.settings.service_url, "generation service is not reachable");
    }

    let store = FileRunStore::open(config.runs_path(root)).await?;
    let executor = StepExecutor::new(
        generation,
        Arc::new(config.document_store()),
        &config.settings,
    );
    let engine = PipelineEngine::new(executor, Arc::new(store));

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_BUFFER);
    let manager = RunManager::new(engine, events_tx);
    let handle = manager.start(pipeline, overrides).await?;
    info!(run_id = %handle.run_id(), "run started");

    let trigger = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling run...".yellow());
            trigger.cancel();
        }
    });

    let mut printer = EventPrinter::new();
    while let Some(event) = events_rx.recv().await {
        printer.print(&event);
        if event.is_terminal() {
            break;
        }
    }

    let run = handle.wait().await?;
    match run.status {
        RunStatus::Completed => Ok(()),
        RunStatus::Cancelled => bail!("run {} was cancelled", run.id),
        status => bail!("run {} ended with status {status:?}", run.id),
    }
}

pub async fn show(root: &Path, run_id: Option<Uuid>, json: bool) -> Result<()> {
    let config = load(root).await?;
    let store = FileRunStore::open(config.runs_path(root)).await?;

    let Some(run_id) = run_id else {
        let runs = store.list_runs().await?;
        if runs.is_empty() {
            println!("No runs recorded in {}", store.dir().display());
        }
        for run in &runs {
            println!("{}", run_line(run));
        }
        return Ok(());
    };

    let record = store
        .load_record(run_id)
        .await?
        .ok_or_else(|| eyre!("no run {run_id} in {}", store.dir().display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_run(&record.run, &record.steps);
    }
    Ok(())
}
