//! `promptline` command-line host for the pipeline engine.

mod commands;
mod render;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "promptline=info,pl_core=info";
const VERBOSE_LOG_FILTER: &str = "promptline=debug,pl_core=debug";

#[derive(Debug, Parser)]
#[command(name = "promptline", version, about = "Run AI generation pipelines")]
struct Cli {
    /// Project root containing the `.promptline/` directory.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    /// Log engine activity at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the pipelines defined in the project.
    List,

    /// Execute a pipeline and stream its output.
    Run {
        /// Pipeline id.
        pipeline: String,

        /// Template binding, overriding the pipeline's own value.
        #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
        vars: Vec<(String, String)>,

        /// Answer every step from the built-in mock service instead of the network.
        #[arg(long)]
        mock: bool,
    },

    /// Show a recorded run, or the recent runs when no id is given.
    Show {
        run_id: Option<uuid::Uuid>,

        /// Print the raw run record as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    // Logs go to stderr so generated text on stdout stays clean
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::List => commands::list(&cli.root).await,
        Command::Run {
            pipeline,
            vars,
            mock,
        } => commands::run(&cli.root, &pipeline, vars.into_iter().collect(), mock).await,
        Command::Show { run_id, json } => commands::show(&cli.root, run_id, json).await,
    }
}
