mod api;
mod app;
mod config;
mod logging;
mod models;
mod tui;

use anyhow::Result;
use clap::Parser;
use config::{ApiKeys, Overrides};
use models::ComparisonMode;
use std::path::PathBuf;
use tokio::io::BufReader;
use tracing::info;

use app::{build_lanes, compare, Session};

#[derive(Parser)]
#[command(name = "promptgrid")]
#[command(version = "0.1.0")]
#[command(about = "Stream several LLM answers side by side in one terminal")]
struct Cli {
    /// Question sent to every panel
    #[arg(long, value_name = "QUESTION")]
    compare: String,

    /// Which comparison to run
    #[arg(short, long, value_enum, default_value_t = ComparisonMode::Strategies)]
    mode: ComparisonMode,

    /// Upper bound on generated tokens per request
    #[arg(long)]
    max_tokens: Option<u32>,

    /// System prompt
    #[arg(long)]
    system: Option<String>,

    /// Response format the model is asked to follow
    #[arg(long)]
    format: Option<String>,

    /// Stop sequence
    #[arg(long)]
    stop: Option<String>,

    /// Settings file (defaults to the user config dir)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log file (defaults to the user state dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_key: Option<String>,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_key: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_path = logging::init(cli.log_file.clone());
    info!(log = ?log_path, mode = ?cli.mode, "promptgrid starting");

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(cli));
    // A stdin read left pending by an interrupt must not keep the process alive.
    runtime.shutdown_background();
    result
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = config::load(cli.config.as_deref())?;
    settings.apply(Overrides {
        max_tokens: cli.max_tokens,
        system: cli.system,
        format: cli.format,
        stop: cli.stop,
    });
    let keys = ApiKeys {
        anthropic: cli.anthropic_key,
        openai: cli.openai_key,
    };

    let session = Session {
        mode: cli.mode,
        lanes: build_lanes(cli.mode, &cli.compare, &settings, &keys)?,
        question: cli.compare,
        grace: settings.cancel_grace(),
    };

    let mut input = BufReader::new(tokio::io::stdin());
    let result = compare(
        session,
        tui::geometry::probe(),
        Box::new(std::io::stdout()),
        &mut input,
        || async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await;

    match result {
        Ok(report) => {
            let completed = report.metrics.iter().flatten().count();
            info!(cancelled = report.cancelled, completed, "comparison finished");
            Ok(())
        }
        Err(e) => {
            let _ = tui::restore();
            Err(e)
        }
    }
}
