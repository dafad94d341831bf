use std::error::Error;
use std::time::Duration;

use cdc_orchestrator_core::ports::JobRunner;
use cdc_orchestrator_lambda::console::{glue_job_runs_url, glue_job_run_url, s3_object_url};
use cdc_orchestrator_lambda::handlers::tick::handle_tick;
use cdc_orchestrator_lambda::observability::init_logging;
use cdc_orchestrator_lambda::runtime::RuntimeDependencies;
use cdc_orchestrator_lambda::settings::OrchestratorSettings;
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "cdc_orchestrator", about = "Incremental CDC job orchestrator")]
struct Cli {
    #[command(flatten)]
    settings: OrchestratorSettings,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a single tracker step and print its outcome.
    Tick,
    /// Run tracker steps on a fixed interval until stopped.
    Run {
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u64).range(1..))]
        interval_seconds: u64,
        /// Stop after this many steps.
        #[arg(long)]
        max_ticks: Option<u64>,
    },
    /// Print the persisted tracker state and console links.
    Show,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(cli.settings.log_format);
    let deps = RuntimeDependencies::load(cli.settings.resolve()?).await;

    match cli.command {
        Command::Tick => tick(&deps)?,
        Command::Run {
            interval_seconds,
            max_ticks,
        } => run(&deps, interval_seconds, max_ticks).await?,
        Command::Show => show(&deps)?,
    }
    Ok(())
}

fn tick(deps: &RuntimeDependencies) -> Result<(), Box<dyn Error>> {
    let tracker = deps.tracker()?;
    let response = handle_tick(&tracker, Utc::now(), deps.region.as_deref())?;
    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

async fn run(
    deps: &RuntimeDependencies,
    interval_seconds: u64,
    max_ticks: Option<u64>,
) -> Result<(), Box<dyn Error>> {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_seconds));
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0u64;

    loop {
        interval.tick().await;
        tick(deps)?;
        completed += 1;
        if max_ticks.is_some_and(|limit| completed >= limit) {
            info!(
                component = "cdc_orchestrator",
                event = "run_finished",
                ticks = completed,
            );
            return Ok(());
        }
    }
}

fn show(deps: &RuntimeDependencies) -> Result<(), Box<dyn Error>> {
    let config = &deps.settings.tracker;
    let tracker = deps.tracker()?;
    let Some(snapshot) = tracker.load()? else {
        println!(
            "no tracker state at {}; the first tick seeds it at {}",
            deps.settings.tracker_uri, config.epoch_processed_partition
        );
        return Ok(());
    };

    let run_status = match snapshot.state.last_job_run_id.as_deref() {
        Some(run_id) => Some(deps.job_runner().get_status(&config.job_name, run_id)?),
        None => None,
    };
    let links = deps.region.as_deref().map(|region| {
        json!({
            "tracker": s3_object_url(region, &deps.settings.tracker_uri),
            "job_runs": glue_job_runs_url(region, &config.job_name),
            "latest_run": snapshot
                .state
                .last_job_run_id
                .as_deref()
                .map(|run_id| glue_job_run_url(region, &config.job_name, run_id)),
        })
    });

    let report = json!({
        "tracker_uri": deps.settings.tracker_uri.to_string(),
        "version": snapshot.version,
        "state": snapshot.state,
        "latest_run_status": run_status,
        "console": links,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
