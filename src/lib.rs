// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod monitor;
pub mod notify;
pub mod task;
pub mod types;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::cli::{CliArgs, Command};
use crate::config::BuildFile;
use crate::config::loader::load_and_validate;
use crate::dag::{GraphBuilder, NoHistory};
use crate::engine::{BuildCoordinator, BuildSetRecord, InMemoryDatastore};
use crate::exec::SimulatedDriver;
use crate::monitor::CompletionMonitor;
use crate::notify::{FnListener, JsonLinesTransport, Scope};
use crate::task::{BuildSetStatus, BuildStatus};
use crate::types::IdSource;

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> Result<()> {
    let cfg = load_and_validate(&args.config)?;

    match args.command {
        Command::Plan => print_plan(&cfg),
        Command::Simulate { force } => simulate(&cfg, force).await,
    }
}

/// Print the build order, one configuration per line, with its
/// dependencies.
fn print_plan(cfg: &BuildFile) -> Result<()> {
    let force = cfg.force_set();
    let graph = GraphBuilder::new(Arc::new(IdSource::new())).build(&cfg.nodes(), &force, &NoHistory)?;
    let order = graph.topological_order()?;

    println!("buildcoord plan");
    println!(
        "  engine.monitor_pool_size = {}",
        cfg.engine().monitor_pool_size
    );
    println!(
        "  engine.watchdog_interval_ms = {}",
        cfg.engine().watchdog_interval_ms
    );
    println!(
        "  engine.max_concurrent_builds = {}",
        cfg.engine().max_concurrent_builds
    );
    println!();

    println!("build order ({}):", order.len());
    for (step, id) in order.iter().enumerate() {
        let Some(task) = graph.get(*id) else {
            continue;
        };
        print!("  {}. {}", step + 1, task.config_id());
        if task.name() != task.config_id() {
            print!(" ({})", task.name());
        }
        if task.is_forced() {
            print!(" [forced]");
        }
        println!();

        let deps: Vec<&str> = task.dependency_configs().map(|(_, cfg)| cfg).collect();
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
    }

    Ok(())
}

/// Run the whole file through the engine with a [`SimulatedDriver`].
async fn simulate(cfg: &BuildFile, extra_force: Vec<String>) -> Result<()> {
    let mut force: HashSet<String> = cfg.force_set();
    for id in extra_force {
        if !cfg.builds().contains_key(&id) {
            bail!("--force names unknown build '{id}'");
        }
        force.insert(id);
    }

    let monitor = Arc::new(CompletionMonitor::new(cfg.monitor_config()));
    monitor.start()?;

    let driver = SimulatedDriver::new(Arc::clone(&monitor)).with_builds(cfg.simulated_builds());
    let datastore = Arc::new(InMemoryDatastore::new());
    let coordinator = BuildCoordinator::new(driver, Arc::clone(&datastore), cfg.engine_options());

    let dispatcher = coordinator.dispatcher();
    dispatcher.subscribe(
        Scope::All,
        Arc::new(JsonLinesTransport::new(std::io::stdout())),
    );

    // Only one set is submitted, so the first DONE aggregate ends the run.
    let finished = Arc::new(Notify::new());
    {
        let finished = Arc::clone(&finished);
        dispatcher.subscribe(
            Scope::All,
            Arc::new(FnListener::new("set-finished", move |event| {
                if event
                    .as_set_event()
                    .is_some_and(|e| e.new_status == BuildSetStatus::Done)
                {
                    finished.notify_one();
                }
                Ok(())
            })),
        );
    }

    let set_id = coordinator.submit(&cfg.nodes(), &force)?;
    // Kept so the summary does not depend on when the datastore sees the set.
    let Some(set) = coordinator.set(set_id) else {
        bail!("build set {set_id} disappeared before it was started");
    };
    coordinator.start(set_id)?;

    tokio::select! {
        _ = finished.notified() => {}
        signal = tokio::signal::ctrl_c() => {
            signal?;
            warn!(set_id = %set_id, "interrupted; cancelling build set");
            if let Err(err) = coordinator.cancel_set(set_id) {
                warn!(error = %err, "build set finished before it could be cancelled");
            }
        }
    }

    monitor.stop();

    let record = BuildSetRecord::from_set(&set);
    let total = record.members.len();
    let done = record.count(BuildStatus::Done);
    info!(
        set_id = %set_id,
        total,
        done,
        failed = record.count(BuildStatus::Failed),
        not_built = record.count(BuildStatus::NotBuilt),
        cancelled = record.count(BuildStatus::Cancelled),
        stored_builds = datastore.builds().len(),
        "simulation finished"
    );

    if done != total {
        bail!("{} of {} builds did not succeed", total - done, total);
    }
    Ok(())
}
