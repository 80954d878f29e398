use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
    time::Duration,
};

use clap::Parser;
use railsim_core::{
    config::{self, AppConfig},
    scenery::{self, SceneryFile},
    Mode, RouteId, SharedSimulation, TrainId,
};
use tracing::{info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

/// Run a scenery: set routes, drive trains and watch routes release behind them
#[derive(Parser, Debug)]
#[command(name = "railsim")]
#[command(about = "Drive trains over a scenery and log route releases")]
struct Args {
    /// Scenery file to load
    scenery: PathBuf,

    /// Routes to set before the first tick
    #[arg(long = "activate", value_name = "ROUTE")]
    activate: Vec<u32>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 20)]
    ticks: u32,

    /// Override the configured tick period, in milliseconds
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Write the resulting scenery here
    #[arg(long)]
    save: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let args = Args::parse();

    config::ensure_default_config()?;
    let config = AppConfig::load()?;

    let simulation = scenery::load_simulation(&args.scenery, config.context(Mode::Game))?;
    let shared = SharedSimulation::new(simulation);
    for id in &args.activate {
        shared
            .activate_route(RouteId(*id))
            .with_context(|| format!("failed to set route {id}"))?;
    }

    let period = Duration::from_millis(args.tick_ms.unwrap_or(config.tick_ms).max(1));
    run(&shared, &config, args.ticks, period).await;

    if let Some(path) = &args.save {
        let title = args
            .scenery
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("scenery")
            .to_string();
        shared.read(|sim| SceneryFile::from_simulation(title, sim).save(path))?;
    }
    Ok(())
}

async fn run(shared: &SharedSimulation, config: &AppConfig, ticks: u32, period: Duration) {
    let mut interval = tokio::time::interval(period);
    let mut stopped: Vec<TrainId> = Vec::new();

    for tick in 1..=ticks {
        interval.tick().await;
        let trains: Vec<TrainId> = shared.read(|sim| sim.trains().map(|train| train.id).collect());
        if trains.iter().all(|id| stopped.contains(id)) {
            info!("all trains stopped after {} ticks", tick - 1);
            break;
        }

        let active: Vec<TrainId> = trains.into_iter().filter(|id| !stopped.contains(id)).collect();
        for id in active {
            let outcome = shared.write(|sim| {
                let speed = sim
                    .train(id)
                    .and_then(|train| sim.max_speed(train.head.item))
                    .unwrap_or(0.0);
                let wanted = speed * config.time_step;
                let movement = sim.move_train(id, wanted)?;
                let head = sim.train(id).map(|train| train.head);
                Ok::<_, railsim_core::TrainError>((wanted, movement, head))
            });

            match outcome {
                Ok((wanted, movement, head)) => {
                    if let Some(head) = head {
                        info!(
                            "tick {}: train {} at item {} +{:.1} m",
                            tick, id, head.item, head.offset
                        );
                    }
                    for item in &movement.released {
                        info!("tick {}: train {} released item {}", tick, id, item);
                    }
                    if movement.distance < wanted || wanted <= 0.0 {
                        warn!("train {} cannot move any further", id);
                        stopped.push(id);
                    }
                }
                Err(err) => {
                    tracing::error!("train {} failed to move: {err}", id);
                    stopped.push(id);
                }
            }
        }
    }
}

fn init_logging() -> Result<()> {
    let log_dir = std::env::current_dir()?.join("logs");
    fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("railsim.log");

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stdout);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .compact()
        .with_writer(move || {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&log_path)
                .expect("failed to open log file")
        });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    Ok(())
}
