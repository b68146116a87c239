//! NaLaMap CLI - embedding progress playground.

mod simulate;

use anyhow::Result;
use clap::{Parser, Subcommand};
use nalamap_core::{ProgressReading, ResourceKey};
use nalamap_progress::{EstimatorConfig, ProgressDriver, ProgressEstimator, ProgressFrame};
use simulate::{SimulatedBackend, SimulatedResource};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

const BAR_WIDTH: usize = 30;

#[derive(Parser)]
#[command(name = "nalamap")]
#[command(about = "Embedding progress estimation for GeoServer backends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Animate progress for simulated backends
    Simulate {
        /// Number of backends
        #[arg(long, default_value = "2")]
        backends: usize,
        /// Layers per backend
        #[arg(long, default_value = "40")]
        total: u64,
        /// Layers per second for the first backend; later ones are faster
        #[arg(long, default_value = "2.0")]
        rate: f64,
        /// Make this backend (0-based) fail halfway
        #[arg(long)]
        fail_backend: Option<usize>,
        /// Override the polling cadence
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        /// Show snapshot values only
        #[arg(long)]
        no_interpolation: bool,
        /// Minimum time between printed frames
        #[arg(long, default_value = "500")]
        print_interval_ms: u64,
    },
    /// Print the effective configuration
    Config,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EstimatorConfig> {
    let config = match path {
        Some(path) => EstimatorConfig::from_json_file(path)?,
        None => EstimatorConfig::default(),
    };
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Simulate {
            backends,
            total,
            rate,
            fail_backend,
            poll_interval_ms,
            no_interpolation,
            print_interval_ms,
        } => {
            if let Some(ms) = poll_interval_ms {
                config.poll_interval_ms = ms;
            }
            if no_interpolation {
                config.interpolation_enabled = false;
            }
            config.validate()?;
            if !(rate.is_finite() && rate > 0.0) {
                anyhow::bail!("--rate must be a positive number");
            }

            let resources: Vec<_> = (0..backends)
                .map(|i| SimulatedResource {
                    key: ResourceKey::new(format!("sim://geoserver-{}", i)),
                    total,
                    rate: rate * (1.0 + i as f64 * 0.5),
                    fail_at: (fail_backend == Some(i)).then_some(0.5),
                })
                .collect();

            simulate(config, SimulatedBackend::new(resources), print_interval_ms).await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

async fn simulate(
    config: EstimatorConfig,
    backend: SimulatedBackend,
    print_interval_ms: u64,
) -> Result<()> {
    let mut estimator = ProgressEstimator::new(config);
    for key in backend.keys() {
        estimator.track(key);
    }

    let (driver, handle, mut frames) = ProgressDriver::new(backend, estimator);
    let task = tokio::spawn(driver.run());

    let print_interval = Duration::from_millis(print_interval_ms);
    let mut last_printed: Option<Instant> = None;
    let mut last_frame: Option<ProgressFrame> = None;

    loop {
        tokio::select! {
            frame = frames.recv() => {
                let Some(frame) = frame else { break };
                if last_printed.map_or(true, |at| at.elapsed() >= print_interval) {
                    print_frame(&frame);
                    last_printed = Some(Instant::now());
                    last_frame = None;
                } else {
                    last_frame = Some(frame);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                handle.cancel();
            }
        }
    }

    if let Some(frame) = last_frame {
        print_frame(&frame);
    }

    let estimator = task.await?;
    let terminal = estimator
        .readings()
        .iter()
        .filter(|(_, r)| r.state.is_terminal())
        .count();
    println!("Finished: {} tracked, {} terminal", estimator.len(), terminal);
    Ok(())
}

fn print_frame(frame: &ProgressFrame) {
    println!("[{}]", frame.at.format("%H:%M:%S%.3f"));
    for (key, reading) in &frame.readings {
        println!(
            "  {:<24} {} {:>5.1}%  {}",
            key,
            render_bar(reading),
            reading.percentage_display,
            reading.status_label()
        );
    }
}

fn render_bar(reading: &ProgressReading) -> String {
    if reading.is_indeterminate() {
        return format!("[{}]", "~".repeat(BAR_WIDTH));
    }
    let filled = ((reading.percentage_display / 100.0) * BAR_WIDTH as f64).floor() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("[{}{}]", "#".repeat(filled), " ".repeat(BAR_WIDTH - filled))
}
