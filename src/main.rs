use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ocpwatch::config::duration::parse_duration;
use ocpwatch::{ConfigPatch, DataSource, FileSource, MonitorConfig, MonitoringService};
use ocpwatch_types::Device;

#[derive(Parser, Debug)]
#[command(name = "ocpwatch")]
#[command(about = "Monitor OCP Time Card telemetry and stream snapshots and alerts as JSON")]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Readings file kept up to date by an external collector
    #[arg(short, long, default_value = "readings.json")]
    readings: PathBuf,

    /// Poll interval (e.g., "5s", "500ms"), overrides the configuration
    #[arg(short, long, value_parser = parse_duration)]
    interval: Option<Duration>,

    /// Report every channel unavailable once the readings file is older than
    /// this (default: three poll intervals)
    #[arg(long, value_parser = parse_duration)]
    max_age: Option<Duration>,

    /// Device ids to monitor when the configuration lists none
    #[arg(short, long = "device", default_value = "timecard0")]
    devices: Vec<String>,

    /// Generate synthetic readings instead of reading a file
    #[cfg(feature = "simulation")]
    #[arg(long, conflicts_with = "readings")]
    simulate: bool,

    /// Seed for --simulate
    #[cfg(feature = "simulation")]
    #[arg(long, default_value = "42", requires = "simulate")]
    seed: u64,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ocpwatch=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn data_source(args: &Args, poll_interval: Duration) -> Arc<dyn DataSource> {
    #[cfg(feature = "simulation")]
    if args.simulate {
        use ocpwatch_sources::{SimulatedSource, SimulationConfig};
        tracing::warn!(seed = args.seed, "using simulated readings");
        return Arc::new(SimulatedSource::new(SimulationConfig::default().with_seed(args.seed)));
    }
    let max_age = args.max_age.unwrap_or(poll_interval * 3);
    Arc::new(FileSource::new(&args.readings).with_max_age(Some(max_age)))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let config = MonitorConfig::load(args.config.as_deref())
        .with_context(|| match &args.config {
            Some(path) => format!("loading configuration from {}", path.display()),
            None => "loading configuration from the environment".to_string(),
        })?;

    let service = MonitoringService::new(config).context("starting monitoring service")?;
    if let Some(interval) = args.interval {
        let patch = ConfigPatch {
            poll_interval: Some(interval),
            ..ConfigPatch::default()
        };
        service.set_config(&patch).context("applying --interval")?;
    }

    let source = data_source(&args, service.get_config().poll_interval);
    let mut events = service.subscribe();

    if service.add_configured_devices(source.clone())? == 0 {
        for id in &args.devices {
            service
                .add_device(Device::timecard(id), source.clone())
                .with_context(|| format!("adding device {}", id))?;
        }
    }
    tracing::info!(devices = service.device_count(), source = source.describe(), "monitoring");

    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                let mut line = serde_json::to_vec(&event)?;
                line.push(b'\n');
                stdout.write_all(&line).await?;
                stdout.flush().await?;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("waiting for Ctrl-C")?;
                tracing::info!("interrupt received, shutting down");
                break;
            }
        }
    }

    if events.dropped_events() > 0 {
        tracing::warn!(dropped = events.dropped_events(), "stdout fell behind, events dropped");
    }
    service.shutdown().await;
    Ok(())
}
