mod viewer;

use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use graphlens::settings::EngineSettings;
use graphlens::synthetic::SyntheticGraph;
use tracing_subscriber::EnvFilter;

use crate::viewer::{GraphLensApp, GraphSource};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Graph snapshot (JSON) to open. Without it a synthetic graph is generated.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Node count of the synthetic graph.
    #[arg(long, default_value_t = 5_000)]
    synthetic_nodes: usize,

    /// Edge count of the synthetic graph.
    #[arg(long, default_value_t = 12_000)]
    synthetic_edges: usize,

    /// Seed of the synthetic graph.
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Settings file (TOML). Defaults to ./graphlens.toml when present.
    #[arg(short, long, env = "GRAPHLENS_CONFIG")]
    config: Option<PathBuf>,

    /// Simulation ticks between position broadcasts.
    #[arg(long)]
    broadcast_every: Option<u32>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = EngineSettings::load(args.config.as_deref())
        .context("failed to load engine settings")?
        .with_broadcast_every(args.broadcast_every);
    settings.simulation_config().context(
        "simulation.broadcast_every must be set in the settings file, \
         GRAPHLENS_SIMULATION__BROADCAST_EVERY or --broadcast-every",
    )?;

    let source = match args.snapshot {
        Some(path) => GraphSource::Snapshot(path),
        None => GraphSource::Synthetic(
            SyntheticGraph::new(args.synthetic_nodes, args.synthetic_edges).with_seed(args.seed),
        ),
    };
    tracing::info!(?source, "starting viewer");

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "graphlens",
        options,
        Box::new(move |cc| Ok(Box::new(GraphLensApp::new(cc, source, settings)))),
    )
    .map_err(|error| anyhow!("viewer exited with an error: {error}"))
}
