//! main.rs — Street-lighting fleet simulator service
//!
//! Runs two concurrent tasks over one shared registry:
//!   1. Tick loop: advances every relay on a fixed period
//!   2. HTTP server: listings, details, commands and maintenance endpoints
//!
//! Both stop on Ctrl-C.

mod config;
mod handlers;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fleet_simulator::{advance, load_topology, DeviceRegistry, LocalClock};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::{watch, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use config::{FullConfig, SimulationConfig};
use state::{AppState, SharedRegistry};

// ── CLI ───────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "lighting-backend", about = "Street-lighting fleet simulator")]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,
    /// HTTP port (overrides PORT and the config file)
    #[arg(short, long)]
    port: Option<u16>,
    /// Topology JSON produced by the placement step
    #[arg(short, long)]
    topology: Option<PathBuf>,
    /// Simulation speed multiplier (1.0 = real-time)
    #[arg(long)]
    speed: Option<f64>,
    /// Seed for a reproducible fleet and tick sequence
    #[arg(long)]
    seed: Option<u64>,
}

// ── Tick loop ─────────────────────────────────────────────────────────────────

async fn run_fleet_tick(
    registry: SharedRegistry,
    clock: LocalClock,
    sim: SimulationConfig,
    elapsed: Duration,
    mut rng: StdRng,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(sim.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick of a tokio interval fires immediately
    ticker.tick().await;

    let settings = sim.tick_settings();
    let log_every = sim.log_every_ticks.max(1);
    let mut tick_count: u64 = 0;

    info!(
        "⏱  Tick loop running every {}ms ({:.1}s simulated per tick)",
        sim.tick_interval_ms,
        elapsed.as_secs_f64()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => {
                info!("🛑 Tick loop stopped after {tick_count} ticks");
                return;
            }
        }

        let ctx = clock.context(elapsed);
        let report = {
            let mut fleet = registry.write().await;
            advance(&mut fleet, &mut rng, &ctx, &settings)
        };
        tick_count += 1;

        if tick_count % log_every == 0 {
            info!(
                "🌃 tick {tick_count} ({}): {report}",
                if ctx.is_night { "night" } else { "day" }
            );
        } else {
            debug!("tick {tick_count}: {report}");
        }
    }
}

async fn shutdown_signal(tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("👋 Shutdown requested");
    let _ = tx.send(true);
}

// ── Main ──────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lighting_backend=info,fleet_simulator=info".into()),
        )
        .init();

    let args = Args::parse();
    let mut cfg = FullConfig::load(&args.config)?;

    if let Some(speed) = args.speed {
        cfg.simulation.speed = speed;
    }
    if let Some(path) = args.topology {
        cfg.topology.path = path;
    }
    cfg.simulation
        .validate()
        .context("invalid simulation settings after command-line overrides")?;
    let tick_elapsed = cfg.simulation.tick_elapsed()?;
    let port = args
        .port
        .or_else(|| std::env::var("PORT").ok().and_then(|p| p.parse().ok()))
        .unwrap_or(cfg.server.port);

    let clock = cfg.simulation.clock()?;
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!("💡 Street-lighting fleet simulator starting...");

    let topology = load_topology(&cfg.topology.path)
        .with_context(|| format!("loading topology from {}", cfg.topology.path.display()))?;
    let ctx = clock.context(Duration::ZERO);
    let registry = DeviceRegistry::load(&topology, &mut rng, &ctx)
        .with_context(|| format!("building fleet from {}", cfg.topology.path.display()))?;
    let registry: SharedRegistry = Arc::new(RwLock::new(registry));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ticker = tokio::spawn(run_fleet_tick(
        registry.clone(),
        clock,
        cfg.simulation.clone(),
        tick_elapsed,
        rng,
        shutdown_rx,
    ));

    let app = handlers::router(AppState::new(registry, clock));

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("🚀 Listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("HTTP server failed")?;

    ticker.await.context("tick loop panicked")?;
    Ok(())
}
