//! weald-world-server binary
//!
//! Starts the world core and drives the pump from a timer task. The wire
//! listener is a separate concern; this process hosts the simulation and
//! exposes it to embedders.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                      | Default   | Description                      |
//! |--------------------------|-----------|----------------------------------|
//! | `WEALD_NAME`             | `weald`   | Server name in Get replies       |
//! | `WEALD_TICK_RATE_HZ`     | `15`      | Pump rate                        |
//! | `WEALD_BASIC_TICK`       | `3.0`     | Self-tick base period (seconds)  |
//! | `WEALD_BASE_VELOCITY`    | `1.5`     | Pedestrian speed cap             |
//! | `WEALD_RESTRICTED`       | `false`   | Disable account creation         |

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::sync::Arc;
use weald_world::{MemoryStore, Server, ServerConfig, Vec3};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "weald-world-server", about = "Weald World Engine", version)]
struct Args {
    /// Server name advertised in Get replies
    #[arg(long, env = "WEALD_NAME", default_value = "weald")]
    name: String,

    /// Pump rate (Hz)
    #[arg(long, env = "WEALD_TICK_RATE_HZ", default_value_t = 15.0)]
    tick_rate_hz: f32,

    /// Base period of self-scheduled ticks (seconds)
    #[arg(long, env = "WEALD_BASIC_TICK", default_value_t = 3.0)]
    basic_tick: f64,

    /// Pedestrian speed cap (world units per second)
    #[arg(long, env = "WEALD_BASE_VELOCITY", default_value_t = 1.5)]
    base_velocity: f64,

    /// Refuse account creation
    #[arg(long, env = "WEALD_RESTRICTED", default_value_t = false)]
    restricted: bool,

    /// Optional TOML config file; CLI/env values win over its contents
    #[arg(long, env = "WEALD_CONFIG")]
    config: Option<String>,

    /// Number of wandering NPC characters to seed the world with
    #[arg(long, env = "WEALD_SEED_NPCS", default_value_t = 2)]
    seed_npcs: u32,
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let mut cfg = match &args.config {
        Some(path) => config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("WEALD"))
            .build()
            .and_then(|c| c.try_deserialize::<ServerConfig>())
            .with_context(|| format!("Failed to load config from {}", path))?,
        None => ServerConfig::default(),
    };
    cfg.basic_tick = args.basic_tick;
    cfg.base_velocity = args.base_velocity;
    cfg.restricted = args.restricted;
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weald_world=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let cfg = build_config(&args)?;

    log::info!(
        "Starting weald-world-server (name='{}', basic_tick={}, base_velocity={}, restricted={})",
        args.name,
        cfg.basic_tick,
        cfg.base_velocity,
        cfg.restricted,
    );

    let mut server = Server::new(args.name, cfg, Box::new(MemoryStore::new()));

    // Seed a few NPCs so the world has something to metabolise.
    let root = server.world().root_id().to_string();
    for i in 0..args.seed_npcs {
        let id = server.spawn(
            "character",
            &root,
            Vec3::new(i as f64 * 2.0, 0.0, 0.0),
            serde_json::Map::new(),
        );
        server.world_mut().enqueue(
            weald_world::Operation::new(weald_world::OpKind::Setup).to(id),
        );
    }

    let server = Arc::new(Mutex::new(server));

    // -----------------------------------------------------------------------
    // Pump loop
    // -----------------------------------------------------------------------

    let pump_server = server.clone();
    let tick_hz = args.tick_rate_hz;
    let pump_handle = tokio::spawn(async move {
        let start = std::time::Instant::now();
        let interval = std::time::Duration::from_secs_f32(1.0 / tick_hz);
        let mut timer = tokio::time::interval(interval);
        loop {
            timer.tick().await;
            let now = start.elapsed().as_secs_f64();
            // Hold the lock only long enough to pump.
            pump_server.lock().pump(now);
        }
    });

    // -----------------------------------------------------------------------
    // Wait for shutdown signal
    // -----------------------------------------------------------------------

    tokio::select! {
        _ = pump_handle => {
            log::error!("Pump loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("weald-world-server shutting down (SIGINT)");
        }
    }

    let record = server.lock().record();
    log::info!("Final state: {}", record);
    Ok(())
}
