//! Headless driver: walks a subject across the terrain and streams hex chunks around it.
#![forbid(unsafe_code)]

mod watch;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use crossbeam_channel::unbounded;
use hexterra_runtime::WorkerPool;
use hexterra_stream::{ChunkEvent, ChunkScheduler, NullMeshBuilder, StreamSettings};
use hexterra_world::{ConfigError, TerrainConfig, TerrainContext};

#[derive(Parser, Debug)]
#[command(name = "hexterra")]
#[command(about = "Streams procedural hex terrain around a moving subject")]
struct Args {
    /// Terrain configuration (TOML). Built-in defaults are used if the file is missing.
    #[arg(short, long, default_value = "terrain.toml")]
    config: std::path::PathBuf,

    /// Overrides the configured seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of simulation steps.
    #[arg(long, default_value_t = 900)]
    steps: u32,

    /// Subject speed in world units per step.
    #[arg(long, default_value_t = 1.5)]
    speed: f64,

    /// Rebuild the terrain when the config file changes.
    #[arg(long)]
    watch: bool,

    /// Worker threads; overrides `streaming.workers`.
    #[arg(long)]
    workers: Option<usize>,

    /// Debug-level logging unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

const STEP: Duration = Duration::from_millis(16);

fn load_config(path: &Path, seed: Option<u64>) -> Result<TerrainConfig, ConfigError> {
    let mut cfg = if path.exists() {
        TerrainConfig::load(path)?
    } else {
        log::info!("{} not found; using built-in terrain defaults", path.display());
        TerrainConfig::default()
    };
    if let Some(seed) = seed {
        cfg.seed = seed;
    }
    cfg.validate()?;
    Ok(cfg)
}

fn subject_at(step: u32, speed: f64) -> (f64, f64) {
    let t = f64::from(step);
    (t * speed, 60.0 * (t * 0.004).sin())
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let cfg = load_config(&args.config, args.seed)?;
    let workers = match args.workers.unwrap_or(cfg.streaming.workers) {
        0 => WorkerPool::default_worker_count(),
        n => n,
    };
    let ctx = Arc::new(TerrainContext::from_config(&cfg)?);
    log::info!(
        "terrain seed {} | hex size {} | {} cells per chunk edge | {} workers",
        cfg.seed,
        cfg.grid.hex_size,
        cfg.grid.chunk_cells,
        workers
    );

    let pool = WorkerPool::new(Arc::clone(&ctx), workers)?;
    let mut scheduler = ChunkScheduler::new(
        ctx,
        pool,
        NullMeshBuilder::default(),
        StreamSettings::from_config(&cfg.streaming),
    );
    let (event_tx, event_rx) = unbounded::<ChunkEvent>();
    scheduler.add_observer(event_tx);

    let reload_rx = if args.watch {
        Some(watch::spawn_config_watcher(&args.config))
    } else {
        None
    };

    let mut reconcile_every = Duration::from_millis(cfg.streaming.reconcile_interval_ms);
    let mut last_reconcile: Option<Instant> = None;
    let mut started = Instant::now();

    for step in 0..args.steps {
        let frame = Instant::now();

        if let Some(rx) = &reload_rx {
            // Coalesce bursts of file events into one rebuild.
            if rx.try_iter().count() > 0 {
                match load_config(&args.config, args.seed) {
                    Ok(next_cfg) => match scheduler.context().successor(&next_cfg) {
                        Ok(next) => {
                            scheduler.apply_settings(StreamSettings::from_config(&next_cfg.streaming));
                            scheduler.reconfigure(Arc::new(next));
                            reconcile_every =
                                Duration::from_millis(next_cfg.streaming.reconcile_interval_ms);
                            last_reconcile = None;
                            started = Instant::now();
                        }
                        Err(e) => log::warn!("terrain reload rejected: {}", e),
                    },
                    Err(e) => log::warn!("terrain reload rejected: {}", e),
                }
            }
        }

        let (x, z) = subject_at(step, args.speed);
        if last_reconcile.is_none_or(|t| t.elapsed() >= reconcile_every) {
            scheduler.reconcile_around(x, z);
            last_reconcile = Some(Instant::now());
        }
        scheduler.pump();
        scheduler.retry_mesh_handoffs();

        for event in event_rx.try_iter() {
            match event {
                ChunkEvent::TerrainReady { generation } => log::info!(
                    "terrain ready after {:.0?}: {} chunks (generation {})",
                    started.elapsed(),
                    scheduler.loaded_len(),
                    generation
                ),
                ChunkEvent::Failed { key, message, .. } => {
                    log::warn!("chunk {} failed: {}", key, message)
                }
                other => log::trace!(target: "stream", "{:?}", other),
            }
        }

        if step % 120 == 0 {
            let (queued, inflight) = scheduler.dispatcher().queue_debug_counts();
            log::debug!(
                "step {} subject ({:.0}, {:.0}) | loaded {} pending {} assigned {} | worker queue {} inflight {}",
                step,
                x,
                z,
                scheduler.loaded_len(),
                scheduler.pending_len(),
                scheduler.assigned_len(),
                queued,
                inflight
            );
        }

        if let Some(rest) = STEP.checked_sub(frame.elapsed()) {
            thread::sleep(rest);
        }
    }

    let stats = scheduler.stats();
    log::info!(
        "done: {} requested, {} loaded, {} unloaded, {} canceled, {} failed, {} stale",
        stats.requested,
        stats.loaded,
        stats.unloaded,
        stats.canceled,
        stats.failed,
        stats.stale
    );
    Ok(())
}
