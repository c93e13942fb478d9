use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use finite_engine::World;
use finite_engine::fluid::FluidError;
use finite_engine::rain::{LAST_RAIN_PASS_KEY, Precipitation};
use finite_engine::world::block::Layer;
use finite_engine::world::position::{BlockPos, ChunkPos};
use finite_water_server::block::{self, standard_registry};
use finite_water_server::config::ServerConfig;
use finite_water_server::host::Host;
use finite_water_server::metrics::fluid_volume;
use finite_water_server::persistence;
use finite_water_server::worldgen;
use tokio::sync::watch;

/// How long shutdown waits for the rain thread to pause.
const SUSPEND_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let demo_mode = std::env::args().any(|a| a == "--demo");
    let config_path: PathBuf = std::env::args()
        .skip_while(|a| a != "--config")
        .nth(1)
        .unwrap_or_else(|| "finite-water.toml".into())
        .into();
    let world_arg: Option<PathBuf> = std::env::args()
        .skip_while(|a| a != "--world")
        .nth(1)
        .map(Into::into);
    let max_ticks: Option<u64> = std::env::args()
        .skip_while(|a| a != "--ticks")
        .nth(1)
        .and_then(|s| s.parse().ok());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let mut config = ServerConfig::load(&config_path)?;
    if let Some(dir) = world_arg {
        config.world.dir = dir;
    }

    if demo_mode {
        return run_demo(config);
    }

    tracing::info!("Finite water -- headless simulation host");

    // ── Generate base world, then overlay saved chunks ───────────────────
    let world_dir = config.world.dir.clone();
    let registry = Arc::new(standard_registry());
    let world = Arc::new(World::with_height(registry, config.world.map_height));
    tracing::info!("Generating flat world...");
    worldgen::generate_flat(&world, config.world.chunk_radius);
    tracing::info!("Base world ready: {} chunks", world.chunk_count());

    match persistence::load_into(&world, &world_dir) {
        Ok(0) => tracing::info!("No saved chunks found"),
        Ok(n) => tracing::info!("Loaded {} saved chunks from {}", n, world_dir.display()),
        Err(e) => tracing::error!("Failed to load saved chunks: {:#}", e),
    }
    let meta = match persistence::load_level_meta(&world_dir) {
        Ok(meta) => meta,
        Err(e) => {
            tracing::error!("Failed to load level metadata: {:#}", e);
            None
        }
    };

    let autosave_secs = config.world.autosave_secs;
    let mut host = Host::build(config, Arc::clone(&world), meta)?;
    host.start_rain_thread()?;

    // ── Periodic autosave ────────────────────────────────────────────────
    if autosave_secs > 0 {
        let save_world_ref = Arc::clone(&world);
        let save_dir = world_dir.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(autosave_secs));
            interval.tick().await; // first tick is immediate, skip it
            loop {
                interval.tick().await;
                tracing::info!("Autosaving...");
                match persistence::save_world(&save_world_ref, &save_dir) {
                    Ok(n) => tracing::info!("Autosave complete: {} chunks", n),
                    Err(e) => tracing::error!("Autosave failed: {:#}", e),
                }
            }
        });
    }

    // ── Run the timeline until Ctrl+C or the tick limit ─────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Ctrl+C received, shutting down...");
            let _ = shutdown_tx.send(true);
        }
    });

    host.timeline.run(max_ticks, shutdown_rx).await;

    // ── Stop the rain thread, then save ──────────────────────────────────
    if let Err(e) = host.stop_rain(SUSPEND_TIMEOUT) {
        tracing::error!("Rain worker shutdown failed: {:#}", e);
    }

    tracing::info!("Saving world before exit...");
    match host.save(&world_dir) {
        Ok(n) => tracing::info!("Shutdown save complete: {} chunks written", n),
        Err(e) => tracing::error!("Shutdown save failed: {:#}", e),
    }
    Ok(())
}

/// Scripted scenario: fill a basin, spill onto a slab ledge into a pit, then
/// let rain fall on it. Prints a cross-section of fluid levels at the end.
fn run_demo(config: ServerConfig) -> Result<()> {
    tracing::info!("Finite water -- demo");

    let world = Arc::new(World::with_height(Arc::new(standard_registry()), config.world.map_height));
    worldgen::generate_flat(&world, 1);
    let basin = worldgen::demo_features(&world);
    tracing::info!("World ready: {} chunks loaded", world.chunk_count());

    let mut host = Host::build(config, Arc::clone(&world), None)?;

    // ── Pour into the basin and let it settle ────────────────────────────
    let spout = BlockPos::new(basin.x + 3, basin.y + 2, basin.z + 3);
    let spill = BlockPos::new(14, basin.y + 1, 8);
    let units = 150;
    let placed = host.with_fluid(|sim, world| {
        let basin_fill = sim.add_fluid(world, spout, units)?;
        let ledge_fill = sim.add_fluid(world, spill, 10)?;
        Ok::<_, FluidError>(basin_fill.placed + ledge_fill.placed)
    })?;
    tracing::info!("Poured {} units ({} requested)", placed, units + 10);

    let ticks = settle(&mut host, 2_000);
    let volume = fluid_volume(&world, &host.codec);
    let evaporated = host.metrics.snapshot(world.chunk_count() as u64).evaporations;
    tracing::info!(
        "Settled after {} ticks, {} units in the world, {} evaporated",
        ticks,
        volume,
        evaporated
    );
    if volume + evaporated != placed as u64 {
        tracing::warn!("Volume drifted while settling: {} placed, {} accounted for", placed, volume + evaporated);
    }

    // ── Rain on the origin chunk ─────────────────────────────────────────
    host.weather.set_region(ChunkPos::new(0, 0).region(host.rain.region_size()), Precipitation::rain(30.0));
    world.set_chunk_moddata(ChunkPos::new(0, 0), LAST_RAIN_PASS_KEY, -2.0);
    host.rain.sweep();
    let report = host.rain.drain(host.rain.config().drain_batch);
    tracing::info!("Rain pass: {} chunks, {} placements", report.records, report.placed);
    let ticks = settle(&mut host, 2_000);
    tracing::info!(
        "Settled after {} ticks, {} units in the world",
        ticks,
        fluid_volume(&world, &host.codec)
    );

    // ── Cross-section through the basin, ledge and pit ───────────────────
    let z = basin.z + 4;
    for y in (worldgen::SURFACE_Y - 2..=basin.y + 3).rev() {
        let row: String = (basin.x - 1..22)
            .map(|x| cell_glyph(&world, &host, BlockPos::new(x, y, z)))
            .collect();
        println!("{:>3} {}", y, row);
    }
    Ok(())
}

/// Step the timeline until the fluid is quiet or `max_ticks` pass.
fn settle(host: &mut Host, max_ticks: usize) -> usize {
    for tick in 0..max_ticks {
        host.timeline.step();
        if host.pending_rechecks() == 0 {
            return tick + 1;
        }
    }
    max_ticks
}

fn cell_glyph(world: &World, host: &Host, pos: BlockPos) -> char {
    let fluid = world.get_block(pos, Layer::Fluid);
    if let Ok(level @ 1..) = host.codec.block_to_level(fluid) {
        return char::from_digit(level as u32, 10).unwrap_or('?');
    }
    match world.get_block(pos, Layer::Solid) {
        block::AIR => '.',
        block::SLAB => '_',
        _ => '#',
    }
}
