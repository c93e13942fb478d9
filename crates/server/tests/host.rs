//! The assembled host: rain flowing into the fluid layer, shutdown and saving.

use std::sync::Arc;
use std::time::{Duration, Instant};

use finite_engine::World;
use finite_engine::rain::{Calendar, LAST_RAIN_PASS_KEY, Precipitation};
use finite_engine::world::block::Layer;
use finite_engine::world::position::{BlockPos, ChunkPos};
use finite_water_server::block::{self, standard_registry};
use finite_water_server::config::ServerConfig;
use finite_water_server::host::Host;
use finite_water_server::metrics::fluid_volume;
use finite_water_server::persistence::{self, LevelMeta};
use finite_water_server::worldgen::{self, SURFACE_Y};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Deterministic config: no spontaneous weather, no evaporation, fast rain.
fn quiet_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.world.random_ticks_per_chunk = 0;
    config.weather.rain_start_chance = 0.0;
    config.weather.rain_stop_chance = 0.0;
    config.rain.sweep_interval_ms = 100;
    config.rain.drain_interval_ms = 50;
    config
}

fn flat_host(config: ServerConfig) -> Host {
    let world = Arc::new(World::new(Arc::new(standard_registry())));
    worldgen::generate_flat(&world, 1);
    Host::build(config, world, None).unwrap()
}

fn scratch_dir(name: &str) -> std::path::PathBuf {
    let tmp = std::env::temp_dir().join(format!("finite_water_host_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&tmp);
    tmp
}

// ---------------------------------------------------------------------------
// Rain into fluid
// ---------------------------------------------------------------------------

#[test]
fn rain_lands_on_the_surface_and_settles() {
    let mut host = flat_host(quiet_config());
    let origin = ChunkPos::new(0, 0);
    host.weather
        .set_region(origin.region(host.rain.region_size()), Precipitation::rain(30.0));
    host.world.set_chunk_moddata(origin, LAST_RAIN_PASS_KEY, -5.0);

    for _ in 0..200 {
        host.timeline.step();
    }

    let snapshot = host.metrics.snapshot(host.world.chunk_count() as u64);
    assert!(snapshot.rain_placements > 0);
    assert_eq!(snapshot.conservation_anomalies, 0);
    assert_eq!(fluid_volume(&host.world, &host.codec), snapshot.rain_placements);
    assert_eq!(host.pending_rechecks(), 0);

    // Only the forced region rained, and its pass was stamped.
    let stamp = host.world.chunk_moddata(origin, LAST_RAIN_PASS_KEY).unwrap();
    assert!(stamp >= 0.0 && stamp <= host.calendar.total_hours());
    assert_eq!(host.world.chunk_moddata(ChunkPos::new(-1, -1), LAST_RAIN_PASS_KEY), None);

    // Every unit sits directly on the terrain.
    for x in 0..32 {
        for z in 0..32 {
            let above = BlockPos::new(x, SURFACE_Y + 2, z);
            assert_eq!(host.world.get_block(above, Layer::Fluid), block::AIR);
        }
    }
}

#[test]
fn placements_arm_the_fluid_layer() {
    let mut host = flat_host(quiet_config());
    let pos = BlockPos::new(10, SURFACE_Y + 3, 10);
    let placed = host.with_fluid(|sim, world| sim.add_fluid(world, pos, 4)).unwrap();
    assert_eq!(placed.placed, 4);
    assert!(host.pending_rechecks() > 0);

    for _ in 0..100 {
        host.timeline.step();
    }
    assert_eq!(host.pending_rechecks(), 0);
    assert_eq!(fluid_volume(&host.world, &host.codec), 4);

    // The column fell and spread into single units on the terrain.
    let mut on_ground = 0;
    for x in 8..=12 {
        for z in 8..=12 {
            if host.world.get_block(BlockPos::new(x, SURFACE_Y + 1, z), Layer::Fluid) == block::water(1) {
                on_ground += 1;
            }
        }
    }
    assert_eq!(on_ground, 4);
}

#[test]
fn thread_rain_reaches_the_world_through_the_fluid_layer() {
    let mut config = quiet_config();
    config.rain.background_thread = true;
    // Only the thread consumes the queue.
    config.rain.drain_interval_ms = 3_600_000;
    let mut host = flat_host(config);
    let origin = ChunkPos::new(0, 0);
    host.weather
        .set_region(origin.region(host.rain.region_size()), Precipitation::rain(30.0));
    host.world.set_chunk_moddata(origin, LAST_RAIN_PASS_KEY, -5.0);
    host.start_rain_thread().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        host.timeline.step();
        let snapshot = host.metrics.snapshot(host.world.chunk_count() as u64);
        if snapshot.rain_placements > 0 && host.rain.pending_drops() == 0 && host.pending_rechecks() == 0 {
            break;
        }
        assert!(Instant::now() < deadline, "thread rain never settled");
        std::thread::sleep(Duration::from_millis(2));
    }
    host.stop_rain(Duration::from_secs(5)).unwrap();

    let snapshot = host.metrics.snapshot(host.world.chunk_count() as u64);
    assert_eq!(snapshot.rain_records, 0);
    assert_eq!(snapshot.conservation_anomalies, 0);
    assert_eq!(fluid_volume(&host.world, &host.codec), snapshot.rain_placements);
    assert_eq!(host.rain.stats().placements, snapshot.rain_placements);
}

#[test]
fn build_rejects_a_zero_default_region_size() {
    let mut config = quiet_config();
    config.rain.default_region_size = 0;
    let world = Arc::new(World::new(Arc::new(standard_registry())));
    assert!(Host::build(config, world, None).is_err());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn shutdown_handshake_joins_the_rain_thread() {
    let mut config = quiet_config();
    config.rain.background_thread = true;
    let mut host = flat_host(config);
    host.start_rain_thread().unwrap();
    assert!(host.has_rain_thread());

    host.stop_rain(Duration::from_secs(5)).unwrap();
    assert!(!host.has_rain_thread());
    assert!(!host.rain.is_thread_running());
}

#[test]
fn stop_without_a_thread_is_immediate() {
    let mut host = flat_host(quiet_config());
    assert!(!host.has_rain_thread());
    host.stop_rain(Duration::from_millis(1)).unwrap();
}

#[test]
fn save_restores_calendar_and_rain_settings() {
    let mut host = flat_host(quiet_config());
    host.rain.set_enabled(false);
    for _ in 0..40 {
        host.timeline.step();
    }
    let hours = host.calendar.total_hours();
    assert!(hours > 0.0);

    let tmp = scratch_dir("meta");
    host.save(&tmp).unwrap();
    let meta = persistence::load_level_meta(&tmp).unwrap().unwrap();
    assert_eq!(
        meta,
        LevelMeta {
            total_hours: hours,
            region_size: 16,
            rain_enabled: false,
        }
    );

    let world = Arc::new(World::new(Arc::new(standard_registry())));
    let restored = Host::build(quiet_config(), world, Some(meta)).unwrap();
    assert_eq!(restored.calendar.total_hours(), hours);
    assert!(!restored.rain.is_enabled());

    let _ = std::fs::remove_dir_all(&tmp);
}
