//! The rain accumulation worker.
//!
//! A slow producer ([`RainWorker::sweep`]) enqueues one record per loaded
//! chunk; a bounded consumer ([`RainWorker::drain`]) turns each record into a
//! handful of one-level placements on the chunk's surface. The consumer runs
//! on the main timeline and, optionally, on a dedicated thread as well. Both
//! share the same [`PendingChunks`] queue.
//!
//! Only the main-timeline consumer writes blocks. The thread picks the cells
//! of each pass and hands them over as drops ([`RainWorker::take_drops`]);
//! the main timeline adds them through the leveling engine, so a thread
//! write can never interleave with a buffered fluid pass.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::queue::{ChunkUpdateRecord, PendingChunks};
use super::weather::{Calendar, PrecipitationSource};
use crate::config::RainConfig;
use crate::fluid::{FluidError, LevelCodec, MAX_LEVEL};
use crate::world::World;
use crate::world::access::{BulkAccess, GridAccess};
use crate::world::block::Layer;
use crate::world::chunk::COLUMN_COUNT;
use crate::world::position::BlockPos;

/// Per-chunk metadata key holding the calendar hour of the last rain pass.
pub const LAST_RAIN_PASS_KEY: &str = "lastRainAccumUpdateTotalHours";

/// Answer to a host suspend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendState {
    Ready,
    Wait,
}

/// What happened to one dequeued record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Less than the minimum gap since the chunk's last pass.
    RateLimited,
    NotRaining,
    /// The chunk is no longer loaded.
    Unloaded,
    /// Positions that received one level.
    Placed(Vec<BlockPos>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainReport {
    pub records: usize,
    /// Units placed; for [`RainWorker::drain_deferred`], drops queued.
    pub placed: usize,
    pub committed: usize,
}

#[derive(Default)]
struct RainStats {
    sweeps: AtomicU64,
    records: AtomicU64,
    rate_limited: AtomicU64,
    not_raining: AtomicU64,
    placements: AtomicU64,
}

/// Point-in-time copy of the worker's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RainStatsSnapshot {
    pub sweeps: u64,
    pub records: u64,
    pub rate_limited: u64,
    pub not_raining: u64,
    pub placements: u64,
}

pub struct RainWorker {
    world: Arc<World>,
    codec: LevelCodec,
    precipitation: Arc<dyn PrecipitationSource>,
    calendar: Arc<dyn Calendar>,
    config: RainConfig,
    queue: PendingChunks,
    /// Precomputed permutations of the column indices `0..COLUMN_COUNT`.
    shuffles: Vec<Vec<u16>>,
    rng: Mutex<StdRng>,
    region_size: AtomicI32,

    enabled: AtomicBool,
    process_chunks: AtomicBool,
    should_pause: AtomicBool,
    is_paused: AtomicBool,
    shutting_down: AtomicBool,
    thread_running: AtomicBool,

    placed_tx: Sender<BlockPos>,
    placed_rx: Receiver<BlockPos>,
    drops_tx: Sender<BlockPos>,
    drops_rx: Receiver<BlockPos>,
    stats: RainStats,
}

/// The cells a rain pass should add one level to, or why it skipped.
enum Targets {
    Skip(RecordOutcome),
    Cells(Vec<BlockPos>),
}

impl RainWorker {
    pub fn new(
        world: Arc<World>,
        codec: LevelCodec,
        precipitation: Arc<dyn PrecipitationSource>,
        calendar: Arc<dyn Calendar>,
        config: RainConfig,
    ) -> Self {
        let shuffles = build_shuffles(config.shuffle_tables.max(1), config.seed);
        let (placed_tx, placed_rx) = crossbeam_channel::unbounded();
        let (drops_tx, drops_rx) = crossbeam_channel::unbounded();
        let default_region_size = valid_region_size(config.default_region_size, DEFAULT_REGION_SIZE);
        Self {
            world,
            codec,
            precipitation,
            calendar,
            rng: Mutex::new(StdRng::seed_from_u64(config.seed.wrapping_add(1))),
            region_size: AtomicI32::new(default_region_size),
            enabled: AtomicBool::new(config.enabled),
            process_chunks: AtomicBool::new(config.process_chunks),
            should_pause: AtomicBool::new(false),
            is_paused: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            thread_running: AtomicBool::new(false),
            config,
            queue: PendingChunks::new(),
            shuffles,
            placed_tx,
            placed_rx,
            drops_tx,
            drops_rx,
            stats: RainStats::default(),
        }
    }

    pub fn config(&self) -> &RainConfig {
        &self.config
    }

    pub fn queue(&self) -> &PendingChunks {
        &self.queue
    }

    pub fn shuffle_tables(&self) -> &[Vec<u16>] {
        &self.shuffles
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn set_process_chunks(&self, on: bool) {
        self.process_chunks.store(on, Ordering::Release);
    }

    pub fn region_size(&self) -> i32 {
        self.region_size.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> RainStatsSnapshot {
        RainStatsSnapshot {
            sweeps: self.stats.sweeps.load(Ordering::Relaxed),
            records: self.stats.records.load(Ordering::Relaxed),
            rate_limited: self.stats.rate_limited.load(Ordering::Relaxed),
            not_raining: self.stats.not_raining.load(Ordering::Relaxed),
            placements: self.stats.placements.load(Ordering::Relaxed),
        }
    }

    /// Positions that received rain since the last call. The fluid side must
    /// arm a recheck for each.
    pub fn take_placed(&self) -> Vec<BlockPos> {
        self.placed_rx.try_iter().collect()
    }

    pub fn placed_receiver(&self) -> &Receiver<BlockPos> {
        &self.placed_rx
    }

    /// Cells the background thread chose since the last call, one level
    /// each. The caller adds them through the leveling engine.
    pub fn take_drops(&self) -> Vec<BlockPos> {
        self.drops_rx.try_iter().collect()
    }

    pub fn pending_drops(&self) -> usize {
        self.drops_rx.len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────────

    /// Resolve per-save settings. A region size of 0 or less falls back to
    /// the default.
    pub fn on_save_loaded(&self, region_size: i32, enabled: bool) {
        let fallback = valid_region_size(self.config.default_region_size, DEFAULT_REGION_SIZE);
        let size = if region_size <= 0 {
            tracing::warn!(
                "Region size was {} for the rain water system, using {}",
                region_size,
                fallback
            );
            fallback
        } else {
            region_size
        };
        self.region_size.store(size, Ordering::Release);
        self.set_enabled(enabled);
        tracing::info!("Rain water system loaded (enabled: {}, region size: {})", enabled, size);
    }

    /// Ask the worker to pause. `Ready` once the background thread has gone
    /// idle, or right away if there is no thread or the worker is disabled.
    pub fn on_suspend(&self) -> SuspendState {
        self.should_pause.store(true, Ordering::Release);
        if !self.thread_running.load(Ordering::Acquire)
            || self.is_paused.load(Ordering::Acquire)
            || !self.is_enabled()
        {
            SuspendState::Ready
        } else {
            SuspendState::Wait
        }
    }

    pub fn on_resume(&self) {
        self.should_pause.store(false, Ordering::Release);
    }

    /// Ask the background thread to exit after its current batch.
    pub fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::Release);
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::Acquire)
    }

    pub fn is_thread_running(&self) -> bool {
        self.thread_running.load(Ordering::Acquire)
    }

    // ── Producer ────────────────────────────────────────────────────────

    /// Enqueue every loaded chunk (in random order) that is not already
    /// pending. Returns how many records were added.
    pub fn sweep(&self) -> usize {
        if !self.process_chunks.load(Ordering::Acquire) || !self.is_enabled() {
            return 0;
        }

        let mut chunks = self.world.loaded_chunks();
        {
            let mut rng = self.rng.lock().expect("rain rng poisoned");
            chunks.shuffle(&mut *rng);
        }

        let records: Vec<ChunkUpdateRecord> = chunks
            .par_iter()
            .map(|&coords| ChunkUpdateRecord {
                coords,
                last_pass_hours: self.world.chunk_moddata(coords, LAST_RAIN_PASS_KEY).unwrap_or(0.0),
            })
            .collect();

        let added = records.into_iter().filter(|&r| self.queue.push(r)).count();
        self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
        tracing::trace!("Rain sweep queued {} chunks ({} pending)", added, self.queue.len());
        added
    }

    // ── Consumer ────────────────────────────────────────────────────────

    /// Process up to `max` pending records and commit their placements.
    /// Main timeline only.
    pub fn drain(&self, max: usize) -> DrainReport {
        let batch = self.queue.pop_batch(max);
        if batch.is_empty() {
            return DrainReport::default();
        }

        let mut report = DrainReport::default();
        let mut placed = Vec::new();
        let mut bulk = BulkAccess::new(&self.world);
        for record in batch {
            report.records += 1;
            match self.process_record(&mut bulk, record) {
                Ok(RecordOutcome::Placed(positions)) => placed.extend(positions),
                Ok(_) => {}
                Err(e) => tracing::warn!("Rain pass for chunk {:?} failed: {}", record.coords, e),
            }
        }
        report.committed = bulk.commit();
        report.placed = placed.len();

        for pos in placed {
            // The receiver lives as long as `self`.
            let _ = self.placed_tx.send(pos);
        }
        report
    }

    /// Apply one rain pass to the record's chunk through `grid`.
    pub fn process_record<G: GridAccess>(
        &self,
        grid: &mut G,
        record: ChunkUpdateRecord,
    ) -> Result<RecordOutcome, FluidError> {
        let cells = match self.rain_targets(record) {
            Targets::Skip(outcome) => return Ok(outcome),
            Targets::Cells(cells) => cells,
        };

        let mut placed = Vec::with_capacity(cells.len());
        for pos in cells {
            if let Some(filled) = self.add_one_level(grid, pos)? {
                placed.push(filled);
            }
        }
        self.stats.placements.fetch_add(placed.len() as u64, Ordering::Relaxed);
        Ok(RecordOutcome::Placed(placed))
    }

    /// Rate limit, sky check and column choice for one record. A raining
    /// pass stamps the chunk; no block is touched.
    fn rain_targets(&self, record: ChunkUpdateRecord) -> Targets {
        let coords = record.coords;
        if !self.world.has_chunk(coords) {
            return Targets::Skip(RecordOutcome::Unloaded);
        }
        self.stats.records.fetch_add(1, Ordering::Relaxed);

        let now = self.calendar.total_hours();
        if (now - record.last_pass_hours).abs() < self.config.min_hours_between_passes {
            self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Targets::Skip(RecordOutcome::RateLimited);
        }

        let corner = coords.block_origin(0);
        let region = coords.region(self.region_size());
        let precipitation = self.precipitation.precipitation_at(corner, region);
        if !precipitation.is_raining() {
            self.stats.not_raining.fetch_add(1, Ordering::Relaxed);
            return Targets::Skip(RecordOutcome::NotRaining);
        }

        let table = {
            let mut rng = self.rng.lock().expect("rain rng poisoned");
            &self.shuffles[rng.gen_range(0..self.shuffles.len())]
        };
        let sections = rain_sections(precipitation.intensity, table.len());
        let max_y = self.world.map_height() - 1;

        let mut cells = Vec::with_capacity(sections);
        for &column in &table[..sections] {
            let Some(surface) = self.world.rain_height(coords, column as usize) else {
                break;
            };
            let y = surface.saturating_add(1).clamp(0, max_y);
            cells.push(coords.column_pos(column as usize, y));
        }

        self.world.set_chunk_moddata(coords, LAST_RAIN_PASS_KEY, now);
        Targets::Cells(cells)
    }

    /// One level at `pos`. A full cell passes the unit on to the cell above,
    /// repeatedly; a solid, foreign-fluid or unloaded cell loses it. Returns
    /// the cell that took the unit.
    fn add_one_level<G: GridAccess>(&self, grid: &mut G, pos: BlockPos) -> Result<Option<BlockPos>, FluidError> {
        let mut pos = pos;
        loop {
            if !grid.is_loaded(pos) || !grid.get_block(pos, Layer::Solid).is_air() {
                return Ok(None);
            }
            let existing = grid.get_block(pos, Layer::Fluid);
            if !existing.is_air() && !self.codec.is_family(existing) {
                return Ok(None);
            }
            let level = self.codec.block_to_level(existing)?;
            if level < MAX_LEVEL {
                let block = self.codec.level_to_block(level as i32 + 1)?;
                grid.set_block(block, pos, Layer::Fluid);
                return Ok(Some(pos));
            }
            pos = pos.up();
        }
    }

    /// Thread-side consumer: picks the cells of up to `max` records and
    /// queues them as drops instead of writing.
    pub fn drain_deferred(&self, max: usize) -> DrainReport {
        let mut report = DrainReport::default();
        for record in self.queue.pop_batch(max) {
            report.records += 1;
            if let Targets::Cells(cells) = self.rain_targets(record) {
                report.placed += cells.len();
                for pos in cells {
                    // The receiver lives as long as `self`.
                    let _ = self.drops_tx.send(pos);
                }
            }
        }
        self.stats.placements.fetch_add(report.placed as u64, Ordering::Relaxed);
        report
    }

    // ── Background thread ───────────────────────────────────────────────

    /// Start the dedicated drain thread. It runs until [`shutdown`](Self::shutdown).
    pub fn spawn_thread(self: &Arc<Self>) -> std::io::Result<JoinHandle<()>> {
        let worker = Arc::clone(self);
        self.thread_running.store(true, Ordering::Release);
        let spawned = std::thread::Builder::new()
            .name("rain-water-updater".to_string())
            .spawn(move || worker.thread_loop());
        if spawned.is_err() {
            self.thread_running.store(false, Ordering::Release);
        }
        spawned
    }

    fn thread_loop(&self) {
        tracing::info!("Rain water thread started");
        let poll = Duration::from_millis(self.config.thread_poll_ms);
        while !self.shutting_down.load(Ordering::Acquire) {
            std::thread::sleep(poll);
            if self.should_pause.load(Ordering::Acquire) {
                self.is_paused.store(true, Ordering::Release);
                continue;
            }
            self.is_paused.store(false, Ordering::Release);
            self.drain_deferred(self.config.thread_batch);
        }
        self.thread_running.store(false, Ordering::Release);
        tracing::info!("Rain water thread stopped");
    }
}

/// Region size used when neither the save nor the config has a usable one.
pub const DEFAULT_REGION_SIZE: i32 = 16;

fn valid_region_size(size: i32, fallback: i32) -> i32 {
    if size > 0 { size } else { fallback }
}

/// Number of columns that receive rain at `intensity` (0..=100).
pub fn rain_sections(intensity: f32, columns: usize) -> usize {
    let n = (intensity as f64 / 100.0 * columns as f64).ceil();
    (n.max(0.0) as usize).min(columns)
}

/// `count` independent permutations of the column indices of a chunk.
pub fn build_shuffles(count: usize, seed: u64) -> Vec<Vec<u16>> {
    (0..count)
        .into_par_iter()
        .map(|i| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            let mut table: Vec<u16> = (0..COLUMN_COUNT as u16).collect();
            table.shuffle(&mut rng);
            table
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_round_up() {
        assert_eq!(rain_sections(10.0, 1024), 103);
        assert_eq!(rain_sections(100.0, 1024), 1024);
        assert_eq!(rain_sections(150.0, 1024), 1024);
        assert_eq!(rain_sections(0.0, 1024), 0);
    }

    #[test]
    fn shuffles_are_permutations_and_deterministic() {
        let a = build_shuffles(3, 7);
        let b = build_shuffles(3, 7);
        assert_eq!(a, b);
        assert_ne!(a[0], a[1]);
        let mut sorted = a[2].clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..COLUMN_COUNT as u16).collect::<Vec<_>>());
    }
}
