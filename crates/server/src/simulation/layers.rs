//! The host's simulation layers.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use finite_engine::fluid::FluidError;
use finite_engine::rain::RainWorker;
use finite_engine::world::World;
use finite_engine::world::chunk::{COLUMN_COUNT, NO_SURFACE};
use finite_engine::world::position::BlockPos;
use finite_engine::FluidSimulation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{SimulationLayer, TickContext};
use crate::calendar::GameCalendar;
use crate::metrics::Metrics;
use crate::weather::WeatherSystem;

// ── Fluid ────────────────────────────────────────────────────────────────────

/// The fluid simulation, shared between its layer and the host's direct
/// callers (placement, demo scripting). Only the timeline thread locks it.
pub type SharedFluid = Arc<Mutex<FluidSimulation>>;

/// Settles fluid every tick.
///
/// Before the leveling tick it arms rechecks for every position the rain
/// worker filled since the last tick and adds the rain thread's drops, then
/// hands out evaporation random ticks to a few surface cells per loaded chunk.
pub struct FluidLayer {
    sim: SharedFluid,
    rain: Option<Arc<RainWorker>>,
    rng: StdRng,
    random_ticks_per_chunk: usize,
}

impl FluidLayer {
    pub fn new(sim: SharedFluid) -> Self {
        Self {
            sim,
            rain: None,
            rng: StdRng::seed_from_u64(0),
            random_ticks_per_chunk: 0,
        }
    }

    pub fn with_rain(mut self, worker: Arc<RainWorker>) -> Self {
        self.rain = Some(worker);
        self
    }

    pub fn with_random_ticks(mut self, per_chunk: usize, seed: u64) -> Self {
        self.random_ticks_per_chunk = per_chunk;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }
}

/// Arm rechecks for the rain worker's placements and add the thread's drops
/// through the engine. Returns how many positions were handled.
fn accept_rain(sim: &mut FluidSimulation, rain: &RainWorker, ctx: &TickContext<'_>) -> Result<usize, FluidError> {
    let placed = rain.take_placed();
    if !placed.is_empty() {
        let (_, report) = sim.with_pass(ctx.world, |pass| {
            for &pos in &placed {
                pass.on_placed(pos);
            }
        });
        ctx.metrics.record_pass(&report);
    }
    let dropped = apply_rain_drops(sim, ctx.world, rain, ctx.metrics)?;
    Ok(placed.len() + dropped)
}

/// Add one level per pending drop of the rain thread, overflowing upward
/// like any external placement. Returns the number of drops.
pub fn apply_rain_drops(
    sim: &mut FluidSimulation,
    world: &World,
    rain: &RainWorker,
    metrics: &Metrics,
) -> Result<usize, FluidError> {
    let drops = rain.take_drops();
    if drops.is_empty() {
        return Ok(0);
    }
    let (added, report) = sim.with_pass(world, |pass| {
        drops
            .iter()
            .try_fold(0u64, |n, &pos| Ok::<_, FluidError>(n + pass.add_fluid(pos, 1)?.placed as u64))
    });
    metrics.record_pass(&report);
    metrics.record_rain_drops(added?);
    Ok(drops.len())
}

fn random_ticks(
    sim: &mut FluidSimulation,
    samples: Vec<(BlockPos, f64)>,
    ctx: &TickContext<'_>,
) -> Result<usize, FluidError> {
    if samples.is_empty() {
        return Ok(0);
    }
    let (evaporated, report) = sim.with_pass(ctx.world, |pass| {
        samples
            .into_iter()
            .try_fold(0, |n, (pos, roll)| Ok(n + pass.evaporate(pos, roll)? as usize))
    });
    ctx.metrics.record_pass(&report);
    evaporated
}

/// Surface cells (topmost non-air per column) of random columns, each with a roll in 0..1.
fn sample_surfaces(world: &World, per_chunk: usize, rng: &mut StdRng) -> Vec<(BlockPos, f64)> {
    if per_chunk == 0 {
        return Vec::new();
    }
    let mut samples = Vec::with_capacity(world.chunk_count() * per_chunk);
    for entry in world.iter_chunks() {
        let chunk_pos = *entry.key();
        for _ in 0..per_chunk {
            let index = rng.gen_range(0..COLUMN_COUNT);
            let height = entry.value().rain_height(index);
            if height == NO_SURFACE {
                continue;
            }
            samples.push((chunk_pos.column_pos(index, height), rng.r#gen::<f64>()));
        }
    }
    samples
}

impl SimulationLayer for FluidLayer {
    fn name(&self) -> &'static str {
        "fluid"
    }

    fn interval(&self) -> Duration {
        Duration::ZERO
    }

    fn tick(&mut self, ctx: &TickContext<'_>) -> anyhow::Result<()> {
        let samples = sample_surfaces(ctx.world, self.random_ticks_per_chunk, &mut self.rng);
        let mut sim = self.sim.lock().expect("fluid simulation lock poisoned");

        if let Some(rain) = &self.rain {
            match accept_rain(&mut sim, rain, ctx) {
                Ok(0) => {}
                Ok(accepted) => tracing::trace!("Accepted {} rain placements", accepted),
                Err(e) => {
                    ctx.metrics.record_fluid_error();
                    return Err(e.into());
                }
            }
        }

        let evaporated = random_ticks(&mut sim, samples, ctx);

        let start = Instant::now();
        let ticked = sim.tick(ctx.world, ctx.elapsed_ms);
        ctx.metrics.set_pending_rechecks(sim.pending() as u64);

        let report = match ticked {
            Ok(report) => report,
            Err(e) => {
                ctx.metrics.record_fluid_error();
                return Err(e.into());
            }
        };
        ctx.metrics.record_fluid_tick(&report, start.elapsed());
        if report.mutations > 0 {
            tracing::debug!(
                "Fluid tick: {} evaluations, {} mutations, {} pending",
                report.evaluations,
                report.mutations,
                sim.pending()
            );
        }

        if let Err(e) = evaporated {
            ctx.metrics.record_fluid_error();
            return Err(e.into());
        }
        Ok(())
    }
}

// ── Rain ─────────────────────────────────────────────────────────────────────

/// Enqueues every loaded chunk for a rain pass.
pub struct RainSweepLayer {
    worker: Arc<RainWorker>,
    interval: Duration,
}

impl RainSweepLayer {
    pub fn new(worker: Arc<RainWorker>) -> Self {
        let interval = Duration::from_millis(worker.config().sweep_interval_ms);
        Self { worker, interval }
    }
}

impl SimulationLayer for RainSweepLayer {
    fn name(&self) -> &'static str {
        "rain-sweep"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn tick(&mut self, ctx: &TickContext<'_>) -> anyhow::Result<()> {
        let queued = self.worker.sweep();
        ctx.metrics.record_sweep();
        if queued > 0 {
            tracing::debug!("Rain sweep queued {} chunks", queued);
        }
        Ok(())
    }
}

/// Processes a bounded batch of queued chunks on the timeline.
pub struct RainDrainLayer {
    worker: Arc<RainWorker>,
    interval: Duration,
    batch: usize,
}

impl RainDrainLayer {
    pub fn new(worker: Arc<RainWorker>) -> Self {
        let interval = Duration::from_millis(worker.config().drain_interval_ms);
        let batch = worker.config().drain_batch;
        Self { worker, interval, batch }
    }
}

impl SimulationLayer for RainDrainLayer {
    fn name(&self) -> &'static str {
        "rain-drain"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn tick(&mut self, ctx: &TickContext<'_>) -> anyhow::Result<()> {
        if self.worker.queue().is_empty() {
            return Ok(());
        }
        let report = self.worker.drain(self.batch);
        ctx.metrics.record_drain(&report);
        if report.placed > 0 {
            tracing::debug!("Rain drain: {} chunks, {} placements", report.records, report.placed);
        }
        Ok(())
    }
}

// ── Weather ──────────────────────────────────────────────────────────────────

/// Moves the calendar forward and steps the weather.
pub struct WeatherLayer {
    weather: Arc<WeatherSystem>,
    calendar: Arc<GameCalendar>,
    worker: Arc<RainWorker>,
    interval: Duration,
}

impl WeatherLayer {
    pub fn new(
        weather: Arc<WeatherSystem>,
        calendar: Arc<GameCalendar>,
        worker: Arc<RainWorker>,
        interval: Duration,
    ) -> Self {
        Self {
            weather,
            calendar,
            worker,
            interval,
        }
    }
}

impl SimulationLayer for WeatherLayer {
    fn name(&self) -> &'static str {
        "weather"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn tick(&mut self, ctx: &TickContext<'_>) -> anyhow::Result<()> {
        self.calendar.advance(ctx.elapsed_ms);
        let raining = self.weather.step(ctx.world, self.worker.region_size());
        tracing::trace!("Weather step: {} regions raining", raining);
        Ok(())
    }
}

// ── Metrics ──────────────────────────────────────────────────────────────────

/// Logs a metrics snapshot as JSON.
pub struct MetricsLayer {
    interval: Duration,
}

impl MetricsLayer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl SimulationLayer for MetricsLayer {
    fn name(&self) -> &'static str {
        "metrics"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn tick(&mut self, ctx: &TickContext<'_>) -> anyhow::Result<()> {
        let snapshot = ctx.metrics.snapshot(ctx.world.chunk_count() as u64);
        tracing::info!("Metrics: {}", serde_json::to_string(&snapshot)?);
        Ok(())
    }
}
