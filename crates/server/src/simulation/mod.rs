//! The main simulation timeline.
//!
//! All world mutation on the host happens here: one timeline steps at a fixed
//! tick, and each registered [`SimulationLayer`] runs when its interval has
//! elapsed. Layers run in registration order and never overlap, so a layer
//! may assume nothing else touches its own state while it ticks.
//!
//! # Adding a new layer
//!
//! 1. Implement [`SimulationLayer`] for your struct.
//! 2. Register it with [`Timeline::push`] in `main.rs`.
//!
//! An interval of zero means "every tick".

pub mod layers;

use std::sync::Arc;
use std::time::Duration;

use finite_engine::World;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::metrics::Metrics;

pub use layers::{
    FluidLayer, MetricsLayer, RainDrainLayer, RainSweepLayer, SharedFluid, WeatherLayer, apply_rain_drops,
};

/// What a layer sees when it runs.
pub struct TickContext<'a> {
    pub world: &'a Arc<World>,
    pub metrics: &'a Metrics,
    /// Timeline clock in milliseconds.
    pub now_ms: u64,
    /// Time since this layer last ran.
    pub elapsed_ms: u64,
}

/// A periodic piece of simulation work driven by the [`Timeline`].
pub trait SimulationLayer: Send + 'static {
    /// Human-readable name (used for logging).
    fn name(&self) -> &'static str;

    /// How often this layer ticks.
    fn interval(&self) -> Duration;

    /// Do one round of work. Errors are logged by the timeline; the layer
    /// keeps its schedule.
    fn tick(&mut self, ctx: &TickContext<'_>) -> anyhow::Result<()>;
}

struct Slot {
    layer: Box<dyn SimulationLayer>,
    interval_ms: u64,
    last_run_ms: u64,
}

pub struct Timeline {
    world: Arc<World>,
    metrics: Arc<Metrics>,
    tick_ms: u64,
    now_ms: u64,
    ticks: u64,
    slots: Vec<Slot>,
}

impl Timeline {
    pub fn new(world: Arc<World>, metrics: Arc<Metrics>, tick: Duration) -> Self {
        Self {
            world,
            metrics,
            tick_ms: (tick.as_millis() as u64).max(1),
            now_ms: 0,
            ticks: 0,
            slots: Vec::new(),
        }
    }

    pub fn push(&mut self, layer: Box<dyn SimulationLayer>) {
        tracing::info!(
            "Simulation layer '{}' registered (interval {:?})",
            layer.name(),
            layer.interval()
        );
        self.slots.push(Slot {
            interval_ms: layer.interval().as_millis() as u64,
            last_run_ms: self.now_ms,
            layer,
        });
    }

    pub fn world(&self) -> &Arc<World> {
        &self.world
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.layer.name()).collect()
    }

    /// Advance the clock by one tick and run every layer that is due.
    /// Returns how many layers ran.
    pub fn step(&mut self) -> usize {
        self.now_ms += self.tick_ms;
        self.ticks += 1;

        let mut ran = 0;
        for slot in &mut self.slots {
            let elapsed_ms = self.now_ms - slot.last_run_ms;
            if elapsed_ms < slot.interval_ms {
                continue;
            }
            let ctx = TickContext {
                world: &self.world,
                metrics: &self.metrics,
                now_ms: self.now_ms,
                elapsed_ms,
            };
            if let Err(e) = slot.layer.tick(&ctx) {
                tracing::error!("Simulation layer '{}' failed: {:#}", slot.layer.name(), e);
            }
            slot.last_run_ms = self.now_ms;
            ran += 1;
        }
        ran
    }

    /// Step in real time until `shutdown` flips to true or `max_ticks` have
    /// run. Returns the number of ticks taken.
    pub async fn run(&mut self, max_ticks: Option<u64>, mut shutdown: watch::Receiver<bool>) -> u64 {
        let mut interval = tokio::time::interval(Duration::from_millis(self.tick_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the world has time to initialize.
        interval.tick().await;

        tracing::info!("Timeline started ({} layers, tick {} ms)", self.slots.len(), self.tick_ms);

        let mut ran = 0u64;
        while max_ticks.is_none_or(|max| ran < max) {
            tokio::select! {
                _ = interval.tick() => {
                    self.step();
                    ran += 1;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Timeline stopped after {} ticks", ran);
        ran
    }
}
