//! Wiring: builds the collaborators, the rain worker and the timeline around
//! a world, and owns the shutdown sequence.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use finite_engine::fluid::{LevelCodec, LevelingEngine};
use finite_engine::rain::{Calendar, PrecipitationSource, RainWorker, SuspendState};
use finite_engine::{FluidSimulation, World};

use crate::block::WATER_FAMILY;
use crate::calendar::GameCalendar;
use crate::config::ServerConfig;
use crate::metrics::Metrics;
use crate::persistence::{self, LevelMeta};
use crate::simulation::{
    FluidLayer, MetricsLayer, RainDrainLayer, RainSweepLayer, SharedFluid, Timeline, WeatherLayer,
    apply_rain_drops,
};
use crate::weather::WeatherSystem;

const METRICS_LOG_INTERVAL: Duration = Duration::from_secs(30);

pub struct Host {
    pub config: ServerConfig,
    pub world: Arc<World>,
    pub codec: LevelCodec,
    pub calendar: Arc<GameCalendar>,
    pub weather: Arc<WeatherSystem>,
    pub rain: Arc<RainWorker>,
    pub metrics: Arc<Metrics>,
    pub fluid: SharedFluid,
    pub timeline: Timeline,
    rain_thread: Option<JoinHandle<()>>,
}

impl Host {
    /// Assemble everything around `world`. `meta` restores the calendar and
    /// rain settings of a previous run.
    pub fn build(config: ServerConfig, world: Arc<World>, meta: Option<LevelMeta>) -> Result<Self> {
        config.validate()?;
        let codec = LevelCodec::new(Arc::clone(world.registry()), WATER_FAMILY)
            .context("building the level codec")?;

        let meta = meta.unwrap_or(LevelMeta {
            total_hours: 0.0,
            region_size: config.world.region_size,
            rain_enabled: config.rain.enabled,
        });

        let calendar = Arc::new(GameCalendar::new(meta.total_hours, config.weather.hours_per_real_minute));
        let weather = Arc::new(WeatherSystem::new(config.weather.clone()));
        let rain = Arc::new(RainWorker::new(
            Arc::clone(&world),
            codec.clone(),
            Arc::clone(&weather) as Arc<dyn PrecipitationSource>,
            Arc::clone(&calendar) as Arc<dyn Calendar>,
            config.rain.clone(),
        ));
        rain.on_save_loaded(meta.region_size, meta.rain_enabled);

        let metrics = Arc::new(Metrics::new());
        let engine = LevelingEngine::new(codec.clone(), config.fluid.clone());
        let fluid: SharedFluid = Arc::new(Mutex::new(FluidSimulation::new(engine)));
        let fluid_layer = FluidLayer::new(Arc::clone(&fluid))
            .with_rain(Arc::clone(&rain))
            .with_random_ticks(config.world.random_ticks_per_chunk, config.weather.seed);

        let mut timeline = Timeline::new(
            Arc::clone(&world),
            Arc::clone(&metrics),
            Duration::from_millis(config.world.tick_ms),
        );
        timeline.push(Box::new(fluid_layer));
        timeline.push(Box::new(RainSweepLayer::new(Arc::clone(&rain))));
        timeline.push(Box::new(RainDrainLayer::new(Arc::clone(&rain))));
        timeline.push(Box::new(WeatherLayer::new(
            Arc::clone(&weather),
            Arc::clone(&calendar),
            Arc::clone(&rain),
            Duration::from_millis(config.weather.update_interval_ms),
        )));
        timeline.push(Box::new(MetricsLayer::new(METRICS_LOG_INTERVAL)));

        Ok(Self {
            config,
            world,
            codec,
            calendar,
            weather,
            rain,
            metrics,
            fluid,
            timeline,
            rain_thread: None,
        })
    }

    /// Run `f` against the fluid simulation between timeline steps.
    pub fn with_fluid<R>(&self, f: impl FnOnce(&mut FluidSimulation, &World) -> R) -> R {
        let mut sim = self.fluid.lock().expect("fluid simulation lock poisoned");
        f(&mut sim, &self.world)
    }

    pub fn pending_rechecks(&self) -> usize {
        self.with_fluid(|sim, _| sim.pending())
    }

    /// Start the dedicated rain thread if the config asks for one.
    pub fn start_rain_thread(&mut self) -> Result<()> {
        if !self.config.rain.background_thread || self.rain_thread.is_some() {
            return Ok(());
        }
        let handle = self.rain.spawn_thread().context("spawning the rain thread")?;
        self.rain_thread = Some(handle);
        Ok(())
    }

    pub fn has_rain_thread(&self) -> bool {
        self.rain_thread.is_some()
    }

    pub fn level_meta(&self) -> LevelMeta {
        LevelMeta {
            total_hours: self.calendar.total_hours(),
            region_size: self.rain.region_size(),
            rain_enabled: self.rain.is_enabled(),
        }
    }

    /// Suspend handshake, then stop and join the rain thread and add the
    /// drops it left behind.
    ///
    /// Polls the worker until it reports ready or `timeout` passes.
    pub fn stop_rain(&mut self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        while self.rain.on_suspend() == SuspendState::Wait {
            if Instant::now() >= deadline {
                bail!("rain worker did not suspend within {:?}", timeout);
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        tracing::info!("Rain worker suspended");

        self.rain.shutdown();
        if let Some(handle) = self.rain_thread.take() {
            if handle.join().is_err() {
                bail!("rain thread panicked");
            }
            tracing::info!("Rain thread joined");
        }

        let flushed = self
            .with_fluid(|sim, world| apply_rain_drops(sim, world, &self.rain, &self.metrics))
            .context("adding the rain thread's last drops")?;
        if flushed > 0 {
            tracing::info!("Added {} leftover rain drops", flushed);
        }
        Ok(())
    }

    /// Save dirty chunks and the level metadata under `dir`.
    pub fn save(&self, dir: &Path) -> Result<usize> {
        let saved = persistence::save_world(&self.world, dir)?;
        persistence::save_level_meta(dir, &self.level_meta())?;
        Ok(saved)
    }
}
