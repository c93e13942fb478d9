//! Host configuration, read from a TOML file.
//!
//! ```toml
//! [world]
//! dir = "world"
//! chunk_radius = 2
//!
//! [fluid]
//! spread_delay_ms = 150
//!
//! [rain]
//! background_thread = true
//!
//! [weather]
//! hours_per_real_minute = 0.5
//! ```
//!
//! Every key is optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, ensure};
use finite_engine::config::{LevelingConfig, RainConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub world: WorldConfig,
    pub fluid: LevelingConfig,
    pub rain: RainConfig,
    pub weather: WeatherConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub dir: PathBuf,
    /// Chunks generated in each direction from the origin.
    pub chunk_radius: i32,
    pub map_height: i64,
    /// Width of a weather region in blocks. 0 means "use the rain default".
    pub region_size: i32,
    pub tick_ms: u64,
    pub autosave_secs: u64,
    /// Random evaporation ticks per loaded chunk per fluid tick.
    pub random_ticks_per_chunk: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("world"),
            chunk_radius: 2,
            map_height: 256,
            region_size: 0,
            tick_ms: 50,
            autosave_secs: 300,
            random_ticks_per_chunk: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub seed: u64,
    pub update_interval_ms: u64,
    /// In-game hours that pass per real minute.
    pub hours_per_real_minute: f64,
    /// Chance per update that a dry region starts raining.
    pub rain_start_chance: f64,
    /// Chance per update that a raining region clears up.
    pub rain_stop_chance: f64,
    pub max_intensity: f32,
    pub wind_strength: f64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            seed: 0x7e47_4e55,
            update_interval_ms: 1000,
            hours_per_real_minute: 0.5,
            rain_start_chance: 0.02,
            rain_stop_chance: 0.01,
            max_intensity: 60.0,
            wind_strength: 1.0,
        }
    }
}

impl ServerConfig {
    /// Read `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the rain worker's region bucketing.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.rain.default_region_size > 0,
            "rain.default_region_size must be positive, got {}",
            self.rain.default_region_size
        );
        ensure!(
            self.world.region_size >= 0,
            "world.region_size must be 0 (use the rain default) or positive, got {}",
            self.world.region_size
        );
        Ok(())
    }
}
