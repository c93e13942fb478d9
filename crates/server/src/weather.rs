//! Per-region weather.
//!
//! Each weather region runs a small random walk: dry regions start raining
//! with `rain_start_chance` per update, raining regions drift in intensity and
//! clear up with `rain_stop_chance`. A single wind direction wanders slowly
//! and is published to the world, where the leveling engine reads it for
//! tie-breaks.

use std::collections::HashMap;
use std::sync::Mutex;

use finite_engine::World;
use finite_engine::rain::{Precipitation, PrecipitationSource};
use finite_engine::world::position::{BlockPos, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::WeatherConfig;

type Region = (i32, i32);

pub struct WeatherSystem {
    config: WeatherConfig,
    state: Mutex<WeatherState>,
}

struct WeatherState {
    regions: HashMap<Region, Precipitation>,
    rng: StdRng,
    wind_angle: f64,
}

impl WeatherSystem {
    pub fn new(config: WeatherConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: Mutex::new(WeatherState {
                regions: HashMap::new(),
                rng,
                wind_angle: 0.0,
            }),
        }
    }

    /// Advance every region touched by a loaded chunk by one update and
    /// publish the new wind. Returns the number of raining regions.
    pub fn step(&self, world: &World, region_size: i32) -> usize {
        let mut state = self.state.lock().expect("weather lock poisoned");
        let WeatherState { regions, rng, wind_angle } = &mut *state;

        for chunk in world.loaded_chunks() {
            regions.entry(chunk.region(region_size)).or_default();
        }

        let mut raining = 0;
        for (region, sky) in regions.iter_mut() {
            let was_raining = sky.is_raining();
            *sky = self.next_precipitation(*sky, rng);
            if sky.is_raining() != was_raining {
                if sky.is_raining() {
                    tracing::debug!("Rain started in region {:?} (intensity {:.0})", region, sky.intensity);
                } else {
                    tracing::debug!("Rain stopped in region {:?}", region);
                }
            }
            if sky.is_raining() {
                raining += 1;
            }
        }

        *wind_angle += rng.gen_range(-0.2..0.2);
        let strength = self.config.wind_strength;
        world.set_wind(Vec3::new(wind_angle.cos() * strength, 0.0, wind_angle.sin() * strength));

        raining
    }

    fn next_precipitation(&self, sky: Precipitation, rng: &mut StdRng) -> Precipitation {
        let max = self.config.max_intensity.max(1.0);
        if sky.is_raining() {
            if rng.gen_bool(self.config.rain_stop_chance.clamp(0.0, 1.0)) {
                return Precipitation::NONE;
            }
            let drift = rng.gen_range(-5.0f32..5.0);
            Precipitation::rain((sky.intensity + drift).clamp(1.0, max))
        } else if rng.gen_bool(self.config.rain_start_chance.clamp(0.0, 1.0)) {
            Precipitation::rain(rng.gen_range(1.0..=max))
        } else {
            Precipitation::NONE
        }
    }

    /// Force the weather of one region (demo and tests).
    pub fn set_region(&self, region: Region, sky: Precipitation) {
        self.state
            .lock()
            .expect("weather lock poisoned")
            .regions
            .insert(region, sky);
    }

    pub fn raining_regions(&self) -> usize {
        self.state
            .lock()
            .expect("weather lock poisoned")
            .regions
            .values()
            .filter(|sky| sky.is_raining())
            .count()
    }
}

impl PrecipitationSource for WeatherSystem {
    fn precipitation_at(&self, _pos: BlockPos, region: (i32, i32)) -> Precipitation {
        self.state
            .lock()
            .expect("weather lock poisoned")
            .regions
            .get(&region)
            .copied()
            .unwrap_or(Precipitation::NONE)
    }
}
