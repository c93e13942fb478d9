//! Tunables for the fluid engine and the rain worker.
//!
//! Both structs deserialize from partial tables: missing keys take the
//! defaults below.

use serde::Deserialize;

use crate::rain::worker::DEFAULT_REGION_SIZE;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LevelingConfig {
    /// Debounce delay for every recheck the engine arms.
    pub spread_delay_ms: u64,
    /// Chance per random tick that an exposed cell loses one level.
    pub evaporation_chance: f64,
    /// Rechecks run per tick before the rest are deferred.
    pub max_evaluations_per_tick: usize,
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self {
            spread_delay_ms: 150,
            evaporation_chance: 0.01,
            max_evaluations_per_tick: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RainConfig {
    pub enabled: bool,
    /// Producer switch, independent of `enabled`.
    pub process_chunks: bool,
    /// Also drain on a dedicated thread.
    pub background_thread: bool,
    pub sweep_interval_ms: u64,
    pub drain_interval_ms: u64,
    /// Records per main-timeline drain.
    pub drain_batch: usize,
    /// Records per background-thread loop iteration.
    pub thread_batch: usize,
    pub thread_poll_ms: u64,
    /// Number of precomputed column permutations.
    pub shuffle_tables: usize,
    /// Calendar hours that must pass between two rain passes of one chunk.
    pub min_hours_between_passes: f64,
    /// Used when the host reports a region size of zero or less. Must be
    /// positive.
    pub default_region_size: i32,
    pub seed: u64,
}

impl Default for RainConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            process_chunks: true,
            background_thread: false,
            sweep_interval_ms: 3000,
            drain_interval_ms: 100,
            drain_batch: 25,
            thread_batch: 10,
            thread_poll_ms: 5,
            shuffle_tables: 50,
            min_hours_between_passes: 1.0,
            default_region_size: DEFAULT_REGION_SIZE,
            seed: 0x5eed_f1d0,
        }
    }
}
