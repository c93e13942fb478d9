//! Finite, mass-conserving voxel fluid.
//!
//! - [`world`]: two-layer chunked block storage, registry and buffered access.
//! - [`schedule`]: debounced per-position rechecks.
//! - [`fluid`]: the level codec and the leveling engine.
//! - [`rain`]: the chunked rain accumulation worker.

pub mod config;
pub mod fluid;
pub mod rain;
pub mod schedule;
pub mod world;

pub use config::{LevelingConfig, RainConfig};
pub use fluid::{FluidError, FluidSimulation, LevelCodec, LevelingEngine, MAX_LEVEL};
pub use rain::RainWorker;
pub use world::World;
