//! Quantized finite fluid: codec, leveling rules and the per-tick driver.

pub mod codec;
pub mod error;
pub mod leveling;
pub mod simulation;

/// Highest level a cell can hold. Level 0 is air.
pub const MAX_LEVEL: u8 = 7;

pub use codec::LevelCodec;
pub use error::FluidError;
pub use leveling::{FluidPass, Handling, LevelingEngine, Outcome, PassReport, Placement};
pub use simulation::FluidSimulation;
