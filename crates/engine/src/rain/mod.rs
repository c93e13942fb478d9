//! Chunked rain accumulation: a deduplicating chunk queue, a periodic sweep
//! that fills it, and a bounded drain that places rain on chunk surfaces.

pub mod queue;
pub mod weather;
pub mod worker;

pub use queue::{ChunkUpdateRecord, PendingChunks};
pub use weather::{Calendar, PrecipKind, Precipitation, PrecipitationSource};
pub use worker::{DrainReport, LAST_RAIN_PASS_KEY, RainStatsSnapshot, RainWorker, RecordOutcome, SuspendState};
