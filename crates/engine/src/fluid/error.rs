use thiserror::Error;

/// Integrity faults raised by the fluid core.
///
/// These terminate the call that hit them. Conservation anomalies and
/// iteration limits are not errors: they are logged and the pass continues.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FluidError {
    /// A level outside `0..=MAX_LEVEL` was requested. Callers clamp first.
    #[error("invalid fluid level {level} (expected 0..={max})")]
    InvalidLevel { level: i32, max: u8 },

    /// A block of the family carries a level tag that does not parse.
    #[error("block {code} has a corrupt level tag {tag:?}")]
    CorruptLevelTag { code: String, tag: String },

    /// A level variant expected in the registry is missing.
    #[error("no block registered for {code}")]
    UnknownBlock { code: String },

    /// No quantized fluid family with this name is registered.
    #[error("unknown fluid family {family}")]
    UnknownFamily { family: String },
}
