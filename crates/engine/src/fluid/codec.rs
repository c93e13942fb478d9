//! Level codec: integer fluid level <-> concrete block identity for one family.

use std::sync::Arc;

use super::MAX_LEVEL;
use super::error::FluidError;
use crate::world::block::BlockId;
use crate::world::registry::BlockRegistry;

/// Maps levels `0..=MAX_LEVEL` of one fluid family to block ids and back.
///
/// Level 0 is air. The level variants are resolved once at construction so
/// encoding is a table lookup; decoding parses the block's `level` tag.
#[derive(Clone)]
pub struct LevelCodec {
    registry: Arc<BlockRegistry>,
    family: String,
    levels: [BlockId; MAX_LEVEL as usize + 1],
}

impl LevelCodec {
    /// Resolve every level variant of `family` (codes `"{family}-{level}"`).
    pub fn new(registry: Arc<BlockRegistry>, family: &str) -> Result<Self, FluidError> {
        let mut levels = [BlockId::AIR; MAX_LEVEL as usize + 1];
        for level in 1..=MAX_LEVEL {
            let code = format!("{family}-{level}");
            let id = registry
                .lookup(&code)
                .ok_or(FluidError::UnknownBlock { code })?;
            levels[level as usize] = id;
        }
        let base = levels[1];
        match registry.fluid(base) {
            Some(props) if props.quantized && props.family == family => {}
            _ => {
                return Err(FluidError::UnknownFamily {
                    family: family.to_string(),
                });
            }
        }
        Ok(Self {
            registry,
            family: family.to_string(),
            levels,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Block for `level`. 0 is air; anything outside `0..=MAX_LEVEL` is an
    /// `InvalidLevel` error, never clamped.
    pub fn level_to_block(&self, level: i32) -> Result<BlockId, FluidError> {
        if !(0..=MAX_LEVEL as i32).contains(&level) {
            return Err(FluidError::InvalidLevel {
                level,
                max: MAX_LEVEL,
            });
        }
        Ok(self.levels[level as usize])
    }

    /// Level held by `block`. Air and blocks of other families read as 0.
    pub fn block_to_level(&self, block: BlockId) -> Result<u8, FluidError> {
        if block.is_air() {
            return Ok(0);
        }
        let Some(def) = self.registry.get(block) else {
            return Ok(0);
        };
        match def.fluid() {
            Some(props) if props.quantized && props.family == self.family => {}
            _ => return Ok(0),
        }
        let tag = def.variant("level").unwrap_or_default();
        match tag.parse::<u8>() {
            Ok(level) if (1..=MAX_LEVEL).contains(&level) => Ok(level),
            _ => Err(FluidError::CorruptLevelTag {
                code: def.code.clone(),
                tag: tag.to_string(),
            }),
        }
    }

    /// Whether `block` is a variant of this family (not air).
    pub fn is_family(&self, block: BlockId) -> bool {
        self.registry
            .fluid(block)
            .is_some_and(|props| props.quantized && props.family == self.family)
    }
}
