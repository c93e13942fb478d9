//! The host's standard block set.
//!
//! Ids are assigned by registration order in [`standard_registry`], so the
//! constants below are only valid for a registry built by that function.

use finite_engine::world::block::BlockId;
use finite_engine::world::registry::{BlockDef, BlockRegistry, FULL_BARRIER};

/// Family of the quantized water this host simulates.
pub const WATER_FAMILY: &str = "finitewater-water";

pub const AIR: BlockId = BlockId(0);
pub const STONE: BlockId = BlockId(1);
pub const BEDROCK: BlockId = BlockId(2);
pub const DIRT: BlockId = BlockId(3);
/// Bottom half slab: fills the lower half of its cell.
pub const SLAB: BlockId = BlockId(4);
pub const LEGACY_WATER: BlockId = BlockId(5);
pub const LAVA: BlockId = BlockId(6);
/// Level 1 of [`WATER_FAMILY`]; level `l` is `BlockId(WATER_1.0 + l - 1)`.
pub const WATER_1: BlockId = BlockId(7);

/// Barrier heights of a bottom slab, indexed N, E, S, W, Up, Down.
const SLAB_BARRIER: [f32; 6] = [0.5, 0.5, 0.5, 0.5, 0.5, 1.0];

pub fn standard_registry() -> BlockRegistry {
    let mut reg = BlockRegistry::new();
    reg.register(BlockDef::solid("stone", FULL_BARRIER));
    reg.register(BlockDef::solid("bedrock", FULL_BARRIER));
    reg.register(BlockDef::solid("dirt", FULL_BARRIER));
    reg.register(BlockDef::solid("stone-slab-down", SLAB_BARRIER));
    reg.register(BlockDef::legacy_fluid("game:water-still-7", "water", false));
    reg.register(BlockDef::legacy_fluid("game:lava-still-7", "lava", true));
    reg.register_fluid_family(WATER_FAMILY, "water", finite_engine::MAX_LEVEL);
    reg
}

/// Block id of `level` (1..=7) finite water.
pub const fn water(level: u8) -> BlockId {
    BlockId(WATER_1.0 + level as u16 - 1)
}
