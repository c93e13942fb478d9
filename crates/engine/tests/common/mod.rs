#![allow(dead_code)]

use std::sync::Arc;

use finite_engine::config::LevelingConfig;
use finite_engine::fluid::{FluidSimulation, LevelCodec, LevelingEngine};
use finite_engine::world::World;
use finite_engine::world::block::{BlockId, Facing, Layer, StoreLayer};
use finite_engine::world::chunk::{CHUNK_SIZE, Chunk};
use finite_engine::world::position::{BlockPos, ChunkPos, LocalBlockPos};
use finite_engine::world::registry::{BlockDef, BlockRegistry, FULL_BARRIER};

pub const FAMILY: &str = "finitewater-water";

pub struct Blocks {
    pub stone: BlockId,
    /// Horizontal barrier exactly at the fill fraction of level 3.
    pub wall_three_sevenths: BlockId,
    /// Horizontal barrier just under the fill fraction of level 3.
    pub wall_just_under: BlockId,
    pub legacy_water: BlockId,
    pub lava: BlockId,
    pub corrupt: BlockId,
    /// Level variants, `levels[l - 1]` holds level `l`.
    pub levels: Vec<BlockId>,
}

fn horizontal_barrier(h: f32) -> [f32; 6] {
    [h, h, h, h, 0.0, 0.0]
}

pub fn registry() -> (Arc<BlockRegistry>, Blocks) {
    let mut reg = BlockRegistry::new();
    let stone = reg.register(BlockDef::solid("stone", FULL_BARRIER));
    let wall_three_sevenths = reg.register(BlockDef::solid("wall-exact", horizontal_barrier(3.0 / 7.0)));
    let wall_just_under = reg.register(BlockDef::solid(
        "wall-under",
        horizontal_barrier(3.0 / 7.0 - 1e-4),
    ));
    let legacy_water = reg.register(BlockDef::legacy_fluid("water-still-7", "water", false));
    let lava = reg.register(BlockDef::legacy_fluid("lava-still-7", "lava", true));
    let levels = reg.register_fluid_family(FAMILY, "water", 7);
    let corrupt = reg.register(BlockDef::fluid_tagged(FAMILY, "water", "x"));
    (
        Arc::new(reg),
        Blocks {
            stone,
            wall_three_sevenths,
            wall_just_under,
            legacy_water,
            lava,
            corrupt,
            levels,
        },
    )
}

/// An empty world with chunks `(0..n, 0..n)` loaded.
pub fn empty_world(registry: &Arc<BlockRegistry>, n: i32) -> Arc<World> {
    let world = World::new(Arc::clone(registry));
    for cx in 0..n {
        for cz in 0..n {
            world.insert_chunk(ChunkPos::new(cx, cz), Chunk::new());
        }
    }
    Arc::new(world)
}

/// An empty world with a stone layer at `y` across every loaded chunk.
pub fn flat_world(registry: &Arc<BlockRegistry>, blocks: &Blocks, n: i32, y: i64) -> Arc<World> {
    let world = World::new(Arc::clone(registry));
    for cx in 0..n {
        for cz in 0..n {
            let mut chunk = Chunk::new();
            for x in 0..CHUNK_SIZE as u8 {
                for z in 0..CHUNK_SIZE as u8 {
                    chunk.set_block(
                        LocalBlockPos { x, y, z },
                        StoreLayer::Solid,
                        blocks.stone,
                    );
                }
            }
            world.insert_chunk(ChunkPos::new(cx, cz), chunk);
        }
    }
    Arc::new(world)
}

pub fn codec(registry: &Arc<BlockRegistry>) -> LevelCodec {
    LevelCodec::new(Arc::clone(registry), FAMILY).unwrap()
}

pub fn simulation(registry: &Arc<BlockRegistry>) -> FluidSimulation {
    simulation_with(registry, LevelingConfig::default())
}

pub fn simulation_with(registry: &Arc<BlockRegistry>, config: LevelingConfig) -> FluidSimulation {
    FluidSimulation::new(LevelingEngine::new(codec(registry), config))
}

pub fn put_level(world: &World, blocks: &Blocks, pos: BlockPos, level: u8) {
    let block = if level == 0 { BlockId::AIR } else { blocks.levels[level as usize - 1] };
    world.set_stored(pos, StoreLayer::Fluid, block);
}

pub fn level(world: &World, registry: &Arc<BlockRegistry>, pos: BlockPos) -> u8 {
    codec(registry)
        .block_to_level(world.get_block(pos, Layer::Fluid))
        .unwrap()
}

pub fn total(world: &World, registry: &Arc<BlockRegistry>, positions: &[BlockPos]) -> u32 {
    positions.iter().map(|&p| level(world, registry, p) as u32).sum()
}

pub fn stone_at(world: &World, blocks: &Blocks, positions: &[BlockPos]) {
    for &p in positions {
        world.set_block(p, blocks.stone);
    }
}

/// Stone on every horizontal side of `pos`.
pub fn wall_in(world: &World, blocks: &Blocks, pos: BlockPos) {
    for facing in Facing::HORIZONTALS {
        world.set_block(pos.offset(facing), blocks.stone);
    }
}
