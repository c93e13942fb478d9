//! Terrain generation for the host and the demo.

use finite_engine::world::World;
use finite_engine::world::block::StoreLayer;
use finite_engine::world::chunk::{CHUNK_SIZE, Chunk};
use finite_engine::world::position::{BlockPos, ChunkPos, LocalBlockPos};

use crate::block;

/// Top of the flat terrain: bedrock at y=0, stone y=1..=3, dirt at y=4.
pub const SURFACE_Y: i64 = 4;

/// Fill chunks `-radius..radius` on both axes with flat terrain. Generated
/// chunks are not dirty; only later modifications get saved.
pub fn generate_flat(world: &World, radius: i32) {
    for cx in -radius..radius {
        for cz in -radius..radius {
            let mut chunk = Chunk::new();
            for x in 0..CHUNK_SIZE as u8 {
                for z in 0..CHUNK_SIZE as u8 {
                    chunk.set_block(LocalBlockPos { x, y: 0, z }, StoreLayer::Solid, block::BEDROCK);
                    for y in 1..SURFACE_Y {
                        chunk.set_block(LocalBlockPos { x, y, z }, StoreLayer::Solid, block::STONE);
                    }
                    chunk.set_block(LocalBlockPos { x, y: SURFACE_Y, z }, StoreLayer::Solid, block::DIRT);
                }
            }
            world.insert_chunk(ChunkPos::new(cx, cz), chunk);
        }
    }
}

/// Build a stone ring of `wall_height` around the `width` x `depth` floor
/// whose low corner is `corner` (on the floor's y). The floor itself is left
/// as it is.
pub fn build_basin(world: &World, corner: BlockPos, width: i64, depth: i64, wall_height: i64) {
    for y in corner.y..corner.y + wall_height {
        for x in corner.x - 1..=corner.x + width {
            for z in corner.z - 1..=corner.z + depth {
                let inside = (corner.x..corner.x + width).contains(&x) && (corner.z..corner.z + depth).contains(&z);
                if !inside {
                    world.set_stored(BlockPos::new(x, y, z), StoreLayer::Solid, block::STONE);
                }
            }
        }
    }
}

/// Demo features on top of flat terrain: a walled basin, a pit dug into the
/// terrain, and a slab ledge between them. Returns the basin's floor corner.
pub fn demo_features(world: &World) -> BlockPos {
    let floor = SURFACE_Y + 1;
    let basin = BlockPos::new(4, floor, 4);
    build_basin(world, basin, 8, 8, 3);

    // Pit: a 4x4 hole two deep, east of the basin.
    for x in 16..20 {
        for z in 6..10 {
            for y in SURFACE_Y - 1..=SURFACE_Y {
                world.set_stored(BlockPos::new(x, y, z), StoreLayer::Solid, block::AIR);
            }
        }
    }

    // Slab ledge leading from the basin wall toward the pit.
    for x in 13..16 {
        world.set_stored(BlockPos::new(x, floor, 8), StoreLayer::Solid, block::SLAB);
    }

    basin
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use finite_engine::world::block::Layer;

    use super::*;
    use crate::block::standard_registry;

    #[test]
    fn flat_terrain_is_clean_and_layered() {
        let world = World::new(Arc::new(standard_registry()));
        generate_flat(&world, 1);
        assert_eq!(world.chunk_count(), 4);
        assert_eq!(world.dirty_count(), 0);

        let pos = BlockPos::new(-5, 0, 17);
        assert_eq!(world.get_block(pos, Layer::Default), block::BEDROCK);
        assert_eq!(world.get_block(BlockPos::new(-5, 2, 17), Layer::Default), block::STONE);
        assert_eq!(world.get_block(BlockPos::new(-5, SURFACE_Y, 17), Layer::Default), block::DIRT);
        assert_eq!(world.get_block(BlockPos::new(-5, SURFACE_Y + 1, 17), Layer::Default), block::AIR);
        for index in [0, 511, 1023] {
            assert_eq!(world.rain_height(ChunkPos::new(-1, 0), index), Some(SURFACE_Y));
        }
    }

    #[test]
    fn basin_walls_surround_an_open_floor() {
        let world = World::new(Arc::new(standard_registry()));
        generate_flat(&world, 1);
        let corner = demo_features(&world);

        let wall = |x, z| world.get_block(BlockPos::new(x, corner.y + 2, z), Layer::Solid);
        assert_eq!(wall(corner.x - 1, corner.z), block::STONE);
        assert_eq!(wall(corner.x + 8, corner.z + 7), block::STONE);
        assert_eq!(wall(corner.x, corner.z), block::AIR);
        assert_eq!(wall(corner.x + 7, corner.z + 7), block::AIR);
        assert_eq!(world.get_block(BlockPos::new(corner.x, corner.y + 3, corner.z - 1), Layer::Solid), block::AIR);

        // The pit exposes stone two below the surface.
        assert_eq!(world.rain_height(ChunkPos::new(0, 0), 7 * 32 + 17), Some(SURFACE_Y - 2));
    }
}
