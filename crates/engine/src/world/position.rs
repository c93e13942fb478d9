use super::block::Facing;
use super::chunk::CHUNK_SIZE;

const CHUNK_SHIFT: u32 = CHUNK_SIZE.trailing_zeros();
const CHUNK_MASK: i64 = CHUNK_SIZE as i64 - 1;

/// Absolute block position in the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i64,
    pub y: i64,
    pub z: i64,
}

impl BlockPos {
    pub const fn new(x: i64, y: i64, z: i64) -> Self {
        Self { x, y, z }
    }

    /// The chunk column this block belongs to.
    pub const fn chunk(&self) -> ChunkPos {
        ChunkPos {
            x: (self.x >> CHUNK_SHIFT) as i32,
            z: (self.z >> CHUNK_SHIFT) as i32,
        }
    }

    /// Position within the chunk (0..CHUNK_SIZE on x/z, absolute y).
    pub const fn local(&self) -> LocalBlockPos {
        LocalBlockPos {
            x: (self.x & CHUNK_MASK) as u8,
            y: self.y,
            z: (self.z & CHUNK_MASK) as u8,
        }
    }

    pub const fn offset(&self, facing: Facing) -> BlockPos {
        let (dx, dy, dz) = facing.offset();
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub const fn up(&self) -> BlockPos {
        Self::new(self.x, self.y + 1, self.z)
    }

    pub const fn down(&self) -> BlockPos {
        Self::new(self.x, self.y - 1, self.z)
    }

    /// The six cardinal neighbors.
    pub const fn neighbors(&self) -> [BlockPos; 6] {
        [
            Self::new(self.x + 1, self.y, self.z),
            Self::new(self.x - 1, self.y, self.z),
            Self::new(self.x, self.y + 1, self.z),
            Self::new(self.x, self.y - 1, self.z),
            Self::new(self.x, self.y, self.z + 1),
            Self::new(self.x, self.y, self.z - 1),
        ]
    }

    /// Offset from `origin` to `self` as a float vector.
    pub fn delta_from(&self, origin: BlockPos) -> Vec3 {
        Vec3::new(
            (self.x - origin.x) as f64,
            (self.y - origin.y) as f64,
            (self.z - origin.z) as f64,
        )
    }
}

/// Chunk column position (each chunk is `CHUNK_SIZE` blocks wide on x and z).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    pub const fn block_origin(&self, y: i64) -> BlockPos {
        BlockPos::new((self.x as i64) << CHUNK_SHIFT, y, (self.z as i64) << CHUNK_SHIFT)
    }

    /// Absolute block position of column `index` (`z * CHUNK_SIZE + x`) at height `y`.
    pub const fn column_pos(&self, index: usize, y: i64) -> BlockPos {
        let origin = self.block_origin(y);
        BlockPos::new(
            origin.x + (index % CHUNK_SIZE) as i64,
            y,
            origin.z + (index / CHUNK_SIZE) as i64,
        )
    }

    /// The weather region containing this chunk, for a region `region_size` blocks wide.
    pub const fn region(&self, region_size: i32) -> (i32, i32) {
        let size = CHUNK_SIZE as i32;
        (
            (self.x * size).div_euclid(region_size),
            (self.z * size).div_euclid(region_size),
        )
    }
}

/// Block position local to a chunk (x, z in 0..CHUNK_SIZE).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalBlockPos {
    pub x: u8,
    pub y: i64,
    pub z: u8,
}

impl LocalBlockPos {
    pub const fn section_index(&self) -> i32 {
        (self.y >> CHUNK_SHIFT) as i32
    }

    pub const fn section_local_y(&self) -> u8 {
        (self.y.rem_euclid(CHUNK_SIZE as i64)) as u8
    }

    /// Height-map column index: `z * CHUNK_SIZE + x`.
    pub const fn column_index(&self) -> usize {
        self.z as usize * CHUNK_SIZE + self.x as usize
    }
}

/// A plain 3-component float vector (wind, flow directions).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(&self, other: Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_coordinates_map_to_the_right_chunk() {
        let pos = BlockPos::new(-1, 10, -33);
        assert_eq!(pos.chunk(), ChunkPos::new(-1, -2));
        let local = pos.local();
        assert_eq!((local.x, local.z), (31, 31));
    }

    #[test]
    fn column_index_round_trips_through_chunk_origin() {
        let chunk = ChunkPos::new(2, -3);
        let pos = chunk.column_pos(5 * CHUNK_SIZE + 7, 40);
        assert_eq!(pos.chunk(), chunk);
        assert_eq!(pos.local().column_index(), 5 * CHUNK_SIZE + 7);
    }

    #[test]
    fn region_uses_floor_division() {
        assert_eq!(ChunkPos::new(0, 0).region(16), (0, 0));
        assert_eq!(ChunkPos::new(1, -1).region(16), (2, -2));
        assert_eq!(ChunkPos::new(-1, 3).region(64), (-1, 1));
    }
}
