use super::block::{BlockId, StoreLayer};
use super::position::LocalBlockPos;
use std::collections::HashMap;

/// Number of blocks along each axis of a chunk section (and chunk width).
pub const CHUNK_SIZE: usize = 32;
/// Total block count in one section.
pub const SECTION_VOLUME: usize = CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE;
/// Number of columns in a chunk (one height-map entry each).
pub const COLUMN_COUNT: usize = CHUNK_SIZE * CHUNK_SIZE;
/// Height-map value for a column with no blocks at all.
pub const NO_SURFACE: i64 = i64::MIN;

/// A 32x32x32 cube of blocks of one layer.
///
/// Stored as a flat array in YZX order (x varies fastest) for cache-friendly
/// vertical scans. A section that is entirely air is never allocated.
#[derive(Clone)]
pub struct ChunkSection {
    blocks: Box<[BlockId]>,
}

impl ChunkSection {
    pub fn new_filled(block: BlockId) -> Self {
        Self {
            blocks: vec![block; SECTION_VOLUME].into_boxed_slice(),
        }
    }

    pub fn new_empty() -> Self {
        Self::new_filled(BlockId::AIR)
    }

    /// Build from a full YZX-ordered block array. Returns `None` on a length mismatch.
    pub fn from_blocks(blocks: Vec<BlockId>) -> Option<Self> {
        (blocks.len() == SECTION_VOLUME).then(|| Self {
            blocks: blocks.into_boxed_slice(),
        })
    }

    #[inline]
    const fn index(x: u8, y: u8, z: u8) -> usize {
        (y as usize) * CHUNK_SIZE * CHUNK_SIZE + (z as usize) * CHUNK_SIZE + (x as usize)
    }

    #[inline]
    pub fn get(&self, x: u8, y: u8, z: u8) -> BlockId {
        self.blocks[Self::index(x, y, z)]
    }

    #[inline]
    pub fn set(&mut self, x: u8, y: u8, z: u8, block: BlockId) {
        self.blocks[Self::index(x, y, z)] = block;
    }

    pub fn blocks(&self) -> &[BlockId] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| *b == BlockId::AIR)
    }
}

/// A column of chunk sections for both layers, keyed by section index (y >> 5),
/// plus the rain height map and small per-chunk metadata.
///
/// Only non-empty sections are stored (sparse).
pub struct Chunk {
    solid: HashMap<i32, ChunkSection>,
    fluid: HashMap<i32, ChunkSection>,
    /// Topmost non-air y per column (either layer), `NO_SURFACE` when empty.
    heights: Box<[i64]>,
    moddata: HashMap<String, f64>,
}

impl Chunk {
    pub fn new() -> Self {
        Self {
            solid: HashMap::new(),
            fluid: HashMap::new(),
            heights: vec![NO_SURFACE; COLUMN_COUNT].into_boxed_slice(),
            moddata: HashMap::new(),
        }
    }

    fn layer(&self, layer: StoreLayer) -> &HashMap<i32, ChunkSection> {
        match layer {
            StoreLayer::Solid => &self.solid,
            StoreLayer::Fluid => &self.fluid,
        }
    }

    fn layer_mut(&mut self, layer: StoreLayer) -> &mut HashMap<i32, ChunkSection> {
        match layer {
            StoreLayer::Solid => &mut self.solid,
            StoreLayer::Fluid => &mut self.fluid,
        }
    }

    pub fn get_block(&self, pos: LocalBlockPos, layer: StoreLayer) -> BlockId {
        match self.layer(layer).get(&pos.section_index()) {
            Some(section) => section.get(pos.x, pos.section_local_y(), pos.z),
            None => BlockId::AIR,
        }
    }

    pub fn set_block(&mut self, pos: LocalBlockPos, layer: StoreLayer, block: BlockId) {
        let section_idx = pos.section_index();
        let sections = self.layer_mut(layer);

        if block == BlockId::AIR {
            if let Some(section) = sections.get_mut(&section_idx) {
                section.set(pos.x, pos.section_local_y(), pos.z, block);
                if section.is_empty() {
                    sections.remove(&section_idx);
                }
            }
        } else {
            let section = sections
                .entry(section_idx)
                .or_insert_with(ChunkSection::new_empty);
            section.set(pos.x, pos.section_local_y(), pos.z, block);
        }

        self.update_height(pos, block);
    }

    fn update_height(&mut self, pos: LocalBlockPos, block: BlockId) {
        let column = pos.column_index();
        let current = self.heights[column];
        if !block.is_air() {
            if pos.y > current {
                self.heights[column] = pos.y;
            }
        } else if pos.y == current {
            self.heights[column] = self.scan_column(pos.x, pos.z, pos.y - 1);
        }
    }

    /// Highest non-air y at or below `from` in column (x, z).
    fn scan_column(&self, x: u8, z: u8, from: i64) -> i64 {
        let lowest = self
            .solid
            .keys()
            .chain(self.fluid.keys())
            .min()
            .map(|&s| (s as i64) * CHUNK_SIZE as i64);
        let Some(lowest) = lowest else {
            return NO_SURFACE;
        };
        let mut y = from;
        while y >= lowest {
            let local = LocalBlockPos { x, y, z };
            if !self.get_block(local, StoreLayer::Solid).is_air()
                || !self.get_block(local, StoreLayer::Fluid).is_air()
            {
                return y;
            }
            y -= 1;
        }
        NO_SURFACE
    }

    /// Topmost non-air y of a column (`index = z * CHUNK_SIZE + x`).
    pub fn rain_height(&self, index: usize) -> i64 {
        self.heights[index]
    }

    pub fn moddata(&self, key: &str) -> Option<f64> {
        self.moddata.get(key).copied()
    }

    pub fn set_moddata(&mut self, key: &str, value: f64) {
        self.moddata.insert(key.to_string(), value);
    }

    pub fn moddata_entries(&self) -> impl Iterator<Item = (&str, f64)> {
        self.moddata.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Non-empty sections of one layer.
    pub fn sections(&self, layer: StoreLayer) -> impl Iterator<Item = (&i32, &ChunkSection)> {
        self.layer(layer).iter()
    }

    /// Install a whole section (used by persistence), keeping the height map current.
    pub fn insert_section(&mut self, layer: StoreLayer, section_idx: i32, section: ChunkSection) {
        if section.is_empty() {
            return;
        }
        let y_base = section_idx as i64 * CHUNK_SIZE as i64;
        for y in 0..CHUNK_SIZE as u8 {
            for z in 0..CHUNK_SIZE as u8 {
                for x in 0..CHUNK_SIZE as u8 {
                    let block = section.get(x, y, z);
                    if !block.is_air() {
                        let local = LocalBlockPos { x, y: y_base + y as i64, z };
                        let column = local.column_index();
                        if local.y > self.heights[column] {
                            self.heights[column] = local.y;
                        }
                    }
                }
            }
        }
        self.layer_mut(layer).insert(section_idx, section);
    }

    pub fn section_count(&self) -> usize {
        self.solid.len() + self.fluid.len()
    }
}

impl Default for Chunk {
    fn default() -> Self {
        Self::new()
    }
}
