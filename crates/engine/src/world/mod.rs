pub mod access;
pub mod block;
pub mod chunk;
pub mod position;
pub mod registry;

use std::sync::{Arc, RwLock};

use block::{BlockId, Layer, StoreLayer};
use chunk::Chunk;
use dashmap::{DashMap, DashSet};
use position::{BlockPos, ChunkPos, Vec3};
use registry::BlockRegistry;

/// Default vertical extent of a world (y in `0..DEFAULT_MAP_HEIGHT`).
pub const DEFAULT_MAP_HEIGHT: i64 = 256;

/// The entire block world. Thread-safe, lock-sharded by chunk.
///
/// This is the spatial substrate: two block layers per cell, per-chunk rain
/// height maps and metadata. Scheduling lives in `schedule`, fluid rules in
/// `fluid`; neither caches anything from here between passes.
pub struct World {
    registry: Arc<BlockRegistry>,
    chunks: DashMap<ChunkPos, Chunk>,
    /// Chunks that have been modified since the last save.
    dirty: DashSet<ChunkPos>,
    wind: RwLock<Vec3>,
    map_height: i64,
}

impl World {
    pub fn new(registry: Arc<BlockRegistry>) -> Self {
        Self::with_height(registry, DEFAULT_MAP_HEIGHT)
    }

    pub fn with_height(registry: Arc<BlockRegistry>, map_height: i64) -> Self {
        Self {
            registry,
            chunks: DashMap::new(),
            dirty: DashSet::new(),
            wind: RwLock::new(Vec3::ZERO),
            map_height,
        }
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn map_height(&self) -> i64 {
        self.map_height
    }

    /// Read one storage layer. Returns AIR for unloaded chunks.
    pub fn get_stored(&self, pos: BlockPos, layer: StoreLayer) -> BlockId {
        match self.chunks.get(&pos.chunk()) {
            Some(chunk) => chunk.get_block(pos.local(), layer),
            None => BlockId::AIR,
        }
    }

    /// Read a block through a layer view. Returns AIR for unloaded chunks.
    pub fn get_block(&self, pos: BlockPos, layer: Layer) -> BlockId {
        let Some(chunk) = self.chunks.get(&pos.chunk()) else {
            return BlockId::AIR;
        };
        let local = pos.local();
        let solid = || chunk.get_block(local, StoreLayer::Solid);
        let fluid = || chunk.get_block(local, StoreLayer::Fluid);
        match layer {
            Layer::Solid => solid(),
            Layer::Fluid => fluid(),
            Layer::Default => {
                let s = solid();
                if s.is_air() { fluid() } else { s }
            }
            Layer::FluidOrSolid => {
                let f = fluid();
                if f.is_air() { solid() } else { f }
            }
        }
    }

    /// Write a block into the layer matching its kind. Creates the chunk if
    /// needed and marks it dirty for persistence.
    ///
    /// Takes `&self` (not `&mut self`) because `DashMap` provides interior
    /// mutability via per-shard locking.
    pub fn set_block(&self, pos: BlockPos, block: BlockId) {
        let layer = self.store_layer_for(block);
        self.set_stored(pos, layer, block);
    }

    /// Write one storage layer, creating the chunk if needed.
    pub fn set_stored(&self, pos: BlockPos, layer: StoreLayer, block: BlockId) {
        let chunk_pos = pos.chunk();
        self.chunks
            .entry(chunk_pos)
            .or_default()
            .set_block(pos.local(), layer, block);
        self.dirty.insert(chunk_pos);
    }

    /// Write one storage layer only if the chunk is loaded. Returns whether
    /// the write landed.
    pub fn try_set_stored(&self, pos: BlockPos, layer: StoreLayer, block: BlockId) -> bool {
        let chunk_pos = pos.chunk();
        match self.chunks.get_mut(&chunk_pos) {
            Some(mut chunk) => {
                chunk.set_block(pos.local(), layer, block);
                drop(chunk);
                self.dirty.insert(chunk_pos);
                true
            }
            None => false,
        }
    }

    /// The storage layer a block is written to when addressed via `Layer::Default`.
    pub fn store_layer_for(&self, block: BlockId) -> StoreLayer {
        if self.registry.is_fluid(block) {
            StoreLayer::Fluid
        } else {
            StoreLayer::Solid
        }
    }

    pub fn has_chunk(&self, pos: ChunkPos) -> bool {
        self.chunks.contains_key(&pos)
    }

    /// Whether `pos` is addressable: inside the vertical extent and in a loaded chunk.
    pub fn is_loaded(&self, pos: BlockPos) -> bool {
        (0..self.map_height).contains(&pos.y) && self.has_chunk(pos.chunk())
    }

    /// Insert a chunk without marking it dirty (used for generation/loading).
    pub fn insert_chunk(&self, pos: ChunkPos, chunk: Chunk) {
        self.chunks.insert(pos, chunk);
    }

    /// Drop a chunk from memory. Dirty state is discarded with it.
    pub fn unload_chunk(&self, pos: ChunkPos) -> Option<Chunk> {
        self.dirty.remove(&pos);
        self.chunks.remove(&pos).map(|(_, chunk)| chunk)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Snapshot of the currently loaded chunk coordinates.
    pub fn loaded_chunks(&self) -> Vec<ChunkPos> {
        self.chunks.iter().map(|entry| *entry.key()).collect()
    }

    /// Iterate over all chunks. Each entry is a DashMap ref that derefs to
    /// `(ChunkPos, Chunk)`. Use `*entry.key()` and `&*entry` (value).
    pub fn iter_chunks(&self) -> dashmap::iter::Iter<'_, ChunkPos, Chunk> {
        self.chunks.iter()
    }

    /// Get a reference to a single chunk by position, if present.
    pub fn get_chunk(&self, pos: &ChunkPos) -> Option<dashmap::mapref::one::Ref<'_, ChunkPos, Chunk>> {
        self.chunks.get(pos)
    }

    /// Rain height-map sample of a column (`index = z * CHUNK_SIZE + x`).
    pub fn rain_height(&self, pos: ChunkPos, index: usize) -> Option<i64> {
        self.chunks.get(&pos).map(|chunk| chunk.rain_height(index))
    }

    pub fn chunk_moddata(&self, pos: ChunkPos, key: &str) -> Option<f64> {
        self.chunks.get(&pos).and_then(|chunk| chunk.moddata(key))
    }

    /// Store a metadata scalar on a loaded chunk and mark it for persistence.
    pub fn set_chunk_moddata(&self, pos: ChunkPos, key: &str, value: f64) -> bool {
        match self.chunks.get_mut(&pos) {
            Some(mut chunk) => {
                chunk.set_moddata(key, value);
                drop(chunk);
                self.dirty.insert(pos);
                true
            }
            None => false,
        }
    }

    /// Wind vector at a position. The wind field is uniform across the world.
    pub fn wind_at(&self, _pos: BlockPos) -> Vec3 {
        *self.wind.read().expect("wind lock poisoned")
    }

    pub fn set_wind(&self, wind: Vec3) {
        *self.wind.write().expect("wind lock poisoned") = wind;
    }

    /// Drain and return all chunk positions that have been modified since the
    /// last call. After this returns, the dirty set is empty.
    pub fn take_dirty_chunks(&self) -> Vec<ChunkPos> {
        let mut dirty = Vec::new();
        // Collect then remove; a tiny race (chunk dirtied between collect and
        // remove) just means it'll be re-saved next time -- always safe.
        for entry in self.dirty.iter() {
            dirty.push(*entry);
        }
        for pos in &dirty {
            self.dirty.remove(pos);
        }
        dirty
    }

    /// Number of chunks currently marked dirty.
    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }
}
