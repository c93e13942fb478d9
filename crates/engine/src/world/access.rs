//! Buffered grid access.
//!
//! Fluid passes read and write through a [`GridAccess`]. Writes made during a
//! pass are visible to later reads of the same pass (write-through), but only
//! reach the shared [`World`] on [`GridAccess::commit`].

use indexmap::IndexMap;

use super::World;
use super::block::{BlockId, Facing, Layer, StoreLayer};
use super::position::{BlockPos, Vec3};
use super::registry::BlockRegistry;

/// What the fluid core needs from a grid.
pub trait GridAccess {
    fn registry(&self) -> &BlockRegistry;

    fn get_block(&self, pos: BlockPos, layer: Layer) -> BlockId;

    /// Buffer a write. `Layer::Default` and `Layer::FluidOrSolid` pick the
    /// storage layer from the block's kind.
    fn set_block(&mut self, id: BlockId, pos: BlockPos, layer: Layer);

    /// Liquid barrier height (0..=1) that `block` at `pos` presents on `facing`.
    fn barrier_height(&self, block: BlockId, facing: Facing, _pos: BlockPos) -> f32 {
        self.registry().barrier_height(block, facing)
    }

    fn wind_at(&self, pos: BlockPos) -> Vec3;

    fn is_loaded(&self, pos: BlockPos) -> bool;

    /// Flush buffered writes. Returns how many landed.
    fn commit(&mut self) -> usize;
}

/// A write buffer over a shared [`World`].
///
/// Writes are kept in insertion order and applied in that order on commit.
/// Writes into chunks that were unloaded in the meantime are dropped.
pub struct BulkAccess<'w> {
    world: &'w World,
    pending: IndexMap<(BlockPos, StoreLayer), BlockId>,
}

impl<'w> BulkAccess<'w> {
    pub fn new(world: &'w World) -> Self {
        Self {
            world,
            pending: IndexMap::new(),
        }
    }

    pub fn world(&self) -> &'w World {
        self.world
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn stored(&self, pos: BlockPos, layer: StoreLayer) -> BlockId {
        match self.pending.get(&(pos, layer)) {
            Some(&id) => id,
            None => self.world.get_stored(pos, layer),
        }
    }
}

impl GridAccess for BulkAccess<'_> {
    fn registry(&self) -> &BlockRegistry {
        self.world.registry()
    }

    fn get_block(&self, pos: BlockPos, layer: Layer) -> BlockId {
        match layer {
            Layer::Solid => self.stored(pos, StoreLayer::Solid),
            Layer::Fluid => self.stored(pos, StoreLayer::Fluid),
            Layer::Default => {
                let solid = self.stored(pos, StoreLayer::Solid);
                if solid.is_air() {
                    self.stored(pos, StoreLayer::Fluid)
                } else {
                    solid
                }
            }
            Layer::FluidOrSolid => {
                let fluid = self.stored(pos, StoreLayer::Fluid);
                if fluid.is_air() {
                    self.stored(pos, StoreLayer::Solid)
                } else {
                    fluid
                }
            }
        }
    }

    fn set_block(&mut self, id: BlockId, pos: BlockPos, layer: Layer) {
        let store = match layer {
            Layer::Solid => StoreLayer::Solid,
            Layer::Fluid => StoreLayer::Fluid,
            Layer::Default | Layer::FluidOrSolid => self.world.store_layer_for(id),
        };
        self.pending.insert((pos, store), id);
    }

    fn wind_at(&self, pos: BlockPos) -> Vec3 {
        self.world.wind_at(pos)
    }

    fn is_loaded(&self, pos: BlockPos) -> bool {
        self.world.is_loaded(pos)
    }

    fn commit(&mut self) -> usize {
        let mut applied = 0;
        for ((pos, layer), id) in self.pending.drain(..) {
            if self.world.try_set_stored(pos, layer, id) {
                applied += 1;
            }
        }
        if applied > 0 {
            tracing::trace!("Committed {} buffered block writes", applied);
        }
        applied
    }
}
