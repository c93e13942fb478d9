//! Block definitions: identity, kind, liquid barrier heights and variant tags.
//!
//! The registry is built once by the host and shared read-only (`Arc`) by the
//! world, the fluid engine and the rain worker. Ids are assigned in
//! registration order starting after `BlockId::AIR`.

use std::collections::HashMap;

use super::block::{BlockId, Facing, StoreLayer};
use super::position::Vec3;

/// Barrier heights for a block that does not obstruct fluid at all.
pub const NO_BARRIER: [f32; 6] = [0.0; 6];
/// Barrier heights for a full cube.
pub const FULL_BARRIER: [f32; 6] = [1.0; 6];

/// Whether a fluid block is settled or moving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowKind {
    #[default]
    Still,
    Flowing,
}

/// The flowing capability of a fluid block: a small record, no behavior.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlowState {
    pub kind: FlowKind,
    pub normal: Vec3,
    pub lava: bool,
}

/// Fluid-specific properties of a block.
#[derive(Debug, Clone, PartialEq)]
pub struct FluidProps {
    /// Family (base identity) shared by all level variants of one liquid.
    pub family: String,
    /// Liquid code used for merge classification (`"water"`, `"lava"`, ...).
    pub liquid: String,
    /// `true` for level-quantized families; `false` for full legacy fluid bodies.
    pub quantized: bool,
    pub flow: FlowState,
}

impl FluidProps {
    /// Water-like fluids merge with each other; lava never does.
    pub fn is_water_like(&self) -> bool {
        !self.flow.lava && self.liquid.contains("water")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BlockKind {
    Air,
    Solid,
    Fluid(FluidProps),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockDef {
    /// Unique code, e.g. `"finitewater-water-3"` or `"stone"`.
    pub code: String,
    pub kind: BlockKind,
    /// Liquid barrier height per face (indexed by `Facing::index`), 0..=1.
    pub barrier: [f32; 6],
    /// Variant tags, e.g. `("level", "3")`.
    pub variants: Vec<(String, String)>,
}

impl BlockDef {
    pub fn solid(code: impl Into<String>, barrier: [f32; 6]) -> Self {
        Self {
            code: code.into(),
            kind: BlockKind::Solid,
            barrier,
            variants: Vec::new(),
        }
    }

    /// One level variant of a quantized fluid family. Its code is `"{family}-{level}"`.
    pub fn fluid_level(family: &str, liquid: &str, level: u8) -> Self {
        Self::fluid_tagged(family, liquid, &level.to_string())
    }

    /// A quantized fluid block with an arbitrary level tag (asset authoring path).
    pub fn fluid_tagged(family: &str, liquid: &str, tag: &str) -> Self {
        Self {
            code: format!("{family}-{tag}"),
            kind: BlockKind::Fluid(FluidProps {
                family: family.to_string(),
                liquid: liquid.to_string(),
                quantized: true,
                flow: FlowState::default(),
            }),
            barrier: NO_BARRIER,
            variants: vec![("level".to_string(), tag.to_string())],
        }
    }

    /// A full, non-quantized fluid body (the host's own liquid).
    pub fn legacy_fluid(code: impl Into<String>, liquid: &str, lava: bool) -> Self {
        let code = code.into();
        Self {
            kind: BlockKind::Fluid(FluidProps {
                family: code.clone(),
                liquid: liquid.to_string(),
                quantized: false,
                flow: FlowState {
                    lava,
                    ..FlowState::default()
                },
            }),
            code,
            barrier: NO_BARRIER,
            variants: Vec::new(),
        }
    }

    pub fn variant(&self, key: &str) -> Option<&str> {
        self.variants
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fluid(&self) -> Option<&FluidProps> {
        match &self.kind {
            BlockKind::Fluid(props) => Some(props),
            _ => None,
        }
    }

    pub fn is_fluid(&self) -> bool {
        matches!(self.kind, BlockKind::Fluid(_))
    }

    /// The storage layer this block lives in.
    pub fn store_layer(&self) -> StoreLayer {
        if self.is_fluid() {
            StoreLayer::Fluid
        } else {
            StoreLayer::Solid
        }
    }
}

/// All known blocks, indexed by `BlockId`.
pub struct BlockRegistry {
    defs: Vec<BlockDef>,
    by_code: HashMap<String, BlockId>,
}

impl BlockRegistry {
    /// A registry containing only air (id 0).
    pub fn new() -> Self {
        let air = BlockDef {
            code: "air".to_string(),
            kind: BlockKind::Air,
            barrier: NO_BARRIER,
            variants: Vec::new(),
        };
        let mut by_code = HashMap::new();
        by_code.insert(air.code.clone(), BlockId::AIR);
        Self {
            defs: vec![air],
            by_code,
        }
    }

    /// Register a block and return its id. Re-registering a code returns the
    /// existing id unchanged.
    pub fn register(&mut self, def: BlockDef) -> BlockId {
        if let Some(&id) = self.by_code.get(&def.code) {
            return id;
        }
        let id = BlockId(self.defs.len() as u16);
        self.by_code.insert(def.code.clone(), id);
        self.defs.push(def);
        id
    }

    /// Register levels `1..=max_level` of a quantized family.
    pub fn register_fluid_family(&mut self, family: &str, liquid: &str, max_level: u8) -> Vec<BlockId> {
        (1..=max_level)
            .map(|level| self.register(BlockDef::fluid_level(family, liquid, level)))
            .collect()
    }

    pub fn get(&self, id: BlockId) -> Option<&BlockDef> {
        self.defs.get(id.0 as usize)
    }

    pub fn lookup(&self, code: &str) -> Option<BlockId> {
        self.by_code.get(code).copied()
    }

    pub fn code(&self, id: BlockId) -> &str {
        self.get(id).map(|d| d.code.as_str()).unwrap_or("unknown")
    }

    /// Liquid barrier height of `id` on `facing`. Unknown ids do not obstruct.
    pub fn barrier_height(&self, id: BlockId, facing: Facing) -> f32 {
        self.get(id).map(|d| d.barrier[facing.index()]).unwrap_or(0.0)
    }

    pub fn fluid(&self, id: BlockId) -> Option<&FluidProps> {
        self.get(id).and_then(BlockDef::fluid)
    }

    pub fn is_fluid(&self, id: BlockId) -> bool {
        self.fluid(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}
