/// Opaque block identifier. The engine stores these without interpreting them;
/// meaning comes from the [`BlockRegistry`](super::registry::BlockRegistry).
///
/// The only semantic the engine enforces is that `BlockId::AIR` (0) is the
/// "empty" block: chunk sections filled entirely with AIR are deallocated, and
/// an AIR fluid cell holds level 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct BlockId(pub u16);

impl BlockId {
    /// The universal "empty" block.
    pub const AIR: BlockId = BlockId(0);

    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

/// Which block of a cell a read or write addresses.
///
/// Every cell stores two blocks: a solid one (terrain, slabs, fences) and a
/// fluid one. Fluids can coexist with partial solids in the same cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    /// The most solid block: the solid block if present, else the fluid.
    /// Writes go to the layer matching the block's kind.
    Default,
    Fluid,
    Solid,
    /// The fluid block if present, else the solid.
    FluidOrSolid,
}

/// The physical storage layer behind a [`Layer`] view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreLayer {
    Solid,
    Fluid,
}

/// One of the six faces of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    North,
    East,
    South,
    West,
    Up,
    Down,
}

impl Facing {
    /// Horizontal faces in enumeration order. Wind tie-breaks fall back to
    /// this order, so it must stay stable.
    pub const HORIZONTALS: [Facing; 4] = [Facing::North, Facing::East, Facing::South, Facing::West];

    pub const ALL: [Facing; 6] = [
        Facing::North,
        Facing::East,
        Facing::South,
        Facing::West,
        Facing::Up,
        Facing::Down,
    ];

    /// Unit offset `(dx, dy, dz)`. North is -Z, east is +X.
    pub const fn offset(self) -> (i64, i64, i64) {
        match self {
            Facing::North => (0, 0, -1),
            Facing::East => (1, 0, 0),
            Facing::South => (0, 0, 1),
            Facing::West => (-1, 0, 0),
            Facing::Up => (0, 1, 0),
            Facing::Down => (0, -1, 0),
        }
    }

    pub const fn opposite(self) -> Facing {
        match self {
            Facing::North => Facing::South,
            Facing::East => Facing::West,
            Facing::South => Facing::North,
            Facing::West => Facing::East,
            Facing::Up => Facing::Down,
            Facing::Down => Facing::Up,
        }
    }

    /// Index into per-face tables (`[f32; 6]` barrier heights).
    pub const fn index(self) -> usize {
        match self {
            Facing::North => 0,
            Facing::East => 1,
            Facing::South => 2,
            Facing::West => 3,
            Facing::Up => 4,
            Facing::Down => 5,
        }
    }

    pub const fn is_horizontal(self) -> bool {
        !matches!(self, Facing::Up | Facing::Down)
    }
}
