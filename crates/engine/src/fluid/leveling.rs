//! The leveling engine: per-cell redistribution of a quantized fluid.
//!
//! An evaluation runs up to three phases and stops at the first one that
//! changes anything:
//!
//! 1. **Vertical transfer** into the cell below (or a merge into a full
//!    water-like body below).
//! 2. **Downward pouring** over ledges into the cells diagonally below,
//!    round-robin across candidates ranked downwind first.
//! 3. **Horizontal equalization** with the open horizontal neighbors, giving
//!    remainder units to the most downwind cells. A neighborhood that is
//!    already a fair division is left alone, so the extra unit never
//!    shuttles between two cells.
//!
//! Every level change goes through [`FluidPass::set_level`], which writes via
//! the codec, re-arms the debounced recheck of each same-family neighbor and
//! of the cell itself. Nothing is evaluated inline: cascades only happen
//! through the scheduler.

use super::MAX_LEVEL;
use super::codec::LevelCodec;
use super::error::FluidError;
use crate::config::LevelingConfig;
use crate::schedule::DebounceScheduler;
use crate::world::access::GridAccess;
use crate::world::block::{BlockId, Facing, Layer};
use crate::world::position::BlockPos;

/// Whether the host should still run its own neighbor-change reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handling {
    PassThrough,
    PreventDefault,
}

/// Which phase (if any) changed the cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Idle,
    MovedDown,
    Merged,
    Poured,
    Equalized,
}

impl Outcome {
    pub fn changed(self) -> bool {
        self != Outcome::Idle
    }
}

/// Result of an external addition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Placement {
    pub placed: u32,
    /// Units refused by the world (blocked or unloaded cell above).
    pub lost: u32,
}

/// Counters for one pass (one tick, or one external hook call).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PassReport {
    pub evaluations: u64,
    pub mutations: u64,
    pub moved_down: u64,
    pub merged: u64,
    pub poured: u64,
    pub equalized: u64,
    pub evaporated: u64,
    pub overflow_lost: u64,
    pub conservation_anomalies: u64,
    pub limit_hits: u64,
    /// Due rechecks pushed to the next tick by the per-tick cap.
    pub deferred: u64,
    /// Writes that reached the world on commit.
    pub committed: u64,
}

impl PassReport {
    pub fn merge(&mut self, other: &PassReport) {
        self.evaluations += other.evaluations;
        self.mutations += other.mutations;
        self.moved_down += other.moved_down;
        self.merged += other.merged;
        self.poured += other.poured;
        self.equalized += other.equalized;
        self.evaporated += other.evaporated;
        self.overflow_lost += other.overflow_lost;
        self.conservation_anomalies += other.conservation_anomalies;
        self.limit_hits += other.limit_hits;
        self.deferred += other.deferred;
        self.committed += other.committed;
    }
}

/// Cell state fetched once per evaluation. Never stored across passes.
#[derive(Debug, Clone, Copy)]
struct CellSnapshot {
    level: u8,
    solid: BlockId,
    below_most_solid: BlockId,
}

/// The behavior of one quantized fluid family.
pub struct LevelingEngine {
    codec: LevelCodec,
    config: LevelingConfig,
}

impl LevelingEngine {
    pub fn new(codec: LevelCodec, config: LevelingConfig) -> Self {
        Self { codec, config }
    }

    pub fn codec(&self) -> &LevelCodec {
        &self.codec
    }

    pub fn config(&self) -> &LevelingConfig {
        &self.config
    }

    /// Open a pass over `grid`. Rechecks are armed on `scheduler`.
    pub fn pass<'a, G: GridAccess>(
        &'a self,
        grid: &'a mut G,
        scheduler: &'a mut DebounceScheduler,
    ) -> FluidPass<'a, G> {
        FluidPass {
            engine: self,
            grid,
            scheduler,
            report: PassReport::default(),
        }
    }
}

/// Fill fraction of a level, compared against barrier heights.
pub fn fill_fraction(level: u8) -> f32 {
    level as f32 / MAX_LEVEL as f32
}

/// One pass of engine work against a grid and a scheduler.
pub struct FluidPass<'a, G: GridAccess> {
    engine: &'a LevelingEngine,
    grid: &'a mut G,
    scheduler: &'a mut DebounceScheduler,
    report: PassReport,
}

impl<G: GridAccess> FluidPass<'_, G> {
    pub fn report(&self) -> &PassReport {
        &self.report
    }

    /// Close the pass and hand back its counters. Committing is the caller's job.
    pub fn finish(self) -> PassReport {
        self.report
    }

    fn codec(&self) -> &LevelCodec {
        &self.engine.codec
    }

    fn delay(&self) -> u64 {
        self.engine.config.spread_delay_ms
    }

    pub fn level_at(&self, pos: BlockPos) -> Result<u8, FluidError> {
        let block = self.grid.get_block(pos, Layer::Fluid);
        self.codec().block_to_level(block)
    }

    fn is_family_at(&self, pos: BlockPos) -> bool {
        self.codec().is_family(self.grid.get_block(pos, Layer::Fluid))
    }

    fn barrier(&self, block: BlockId, facing: Facing, pos: BlockPos) -> f32 {
        self.grid.barrier_height(block, facing, pos)
    }

    /// Arm the recheck of `pos` with the configured delay.
    pub fn arm(&mut self, pos: BlockPos) {
        let delay = self.delay();
        self.scheduler.register_unique_delayed(pos, delay);
    }

    /// Arm the recheck of `pos` for the very next tick.
    pub fn arm_now(&mut self, pos: BlockPos) {
        self.scheduler.register_unique_delayed(pos, 0);
    }

    // ── Evaluation ──────────────────────────────────────────────────────

    /// Re-evaluate one cell. Called when its debounced recheck fires.
    pub fn evaluate(&mut self, pos: BlockPos) -> Result<Outcome, FluidError> {
        self.report.evaluations += 1;

        let fluid = self.grid.get_block(pos, Layer::Fluid);
        if !self.codec().is_family(fluid) {
            return Ok(Outcome::Idle);
        }
        let below = pos.down();
        let snap = CellSnapshot {
            level: self.codec().block_to_level(fluid)?,
            solid: self.grid.get_block(pos, Layer::Solid),
            below_most_solid: self.grid.get_block(below, Layer::Default),
        };

        let on_solid_ground = self.barrier(snap.below_most_solid, Facing::Up, below) >= 1.0
            || self.barrier(snap.solid, Facing::Down, pos) >= 1.0;

        if !on_solid_ground {
            let outcome = self.try_move_downwards(pos, &snap)?;
            if outcome.changed() {
                return Ok(outcome);
            }
        }

        if self.try_pour_down(pos, &snap)? {
            self.report.poured += 1;
            return Ok(Outcome::Poured);
        }

        if snap.level > 1 && self.try_equalize(pos, &snap)? {
            self.report.equalized += 1;
            return Ok(Outcome::Equalized);
        }

        Ok(Outcome::Idle)
    }

    /// Barrier admission test for moving fluid at `level` from `pos` into
    /// `new_pos` through `facing`.
    ///
    /// Denied when either side's barrier reaches the fill fraction (`>=`),
    /// when the target is unloaded or holds a different fluid, or when the
    /// target is full. Admitted when the target is strictly lower; otherwise
    /// only if more than one unit remains or the direction is straight down.
    pub fn can_spread_into(
        &self,
        level: u8,
        our_solid: BlockId,
        pos: BlockPos,
        new_pos: BlockPos,
        facing: Facing,
    ) -> Result<bool, FluidError> {
        let fraction = fill_fraction(level);
        if self.barrier(our_solid, facing, pos) >= fraction {
            return Ok(false);
        }

        let neighbor_solid = self.grid.get_block(new_pos, Layer::Solid);
        if self.barrier(neighbor_solid, facing.opposite(), new_pos) >= fraction {
            return Ok(false);
        }

        if !self.grid.is_loaded(new_pos) {
            return Ok(false);
        }

        let neighbor_fluid = self.grid.get_block(new_pos, Layer::Fluid);
        if !neighbor_fluid.is_air() && !self.codec().is_family(neighbor_fluid) {
            return Ok(false);
        }

        let neighbor_level = self.codec().block_to_level(neighbor_fluid)?;
        if neighbor_level < level {
            return Ok(true);
        }
        if neighbor_level == MAX_LEVEL {
            return Ok(false);
        }
        Ok(level > 1 || facing == Facing::Down)
    }

    fn try_move_downwards(&mut self, pos: BlockPos, snap: &CellSnapshot) -> Result<Outcome, FluidError> {
        let below = pos.down();
        if self.can_spread_into(snap.level, snap.solid, pos, below, Facing::Down)? {
            let level_below = self.level_at(below)?;
            let moved = snap.level.min(MAX_LEVEL - level_below);
            let new_below = level_below + moved;
            let new_here = snap.level - moved;
            self.check_conservation(
                pos,
                "vertical transfer",
                snap.level as u32 + level_below as u32,
                new_here as u32 + new_below as u32,
            );

            self.set_level(below, new_below, level_below)?;
            self.set_level(pos, new_here, snap.level)?;
            self.report.moved_down += 1;
            return Ok(Outcome::MovedDown);
        }

        // Resting on a full water-like body that is not ours: empty into it.
        let fraction = fill_fraction(snap.level);
        let blocked = self.barrier(snap.solid, Facing::Down, pos) >= fraction
            || self.barrier(self.grid.get_block(below, Layer::Solid), Facing::Up, below) >= fraction;
        if blocked {
            return Ok(Outcome::Idle);
        }
        let below_fluid = self.grid.get_block(below, Layer::Fluid);
        let registry = self.grid.registry();
        let ours_water_like = registry
            .fluid(self.grid.get_block(pos, Layer::Fluid))
            .is_some_and(|p| p.is_water_like());
        let merges = registry
            .fluid(below_fluid)
            .is_some_and(|p| !p.quantized && p.is_water_like());
        if ours_water_like && merges {
            tracing::debug!(
                "Fluid at {:?} merged {} units into {} below",
                pos,
                snap.level,
                registry.code(below_fluid)
            );
            self.set_level(pos, 0, snap.level)?;
            self.report.merged += 1;
            return Ok(Outcome::Merged);
        }

        Ok(Outcome::Idle)
    }

    /// Cells diagonally below `pos` that fluid can pour into, most downwind first.
    pub fn find_downward_pours(&self, pos: BlockPos, level: u8, our_solid: BlockId) -> Result<Vec<BlockPos>, FluidError> {
        let wind = self.grid.wind_at(pos);
        let mut candidates: Vec<(BlockPos, f64)> = Vec::new();

        for facing in Facing::HORIZONTALS {
            let side = pos.offset(facing);
            if !self.can_spread_into(level, our_solid, pos, side, facing)? {
                continue;
            }

            let side_solid = self.grid.get_block(side, Layer::Solid);
            if self.barrier(side_solid, Facing::Down, side) >= 1.0 {
                continue;
            }

            let target = side.down();
            if !self.grid.is_loaded(target) {
                continue;
            }
            let target_solid = self.grid.get_block(target, Layer::Solid);
            if self.barrier(target_solid, Facing::Up, target) >= 1.0 {
                continue;
            }
            let target_fluid = self.grid.get_block(target, Layer::Fluid);
            if !target_fluid.is_air() && !self.codec().is_family(target_fluid) {
                continue;
            }
            if self.codec().block_to_level(target_fluid)? >= MAX_LEVEL {
                continue;
            }

            candidates.push((target, side.delta_from(pos).dot(wind)));
        }

        // Stable: equal alignment keeps facing enumeration order.
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(candidates.into_iter().map(|(p, _)| p).collect())
    }

    fn try_pour_down(&mut self, pos: BlockPos, snap: &CellSnapshot) -> Result<bool, FluidError> {
        let targets = self.find_downward_pours(pos, snap.level, snap.solid)?;
        if targets.is_empty() {
            return Ok(false);
        }

        let mut before = snap.level as u32;
        for &t in &targets {
            before += self.level_at(t)? as u32;
        }

        let max_iterations = snap.level as usize + 1;
        let mut iterations = 0;
        let mut remaining = snap.level;
        let mut moved = 0u32;
        let mut full_in_a_row = 0;
        let mut i = 0;

        while remaining > 0 && iterations < max_iterations {
            iterations += 1;
            let target = targets[i];
            i = (i + 1) % targets.len();

            let target_level = self.level_at(target)?;
            if target_level >= MAX_LEVEL {
                full_in_a_row += 1;
                if full_in_a_row >= targets.len() {
                    break;
                }
                continue;
            }
            full_in_a_row = 0;

            self.set_level(target, target_level + 1, target_level)?;
            self.set_level(pos, remaining - 1, remaining)?;
            remaining -= 1;
            moved += 1;
        }

        if remaining > 0 && iterations >= max_iterations {
            self.report.limit_hits += 1;
            tracing::warn!(
                "IterationLimitReached: pouring from {:?} stopped after {} iterations with {} units left",
                pos,
                iterations,
                remaining
            );
        }

        let mut after = remaining as u32;
        for &t in &targets {
            after += self.level_at(t)? as u32;
        }
        self.check_conservation(pos, "downward pour", before, after);

        Ok(moved > 0)
    }

    fn try_equalize(&mut self, pos: BlockPos, snap: &CellSnapshot) -> Result<bool, FluidError> {
        let mut cells = vec![pos];
        for facing in Facing::HORIZONTALS {
            let side = pos.offset(facing);
            if self.can_spread_into(snap.level, snap.solid, pos, side, facing)? {
                cells.push(side);
            }
        }
        if cells.len() == 1 {
            return Ok(false);
        }

        let mut levels = Vec::with_capacity(cells.len());
        for &c in &cells {
            levels.push(self.level_at(c)?);
        }
        let total: u32 = levels.iter().map(|&l| l as u32).sum();
        let n = cells.len() as u32;
        let base = total / n;
        let extra = total % n;

        // A fair division already in place stays put: every cell at `base`
        // or `base + 1`, with exactly `extra` of the latter.
        let high = levels.iter().filter(|&&l| l as u32 == base + 1).count() as u32;
        if high == extra && levels.iter().all(|&l| l as u32 == base || l as u32 == base + 1) {
            return Ok(false);
        }

        // Remainder units go to the most downwind cells; ties keep enumeration order.
        let wind = self.grid.wind_at(pos);
        let mut order: Vec<usize> = (0..cells.len()).collect();
        if extra != 0 {
            order.sort_by(|&a, &b| {
                let da = cells[a].delta_from(pos).dot(wind);
                let db = cells[b].delta_from(pos).dot(wind);
                db.total_cmp(&da)
            });
        }

        let mut changed = false;
        for (rank, &idx) in order.iter().enumerate() {
            let new_level = base + u32::from((rank as u32) < extra);
            changed |= self.set_level(cells[idx], new_level as u8, levels[idx])?;
        }

        let mut after = 0u32;
        for &c in &cells {
            after += self.level_at(c)? as u32;
        }
        self.check_conservation(pos, "horizontal equalization", total, after);

        Ok(changed)
    }

    fn check_conservation(&mut self, pos: BlockPos, step: &str, before: u32, after: u32) {
        if before != after {
            self.report.conservation_anomalies += 1;
            tracing::error!(
                "ConservationAnomaly: {} at {:?} changed total fluid from {} to {}",
                step,
                pos,
                before,
                after
            );
        }
    }

    // ── Mutation ────────────────────────────────────────────────────────

    /// Write a new level for `pos` and re-arm rechecks around it. No-op when
    /// the level is unchanged. Returns whether anything was written.
    pub fn set_level(&mut self, pos: BlockPos, level: u8, previous: u8) -> Result<bool, FluidError> {
        if level == previous {
            return Ok(false);
        }
        let id = self.codec().level_to_block(level as i32)?;
        self.grid.set_block(id, pos, Layer::Fluid);
        self.report.mutations += 1;

        self.notify_neighbors(pos);
        if level > 0 {
            self.arm(pos);
        }
        Ok(true)
    }

    /// Arm rechecks on the six neighbors that hold this family.
    fn notify_neighbors(&mut self, pos: BlockPos) {
        let around = [
            pos.down(),
            pos.up(),
            pos.offset(Facing::North),
            pos.offset(Facing::East),
            pos.offset(Facing::South),
            pos.offset(Facing::West),
        ];
        for neighbor in around {
            if self.is_family_at(neighbor) {
                self.arm(neighbor);
            }
        }
    }

    // ── External hooks ──────────────────────────────────────────────────

    /// A block of this family was placed at `pos` by someone else.
    pub fn on_placed(&mut self, pos: BlockPos) {
        self.arm(pos);
    }

    /// A block next to `pos` changed. The engine owns the reaction for its
    /// own cells, so the host's default handling is suppressed for them.
    pub fn on_neighbor_changed(&mut self, pos: BlockPos) -> Handling {
        if self.is_family_at(pos) {
            self.arm(pos);
            Handling::PreventDefault
        } else {
            Handling::PassThrough
        }
    }

    /// Whether fluid of this family may be placed at `pos`.
    pub fn accepts_fluid(&self, pos: BlockPos) -> bool {
        if !self.grid.is_loaded(pos) {
            return false;
        }
        let solid = self.grid.get_block(pos, Layer::Solid);
        if Facing::ALL
            .iter()
            .all(|&f| self.barrier(solid, f, pos) >= 1.0)
        {
            return false;
        }
        let fluid = self.grid.get_block(pos, Layer::Fluid);
        fluid.is_air() || self.codec().is_family(fluid)
    }

    /// Add `amount` units at `pos`. Whatever does not fit overflows into the
    /// cell above, repeatedly; a refused cell loses the rest.
    pub fn add_fluid(&mut self, pos: BlockPos, amount: u32) -> Result<Placement, FluidError> {
        let mut result = Placement::default();
        let mut pos = pos;
        let mut remaining = amount;

        while remaining > 0 {
            if !self.accepts_fluid(pos) {
                result.lost = remaining;
                self.report.overflow_lost += remaining as u64;
                tracing::debug!("Overflow of {} units refused at {:?}, lost", remaining, pos);
                break;
            }

            let current = self.level_at(pos)?;
            let total = current as u32 + remaining;
            if total <= MAX_LEVEL as u32 {
                self.set_level(pos, total as u8, current)?;
                self.arm(pos);
                result.placed += remaining;
                remaining = 0;
            } else {
                self.set_level(pos, MAX_LEVEL, current)?;
                self.arm(pos);
                result.placed += (MAX_LEVEL - current) as u32;
                remaining = total - MAX_LEVEL as u32;
                pos = pos.up();
            }
        }

        Ok(result)
    }

    /// Remove one unit at `pos` on behalf of an outside actor (a container
    /// filling itself). Returns whether a unit was taken.
    pub fn take_one_unit(&mut self, pos: BlockPos) -> Result<bool, FluidError> {
        let level = self.level_at(pos)?;
        if level == 0 {
            return Ok(false);
        }
        self.set_level(pos, level - 1, level)
    }

    /// The block an outside actor should actually place at `pos` when it
    /// intends to place `intended`: same-family fluid merges with what is
    /// already there (capped at `MAX_LEVEL`). Pure; the caller places it.
    pub fn resolve_addition(&self, pos: BlockPos, intended: BlockId) -> Result<BlockId, FluidError> {
        if !self.codec().is_family(intended) {
            return Ok(intended);
        }
        let existing = self.grid.get_block(pos, Layer::Fluid);
        if !self.codec().is_family(existing) {
            return Ok(intended);
        }
        let merged = (self.codec().block_to_level(existing)? + self.codec().block_to_level(intended)?)
            .min(MAX_LEVEL);
        self.codec().level_to_block(merged as i32)
    }

    /// Only cells open to the sky (air directly above) receive random ticks.
    pub fn receives_random_ticks(&self, pos: BlockPos) -> bool {
        self.is_family_at(pos) && self.grid.get_block(pos.up(), Layer::Default).is_air()
    }

    /// Random tick: with probability `evaporation_chance` (`roll` in 0..1)
    /// the cell loses one level. Returns whether it evaporated.
    pub fn evaporate(&mut self, pos: BlockPos, roll: f64) -> Result<bool, FluidError> {
        if !self.receives_random_ticks(pos) || roll >= self.engine.config.evaporation_chance {
            return Ok(false);
        }
        let level = self.level_at(pos)?;
        self.set_level(pos, level - 1, level)?;
        self.report.evaporated += 1;
        if level == 1 {
            tracing::debug!("Fluid at {:?} has fully evaporated", pos);
        } else {
            tracing::debug!("Evaporating fluid at {:?} by one level", pos);
        }
        Ok(true)
    }
}
