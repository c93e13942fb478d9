//! Per-tick driver: fires due rechecks and runs them through a buffered pass.

use super::error::FluidError;
use super::leveling::{FluidPass, Handling, LevelingEngine, PassReport, Placement};
use crate::schedule::DebounceScheduler;
use crate::world::World;
use crate::world::access::{BulkAccess, GridAccess};
use crate::world::block::BlockId;
use crate::world::position::{BlockPos, ChunkPos};

/// A leveling engine plus the scheduler that owns its pending rechecks.
///
/// All mutation happens on the caller's thread. Each public entry point opens
/// one [`BulkAccess`], does its work and commits once.
pub struct FluidSimulation {
    engine: LevelingEngine,
    scheduler: DebounceScheduler,
}

impl FluidSimulation {
    pub fn new(engine: LevelingEngine) -> Self {
        Self {
            engine,
            scheduler: DebounceScheduler::new(),
        }
    }

    pub fn engine(&self) -> &LevelingEngine {
        &self.engine
    }

    pub fn scheduler(&self) -> &DebounceScheduler {
        &self.scheduler
    }

    pub fn pending(&self) -> usize {
        self.scheduler.len()
    }

    /// No recheck is outstanding.
    pub fn is_quiet(&self) -> bool {
        self.scheduler.is_empty()
    }

    /// Advance time by `dt_ms` and evaluate every recheck that came due.
    ///
    /// At most `max_evaluations_per_tick` rechecks run; the rest are re-armed
    /// for the next tick. On an integrity error the not-yet-evaluated
    /// positions are re-armed as well, completed work is committed, and the
    /// error is returned.
    pub fn tick(&mut self, world: &World, dt_ms: u64) -> Result<PassReport, FluidError> {
        let mut due = self.scheduler.advance(dt_ms);
        let cap = self.engine.config().max_evaluations_per_tick;
        let deferred = if due.len() > cap { due.split_off(cap) } else { Vec::new() };

        let mut bulk = BulkAccess::new(world);
        let mut pass = self.engine.pass(&mut bulk, &mut self.scheduler);

        if !deferred.is_empty() {
            tracing::warn!(
                "IterationLimitReached: {} rechecks due this tick, deferring {}",
                cap + deferred.len(),
                deferred.len()
            );
            for &pos in &deferred {
                pass.arm_now(pos);
            }
        }

        let mut failure = None;
        for (i, &pos) in due.iter().enumerate() {
            if let Err(e) = pass.evaluate(pos) {
                for &rest in &due[i + 1..] {
                    pass.arm_now(rest);
                }
                failure = Some((pos, e));
                break;
            }
        }

        let mut report = pass.finish();
        if !deferred.is_empty() {
            report.limit_hits += 1;
            report.deferred = deferred.len() as u64;
        }
        report.committed = bulk.commit() as u64;

        match failure {
            Some((pos, e)) => {
                tracing::error!("Fluid evaluation at {:?} failed: {}", pos, e);
                Err(e)
            }
            None => Ok(report),
        }
    }

    /// Tick until nothing is pending or `max_ticks` have run. Returns the
    /// number of ticks taken.
    pub fn run_until_quiet(&mut self, world: &World, dt_ms: u64, max_ticks: usize) -> Result<usize, FluidError> {
        let mut ticks = 0;
        while !self.is_quiet() && ticks < max_ticks {
            self.tick(world, dt_ms)?;
            ticks += 1;
        }
        Ok(ticks)
    }

    /// Run `f` inside a buffered pass and commit its writes.
    pub fn with_pass<R>(
        &mut self,
        world: &World,
        f: impl FnOnce(&mut FluidPass<'_, BulkAccess<'_>>) -> R,
    ) -> (R, PassReport) {
        let mut bulk = BulkAccess::new(world);
        let mut pass = self.engine.pass(&mut bulk, &mut self.scheduler);
        let out = f(&mut pass);
        let mut report = pass.finish();
        report.committed = bulk.commit() as u64;
        (out, report)
    }

    /// Add `amount` units at `pos`, overflowing upward.
    pub fn add_fluid(&mut self, world: &World, pos: BlockPos, amount: u32) -> Result<Placement, FluidError> {
        self.with_pass(world, |pass| pass.add_fluid(pos, amount)).0
    }

    pub fn on_placed(&mut self, world: &World, pos: BlockPos) {
        self.with_pass(world, |pass| pass.on_placed(pos));
    }

    pub fn on_neighbor_changed(&mut self, world: &World, pos: BlockPos) -> Handling {
        self.with_pass(world, |pass| pass.on_neighbor_changed(pos)).0
    }

    pub fn take_one_unit(&mut self, world: &World, pos: BlockPos) -> Result<bool, FluidError> {
        self.with_pass(world, |pass| pass.take_one_unit(pos)).0
    }

    pub fn resolve_addition(&mut self, world: &World, pos: BlockPos, intended: BlockId) -> Result<BlockId, FluidError> {
        self.with_pass(world, |pass| pass.resolve_addition(pos, intended)).0
    }

    pub fn evaporate(&mut self, world: &World, pos: BlockPos, roll: f64) -> Result<bool, FluidError> {
        self.with_pass(world, |pass| pass.evaporate(pos, roll)).0
    }

    /// Drop pending rechecks inside `chunk` (called before the host unloads it).
    pub fn forget_chunk(&mut self, chunk: ChunkPos) -> usize {
        let doomed: Vec<BlockPos> = self
            .scheduler
            .pending_positions()
            .filter(|p| p.chunk() == chunk)
            .collect();
        for &pos in &doomed {
            self.scheduler.cancel(pos);
        }
        doomed.len()
    }
}
