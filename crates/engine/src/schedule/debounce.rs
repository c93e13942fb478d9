use std::collections::HashMap;

use slotmap::{SlotMap, new_key_type};

use crate::world::position::BlockPos;

new_key_type! {
    /// Handle for one outstanding recheck timer.
    pub struct TimerId;
}

/// A delayed recheck of one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRecheck {
    pub pos: BlockPos,
    /// Scheduler time (ms) at which the recheck fires.
    pub fire_at: u64,
    /// Registration order, used to break ties between equal `fire_at`.
    seq: u64,
}

/// Unique, coalescing, delayed callbacks keyed by position.
///
/// At most one timer per position is outstanding. Registering a position that
/// already has a timer resets its delay instead of adding a second one, so a
/// burst of neighbor changes produces a single evaluation.
///
/// Time is virtual: the owner advances it with [`advance`](Self::advance) once
/// per tick and runs whatever came due.
pub struct DebounceScheduler {
    timers: SlotMap<TimerId, PendingRecheck>,
    by_pos: HashMap<BlockPos, TimerId>,
    now_ms: u64,
    next_seq: u64,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self {
            timers: SlotMap::with_key(),
            by_pos: HashMap::new(),
            now_ms: 0,
            next_seq: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Arm (or re-arm) the recheck for `pos` to fire `delay_ms` from now.
    /// Returns `true` if a new timer was created, `false` if an existing one
    /// was reset.
    pub fn register_unique_delayed(&mut self, pos: BlockPos, delay_ms: u64) -> bool {
        let fire_at = self.now_ms + delay_ms;
        let seq = self.next_seq;
        self.next_seq += 1;

        if let Some(&id) = self.by_pos.get(&pos) {
            if let Some(timer) = self.timers.get_mut(id) {
                timer.fire_at = fire_at;
                timer.seq = seq;
                return false;
            }
        }

        let id = self.timers.insert(PendingRecheck { pos, fire_at, seq });
        self.by_pos.insert(pos, id);
        true
    }

    /// Drop the outstanding timer for `pos`, if any.
    pub fn cancel(&mut self, pos: BlockPos) -> bool {
        match self.by_pos.remove(&pos) {
            Some(id) => self.timers.remove(id).is_some(),
            None => false,
        }
    }

    pub fn is_pending(&self, pos: BlockPos) -> bool {
        self.by_pos.contains_key(&pos)
    }

    pub fn fire_at(&self, pos: BlockPos) -> Option<u64> {
        self.by_pos
            .get(&pos)
            .and_then(|&id| self.timers.get(id))
            .map(|t| t.fire_at)
    }

    pub fn pending_positions(&self) -> impl Iterator<Item = BlockPos> + '_ {
        self.by_pos.keys().copied()
    }

    /// Earliest scheduled fire time, if anything is pending.
    pub fn next_due(&self) -> Option<u64> {
        self.timers.values().map(|t| t.fire_at).min()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Advance time by `dt_ms` and remove every timer that came due.
    ///
    /// Due positions are returned in fire order (earliest first, then
    /// registration order). Each fires once; the caller re-arms if needed.
    pub fn advance(&mut self, dt_ms: u64) -> Vec<BlockPos> {
        self.now_ms += dt_ms;
        let now = self.now_ms;

        let mut due: Vec<(TimerId, PendingRecheck)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.fire_at <= now)
            .map(|(id, t)| (id, *t))
            .collect();
        due.sort_by_key(|(_, t)| (t.fire_at, t.seq));

        due.into_iter()
            .map(|(id, timer)| {
                self.timers.remove(id);
                self.by_pos.remove(&timer.pos);
                timer.pos
            })
            .collect()
    }
}

impl Default for DebounceScheduler {
    fn default() -> Self {
        Self::new()
    }
}
