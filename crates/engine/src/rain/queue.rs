use std::collections::{HashSet, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use crate::world::position::ChunkPos;

/// A chunk that needs a rain pass, with the calendar time of its last pass
/// as read at sweep time.
///
/// Equality and hashing use the coordinates only.
#[derive(Debug, Clone, Copy)]
pub struct ChunkUpdateRecord {
    pub coords: ChunkPos,
    pub last_pass_hours: f64,
}

impl PartialEq for ChunkUpdateRecord {
    fn eq(&self, other: &Self) -> bool {
        self.coords == other.coords
    }
}

impl Eq for ChunkUpdateRecord {}

impl Hash for ChunkUpdateRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.coords.hash(state);
    }
}

#[derive(Default)]
struct Inner {
    order: VecDeque<ChunkUpdateRecord>,
    members: HashSet<ChunkPos>,
}

/// FIFO of pending chunk records with set semantics: a chunk is queued at
/// most once. Shared by the main timeline and the background thread; the
/// lock is held only for the queue manipulation itself.
#[derive(Default)]
pub struct PendingChunks {
    inner: Mutex<Inner>,
}

impl PendingChunks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `record` unless its chunk is already pending.
    pub fn push(&self, record: ChunkUpdateRecord) -> bool {
        let mut inner = self.inner.lock().expect("rain queue poisoned");
        if !inner.members.insert(record.coords) {
            return false;
        }
        inner.order.push_back(record);
        true
    }

    pub fn pop(&self) -> Option<ChunkUpdateRecord> {
        let mut inner = self.inner.lock().expect("rain queue poisoned");
        let record = inner.order.pop_front()?;
        inner.members.remove(&record.coords);
        Some(record)
    }

    /// Dequeue up to `max` records in FIFO order.
    pub fn pop_batch(&self, max: usize) -> Vec<ChunkUpdateRecord> {
        let mut inner = self.inner.lock().expect("rain queue poisoned");
        let n = max.min(inner.order.len());
        let batch: Vec<ChunkUpdateRecord> = inner.order.drain(..n).collect();
        for record in &batch {
            inner.members.remove(&record.coords);
        }
        batch
    }

    pub fn contains(&self, coords: ChunkPos) -> bool {
        self.inner.lock().expect("rain queue poisoned").members.contains(&coords)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("rain queue poisoned").order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
