pub mod debounce;

pub use debounce::{DebounceScheduler, PendingRecheck, TimerId};
