//! In-game clock driven by the main timeline.

use std::sync::atomic::{AtomicU64, Ordering};

use finite_engine::rain::Calendar;

const MS_PER_MINUTE: f64 = 60_000.0;

/// Calendar hours derived from simulated milliseconds.
///
/// Time only moves when the timeline calls [`GameCalendar::advance`], so a
/// paused host does not age its chunks.
pub struct GameCalendar {
    start_hours: f64,
    hours_per_real_minute: f64,
    elapsed_ms: AtomicU64,
}

impl GameCalendar {
    pub fn new(start_hours: f64, hours_per_real_minute: f64) -> Self {
        Self {
            start_hours,
            hours_per_real_minute,
            elapsed_ms: AtomicU64::new(0),
        }
    }

    pub fn advance(&self, dt_ms: u64) {
        self.elapsed_ms.fetch_add(dt_ms, Ordering::Relaxed);
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms.load(Ordering::Relaxed)
    }
}

impl Calendar for GameCalendar {
    fn total_hours(&self) -> f64 {
        let minutes = self.elapsed_ms() as f64 / MS_PER_MINUTE;
        self.start_hours + minutes * self.hours_per_real_minute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hours_follow_simulated_time() {
        let cal = GameCalendar::new(10.0, 2.0);
        assert_eq!(cal.total_hours(), 10.0);
        cal.advance(30_000);
        assert!((cal.total_hours() - 11.0).abs() < 1e-9);
        cal.advance(90_000);
        assert!((cal.total_hours() - 14.0).abs() < 1e-9);
    }
}
