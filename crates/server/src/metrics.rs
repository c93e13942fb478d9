//! Lock-free simulation counters.
//!
//! Layers update these with relaxed atomic adds; the metrics layer reads a
//! snapshot at its own pace and logs it as JSON.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};
use std::time::{Duration, Instant};

use finite_engine::fluid::{LevelCodec, PassReport};
use finite_engine::rain::DrainReport;
use finite_engine::world::World;
use finite_engine::world::block::StoreLayer;

pub struct Metrics {
    // Fluid
    fluid_ticks: AtomicU64,
    fluid_tick_ns_sum: AtomicU64,
    evaluations: AtomicU64,
    mutations: AtomicU64,
    conservation_anomalies: AtomicU64,
    limit_hits: AtomicU64,
    overflow_lost: AtomicU64,
    evaporations: AtomicU64,
    fluid_errors: AtomicU64,

    // Rain
    rain_sweeps: AtomicU64,
    rain_records: AtomicU64,
    rain_placements: AtomicU64,

    // Gauges
    pending_rechecks: AtomicU64,

    // Fluid tick duration histogram
    hist_under_100us: AtomicU64,
    hist_100us_1ms: AtomicU64,
    hist_1_10ms: AtomicU64,
    hist_10_50ms: AtomicU64,
    hist_over_50ms: AtomicU64,

    started_at: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            fluid_ticks: AtomicU64::new(0),
            fluid_tick_ns_sum: AtomicU64::new(0),
            evaluations: AtomicU64::new(0),
            mutations: AtomicU64::new(0),
            conservation_anomalies: AtomicU64::new(0),
            limit_hits: AtomicU64::new(0),
            overflow_lost: AtomicU64::new(0),
            evaporations: AtomicU64::new(0),
            fluid_errors: AtomicU64::new(0),
            rain_sweeps: AtomicU64::new(0),
            rain_records: AtomicU64::new(0),
            rain_placements: AtomicU64::new(0),
            pending_rechecks: AtomicU64::new(0),
            hist_under_100us: AtomicU64::new(0),
            hist_100us_1ms: AtomicU64::new(0),
            hist_1_10ms: AtomicU64::new(0),
            hist_10_50ms: AtomicU64::new(0),
            hist_over_50ms: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Called after each fluid tick with its pass report.
    pub fn record_fluid_tick(&self, report: &PassReport, duration: Duration) {
        self.fluid_ticks.fetch_add(1, Relaxed);
        self.fluid_tick_ns_sum.fetch_add(duration.as_nanos() as u64, Relaxed);
        self.record_pass(report);

        let us = duration.as_micros() as u64;
        match us {
            0..=99 => {
                self.hist_under_100us.fetch_add(1, Relaxed);
            }
            100..=999 => {
                self.hist_100us_1ms.fetch_add(1, Relaxed);
            }
            1_000..=9_999 => {
                self.hist_1_10ms.fetch_add(1, Relaxed);
            }
            10_000..=49_999 => {
                self.hist_10_50ms.fetch_add(1, Relaxed);
            }
            _ => {
                self.hist_over_50ms.fetch_add(1, Relaxed);
            }
        }
    }

    /// Fold in a report from work done outside a tick (placement hooks, random ticks).
    pub fn record_pass(&self, report: &PassReport) {
        self.evaluations.fetch_add(report.evaluations, Relaxed);
        self.mutations.fetch_add(report.mutations, Relaxed);
        self.conservation_anomalies.fetch_add(report.conservation_anomalies, Relaxed);
        self.limit_hits.fetch_add(report.limit_hits, Relaxed);
        self.overflow_lost.fetch_add(report.overflow_lost, Relaxed);
        self.evaporations.fetch_add(report.evaporated, Relaxed);
    }

    pub fn record_fluid_error(&self) {
        self.fluid_errors.fetch_add(1, Relaxed);
    }

    pub fn record_sweep(&self) {
        self.rain_sweeps.fetch_add(1, Relaxed);
    }

    pub fn record_drain(&self, report: &DrainReport) {
        self.rain_records.fetch_add(report.records as u64, Relaxed);
        self.rain_placements.fetch_add(report.placed as u64, Relaxed);
    }

    /// Units the fluid layer added for the rain thread's drops.
    pub fn record_rain_drops(&self, placed: u64) {
        self.rain_placements.fetch_add(placed, Relaxed);
    }

    pub fn set_pending_rechecks(&self, pending: u64) {
        self.pending_rechecks.store(pending, Relaxed);
    }

    pub fn snapshot(&self, chunks_loaded: u64) -> MetricsSnapshot {
        MetricsSnapshot {
            uptime_secs: self.started_at.elapsed().as_secs_f64(),
            fluid_ticks: self.fluid_ticks.load(Relaxed),
            fluid_tick_ns_sum: self.fluid_tick_ns_sum.load(Relaxed),
            evaluations: self.evaluations.load(Relaxed),
            mutations: self.mutations.load(Relaxed),
            conservation_anomalies: self.conservation_anomalies.load(Relaxed),
            limit_hits: self.limit_hits.load(Relaxed),
            overflow_lost: self.overflow_lost.load(Relaxed),
            evaporations: self.evaporations.load(Relaxed),
            fluid_errors: self.fluid_errors.load(Relaxed),
            rain_sweeps: self.rain_sweeps.load(Relaxed),
            rain_records: self.rain_records.load(Relaxed),
            rain_placements: self.rain_placements.load(Relaxed),
            chunks_loaded,
            pending_rechecks: self.pending_rechecks.load(Relaxed),
            hist: [
                self.hist_under_100us.load(Relaxed),
                self.hist_100us_1ms.load(Relaxed),
                self.hist_1_10ms.load(Relaxed),
                self.hist_10_50ms.load(Relaxed),
                self.hist_over_50ms.load(Relaxed),
            ],
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Total finite-fluid units stored in the loaded world. Cells whose level
/// tag cannot be decoded count as zero.
pub fn fluid_volume(world: &World, codec: &LevelCodec) -> u64 {
    world
        .iter_chunks()
        .map(|entry| {
            entry
                .value()
                .sections(StoreLayer::Fluid)
                .flat_map(|(_, section)| section.blocks())
                .map(|&block| codec.block_to_level(block).unwrap_or(0) as u64)
                .sum::<u64>()
        })
        .sum()
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: f64,
    pub fluid_ticks: u64,
    pub fluid_tick_ns_sum: u64,
    pub evaluations: u64,
    pub mutations: u64,
    pub conservation_anomalies: u64,
    pub limit_hits: u64,
    pub overflow_lost: u64,
    pub evaporations: u64,
    pub fluid_errors: u64,
    pub rain_sweeps: u64,
    pub rain_records: u64,
    pub rain_placements: u64,
    pub chunks_loaded: u64,
    pub pending_rechecks: u64,
    /// `[<100μs, 100μs-1ms, 1-10ms, 10-50ms, >50ms]`
    pub hist: [u64; 5],
}
