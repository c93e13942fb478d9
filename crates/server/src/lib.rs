pub mod block;
pub mod calendar;
pub mod config;
pub mod host;
pub mod metrics;
pub mod persistence;
pub mod simulation;
pub mod weather;
pub mod worldgen;
