//! Per-label cell counts and per-tag partition quality.

pub mod stats;

pub use stats::{write_stats, StatsReport, TOTAL_KEY};
