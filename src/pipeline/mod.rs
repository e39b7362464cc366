//! Configuration and execution of a demultiplexing run.

mod config;
mod runner;

pub use config::DemuxConfig;
pub use runner::{demux, demux_dominant_tag, demux_positive_set, DemuxResult};
