//! Normalization of raw HTO counts before per-cell partitioning.
//!
//! - **CLR**: centered log-ratio against the geometric mean of `count + 1`
//! - **Noise-floor CLR**: clip counts below the cell mean, then CLR
//! - **Ratio rescue**: ratio to the geometric mean without the log

pub mod clr;

pub use clr::{
    norm_clr, norm_noise_floor_clr, norm_ratio_rescue, normalize, pseudo_geometric_mean,
    NormalizationMode,
};
