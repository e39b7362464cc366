//! Hashtag Oligo (HTO) Demultiplexing Library
//!
//! Calls each cell of a pooled single-cell experiment as a singlet of one
//! hashtag, a `Doublet`, or `Negative`, from its cell × HTO values.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (CountMatrix, ClassificationTable) and table I/O
//! - **normalize**: Per-cell CLR transforms of raw counts
//! - **filter**: Low-count cell filtering
//! - **cluster**: Two-group partitioning (k-means, Gaussian mixture) and quality metrics
//! - **classify**: Positive-set and dominant-tag calling policies
//! - **report**: Label counts and per-tag metrics
//! - **pipeline**: Configuration and execution
//! - **observe**: Injected progress/warning sinks
//! - **benchmark**: Synthetic data with known labels
//!
//! # Example
//!
//! ```no_run
//! use hto_demux::prelude::*;
//!
//! // Load already-normalized values
//! let matrix = CountMatrix::from_table("dsb_normalized.tsv").unwrap();
//!
//! // Partition every tag with a Gaussian mixture and vote
//! let result = DemuxConfig::new()
//!     .method(ClusterMethod::Gmm)
//!     .policy(ClassificationPolicy::PositiveSet)
//!     .run(&matrix, &LogObserver)
//!     .unwrap();
//!
//! result.table.write_tsv("classification.tsv.gz").unwrap();
//! result.report().write("stats.yml").unwrap();
//! ```

pub mod benchmark;
pub mod classify;
pub mod cluster;
pub mod data;
pub mod error;
pub mod filter;
pub mod normalize;
pub mod observe;
pub mod pipeline;
pub mod report;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::benchmark::{
        generate_bimodal, generate_counts, BimodalConfig, CountsConfig, SyntheticHto,
    };
    pub use crate::classify::{classify_dominant_tag, classify_positive_set, ClassificationPolicy};
    pub use crate::cluster::{
        partition, partition_values, ClusterMethod, ClusterParams, PartitionMetrics,
        PartitionResult,
    };
    pub use crate::data::{merge_expression, CellLabel, ClassificationTable, CountMatrix, HashId};
    pub use crate::error::{DemuxError, Result};
    pub use crate::filter::{filter_low_count, LowCountFilterResult};
    pub use crate::normalize::{normalize, NormalizationMode};
    pub use crate::observe::{DemuxObserver, LogObserver, NullObserver, RecordingObserver};
    pub use crate::pipeline::{demux, demux_dominant_tag, demux_positive_set, DemuxConfig, DemuxResult};
    pub use crate::report::{write_stats, StatsReport};
}
