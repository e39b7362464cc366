//! Combining per-tag group assignments into one call per cell.
//!
//! Two policies with different tie-break semantics are kept side by side:
//!
//! - [`ClassificationPolicy::PositiveSet`]: every tag votes in/out for every
//!   cell; the set of positive tags decides the label.
//! - [`ClassificationPolicy::DominantTag`]: the cell's highest-count tag is
//!   looked up in the cell's own group assignment, and the size of that group
//!   decides between the tag and `Doublet`.

pub mod dominant_tag;
pub mod positive_set;

pub use dominant_tag::{call_dominant_tag, classify_dominant_tag, legacy_tag_name, CallState};
pub use positive_set::{call_positive_set, classify_positive_set, truncate_label};

use crate::error::{DemuxError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which combination rule turns partitions into labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationPolicy {
    /// Per-tag positive-set voting over column partitions.
    PositiveSet,
    /// Dominant-tag group membership over per-cell partitions.
    DominantTag,
}

impl FromStr for ClassificationPolicy {
    type Err = DemuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "positive_set" => Ok(Self::PositiveSet),
            "dominant_tag" => Ok(Self::DominantTag),
            other => Err(DemuxError::Configuration(format!(
                "Unknown classification policy '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ClassificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PositiveSet => f.write_str("positive_set"),
            Self::DominantTag => f.write_str("dominant_tag"),
        }
    }
}
