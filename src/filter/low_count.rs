//! Low-count cell filtering ahead of per-cell partitioning.

use crate::data::CountMatrix;
use crate::error::{DemuxError, Result};
use serde::{Deserialize, Serialize};

/// Outcome of [`filter_low_count`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LowCountFilterResult {
    /// Threshold applied; cells with a total at or below it are dropped.
    pub min_total_count: u64,
    /// Row indices (into the input matrix) of cells kept for clustering.
    pub kept: Vec<usize>,
    /// Row indices of cells that go straight to `Negative`.
    pub filtered: Vec<usize>,
}

impl LowCountFilterResult {
    pub fn n_before(&self) -> usize {
        self.kept.len() + self.filtered.len()
    }

    pub fn n_kept(&self) -> usize {
        self.kept.len()
    }

    pub fn n_filtered(&self) -> usize {
        self.filtered.len()
    }
}

impl std::fmt::Display for LowCountFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Low Count Filter Result")?;
        writeln!(f, "  Threshold:      {}", self.min_total_count)?;
        writeln!(f, "  Cells before:   {}", self.n_before())?;
        writeln!(f, "  Cells kept:     {}", self.n_kept())?;
        writeln!(f, "  Cells negative: {}", self.n_filtered())?;
        Ok(())
    }
}

/// Split cells by total raw HTO count.
///
/// A cell whose summed count across all tags is `<= min_total_count` is never
/// clustered; the caller labels it `Negative`. With the default threshold of 0
/// only all-zero cells are removed.
///
/// # Arguments
/// * `counts` - Raw (non-negative) counts, cells × tags
/// * `min_total_count` - Inclusive upper bound of totals treated as empty
pub fn filter_low_count(counts: &CountMatrix, min_total_count: u64) -> Result<LowCountFilterResult> {
    let totals = counts.row_totals();
    if let Some((i, total)) = totals
        .iter()
        .enumerate()
        .find(|(_, t)| t.is_nan() || **t < 0.0)
    {
        return Err(DemuxError::InvalidValue {
            value: total.to_string(),
            row: i,
            col: 0,
        });
    }

    let threshold = min_total_count as f64;
    let (kept, filtered): (Vec<usize>, Vec<usize>) =
        (0..counts.n_cells()).partition(|&i| totals[i] > threshold);

    Ok(LowCountFilterResult {
        min_total_count,
        kept,
        filtered,
    })
}

/// Filter and return the kept cells as their own matrix.
pub fn filter_low_count_with_matrix(
    counts: &CountMatrix,
    min_total_count: u64,
) -> Result<(CountMatrix, LowCountFilterResult)> {
    let result = filter_low_count(counts, min_total_count)?;
    let kept = counts.subset_cells(&result.kept)?;
    Ok((kept, result))
}
