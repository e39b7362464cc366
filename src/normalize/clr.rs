//! Per-cell centered log-ratio (CLR) transforms of raw HTO counts.
//!
//! All three transforms work row by row (one cell at a time) and share the same
//! reference: the geometric mean of the row's `count + 1` values, which keeps
//! the logarithm away from zero.

use crate::data::CountMatrix;
use crate::error::{DemuxError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which transform to apply before partitioning cell rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum NormalizationMode {
    /// `log1p((x + 1) / gmean(x + 1))` per cell.
    Clr = 1,
    /// Subtract the row mean, clip at zero, then CLR.
    NoiseFloorClr = 2,
    /// `x / gmean(x + 1)` without the log; noisier, more doublet tolerant.
    RatioRescue = 3,
}

impl TryFrom<u8> for NormalizationMode {
    type Error = DemuxError;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            1 => Ok(Self::Clr),
            2 => Ok(Self::NoiseFloorClr),
            3 => Ok(Self::RatioRescue),
            other => Err(DemuxError::Configuration(format!(
                "Unknown normalization mode {}; expected 1 (CLR), 2 (noise-floor CLR) or 3 (ratio rescue)",
                other
            ))),
        }
    }
}

impl From<NormalizationMode> for u8 {
    fn from(mode: NormalizationMode) -> u8 {
        mode as u8
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Clr => "CLR",
            Self::NoiseFloorClr => "noise-floor CLR",
            Self::RatioRescue => "ratio rescue",
        };
        f.write_str(name)
    }
}

/// Geometric mean of `x + 1` over a row.
///
/// Geometric mean = exp(mean(log(x + 1)))
pub fn pseudo_geometric_mean(row: &[f64]) -> f64 {
    if row.is_empty() {
        return 1.0;
    }
    let mean_log = row.iter().map(|&x| (x + 1.0).ln()).sum::<f64>() / row.len() as f64;
    mean_log.exp()
}

fn clr_row(row: &[f64]) -> Vec<f64> {
    let gmean = pseudo_geometric_mean(row);
    row.iter().map(|&x| ((x + 1.0) / gmean).ln_1p()).collect()
}

fn noise_floor_clr_row(row: &[f64]) -> Vec<f64> {
    let mean = row.iter().sum::<f64>() / row.len().max(1) as f64;
    let clipped: Vec<f64> = row.iter().map(|&x| (x - mean).max(0.0)).collect();
    clr_row(&clipped)
}

fn ratio_row(row: &[f64]) -> Vec<f64> {
    let gmean = pseudo_geometric_mean(row);
    row.iter().map(|&x| x / gmean).collect()
}

fn transform_rows<F>(counts: &CountMatrix, f: F) -> Result<CountMatrix>
where
    F: Fn(&[f64]) -> Vec<f64> + Sync,
{
    let (n_cells, n_tags) = counts.data().shape();
    if n_cells == 0 || n_tags == 0 {
        return Err(DemuxError::EmptyData(
            "Cannot normalize an empty matrix".to_string(),
        ));
    }

    // Raw counts only; x + 1 must stay positive for the logarithm.
    for i in 0..n_cells {
        for j in 0..n_tags {
            let val = counts.get(i, j);
            if val.is_nan() || val < 0.0 {
                return Err(DemuxError::InvalidValue {
                    value: val.to_string(),
                    row: i,
                    col: j,
                });
            }
        }
    }

    let rows: Vec<Vec<f64>> = (0..n_cells)
        .into_par_iter()
        .map(|i| f(&counts.row(i)))
        .collect();

    let data = DMatrix::from_fn(n_cells, n_tags, |i, j| rows[i][j]);
    counts.with_data(data)
}

/// Apply CLR per cell.
pub fn norm_clr(counts: &CountMatrix) -> Result<CountMatrix> {
    transform_rows(counts, clr_row)
}

/// Subtract each cell's mean count, clip negatives to zero, then CLR.
pub fn norm_noise_floor_clr(counts: &CountMatrix) -> Result<CountMatrix> {
    transform_rows(counts, noise_floor_clr_row)
}

/// Divide by the geometric mean of `count + 1` without taking the log.
pub fn norm_ratio_rescue(counts: &CountMatrix) -> Result<CountMatrix> {
    transform_rows(counts, ratio_row)
}

/// Dispatch on `mode`.
pub fn normalize(counts: &CountMatrix, mode: NormalizationMode) -> Result<CountMatrix> {
    match mode {
        NormalizationMode::Clr => norm_clr(counts),
        NormalizationMode::NoiseFloorClr => norm_noise_floor_clr(counts),
        NormalizationMode::RatioRescue => norm_ratio_rescue(counts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn create_test_counts() -> CountMatrix {
        // 2 cells × 4 tags
        CountMatrix::from_rows(
            &[vec![0.0, 3.0, 1.0, 7.0], vec![120.0, 2.0, 0.0, 5.0]],
            vec!["c1".into(), "c2".into()],
            vec!["A".into(), "B".into(), "C".into(), "D".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_mode_from_integer() {
        assert_eq!(NormalizationMode::try_from(1).unwrap(), NormalizationMode::Clr);
        assert_eq!(
            NormalizationMode::try_from(3).unwrap(),
            NormalizationMode::RatioRescue
        );
        assert!(matches!(
            NormalizationMode::try_from(0),
            Err(DemuxError::Configuration(_))
        ));
        assert!(NormalizationMode::try_from(4).is_err());
    }

    #[test]
    fn test_pseudo_geometric_mean() {
        // (1 * 4 * 2 * 8)^(1/4) = 64^(1/4)
        let gmean = pseudo_geometric_mean(&[0.0, 3.0, 1.0, 7.0]);
        assert_relative_eq!(gmean, 64.0_f64.powf(0.25), epsilon = 1e-12);
    }

    #[test]
    fn test_clr_manual_calculation() {
        let result = norm_clr(&create_test_counts()).unwrap();
        let gmean = 64.0_f64.powf(0.25);
        assert_relative_eq!(result.get(0, 0), (1.0 / gmean).ln_1p(), epsilon = 1e-12);
        assert_relative_eq!(result.get(0, 3), (8.0 / gmean).ln_1p(), epsilon = 1e-12);
        assert_eq!(result.cell_ids(), create_test_counts().cell_ids());
    }

    #[test]
    fn test_clr_preserves_order_within_cell() {
        let result = norm_clr(&create_test_counts()).unwrap();
        let row = result.row(1);
        assert!(row[0] > row[3]);
        assert!(row[3] > row[1]);
        assert!(row[1] > row[2]);
        assert!(row.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_noise_floor_clips_below_mean() {
        // row 0 mean = 2.75; clipped = [0, 0.25, 0, 4.25]
        let result = norm_noise_floor_clr(&create_test_counts()).unwrap();
        let clipped = [0.0, 0.25, 0.0, 4.25];
        let gmean = pseudo_geometric_mean(&clipped);
        for (j, &c) in clipped.iter().enumerate() {
            assert_relative_eq!(result.get(0, j), ((c + 1.0) / gmean).ln_1p(), epsilon = 1e-12);
        }
        // equal clipped entries give equal values
        assert_relative_eq!(result.get(0, 0), result.get(0, 2), epsilon = 1e-12);
    }

    #[test]
    fn test_ratio_rescue_has_no_log() {
        let result = norm_ratio_rescue(&create_test_counts()).unwrap();
        let gmean = 64.0_f64.powf(0.25);
        assert_relative_eq!(result.get(0, 0), 0.0, epsilon = 1e-12);
        assert_relative_eq!(result.get(0, 3), 7.0 / gmean, epsilon = 1e-12);
    }

    #[test]
    fn test_normalize_dispatch() {
        let counts = create_test_counts();
        let a = normalize(&counts, NormalizationMode::Clr).unwrap();
        let b = norm_clr(&counts).unwrap();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_rejects_negative_counts() {
        let counts = CountMatrix::from_rows(
            &[vec![1.0, -2.0]],
            vec!["c1".into()],
            vec!["A".into(), "B".into()],
        )
        .unwrap();
        assert!(norm_clr(&counts).is_err());
    }

    #[test]
    fn test_mode_yaml_uses_integer() {
        let yaml = serde_yaml::to_string(&NormalizationMode::NoiseFloorClr).unwrap();
        assert_eq!(yaml.trim(), "2");
        let parsed: NormalizationMode = serde_yaml::from_str("3").unwrap();
        assert_eq!(parsed, NormalizationMode::RatioRescue);
        assert!(serde_yaml::from_str::<NormalizationMode>("7").is_err());
    }
}
