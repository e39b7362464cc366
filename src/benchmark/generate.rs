//! Synthetic hashtag data with known ground truth.
//!
//! Two generators:
//! - [`generate_bimodal`]: already-normalized values, one background/signal
//!   mixture per tag, matching what a denoising step hands the positive-set
//!   policy.
//! - [`generate_counts`]: raw UMI counts where each cell is stained by zero,
//!   one or two tags, for the dominant-tag policy.

use crate::data::{CountMatrix, HashId};
use crate::error::{DemuxError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Gamma, Normal, Poisson};
use serde::{Deserialize, Serialize};

/// Configuration for [`generate_bimodal`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BimodalConfig {
    /// Number of cells (rows).
    pub n_cells: usize,
    /// Number of tags (columns), named `<tag_prefix>_<i>`.
    pub n_tags: usize,
    pub tag_prefix: String,
    /// Mean of the background component.
    pub background_mean: f64,
    /// Mean of the signal component.
    pub signal_mean: f64,
    /// Standard deviation of both components.
    pub std_dev: f64,
    /// Share of cells drawn from the signal component, per tag.
    pub signal_fraction: f64,
    /// Random seed for reproducibility.
    pub seed: u64,
}

impl Default for BimodalConfig {
    fn default() -> Self {
        Self {
            n_cells: 1000,
            n_tags: 3,
            tag_prefix: "HTO".to_string(),
            background_mean: 0.0,
            signal_mean: 3.0,
            std_dev: 0.5,
            signal_fraction: 0.5,
            seed: 42,
        }
    }
}

impl BimodalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set dimensions.
    pub fn with_dimensions(mut self, n_cells: usize, n_tags: usize) -> Self {
        self.n_cells = n_cells;
        self.n_tags = n_tags;
        self
    }

    /// Set component means and shared standard deviation.
    pub fn with_components(mut self, background_mean: f64, signal_mean: f64, std_dev: f64) -> Self {
        self.background_mean = background_mean;
        self.signal_mean = signal_mean;
        self.std_dev = std_dev;
        self
    }

    pub fn with_signal_fraction(mut self, fraction: f64) -> Self {
        self.signal_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// A generated matrix and the label each cell should receive.
#[derive(Debug, Clone)]
pub struct SyntheticHto {
    pub matrix: CountMatrix,
    /// Label implied by the components each value was drawn from.
    pub truth: Vec<HashId>,
}

impl SyntheticHto {
    /// Share of cells whose call equals the ground truth.
    pub fn agreement<'a, I: IntoIterator<Item = &'a HashId>>(&self, calls: I) -> f64 {
        let n = self.truth.len();
        if n == 0 {
            return 1.0;
        }
        let matches = calls
            .into_iter()
            .zip(&self.truth)
            .filter(|(call, truth)| call == truth)
            .count();
        matches as f64 / n as f64
    }
}

fn truth_from_stains(stains: &[Vec<usize>], tag_ids: &[String]) -> Vec<HashId> {
    stains
        .iter()
        .map(|tags| match tags.as_slice() {
            [] => HashId::Negative,
            [single] => HashId::Tag(tag_ids[*single].clone()),
            _ => HashId::Doublet,
        })
        .collect()
}

fn cell_ids(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("cell_{}", i)).collect()
}

/// Draw a cells × tags matrix of normal background/signal values.
///
/// Each tag picks its own random set of signal cells, so every combination of
/// positive tags occurs.
pub fn generate_bimodal(config: &BimodalConfig) -> Result<SyntheticHto> {
    let background = Normal::new(config.background_mean, config.std_dev)
        .map_err(|e| DemuxError::Configuration(format!("Invalid background component: {}", e)))?;
    let signal = Normal::new(config.signal_mean, config.std_dev)
        .map_err(|e| DemuxError::Configuration(format!("Invalid signal component: {}", e)))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let n = config.n_cells;
    let n_signal = (n as f64 * config.signal_fraction).round() as usize;
    let tag_ids: Vec<String> = (0..config.n_tags)
        .map(|j| format!("{}_{}", config.tag_prefix, j))
        .collect();

    let mut rows = vec![vec![0.0; config.n_tags]; n];
    let mut stains: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut order: Vec<usize> = (0..n).collect();
    for j in 0..config.n_tags {
        order.shuffle(&mut rng);
        let mut is_signal = vec![false; n];
        for &i in &order[..n_signal] {
            is_signal[i] = true;
        }
        for i in 0..n {
            rows[i][j] = if is_signal[i] {
                stains[i].push(j);
                signal.sample(&mut rng)
            } else {
                background.sample(&mut rng)
            };
        }
    }

    let matrix = CountMatrix::from_rows(&rows, cell_ids(n), tag_ids.clone())?;
    Ok(SyntheticHto {
        matrix,
        truth: truth_from_stains(&stains, &tag_ids),
    })
}

const BARCODES: [&str; 4] = [
    "ACCCACCAGTAAGAC",
    "GGTCGAGAGCATTCA",
    "CTTGCCGCATGTCAT",
    "AAAGCATTCTTCACG",
];

/// Configuration for [`generate_counts`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountsConfig {
    pub n_cells: usize,
    pub n_tags: usize,
    /// Mean UMI count of a stained tag.
    pub signal_umis: f64,
    /// Mean UMI count of an unstained tag.
    pub background_umis: f64,
    /// Share of cells carrying two tags.
    pub doublet_rate: f64,
    /// Share of cells carrying no tag.
    pub negative_rate: f64,
    /// Append an `unmapped` column of background counts.
    pub with_unmapped: bool,
    pub seed: u64,
}

impl Default for CountsConfig {
    fn default() -> Self {
        Self {
            n_cells: 500,
            n_tags: 4,
            signal_umis: 200.0,
            background_umis: 3.0,
            doublet_rate: 0.1,
            negative_rate: 0.05,
            with_unmapped: true,
            seed: 42,
        }
    }
}

/// Draw raw Poisson UMI counts with zero, one or two stained tags per cell.
///
/// Tags are named `HTO_<301 + j>-<barcode>` so that the legacy naming
/// convention maps them to `HTO-<301 + j>`; negatives get all-zero rows.
pub fn generate_counts(config: &CountsConfig) -> Result<SyntheticHto> {
    if config.n_tags < 2 {
        return Err(DemuxError::Configuration(
            "Need at least two tags to simulate doublets".to_string(),
        ));
    }
    let signal = Poisson::new(config.signal_umis)
        .map_err(|e| DemuxError::Configuration(format!("Invalid signal rate: {}", e)))?;
    let background = Poisson::new(config.background_umis)
        .map_err(|e| DemuxError::Configuration(format!("Invalid background rate: {}", e)))?;

    let mut rng = StdRng::seed_from_u64(config.seed);
    let n = config.n_cells;
    let mut tag_ids: Vec<String> = (0..config.n_tags)
        .map(|j| format!("HTO_{}-{}", 301 + j, BARCODES[j % BARCODES.len()]))
        .collect();
    let legacy: Vec<String> = (0..config.n_tags).map(|j| format!("HTO-{}", 301 + j)).collect();

    let mut rows = Vec::with_capacity(n);
    let mut stains = Vec::with_capacity(n);
    for _ in 0..n {
        let draw: f64 = rng.gen();
        let stained: Vec<usize> = if draw < config.negative_rate {
            Vec::new()
        } else if draw < config.negative_rate + config.doublet_rate {
            let mut pair = rand::seq::index::sample(&mut rng, config.n_tags, 2).into_vec();
            pair.sort_unstable();
            pair
        } else {
            vec![rng.gen_range(0..config.n_tags)]
        };

        let mut row: Vec<f64> = (0..config.n_tags)
            .map(|j| {
                if stained.is_empty() {
                    0.0
                } else if stained.contains(&j) {
                    signal.sample(&mut rng)
                } else {
                    background.sample(&mut rng)
                }
            })
            .collect();
        if config.with_unmapped {
            row.push(background.sample(&mut rng));
        }
        rows.push(row);
        stains.push(stained);
    }

    let truth = truth_from_stains(&stains, &legacy);
    if config.with_unmapped {
        tag_ids.push("unmapped".to_string());
    }
    let matrix = CountMatrix::from_rows(&rows, cell_ids(n), tag_ids)?;
    Ok(SyntheticHto { matrix, truth })
}

/// Right-skewed single-mode values, for likelihood sanity checks.
pub fn generate_gamma_values(n: usize, shape: f64, scale: f64, seed: u64) -> Result<Vec<f64>> {
    let gamma = Gamma::new(shape, scale)
        .map_err(|e| DemuxError::Configuration(format!("Invalid gamma parameters: {}", e)))?;
    let mut rng = StdRng::seed_from_u64(seed);
    Ok((0..n).map(|_| gamma.sample(&mut rng)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bimodal_shape_and_names() {
        let data = generate_bimodal(&BimodalConfig::default()).unwrap();
        assert_eq!(data.matrix.n_cells(), 1000);
        assert_eq!(data.matrix.tag_ids(), &["HTO_0", "HTO_1", "HTO_2"]);
        assert_eq!(data.truth.len(), 1000);
    }

    #[test]
    fn test_bimodal_signal_share() {
        let data = generate_bimodal(&BimodalConfig::default()).unwrap();
        for j in 0..3 {
            let high = data.matrix.column(j).iter().filter(|&&v| v > 1.5).count();
            // 500 signal cells, a handful may cross the midpoint either way
            assert!((480..=520).contains(&high), "tag {} has {} high cells", j, high);
        }
    }

    #[test]
    fn test_bimodal_truth_has_every_category() {
        let data = generate_bimodal(&BimodalConfig::default()).unwrap();
        assert!(data.truth.contains(&HashId::Negative));
        assert!(data.truth.contains(&HashId::Doublet));
        assert!(data.truth.iter().any(|h| h.is_singlet()));
    }

    #[test]
    fn test_bimodal_seeded() {
        let a = generate_bimodal(&BimodalConfig::new().with_seed(7)).unwrap();
        let b = generate_bimodal(&BimodalConfig::new().with_seed(7)).unwrap();
        assert_eq!(a.matrix.data(), b.matrix.data());
        assert_eq!(a.truth, b.truth);
    }

    #[test]
    fn test_counts_layout() {
        let data = generate_counts(&CountsConfig::default()).unwrap();
        assert_eq!(data.matrix.n_tags(), 5);
        assert_eq!(data.matrix.tag_ids()[0], "HTO_301-ACCCACCAGTAAGAC");
        assert_eq!(data.matrix.tag_ids()[4], "unmapped");
        for (i, truth) in data.truth.iter().enumerate() {
            if *truth == HashId::Negative {
                assert_relative_eq!(data.matrix.row(i)[..4].iter().sum::<f64>(), 0.0);
            }
        }
    }

    #[test]
    fn test_counts_rejects_single_tag() {
        let config = CountsConfig {
            n_tags: 1,
            ..Default::default()
        };
        assert!(generate_counts(&config).is_err());
    }

    #[test]
    fn test_gamma_values_positive() {
        let values = generate_gamma_values(1000, 2.0, 2.0, 42).unwrap();
        assert!(values.iter().all(|&v| v > 0.0));
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        assert_relative_eq!(mean, 4.0, epsilon = 0.4);
    }

    #[test]
    fn test_agreement() {
        let data = generate_bimodal(&BimodalConfig::new().with_dimensions(10, 2)).unwrap();
        assert_relative_eq!(data.agreement(data.truth.iter()), 1.0);
    }
}
