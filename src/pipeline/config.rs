//! Run configuration, loadable from YAML.

use crate::classify::ClassificationPolicy;
use crate::cluster::{ClusterMethod, ClusterParams};
use crate::error::{DemuxError, Result};
use crate::normalize::NormalizationMode;
use serde::{Deserialize, Serialize};

/// Everything the core needs besides the input matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DemuxConfig {
    /// Partitioning algorithm.
    pub method: ClusterMethod,
    /// How partitions become labels.
    pub policy: ClassificationPolicy,
    /// Transform applied before per-cell partitioning (dominant-tag only).
    pub normalization: NormalizationMode,
    /// Cells with a total raw count at or below this are `Negative` (dominant-tag only).
    pub min_total_count: u64,
    pub seed: u64,
    /// k-means restarts.
    pub n_init: usize,
    /// Iteration cap; defaults to 300 for k-means and 100 for GMM.
    pub max_iter: Option<usize>,
    /// Convergence tolerance; defaults to 1e-4 for k-means and 1e-3 for GMM.
    pub tol: Option<f64>,
    /// Covariance regularisation for GMM.
    pub reg_covar: f64,
    /// Singlet labels keep this many leading characters of the tag name
    /// (positive-set only, 0 keeps the full name).
    pub label_width: usize,
    /// Column dropped before dominant-tag calling.
    pub unmapped_tag: String,
}

impl Default for DemuxConfig {
    fn default() -> Self {
        Self {
            method: ClusterMethod::KMeans,
            policy: ClassificationPolicy::PositiveSet,
            normalization: NormalizationMode::Clr,
            min_total_count: 0,
            seed: 42,
            n_init: 10,
            max_iter: None,
            tol: None,
            reg_covar: 1e-6,
            label_width: 5,
            unmapped_tag: "unmapped".to_string(),
        }
    }
}

impl DemuxConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from YAML string; any problem is a configuration error.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| DemuxError::Configuration(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DemuxError::from)
    }

    /// Check numeric settings before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if self.n_init == 0 {
            return Err(DemuxError::Configuration(
                "n_init must be at least 1".to_string(),
            ));
        }
        if self.max_iter == Some(0) {
            return Err(DemuxError::Configuration(
                "max_iter must be at least 1".to_string(),
            ));
        }
        if let Some(tol) = self.tol {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(DemuxError::Configuration(format!(
                    "tol must be a non-negative number, got {}",
                    tol
                )));
            }
        }
        if !(self.reg_covar.is_finite() && self.reg_covar > 0.0) {
            return Err(DemuxError::Configuration(format!(
                "reg_covar must be positive, got {}",
                self.reg_covar
            )));
        }
        Ok(())
    }

    /// Numerical settings for the partitioner.
    pub fn cluster_params(&self) -> ClusterParams {
        let defaults = ClusterParams::default();
        ClusterParams {
            seed: self.seed,
            n_init: self.n_init,
            kmeans_max_iter: self.max_iter.unwrap_or(defaults.kmeans_max_iter),
            kmeans_tol: self.tol.unwrap_or(defaults.kmeans_tol),
            gmm_max_iter: self.max_iter.unwrap_or(defaults.gmm_max_iter),
            gmm_tol: self.tol.unwrap_or(defaults.gmm_tol),
            reg_covar: self.reg_covar,
        }
    }

    pub fn method(mut self, method: ClusterMethod) -> Self {
        self.method = method;
        self
    }

    pub fn policy(mut self, policy: ClassificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn normalization(mut self, mode: NormalizationMode) -> Self {
        self.normalization = mode;
        self
    }

    pub fn min_total_count(mut self, threshold: u64) -> Self {
        self.min_total_count = threshold;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn label_width(mut self, width: usize) -> Self {
        self.label_width = width;
        self
    }
}
