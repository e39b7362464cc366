//! Binary partitioning of HTO values into background and signal groups.
//!
//! Two interchangeable algorithms are offered:
//!
//! - **k-means** (centroid based): positive group is the cluster holding the
//!   largest center coordinate; scored by silhouette and Davies-Bouldin.
//! - **GMM** (distribution based): positive group is the component holding the
//!   largest mean coordinate; scored by BIC and total log-likelihood.

pub mod gmm;
pub mod kmeans;
pub mod metrics;

pub use gmm::{fit_gmm, GmmConfig, GmmFit};
pub use kmeans::{fit_kmeans, KMeansConfig, KMeansFit};
pub use metrics::{davies_bouldin_index, silhouette_score};

use crate::error::{DemuxError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Groups per partition: background and signal.
pub const N_GROUPS: usize = 2;

/// Partitioning algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMethod {
    /// Two-cluster k-means.
    KMeans,
    /// Two-component Gaussian mixture.
    Gmm,
}

impl FromStr for ClusterMethod {
    type Err = DemuxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kmeans" => Ok(Self::KMeans),
            "gmm" => Ok(Self::Gmm),
            other => Err(DemuxError::Configuration(format!(
                "Method must be either 'kmeans' or 'gmm', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KMeans => f.write_str("kmeans"),
            Self::Gmm => f.write_str("gmm"),
        }
    }
}

/// Numerical settings shared by both algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterParams {
    pub seed: u64,
    /// k-means restarts; the lowest-inertia run wins.
    pub n_init: usize,
    pub kmeans_max_iter: usize,
    pub kmeans_tol: f64,
    pub gmm_max_iter: usize,
    pub gmm_tol: f64,
    pub reg_covar: f64,
}

impl Default for ClusterParams {
    fn default() -> Self {
        Self {
            seed: 42,
            n_init: 10,
            kmeans_max_iter: 300,
            kmeans_tol: 1e-4,
            gmm_max_iter: 100,
            gmm_tol: 1e-3,
            reg_covar: 1e-6,
        }
    }
}

impl ClusterParams {
    pub fn kmeans_config(&self) -> KMeansConfig {
        KMeansConfig {
            k: N_GROUPS,
            n_init: self.n_init,
            max_iter: self.kmeans_max_iter,
            tol: self.kmeans_tol,
            seed: self.seed,
        }
    }

    pub fn gmm_config(&self) -> GmmConfig {
        GmmConfig {
            n_components: N_GROUPS,
            max_iter: self.gmm_max_iter,
            tol: self.gmm_tol,
            reg_covar: self.reg_covar,
            seed: self.seed,
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Quality of a k-means split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CentroidMetrics {
    /// In [-1, 1]; `None` when only one cluster is occupied.
    pub silhouette_score: Option<f64>,
    /// >= 0; `None` when only one cluster is occupied.
    pub davies_bouldin_index: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub degraded: bool,
}

/// Quality of a mixture fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionMetrics {
    pub bic: f64,
    pub log_likelihood: f64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub degraded: bool,
}

/// Algorithm-specific quality record of one partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartitionMetrics {
    Centroid(CentroidMetrics),
    Distribution(DistributionMetrics),
}

impl PartitionMetrics {
    /// True when the input collapsed to a single effective group.
    pub fn is_degraded(&self) -> bool {
        match self {
            Self::Centroid(m) => m.degraded,
            Self::Distribution(m) => m.degraded,
        }
    }
}

/// Group assignment of every point plus the id of the signal group.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionResult {
    /// Group id (0 or 1) per point.
    pub labels: Vec<usize>,
    /// Which group id is the signal group.
    pub positive_group: usize,
    pub metrics: PartitionMetrics,
}

impl PartitionResult {
    pub fn is_positive(&self, point: usize) -> bool {
        self.labels[point] == self.positive_group
    }

    /// 1 for points in the signal group, 0 otherwise.
    pub fn positive_mask(&self) -> Vec<u8> {
        self.labels
            .iter()
            .map(|&l| u8::from(l == self.positive_group))
            .collect()
    }
}

/// Row of the first maximal entry of a row-major flattening.
fn row_of_flat_argmax(matrix: &DMatrix<f64>) -> usize {
    let mut best = (0, f64::NEG_INFINITY);
    for r in 0..matrix.nrows() {
        for c in 0..matrix.ncols() {
            if matrix[(r, c)] > best.1 {
                best = (r, matrix[(r, c)]);
            }
        }
    }
    best.0
}

/// Signal cluster of a k-means fit: the one holding the largest center value.
fn kmeans_positive_cluster(fit: &KMeansFit) -> usize {
    row_of_flat_argmax(&fit.centers)
}

/// Signal component of a mixture: the one holding the largest mean value.
fn gmm_positive_component(fit: &GmmFit) -> usize {
    row_of_flat_argmax(&fit.means)
}

fn single_group(labels: &[usize]) -> bool {
    labels.windows(2).all(|w| w[0] == w[1])
}

/// Split the rows of `points` into two groups.
///
/// Degenerate input (e.g. a constant column) never fails; the returned
/// metrics are flagged as degraded instead.
pub fn partition(
    points: &DMatrix<f64>,
    method: ClusterMethod,
    params: &ClusterParams,
) -> Result<PartitionResult> {
    match method {
        ClusterMethod::KMeans => {
            let fit = fit_kmeans(points, &params.kmeans_config())?;
            let positive_group = kmeans_positive_cluster(&fit);
            let silhouette = silhouette_score(points, &fit.labels);
            let davies_bouldin = davies_bouldin_index(points, &fit.labels);
            let degraded = silhouette.is_none() || davies_bouldin.is_none();
            Ok(PartitionResult {
                labels: fit.labels,
                positive_group,
                metrics: PartitionMetrics::Centroid(CentroidMetrics {
                    silhouette_score: silhouette,
                    davies_bouldin_index: davies_bouldin,
                    degraded,
                }),
            })
        }
        ClusterMethod::Gmm => {
            let fit = fit_gmm(points, &params.gmm_config())?;
            let labels = fit.predict(points)?;
            let positive_group = gmm_positive_component(&fit);
            let log_likelihood = fit.log_likelihood(points)?;
            let bic = fit.bic(points)?;
            let degraded = single_group(&labels);
            Ok(PartitionResult {
                labels,
                positive_group,
                metrics: PartitionMetrics::Distribution(DistributionMetrics {
                    bic,
                    log_likelihood,
                    degraded,
                }),
            })
        }
    }
}

/// Split a one-dimensional vector (one value per cell, or per tag).
pub fn partition_values(
    values: &[f64],
    method: ClusterMethod,
    params: &ClusterParams,
) -> Result<PartitionResult> {
    let points = DMatrix::from_column_slice(values.len(), 1, values);
    partition(&points, method, params)
}
