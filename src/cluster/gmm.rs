//! Gaussian mixture with full covariances, fitted by expectation-maximization.
//!
//! Responsibilities are initialised from a single seeded k-means run, then EM
//! iterates until the per-sample lower bound moves less than `tol`.

use crate::cluster::kmeans::{fit_kmeans, KMeansConfig};
use crate::error::{DemuxError, Result};
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Settings for [`fit_gmm`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GmmConfig {
    /// Number of mixture components.
    pub n_components: usize,
    pub max_iter: usize,
    /// Convergence threshold on the change of the mean log-likelihood.
    pub tol: f64,
    /// Added to covariance diagonals so they stay positive definite.
    pub reg_covar: f64,
    pub seed: u64,
}

impl Default for GmmConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            max_iter: 100,
            tol: 1e-3,
            reg_covar: 1e-6,
            seed: 42,
        }
    }
}

/// A fitted mixture.
#[derive(Debug, Clone)]
pub struct GmmFit {
    /// Mixing weights, summing to one.
    pub weights: Vec<f64>,
    /// Component means (components × dims).
    pub means: DMatrix<f64>,
    /// One covariance matrix per component.
    pub covariances: Vec<DMatrix<f64>>,
    /// Whether EM stopped on `tol` rather than `max_iter`.
    pub converged: bool,
    pub n_iter: usize,
}

/// Cholesky factor pieces used for log densities.
struct Precision {
    lower: DMatrix<f64>,
    log_det: f64,
}

fn precision(cov: &DMatrix<f64>) -> Result<Precision> {
    let chol = cov.clone().cholesky().ok_or_else(|| {
        DemuxError::Numerical(
            "Covariance is not positive definite; increase reg_covar".to_string(),
        )
    })?;
    let lower = chol.l();
    let log_det = 2.0 * lower.diagonal().iter().map(|v| v.ln()).sum::<f64>();
    Ok(Precision { lower, log_det })
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

impl GmmFit {
    pub fn n_components(&self) -> usize {
        self.weights.len()
    }

    /// `log(weight_k) + log N(x_i | mean_k, cov_k)` for every point and component.
    pub fn weighted_log_prob(&self, points: &DMatrix<f64>) -> Result<DMatrix<f64>> {
        let (n, dims) = points.shape();
        let k = self.n_components();
        let mut out = DMatrix::zeros(n, k);
        let norm = dims as f64 * (2.0 * PI).ln();

        for c in 0..k {
            let prec = precision(&self.covariances[c])?;
            let log_weight = self.weights[c].ln();
            for i in 0..n {
                let diff = DVector::from_fn(dims, |j, _| points[(i, j)] - self.means[(c, j)]);
                let solved = prec.lower.solve_lower_triangular(&diff).ok_or_else(|| {
                    DemuxError::Numerical("Singular covariance factor".to_string())
                })?;
                let mahalanobis = solved.norm_squared();
                out[(i, c)] = log_weight - 0.5 * (norm + prec.log_det + mahalanobis);
            }
        }
        Ok(out)
    }

    /// Per-point log-likelihood under the mixture.
    pub fn score_samples(&self, points: &DMatrix<f64>) -> Result<Vec<f64>> {
        let weighted = self.weighted_log_prob(points)?;
        Ok((0..weighted.nrows())
            .map(|i| {
                let row: Vec<f64> = weighted.row(i).iter().copied().collect();
                log_sum_exp(&row)
            })
            .collect())
    }

    /// Total log-likelihood of `points`.
    pub fn log_likelihood(&self, points: &DMatrix<f64>) -> Result<f64> {
        Ok(self.score_samples(points)?.iter().sum())
    }

    /// Free parameters of a full-covariance mixture.
    pub fn n_parameters(&self) -> usize {
        let k = self.n_components();
        let dims = self.means.ncols();
        let cov_params = k * dims * (dims + 1) / 2;
        let mean_params = k * dims;
        cov_params + mean_params + k - 1
    }

    /// Bayesian information criterion; lower is better.
    ///
    /// BIC = -2 * log_likelihood + n_params * log(n)
    pub fn bic(&self, points: &DMatrix<f64>) -> Result<f64> {
        let n = points.nrows() as f64;
        Ok(-2.0 * self.log_likelihood(points)? + self.n_parameters() as f64 * n.ln())
    }

    /// Most probable component per point; ties go to the lower index.
    pub fn predict(&self, points: &DMatrix<f64>) -> Result<Vec<usize>> {
        let weighted = self.weighted_log_prob(points)?;
        Ok((0..weighted.nrows())
            .map(|i| {
                let mut best = 0;
                for c in 1..weighted.ncols() {
                    if weighted[(i, c)] > weighted[(i, best)] {
                        best = c;
                    }
                }
                best
            })
            .collect())
    }
}

/// Weights, means and covariances from responsibilities (n × k).
fn m_step(points: &DMatrix<f64>, resp: &DMatrix<f64>, reg_covar: f64) -> GmmFit {
    let (n, dims) = points.shape();
    let k = resp.ncols();

    let nk: Vec<f64> = (0..k)
        .map(|c| resp.column(c).sum() + 10.0 * f64::EPSILON)
        .collect();
    let means = DMatrix::from_fn(k, dims, |c, j| {
        (0..n).map(|i| resp[(i, c)] * points[(i, j)]).sum::<f64>() / nk[c]
    });

    let covariances = (0..k)
        .map(|c| {
            let mut cov = DMatrix::zeros(dims, dims);
            for i in 0..n {
                let r = resp[(i, c)];
                if r == 0.0 {
                    continue;
                }
                for a in 0..dims {
                    let da = points[(i, a)] - means[(c, a)];
                    for b in 0..dims {
                        cov[(a, b)] += r * da * (points[(i, b)] - means[(c, b)]);
                    }
                }
            }
            cov /= nk[c];
            for a in 0..dims {
                cov[(a, a)] += reg_covar;
            }
            cov
        })
        .collect();

    let total: f64 = nk.iter().sum();
    GmmFit {
        weights: nk.iter().map(|v| v / total).collect(),
        means,
        covariances,
        converged: false,
        n_iter: 0,
    }
}

/// Fit a Gaussian mixture on the rows of `points`.
pub fn fit_gmm(points: &DMatrix<f64>, config: &GmmConfig) -> Result<GmmFit> {
    let (n, _) = points.shape();
    if n == 0 || points.ncols() == 0 {
        return Err(DemuxError::EmptyData(
            "Cannot fit a mixture to an empty set of points".to_string(),
        ));
    }
    if config.n_components == 0 {
        return Err(DemuxError::Configuration(
            "Mixture needs at least one component".to_string(),
        ));
    }

    let init = fit_kmeans(
        points,
        &KMeansConfig {
            k: config.n_components,
            n_init: 1,
            seed: config.seed,
            ..Default::default()
        },
    )?;
    let mut resp = DMatrix::zeros(n, config.n_components);
    for (i, &label) in init.labels.iter().enumerate() {
        resp[(i, label)] = 1.0;
    }
    let mut model = m_step(points, &resp, config.reg_covar);

    let mut lower_bound = f64::NEG_INFINITY;
    let mut converged = false;
    let mut n_iter = 0;
    for _ in 0..config.max_iter.max(1) {
        n_iter += 1;
        let previous = lower_bound;

        // E-step
        let weighted = model.weighted_log_prob(points)?;
        let mut total = 0.0;
        for i in 0..n {
            let row: Vec<f64> = weighted.row(i).iter().copied().collect();
            let norm = log_sum_exp(&row);
            total += norm;
            for c in 0..config.n_components {
                resp[(i, c)] = (weighted[(i, c)] - norm).exp();
            }
        }
        lower_bound = total / n as f64;

        model = m_step(points, &resp, config.reg_covar);

        if (lower_bound - previous).abs() < config.tol {
            converged = true;
            break;
        }
    }

    model.converged = converged;
    model.n_iter = n_iter;
    Ok(model)
}
