//! Lloyd's k-means with greedy k-means++ seeding.
//!
//! Rows of the input matrix are points, columns are dimensions. Every random
//! draw comes from one `StdRng` seeded by the caller, so identical input and
//! seed always give identical centers and labels.

use crate::error::{DemuxError, Result};
use nalgebra::DMatrix;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Settings for [`fit_kmeans`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansConfig {
    /// Number of clusters.
    pub k: usize,
    /// Independent seedings; the run with the lowest inertia is kept.
    pub n_init: usize,
    /// Lloyd iterations per seeding.
    pub max_iter: usize,
    /// Convergence threshold on center movement, relative to the mean
    /// per-dimension variance of the data.
    pub tol: f64,
    pub seed: u64,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            k: 2,
            n_init: 10,
            max_iter: 300,
            tol: 1e-4,
            seed: 42,
        }
    }
}

/// A fitted k-means model.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Cluster centers (k × dims).
    pub centers: DMatrix<f64>,
    /// Cluster index per point.
    pub labels: Vec<usize>,
    /// Sum of squared distances of points to their centers.
    pub inertia: f64,
    /// Lloyd iterations used by the winning run.
    pub n_iter: usize,
}

#[inline]
fn sq_dist(points: &DMatrix<f64>, i: usize, centers: &DMatrix<f64>, c: usize) -> f64 {
    (0..points.ncols())
        .map(|j| {
            let d = points[(i, j)] - centers[(c, j)];
            d * d
        })
        .sum()
}

/// Nearest center per point; ties go to the lower index.
fn assign(points: &DMatrix<f64>, centers: &DMatrix<f64>) -> (Vec<usize>, f64) {
    let mut labels = Vec::with_capacity(points.nrows());
    let mut inertia = 0.0;
    for i in 0..points.nrows() {
        let mut best = 0;
        let mut best_dist = f64::INFINITY;
        for c in 0..centers.nrows() {
            let d = sq_dist(points, i, centers, c);
            if d < best_dist {
                best = c;
                best_dist = d;
            }
        }
        labels.push(best);
        inertia += best_dist;
    }
    (labels, inertia)
}

/// Index drawn with probability proportional to `weights`; `total` is their sum.
fn draw_weighted(weights: &[f64], total: f64, rng: &mut StdRng) -> usize {
    let target = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += w;
        if cumulative > target {
            return i;
        }
    }
    weights.len() - 1
}

/// Greedy k-means++: first center uniform; each later center is the best of
/// `2 + ln(k)` candidates drawn proportional to squared distance from the
/// nearest chosen center, scored by the resulting total squared distance.
fn init_plus_plus(points: &DMatrix<f64>, k: usize, rng: &mut StdRng) -> DMatrix<f64> {
    let (n, dims) = points.shape();
    let mut centers = DMatrix::zeros(k, dims);
    let n_trials = 2 + (k as f64).ln().floor() as usize;

    let first = rng.gen_range(0..n);
    centers.set_row(0, &points.row(first));

    let mut closest: Vec<f64> = (0..n).map(|i| sq_dist(points, i, &centers, 0)).collect();
    for c in 1..k {
        let total: f64 = closest.iter().sum();
        if total <= 0.0 {
            // every point coincides with a chosen center
            let chosen = rng.gen_range(0..n);
            centers.set_row(c, &points.row(chosen));
            continue;
        }

        let mut best: Option<(f64, Vec<f64>)> = None;
        for _ in 0..n_trials {
            let candidate = draw_weighted(&closest, total, rng);
            let distances: Vec<f64> = (0..n)
                .map(|i| closest[i].min(sq_dist(points, i, points, candidate)))
                .collect();
            let potential: f64 = distances.iter().sum();
            if best.as_ref().map_or(true, |(p, _)| potential < *p) {
                centers.set_row(c, &points.row(candidate));
                best = Some((potential, distances));
            }
        }
        if let Some((_, distances)) = best {
            closest = distances;
        }
    }
    centers
}

/// Mean per-dimension variance, used to scale the tolerance.
fn mean_variance(points: &DMatrix<f64>) -> f64 {
    let (n, dims) = points.shape();
    if n == 0 || dims == 0 {
        return 0.0;
    }
    let total: f64 = (0..dims)
        .map(|j| {
            let col = points.column(j);
            let mean = col.mean();
            col.iter().map(|&x| (x - mean) * (x - mean)).sum::<f64>() / n as f64
        })
        .sum();
    total / dims as f64
}

fn lloyd(points: &DMatrix<f64>, mut centers: DMatrix<f64>, max_iter: usize, tol: f64) -> KMeansFit {
    let (n, dims) = points.shape();
    let k = centers.nrows();
    let mut n_iter = 0;

    for _ in 0..max_iter {
        n_iter += 1;
        let (labels, _) = assign(points, &centers);

        let mut sums = DMatrix::<f64>::zeros(k, dims);
        let mut counts = vec![0usize; k];
        for i in 0..n {
            let c = labels[i];
            counts[c] += 1;
            for j in 0..dims {
                sums[(c, j)] += points[(i, j)];
            }
        }

        let mut shift = 0.0;
        for c in 0..k {
            // an empty cluster keeps its previous center
            if counts[c] == 0 {
                continue;
            }
            for j in 0..dims {
                let updated = sums[(c, j)] / counts[c] as f64;
                let d = updated - centers[(c, j)];
                shift += d * d;
                centers[(c, j)] = updated;
            }
        }

        if shift <= tol {
            break;
        }
    }

    let (labels, inertia) = assign(points, &centers);
    KMeansFit {
        centers,
        labels,
        inertia,
        n_iter,
    }
}

/// Fit k-means on the rows of `points`.
pub fn fit_kmeans(points: &DMatrix<f64>, config: &KMeansConfig) -> Result<KMeansFit> {
    if points.nrows() == 0 || points.ncols() == 0 {
        return Err(DemuxError::EmptyData(
            "Cannot cluster an empty set of points".to_string(),
        ));
    }
    if config.k == 0 {
        return Err(DemuxError::Configuration(
            "k-means needs at least one cluster".to_string(),
        ));
    }
    if points.iter().any(|v| !v.is_finite()) {
        return Err(DemuxError::Numerical(
            "k-means input contains non-finite values".to_string(),
        ));
    }

    let tol = config.tol * mean_variance(points);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best: Option<KMeansFit> = None;
    for _ in 0..config.n_init.max(1) {
        let centers = init_plus_plus(points, config.k, &mut rng);
        let fit = lloyd(points, centers, config.max_iter.max(1), tol);
        let better = match &best {
            None => true,
            Some(current) => fit.inertia < current.inertia,
        };
        if better {
            best = Some(fit);
        }
    }

    best.ok_or_else(|| DemuxError::Numerical("k-means produced no fit".to_string()))
}
