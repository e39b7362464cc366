//! Internal cluster validity scores for a labelled point set.
//!
//! Both scores are undefined when the labelling has fewer than two occupied
//! clusters; they return `None` in that case rather than failing.

use nalgebra::DMatrix;
use rayon::prelude::*;

fn euclidean(points: &DMatrix<f64>, a: usize, b: usize) -> f64 {
    (0..points.ncols())
        .map(|j| {
            let d = points[(a, j)] - points[(b, j)];
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

fn occupied_clusters(labels: &[usize]) -> usize {
    let mut seen: Vec<usize> = labels.to_vec();
    seen.sort_unstable();
    seen.dedup();
    seen.len()
}

/// Sorted values plus prefix sums for O(log n) sums of absolute deviations.
struct SortedCluster {
    values: Vec<f64>,
    prefix: Vec<f64>,
}

impl SortedCluster {
    fn new(mut values: Vec<f64>) -> Self {
        values.sort_by(|a, b| a.total_cmp(b));
        let mut prefix = Vec::with_capacity(values.len() + 1);
        prefix.push(0.0);
        let mut running = 0.0;
        for &v in &values {
            running += v;
            prefix.push(running);
        }
        Self { values, prefix }
    }

    /// sum_j |x - values[j]|
    fn abs_deviation(&self, x: f64) -> f64 {
        let below = self.values.partition_point(|&v| v < x);
        let n = self.values.len();
        let sum_below = self.prefix[below];
        let sum_above = self.prefix[n] - sum_below;
        x * below as f64 - sum_below + sum_above - x * (n - below) as f64
    }
}

/// For every point, the summed distance to the members of each cluster.
fn distance_sums(points: &DMatrix<f64>, labels: &[usize], k: usize) -> Vec<Vec<f64>> {
    let n = points.nrows();
    if points.ncols() == 1 {
        let clusters: Vec<SortedCluster> = (0..k)
            .map(|c| {
                SortedCluster::new(
                    (0..n)
                        .filter(|&i| labels[i] == c)
                        .map(|i| points[(i, 0)])
                        .collect(),
                )
            })
            .collect();
        (0..n)
            .into_par_iter()
            .map(|i| {
                clusters
                    .iter()
                    .map(|cl| cl.abs_deviation(points[(i, 0)]))
                    .collect()
            })
            .collect()
    } else {
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut sums = vec![0.0; k];
                for j in 0..n {
                    sums[labels[j]] += euclidean(points, i, j);
                }
                sums
            })
            .collect()
    }
}

/// Mean silhouette coefficient, in [-1, 1]; higher means a cleaner split.
///
/// For point i: s = (b - a) / max(a, b), where a is the mean distance to the
/// rest of its cluster and b the smallest mean distance to another cluster.
/// Points alone in their cluster score 0.
pub fn silhouette_score(points: &DMatrix<f64>, labels: &[usize]) -> Option<f64> {
    let n = points.nrows();
    if n == 0 || labels.len() != n {
        return None;
    }
    let n_labels = occupied_clusters(labels);
    if n_labels < 2 || n_labels > n - 1 {
        return None;
    }

    let k = labels.iter().copied().max().unwrap_or(0) + 1;
    let mut sizes = vec![0usize; k];
    for &l in labels {
        sizes[l] += 1;
    }

    let sums = distance_sums(points, labels, k);
    let scores: Vec<f64> = (0..n)
        .map(|i| {
            let own = labels[i];
            if sizes[own] <= 1 {
                return 0.0;
            }
            let a = sums[i][own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| sums[i][c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);
            let denom = a.max(b);
            if denom > 0.0 {
                (b - a) / denom
            } else {
                0.0
            }
        })
        .collect();

    Some(scores.iter().sum::<f64>() / n as f64)
}

/// Davies-Bouldin index, >= 0; lower means more compact, better separated clusters.
///
/// DB = mean_i max_{j != i} (S_i + S_j) / d(c_i, c_j), with S the mean distance
/// of a cluster's points to its centroid.
pub fn davies_bouldin_index(points: &DMatrix<f64>, labels: &[usize]) -> Option<f64> {
    let (n, dims) = points.shape();
    if n == 0 || labels.len() != n || occupied_clusters(labels) < 2 {
        return None;
    }

    let mut present: Vec<usize> = labels.to_vec();
    present.sort_unstable();
    present.dedup();
    let k = present.len();

    let mut centroids = DMatrix::<f64>::zeros(k, dims);
    let mut sizes = vec![0usize; k];
    for i in 0..n {
        let c = present.binary_search(&labels[i]).unwrap_or(0);
        sizes[c] += 1;
        for j in 0..dims {
            centroids[(c, j)] += points[(i, j)];
        }
    }
    for c in 0..k {
        for j in 0..dims {
            centroids[(c, j)] /= sizes[c] as f64;
        }
    }

    let mut scatter = vec![0.0; k];
    for i in 0..n {
        let c = present.binary_search(&labels[i]).unwrap_or(0);
        let d: f64 = (0..dims)
            .map(|j| (points[(i, j)] - centroids[(c, j)]).powi(2))
            .sum::<f64>()
            .sqrt();
        scatter[c] += d;
    }
    for c in 0..k {
        scatter[c] /= sizes[c] as f64;
    }

    let centroid_distance = |a: usize, b: usize| -> f64 {
        (0..dims)
            .map(|j| (centroids[(a, j)] - centroids[(b, j)]).powi(2))
            .sum::<f64>()
            .sqrt()
    };

    let all_compact = scatter.iter().all(|s| s.abs() < 1e-8);
    let all_coincident = (0..k).all(|a| (0..k).all(|b| centroid_distance(a, b) < 1e-8));
    if all_compact || all_coincident {
        return Some(0.0);
    }

    let total: f64 = (0..k)
        .map(|a| {
            (0..k)
                .filter(|&b| b != a)
                .map(|b| {
                    let dist = centroid_distance(a, b);
                    if dist == 0.0 {
                        0.0
                    } else {
                        (scatter[a] + scatter[b]) / dist
                    }
                })
                .fold(0.0, f64::max)
        })
        .sum();
    Some(total / k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn toy_points() -> DMatrix<f64> {
        DMatrix::from_row_slice(
            6,
            2,
            &[1.0, 2.0, 1.0, 4.0, 1.0, 0.0, 4.0, 2.0, 4.0, 4.0, 4.0, 0.0],
        )
    }

    #[test]
    fn test_silhouette_manual_1d() {
        // clusters {0, 1} and {10}
        let points = DMatrix::from_column_slice(3, 1, &[0.0, 1.0, 10.0]);
        let labels = [0, 0, 1];
        // p0: a = 1, b = 10 -> 0.9; p1: a = 1, b = 9 -> 8/9; p2: alone -> 0
        let expected = (0.9 + 8.0 / 9.0 + 0.0) / 3.0;
        assert_relative_eq!(
            silhouette_score(&points, &labels).unwrap(),
            expected,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_silhouette_1d_matches_pairwise() {
        let values = [0.3, -0.1, 2.2, 3.1, 2.8, 0.0, 2.5];
        let labels = [0, 0, 1, 1, 1, 0, 1];
        let one_d = DMatrix::from_column_slice(7, 1, &values);
        // a second constant dimension forces the pairwise path
        let two_d = DMatrix::from_fn(7, 2, |i, j| if j == 0 { values[i] } else { 1.0 });
        assert_relative_eq!(
            silhouette_score(&one_d, &labels).unwrap(),
            silhouette_score(&two_d, &labels).unwrap(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_toy_scores_in_range() {
        let points = toy_points();
        let labels = [0, 0, 0, 1, 1, 1];
        let s = silhouette_score(&points, &labels).unwrap();
        assert!((-1.0..=1.0).contains(&s));
        let db = davies_bouldin_index(&points, &labels).unwrap();
        assert!(db >= 0.0);
    }

    #[test]
    fn test_davies_bouldin_manual() {
        // clusters {0, 2} (centroid 1, scatter 1) and {10, 12} (centroid 11, scatter 1)
        let points = DMatrix::from_column_slice(4, 1, &[0.0, 2.0, 10.0, 12.0]);
        let db = davies_bouldin_index(&points, &[0, 0, 1, 1]).unwrap();
        assert_relative_eq!(db, 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_single_cluster_is_undefined() {
        let points = DMatrix::from_column_slice(4, 1, &[1.0, 1.0, 1.0, 1.0]);
        assert!(silhouette_score(&points, &[0, 0, 0, 0]).is_none());
        assert!(davies_bouldin_index(&points, &[0, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_identical_points_split_in_two() {
        let points = DMatrix::from_column_slice(4, 1, &[1.0, 1.0, 1.0, 1.0]);
        let labels = [0, 1, 0, 1];
        assert_relative_eq!(silhouette_score(&points, &labels).unwrap(), 0.0);
        assert_relative_eq!(davies_bouldin_index(&points, &labels).unwrap(), 0.0);
    }
}
