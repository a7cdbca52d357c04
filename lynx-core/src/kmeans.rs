//! K-means clustering with k-means++ seeding.
//!
//! Partitions a set of vectors into k clusters by Lloyd iteration.
//! Used by the IVF index to build its centroid table. Assignment always
//! uses squared L2 regardless of the search metric.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::distance::l2_distance_squared;
use crate::error::{Error, Result};

/// K-means clusterer. Deterministic for a fixed seed.
#[derive(Debug, Clone)]
pub struct KMeans {
    k: usize,
    max_iters: usize,
    tolerance: f32,
    seed: u64,
}

/// Result of a clustering run.
#[derive(Debug, Clone)]
pub struct KMeansOutput {
    /// The k cluster centroids.
    pub centroids: Vec<Vec<f32>>,
    /// Cluster assignment for each input point, parallel to the input.
    pub assignments: Vec<usize>,
}

impl KMeans {
    /// Creates a clusterer producing `k` centroids.
    pub fn new(k: usize, max_iters: usize, tolerance: f32, seed: u64) -> Self {
        Self {
            k,
            max_iters,
            tolerance,
            seed,
        }
    }

    /// Runs k-means++ seeding followed by Lloyd iteration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `k` is zero, fewer than `k`
    /// points are supplied, or the points have zero dimension.
    pub fn run(&self, points: &[Vec<f32>]) -> Result<KMeansOutput> {
        if self.k == 0 {
            return Err(Error::InvalidArgument("k must be at least 1".into()));
        }
        if points.len() < self.k {
            return Err(Error::InvalidArgument(format!(
                "need at least {} points for {} clusters, got {}",
                self.k,
                self.k,
                points.len()
            )));
        }
        let dimension = points[0].len();
        if dimension == 0 {
            return Err(Error::InvalidArgument("points have zero dimension".into()));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut centroids = self.seed_centroids(points, &mut rng);
        let mut assignments = vec![0usize; points.len()];

        for iter in 0..self.max_iters {
            assign(points, &centroids, &mut assignments);

            let shift = self.update_centroids(points, &assignments, &mut centroids);

            debug!(iteration = iter, shift, "k-means iteration");

            if shift <= self.tolerance * self.tolerance * self.k as f32 {
                break;
            }
        }

        // Final pass so the reported assignments match the final centroids.
        assign(points, &centroids, &mut assignments);

        Ok(KMeansOutput {
            centroids,
            assignments,
        })
    }

    /// k-means++ seeding: the first center is uniform, each subsequent
    /// center is sampled with probability proportional to its squared
    /// distance from the nearest already-chosen center.
    fn seed_centroids(&self, points: &[Vec<f32>], rng: &mut StdRng) -> Vec<Vec<f32>> {
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(self.k);

        let first = rng.gen_range(0..points.len());
        centroids.push(points[first].clone());

        let mut best_dist: Vec<f32> = points
            .iter()
            .map(|p| l2_distance_squared(p, &centroids[0]))
            .collect();

        while centroids.len() < self.k {
            let total: f32 = best_dist.iter().sum();

            let chosen = if total > 0.0 {
                let mut target = rng.gen::<f32>() * total;
                let mut picked = points.len() - 1;
                for (i, &d) in best_dist.iter().enumerate() {
                    target -= d;
                    if target <= 0.0 {
                        picked = i;
                        break;
                    }
                }
                picked
            } else {
                // All remaining points coincide with a center.
                rng.gen_range(0..points.len())
            };

            centroids.push(points[chosen].clone());

            for (i, p) in points.iter().enumerate() {
                let d = l2_distance_squared(p, &points[chosen]);
                if d < best_dist[i] {
                    best_dist[i] = d;
                }
            }
        }

        centroids
    }

    /// Recomputes each centroid as the mean of its assigned points and
    /// returns the summed squared centroid shift. An empty cluster is
    /// re-seeded to the point farthest from its current centroid.
    fn update_centroids(
        &self,
        points: &[Vec<f32>],
        assignments: &[usize],
        centroids: &mut [Vec<f32>],
    ) -> f32 {
        let dimension = points[0].len();
        let mut sums = vec![vec![0.0f32; dimension]; self.k];
        let mut counts = vec![0usize; self.k];

        for (point, &cluster) in points.iter().zip(assignments.iter()) {
            counts[cluster] += 1;
            for (acc, &v) in sums[cluster].iter_mut().zip(point.iter()) {
                *acc += v;
            }
        }

        let mut shift = 0.0f32;
        for (cluster, centroid) in centroids.iter_mut().enumerate() {
            let next = if counts[cluster] > 0 {
                let inv = 1.0 / counts[cluster] as f32;
                sums[cluster].iter().map(|&s| s * inv).collect::<Vec<f32>>()
            } else {
                let farthest = points
                    .iter()
                    .enumerate()
                    .max_by(|(_, a), (_, b)| {
                        let da = l2_distance_squared(a, centroid);
                        let db = l2_distance_squared(b, centroid);
                        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                points[farthest].clone()
            };

            shift += l2_distance_squared(centroid, &next);
            *centroid = next;
        }

        shift
    }
}

/// Assigns each point to its nearest centroid by squared L2.
fn assign(points: &[Vec<f32>], centroids: &[Vec<f32>], assignments: &mut [usize]) {
    for (point, slot) in points.iter().zip(assignments.iter_mut()) {
        let mut best = 0usize;
        let mut best_dist = f32::MAX;
        for (cluster, centroid) in centroids.iter().enumerate() {
            let d = l2_distance_squared(point, centroid);
            if d < best_dist {
                best_dist = d;
                best = cluster;
            }
        }
        *slot = best;
    }
}
