use ndarray::{Array2, ArrayView1};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tracing::debug;

use crate::config::ClusteringConfig;
use crate::error::{ProcessingError, Result};

/// Seeded k-means (Lloyd iterations, k-means++ initialisation)
#[derive(Debug, Clone, PartialEq)]
pub struct KMeans {
    pub k: usize,
    pub seed: u64,
    pub n_init: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    /// Cluster id per row, numbered by first appearance in row order
    pub labels: Vec<usize>,
    pub centroids: Array2<f64>,
    pub inertia: f64,
    pub iterations: usize,
}

impl KMeans {
    pub fn new(k: usize) -> Self {
        Self::from_config(&ClusteringConfig {
            k,
            ..ClusteringConfig::default()
        })
    }

    pub fn from_config(config: &ClusteringConfig) -> Self {
        Self {
            k: config.k,
            seed: config.seed,
            n_init: config.n_init.max(1),
            max_iterations: config.max_iterations.max(1),
            tolerance: config.tolerance,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit on the rows of `data`. Restarts share one seeded random stream, so
    /// the same data, k and seed always give the same fit.
    pub fn fit(&self, data: &Array2<f64>) -> Result<KMeansFit> {
        let rows = data.nrows();
        if self.k == 0 || rows < self.k {
            return Err(ProcessingError::InsufficientData { rows, k: self.k });
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut best: Option<KMeansFit> = None;

        for run in 0..self.n_init {
            let initial = self.seed_centroids(data, &mut rng);
            let fit = self.lloyd(data, initial);
            debug!(
                "k-means run {}: inertia {:.6} after {} iterations",
                run, fit.inertia, fit.iterations
            );

            let better = best.as_ref().map_or(true, |b| fit.inertia < b.inertia);
            if better {
                best = Some(fit);
            }
        }

        let best = best.ok_or(ProcessingError::InsufficientData { rows, k: self.k })?;
        Ok(relabel(best, self.k))
    }

    /// k-means++: first centroid uniform, the rest weighted by squared
    /// distance to the nearest chosen centroid
    fn seed_centroids(&self, data: &Array2<f64>, rng: &mut ChaCha8Rng) -> Array2<f64> {
        let rows = data.nrows();
        let mut centroids = Array2::zeros((self.k, data.ncols()));
        let mut chosen = vec![rng.gen_range(0..rows)];
        centroids.row_mut(0).assign(&data.row(chosen[0]));

        let mut nearest: Vec<f64> = (0..rows)
            .map(|i| squared_distance(data.row(i), centroids.row(0)))
            .collect();

        for c in 1..self.k {
            let total: f64 = nearest.iter().sum();
            let next = if total > 0.0 {
                let mut target = rng.gen::<f64>() * total;
                let mut pick = rows - 1;
                for (i, weight) in nearest.iter().enumerate() {
                    if *weight > 0.0 && target < *weight {
                        pick = i;
                        break;
                    }
                    target -= weight;
                }
                pick
            } else {
                // Every point coincides with a centroid: take any unused row
                (0..rows).find(|i| !chosen.contains(i)).unwrap_or(0)
            };

            chosen.push(next);
            centroids.row_mut(c).assign(&data.row(next));
            for (i, distance) in nearest.iter_mut().enumerate() {
                *distance = distance.min(squared_distance(data.row(i), centroids.row(c)));
            }
        }

        centroids
    }

    fn lloyd(&self, data: &Array2<f64>, mut centroids: Array2<f64>) -> KMeansFit {
        let mut labels = assign(data, &centroids);
        let mut iterations = 0;

        while iterations < self.max_iterations {
            iterations += 1;
            let updated = update_centroids(data, &labels, &centroids, self.k);

            let shift: f64 = (0..self.k)
                .map(|c| squared_distance(updated.row(c), centroids.row(c)))
                .sum();
            centroids = updated;
            labels = assign(data, &centroids);

            if shift <= self.tolerance {
                break;
            }
        }

        let inertia = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| squared_distance(data.row(i), centroids.row(label)))
            .sum();

        KMeansFit {
            labels,
            centroids,
            inertia,
            iterations,
        }
    }
}

pub fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Nearest centroid per row; ties go to the lower cluster id
fn assign(data: &Array2<f64>, centroids: &Array2<f64>) -> Vec<usize> {
    (0..data.nrows())
        .into_par_iter()
        .map(|i| {
            let row = data.row(i);
            let mut best = 0;
            let mut best_distance = f64::INFINITY;
            for (c, centroid) in centroids.outer_iter().enumerate() {
                let distance = squared_distance(row, centroid);
                if distance < best_distance {
                    best = c;
                    best_distance = distance;
                }
            }
            best
        })
        .collect()
}

fn update_centroids(
    data: &Array2<f64>,
    labels: &[usize],
    previous: &Array2<f64>,
    k: usize,
) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros((k, data.ncols()));
    let mut counts = vec![0usize; k];
    for (i, &label) in labels.iter().enumerate() {
        let mut sum = sums.row_mut(label);
        sum += &data.row(i);
        counts[label] += 1;
    }

    let mut taken = Vec::new();
    for c in 0..k {
        if counts[c] > 0 {
            let mut row = sums.row_mut(c);
            row /= counts[c] as f64;
        } else {
            // Empty cluster: restart it at the row farthest from its centroid
            let farthest = labels
                .iter()
                .enumerate()
                .filter(|(i, _)| !taken.contains(i))
                .map(|(i, &label)| (i, squared_distance(data.row(i), previous.row(label))))
                .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
                    Some((_, best_d)) if best_d >= d => best,
                    _ => Some((i, d)),
                })
                .map_or(0, |(i, _)| i);
            taken.push(farthest);
            sums.row_mut(c).assign(&data.row(farthest));
        }
    }

    sums
}

/// Renumber clusters in order of first appearance so labels do not depend
/// on which centroid happened to be seeded first
fn relabel(fit: KMeansFit, k: usize) -> KMeansFit {
    let mut mapping: Vec<Option<usize>> = vec![None; k];
    let mut next = 0;
    for &label in &fit.labels {
        if mapping[label].is_none() {
            mapping[label] = Some(next);
            next += 1;
        }
    }
    for slot in mapping.iter_mut() {
        if slot.is_none() {
            *slot = Some(next);
            next += 1;
        }
    }
    let mapping: Vec<usize> = mapping.into_iter().map(|m| m.unwrap_or(0)).collect();

    let mut centroids = Array2::zeros(fit.centroids.dim());
    for (old, &new) in mapping.iter().enumerate() {
        centroids.row_mut(new).assign(&fit.centroids.row(old));
    }

    KMeansFit {
        labels: fit.labels.iter().map(|&label| mapping[label]).collect(),
        centroids,
        inertia: fit.inertia,
        iterations: fit.iterations,
    }
}

/// Mean silhouette coefficient. `None` when fewer than two clusters are
/// populated or every point is its own cluster.
pub fn silhouette_score(data: &Array2<f64>, labels: &[usize]) -> Option<f64> {
    let rows = data.nrows();
    let k = labels.iter().copied().max().map_or(0, |max| max + 1);
    let mut sizes = vec![0usize; k];
    for &label in labels {
        sizes[label] += 1;
    }
    let populated = sizes.iter().filter(|&&size| size > 0).count();
    if populated < 2 || populated >= rows {
        return None;
    }

    let scores: Vec<f64> = (0..rows)
        .into_par_iter()
        .map(|i| {
            let own = labels[i];
            if sizes[own] <= 1 {
                return 0.0;
            }

            let mut totals = vec![0.0; k];
            for j in 0..rows {
                if i != j {
                    totals[labels[j]] += squared_distance(data.row(i), data.row(j)).sqrt();
                }
            }

            let a = totals[own] / (sizes[own] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != own && sizes[c] > 0)
                .map(|c| totals[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let scale = a.max(b);
            if scale > 0.0 {
                (b - a) / scale
            } else {
                0.0
            }
        })
        .collect();

    Some(scores.iter().sum::<f64>() / rows as f64)
}
