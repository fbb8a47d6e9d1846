//! One-dimensional k-means over a fine histogram

use rand::Rng;

use super::{Trained, converged};
use crate::config::TrainConfig;
use crate::data::DataMatrix;
use crate::progress::{NodeReport, Progress};
use crate::structures::{CentroidGraph, WeightedSampler};
use crate::tree::{LeafNode, QuantNode};

/// Histogram of one dimension at `K × resolution` bins
struct Histogram {
    base: f64,
    bin_width: f64,
    pop: Vec<u64>,
    mass: Vec<f64>,
}

impl Histogram {
    fn bins(&self) -> usize {
        self.pop.len()
    }

    /// Lower edge of bin `b`
    fn value(&self, b: usize) -> f64 {
        self.base + b as f64 * self.bin_width
    }

    /// Map every bin to the nearest of the sorted centroids
    ///
    /// Bin `b` goes to centroid `k` when it lies between the midpoints
    /// `(cen[k-1] + cen[k]) / 2` and `(cen[k] + cen[k+1]) / 2`.
    fn assign(&self, centroids: &[f64]) -> Vec<u32> {
        let bins = self.bins();
        let mids: Vec<usize> = centroids
            .windows(2)
            .map(|w| {
                let mid = ((w[0] + w[1]) / 2.0 - self.base) / self.bin_width;
                (mid.max(0.0) as usize).min(bins)
            })
            .collect();
        let mut source = Vec::with_capacity(bins);
        let mut k = 0;
        for b in 0..bins {
            while k < mids.len() && b >= mids[k] {
                k += 1;
            }
            source.push(k as u32);
        }
        source
    }

    /// Move every populated centroid to the mean of its bins and return the
    /// empty ones
    fn refit(&self, source: &[u32], centroids: &mut [f64]) -> Vec<usize> {
        let k = centroids.len();
        let mut pop = vec![0u64; k];
        let mut mass = vec![0.0f64; k];
        for (b, &c) in source.iter().enumerate() {
            pop[c as usize] += self.pop[b];
            mass[c as usize] += self.mass[b];
        }
        let mut empty = Vec::new();
        for c in 0..k {
            if pop[c] > 0 {
                centroids[c] = mass[c] / pop[c] as f64;
            } else {
                empty.push(c);
            }
        }
        empty
    }
}

fn sort(centroids: &mut [f64]) {
    centroids.sort_unstable_by(|a, b| a.total_cmp(b));
}

/// Train a `k`-centroid leaf over `values`
pub(crate) fn train_leaf<R: Rng + ?Sized>(
    values: &[f32],
    k: usize,
    offset: usize,
    config: &TrainConfig,
    rng: &mut R,
    progress: &dyn Progress,
) -> Trained {
    let (mut min, mut max) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x as f64), hi.max(x as f64))
        });
    if !(min <= max) {
        (min, max) = (0.0, 0.0);
    }
    let bins = k * config.resolution;
    let length = max - min + f64::from(f32::EPSILON);

    let mut leaf = LeafNode {
        base: min,
        bin_width: length / bins as f64,
        centroids: Vec::new(),
        bin_to_centroid: vec![0; bins],
        graph: CentroidGraph::with_self_loops(0),
    };

    let mut hist = Histogram {
        base: leaf.base,
        bin_width: leaf.bin_width,
        pop: vec![0; bins],
        mass: vec![0.0; bins],
    };
    let codes: Vec<u32> = values
        .iter()
        .map(|&x| {
            let b = leaf.bin_of(x);
            hist.pop[b] += 1;
            hist.mass[b] += x as f64;
            b as u32
        })
        .collect();

    let mut sampler = WeightedSampler::new(hist.pop.iter().map(|&p| p as f64).collect());
    let mut centroids: Vec<f64> = sampler
        .draw_many(k, rng)
        .into_iter()
        .map(|b| hist.value(b))
        .collect();
    sort(&mut centroids);
    let mut source = hist.assign(&centroids);

    let mut report = NodeReport {
        offset,
        dims: 1,
        k,
        ..Default::default()
    };

    let mut resample = |empty: &[usize], centroids: &mut Vec<f64>, rng: &mut R| {
        for &c in empty {
            centroids[c] = hist.value(sampler.draw(rng));
        }
        sort(centroids);
    };

    // A single centroid is the mean of all values
    if k > 1 {
        for iteration in 0.. {
            let empty = hist.refit(&source, &mut centroids);
            report.empty_resampled += empty.len();
            resample(&empty, &mut centroids, rng);

            let next = hist.assign(&centroids);
            let changed = next.iter().zip(&source).filter(|(a, b)| a != b).count();
            source = next;
            report.iterations = iteration + 1;
            progress.iteration(0, offset, iteration, changed, bins);

            if converged(changed, bins, config.theta, iteration) {
                break;
            }
            if report.iterations >= config.max_iters {
                report.capped = true;
                break;
            }
        }
    }

    let empty = hist.refit(&source, &mut centroids);
    report.empty_resampled += empty.len();
    resample(&empty, &mut centroids, rng);
    source = hist.assign(&centroids);

    let mut populated = vec![false; k];
    for (b, &c) in source.iter().enumerate() {
        populated[c as usize] |= hist.pop[b] > 0;
    }
    report.empty_final = populated.iter().filter(|&&p| !p).count();

    let labels = codes.iter().map(|&b| source[b as usize]).collect();
    let mut matrix = DataMatrix::zeros(1, k);
    for (slot, &c) in matrix.column_mut(0).iter_mut().zip(&centroids) {
        *slot = c as f32;
    }

    leaf.graph = CentroidGraph::path(&centroids);
    leaf.centroids = centroids;
    leaf.bin_to_centroid = source;
    report.edges = leaf.graph.edge_count();
    progress.node_trained(&report);

    Trained {
        node: QuantNode::Leaf(leaf),
        labels,
        centroids: matrix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::progress::tests::Recorder;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn train(values: &[f32], k: usize, seed: u64) -> Trained {
        let mut rng = StdRng::seed_from_u64(seed);
        train_leaf(values, k, 0, &TrainConfig::default(), &mut rng, &NoProgress)
    }

    #[test]
    fn test_two_clusters() {
        let values = [0.0, 0.3, 0.31, 0.9, 1.0];
        for seed in 0..8 {
            let trained = train(&values, 2, seed);
            assert_eq!(trained.labels, vec![0, 0, 0, 1, 1]);
            let QuantNode::Leaf(leaf) = &trained.node else {
                unreachable!()
            };
            assert!((leaf.centroids()[0] - 0.61 / 3.0).abs() < 1e-6);
            assert!((leaf.centroids()[1] - 0.95).abs() < 1e-6);
            assert_eq!(leaf.bins(), 128);
            assert_eq!(trained.centroids.dim(), 1);
            assert_eq!(trained.centroids.len(), 2);
        }
    }

    #[test]
    fn test_monotone_and_consistent_with_lookup() {
        let mut rng = StdRng::seed_from_u64(7);
        let values: Vec<f32> = (0..2000).map(|_| rng.random::<f32>().powi(2)).collect();
        let trained = train(&values, 8, 42);
        let QuantNode::Leaf(leaf) = &trained.node else {
            unreachable!()
        };
        assert!(leaf.centroids().windows(2).all(|w| w[0] <= w[1]));
        assert!(leaf.bin_to_centroid().windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(trained.node.fast(&DataMatrix::from_columns(vec![values]).unwrap(), 0), trained.labels);
        assert_eq!(leaf.graph.len(), 8);
        assert_eq!(leaf.graph.edge_count(), 7);
    }

    #[test]
    fn test_constant_dimension() {
        let trained = train(&[0.5; 10], 4, 1);
        let QuantNode::Leaf(leaf) = &trained.node else {
            unreachable!()
        };
        assert!(leaf.bin_width() > 0.0);
        assert!(trained.labels.iter().all(|&l| l == trained.labels[0]));
    }

    #[test]
    fn test_reports_iterations() {
        let recorder = Recorder::default();
        let mut rng = StdRng::seed_from_u64(3);
        let values: Vec<f32> = (0..500).map(|i| (i % 17) as f32).collect();
        let config = TrainConfig::default().with_max_iters(2).with_theta(0.01);
        train_leaf(&values, 4, 5, &config, &mut rng, &recorder);
        let nodes = recorder.nodes.lock().unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].offset, 5);
        assert!(nodes[0].iterations <= 2);
    }

    #[test]
    fn test_single_centroid_is_mean() {
        let recorder = Recorder::default();
        let mut rng = StdRng::seed_from_u64(9);
        let values = [0.0, 0.25, 1.0, 2.75];
        let trained = train_leaf(&values, 1, 0, &TrainConfig::default(), &mut rng, &recorder);
        let QuantNode::Leaf(leaf) = &trained.node else {
            unreachable!()
        };
        assert!((leaf.centroids()[0] - 1.0).abs() < 1e-9);
        assert!(trained.labels.iter().all(|&l| l == 0));
        assert_eq!(leaf.graph.edge_count(), 0);
        let nodes = recorder.nodes.lock().unwrap();
        assert_eq!(nodes[0].iterations, 0);
        assert_eq!(nodes[0].empty_final, 0);
    }
}
