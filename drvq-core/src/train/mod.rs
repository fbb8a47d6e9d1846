//! Bottom-up training of quantization trees
//!
//! A tree over `D` dimensions is trained by training its two halves first,
//! then quantizing the grid of their label pairs. Leaves run 1-D k-means on
//! a fine histogram; internal nodes run k-means over populated grid cells,
//! assigning cells through grid propagation.

mod leaf;
mod node;
pub mod propagate;

use std::ops::Range;

use rand::Rng;

pub use propagate::{Propagation, PropagationOutcome, PropagationStats};

use crate::config::TrainConfig;
use crate::data::DataMatrix;
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::tree::QuantNode;

/// A trained subtree together with its training-time outputs
#[derive(Debug)]
pub struct Trained {
    pub node: QuantNode,
    /// Label of every training point
    pub labels: Vec<u32>,
    /// Centroid vectors as refined during training, `dims × K`
    pub centroids: DataMatrix,
}

/// Whether fewer than `theta · min(1, iteration / 100)²` of `domain`
/// assignments changed
pub(crate) fn converged(changed: usize, domain: usize, theta: f64, iteration: usize) -> bool {
    let ramp = (iteration as f64 * 0.01).min(1.0);
    (changed as f64) < domain as f64 * theta * ramp * ramp
}

/// Train a tree over the columns `dims` of `data`
pub fn train_tree<R: Rng + ?Sized>(
    data: &DataMatrix,
    dims: Range<usize>,
    config: &TrainConfig,
    rng: &mut R,
    progress: &dyn Progress,
) -> Result<Trained> {
    if data.is_empty() {
        return Err(Error::EmptyData);
    }
    if dims.is_empty() || dims.end > data.dim() {
        return Err(Error::Config(format!(
            "dimension range {:?} outside data of dimension {}",
            dims,
            data.dim()
        )));
    }
    if !dims.len().is_power_of_two() {
        return Err(Error::Config(format!(
            "tree dimension {} is not a power of two",
            dims.len()
        )));
    }
    build(data, dims, config, rng, progress)
}

fn build<R: Rng + ?Sized>(
    data: &DataMatrix,
    dims: Range<usize>,
    config: &TrainConfig,
    rng: &mut R,
    progress: &dyn Progress,
) -> Result<Trained> {
    let k = config.capacity_for(dims.len());
    if k == 0 {
        return Err(Error::Config(format!(
            "no capacity for nodes of dimension {}",
            dims.len()
        )));
    }
    if dims.len() == 1 {
        return Ok(leaf::train_leaf(
            data.column(dims.start),
            k,
            dims.start,
            config,
            rng,
            progress,
        ));
    }
    let mid = dims.start + dims.len() / 2;
    let child0 = build(data, dims.start..mid, config, rng, progress)?;
    let child1 = build(data, mid..dims.end, config, rng, progress)?;
    node::train_node(child0, child1, k, dims.start, config, rng, progress)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::progress::tests::Recorder;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn random_data(dim: usize, n: usize, seed: u64) -> DataMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let columns = (0..dim)
            .map(|d| {
                (0..n)
                    .map(|_| rng.random::<f32>() * (1.0 + d as f32 * 0.1))
                    .collect()
            })
            .collect();
        DataMatrix::from_columns(columns).unwrap()
    }

    fn config() -> TrainConfig {
        TrainConfig::new(1, vec![4, 8, 16])
    }

    #[test]
    fn test_converged_ramp() {
        assert!(!converged(0, 100, 5.0, 0));
        assert!(converged(0, 100, 5.0, 1));
        // 5 · 0.1² = 5% of the domain at iteration 10
        assert!(converged(4, 100, 5.0, 10));
        assert!(!converged(5, 100, 5.0, 10));
        // The ramp saturates, after which theta ≥ 1 always stops
        assert!(converged(100, 100, 5.0, 100));
    }

    #[test]
    fn test_tree_shape() {
        let data = random_data(4, 300, 1);
        let mut rng = StdRng::seed_from_u64(42);
        let trained = train_tree(&data, 0..4, &config(), &mut rng, &NoProgress).unwrap();
        assert_eq!(trained.node.k(), 16);
        assert_eq!(trained.node.dims(), 4);
        assert_eq!(trained.node.depth(), 2);
        assert_eq!(trained.labels.len(), 300);
        assert_eq!(trained.node.fast(&data, 0), trained.labels);
    }

    #[test]
    fn test_deterministic_for_seed() {
        let data = random_data(4, 200, 2);
        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            train_tree(&data, 0..4, &config(), &mut rng, &NoProgress)
                .unwrap()
                .node
        };
        assert_eq!(run(7), run(7));
    }

    #[test]
    fn test_trains_on_subrange() {
        let data = random_data(8, 100, 3);
        let mut rng = StdRng::seed_from_u64(42);
        let trained = train_tree(&data, 4..8, &config(), &mut rng, &NoProgress).unwrap();
        assert_eq!(trained.node.fast(&data, 4), trained.labels);
    }

    #[test]
    fn test_every_node_reported() {
        let data = random_data(4, 100, 4);
        let recorder = Recorder::default();
        let mut rng = StdRng::seed_from_u64(42);
        train_tree(&data, 0..4, &config(), &mut rng, &recorder).unwrap();
        let nodes = recorder.nodes.lock().unwrap();
        // four leaves, two pairs, one root; children before parents
        assert_eq!(nodes.len(), 7);
        let offsets: Vec<(usize, usize)> = nodes.iter().map(|r| (r.level, r.offset)).collect();
        assert_eq!(
            offsets,
            vec![(0, 0), (0, 1), (1, 0), (0, 2), (0, 3), (1, 2), (2, 0)]
        );
    }

    #[test]
    fn test_invalid_inputs() {
        let mut rng = StdRng::seed_from_u64(42);
        let empty = DataMatrix::zeros(4, 0);
        assert!(matches!(
            train_tree(&empty, 0..4, &config(), &mut rng, &NoProgress),
            Err(Error::EmptyData)
        ));
        let data = random_data(6, 10, 5);
        assert!(matches!(
            train_tree(&data, 0..6, &config(), &mut rng, &NoProgress),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            train_tree(&data, 4..8, &config(), &mut rng, &NoProgress),
            Err(Error::Config(_))
        ));
    }
}
