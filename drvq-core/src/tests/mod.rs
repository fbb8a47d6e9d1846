//! Cross-module scenarios: files to codebook to labels

mod pipeline;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::data::DataMatrix;

/// Points around the corners of the unit cube, `noise` wide per coordinate
pub(crate) fn corner_clusters(dim: usize, n: usize, noise: f32, seed: u64) -> DataMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let points: Vec<Vec<f32>> = (0..n)
        .map(|_| {
            (0..dim)
                .map(|_| {
                    let corner = if rng.random::<bool>() { 1.0 } else { 0.0 };
                    corner + rng.random_range(-noise..noise)
                })
                .collect()
        })
        .collect();
    DataMatrix::from_points(&points).unwrap()
}

pub(crate) fn uniform(dim: usize, n: usize, seed: u64) -> DataMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let points: Vec<Vec<f32>> = (0..n)
        .map(|_| (0..dim).map(|_| rng.random::<f32>()).collect())
        .collect();
    DataMatrix::from_points(&points).unwrap()
}
