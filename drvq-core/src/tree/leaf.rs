//! One-dimensional leaf quantizer

use crate::structures::{CentroidGraph, DistanceMatrix};

/// Quantizes a single dimension by binning
///
/// The trained interval `[base, base + bins * bin_width)` is cut into fine
/// bins, and every bin maps to one of `K` sorted centroids. Values outside
/// the interval clamp to the first or last bin.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafNode {
    pub(crate) base: f64,
    pub(crate) bin_width: f64,
    pub(crate) centroids: Vec<f64>,
    pub(crate) bin_to_centroid: Vec<u32>,
    pub(crate) graph: CentroidGraph,
}

impl LeafNode {
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn bins(&self) -> usize {
        self.bin_to_centroid.len()
    }

    pub fn centroids(&self) -> &[f64] {
        &self.centroids
    }

    pub fn bin_to_centroid(&self) -> &[u32] {
        &self.bin_to_centroid
    }

    /// Fine bin of a value, clamped to the trained interval
    #[inline]
    pub fn bin_of(&self, x: f32) -> usize {
        // Negative and NaN offsets saturate to bin 0
        let b = ((x as f64 - self.base) / self.bin_width) as usize;
        b.min(self.bin_to_centroid.len() - 1)
    }

    #[inline]
    pub fn quantize(&self, x: f32) -> u32 {
        self.bin_to_centroid[self.bin_of(x)]
    }

    #[inline]
    pub fn distance(&self, x: f32, centroid: u32) -> f64 {
        let d = x as f64 - self.centroids[centroid as usize];
        d * d
    }

    /// Squared distances from values to all centroids
    pub(crate) fn distances(&self, values: &[f32]) -> DistanceMatrix {
        DistanceMatrix::from_fn(values.len(), self.k(), |n, k| {
            self.distance(values[n], k as u32)
        })
    }

    /// Squared distances between the given centroids and all centroids
    pub(crate) fn code_distances(&self, ids: &[u32]) -> DistanceMatrix {
        DistanceMatrix::from_fn(ids.len(), self.k(), |r, k| {
            let d = self.centroids[ids[r] as usize] - self.centroids[k];
            d * d
        })
    }
}
