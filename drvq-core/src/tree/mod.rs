//! Binary quantization tree: query path
//!
//! A tree over `D` dimensions (a power of two) has 1-dimensional leaves and
//! internal nodes that each split their dimensions into two halves. Every
//! node labels a point with one of its `K` centroids:
//!
//! - `fast`: leaf bin lookup, then grid lookup at every internal node
//! - `exact`: nearest centroid by true squared distance at every node
//! - `approx`: fast child labels, then the nearest among the parent
//!   centroids adjacent to the fast cell in either child's graph
//!
//! All methods take the data matrix plus `offset`, the absolute column of
//! the node's first dimension.

mod format;
mod leaf;
mod node;

use std::ops::Range;

pub use leaf::LeafNode;
pub use node::InternalNode;

use crate::data::DataMatrix;
use crate::structures::{CentroidGraph, DistanceMatrix, argmin};

/// Points per block when materializing full distance tables
const DISTANCE_BLOCK: usize = 256;

/// Node of the quantization tree
#[derive(Debug, Clone, PartialEq)]
pub enum QuantNode {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl QuantNode {
    /// Centroid count
    pub fn k(&self) -> usize {
        match self {
            QuantNode::Leaf(leaf) => leaf.k(),
            QuantNode::Internal(node) => node.k(),
        }
    }

    /// Dimensions covered
    pub fn dims(&self) -> usize {
        match self {
            QuantNode::Leaf(_) => 1,
            QuantNode::Internal(node) => node.dims(),
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            QuantNode::Leaf(_) => 0,
            QuantNode::Internal(node) => 1 + node.child0.depth().max(node.child1.depth()),
        }
    }

    pub fn graph(&self) -> &CentroidGraph {
        match self {
            QuantNode::Leaf(leaf) => &leaf.graph,
            QuantNode::Internal(node) => &node.graph,
        }
    }

    /// Label every point by table lookup
    pub fn fast(&self, data: &DataMatrix, offset: usize) -> Vec<u32> {
        match self {
            QuantNode::Leaf(leaf) => data
                .column(offset)
                .iter()
                .map(|&x| leaf.quantize(x))
                .collect(),
            QuantNode::Internal(node) => {
                let q0 = node.child0.fast(data, offset + node.dims0.start);
                let q1 = node.child1.fast(data, offset + node.dims1.start);
                q0.iter()
                    .zip(&q1)
                    .map(|(&c0, &c1)| node.lookup(c0, c1))
                    .collect()
            }
        }
    }

    /// Squared distances from a block of points to all centroids
    pub fn distances(&self, data: &DataMatrix, offset: usize, points: Range<usize>) -> DistanceMatrix {
        match self {
            QuantNode::Leaf(leaf) => leaf.distances(&data.column(offset)[points]),
            QuantNode::Internal(node) => {
                let mut dist = node
                    .child0
                    .distances(data, offset + node.dims0.start, points.clone())
                    .select_columns(&node.code0);
                let dist1 = node
                    .child1
                    .distances(data, offset + node.dims1.start, points)
                    .select_columns(&node.code1);
                dist.add_assign(&dist1);
                dist
            }
        }
    }

    /// Squared distance from point `n` to one centroid
    pub fn distance_to(&self, data: &DataMatrix, offset: usize, n: usize, centroid: u32) -> f64 {
        match self {
            QuantNode::Leaf(leaf) => leaf.distance(data.get(offset, n), centroid),
            QuantNode::Internal(node) => {
                let c = centroid as usize;
                node.child0
                    .distance_to(data, offset + node.dims0.start, n, node.code0[c])
                    + node
                        .child1
                        .distance_to(data, offset + node.dims1.start, n, node.code1[c])
            }
        }
    }

    /// Nearest centroid of every point by true distance, with that distance
    pub fn exact(&self, data: &DataMatrix, offset: usize) -> (Vec<u32>, Vec<f64>) {
        let mut labels = Vec::with_capacity(data.len());
        let mut distortion = Vec::with_capacity(data.len());
        let mut start = 0;
        while start < data.len() {
            let end = (start + DISTANCE_BLOCK).min(data.len());
            let dist = self.distances(data, offset, start..end);
            for r in 0..dist.rows() {
                let (k, d) = dist.row_argmin(r);
                labels.push(k as u32);
                distortion.push(d);
            }
            start = end;
        }
        (labels, distortion)
    }

    /// Fast labels refined over graph neighbours under `range`
    ///
    /// Leaves have no grid to refine and answer with `fast`.
    pub fn approx(&self, data: &DataMatrix, offset: usize, range: f64) -> Vec<u32> {
        match self {
            QuantNode::Leaf(_) => self.fast(data, offset),
            QuantNode::Internal(node) => {
                let q0 = node.child0.fast(data, offset + node.dims0.start);
                let q1 = node.child1.fast(data, offset + node.dims1.start);
                (0..data.len())
                    .map(|n| {
                        let candidates = node.candidates(q0[n], q1[n], range);
                        let dist: Vec<f64> = candidates
                            .iter()
                            .map(|&c| self.distance_to(data, offset, n, c))
                            .collect();
                        candidates[argmin(&dist).0]
                    })
                    .collect()
            }
        }
    }

    /// Squared distance of every point to its given centroid
    pub fn distortion(&self, data: &DataMatrix, offset: usize, labels: &[u32]) -> Vec<f64> {
        labels
            .iter()
            .enumerate()
            .map(|(n, &c)| self.distance_to(data, offset, n, c))
            .collect()
    }

    /// Squared distances between the given centroids and all centroids,
    /// measured between their reconstructions
    pub fn code_distances(&self, ids: &[u32]) -> DistanceMatrix {
        match self {
            QuantNode::Leaf(leaf) => leaf.code_distances(ids),
            QuantNode::Internal(node) => {
                let ids0: Vec<u32> = ids.iter().map(|&c| node.code0[c as usize]).collect();
                let ids1: Vec<u32> = ids.iter().map(|&c| node.code1[c as usize]).collect();
                let mut dist = node.child0.code_distances(&ids0).select_columns(&node.code0);
                dist.add_assign(&node.child1.code_distances(&ids1).select_columns(&node.code1));
                dist
            }
        }
    }

    /// Write the reconstructions of `ids` into `out`, one point per id
    pub fn reconstruct_into(&self, ids: &[u32], out: &mut DataMatrix, offset: usize) {
        match self {
            QuantNode::Leaf(leaf) => {
                let column = out.column_mut(offset);
                for (slot, &c) in column.iter_mut().zip(ids) {
                    *slot = leaf.centroids[c as usize] as f32;
                }
            }
            QuantNode::Internal(node) => {
                let ids0: Vec<u32> = ids.iter().map(|&c| node.code0[c as usize]).collect();
                let ids1: Vec<u32> = ids.iter().map(|&c| node.code1[c as usize]).collect();
                node.child0
                    .reconstruct_into(&ids0, out, offset + node.dims0.start);
                node.child1
                    .reconstruct_into(&ids1, out, offset + node.dims1.start);
            }
        }
    }

    /// Reconstructions of the given centroids as a `dims × ids.len()` matrix
    pub fn reconstruct(&self, ids: &[u32]) -> DataMatrix {
        let mut out = DataMatrix::zeros(self.dims(), ids.len());
        self.reconstruct_into(ids, &mut out, 0);
        out
    }

    /// Reconstructions of every centroid
    pub fn flat(&self) -> DataMatrix {
        let ids: Vec<u32> = (0..self.k() as u32).collect();
        self.reconstruct(&ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two leaves with centroids {0, 1}, parent with 3 centroids
    pub(crate) fn small_tree() -> QuantNode {
        let leaf = || {
            QuantNode::Leaf(LeafNode {
                base: 0.0,
                bin_width: 0.25,
                centroids: vec![0.0, 1.0],
                bin_to_centroid: vec![0, 0, 1, 1],
                graph: CentroidGraph::path(&[0.0, 1.0]),
            })
        };
        let mut graph = CentroidGraph::with_self_loops(3);
        graph.add_edge(0, 1, 0.1);
        graph.add_edge(1, 2, 0.1);
        QuantNode::Internal(InternalNode {
            j: 2,
            dims0: 0..1,
            dims1: 1..2,
            // centroids at (0,0), (1,0), (1,1)
            code0: vec![0, 1, 1],
            code1: vec![0, 0, 1],
            // cell (0,1) is closest to centroids 0 and 2, assigned to 2
            grid: vec![0, 1, 2, 2],
            graph,
            child0: Box::new(leaf()),
            child1: Box::new(leaf()),
        })
    }

    fn points() -> DataMatrix {
        DataMatrix::from_points(&[
            vec![0.1, 0.1],
            vec![0.9, 0.2],
            vec![0.8, 0.9],
            vec![0.1, 0.6],
        ])
        .unwrap()
    }

    #[test]
    fn test_fast_and_exact() {
        let tree = small_tree();
        let data = points();
        assert_eq!(tree.k(), 3);
        assert_eq!(tree.dims(), 2);
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.fast(&data, 0), vec![0, 1, 2, 2]);

        let (labels, dist) = tree.exact(&data, 0);
        // (0.1, 0.6) is nearer to (0,0) than to (1,1)
        assert_eq!(labels, vec![0, 1, 2, 0]);
        assert!((dist[3] - (0.01 + 0.36)).abs() < 1e-6);
    }

    #[test]
    fn test_approx_recovers_exact_over_graph() {
        let tree = small_tree();
        let data = points();
        // Leaf edges weigh 1.0, so a range above it opens every neighbour
        let approx = tree.approx(&data, 0, 1.5);
        assert_eq!(approx, tree.exact(&data, 0).0);
        // With a range that excludes every child edge only the fast cell remains
        assert_eq!(tree.approx(&data, 0, 1e-9), tree.fast(&data, 0));
    }

    #[test]
    fn test_candidates_contain_fast_label() {
        let QuantNode::Internal(node) = small_tree() else {
            unreachable!()
        };
        for c0 in 0..2 {
            for c1 in 0..2 {
                let fast = node.lookup(c0, c1);
                for range in [0.0, 1e-3, 0.5, 2.0] {
                    assert!(node.candidates(c0, c1, range).contains(&fast));
                }
            }
        }
    }

    #[test]
    fn test_code_distances_and_flat() {
        let tree = small_tree();
        let d = tree.code_distances(&[0, 2]);
        assert_eq!(d.row(0), &[0.0, 1.0, 2.0]);
        assert_eq!(d.row(1), &[2.0, 1.0, 0.0]);

        let flat = tree.flat();
        assert_eq!(flat.point(1), vec![1.0, 0.0]);
        assert_eq!(flat.point(2), vec![1.0, 1.0]);

        let data = points();
        let labels = tree.fast(&data, 0);
        let distortion = tree.distortion(&data, 0, &labels);
        assert!((distortion[0] - 0.02).abs() < 1e-6);
    }

    #[test]
    fn test_offset_into_wider_matrix() {
        let tree = small_tree();
        let wide = DataMatrix::from_points(&[vec![5.0, 5.0, 0.9, 0.9]]).unwrap();
        assert_eq!(tree.fast(&wide, 2), vec![2]);
        assert_eq!(tree.exact(&wide, 2).0, vec![2]);
    }
}
