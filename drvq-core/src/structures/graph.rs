//! Centroid adjacency graph
//!
//! Each centroid keeps a list of neighbour ids with matching edge weights.
//! Entry 0 of every list is the centroid itself with weight 0, so iterating
//! a neighbourhood always yields the centroid first.

use std::io::{Read, Write};

use crate::binary::{read_f64s, read_nested, read_u32s, write_f64s, write_nested, write_u32s};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CentroidGraph {
    neighbors: Vec<Vec<u32>>,
    weights: Vec<Vec<f64>>,
}

impl CentroidGraph {
    /// Graph of `k` isolated centroids, each with its self-loop
    pub fn with_self_loops(k: usize) -> Self {
        Self {
            neighbors: (0..k as u32).map(|c| vec![c]).collect(),
            weights: vec![vec![0.0]; k],
        }
    }

    /// Path over centroids sorted along one axis, weighted by squared gaps
    pub fn path(centroids: &[f64]) -> Self {
        let mut graph = Self::with_self_loops(centroids.len());
        for k in 1..centroids.len() {
            let gap = centroids[k] - centroids[k - 1];
            graph.add_edge(k as u32 - 1, k as u32, gap * gap);
        }
        graph
    }

    /// Add a symmetric edge
    pub fn add_edge(&mut self, a: u32, b: u32, weight: f64) {
        self.neighbors[a as usize].push(b);
        self.weights[a as usize].push(weight);
        self.neighbors[b as usize].push(a);
        self.weights[b as usize].push(weight);
    }

    /// Number of centroids
    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbors(&self, centroid: u32) -> &[u32] {
        &self.neighbors[centroid as usize]
    }

    pub fn weights(&self, centroid: u32) -> &[f64] {
        &self.weights[centroid as usize]
    }

    /// Neighbours (self included) reachable over edges lighter than `range`
    pub fn within(&self, centroid: u32, range: f64) -> impl Iterator<Item = u32> + '_ {
        self.neighbors(centroid)
            .iter()
            .zip(self.weights(centroid))
            .filter(move |&(_, &w)| w < range)
            .map(|(&n, _)| n)
    }

    /// Neighbours other than the centroid itself, with weights
    pub fn adjacent(&self, centroid: u32) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.neighbors(centroid)
            .iter()
            .zip(self.weights(centroid))
            .skip(1)
            .map(|(&n, &w)| (n, w))
    }

    /// Undirected edges, self-loops excluded
    pub fn edge_count(&self) -> usize {
        self.neighbors.iter().map(|n| n.len().saturating_sub(1)).sum::<usize>() / 2
    }

    /// Mean number of neighbours under `range`, self excluded
    pub fn mean_degree(&self, range: f64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let total: usize = (0..self.len() as u32)
            .map(|c| self.adjacent(c).filter(|&(_, w)| w < range).count())
            .sum();
        total as f64 / self.len() as f64
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_nested(writer, &self.neighbors, write_u32s)?;
        write_nested(writer, &self.weights, write_f64s)
    }

    /// Read a graph over `k` centroids
    pub fn read_from<R: Read>(reader: &mut R, k: usize) -> Result<Self> {
        let neighbors = read_nested(reader, read_u32s)?;
        let weights = read_nested(reader, read_f64s)?;
        if neighbors.len() != k || weights.len() != k {
            return Err(Error::Corruption(format!(
                "graph has {}/{} adjacency lists for {} centroids",
                neighbors.len(),
                weights.len(),
                k
            )));
        }
        for (c, (n, w)) in neighbors.iter().zip(&weights).enumerate() {
            if n.len() != w.len() || n.first() != Some(&(c as u32)) {
                return Err(Error::Corruption(format!(
                    "malformed adjacency list for centroid {}",
                    c
                )));
            }
            if n.iter().any(|&id| id as usize >= k) {
                return Err(Error::Corruption(format!(
                    "neighbour of centroid {} out of range",
                    c
                )));
            }
        }
        Ok(Self { neighbors, weights })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_path_graph() {
        let graph = CentroidGraph::path(&[0.0, 0.5, 2.0]);
        assert_eq!(graph.neighbors(0), &[0, 1]);
        assert_eq!(graph.neighbors(1), &[1, 0, 2]);
        assert_eq!(graph.weights(1), &[0.0, 0.25, 2.25]);
        assert_eq!(graph.neighbors(2), &[2, 1]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_within_includes_self() {
        let graph = CentroidGraph::path(&[0.0, 0.5, 2.0]);
        let near: Vec<u32> = graph.within(1, 1.0).collect();
        assert_eq!(near, vec![1, 0]);
        let far: Vec<u32> = graph.within(1, 10.0).collect();
        assert_eq!(far, vec![1, 0, 2]);
        assert!((graph.mean_degree(1.0) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_serialization() {
        let mut graph = CentroidGraph::with_self_loops(4);
        graph.add_edge(0, 3, 0.2);
        graph.add_edge(1, 2, 0.4);
        let mut buf = Vec::new();
        graph.write_to(&mut buf).unwrap();
        let back = CentroidGraph::read_from(&mut Cursor::new(&buf), 4).unwrap();
        assert_eq!(back, graph);

        // Wrong centroid count is rejected
        assert!(CentroidGraph::read_from(&mut Cursor::new(&buf), 5).is_err());
    }
}
