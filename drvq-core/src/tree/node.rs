//! Internal node quantizing the product of two children's label spaces

use std::ops::Range;

use super::QuantNode;
use crate::structures::CentroidGraph;

/// Internal node of the quantization tree
///
/// Cell `(c0, c1)` of the `J×J` grid, where `c0` and `c1` are the labels of
/// the two children, lives at offset `c0 + J * c1` and holds the parent
/// centroid for that pair. Each parent centroid `k` sits at grid position
/// `(code0[k], code1[k])`.
#[derive(Debug, Clone, PartialEq)]
pub struct InternalNode {
    pub(crate) j: usize,
    pub(crate) dims0: Range<usize>,
    pub(crate) dims1: Range<usize>,
    pub(crate) code0: Vec<u32>,
    pub(crate) code1: Vec<u32>,
    pub(crate) grid: Vec<u32>,
    pub(crate) graph: CentroidGraph,
    pub(crate) child0: Box<QuantNode>,
    pub(crate) child1: Box<QuantNode>,
}

impl InternalNode {
    pub fn k(&self) -> usize {
        self.code0.len()
    }

    pub fn j(&self) -> usize {
        self.j
    }

    pub fn dims(&self) -> usize {
        self.dims1.end
    }

    /// Child dimension ranges, relative to this node's first dimension
    pub fn dim_ranges(&self) -> (Range<usize>, Range<usize>) {
        (self.dims0.clone(), self.dims1.clone())
    }

    pub fn children(&self) -> (&QuantNode, &QuantNode) {
        (&self.child0, &self.child1)
    }

    pub fn codes(&self) -> (&[u32], &[u32]) {
        (&self.code0, &self.code1)
    }

    pub fn grid(&self) -> &[u32] {
        &self.grid
    }

    #[inline]
    pub fn cell(&self, c0: u32, c1: u32) -> usize {
        c0 as usize + self.j * c1 as usize
    }

    #[inline]
    pub fn lookup(&self, c0: u32, c1: u32) -> u32 {
        self.grid[self.cell(c0, c1)]
    }

    /// Parent centroids owning the cells next to `(q0, q1)` along either
    /// child's graph under `range`, sorted and deduplicated
    ///
    /// Both children contribute their self-loops, so `lookup(q0, q1)` is
    /// always a candidate.
    pub fn candidates(&self, q0: u32, q1: u32, range: f64) -> Vec<u32> {
        let mut candidates: Vec<u32> = self
            .child0
            .graph()
            .within(q0, range)
            .map(|e0| self.lookup(e0, q1))
            .chain(
                self.child1
                    .graph()
                    .within(q1, range)
                    .map(|e1| self.lookup(q0, e1)),
            )
            .collect();
        if candidates.is_empty() {
            candidates.push(self.lookup(q0, q1));
        }
        candidates.sort_unstable();
        candidates.dedup();
        candidates
    }
}
