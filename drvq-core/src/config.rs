//! Training and labeling configuration
//!
//! `TrainConfig` carries everything tree training consumes: the number of
//! codebooks, the per-level capacity schedule, the termination parameter
//! `theta`, the edge admission `range` and the priority queue strategy.
//! Capacity schedules are indexed by `log2` of a node's dimension count, so
//! `capacity[0]` is the leaf centroid count.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Descriptor family, which fixes the dimensionality and capacity presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Descriptor {
    Sift,
    Surf,
}

impl Descriptor {
    pub fn dim(self) -> usize {
        match self {
            Descriptor::Sift => 128,
            Descriptor::Surf => 64,
        }
    }
}

/// Capacity schedule presets, as `log2` of the centroid count per level
pub fn capacity_preset(descriptor: Descriptor, books: usize, id: usize) -> Result<Vec<usize>> {
    let exponents: &[usize] = match (descriptor, books, id) {
        (Descriptor::Sift, 4, 7) => &[6, 7, 8, 9, 11, 16],
        (Descriptor::Sift, 4, 6) => &[6, 7, 8, 9, 11, 15],
        (Descriptor::Sift, 4, 5) => &[6, 7, 8, 9, 11, 14],
        (Descriptor::Sift, 4, 4) => &[6, 7, 8, 9, 11, 13],
        (Descriptor::Sift, 4, 3) => &[6, 7, 8, 9, 10, 12],
        (Descriptor::Sift, 4, 2) => &[5, 6, 7, 8, 9, 11],
        (Descriptor::Sift, 4, 1) => &[5, 6, 7, 8, 9, 10],
        (Descriptor::Sift, 4, 0) => &[4, 5, 6, 7, 8, 9],

        (Descriptor::Sift, 2, 6) => &[6, 7, 8, 9, 10, 12, 16],
        (Descriptor::Sift, 2, 5) => &[6, 7, 8, 9, 10, 12, 15],
        (Descriptor::Sift, 2, 4) => &[6, 7, 8, 9, 10, 12, 14],
        (Descriptor::Sift, 2, 3) => &[6, 7, 8, 9, 10, 11, 13],
        (Descriptor::Sift, 2, 2) => &[5, 6, 7, 8, 9, 10, 12],
        (Descriptor::Sift, 2, 1) => &[5, 6, 7, 8, 9, 10, 11],
        (Descriptor::Sift, 2, 0) => &[4, 5, 6, 7, 8, 9, 10],

        (Descriptor::Sift, 1, 6) => &[6, 7, 8, 9, 10, 11, 12, 16],
        (Descriptor::Sift, 1, 5) => &[6, 7, 8, 9, 10, 11, 12, 15],
        (Descriptor::Sift, 1, 4) => &[6, 7, 8, 9, 10, 11, 12, 14],
        (Descriptor::Sift, 1, 3) => &[6, 7, 8, 9, 10, 11, 12, 13],
        (Descriptor::Sift, 1, 2) => &[5, 6, 7, 8, 9, 10, 11, 13],
        (Descriptor::Sift, 1, 1) => &[5, 6, 7, 8, 9, 10, 11, 12],
        (Descriptor::Sift, 1, 0) => &[4, 5, 6, 7, 8, 9, 10, 11],

        (Descriptor::Surf, _, 3) => &[5, 6, 7, 8, 10, 12],
        (Descriptor::Surf, _, 2) => &[5, 6, 7, 8, 9, 11],
        (Descriptor::Surf, _, 1) => &[4, 5, 6, 7, 8, 10],
        (Descriptor::Surf, _, 0) => &[4, 5, 6, 7, 8, 9],

        _ => {
            return Err(Error::Config(format!(
                "unsupported capacity: {:?} with {} books, id {}",
                descriptor, books, id
            )));
        }
    };
    Ok(exponents.iter().map(|&e| 1usize << e).collect())
}

/// Priority queue strategy used by grid propagation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueMode {
    /// Indexed binary heap over all queued cells
    #[default]
    Heap,
    /// Fixed-width priority buckets, heapified lazily one bucket at a time
    Bucket {
        /// Average number of cells per bucket
        bucket_size: usize,
    },
}

/// Configuration for codebook training
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Number of independent codebooks (dimension blocks)
    pub books: usize,
    /// Centroid count per level, indexed by log2 of the node dimension
    pub capacity: Vec<usize>,
    /// Termination parameter
    pub theta: f64,
    /// Maximum weight of child edges followed during propagation
    pub range: f64,
    /// Priority queue strategy
    pub queue: QueueMode,
    /// Random seed for reproducibility
    pub seed: u64,
    /// Upper bound on refinement iterations per node
    pub max_iters: usize,
    /// Fine bins per leaf centroid
    pub resolution: usize,
    /// Train codebooks concurrently
    pub parallel: bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            books: 4,
            capacity: vec![1 << 5, 1 << 6, 1 << 7, 1 << 8, 1 << 9, 1 << 11],
            theta: 5.0,
            range: 0.35,
            queue: QueueMode::Heap,
            seed: 42,
            max_iters: 200,
            resolution: 64,
            parallel: false,
        }
    }
}

impl TrainConfig {
    pub fn new(books: usize, capacity: Vec<usize>) -> Self {
        Self {
            books,
            capacity,
            ..Default::default()
        }
    }

    /// Preset capacity schedule for a descriptor family
    pub fn preset(descriptor: Descriptor, books: usize, capacity_id: usize) -> Result<Self> {
        Ok(Self::new(
            books,
            capacity_preset(descriptor, books, capacity_id)?,
        ))
    }

    pub fn with_theta(mut self, theta: f64) -> Self {
        self.theta = theta;
        self
    }

    pub fn with_range(mut self, range: f64) -> Self {
        self.range = range;
        self
    }

    pub fn with_queue(mut self, queue: QueueMode) -> Self {
        self.queue = queue;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_iters(mut self, iters: usize) -> Self {
        self.max_iters = iters;
        self
    }

    pub fn with_resolution(mut self, resolution: usize) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Centroid count for a node spanning `dim` dimensions
    pub fn capacity_for(&self, dim: usize) -> usize {
        if self.capacity.is_empty() || dim == 0 {
            return 0;
        }
        let level = dim.ilog2() as usize;
        self.capacity[level.min(self.capacity.len() - 1)]
    }

    /// Check the configuration against a data dimensionality
    pub fn validate(&self, dim: usize) -> Result<()> {
        if self.capacity.is_empty() {
            return Err(Error::Config("empty capacity schedule".into()));
        }
        if self.capacity[0] == 0 {
            return Err(Error::Config("leaf capacity must be positive".into()));
        }
        if self.books == 0 || dim == 0 {
            return Err(Error::Config(format!(
                "cannot split {} dimensions into {} codebooks",
                dim, self.books
            )));
        }
        if !dim.is_multiple_of(self.books) {
            return Err(Error::Config(format!(
                "{} dimensions do not split evenly into {} codebooks",
                dim, self.books
            )));
        }
        let block = dim / self.books;
        if !block.is_power_of_two() {
            return Err(Error::Config(format!(
                "codebook dimension block {} is not a power of two",
                block
            )));
        }
        if self.resolution == 0 {
            return Err(Error::Config("leaf resolution must be positive".into()));
        }
        if !(self.range > 0.0) || !(self.theta > 0.0) {
            return Err(Error::Config(format!(
                "theta ({}) and range ({}) must be positive",
                self.theta, self.range
            )));
        }
        if let QueueMode::Bucket { bucket_size: 0 } = self.queue {
            return Err(Error::Config("bucket size must be positive".into()));
        }

        // Every internal node quantizes a J×J grid, so K may not exceed J².
        let mut d = 2;
        while d <= block {
            let k = self.capacity_for(d);
            let j = self.capacity_for(d / 2);
            if k > j.saturating_mul(j) {
                return Err(Error::Config(format!(
                    "capacity {} at dimension {} exceeds grid size {}x{}",
                    k, d, j, j
                )));
            }
            d *= 2;
        }

        let top = self.capacity_for(block) as f64;
        if top.log2() * self.books as f64 > 64.0 {
            return Err(Error::Config(format!(
                "{} codebooks of {} centroids overflow a 64-bit code",
                self.books, top
            )));
        }
        Ok(())
    }
}

/// Query labeling method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelMethod {
    /// Grid lookup at every node
    Fast,
    /// Grid lookup refined over graph neighbours within `range`
    Approx,
    /// Nearest centroid by true distance at every node
    Exact,
}

/// Configuration for labeling vectors with a trained codebook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelConfig {
    pub method: LabelMethod,
    /// Neighbour weight cutoff for `Approx`
    pub range: f64,
    /// Also report squared distance to the assigned centroid
    pub distortion: bool,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            method: LabelMethod::Exact,
            range: 0.45,
            distortion: true,
        }
    }
}

impl LabelConfig {
    pub fn new(method: LabelMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn with_range(mut self, range: f64) -> Self {
        self.range = range;
        self
    }

    pub fn with_distortion(mut self, distortion: bool) -> Self {
        self.distortion = distortion;
        self
    }
}
