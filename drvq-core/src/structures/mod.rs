//! Core data structures: priority queues, centroid graphs, distance
//! matrices and weighted sampling

pub mod graph;
pub mod matrix;
pub mod queue;
pub mod sampling;

pub use graph::CentroidGraph;
pub use matrix::{DistanceMatrix, argmin};
pub use queue::{BucketQueue, Handle, IndexedHeap, PriorityQueue, new_queue};
pub use sampling::WeightedSampler;
