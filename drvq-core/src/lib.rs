//! drvq - dimensionality-recursive vector quantization
//!
//! Hierarchical product codebooks for high-dimensional descriptors:
//! - Data dimensions split into independent blocks, one tree per block
//! - 1-D k-means leaves over fine histograms
//! - Internal nodes quantize the grid of their children's label pairs
//! - Grid propagation with heap or bucket priority queues
//! - Centroid adjacency graphs for approximate labeling
//! - Fast, approximate and exact labeling into 64-bit codes
//! - Binary codebook and label files

pub(crate) mod binary;
pub mod codebook;
pub mod config;
pub mod data;
pub mod error;
pub mod labels;
pub mod progress;
pub mod structures;
pub mod train;
pub mod tree;

pub use codebook::{CODEBOOK_MAGIC, CODEBOOK_VERSION, Codebook, Labeling, Neighbor};
pub use config::{Descriptor, LabelConfig, LabelMethod, QueueMode, TrainConfig, capacity_preset};
pub use data::{DataMatrix, FileList, Normalization, load_descriptors, save_descriptors};
pub use error::{Error, Result};
pub use labels::{LabelSet, label_files};
pub use progress::{LogProgress, NoProgress, NodeReport, Progress};
pub use structures::{BucketQueue, CentroidGraph, DistanceMatrix, IndexedHeap, PriorityQueue};
pub use train::{Trained, train_tree};
pub use tree::{InternalNode, LeafNode, QuantNode};

#[cfg(test)]
mod tests;
