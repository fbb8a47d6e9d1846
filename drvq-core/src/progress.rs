//! Training and labeling progress callbacks
//!
//! Training reports at well-defined checkpoints: codebook start and end,
//! every refinement iteration, and every finished tree node. `LogProgress`
//! forwards everything to the `log` facade; `NoProgress` drops it.

use std::fmt::Debug;

/// Summary of one trained tree node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeReport {
    /// log2 of the node dimension count (0 for leaves)
    pub level: usize,
    /// First absolute dimension covered by the node
    pub offset: usize,
    /// Dimensions covered by the node
    pub dims: usize,
    /// Centroid count
    pub k: usize,
    /// Child centroid count (0 for leaves)
    pub j: usize,
    /// Refinement iterations run
    pub iterations: usize,
    /// Whether the iteration cap stopped refinement
    pub capped: bool,
    /// Seeds that landed on an occupied grid cell and were resampled
    pub collisions: usize,
    /// Centroids that ended an iteration empty and were resampled
    pub empty_resampled: usize,
    /// Centroids still empty after the final assignment
    pub empty_final: usize,
    /// Grid cells assigned directly because propagation never reached them
    pub unreached: usize,
    /// Undirected graph edges, self-loops excluded
    pub edges: usize,
}

/// Observer of long-running training and labeling
pub trait Progress: Send + Sync + Debug {
    fn book_started(&self, _book: usize, _books: usize, _dims: usize) {}

    fn iteration(&self, _level: usize, _offset: usize, _iteration: usize, _changed: usize, _domain: usize) {}

    fn node_trained(&self, _report: &NodeReport) {}

    fn book_finished(&self, _book: usize) {}

    fn file_processed(&self, _file: usize, _files: usize, _points: usize) {}
}

/// Drops all progress events
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Forwards progress events to the `log` facade
///
/// Nodes with at least `detail_threshold` child centroids are reported at
/// info level, smaller ones at debug level.
#[derive(Debug, Clone, Copy)]
pub struct LogProgress {
    pub detail_threshold: usize,
}

impl Default for LogProgress {
    fn default() -> Self {
        Self {
            detail_threshold: 512,
        }
    }
}

impl Progress for LogProgress {
    fn book_started(&self, book: usize, books: usize, dims: usize) {
        log::info!("Training codebook {}/{} over {} dimensions", book + 1, books, dims);
    }

    fn iteration(&self, level: usize, offset: usize, iteration: usize, changed: usize, domain: usize) {
        log::trace!(
            "level {} @{}: iteration {}, {} of {} cells changed",
            level,
            offset,
            iteration,
            changed,
            domain
        );
    }

    fn node_trained(&self, r: &NodeReport) {
        let level = if r.j >= self.detail_threshold {
            log::Level::Info
        } else {
            log::Level::Debug
        };
        log::log!(
            level,
            "level {} dims {}..{}: K={} J={} iterations={} edges={} collisions={} resampled={}",
            r.level,
            r.offset,
            r.offset + r.dims,
            r.k,
            r.j,
            r.iterations,
            r.edges,
            r.collisions,
            r.empty_resampled
        );
        if r.capped {
            log::warn!(
                "level {} dims {}..{}: stopped at iteration cap {} before converging",
                r.level,
                r.offset,
                r.offset + r.dims,
                r.iterations
            );
        }
        if r.unreached > 0 {
            log::warn!(
                "level {} dims {}..{}: {} grid cells unreachable by propagation, assigned directly",
                r.level,
                r.offset,
                r.offset + r.dims,
                r.unreached
            );
        }
        if r.empty_final > 0 {
            log::warn!(
                "level {} dims {}..{}: {} centroids left without data",
                r.level,
                r.offset,
                r.offset + r.dims,
                r.empty_final
            );
        }
    }

    fn book_finished(&self, book: usize) {
        log::info!("Codebook {} trained", book + 1);
    }

    fn file_processed(&self, file: usize, files: usize, points: usize) {
        log::debug!("File {}/{} done ({} points)", file + 1, files, points);
    }
}
