//! Internal node training: k-means over the populated cells of the child
//! label grid
//!
//! Data never reaches this level directly. A point is represented by the
//! cell `(l0, l1)` of its two child labels, weighted by how many points share
//! that cell, and a cell stands for the concatenation of the two child
//! centroid vectors. Assignment of cells to parent centroids goes through
//! [`Propagation`] instead of a scan over all centroids.

use rand::Rng;

use super::propagate::{Propagation, PropagationStats};
use super::{Trained, converged};
use crate::config::TrainConfig;
use crate::data::DataMatrix;
use crate::error::{Error, Result};
use crate::progress::{NodeReport, Progress};
use crate::structures::{CentroidGraph, DistanceMatrix, WeightedSampler};
use crate::tree::{InternalNode, QuantNode};

/// Shared state of one node's refinement
struct GridTrainer<'a> {
    child0: &'a Trained,
    child1: &'a Trained,
    j: usize,
    /// Points per grid cell
    pop: Vec<u32>,
    /// Populated cells
    domain: Vec<usize>,
    target: Vec<bool>,
    config: &'a TrainConfig,
}

/// Parent centroid positions on the grid
struct Codes {
    code0: Vec<u32>,
    code1: Vec<u32>,
}

impl Codes {
    fn set(&mut self, centroid: usize, cell: usize, j: usize) {
        self.code0[centroid] = (cell % j) as u32;
        self.code1[centroid] = (cell / j) as u32;
    }
}

impl GridTrainer<'_> {
    fn d0(&self) -> usize {
        self.child0.centroids.dim()
    }

    fn dims(&self) -> usize {
        self.d0() + self.child1.centroids.dim()
    }

    /// Value of dimension `d` of the vector a cell stands for
    #[inline]
    fn cell_value(&self, d: usize, cell: usize) -> f32 {
        let d0 = self.d0();
        if d < d0 {
            self.child0.centroids.get(d, cell % self.j)
        } else {
            self.child1.centroids.get(d - d0, cell / self.j)
        }
    }

    /// Move every populated centroid to the weighted mean of its cells and
    /// return the empty ones
    fn refit(&self, grid: &[u32], centroids: &mut DataMatrix) -> Vec<usize> {
        let k = centroids.len();
        let mut pop = vec![0u64; k];
        for &p in &self.domain {
            pop[grid[p] as usize] += self.pop[p] as u64;
        }
        let mut acc = vec![0.0f64; k];
        for d in 0..self.dims() {
            acc.iter_mut().for_each(|a| *a = 0.0);
            for &p in &self.domain {
                acc[grid[p] as usize] += self.pop[p] as f64 * self.cell_value(d, p) as f64;
            }
            let column = centroids.column_mut(d);
            for c in 0..k {
                if pop[c] > 0 {
                    column[c] = (acc[c] / pop[c] as f64) as f32;
                }
            }
        }
        (0..k).filter(|&c| pop[c] == 0).collect()
    }

    /// Reseed empty centroids at freshly sampled cells
    fn resample<R: Rng + ?Sized>(
        &self,
        empty: &[usize],
        codes: &mut Codes,
        centroids: &mut DataMatrix,
        sampler: &mut WeightedSampler,
        rng: &mut R,
    ) {
        for &c in empty {
            let cell = sampler.draw(rng);
            codes.set(c, cell, self.j);
            for d in 0..self.dims() {
                centroids.set(d, c, self.cell_value(d, cell));
            }
        }
    }

    fn propagate<R: Rng + ?Sized>(
        &self,
        dist0: &DistanceMatrix,
        dist1: &DistanceMatrix,
        grid: &mut [u32],
        codes: &mut Codes,
        sampler: &mut WeightedSampler,
        rng: &mut R,
        record_edges: bool,
    ) -> (Option<CentroidGraph>, PropagationStats) {
        let propagation = Propagation {
            dist0,
            dist1,
            graph0: self.child0.node.graph(),
            graph1: self.child1.node.graph(),
            target: &self.target,
            range: self.config.range,
            queue: self.config.queue,
        };
        let outcome = propagation.run(
            grid,
            &mut codes.code0,
            &mut codes.code1,
            sampler,
            rng,
            record_edges,
        );
        (outcome.graph, outcome.stats)
    }

    /// Assign cells with centroids placed exactly on their grid cells
    fn assign_quantized<R: Rng + ?Sized>(
        &self,
        grid: &mut [u32],
        codes: &mut Codes,
        sampler: &mut WeightedSampler,
        rng: &mut R,
        record_edges: bool,
    ) -> (Option<CentroidGraph>, PropagationStats) {
        let dist0 = self.child0.node.code_distances(&codes.code0);
        let dist1 = self.child1.node.code_distances(&codes.code1);
        self.propagate(&dist0, &dist1, grid, codes, sampler, rng, record_edges)
    }

    /// Assign cells with free centroid vectors, seeding each centroid at
    /// the cell of its nearest child centroids
    fn assign_vectors<R: Rng + ?Sized>(
        &self,
        centroids: &DataMatrix,
        grid: &mut [u32],
        codes: &mut Codes,
        sampler: &mut WeightedSampler,
        rng: &mut R,
    ) -> PropagationStats {
        let k = centroids.len();
        let dist0 = self.child0.node.distances(centroids, 0, 0..k);
        let dist1 = self.child1.node.distances(centroids, self.d0(), 0..k);
        for c in 0..k {
            codes.code0[c] = dist0.row_argmin(c).0 as u32;
            codes.code1[c] = dist1.row_argmin(c).0 as u32;
            sampler.mark(codes.code0[c] as usize + self.j * codes.code1[c] as usize);
        }
        self.propagate(&dist0, &dist1, grid, codes, sampler, rng, false).1
    }

    /// Park a lone centroid at the cell of the child centroids nearest to it
    fn place_single(&self, centroids: &DataMatrix, codes: &mut Codes) {
        let dist0 = self.child0.node.distances(centroids, 0, 0..1);
        let dist1 = self.child1.node.distances(centroids, self.d0(), 0..1);
        codes.code0[0] = dist0.row_argmin(0).0 as u32;
        codes.code1[0] = dist1.row_argmin(0).0 as u32;
    }

    /// Seed, iterate to convergence and make the final quantized assignment
    #[allow(clippy::too_many_arguments)]
    fn refine<R: Rng + ?Sized>(
        &self,
        grid: &mut [u32],
        codes: &mut Codes,
        centroids: &mut DataMatrix,
        sampler: &mut WeightedSampler,
        rng: &mut R,
        report: &mut NodeReport,
        progress: &dyn Progress,
    ) -> CentroidGraph {
        let k = centroids.len();
        for (c, cell) in sampler.draw_many(k, rng).into_iter().enumerate() {
            codes.set(c, cell, self.j);
        }
        let (_, stats) = self.assign_quantized(grid, codes, sampler, rng, false);
        accumulate(report, &stats);

        let domain_size = self.domain.len();
        for iteration in 0.. {
            let previous = grid.to_vec();
            let empty = self.refit(grid, centroids);
            report.empty_resampled += empty.len();
            self.resample(&empty, codes, centroids, sampler, rng);

            let stats = self.assign_vectors(centroids, grid, codes, sampler, rng);
            accumulate(report, &stats);

            let changed = self
                .domain
                .iter()
                .filter(|&&p| grid[p] != previous[p])
                .count();
            report.iterations = iteration + 1;
            progress.iteration(report.level, report.offset, iteration, changed, domain_size);

            if converged(changed, domain_size, self.config.theta, iteration) {
                break;
            }
            if report.iterations >= self.config.max_iters {
                report.capped = true;
                break;
            }
        }

        let empty = self.refit(grid, centroids);
        report.empty_resampled += empty.len();
        self.resample(&empty, codes, centroids, sampler, rng);
        let (graph, stats) = self.assign_quantized(grid, codes, sampler, rng, true);
        accumulate(report, &stats);
        graph.unwrap_or_else(|| CentroidGraph::with_self_loops(k))
    }
}

fn accumulate(report: &mut NodeReport, stats: &PropagationStats) {
    report.collisions += stats.collisions;
    report.unreached += stats.unreached;
}

/// Train a `k`-centroid node over two trained children
///
/// Children are consumed: their training labels and centroid vectors are
/// released once the node is built.
pub(crate) fn train_node<R: Rng + ?Sized>(
    child0: Trained,
    child1: Trained,
    k: usize,
    offset: usize,
    config: &TrainConfig,
    rng: &mut R,
    progress: &dyn Progress,
) -> Result<Trained> {
    let j = child0.node.k();
    if child1.node.k() != j {
        return Err(Error::Config(format!(
            "children with {} and {} centroids",
            j,
            child1.node.k()
        )));
    }
    let cells = j * j;
    if k == 0 || k > cells {
        return Err(Error::Config(format!(
            "cannot place {} centroids on a {}x{} grid",
            k, j, j
        )));
    }

    let cell_of: Vec<u32> = child0
        .labels
        .iter()
        .zip(&child1.labels)
        .map(|(&l0, &l1)| l0 + j as u32 * l1)
        .collect();
    let mut pop = vec![0u32; cells];
    for &c in &cell_of {
        pop[c as usize] += 1;
    }
    let domain: Vec<usize> = (0..cells).filter(|&p| pop[p] > 0).collect();
    let target = pop.iter().map(|&p| p > 0).collect();
    let mut sampler = WeightedSampler::from_counts(&pop);

    let trainer = GridTrainer {
        child0: &child0,
        child1: &child1,
        j,
        pop,
        domain,
        target,
        config,
    };
    let dims = trainer.dims();
    let level = dims.ilog2() as usize;
    let mut report = NodeReport {
        level,
        offset,
        dims,
        k,
        j,
        ..Default::default()
    };

    let mut codes = Codes {
        code0: vec![0; k],
        code1: vec![0; k],
    };
    let mut centroids = DataMatrix::zeros(dims, k);
    let mut grid = vec![0u32; cells];
    let graph = if k == 1 {
        trainer.refit(&grid, &mut centroids);
        trainer.place_single(&centroids, &mut codes);
        CentroidGraph::with_self_loops(1)
    } else {
        trainer.refine(&mut grid, &mut codes, &mut centroids, &mut sampler, rng, &mut report, progress)
    };
    report.empty_final = trainer.refit(&grid, &mut centroids).len();
    report.edges = graph.edge_count();
    progress.node_trained(&report);

    let labels = cell_of.iter().map(|&c| grid[c as usize]).collect();
    let d0 = trainer.d0();
    drop(trainer);

    let node = InternalNode {
        j,
        dims0: 0..d0,
        dims1: d0..dims,
        code0: codes.code0,
        code1: codes.code1,
        grid,
        graph,
        child0: Box::new(child0.node),
        child1: Box::new(child1.node),
    };
    Ok(Trained {
        node: QuantNode::Internal(node),
        labels,
        centroids,
    })
}
