//! Wavefront assignment of grid cells to parent centroids
//!
//! Cells of the `J×J` grid are the nodes of an implicit graph: cell
//! `(c0, c1)` touches `(n0, c1)` for every child0 neighbour `n0` of `c0`, and
//! `(c0, n1)` for every child1 neighbour `n1` of `c1`, as long as the child
//! edge weighs less than `range`. Every centroid starts at its own cell and
//! claims cells in order of increasing distance, Dijkstra style; the
//! distance of a cell to centroid `k` is `dist0[k][c0] + dist1[k][c1]`.
//!
//! Where two settled regions meet, the owning centroids are adjacent. When
//! edges are recorded the queue is drained so that every contact is found;
//! otherwise propagation stops as soon as all target cells are settled.

use rand::Rng;
use rustc_hash::FxHashSet;

use crate::config::QueueMode;
use crate::structures::{CentroidGraph, DistanceMatrix, Handle, PriorityQueue, WeightedSampler, new_queue};

/// Seed draws from the sampler before scanning for a free cell
const MAX_RESEEDS: usize = 64;

/// Edges weighing this many times `range` or more are not recorded
const EDGE_ADMISSION: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    Alive,
    Queued(Handle),
    Settled,
}

/// Per-cell propagation state
struct GridState<'g> {
    owner: &'g mut [u32],
    distance: Vec<f64>,
    visit: Vec<Visit>,
}

/// Counters from one propagation run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropagationStats {
    /// Seeds resampled because their cell was taken
    pub collisions: usize,
    /// Required cells assigned by direct arg-min after the queue drained
    pub unreached: usize,
    /// Cells popped from the queue
    pub pops: usize,
    /// Largest queue length observed
    pub peak_queue: usize,
}

#[derive(Debug)]
pub struct PropagationOutcome {
    /// Centroid adjacency, when edges were recorded
    pub graph: Option<CentroidGraph>,
    pub stats: PropagationStats,
}

/// Inputs of one propagation run
///
/// `dist0` and `dist1` are `K×J`: distances from each parent centroid to
/// every centroid of child0 and child1.
pub struct Propagation<'a> {
    pub dist0: &'a DistanceMatrix,
    pub dist1: &'a DistanceMatrix,
    pub graph0: &'a CentroidGraph,
    pub graph1: &'a CentroidGraph,
    /// Cells that must be settled, usually the populated ones
    pub target: &'a [bool],
    pub range: f64,
    pub queue: QueueMode,
}

impl Propagation<'_> {
    fn k(&self) -> usize {
        self.dist0.rows()
    }

    fn j(&self) -> usize {
        self.dist0.cols()
    }

    #[inline]
    fn distance(&self, centroid: u32, c0: usize, c1: usize) -> f64 {
        self.dist0[(centroid as usize, c0)] + self.dist1[(centroid as usize, c1)]
    }

    /// Upper bound on any cell distance
    fn bound(&self) -> f64 {
        (0..self.k())
            .map(|k| self.dist0.row_max(k) + self.dist1.row_max(k))
            .fold(0.0, f64::max)
            + f64::from(f32::EPSILON)
    }

    /// Nearest centroid of a cell by direct comparison
    fn nearest(&self, c0: usize, c1: usize) -> (u32, f64) {
        let mut best = (0, f64::INFINITY);
        for k in 0..self.k() as u32 {
            let d = self.distance(k, c0, c1);
            if d < best.1 {
                best = (k, d);
            }
        }
        best
    }

    /// Assign grid cells to centroids seeded at `(code0[k], code1[k])`
    ///
    /// Seeds landing on a cell already taken by an earlier seed are moved to
    /// a fresh cell drawn from `sampler`, and their codes updated. `grid`
    /// keeps its previous owner for cells that are neither settled nor
    /// required.
    pub fn run<R: Rng + ?Sized>(
        &self,
        grid: &mut [u32],
        code0: &mut [u32],
        code1: &mut [u32],
        sampler: &mut WeightedSampler,
        rng: &mut R,
        record_edges: bool,
    ) -> PropagationOutcome {
        let (k, j) = (self.k(), self.j());
        let cells = j * j;
        debug_assert_eq!(grid.len(), cells);
        debug_assert_eq!(self.target.len(), cells);
        debug_assert!(k <= cells);

        let mut stats = PropagationStats::default();
        let mut state = GridState {
            owner: grid,
            distance: vec![0.0; cells],
            visit: vec![Visit::Alive; cells],
        };
        let mut queue = new_queue(self.queue, cells, self.bound());

        let mut edges = record_edges.then(|| Edges::new(k, self));

        for centroid in 0..k {
            let mut cell = code0[centroid] as usize + j * code1[centroid] as usize;
            if state.visit[cell] != Visit::Alive {
                stats.collisions += 1;
                cell = reseed(&state.visit, cell, sampler, rng);
                code0[centroid] = (cell % j) as u32;
                code1[centroid] = (cell / j) as u32;
                log::trace!("seed {} collided, moved to cell {}", centroid, cell);
            }
            sampler.mark(cell);
            state.push(queue.as_mut(), cell, 0.0, centroid as u32);
        }

        let total = self.target.iter().filter(|&&t| t).count();
        let mut visited = 0;
        while !queue.is_empty() {
            stats.peak_queue = stats.peak_queue.max(queue.len());
            let p = queue.pop_min() as usize;
            stats.pops += 1;
            state.visit[p] = Visit::Settled;
            let src = state.owner[p];
            let (c0, c1) = (p % j, p / j);

            for (n0, w) in self.graph0.adjacent(c0 as u32) {
                if w >= self.range {
                    continue;
                }
                let n0 = n0 as usize;
                let d = self.distance(src, n0, c1);
                state.reach(queue.as_mut(), n0 + j * c1, d, src, edges.as_mut());
            }
            for (n1, w) in self.graph1.adjacent(c1 as u32) {
                if w >= self.range {
                    continue;
                }
                let n1 = n1 as usize;
                let d = self.distance(src, c0, n1);
                state.reach(queue.as_mut(), c0 + j * n1, d, src, edges.as_mut());
            }

            if !record_edges {
                if self.target[p] {
                    visited += 1;
                }
                if visited >= total {
                    break;
                }
            }
        }

        // Cells cut off from every seed by the range cutoff
        for p in 0..cells {
            let required = record_edges || self.target[p];
            if required && state.visit[p] == Visit::Alive {
                let (owner, d) = self.nearest(p % j, p / j);
                state.owner[p] = owner;
                state.distance[p] = d;
                stats.unreached += 1;
            }
        }

        PropagationOutcome {
            graph: edges.map(|e| e.graph),
            stats,
        }
    }
}

/// A free cell for a colliding seed
fn reseed<R: Rng + ?Sized>(
    visit: &[Visit],
    from: usize,
    sampler: &mut WeightedSampler,
    rng: &mut R,
) -> usize {
    for _ in 0..MAX_RESEEDS {
        let cell = sampler.draw(rng);
        if visit[cell] == Visit::Alive {
            return cell;
        }
    }
    // Sampler exhausted: take the next free cell in grid order
    let cells = visit.len();
    (1..=cells)
        .map(|i| (from + i) % cells)
        .find(|&cell| visit[cell] == Visit::Alive)
        .unwrap_or(from)
}

impl GridState<'_> {
    fn push(&mut self, queue: &mut dyn PriorityQueue, cell: usize, distance: f64, owner: u32) {
        let handle = queue.push(cell as u32, distance);
        self.visit[cell] = Visit::Queued(handle);
        self.distance[cell] = distance;
        self.owner[cell] = owner;
    }

    /// Offer `cell` to centroid `src` at distance `d`
    fn reach(
        &mut self,
        queue: &mut dyn PriorityQueue,
        cell: usize,
        d: f64,
        src: u32,
        edges: Option<&mut Edges>,
    ) {
        match self.visit[cell] {
            Visit::Alive => self.push(queue, cell, d, src),
            Visit::Queued(handle) => {
                if d < self.distance[cell] {
                    queue.decrease_priority(handle, d);
                    self.distance[cell] = d;
                    self.owner[cell] = src;
                }
            }
            Visit::Settled => {
                if let Some(edges) = edges {
                    edges.join(src, self.owner[cell], d + self.distance[cell]);
                }
            }
        }
    }
}

/// Adjacency discovered at region contacts
struct Edges {
    graph: CentroidGraph,
    adjacent: FxHashSet<u64>,
    /// Mean distance from each centroid to the grid, used to scale weights
    far: Vec<f64>,
    max_weight: f64,
}

impl Edges {
    fn new(k: usize, prop: &Propagation<'_>) -> Self {
        Self {
            graph: CentroidGraph::with_self_loops(k),
            adjacent: FxHashSet::default(),
            far: (0..k)
                .map(|c| prop.dist0.row_mean(c) + prop.dist1.row_mean(c))
                .collect(),
            max_weight: EDGE_ADMISSION * prop.range,
        }
    }

    fn join(&mut self, from: u32, to: u32, contact: f64) {
        if from == to {
            return;
        }
        let key = ((from.min(to) as u64) << 32) | from.max(to) as u64;
        if self.adjacent.contains(&key) {
            return;
        }
        let w = contact / self.far[from as usize].max(self.far[to as usize]);
        if !(w < self.max_weight) {
            return;
        }
        self.adjacent.insert(key);
        self.graph.add_edge(from, to, w);
    }
}
