//! Dense row-major distance matrix

use std::ops::{Index, IndexMut};

/// `rows × cols` squared distances, typically points × centroids
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
}

impl DistanceMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            values: vec![0.0; rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut values = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                values.push(f(r, c));
            }
        }
        Self { rows, cols, values }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, r: usize) -> &[f64] {
        &self.values[r * self.cols..(r + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, r: usize) -> &mut [f64] {
        &mut self.values[r * self.cols..(r + 1) * self.cols]
    }

    /// Column index of the smallest entry in a row (first on ties)
    pub fn row_argmin(&self, r: usize) -> (usize, f64) {
        argmin(self.row(r))
    }

    pub fn row_max(&self, r: usize) -> f64 {
        self.row(r).iter().copied().fold(0.0, f64::max)
    }

    pub fn row_mean(&self, r: usize) -> f64 {
        if self.cols == 0 {
            return 0.0;
        }
        self.row(r).iter().sum::<f64>() / self.cols as f64
    }

    /// New matrix keeping the given columns, in order
    pub fn select_columns(&self, columns: &[u32]) -> DistanceMatrix {
        DistanceMatrix::from_fn(self.rows, columns.len(), |r, c| {
            self[(r, columns[c] as usize)]
        })
    }

    /// Element-wise sum with a matrix of the same shape
    pub fn add_assign(&mut self, other: &DistanceMatrix) {
        debug_assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += b;
        }
    }
}

impl Index<(usize, usize)> for DistanceMatrix {
    type Output = f64;

    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &f64 {
        &self.values[r * self.cols + c]
    }
}

impl IndexMut<(usize, usize)> for DistanceMatrix {
    #[inline]
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f64 {
        &mut self.values[r * self.cols + c]
    }
}

/// Index and value of the smallest element (first on ties)
pub fn argmin(values: &[f64]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, &v) in values.iter().enumerate() {
        if v < best.1 {
            best = (i, v);
        }
    }
    best
}
