//! Dimension-major data matrices, normalization and descriptor files
//!
//! Descriptor files hold an array of points: a `u64` point count, then for
//! every point a `u64` length followed by that many `f32` values. A file list
//! names one descriptor file per line.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::binary::{read_f32s, read_len, write_f32s, write_len};
use crate::error::{Error, Result};
use crate::progress::Progress;

/// `dim` columns of `len` values each; column `d` holds dimension `d` of
/// every point
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataMatrix {
    columns: Vec<Vec<f32>>,
    len: usize,
}

impl DataMatrix {
    pub fn zeros(dim: usize, len: usize) -> Self {
        Self {
            columns: vec![vec![0.0; len]; dim],
            len,
        }
    }

    pub fn from_columns(columns: Vec<Vec<f32>>) -> Result<Self> {
        let len = columns.first().map_or(0, Vec::len);
        if let Some(bad) = columns.iter().find(|c| c.len() != len) {
            return Err(Error::DimensionMismatch {
                expected: len,
                got: bad.len(),
            });
        }
        Ok(Self { columns, len })
    }

    /// Transpose point-major vectors into columns
    pub fn from_points(points: &[Vec<f32>]) -> Result<Self> {
        let dim = points.first().map_or(0, Vec::len);
        let mut matrix = Self::zeros(dim, points.len());
        for (n, p) in points.iter().enumerate() {
            if p.len() != dim {
                return Err(Error::DimensionMismatch {
                    expected: dim,
                    got: p.len(),
                });
            }
            for (d, &v) in p.iter().enumerate() {
                matrix.columns[d][n] = v;
            }
        }
        Ok(matrix)
    }

    /// Number of dimensions
    pub fn dim(&self) -> usize {
        self.columns.len()
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0 || self.columns.is_empty()
    }

    #[inline]
    pub fn column(&self, d: usize) -> &[f32] {
        &self.columns[d]
    }

    #[inline]
    pub fn column_mut(&mut self, d: usize) -> &mut [f32] {
        &mut self.columns[d]
    }

    #[inline]
    pub fn get(&self, d: usize, n: usize) -> f32 {
        self.columns[d][n]
    }

    #[inline]
    pub fn set(&mut self, d: usize, n: usize, value: f32) {
        self.columns[d][n] = value;
    }

    pub fn point(&self, n: usize) -> Vec<f32> {
        self.columns.iter().map(|c| c[n]).collect()
    }

    /// Append the points of another matrix with the same dimension
    pub fn append(&mut self, other: &DataMatrix) -> Result<()> {
        if other.is_empty() {
            return Ok(());
        }
        if self.columns.is_empty() && self.len == 0 {
            *self = other.clone();
            return Ok(());
        }
        if other.dim() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                got: other.dim(),
            });
        }
        for (mine, theirs) in self.columns.iter_mut().zip(&other.columns) {
            mine.extend_from_slice(theirs);
        }
        self.len += other.len;
        Ok(())
    }

    /// Normalize every point in place; zero points stay zero
    pub fn normalize(&mut self, norm: Normalization) {
        match norm {
            Normalization::None => {}
            Normalization::L2 => {
                let mut norms = vec![0.0f64; self.len];
                for column in &self.columns {
                    for (acc, &v) in norms.iter_mut().zip(column) {
                        *acc += v as f64 * v as f64;
                    }
                }
                for acc in &mut norms {
                    *acc = acc.sqrt();
                }
                self.scale(&norms, |v| v);
            }
            Normalization::Root => {
                let mut norms = vec![0.0f64; self.len];
                for column in &self.columns {
                    for (acc, &v) in norms.iter_mut().zip(column) {
                        *acc += (v as f64).abs();
                    }
                }
                self.scale(&norms, |v| v.abs().sqrt().copysign(v));
            }
        }
    }

    fn scale(&mut self, norms: &[f64], f: impl Fn(f64) -> f64) {
        for column in &mut self.columns {
            for (v, &norm) in column.iter_mut().zip(norms) {
                if norm != 0.0 {
                    *v = f(*v as f64 / norm) as f32;
                }
            }
        }
    }
}

/// Per-point normalization applied before training or labeling
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Normalization {
    None,
    /// Divide by the L2 norm
    L2,
    /// Divide by the L1 norm, then take the signed square root
    #[default]
    Root,
}

/// Read a descriptor file into a matrix
pub fn read_descriptors<R: Read>(reader: &mut R) -> Result<DataMatrix> {
    let count = read_len(reader)?;
    let mut points = Vec::with_capacity(count.min(1 << 20));
    for _ in 0..count {
        points.push(read_f32s(reader)?);
    }
    DataMatrix::from_points(&points)
}

/// Write a matrix as a descriptor file
pub fn write_descriptors<W: Write>(writer: &mut W, data: &DataMatrix) -> Result<()> {
    write_len(writer, data.len())?;
    for n in 0..data.len() {
        write_f32s(writer, &data.point(n))?;
    }
    Ok(())
}

pub fn load_descriptors(path: &Path) -> Result<DataMatrix> {
    let file = File::open(path).map_err(|e| Error::at_path(path, e))?;
    read_descriptors(&mut BufReader::new(file))
}

pub fn save_descriptors(path: &Path, data: &DataMatrix) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::at_path(path, e))?;
    let mut writer = BufWriter::new(file);
    write_descriptors(&mut writer, data)?;
    writer.flush().map_err(|e| Error::at_path(path, e))
}

/// Descriptor files named by a list file
///
/// Each non-empty line of the list is a file stem, resolved as
/// `dir/<stem>.<extension>` (or `dir/<stem>` when the extension is empty).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileList {
    pub dir: PathBuf,
    pub extension: String,
    pub names: Vec<String>,
}

impl FileList {
    pub fn load(list: &Path, dir: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self> {
        let file = File::open(list).map_err(|e| Error::at_path(list, e))?;
        let mut names = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| Error::at_path(list, e))?;
            let name = line.trim();
            if !name.is_empty() {
                names.push(name.to_string());
            }
        }
        Ok(Self {
            dir: dir.into(),
            extension: extension.into(),
            names,
        })
    }

    /// Keep at most `max` files
    pub fn truncate(mut self, max: Option<usize>) -> Self {
        if let Some(max) = max {
            self.names.truncate(max);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn path(&self, index: usize) -> PathBuf {
        let name = &self.names[index];
        if self.extension.is_empty() {
            self.dir.join(name)
        } else {
            self.dir.join(format!("{}.{}", name, self.extension))
        }
    }

    /// Load a single file of the list, normalized
    pub fn load_file(&self, index: usize, norm: Normalization) -> Result<DataMatrix> {
        let mut data = load_descriptors(&self.path(index))?;
        data.normalize(norm);
        Ok(data)
    }

    /// Load and concatenate every file of the list, normalized
    pub fn load_all(&self, norm: Normalization, progress: &dyn Progress) -> Result<DataMatrix> {
        let mut data = DataMatrix::default();
        for index in 0..self.len() {
            let part = self.load_file(index, norm)?;
            progress.file_processed(index, self.len(), part.len());
            data.append(&part)?;
        }
        Ok(data)
    }
}
