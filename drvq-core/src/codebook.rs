//! Product codebook over dimension blocks
//!
//! The data dimensions are cut into `C` equal contiguous blocks, each
//! quantized by its own tree with `J` top-level centroids. A point's label
//! is the mixed-radix number `Σ l_c · J^c` of its per-block labels.
//!
//! File layout (little-endian):
//!
//! ```text
//! magic u32 "DRVQ" | version u32 | C u64 | J u64 | blocks [[u64]] | C trees
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::ops::Range;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use rand::SeedableRng;
use rand::rngs::StdRng;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::binary::{read_nested, read_u64s, write_nested, write_u64s};
use crate::config::{LabelConfig, LabelMethod, TrainConfig};
use crate::data::DataMatrix;
use crate::error::{Error, Result};
use crate::progress::Progress;
use crate::train::train_tree;
use crate::tree::QuantNode;

/// Magic number for codebook files ("DRVQ" in little-endian)
pub const CODEBOOK_MAGIC: u32 = 0x5156_5244;

/// Current codebook format version
pub const CODEBOOK_VERSION: u32 = 1;

/// Labels of a batch of points
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Labeling {
    pub labels: Vec<u64>,
    /// Squared distance of every point to its reconstruction, summed over
    /// all blocks
    pub distortion: Option<Vec<f64>>,
}

/// A centroid and its squared distance to a query point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub centroid: u32,
    pub distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    books: Vec<QuantNode>,
    capacity: usize,
    blocks: Vec<Range<usize>>,
}

impl Codebook {
    /// Train one tree per dimension block
    ///
    /// Block `c` draws from its own generator seeded with `seed + c`, so
    /// parallel and sequential training give identical codebooks.
    pub fn train(data: &DataMatrix, config: &TrainConfig, progress: &dyn Progress) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::EmptyData);
        }
        config.validate(data.dim())?;
        let count = config.books;
        let width = data.dim() / count;
        let blocks: Vec<Range<usize>> = (0..count).map(|c| c * width..(c + 1) * width).collect();

        let train_book = |book: usize| -> Result<QuantNode> {
            progress.book_started(book, count, width);
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(book as u64));
            let trained = train_tree(data, blocks[book].clone(), config, &mut rng, progress)?;
            progress.book_finished(book);
            Ok(trained.node)
        };

        #[cfg(feature = "parallel")]
        let books: Result<Vec<QuantNode>> = if config.parallel {
            (0..count).into_par_iter().map(train_book).collect()
        } else {
            (0..count).map(train_book).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let books: Result<Vec<QuantNode>> = (0..count).map(train_book).collect();

        Self::from_books(books?)
    }

    /// Assemble a codebook from trees over consecutive blocks
    pub fn from_books(books: Vec<QuantNode>) -> Result<Self> {
        let Some(first) = books.first() else {
            return Err(Error::Config("codebook without trees".into()));
        };
        let capacity = first.k();
        let width = first.dims();
        if let Some(bad) = books.iter().find(|b| b.k() != capacity || b.dims() != width) {
            return Err(Error::Config(format!(
                "tree with {} centroids over {} dimensions, expected {} over {}",
                bad.k(),
                bad.dims(),
                capacity,
                width
            )));
        }
        if (capacity as u128).checked_pow(books.len() as u32).is_none_or(|space| space > 1 << 64) {
            return Err(Error::Config(format!(
                "{} codebooks of {} centroids overflow a 64-bit code",
                books.len(),
                capacity
            )));
        }
        let blocks = (0..books.len()).map(|c| c * width..(c + 1) * width).collect();
        Ok(Self {
            books,
            capacity,
            blocks,
        })
    }

    pub fn books(&self) -> &[QuantNode] {
        &self.books
    }

    pub fn book_count(&self) -> usize {
        self.books.len()
    }

    /// Top-level centroids per block (`J`)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Total dimension
    pub fn dim(&self) -> usize {
        self.blocks.last().map_or(0, |b| b.end)
    }

    pub fn blocks(&self) -> &[Range<usize>] {
        &self.blocks
    }

    /// Number of distinct labels, `J^C`
    pub fn code_space(&self) -> f64 {
        (self.capacity as f64).powi(self.books.len() as i32)
    }

    fn check_dim(&self, data: &DataMatrix) -> Result<()> {
        if data.dim() != self.dim() {
            return Err(Error::DimensionMismatch {
                expected: self.dim(),
                got: data.dim(),
            });
        }
        Ok(())
    }

    /// Apply `f(book, c)` to every block `c`
    fn map_books<T, F>(&self, f: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&QuantNode, usize) -> T + Sync + Send,
    {
        #[cfg(feature = "parallel")]
        {
            self.books
                .par_iter()
                .enumerate()
                .map(|(c, book)| f(book, c))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            self.books
                .iter()
                .enumerate()
                .map(|(c, book)| f(book, c))
                .collect()
        }
    }

    /// Per-block labels by `method`; `range` only matters for `Approx`
    pub fn book_labels(&self, data: &DataMatrix, method: LabelMethod, range: f64) -> Result<Vec<Vec<u32>>> {
        self.check_dim(data)?;
        Ok(self.map_books(|book, c| {
            let offset = self.blocks[c].start;
            match method {
                LabelMethod::Fast => book.fast(data, offset),
                LabelMethod::Approx => book.approx(data, offset, range),
                LabelMethod::Exact => book.exact(data, offset).0,
            }
        }))
    }

    /// Combine per-block labels into mixed-radix labels
    pub fn compose(&self, per_book: &[Vec<u32>]) -> Vec<u64> {
        let points = per_book.first().map_or(0, Vec::len);
        let j = self.capacity as u64;
        (0..points)
            .map(|n| {
                per_book
                    .iter()
                    .rev()
                    .fold(0u64, |label, book| label * j + book[n] as u64)
            })
            .collect()
    }

    /// Per-block labels of a composed label
    pub fn split(&self, mut label: u64) -> Vec<u32> {
        let j = self.capacity as u64;
        self.books
            .iter()
            .map(|_| {
                let l = label % j;
                label /= j;
                l as u32
            })
            .collect()
    }

    pub fn fast(&self, data: &DataMatrix) -> Result<Vec<u64>> {
        Ok(self.compose(&self.book_labels(data, LabelMethod::Fast, 0.0)?))
    }

    pub fn approx(&self, data: &DataMatrix, range: f64) -> Result<Vec<u64>> {
        Ok(self.compose(&self.book_labels(data, LabelMethod::Approx, range)?))
    }

    /// Exact labels with their total squared distance
    pub fn exact(&self, data: &DataMatrix) -> Result<(Vec<u64>, Vec<f64>)> {
        self.check_dim(data)?;
        let results = self.map_books(|book, c| book.exact(data, self.blocks[c].start));
        let mut distortion = vec![0.0; data.len()];
        let mut per_book = Vec::with_capacity(results.len());
        for (labels, dist) in results {
            for (total, d) in distortion.iter_mut().zip(&dist) {
                *total += d;
            }
            per_book.push(labels);
        }
        Ok((self.compose(&per_book), distortion))
    }

    /// Label points as configured
    pub fn label(&self, data: &DataMatrix, config: &LabelConfig) -> Result<Labeling> {
        if config.method == LabelMethod::Exact {
            let (labels, distortion) = self.exact(data)?;
            return Ok(Labeling {
                labels,
                distortion: config.distortion.then_some(distortion),
            });
        }
        let per_book = self.book_labels(data, config.method, config.range)?;
        let distortion = config.distortion.then(|| {
            let parts = self.map_books(|book, c| {
                book.distortion(data, self.blocks[c].start, &per_book[c])
            });
            let mut total = vec![0.0; data.len()];
            for part in parts {
                for (t, d) in total.iter_mut().zip(&part) {
                    *t += d;
                }
            }
            total
        });
        Ok(Labeling {
            labels: self.compose(&per_book),
            distortion,
        })
    }

    /// Reconstructed vectors of composed labels, `dim × labels.len()`
    pub fn reconstruct(&self, labels: &[u64]) -> DataMatrix {
        let mut out = DataMatrix::zeros(self.dim(), labels.len());
        let split: Vec<Vec<u32>> = labels.iter().map(|&l| self.split(l)).collect();
        for (c, (book, block)) in self.books.iter().zip(&self.blocks).enumerate() {
            let ids: Vec<u32> = split.iter().map(|s| s[c]).collect();
            book.reconstruct_into(&ids, &mut out, block.start);
        }
        out
    }

    /// All top-level centroids of every block, each `block width × J`
    pub fn flat(&self) -> Vec<DataMatrix> {
        self.books.iter().map(QuantNode::flat).collect()
    }

    /// Up to `k` nearest top-level centroids per block and point, nearest
    /// first, keeping only those closer than `cutoff`
    pub fn knn(&self, data: &DataMatrix, k: usize, cutoff: f64) -> Result<Vec<Vec<Vec<Neighbor>>>> {
        self.check_dim(data)?;
        Ok(self.map_books(|book, c| {
            let dist = book.distances(data, self.blocks[c].start, 0..data.len());
            (0..dist.rows())
                .map(|n| {
                    let mut row: Vec<Neighbor> = dist
                        .row(n)
                        .iter()
                        .enumerate()
                        .filter(|&(_, &d)| d < cutoff)
                        .map(|(c, &d)| Neighbor {
                            centroid: c as u32,
                            distance: d,
                        })
                        .collect();
                    row.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.centroid.cmp(&b.centroid)));
                    row.truncate(k);
                    row
                })
                .collect()
        }))
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<LittleEndian>(CODEBOOK_MAGIC)?;
        writer.write_u32::<LittleEndian>(CODEBOOK_VERSION)?;
        writer.write_u64::<LittleEndian>(self.books.len() as u64)?;
        writer.write_u64::<LittleEndian>(self.capacity as u64)?;
        let blocks: Vec<Vec<u64>> = self
            .blocks
            .iter()
            .map(|b| b.clone().map(|d| d as u64).collect())
            .collect();
        write_nested(writer, &blocks, write_u64s)?;
        for book in &self.books {
            book.write_to(writer)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != CODEBOOK_MAGIC {
            return Err(Error::Corruption(format!("bad codebook magic {:#010x}", magic)));
        }
        let version = reader.read_u32::<LittleEndian>()?;
        if version != CODEBOOK_VERSION {
            return Err(Error::Corruption(format!(
                "unsupported codebook version {}",
                version
            )));
        }
        let count = reader.read_u64::<LittleEndian>()? as usize;
        let capacity = reader.read_u64::<LittleEndian>()? as usize;
        let blocks = read_nested(reader, read_u64s)?;
        if blocks.len() != count {
            return Err(Error::Corruption(format!(
                "{} codebooks declared, {} blocks stored",
                count,
                blocks.len()
            )));
        }
        let mut books = Vec::with_capacity(count);
        for _ in 0..count {
            books.push(QuantNode::read_from(reader)?);
        }

        let codebook = Self::from_books(books).map_err(|e| Error::Corruption(e.to_string()))?;
        if codebook.capacity != capacity {
            return Err(Error::Corruption(format!(
                "header declares {} centroids per block, trees have {}",
                capacity, codebook.capacity
            )));
        }
        for (stored, block) in blocks.iter().zip(&codebook.blocks) {
            let expected: Vec<u64> = block.clone().map(|d| d as u64).collect();
            if *stored != expected {
                return Err(Error::Corruption(format!(
                    "block dimensions do not match {:?}",
                    block
                )));
            }
        }
        Ok(codebook)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::read_from(&mut std::io::Cursor::new(data))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::at_path(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush().map_err(|e| Error::at_path(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::at_path(path, e))?;
        Self::read_from(&mut BufReader::new(file))
    }

    /// Load a codebook, logging and returning `None` on failure
    pub fn open(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(codebook) => {
                log::info!(
                    "Loaded codebook {}: {} blocks of {} centroids over {} dimensions",
                    path.display(),
                    codebook.book_count(),
                    codebook.capacity(),
                    codebook.dim()
                );
                Some(codebook)
            }
            Err(e) => {
                log::warn!("Cannot load codebook {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use crate::progress::tests::Recorder;
    use rand::Rng;

    fn random_data(dim: usize, n: usize, seed: u64) -> DataMatrix {
        let mut rng = StdRng::seed_from_u64(seed);
        let points: Vec<Vec<f32>> = (0..n)
            .map(|_| (0..dim).map(|_| rng.random::<f32>()).collect())
            .collect();
        DataMatrix::from_points(&points).unwrap()
    }

    fn config() -> TrainConfig {
        TrainConfig::new(2, vec![4, 8, 16])
    }

    fn trained(data: &DataMatrix) -> Codebook {
        Codebook::train(data, &config(), &NoProgress).unwrap()
    }

    #[test]
    fn test_train_layout() {
        let data = random_data(8, 300, 1);
        let codebook = trained(&data);
        assert_eq!(codebook.book_count(), 2);
        assert_eq!(codebook.capacity(), 16);
        assert_eq!(codebook.dim(), 8);
        assert_eq!(codebook.blocks(), &[0..4, 4..8]);
        assert_eq!(codebook.code_space(), 256.0);

        let labels = codebook.fast(&data).unwrap();
        assert!(labels.iter().all(|&l| l < 256));
    }

    #[test]
    fn test_compose_and_split() {
        let data = random_data(8, 50, 2);
        let codebook = trained(&data);
        let per_book = codebook.book_labels(&data, LabelMethod::Fast, 0.0).unwrap();
        let labels = codebook.compose(&per_book);
        for (n, &label) in labels.iter().enumerate() {
            assert_eq!(label, per_book[0][n] as u64 + 16 * per_book[1][n] as u64);
            assert_eq!(codebook.split(label), vec![per_book[0][n], per_book[1][n]]);
        }
    }

    #[test]
    fn test_distortion_ordering() {
        let data = random_data(8, 200, 3);
        let codebook = trained(&data);
        let fast = codebook.label(&data, &LabelConfig::new(LabelMethod::Fast)).unwrap();
        let approx = codebook
            .label(&data, &LabelConfig::new(LabelMethod::Approx).with_range(0.45))
            .unwrap();
        let exact = codebook.label(&data, &LabelConfig::default()).unwrap();
        let (fd, ad, ed) = (
            fast.distortion.unwrap(),
            approx.distortion.unwrap(),
            exact.distortion.unwrap(),
        );
        for n in 0..data.len() {
            assert!(ed[n] <= ad[n] + 1e-9);
            assert!(ad[n] <= fd[n] + 1e-9);
        }
    }

    #[test]
    fn test_exact_distortion_is_reconstruction_error() {
        let data = random_data(8, 40, 4);
        let codebook = trained(&data);
        let (labels, distortion) = codebook.exact(&data).unwrap();
        let recon = codebook.reconstruct(&labels);
        for n in 0..data.len() {
            let err: f64 = data
                .point(n)
                .iter()
                .zip(recon.point(n))
                .map(|(&a, b)| (a as f64 - b as f64).powi(2))
                .sum();
            assert!((err - distortion[n]).abs() < 1e-4);
        }
    }

    #[test]
    fn test_label_without_distortion() {
        let data = random_data(8, 20, 5);
        let codebook = trained(&data);
        let labeling = codebook
            .label(&data, &LabelConfig::default().with_distortion(false))
            .unwrap();
        assert!(labeling.distortion.is_none());
        assert_eq!(labeling.labels, codebook.exact(&data).unwrap().0);
    }

    #[test]
    fn test_knn() {
        let data = random_data(8, 10, 6);
        let codebook = trained(&data);
        let knn = codebook.knn(&data, 3, f64::INFINITY).unwrap();
        let (exact, _) = codebook.exact(&data).unwrap();
        for n in 0..data.len() {
            let split = codebook.split(exact[n]);
            for c in 0..2 {
                let row = &knn[c][n];
                assert_eq!(row.len(), 3);
                assert!(row.windows(2).all(|w| w[0].distance <= w[1].distance));
                assert_eq!(row[0].centroid, split[c]);
            }
        }
        let none = codebook.knn(&data, 3, 0.0).unwrap();
        assert!(none.iter().flatten().all(Vec::is_empty));
    }

    #[test]
    fn test_flat() {
        let data = random_data(8, 100, 7);
        let codebook = trained(&data);
        let flat = codebook.flat();
        assert_eq!(flat.len(), 2);
        assert_eq!((flat[1].dim(), flat[1].len()), (4, 16));
    }

    #[test]
    fn test_dimension_mismatch() {
        let codebook = trained(&random_data(8, 100, 8));
        let other = random_data(4, 10, 9);
        assert!(matches!(
            codebook.fast(&other),
            Err(Error::DimensionMismatch { expected: 8, got: 4 })
        ));
    }

    #[test]
    fn test_save_and_load() {
        let data = random_data(8, 150, 10);
        let codebook = trained(&data);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.drvq");
        codebook.save(&path).unwrap();

        let loaded = Codebook::load(&path).unwrap();
        assert_eq!(loaded, codebook);
        assert_eq!(loaded.fast(&data).unwrap(), codebook.fast(&data).unwrap());
        assert!(Codebook::open(&path).is_some());
        assert!(Codebook::open(&dir.path().join("missing.drvq")).is_none());
    }

    #[test]
    fn test_corrupt_file() {
        let codebook = trained(&random_data(8, 60, 11));
        let bytes = codebook.to_bytes().unwrap();
        assert_eq!(&bytes[..4], b"DRVQ");

        let mut bad = bytes.clone();
        bad[0] = b'X';
        assert!(matches!(Codebook::from_bytes(&bad), Err(Error::Corruption(_))));

        let mut bad = bytes.clone();
        bad[4] = 9;
        assert!(matches!(Codebook::from_bytes(&bad), Err(Error::Corruption(_))));

        assert!(Codebook::from_bytes(&bytes[..bytes.len() / 2]).is_err());
        assert!(matches!(
            Codebook::load(Path::new("/nonexistent/book.drvq")),
            Err(Error::IoPath { .. })
        ));
    }

    #[test]
    fn test_huge_block_length_without_payload() {
        let mut header = Vec::new();
        header.extend_from_slice(&CODEBOOK_MAGIC.to_le_bytes());
        header.extend_from_slice(&CODEBOOK_VERSION.to_le_bytes());
        for v in [1u64, 4, 1, 1 << 36] {
            header.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(Codebook::from_bytes(&header), Err(Error::Io(_))));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.drvq");
        std::fs::write(&path, &header).unwrap();
        assert!(Codebook::load(&path).is_err());
        assert!(Codebook::open(&path).is_none());
    }

    #[test]
    fn test_training_reports_books() {
        let data = random_data(8, 100, 12);
        let recorder = Recorder::default();
        Codebook::train(&data, &config(), &recorder).unwrap();
        let mut books = recorder.books.lock().unwrap().clone();
        books.sort_unstable();
        assert_eq!(books, vec![0, 1]);
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_parallel_matches_sequential() {
        let data = random_data(8, 200, 13);
        let sequential = Codebook::train(&data, &config(), &NoProgress).unwrap();
        let parallel = Codebook::train(&data, &config().with_parallel(true), &NoProgress).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_invalid_training() {
        let data = random_data(6, 10, 14);
        assert!(matches!(
            Codebook::train(&data, &config(), &NoProgress),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            Codebook::train(&DataMatrix::zeros(8, 0), &config(), &NoProgress),
            Err(Error::EmptyData)
        ));
        assert!(Codebook::from_books(Vec::new()).is_err());
    }
}
