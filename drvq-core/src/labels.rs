//! Label files
//!
//! A label file holds, for every descriptor file of a list, the labels of
//! its points, optionally followed by their distortion:
//!
//! ```text
//! labels [[u64]] | distortion [[f64]] (optional)
//! ```

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::Path;

use crate::binary::{read_f64s, read_nested, read_u64s, write_f64s, write_nested, write_u64s};
use crate::codebook::{Codebook, Labeling};
use crate::config::LabelConfig;
use crate::data::{FileList, Normalization};
use crate::error::{Error, Result};
use crate::progress::Progress;

/// Labels of a sequence of descriptor files
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelSet {
    pub labels: Vec<Vec<u64>>,
    pub distortion: Option<Vec<Vec<f64>>>,
}

impl LabelSet {
    pub fn new(with_distortion: bool) -> Self {
        Self {
            labels: Vec::new(),
            distortion: with_distortion.then(Vec::new),
        }
    }

    /// Append the labeling of one file
    pub fn push(&mut self, labeling: Labeling) {
        if let Some(distortion) = &mut self.distortion {
            distortion.push(labeling.distortion.unwrap_or_default());
        }
        self.labels.push(labeling.labels);
    }

    pub fn files(&self) -> usize {
        self.labels.len()
    }

    /// Total labeled points
    pub fn points(&self) -> usize {
        self.labels.iter().map(Vec::len).sum()
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        write_nested(writer, &self.labels, write_u64s)?;
        if let Some(distortion) = &self.distortion {
            write_nested(writer, distortion, write_f64s)?;
        }
        Ok(())
    }

    /// Read a label file; the distortion section is read when present
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let mut cursor = Cursor::new(bytes.as_slice());
        let labels = read_nested(&mut cursor, read_u64s)?;
        if cursor.position() as usize == bytes.len() {
            return Ok(Self {
                labels,
                distortion: None,
            });
        }
        let distortion = read_nested(&mut cursor, read_f64s)?;
        let shapes_match = distortion.len() == labels.len()
            && distortion.iter().zip(&labels).all(|(d, l)| d.len() == l.len());
        if !shapes_match {
            return Err(Error::Corruption(
                "distortion does not match labels".into(),
            ));
        }
        Ok(Self {
            labels,
            distortion: Some(distortion),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::at_path(path, e))?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.flush().map_err(|e| Error::at_path(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| Error::at_path(path, e))?;
        Self::read_from(&mut file)
    }
}

/// Label every file of a list with a trained codebook
pub fn label_files(
    codebook: &Codebook,
    files: &FileList,
    norm: Normalization,
    config: &LabelConfig,
    progress: &dyn Progress,
) -> Result<LabelSet> {
    let mut set = LabelSet::new(config.distortion);
    for index in 0..files.len() {
        let data = files.load_file(index, norm)?;
        let labeling = if data.is_empty() {
            Labeling {
                labels: Vec::new(),
                distortion: config.distortion.then(Vec::new),
            }
        } else {
            codebook.label(&data, config)?
        };
        progress.file_processed(index, files.len(), data.len());
        set.push(labeling);
    }
    log::info!(
        "Labeled {} points in {} files",
        set.points(),
        set.files()
    );
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(with_distortion: bool) -> LabelSet {
        let mut set = LabelSet::new(with_distortion);
        set.push(Labeling {
            labels: vec![3, 1 << 40],
            distortion: Some(vec![0.5, 0.25]),
        });
        set.push(Labeling {
            labels: vec![],
            distortion: Some(vec![]),
        });
        set.push(Labeling {
            labels: vec![7],
            distortion: Some(vec![1.0]),
        });
        set
    }

    #[test]
    fn test_roundtrip_with_distortion() {
        let set = sample(true);
        assert_eq!((set.files(), set.points()), (3, 3));
        let mut buf = Vec::new();
        set.write_to(&mut buf).unwrap();
        assert_eq!(LabelSet::read_from(&mut buf.as_slice()).unwrap(), set);
    }

    #[test]
    fn test_distortion_section_optional() {
        let set = sample(false);
        assert!(set.distortion.is_none());
        let mut buf = Vec::new();
        set.write_to(&mut buf).unwrap();
        let back = LabelSet::read_from(&mut buf.as_slice()).unwrap();
        assert_eq!(back.labels, set.labels);
        assert!(back.distortion.is_none());
    }

    #[test]
    fn test_mismatched_distortion_rejected() {
        let mut buf = Vec::new();
        write_nested(&mut buf, &[vec![1u64, 2]], write_u64s).unwrap();
        write_nested(&mut buf, &[vec![0.5f64]], write_f64s).unwrap();
        assert!(matches!(
            LabelSet::read_from(&mut buf.as_slice()),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.bin");
        let set = sample(true);
        set.save(&path).unwrap();
        assert_eq!(LabelSet::load(&path).unwrap(), set);
        assert!(matches!(
            LabelSet::load(&dir.path().join("missing.bin")),
            Err(Error::IoPath { .. })
        ));
    }
}
