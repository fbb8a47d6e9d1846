use std::fs;

use super::{corner_clusters, uniform};
use crate::codebook::Codebook;
use crate::config::{LabelConfig, LabelMethod, TrainConfig};
use crate::data::{FileList, Normalization, save_descriptors};
use crate::labels::{LabelSet, label_files};
use crate::progress::{LogProgress, NoProgress};

#[test]
fn test_fast_matches_exact_on_separated_clusters() {
    // Two-bin leaves split 0 from 1; every populated 2x2 cell gets its own centroid
    let data = corner_clusters(4, 400, 0.05, 1);
    let config = TrainConfig::new(2, vec![2, 4]);
    let codebook = Codebook::train(&data, &config, &NoProgress).unwrap();

    let fast = codebook.fast(&data).unwrap();
    let (exact, _) = codebook.exact(&data).unwrap();
    assert_eq!(fast, exact);

    let recon = codebook.reconstruct(&exact);
    for n in 0..data.len() {
        for d in 0..4 {
            assert!((recon.get(d, n) - data.get(d, n)).abs() < 0.1);
        }
    }
}

#[test]
fn test_fast_close_to_exact_on_uniform_data() {
    let data = uniform(8, 2000, 2);
    let config = TrainConfig::new(2, vec![4, 8, 16]);
    let codebook = Codebook::train(&data, &config, &NoProgress).unwrap();

    let mean = |v: &[f64]| v.iter().sum::<f64>() / v.len() as f64;
    let fast = codebook
        .label(&data, &LabelConfig::new(LabelMethod::Fast))
        .unwrap();
    let exact = codebook.label(&data, &LabelConfig::default()).unwrap();
    let (fast, exact) = (fast.distortion.unwrap(), exact.distortion.unwrap());
    assert!(mean(&exact) <= mean(&fast));
    // Variance of uniform [0, 1) is 1/12 per dimension
    assert!(mean(&exact) < 8.0 / 12.0);
}

#[test]
fn test_files_to_labels() {
    let dir = tempfile::tempdir().unwrap();
    let data = uniform(8, 300, 3);
    let sizes = [120, 0, 180];

    let mut names = Vec::new();
    let mut start = 0;
    for (i, &size) in sizes.iter().enumerate() {
        let points: Vec<Vec<f32>> = (start..start + size).map(|n| data.point(n)).collect();
        let part = if points.is_empty() {
            crate::data::DataMatrix::zeros(8, 0)
        } else {
            crate::data::DataMatrix::from_points(&points).unwrap()
        };
        let name = format!("part{}", i);
        save_descriptors(&dir.path().join(format!("{}.bin", name)), &part).unwrap();
        names.push(name);
        start += size;
    }
    let list = dir.path().join("list.txt");
    fs::write(&list, names.join("\n")).unwrap();

    let files = FileList::load(&list, dir.path(), "bin").unwrap();
    assert_eq!(files.len(), 3);
    let training = files.load_all(Normalization::Root, &LogProgress::default()).unwrap();
    assert_eq!(training.len(), 300);

    let config = TrainConfig::new(2, vec![4, 8, 16]);
    let codebook = Codebook::train(&training, &config, &LogProgress::default()).unwrap();
    let book_path = dir.path().join("codebook.drvq");
    codebook.save(&book_path).unwrap();
    let codebook = Codebook::load(&book_path).unwrap();

    let label_config = LabelConfig::new(LabelMethod::Approx);
    let set = label_files(&codebook, &files, Normalization::Root, &label_config, &NoProgress).unwrap();
    assert_eq!(set.files(), 3);
    assert_eq!(set.labels.iter().map(Vec::len).collect::<Vec<_>>(), sizes.to_vec());
    assert_eq!(set.labels[0], codebook.approx(&training, 0.45).unwrap()[..120].to_vec());
    let distortion = set.distortion.as_ref().unwrap();
    assert!(distortion[2].iter().all(|&d| d >= 0.0));

    let labels_path = dir.path().join("labels.bin");
    set.save(&labels_path).unwrap();
    assert_eq!(LabelSet::load(&labels_path).unwrap(), set);
}
