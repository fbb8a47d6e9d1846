//! Codebook operations: train, label, info, decode

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use drvq_core::{
    Codebook, DataMatrix, Descriptor, FileList, LabelConfig, LabelSet, LogProgress, Normalization,
    QuantNode, QueueMode, TrainConfig, label_files, save_descriptors,
};

/// Descriptor files to read
pub struct Inputs {
    pub list: PathBuf,
    pub dir: PathBuf,
    pub ext: String,
    pub norm: Normalization,
    pub max_files: Option<usize>,
}

impl Inputs {
    fn files(&self) -> Result<FileList> {
        let files = FileList::load(&self.list, &self.dir, self.ext.as_str())
            .with_context(|| format!("Failed to read file list {:?}", self.list))?
            .truncate(self.max_files);
        info!("{} files listed in {:?}", files.len(), self.list);
        Ok(files)
    }
}

/// Training options from the command line
pub struct TrainArgs {
    pub descriptor: Descriptor,
    pub books: usize,
    pub capacity_id: usize,
    pub theta: f64,
    pub range: f64,
    pub bucket: Option<usize>,
    pub max_iters: usize,
    pub seed: u64,
    pub parallel: bool,
}

impl TrainArgs {
    pub fn into_config(self) -> Result<TrainConfig> {
        let queue = match self.bucket {
            Some(bucket_size) => QueueMode::Bucket { bucket_size },
            None => QueueMode::Heap,
        };
        Ok(TrainConfig::preset(self.descriptor, self.books, self.capacity_id)?
            .with_theta(self.theta)
            .with_range(self.range)
            .with_queue(queue)
            .with_max_iters(self.max_iters)
            .with_seed(self.seed)
            .with_parallel(self.parallel))
    }
}

pub fn read_train_config(path: &Path) -> Result<TrainConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_json::from_str(&content).context("Failed to parse training config JSON")
}

pub fn train(inputs: Inputs, config: &TrainConfig, output: &Path) -> Result<()> {
    let files = inputs.files()?;
    let progress = LogProgress::default();
    let data = files.load_all(inputs.norm, &progress)?;
    info!("Loaded {} points of dimension {}", data.len(), data.dim());
    info!("Training config: {}", serde_json::to_string(config)?);

    let codebook = Codebook::train(&data, config, &progress).context("Training failed")?;
    codebook
        .save(output)
        .with_context(|| format!("Failed to write codebook {:?}", output))?;
    info!(
        "Saved codebook to {:?}: {} blocks, {} centroids each, {:.3e} codes",
        output,
        codebook.book_count(),
        codebook.capacity(),
        codebook.code_space()
    );
    Ok(())
}

pub fn label(codebook: &Path, inputs: Inputs, config: &LabelConfig, output: &Path) -> Result<()> {
    let codebook = Codebook::load(codebook)
        .with_context(|| format!("Failed to load codebook {:?}", codebook))?;
    let files = inputs.files()?;
    let set = label_files(&codebook, &files, inputs.norm, config, &LogProgress::default())?;
    set.save(output)
        .with_context(|| format!("Failed to write labels {:?}", output))?;
    if let Some(distortion) = &set.distortion {
        let total: f64 = distortion.iter().flatten().sum();
        info!(
            "Mean distortion {:.6}",
            total / set.points().max(1) as f64
        );
    }
    info!("Saved labels of {} files to {:?}", set.files(), output);
    Ok(())
}

#[derive(Serialize)]
struct CodebookInfo {
    books: usize,
    capacity: usize,
    dim: usize,
    code_space: f64,
    trees: Vec<Vec<LevelInfo>>,
}

/// One tree level, nodes aggregated
#[derive(Serialize)]
struct LevelInfo {
    dims: usize,
    nodes: usize,
    centroids: usize,
    edges: usize,
    mean_degree: f64,
}

fn collect_levels(node: &QuantNode, range: f64, levels: &mut Vec<LevelInfo>) {
    let level = node.depth();
    if levels.len() <= level {
        levels.resize_with(level + 1, || LevelInfo {
            dims: 0,
            nodes: 0,
            centroids: 0,
            edges: 0,
            mean_degree: 0.0,
        });
    }
    let graph = node.graph();
    let entry = &mut levels[level];
    entry.dims = node.dims();
    entry.nodes += 1;
    entry.centroids = node.k();
    entry.edges += graph.edge_count();
    entry.mean_degree += graph.mean_degree(range);
    if let QuantNode::Internal(internal) = node {
        let (child0, child1) = internal.children();
        collect_levels(child0, range, levels);
        collect_levels(child1, range, levels);
    }
}

/// Per-level summary of one tree, leaves first
fn tree_levels(book: &QuantNode, range: f64) -> Vec<LevelInfo> {
    let mut levels = Vec::new();
    collect_levels(book, range, &mut levels);
    for level in &mut levels {
        level.mean_degree /= level.nodes as f64;
    }
    levels
}

pub fn info(path: &Path, range: f64) -> Result<()> {
    let codebook =
        Codebook::load(path).with_context(|| format!("Failed to load codebook {:?}", path))?;
    let trees = codebook
        .books()
        .iter()
        .map(|book| tree_levels(book, range))
        .collect();
    let summary = CodebookInfo {
        books: codebook.book_count(),
        capacity: codebook.capacity(),
        dim: codebook.dim(),
        code_space: codebook.code_space(),
        trees,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

pub fn decode(codebook: &Path, labels: &Path, output: &Path, ext: &str) -> Result<()> {
    let codebook = Codebook::load(codebook)
        .with_context(|| format!("Failed to load codebook {:?}", codebook))?;
    let set = LabelSet::load(labels).with_context(|| format!("Failed to read labels {:?}", labels))?;
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {:?}", output))?;

    for (index, file_labels) in set.labels.iter().enumerate() {
        let decoded: DataMatrix = codebook.reconstruct(file_labels);
        let path = output.join(format!("{}.{}", index, ext));
        save_descriptors(&path, &decoded)
            .with_context(|| format!("Failed to write {:?}", path))?;
    }
    info!(
        "Decoded {} points from {} files into {:?}",
        set.points(),
        set.files(),
        output
    );
    Ok(())
}
