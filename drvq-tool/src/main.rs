//! drvq Tool - CLI for codebook training and labeling
//!
//! # Commands
//!
//! - `train` - Train a codebook from the descriptor files of a list
//! - `label` - Label the descriptor files of a list with a trained codebook
//! - `info` - Print codebook structure as JSON
//! - `decode` - Reconstruct labeled descriptors from a label file
//!
//! # Examples
//!
//! ## Train on SIFT descriptors
//! ```bash
//! drvq-tool train -l train.txt -d ./sift -o codebook.drvq --books 4 --capacity-id 2
//! ```
//!
//! ## Label with approximate search
//! ```bash
//! drvq-tool label -c codebook.drvq -l images.txt -d ./sift -o labels.bin -m approx
//! ```

mod ops;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use drvq_core::{Descriptor, LabelMethod, Normalization};

#[derive(Parser)]
#[command(name = "drvq-tool")]
#[command(version, about = "CLI for drvq codebook training and labeling")]
#[command(after_help = "Use 'drvq-tool <command> --help' for more information.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a codebook from descriptor files
    Train {
        /// File listing descriptor file stems, one per line
        #[arg(short, long)]
        list: PathBuf,

        /// Directory holding the descriptor files
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Descriptor file extension
        #[arg(short, long, default_value = "bin")]
        ext: String,

        /// Output codebook path
        #[arg(short, long)]
        output: PathBuf,

        /// JSON training configuration; overrides every option below
        #[arg(long)]
        config: Option<PathBuf>,

        /// Descriptor family selecting the capacity presets
        #[arg(long, value_enum, default_value = "sift")]
        descriptor: DescriptorArg,

        /// Number of codebooks (dimension blocks)
        #[arg(short, long, default_value = "4")]
        books: usize,

        /// Capacity preset id
        #[arg(long, default_value = "2")]
        capacity_id: usize,

        /// Termination parameter
        #[arg(long, default_value = "5")]
        theta: f64,

        /// Maximum weight of child edges followed during propagation
        #[arg(short, long, default_value = "0.35")]
        range: f64,

        /// Use the bucket priority queue
        #[arg(long, default_value = "false")]
        bucket: bool,

        /// Average cells per bucket
        #[arg(long, default_value = "20")]
        bucket_size: usize,

        /// Upper bound on refinement iterations per node
        #[arg(long, default_value = "200")]
        max_iters: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Train codebooks concurrently
        #[arg(short = 'p', long, default_value = "false")]
        parallel: bool,

        /// Per-point normalization
        #[arg(short, long, value_enum, default_value = "root")]
        norm: NormArg,

        /// Use at most this many files
        #[arg(long)]
        max_files: Option<usize>,
    },

    /// Label descriptor files with a trained codebook
    Label {
        /// Codebook path
        #[arg(short, long)]
        codebook: PathBuf,

        /// File listing descriptor file stems, one per line
        #[arg(short, long)]
        list: PathBuf,

        /// Directory holding the descriptor files
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,

        /// Descriptor file extension
        #[arg(short, long, default_value = "bin")]
        ext: String,

        /// Output label file
        #[arg(short, long)]
        output: PathBuf,

        /// Labeling method
        #[arg(short, long, value_enum, default_value = "exact")]
        method: MethodArg,

        /// Neighbour weight cutoff for approx labeling
        #[arg(short, long, default_value = "0.45")]
        range: f64,

        /// Skip writing distortion
        #[arg(long, default_value = "false")]
        no_distortion: bool,

        /// Per-point normalization
        #[arg(short, long, value_enum, default_value = "root")]
        norm: NormArg,

        /// Use at most this many files
        #[arg(long)]
        max_files: Option<usize>,
    },

    /// Print codebook structure as JSON
    Info {
        /// Codebook path
        #[arg(short, long)]
        codebook: PathBuf,

        /// Edge weight cutoff for reported mean degrees
        #[arg(short, long, default_value = "0.45")]
        range: f64,
    },

    /// Reconstruct labeled descriptors, one output file per labeled file
    Decode {
        /// Codebook path
        #[arg(short, long)]
        codebook: PathBuf,

        /// Label file
        #[arg(short, long)]
        labels: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Extension of the written descriptor files
        #[arg(short, long, default_value = "bin")]
        ext: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum DescriptorArg {
    Sift,
    Surf,
}

impl From<DescriptorArg> for Descriptor {
    fn from(arg: DescriptorArg) -> Self {
        match arg {
            DescriptorArg::Sift => Descriptor::Sift,
            DescriptorArg::Surf => Descriptor::Surf,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum NormArg {
    None,
    L2,
    Root,
}

impl From<NormArg> for Normalization {
    fn from(arg: NormArg) -> Self {
        match arg {
            NormArg::None => Normalization::None,
            NormArg::L2 => Normalization::L2,
            NormArg::Root => Normalization::Root,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum MethodArg {
    Fast,
    Approx,
    Exact,
}

impl From<MethodArg> for LabelMethod {
    fn from(arg: MethodArg) -> Self {
        match arg {
            MethodArg::Fast => LabelMethod::Fast,
            MethodArg::Approx => LabelMethod::Approx,
            MethodArg::Exact => LabelMethod::Exact,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("drvq_tool=info".parse()?)
                .add_directive("drvq_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            list,
            dir,
            ext,
            output,
            config,
            descriptor,
            books,
            capacity_id,
            theta,
            range,
            bucket,
            bucket_size,
            max_iters,
            seed,
            parallel,
            norm,
            max_files,
        } => {
            let train_config = match config {
                Some(path) => ops::read_train_config(&path)?,
                None => ops::TrainArgs {
                    descriptor: descriptor.into(),
                    books,
                    capacity_id,
                    theta,
                    range,
                    bucket: bucket.then_some(bucket_size),
                    max_iters,
                    seed,
                    parallel,
                }
                .into_config()?,
            };
            ops::train(
                ops::Inputs {
                    list,
                    dir,
                    ext,
                    norm: norm.into(),
                    max_files,
                },
                &train_config,
                &output,
            )?;
        }
        Commands::Label {
            codebook,
            list,
            dir,
            ext,
            output,
            method,
            range,
            no_distortion,
            norm,
            max_files,
        } => {
            let label_config = drvq_core::LabelConfig::new(method.into())
                .with_range(range)
                .with_distortion(!no_distortion);
            ops::label(
                &codebook,
                ops::Inputs {
                    list,
                    dir,
                    ext,
                    norm: norm.into(),
                    max_files,
                },
                &label_config,
                &output,
            )?;
        }
        Commands::Info { codebook, range } => {
            ops::info(&codebook, range)?;
        }
        Commands::Decode {
            codebook,
            labels,
            output,
            ext,
        } => {
            ops::decode(&codebook, &labels, &output, &ext)?;
        }
    }

    Ok(())
}
