//! Configuration hyperparameters.
use clap::{Args, Parser};
use proptest_derive::Arbitrary;
use static_assertions::const_assert;
use std::path::PathBuf;
use strum_macros::{Display, EnumString};

/// Number of spatial coordinates per position.
pub const COORDS: usize = 2;

/// Width of the predictor input, one position.
pub const INPUT_SIZE: usize = COORDS;

/// Width of the predictor output, one position.
pub const OUTPUT_SIZE: usize = COORDS;

/// Number of stacked recurrent layers.
pub const LAYERS: usize = 1;

/// A sequence is kept only when it holds more pedestrians than this.
pub const MIN_PEDS: usize = 1;

/// Prediction length which opens a new sweep in the results file.
pub const SWEEP_START: usize = 2;

const_assert!(COORDS == 2);
const_assert!(INPUT_SIZE == OUTPUT_SIZE);
const_assert!(LAYERS != 0);
const_assert!(MIN_PEDS != 0);

/// Which recurrent cell drives the predictor.
#[derive(Arbitrary, Clone, Copy, Debug, Display, EnumString, Eq, PartialEq)]
#[strum(serialize_all = "lowercase")]
pub enum CellKind {
    /// Gated recurrent unit, hidden state only.
    Gru,

    /// Long short-term memory, hidden and cell state.
    Lstm,
}

/// Network architecture.
#[derive(Args, Clone, Debug)]
pub struct ModelCfg {
    /// Recurrent cell type.
    #[clap(long, default_value = "gru")]
    pub cell: CellKind,

    /// Size of the recurrent hidden state.
    #[clap(long, default_value = "128")]
    pub rnn_size: i64,

    /// Embedding dimension for the spatial coordinates.
    #[clap(long, default_value = "64")]
    pub embedding_size: i64,

    /// Dropout probability after the input embedding.
    #[clap(long, default_value = "0.5")]
    pub dropout: f64,

    /// Neighborhood size for the social grid (accepted, unused).
    #[clap(long, default_value = "32")]
    pub neighborhood_size: i64,

    /// Grid size of the social grid (accepted, unused).
    #[clap(long, default_value = "4")]
    pub grid_size: i64,

    /// Maximum number of pedestrians (accepted, unused).
    #[clap(long = "max-num-peds", default_value = "27")]
    pub max_num_peds: i64,
}

/// Trajectory dataset options.
#[derive(Args, Clone, Debug)]
pub struct DataCfg {
    /// Dataset name, a directory under the dataset root.
    #[clap(long, default_value = "eth")]
    pub dataset_name: String,

    /// Directory holding one directory per dataset.
    #[clap(long, default_value = "datasets")]
    pub data_root: PathBuf,

    /// Field delimiter of the dataset files.
    #[clap(long, default_value = "\t")]
    pub delim: char,

    /// Number of observed frames.
    #[clap(long, default_value = "8")]
    pub obs_len: usize,

    /// Number of predicted frames.
    #[clap(long, default_value = "12")]
    pub pred_len: usize,

    /// Frame stride between consecutive sequences.
    #[clap(long, default_value = "1")]
    pub skip: usize,

    /// Number of sequences per batch.
    #[clap(long, default_value = "5")]
    pub batch_size: usize,
}

impl DataCfg {
    /// Total frames in one sequence.
    pub fn seq_len(&self) -> usize {
        self.obs_len + self.pred_len
    }

    /// Directory holding the given split of the dataset.
    pub fn split_dir(&self, split: &str) -> PathBuf {
        self.data_root.join(&self.dataset_name).join(split)
    }
}

/// Optimization options.
#[derive(Args, Clone, Debug)]
pub struct TrainCfg {
    /// Number of epochs.
    #[clap(long, default_value = "20")]
    pub num_epochs: usize,

    /// Learning rate.
    #[clap(long, default_value = "0.003")]
    pub learning_rate: f64,

    /// Learning rate multiplier applied every `freq-optimizer` epochs.
    #[clap(long, default_value = "0.95")]
    pub decay_rate: f64,

    /// Epochs between learning rate decays, never decays when absent.
    #[clap(long)]
    pub freq_optimizer: Option<usize>,

    /// Clamp every gradient value into [-grad-clip, grad-clip].
    #[clap(long)]
    pub grad_clip: Option<f64>,

    /// L2 regularization parameter.
    #[clap(long, default_value = "0")]
    pub lambda_param: f64,

    /// Random number generator seed.
    #[clap(long, default_value = "0")]
    pub seed: u64,
}

/// Where the run artifacts land.
#[derive(Args, Clone, Debug)]
pub struct OutputCfg {
    /// Directory for model checkpoints.
    #[clap(long, default_value = "saved_models")]
    pub models_dir: PathBuf,

    /// Directory for rendered charts.
    #[clap(long, default_value = "saved_figs")]
    pub figs_dir: PathBuf,

    /// Directory for text reports.
    #[clap(long, default_value = "txtfiles")]
    pub txt_dir: PathBuf,
}

/// Recurrent pedestrian trajectory predictor.
#[derive(Clone, Debug, Parser)]
#[clap(name = "pedtraj", version)]
pub struct Config {
    /// Network architecture.
    #[clap(flatten)]
    pub model: ModelCfg,

    /// Trajectory dataset options.
    #[clap(flatten)]
    pub data: DataCfg,

    /// Optimization options.
    #[clap(flatten)]
    pub train: TrainCfg,

    /// Artifact locations.
    #[clap(flatten)]
    pub output: OutputCfg,

    /// Use GPU when available.
    #[clap(long)]
    pub use_cuda: bool,

    /// Log filter, overridden by `RUST_LOG`.
    #[clap(long, default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Rejects settings no run can make sense of.
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |what: &str| Err(crate::Error::Config(what.to_owned()));
        if self.data.obs_len == 0 {
            return invalid("obs-len must be positive");
        }
        if self.data.pred_len == 0 {
            return invalid("pred-len must be positive");
        }
        if self.data.skip == 0 {
            return invalid("skip must be positive");
        }
        if self.data.batch_size == 0 {
            return invalid("batch-size must be positive");
        }
        if self.train.num_epochs == 0 {
            return invalid("num-epochs must be positive");
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return invalid("dropout must lie in [0, 1)");
        }
        if self.model.rnn_size <= 0 || self.model.embedding_size <= 0 {
            return invalid("layer sizes must be positive");
        }
        if !self.data.delim.is_ascii() {
            return invalid("delim must be a single ascii character");
        }
        if self.train.freq_optimizer == Some(0) {
            return invalid("freq-optimizer must be positive");
        }
        Ok(())
    }

    /// Identifies the run in artifact file names.
    pub fn run_tag(&self) -> String {
        format!(
            "lr_{}_epochs_{}_predlen_{}_obs{}",
            self.train.learning_rate, self.train.num_epochs, self.data.pred_len, self.data.obs_len
        )
    }
}
