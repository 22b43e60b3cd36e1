// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the two subcommands: `train` and `eval`
// and all their configurable flags.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for bad values
//   - type conversion (string → usize, f64, AttentionMode)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand};
use crate::application::eval_use_case::EvalConfig;
use crate::application::train_use_case::TrainConfig;
use crate::ml::attention::AttentionMode;

/// The two top-level subcommands available to the user
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a Vision Transformer on CIFAR-10
    Train(TrainArgs),

    /// Score a saved checkpoint on the CIFAR-10 test split
    Eval(EvalArgs),
}

/// All arguments for the `train` command.
/// Each field becomes a --flag on the command line.
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON file holding a full TrainConfig; replaces the flags below
    /// (except --resume and --save, which are always honoured)
    #[arg(long)]
    pub config: Option<String>,

    /// Directory holding the extracted cifar-10-batches-bin
    #[arg(long, default_value = "data")]
    pub data_dir: String,

    /// Directory for checkpoints, the saved config and metrics.csv
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    #[arg(long, default_value_t = 512)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 200)]
    pub epochs: usize,

    /// Peak learning rate for Adam
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// Floor of the cosine schedule
    #[arg(long, default_value_t = 1e-6)]
    pub min_lr: f64,

    /// Linear warmup epochs before the cosine decay
    #[arg(long, default_value_t = 0)]
    pub warmup_epochs: usize,

    #[arg(long, default_value_t = 0.9)]
    pub beta_1: f64,

    #[arg(long, default_value_t = 0.99)]
    pub beta_2: f64,

    #[arg(long, default_value_t = 5e-5)]
    pub weight_decay: f64,

    /// Side of the square model input; images are resized to it
    #[arg(long, default_value_t = 32)]
    pub image_size: usize,

    /// Side of the square patches; must divide image_size
    #[arg(long, default_value_t = 4)]
    pub patch_size: usize,

    /// Token embedding width
    #[arg(long, default_value_t = 512)]
    pub dim: usize,

    /// Number of transformer blocks
    #[arg(long, default_value_t = 8)]
    pub depth: usize,

    #[arg(long, default_value_t = 8)]
    pub heads: usize,

    #[arg(long, default_value_t = 64)]
    pub dim_head: usize,

    /// Hidden width of each block's feed-forward network
    #[arg(long, default_value_t = 512)]
    pub mlp_dim: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Dropout applied after adding position embeddings
    #[arg(long, default_value_t = 0.1)]
    pub emb_dropout: f64,

    /// Classify from the mean of all tokens instead of the CLS token
    #[arg(long)]
    pub mean_pool: bool,

    /// Zero padding before the random crop
    #[arg(long, default_value_t = 4)]
    pub crop_padding: usize,

    /// Horizontal flip probability
    #[arg(long, default_value_t = 0.5)]
    pub flip_prob: f64,

    /// DataLoader worker threads
    #[arg(long, default_value_t = 2)]
    pub num_workers: usize,

    #[arg(long, default_value_t = 4525)]
    pub seed: u64,

    /// Log the running loss every N batches (0 disables)
    #[arg(long, default_value_t = 20)]
    pub log_interval: usize,

    /// Continue from the checkpoint in --checkpoint-dir
    #[arg(long)]
    pub resume: bool,

    /// Write a checkpoint after every epoch
    #[arg(long)]
    pub save: bool,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// This is the boundary between Layer 1 and Layer 2 —
/// the application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir:       a.data_dir,
            checkpoint_dir: a.checkpoint_dir,
            batch_size:     a.batch_size,
            epochs:         a.epochs,
            lr:             a.lr,
            min_lr:         a.min_lr,
            warmup_epochs:  a.warmup_epochs,
            beta_1:         a.beta_1,
            beta_2:         a.beta_2,
            weight_decay:   a.weight_decay,
            image_size:     a.image_size,
            patch_size:     a.patch_size,
            dim:            a.dim,
            depth:          a.depth,
            heads:          a.heads,
            dim_head:       a.dim_head,
            mlp_dim:        a.mlp_dim,
            dropout:        a.dropout,
            emb_dropout:    a.emb_dropout,
            mean_pool:      a.mean_pool,
            crop_padding:   a.crop_padding,
            flip_prob:      a.flip_prob,
            num_workers:    a.num_workers,
            seed:           a.seed,
            log_interval:   a.log_interval,
            resume:         a.resume,
            save:           a.save,
        }
    }
}

/// All arguments for the `eval` command
#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Directory where `train --save` wrote its checkpoint
    #[arg(long, default_value = "checkpoints")]
    pub checkpoint_dir: String,

    /// Dataset directory; defaults to the one used for training
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Defaults to the training batch size
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// `standard` or `test_weight_matrix`; both when omitted
    #[arg(long)]
    pub mode: Option<AttentionMode>,
}

impl From<EvalArgs> for EvalConfig {
    fn from(a: EvalArgs) -> Self {
        EvalConfig {
            checkpoint_dir: a.checkpoint_dir,
            data_dir:       a.data_dir,
            batch_size:     a.batch_size,
            modes:          a.mode.into_iter().collect(),
        }
    }
}
