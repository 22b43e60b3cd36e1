// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full training run:
//
//   Step 1: Load CIFAR-10 train + test splits  (Layer 4 - data)
//   Step 2: Wrap them as Burn datasets         (Layer 4 - data)
//   Step 3: Open the metrics CSV               (Layer 6 - infra)
//   Step 4: Run the training loop              (Layer 5 - ml)
//
// The config is written only together with a checkpoint, so a run
// without --save never touches an existing checkpoint directory's
// train_config.json.
//
// Reference: Burn Book §5 (Training)

use anyhow::{Context, Result};
use burn::optim::{decay::WeightDecayConfig, AdamConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{augment::Augmentation, dataset::ImageDataset, loader::CifarBinaryLoader};
use crate::domain::traits::{ImageSource, Split};
use crate::infra::{checkpoint::CheckpointManager, metrics::MetricsLogger};
use crate::ml::model::ViTConfig;
use crate::ml::trainer::{run_training, TrainSummary};

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run. Serialisable so it can be
// saved beside the checkpoint and reloaded by `eval`, or supplied
// up front with `train --config run.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub data_dir:       String,
    pub checkpoint_dir: String,
    pub batch_size:     usize,
    pub epochs:         usize,
    pub lr:             f64,
    pub min_lr:         f64,
    pub warmup_epochs:  usize,
    pub beta_1:         f64,
    pub beta_2:         f64,
    pub weight_decay:   f64,
    /// Square model input side; images are resized when it differs from 32
    pub image_size:     usize,
    pub patch_size:     usize,
    pub dim:            usize,
    pub depth:          usize,
    pub heads:          usize,
    pub dim_head:       usize,
    pub mlp_dim:        usize,
    pub dropout:        f64,
    pub emb_dropout:    f64,
    pub mean_pool:      bool,
    pub crop_padding:   usize,
    pub flip_prob:      f64,
    pub num_workers:    usize,
    pub seed:           u64,
    /// Log running loss every N batches (0 disables)
    pub log_interval:   usize,
    /// Continue from the checkpoint in `checkpoint_dir`
    pub resume:         bool,
    /// Write a checkpoint after every epoch
    pub save:           bool,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir:       "data".to_string(),
            checkpoint_dir: "checkpoints".to_string(),
            batch_size:     512,
            epochs:         200,
            lr:             1e-3,
            min_lr:         1e-6,
            warmup_epochs:  0,
            beta_1:         0.9,
            beta_2:         0.99,
            weight_decay:   5e-5,
            image_size:     32,
            patch_size:     4,
            dim:            512,
            depth:          8,
            heads:          8,
            dim_head:       64,
            mlp_dim:        512,
            dropout:        0.1,
            emb_dropout:    0.1,
            mean_pool:      false,
            crop_padding:   4,
            flip_prob:      0.5,
            num_workers:    2,
            seed:           4525,
            log_interval:   20,
            resume:         false,
            save:           false,
        }
    }
}

impl TrainConfig {
    /// Read a full config from a JSON file; missing keys take defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file '{}'", path.display()))
    }

    /// Model architecture implied by this run.
    pub fn model_config(&self, num_classes: usize) -> ViTConfig {
        ViTConfig::new(
            [self.image_size, self.image_size],
            [self.patch_size, self.patch_size],
            num_classes,
            self.dim,
            self.depth,
            self.heads,
            self.mlp_dim,
        )
        .with_dim_head(self.dim_head)
        .with_dropout(self.dropout)
        .with_emb_dropout(self.emb_dropout)
        .with_mean_pool(self.mean_pool)
    }

    /// Adam with decoupled-from-schedule betas and L2 weight decay.
    pub fn optimizer_config(&self) -> AdamConfig {
        AdamConfig::new()
            .with_beta_1(self.beta_1 as f32)
            .with_beta_2(self.beta_2 as f32)
            .with_epsilon(1e-8)
            .with_weight_decay(Some(WeightDecayConfig::new(self.weight_decay as f32)))
    }

    pub fn augmentation(&self) -> Augmentation {
        Augmentation { crop_padding: self.crop_padding, flip_prob: self.flip_prob }
    }

    /// Names of the model-shape settings that differ from `other`.
    /// Empty when a record saved under one config loads into the other.
    pub fn architecture_diff(&self, other: &TrainConfig) -> Vec<String> {
        let fields = [
            ("image_size", self.image_size, other.image_size),
            ("patch_size", self.patch_size, other.patch_size),
            ("dim",        self.dim,        other.dim),
            ("depth",      self.depth,      other.depth),
            ("heads",      self.heads,      other.heads),
            ("dim_head",   self.dim_head,   other.dim_head),
            ("mlp_dim",    self.mlp_dim,    other.mlp_dim),
        ];
        let mut changed: Vec<String> = fields
            .iter()
            .filter(|(_, a, b)| a != b)
            .map(|(name, a, b)| format!("{name}: {b} -> {a}"))
            .collect();
        if self.mean_pool != other.mean_pool {
            changed.push(format!("mean_pool: {} -> {}", other.mean_pool, self.mean_pool));
        }
        changed
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainSummary> {
        let cfg = &self.config;

        // Fail on a bad architecture before spending time on I/O
        let loader = CifarBinaryLoader::new(&cfg.data_dir);
        cfg.model_config(loader.num_classes()).validate()?;

        // ── Step 1 + 2: Load splits into datasets ────────────────────────────
        tracing::info!("Loading CIFAR-10 from '{}'", cfg.data_dir);
        let train_dataset = ImageDataset::new(loader.load_split(Split::Train)?);
        let test_dataset  = ImageDataset::new(loader.load_split(Split::Test)?);
        tracing::info!(
            "Dataset: {} train, {} test images",
            train_dataset.image_count(),
            test_dataset.image_count()
        );
        tracing::debug!(
            "Train images per class: {:?}",
            train_dataset.class_counts(loader.num_classes())
        );

        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir);

        // ── Step 3: Metrics CSV ───────────────────────────────────────────────
        let metrics = MetricsLogger::new(&cfg.checkpoint_dir)?;
        tracing::info!("Logging metrics to '{}'", metrics.csv_path().display());

        // ── Step 4: Training loop (Layer 5) ───────────────────────────────────
        run_training(
            cfg,
            train_dataset,
            test_dataset,
            loader.num_classes(),
            &ckpt_manager,
            Some(&metrics),
        )
    }
}
