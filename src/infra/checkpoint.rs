// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores everything needed to resume training:
//
//   checkpoints/
//     model.mpk.gz          ← model record (CompactRecorder)
//     optimizer.mpk.gz      ← Adam moment estimates (CompactRecorder)
//     training_state.json   ← last finished epoch + LR scheduler state
//     train_config.json     ← hyperparameters, so `eval` can rebuild
//                             the exact architecture before loading
//
// CompactRecorder serialises records to MessagePack + gzip. Loading
// fails if the stored record does not match the model architecture.
//
// Reference: Burn Book §5 (Records and Checkpointing)
//            Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    optim::Optimizer,
    prelude::*,
    record::{CompactRecorder, Recorder},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::application::train_use_case::TrainConfig;
use crate::ml::lr_scheduler::CosineAnnealing;
use crate::ml::model::VisionTransformer;

const MODEL_FILE:     &str = "model";
const OPTIMIZER_FILE: &str = "optimizer";
const STATE_FILE:     &str = "training_state.json";
const CONFIG_FILE:    &str = "train_config.json";

/// Progress stored next to the weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingState {
    /// Last fully completed epoch (0-based)
    pub epoch:         usize,
    pub scheduler:     CosineAnnealing,
    /// Best standard-mode test accuracy seen so far
    #[serde(default)]
    pub best_test_acc: f64,
}

/// Manages saving and loading of checkpoints in one directory.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create checkpoint dir '{}'", self.dir.display()))
    }

    /// True when a resumable checkpoint is present.
    pub fn has_checkpoint(&self) -> bool {
        self.dir.join(STATE_FILE).is_file()
    }

    /// Save model, optimizer, the run's config and progress for a finished epoch.
    pub fn save<B, O>(
        &self,
        model: &VisionTransformer<B>,
        optim: &O,
        state: &TrainingState,
        cfg:   &TrainConfig,
    ) -> Result<()>
    where
        B: AutodiffBackend,
        O: Optimizer<VisionTransformer<B>, B>,
    {
        self.ensure_dir()?;

        let model_path = self.dir.join(MODEL_FILE);
        CompactRecorder::new()
            .record(model.clone().into_record(), model_path.clone())
            .with_context(|| format!("Failed to save model to '{}'", model_path.display()))?;

        let optim_path = self.dir.join(OPTIMIZER_FILE);
        CompactRecorder::new()
            .record(optim.to_record(), optim_path.clone())
            .with_context(|| format!("Failed to save optimizer to '{}'", optim_path.display()))?;

        // Always describes the architecture of the model record above
        self.save_config(cfg)?;

        // Written last: its presence marks the checkpoint as complete
        let state_path = self.dir.join(STATE_FILE);
        fs::write(&state_path, serde_json::to_string_pretty(state)?)
            .with_context(|| format!("Failed to write '{}'", state_path.display()))?;

        tracing::debug!("Saved checkpoint: epoch {}", state.epoch + 1);
        Ok(())
    }

    /// Load saved weights into a freshly built model of the same architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  VisionTransformer<B>,
        device: &B::Device,
    ) -> Result<VisionTransformer<B>> {
        let path = self.dir.join(MODEL_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load model '{}'. Have you trained the model first?",
                    path.display())
            })?;
        Ok(model.load_record(record))
    }

    /// Restore optimizer state saved by `save`.
    pub fn load_optimizer<B, O>(&self, optim: O, device: &B::Device) -> Result<O>
    where
        B: AutodiffBackend,
        O: Optimizer<VisionTransformer<B>, B>,
    {
        let path = self.dir.join(OPTIMIZER_FILE);
        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load optimizer state '{}'", path.display()))?;
        Ok(optim.load_record(record))
    }

    pub fn load_state(&self) -> Result<TrainingState> {
        let path = self.dir.join(STATE_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!("Cannot find '{}'. Have you run 'train --save' first?", path.display())
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Corrupt training state '{}'", path.display()))
    }

    /// Persist the hyperparameters of this run.
    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(CONFIG_FILE);
        fs::write(&path, serde_json::to_string_pretty(cfg)?)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'eval'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Corrupt config '{}'", path.display()))
    }
}
