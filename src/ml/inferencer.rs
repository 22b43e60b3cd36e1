// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Rebuilds a trained model from a checkpoint directory and runs
// it over a labelled dataset without autodiff. The architecture
// comes from the saved train_config.json, so it always matches
// the stored record.

use anyhow::Result;
use burn::prelude::*;

use crate::data::{batcher::ImageBatcher, dataset::ImageDataset};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::attention::AttentionMode;
use crate::ml::evaluator::{evaluate, Accuracy};
use crate::ml::model::VisionTransformer;
use crate::ml::trainer::build_loader;

pub struct Inferencer<B: Backend> {
    model:       VisionTransformer<B>,
    image_size:  [usize; 2],
    num_classes: usize,
    device:      B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        num_classes:  usize,
        device:       B::Device,
    ) -> Result<Self> {
        let cfg       = ckpt_manager.load_config()?;
        let model_cfg = cfg.model_config(num_classes);
        model_cfg.validate()?;

        let model: VisionTransformer<B> = model_cfg.init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!(
            "Model loaded from '{}' ({} trainable parameters)",
            ckpt_manager.dir().display(),
            model.num_trainable_params()
        );

        Ok(Self {
            model,
            image_size: model_cfg.image_size,
            num_classes,
            device,
        })
    }

    pub fn model(&self) -> &VisionTransformer<B> {
        &self.model
    }

    /// Accuracy of the loaded model on `dataset`, once per mode.
    pub fn evaluate(
        &self,
        dataset:     ImageDataset,
        batch_size:  usize,
        num_workers: usize,
        modes:       &[AttentionMode],
    ) -> Result<Vec<Accuracy>> {
        let loader = build_loader::<B>(
            ImageBatcher::eval(self.image_size),
            dataset,
            batch_size,
            num_workers,
            None,
            &self.device,
        );
        evaluate(&self.model, loader.iter(), modes, self.num_classes)
    }
}
