// ============================================================
// Layer 2 — EvalUseCase
// ============================================================
// Scores a saved checkpoint on the CIFAR-10 test split:
//
//   Step 1: Read train_config.json          (Layer 6 - infra)
//   Step 2: Rebuild + load the model        (Layer 5 - ml)
//   Step 3: Load the test split             (Layer 4 - data)
//   Step 4: Evaluate in the requested modes (Layer 5 - ml)
//
// Printing the report is left to Layer 1.

use anyhow::Result;
use burn::prelude::*;

use crate::data::{dataset::ImageDataset, loader::CifarBinaryLoader};
use crate::domain::traits::{ImageSource, Split};
use crate::infra::checkpoint::CheckpointManager;
use crate::ml::attention::AttentionMode;
use crate::ml::evaluator::Accuracy;
use crate::ml::inferencer::Inferencer;

type InferBackend = burn::backend::Wgpu;

/// Options for one evaluation run. `None` fields fall back to the
/// values stored with the checkpoint.
#[derive(Debug, Clone)]
pub struct EvalConfig {
    pub checkpoint_dir: String,
    pub data_dir:       Option<String>,
    pub batch_size:     Option<usize>,
    pub modes:          Vec<AttentionMode>,
}

/// Result of an evaluation, one entry per requested mode.
#[derive(Debug, Clone)]
pub struct EvalReport {
    pub num_images: usize,
    pub results:    Vec<Accuracy>,
}

pub struct EvalUseCase {
    config: EvalConfig,
}

impl EvalUseCase {
    pub fn new(config: EvalConfig) -> Self {
        Self { config }
    }

    /// Evaluate on the default WGPU device.
    pub fn execute(&self) -> Result<EvalReport> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        tracing::info!("Using WGPU device: {:?}", device);
        self.run::<InferBackend>(device)
    }

    pub fn run<B: Backend>(&self, device: B::Device) -> Result<EvalReport> {
        let ckpt_manager = CheckpointManager::new(&self.config.checkpoint_dir);
        let train_cfg    = ckpt_manager.load_config()?;

        let data_dir   = self.config.data_dir.as_deref().unwrap_or(&train_cfg.data_dir);
        let batch_size = self.config.batch_size.unwrap_or(train_cfg.batch_size);
        let loader     = CifarBinaryLoader::new(data_dir);

        let inferencer = Inferencer::<B>::from_checkpoint(&ckpt_manager, loader.num_classes(), device)?;

        tracing::info!("Loading CIFAR-10 test split from '{}'", data_dir);
        let dataset    = ImageDataset::new(loader.load_split(Split::Test)?);
        let num_images = dataset.image_count();

        let modes = if self.config.modes.is_empty() {
            AttentionMode::ALL.to_vec()
        } else {
            self.config.modes.clone()
        };
        let results = inferencer.evaluate(dataset, batch_size, train_cfg.num_workers, &modes)?;

        Ok(EvalReport { num_images, results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use std::fs;

    use crate::application::train_use_case::TrainConfig;
    use crate::data::loader::CIFAR_RECORD_BYTES;
    use crate::infra::checkpoint::TrainingState;
    use crate::ml::lr_scheduler::CosineAnnealing;
    use crate::ml::model::VisionTransformer;

    type TestBackend = NdArray<f32>;

    /// Writes a checkpoint for a tiny model plus a 6-image test batch.
    fn fixture(root: &std::path::Path) -> (String, String) {
        let data_dir = root.join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let mut bytes = Vec::with_capacity(6 * CIFAR_RECORD_BYTES);
        for i in 0..6u8 {
            bytes.push(i % 10);
            bytes.extend(std::iter::repeat(i * 30).take(CIFAR_RECORD_BYTES - 1));
        }
        fs::write(data_dir.join("test_batch.bin"), bytes).unwrap();

        let ckpt_dir = root.join("ckpt");
        let cfg = TrainConfig {
            data_dir:       data_dir.to_string_lossy().into_owned(),
            checkpoint_dir: ckpt_dir.to_string_lossy().into_owned(),
            batch_size:     4,
            num_workers:    1,
            image_size:     8,
            patch_size:     4,
            dim:            16,
            depth:          1,
            heads:          2,
            dim_head:       8,
            mlp_dim:        16,
            ..TrainConfig::default()
        };
        let ckpt = CheckpointManager::new(&ckpt_dir);

        type Train = Autodiff<TestBackend>;
        let device = Default::default();
        let model: VisionTransformer<Train> = cfg.model_config(10).init(&device);
        let optim = cfg.optimizer_config().init::<Train, VisionTransformer<Train>>();
        let state = TrainingState {
            epoch:         0,
            scheduler:     CosineAnnealing::new(1e-3, 1e-6, 1),
            best_test_acc: 0.0,
        };
        ckpt.save(&model, &optim, &state, &cfg).unwrap();

        (cfg.checkpoint_dir, cfg.data_dir)
    }

    #[test]
    fn test_defaults_come_from_saved_config() {
        let tmp = tempfile::tempdir().unwrap();
        let (checkpoint_dir, _) = fixture(tmp.path());

        let report = EvalUseCase::new(EvalConfig {
            checkpoint_dir,
            data_dir:   None,
            batch_size: None,
            modes:      vec![],
        })
        .run::<TestBackend>(Default::default())
        .unwrap();

        assert_eq!(report.num_images, 6);
        assert_eq!(report.results.len(), 2);
        for acc in &report.results {
            assert_eq!(acc.total, 6);
            assert_eq!(acc.class_total.iter().sum::<usize>(), 6);
        }
    }

    #[test]
    fn test_single_mode_override() {
        let tmp = tempfile::tempdir().unwrap();
        let (checkpoint_dir, data_dir) = fixture(tmp.path());

        let report = EvalUseCase::new(EvalConfig {
            checkpoint_dir,
            data_dir:   Some(data_dir),
            batch_size: Some(5),
            modes:      vec![AttentionMode::FixedWeights],
        })
        .run::<TestBackend>(Default::default())
        .unwrap();

        assert_eq!(report.results.len(), 1);
        assert_eq!(report.results[0].mode, AttentionMode::FixedWeights);
    }

    #[test]
    fn test_untrained_checkpoint_dir_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let result = EvalUseCase::new(EvalConfig {
            checkpoint_dir: tmp.path().to_string_lossy().into_owned(),
            data_dir:       None,
            batch_size:     None,
            modes:          vec![],
        })
        .run::<TestBackend>(Default::default());
        assert!(result.is_err());
    }
}
