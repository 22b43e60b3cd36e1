// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Custom train + evaluate loop over Burn's DataLoader and Adam.
//
// Per epoch:
//   1. Train every batch in standard attention mode; on the last
//      batch, store each block's batch-mean attention matrix as
//      its fixed weights
//   2. Step the cosine LR schedule
//   3. Evaluate the inference-mode model (`model.valid()`, no
//      autodiff, dropout off) in standard and fixed-weight modes
//   4. Print / log metrics, optionally checkpoint
//
// Key Burn insight:
//   - Training uses B = Autodiff<Inner> for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - the test loader therefore batches onto B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};
use std::{sync::Arc, time::{Duration, Instant}};

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{ImageBatch, ImageBatcher},
    dataset::ImageDataset,
};
use crate::infra::{
    checkpoint::{CheckpointManager, TrainingState},
    metrics::{EpochMetrics, MetricsLogger},
};
use crate::ml::attention::AttentionMode;
use crate::ml::evaluator::{count_correct, evaluate};
use crate::ml::lr_scheduler::{CosineAnnealing, LRScheduler};
use crate::ml::model::VisionTransformer;

type MyBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// What a finished run reports back to the application layer.
#[derive(Debug, Clone)]
pub struct TrainSummary {
    pub start_epoch:   usize,
    pub epochs_run:    usize,
    pub last:          Option<EpochMetrics>,
    pub best_test_acc: f64,
    pub elapsed:       Duration,
}

/// Train on the default WGPU device.
pub fn run_training(
    cfg:           &TrainConfig,
    train_dataset: ImageDataset,
    test_dataset:  ImageDataset,
    num_classes:   usize,
    ckpt_manager:  &CheckpointManager,
    metrics:       Option<&MetricsLogger>,
) -> Result<TrainSummary> {
    let device = burn::backend::wgpu::WgpuDevice::default();
    tracing::info!("Using WGPU device: {:?}", device);
    train_loop::<MyBackend>(cfg, train_dataset, test_dataset, num_classes, ckpt_manager, metrics, device)
}

/// Build a DataLoader for `dataset`; `shuffle` carries the seed when the
/// order should be randomised each epoch.
pub(crate) fn build_loader<B: Backend>(
    batcher:     ImageBatcher,
    dataset:     ImageDataset,
    batch_size:  usize,
    num_workers: usize,
    shuffle:     Option<u64>,
    device:      &B::Device,
) -> Arc<dyn DataLoader<B, ImageBatch<B>>> {
    let mut builder = DataLoaderBuilder::new(batcher)
        .batch_size(batch_size)
        .num_workers(num_workers)
        .set_device(device.clone());
    if let Some(seed) = shuffle {
        builder = builder.shuffle(seed);
    }
    builder.build(dataset)
}

/// Shuffled, augmented training loader. Shuffle order and augmentation
/// both derive from `cfg.seed`.
fn train_loader<B: Backend>(
    cfg:     &TrainConfig,
    dataset: ImageDataset,
    device:  &B::Device,
) -> Arc<dyn DataLoader<B, ImageBatch<B>>> {
    let image_size = [cfg.image_size, cfg.image_size];
    build_loader::<B>(
        ImageBatcher::train(image_size, cfg.augmentation(), cfg.seed),
        dataset,
        cfg.batch_size,
        cfg.num_workers,
        Some(cfg.seed),
        device,
    )
}

pub fn train_loop<B: AutodiffBackend>(
    cfg:           &TrainConfig,
    train_dataset: ImageDataset,
    test_dataset:  ImageDataset,
    num_classes:   usize,
    ckpt_manager:  &CheckpointManager,
    metrics:       Option<&MetricsLogger>,
    device:        B::Device,
) -> Result<TrainSummary> {
    B::seed(&device, cfg.seed);

    // ── Build model ───────────────────────────────────────────────────────────
    let model_cfg = cfg.model_config(num_classes);
    model_cfg.validate()?;
    let mut model: VisionTransformer<B> = model_cfg.init(&device);
    println!("Number of trainable parameters: {}", model.num_trainable_params());

    // ── Adam + cosine schedule ────────────────────────────────────────────────
    let mut optim = cfg.optimizer_config().init::<B, VisionTransformer<B>>();
    let mut scheduler = CosineAnnealing::new(cfg.lr, cfg.min_lr, cfg.epochs)
        .with_warmup(cfg.warmup_epochs);
    let mut start_epoch   = 0;
    let mut best_test_acc = 0.0f64;

    // ── Resume ────────────────────────────────────────────────────────────────
    if cfg.resume {
        if !ckpt_manager.has_checkpoint() {
            anyhow::bail!(
                "--resume given but no checkpoint found in '{}'",
                ckpt_manager.dir().display()
            );
        }
        let saved_cfg = ckpt_manager.load_config()?;
        let changed   = cfg.architecture_diff(&saved_cfg);
        if !changed.is_empty() {
            anyhow::bail!(
                "Cannot resume from '{}': architecture differs from the checkpoint ({})",
                ckpt_manager.dir().display(),
                changed.join(", ")
            );
        }

        let state   = ckpt_manager.load_state()?;
        model       = ckpt_manager.load_model(model, &device)?;
        optim       = ckpt_manager.load_optimizer(optim, &device)?;
        // Keep this run's schedule shape so `epochs` can be extended
        scheduler.set_epoch(state.scheduler.current_epoch());
        start_epoch   = state.epoch + 1;
        best_test_acc = state.best_test_acc;
        println!("Loaded model at epoch {start_epoch}");
    }
    if start_epoch >= cfg.epochs {
        tracing::warn!(
            "Nothing to do: checkpoint is at epoch {} of {}",
            start_epoch, cfg.epochs
        );
    }

    // ── Data loaders ──────────────────────────────────────────────────────────
    let train_loader = train_loader::<B>(cfg, train_dataset, &device);
    let test_loader  = build_loader::<B::InnerBackend>(
        ImageBatcher::eval([cfg.image_size, cfg.image_size]),
        test_dataset,
        cfg.batch_size,
        cfg.num_workers,
        None,
        &device,
    );

    // ── Epoch loop ────────────────────────────────────────────────────────────
    let started = Instant::now();
    let mut last: Option<EpochMetrics> = None;

    for epoch in start_epoch..cfg.epochs {
        let lr = scheduler.get_lr();
        println!("Learning Rate: {lr}");

        // ── Training phase ────────────────────────────────────────────────────
        let mut loss_sum      = 0.0f64;
        let mut train_batches = 0usize;
        let mut train_correct = 0usize;
        let mut train_total   = 0usize;

        let mut batches = train_loader.iter().peekable();
        while let Some(batch) = batches.next() {
            let is_last = batches.peek().is_none();
            let batch_size = batch.targets.dims()[0];

            let (loss, output) = model.forward_loss(
                batch.images,
                batch.targets.clone(),
                AttentionMode::Standard,
            );

            loss_sum      += loss.clone().into_scalar().elem::<f64>();
            train_batches += 1;
            train_correct += count_correct(output.logits.clone(), batch.targets);
            train_total   += batch_size;

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(lr, model, grads);

            if is_last {
                tracing::info!("Setting fixed attention weights");
                model = model.fix_attention_weights(output.attention);
            }

            if cfg.log_interval > 0 && train_batches % cfg.log_interval == 0 {
                tracing::info!(
                    "epoch {} batch {}: loss={:.4}",
                    epoch + 1, train_batches, loss_sum / train_batches as f64
                );
            }
        }

        scheduler.step();

        let train_loss = if train_batches > 0 { loss_sum / train_batches as f64 } else { f64::NAN };
        let train_acc  = if train_total > 0 { train_correct as f64 / train_total as f64 } else { 0.0 };

        // ── Evaluation phase ──────────────────────────────────────────────────
        let model_valid = model.valid();
        let results = evaluate(&model_valid, test_loader.iter(), &AttentionMode::ALL, num_classes)?;
        let test_acc_standard = results[0].ratio();
        let test_acc_fixed    = results[1].ratio();

        println!(
            "Epoch: {}, Train Acc: {:.4}, Standard Test Acc: {:.4}, Fixed Test Acc: {:.4}",
            epoch + 1, train_acc, test_acc_standard, test_acc_fixed,
        );

        let m = EpochMetrics {
            epoch: epoch + 1,
            lr,
            train_loss,
            train_acc,
            test_acc_standard,
            test_acc_fixed,
        };
        if m.is_improvement(best_test_acc) {
            best_test_acc = m.test_acc_standard;
            tracing::info!("New best standard test accuracy: {:.4}", best_test_acc);
        }
        if let Some(logger) = metrics {
            logger.log(&m)?;
        }
        last = Some(m);

        // ── Checkpoint ────────────────────────────────────────────────────────
        if cfg.save {
            let state = TrainingState { epoch, scheduler: scheduler.clone(), best_test_acc };
            ckpt_manager.save(&model, &optim, &state, cfg)?;
            tracing::info!("Checkpoint saved for epoch {}", epoch + 1);
        }
    }

    let elapsed = started.elapsed();
    tracing::info!("Training complete in {:.1}s", elapsed.as_secs_f64());

    Ok(TrainSummary {
        start_epoch,
        epochs_run: cfg.epochs.saturating_sub(start_epoch),
        last,
        best_test_acc,
        elapsed,
    })
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    use crate::domain::image::LabeledImage;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn tiny_config(checkpoint_dir: &str) -> TrainConfig {
        TrainConfig {
            checkpoint_dir: checkpoint_dir.to_string(),
            batch_size:     4,
            epochs:         2,
            image_size:     8,
            patch_size:     4,
            dim:            16,
            depth:          1,
            heads:          2,
            dim_head:       8,
            mlp_dim:        16,
            crop_padding:   1,
            num_workers:    1,
            ..TrainConfig::default()
        }
    }

    /// Two visually distinct classes: dark images are 0, bright are 1.
    fn images(n: usize) -> Vec<LabeledImage> {
        (0..n)
            .map(|i| {
                let label = i % 2;
                let value = if label == 0 { 20 } else { 230 };
                LabeledImage::new(3, 8, 8, vec![value; 192], label).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_train_runs_and_logs_every_epoch() {
        let tmp  = tempfile::tempdir().unwrap();
        let dir  = tmp.path().to_str().unwrap();
        let cfg  = tiny_config(dir);
        let ckpt = CheckpointManager::new(dir);
        let log  = MetricsLogger::new(dir).unwrap();

        let summary = train_loop::<TestBackend>(
            &cfg,
            ImageDataset::new(images(10)),
            ImageDataset::new(images(6)),
            2,
            &ckpt,
            Some(&log),
            Default::default(),
        )
        .unwrap();

        assert_eq!(summary.start_epoch, 0);
        assert_eq!(summary.epochs_run, 2);
        let last = summary.last.unwrap();
        assert_eq!(last.epoch, 2);
        assert!(last.train_loss.is_finite());
        assert!((0.0..=1.0).contains(&last.test_acc_fixed));

        let csv = std::fs::read_to_string(log.csv_path()).unwrap();
        assert_eq!(csv.lines().count(), 3);
        // Saving is off by default
        assert!(!ckpt.has_checkpoint());
        assert!(ckpt.load_config().is_err());
    }

    #[test]
    fn test_save_then_resume_continues_epochs() {
        let tmp  = tempfile::tempdir().unwrap();
        let dir  = tmp.path().to_str().unwrap();
        let ckpt = CheckpointManager::new(dir);

        let cfg = TrainConfig { save: true, ..tiny_config(dir) };
        train_loop::<TestBackend>(
            &cfg,
            ImageDataset::new(images(8)),
            ImageDataset::new(images(4)),
            2,
            &ckpt,
            None,
            Default::default(),
        )
        .unwrap();

        let state = ckpt.load_state().unwrap();
        assert_eq!(state.epoch, 1);
        assert_eq!(state.scheduler.current_epoch(), 2);

        // Extend the run to 3 epochs and resume: only epoch 3 runs
        let cfg = TrainConfig { resume: true, epochs: 3, ..cfg };
        let summary = train_loop::<TestBackend>(
            &cfg,
            ImageDataset::new(images(8)),
            ImageDataset::new(images(4)),
            2,
            &ckpt,
            None,
            Default::default(),
        )
        .unwrap();

        assert_eq!(summary.start_epoch, 2);
        assert_eq!(summary.epochs_run, 1);
        assert_eq!(summary.last.map(|m| m.epoch), Some(3));
        assert_eq!(ckpt.load_state().unwrap().epoch, 2);
    }

    #[test]
    fn test_resume_without_checkpoint_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let cfg = TrainConfig { resume: true, ..tiny_config(dir) };

        let result = train_loop::<TestBackend>(
            &cfg,
            ImageDataset::new(images(4)),
            ImageDataset::new(images(4)),
            2,
            &CheckpointManager::new(dir),
            None,
            Default::default(),
        );
        assert!(result.is_err());
    }

    /// Runs one saved epoch of `tiny_config(dir)` so later runs have a checkpoint.
    fn saved_run(dir: &str) -> CheckpointManager {
        let ckpt = CheckpointManager::new(dir);
        let cfg  = TrainConfig { save: true, epochs: 1, ..tiny_config(dir) };
        train_loop::<TestBackend>(
            &cfg,
            ImageDataset::new(images(8)),
            ImageDataset::new(images(4)),
            2,
            &ckpt,
            None,
            Default::default(),
        )
        .unwrap();
        ckpt
    }

    #[test]
    fn test_train_loader_is_reproducible_for_a_seed() {
        let device = Default::default();
        let cfg    = TrainConfig { crop_padding: 2, ..tiny_config("unused") };
        // Left half dark, right half bright, so every crop offset and flip shows
        let asymmetric: Vec<LabeledImage> = (0..8)
            .map(|i| {
                let pixels = (0..192).map(|p| if p % 8 < 4 { 10 } else { 240 }).collect();
                LabeledImage::new(3, 8, 8, pixels, i % 2).unwrap()
            })
            .collect();

        let epochs = |cfg: &TrainConfig| -> Vec<Vec<f32>> {
            let loader = train_loader::<NdArray<f32>>(cfg, ImageDataset::new(asymmetric.clone()), &device);
            (0..2)
                .flat_map(|_| loader.iter().collect::<Vec<_>>())
                .map(|batch| batch.images.into_data().to_vec().unwrap())
                .collect()
        };

        let first  = epochs(&cfg);
        let second = epochs(&cfg);
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);

        let reseeded = epochs(&TrainConfig { seed: cfg.seed + 1, ..cfg.clone() });
        assert_ne!(first, reseeded);
    }

    #[test]
    fn test_last_batch_attention_is_captured_and_saved() {
        let tmp  = tempfile::tempdir().unwrap();
        let dir  = tmp.path().to_str().unwrap();
        let ckpt = saved_run(dir);

        let device = Default::default();
        let fresh  = tiny_config(dir).model_config(2).init::<NdArray<f32>>(&device);
        let model  = ckpt.load_model(fresh, &device).unwrap();

        // seq_len = (8/4)^2 + 1 = 5, so an untouched matrix is 0.2 everywhere
        let weights: Vec<f32> = model.blocks[0].attention.fixed_weights.val()
            .into_data().to_vec().unwrap();
        assert_eq!(weights.len(), 2 * 5 * 5);
        let max_dev = weights.iter().map(|w| (w - 0.2).abs()).fold(0.0f32, f32::max);
        assert!(max_dev > 1e-3, "fixed weights still uniform (max deviation {max_dev})");

        // Captured rows are still attention distributions
        for row in weights.chunks(5) {
            approx::assert_relative_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-2);
        }
    }

    #[test]
    fn test_run_without_save_keeps_checkpoint_config() {
        let tmp  = tempfile::tempdir().unwrap();
        let dir  = tmp.path().to_str().unwrap();
        let ckpt = saved_run(dir);

        let other = TrainConfig { dim: 32, epochs: 1, ..tiny_config(dir) };
        train_loop::<TestBackend>(
            &other,
            ImageDataset::new(images(4)),
            ImageDataset::new(images(4)),
            2,
            &ckpt,
            None,
            Default::default(),
        )
        .unwrap();

        // The saved config still describes the saved record
        let saved = ckpt.load_config().unwrap();
        assert_eq!(saved.dim, 16);
        let device = Default::default();
        let fresh  = saved.model_config(2).init::<NdArray<f32>>(&device);
        assert!(ckpt.load_model(fresh, &device).is_ok());
    }

    #[test]
    fn test_resume_with_different_architecture_fails() {
        let tmp  = tempfile::tempdir().unwrap();
        let dir  = tmp.path().to_str().unwrap();
        let ckpt = saved_run(dir);

        let cfg = TrainConfig { resume: true, dim: 32, ..tiny_config(dir) };
        let err = train_loop::<TestBackend>(
            &cfg,
            ImageDataset::new(images(4)),
            ImageDataset::new(images(4)),
            2,
            &ckpt,
            None,
            Default::default(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("dim: 16 -> 32"), "{err}");
        assert_eq!(ckpt.load_state().unwrap().epoch, 0);
    }

    #[test]
    fn test_resume_keeps_best_accuracy() {
        let tmp  = tempfile::tempdir().unwrap();
        let dir  = tmp.path().to_str().unwrap();
        let ckpt = saved_run(dir);

        // Pretend the saved run already reached the ceiling
        let state = TrainingState { best_test_acc: 1.0, ..ckpt.load_state().unwrap() };
        std::fs::write(
            tmp.path().join("training_state.json"),
            serde_json::to_string(&state).unwrap(),
        )
        .unwrap();

        let cfg = TrainConfig { resume: true, save: true, ..tiny_config(dir) };
        let summary = train_loop::<TestBackend>(
            &cfg,
            ImageDataset::new(images(8)),
            ImageDataset::new(images(4)),
            2,
            &ckpt,
            None,
            Default::default(),
        )
        .unwrap();

        assert_eq!(summary.start_epoch, 1);
        assert_eq!(summary.best_test_acc, 1.0);
        assert_eq!(ckpt.load_state().unwrap().best_test_acc, 1.0);
    }
}
