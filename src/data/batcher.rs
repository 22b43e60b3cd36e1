// ============================================================
// Layer 4 — Image Batcher
// ============================================================
// Implements Burn's Batcher trait to turn a Vec<LabeledImage>
// into device tensors.
//
// Per image:
//   1. Train only: random crop + flip (see augment.rs)
//   2. Resize to the model's input size
//   3. Scale bytes to [0, 1] and normalise per channel:
//        x = (p / 255 - mean[c]) / std[c]
//
// Output: ImageBatch with
//   images:  [batch, channels, height, width]  (float)
//   targets: [batch]                           (int)
//
// Reference: Burn Book §4 (Batcher)

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};
use rand::{rngs::StdRng, SeedableRng};
use std::sync::{Arc, Mutex};

use crate::data::augment::{resize_bilinear, Augmentation};
use crate::domain::image::LabeledImage;

/// CIFAR-10 per-channel mean used for normalisation.
pub const CIFAR_MEAN: [f32; 3] = [0.4914, 0.4822, 0.4465];
/// CIFAR-10 per-channel standard deviation used for normalisation.
pub const CIFAR_STD:  [f32; 3] = [0.2023, 0.1994, 0.2010];

/// A batch of normalised images and their labels.
#[derive(Debug, Clone)]
pub struct ImageBatch<B: Backend> {
    /// Shape: [batch_size, channels, height, width]
    pub images:  Tensor<B, 4>,
    /// Shape: [batch_size]
    pub targets: Tensor<B, 1, Int>,
}

/// Builds ImageBatches. Holds the transform settings and the
/// augmentation RNG; the target device is handed in by the DataLoader.
///
/// Clones share one RNG stream, so augmentation is reproducible for a
/// given seed as long as batches are built in order (`num_workers <= 1`).
#[derive(Clone, Debug)]
pub struct ImageBatcher {
    /// Model input size [height, width]
    pub image_size: [usize; 2],
    /// Random augmentation; None for evaluation
    pub augment:    Option<Augmentation>,
    pub mean:       [f32; 3],
    pub std:        [f32; 3],
    rng:            Arc<Mutex<StdRng>>,
}

impl ImageBatcher {
    /// Batcher for the training split: augmentation on, drawn from `seed`.
    pub fn train(image_size: [usize; 2], augment: Augmentation, seed: u64) -> Self {
        Self {
            image_size,
            augment: Some(augment),
            mean:    CIFAR_MEAN,
            std:     CIFAR_STD,
            rng:     Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Batcher for the test split: deterministic resize + normalise.
    pub fn eval(image_size: [usize; 2]) -> Self {
        Self {
            image_size,
            augment: None,
            mean:    CIFAR_MEAN,
            std:     CIFAR_STD,
            rng:     Arc::new(Mutex::new(StdRng::seed_from_u64(0))),
        }
    }

    /// Apply the byte-level transforms for one image.
    fn transform(&self, image: &LabeledImage) -> LabeledImage {
        let [h, w] = self.image_size;
        match &self.augment {
            Some(aug) => {
                // A panicked worker leaves the stream usable
                let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                aug.apply(image, self.image_size, &mut *rng)
            }
            None      => resize_bilinear(image, h, w),
        }
    }

    /// Scale and normalise CHW bytes into floats, appending to `out`.
    fn normalise_into(&self, image: &LabeledImage, out: &mut Vec<f32>) {
        let plane = image.num_pixels();
        for (i, &p) in image.pixels.iter().enumerate() {
            let c = (i / plane).min(2);
            out.push((p as f32 / 255.0 - self.mean[c]) / self.std[c]);
        }
    }
}

impl<B: Backend> Batcher<B, LabeledImage, ImageBatch<B>> for ImageBatcher {
    fn batch(&self, items: Vec<LabeledImage>, device: &B::Device) -> ImageBatch<B> {
        let batch_size = items.len();
        let [height, width] = self.image_size;
        let channels = items.first().map(|img| img.channels).unwrap_or(3);

        let mut pixels: Vec<f32> = Vec::with_capacity(batch_size * channels * height * width);
        let mut labels: Vec<i32> = Vec::with_capacity(batch_size);

        for item in &items {
            let img = self.transform(item);
            self.normalise_into(&img, &mut pixels);
            labels.push(img.label as i32);
        }

        let images = Tensor::<B, 1>::from_floats(pixels.as_slice(), device)
            .reshape([batch_size, channels, height, width]);

        let targets = Tensor::<B, 1, Int>::from_ints(labels.as_slice(), device);

        ImageBatch { images, targets }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn solid(value: u8, label: usize) -> LabeledImage {
        LabeledImage::new(3, 4, 4, vec![value; 48], label).unwrap()
    }

    #[test]
    fn test_eval_batch_shapes_and_labels() {
        let device  = Default::default();
        let batcher = ImageBatcher::eval([4, 4]);

        let batch: ImageBatch<TestBackend> =
            batcher.batch(vec![solid(0, 1), solid(255, 8)], &device);

        assert_eq!(batch.images.dims(), [2, 3, 4, 4]);
        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![1, 8]);
    }

    #[test]
    fn test_normalisation_per_channel() {
        let device  = Default::default();
        let batcher = ImageBatcher::eval([4, 4]);

        let batch: ImageBatch<TestBackend> = batcher.batch(vec![solid(255, 0)], &device);
        let values: Vec<f32> = batch.images.into_data().to_vec().unwrap();

        // First pixel of each channel plane
        for c in 0..3 {
            let expected = (1.0 - CIFAR_MEAN[c]) / CIFAR_STD[c];
            assert_relative_eq!(values[c * 16], expected, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_eval_batch_resizes() {
        let device  = Default::default();
        let batcher = ImageBatcher::eval([8, 6]);

        let batch: ImageBatch<TestBackend> = batcher.batch(vec![solid(10, 0)], &device);
        assert_eq!(batch.images.dims(), [1, 3, 8, 6]);
    }

    #[test]
    fn test_train_batch_keeps_shape() {
        let device  = Default::default();
        let batcher = ImageBatcher::train([4, 4], Augmentation::default(), 7);

        let items = (0..5).map(|i| solid(i * 40, i as usize)).collect();
        let batch: ImageBatch<TestBackend> = batcher.batch(items, &device);
        assert_eq!(batch.images.dims(), [5, 3, 4, 4]);
        assert_eq!(batch.targets.dims(), [5]);
    }

    /// Left half dark, right half bright, so crops and flips change the pixels.
    fn asymmetric(label: usize) -> LabeledImage {
        let pixels = (0..3 * 8 * 8)
            .map(|i| if i % 8 < 4 { 10 } else { 240 })
            .collect();
        LabeledImage::new(3, 8, 8, pixels, label).unwrap()
    }

    fn augmented_values(batcher: &ImageBatcher) -> Vec<f32> {
        let items = (0..6).map(asymmetric).collect();
        let batch: ImageBatch<TestBackend> = batcher.batch(items, &Default::default());
        batch.images.into_data().to_vec().unwrap()
    }

    #[test]
    fn test_same_seed_gives_same_augmentation() {
        let aug = Augmentation { crop_padding: 2, flip_prob: 0.5 };

        let first  = ImageBatcher::train([8, 8], aug, 4525);
        let second = ImageBatcher::train([8, 8], aug, 4525);
        for _ in 0..3 {
            assert_eq!(augmented_values(&first), augmented_values(&second));
        }

        // Clones continue the shared stream rather than restarting it
        let fresh = ImageBatcher::train([8, 8], aug, 4525);
        let clone = fresh.clone();
        let a = augmented_values(&fresh);
        let b = augmented_values(&clone);
        assert_ne!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let aug = Augmentation { crop_padding: 2, flip_prob: 0.5 };
        let a = augmented_values(&ImageBatcher::train([8, 8], aug, 1));
        let b = augmented_values(&ImageBatcher::train([8, 8], aug, 2));
        assert_ne!(a, b);
    }
}
