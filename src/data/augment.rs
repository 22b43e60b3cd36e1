// ============================================================
// Layer 4 — Image Transforms
// ============================================================
// Byte-level transforms applied before an image becomes a tensor.
//
// Training pipeline (in order):
//   1. Random crop   — zero-pad by `padding` on every side, then
//                      cut a window of the original size at a
//                      random offset in [0, 2*padding]
//   2. Resize        — bilinear, only when the target differs
//   3. Random flip   — mirror left/right with probability p
//
// Test pipeline: resize only.
//
// Reference: rand crate documentation

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::image::LabeledImage;

/// Random train-time augmentation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Augmentation {
    /// Zero padding added on each side before the random crop (0 disables)
    pub crop_padding: usize,
    /// Probability of a horizontal flip
    pub flip_prob:    f64,
}

impl Default for Augmentation {
    fn default() -> Self {
        Self { crop_padding: 4, flip_prob: 0.5 }
    }
}

impl Augmentation {
    /// Crop, resize to `size`, then maybe flip.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        image: &LabeledImage,
        size:  [usize; 2],
        rng:   &mut R,
    ) -> LabeledImage {
        let cropped = if self.crop_padding > 0 {
            let top  = rng.gen_range(0..=2 * self.crop_padding);
            let left = rng.gen_range(0..=2 * self.crop_padding);
            pad_and_crop(image, self.crop_padding, top, left)
        } else {
            image.clone()
        };

        let resized = resize_bilinear(&cropped, size[0], size[1]);

        if self.flip_prob > 0.0 && rng.gen_bool(self.flip_prob.min(1.0)) {
            flip_horizontal(&resized)
        } else {
            resized
        }
    }
}

/// Zero-pad by `padding`, then take a window of the original size whose
/// top-left corner sits at (`top`, `left`) in padded coordinates.
pub fn pad_and_crop(
    image:   &LabeledImage,
    padding: usize,
    top:     usize,
    left:    usize,
) -> LabeledImage {
    let (c, h, w) = (image.channels, image.height, image.width);
    let mut pixels = vec![0u8; c * h * w];

    for ch in 0..c {
        for y in 0..h {
            // Row in the source image, if this padded row is not padding
            let Some(sy) = (y + top).checked_sub(padding).filter(|&sy| sy < h) else {
                continue;
            };
            for x in 0..w {
                if let Some(sx) = (x + left).checked_sub(padding).filter(|&sx| sx < w) {
                    pixels[(ch * h + y) * w + x] = image.pixel(ch, sy, sx);
                }
            }
        }
    }

    LabeledImage { pixels, ..image.clone() }
}

/// Mirror the image left/right.
pub fn flip_horizontal(image: &LabeledImage) -> LabeledImage {
    let w = image.width;
    let pixels = image
        .pixels
        .chunks_exact(w)
        .flat_map(|row| row.iter().rev().copied())
        .collect();
    LabeledImage { pixels, ..image.clone() }
}

/// Bilinear resize with half-pixel centres. Returns a clone when the
/// size already matches.
pub fn resize_bilinear(image: &LabeledImage, height: usize, width: usize) -> LabeledImage {
    if image.height == height && image.width == width {
        return image.clone();
    }

    let (c, ih, iw) = (image.channels, image.height, image.width);
    let scale_y = ih as f32 / height as f32;
    let scale_x = iw as f32 / width as f32;

    // Source coordinate → (low index, high index, weight of high)
    let axis = |dst: usize, scale: f32, len: usize| {
        let src = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, (len - 1) as f32);
        let lo  = src.floor() as usize;
        let hi  = (lo + 1).min(len - 1);
        (lo, hi, src - lo as f32)
    };

    let mut pixels = Vec::with_capacity(c * height * width);
    for ch in 0..c {
        for y in 0..height {
            let (y0, y1, wy) = axis(y, scale_y, ih);
            for x in 0..width {
                let (x0, x1, wx) = axis(x, scale_x, iw);
                let p = |yy, xx| image.pixel(ch, yy, xx) as f32;
                let top    = p(y0, x0) * (1.0 - wx) + p(y0, x1) * wx;
                let bottom = p(y1, x0) * (1.0 - wx) + p(y1, x1) * wx;
                let v = top * (1.0 - wy) + bottom * wy;
                pixels.push(v.round().clamp(0.0, 255.0) as u8);
            }
        }
    }

    LabeledImage { channels: c, height, width, pixels, label: image.label }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    /// 1-channel 3x3 image holding 1..=9 row-major
    fn grid() -> LabeledImage {
        LabeledImage::new(1, 3, 3, (1..=9).collect(), 2).unwrap()
    }

    #[test]
    fn test_centre_crop_is_identity() {
        let img = grid();
        // top = left = padding → window aligned with the original
        assert_eq!(pad_and_crop(&img, 2, 2, 2), img);
    }

    #[test]
    fn test_crop_shifts_in_zeros() {
        // Window starts at the padded origin: one row/col of zeros first
        let out = pad_and_crop(&grid(), 1, 0, 0);
        assert_eq!(out.pixels, vec![0, 0, 0, 0, 1, 2, 0, 4, 5]);
        assert_eq!(out.label, 2);
    }

    #[test]
    fn test_flip_reverses_rows() {
        let out = flip_horizontal(&grid());
        assert_eq!(out.pixels, vec![3, 2, 1, 6, 5, 4, 9, 8, 7]);
        assert_eq!(flip_horizontal(&out), grid());
    }

    #[test]
    fn test_resize_same_size_is_noop() {
        assert_eq!(resize_bilinear(&grid(), 3, 3), grid());
    }

    #[test]
    fn test_resize_constant_image_stays_constant() {
        let img = LabeledImage::new(3, 4, 4, vec![77; 48], 0).unwrap();
        let out = resize_bilinear(&img, 7, 5);
        assert_eq!((out.height, out.width), (7, 5));
        assert_eq!(out.pixels.len(), 3 * 7 * 5);
        assert!(out.pixels.iter().all(|&p| p == 77));
    }

    #[test]
    fn test_downscale_averages_blocks() {
        // 2x2 → 1x1 samples the centre: mean of all four
        let img = LabeledImage::new(1, 2, 2, vec![0, 100, 100, 200], 0).unwrap();
        let out = resize_bilinear(&img, 1, 1);
        assert_eq!(out.pixels, vec![100]);
    }

    #[test]
    fn test_augmentation_preserves_shape_and_label() {
        let img = LabeledImage::new(3, 8, 8, (0..192).map(|v| v as u8).collect(), 7).unwrap();
        let aug = Augmentation { crop_padding: 2, flip_prob: 0.5 };
        let mut rng = StdRng::seed_from_u64(4525);
        for _ in 0..20 {
            let out = aug.apply(&img, [8, 8], &mut rng);
            assert_eq!(out.pixels.len(), 192);
            assert_eq!(out.label, 7);
        }
    }

    #[test]
    fn test_disabled_augmentation_is_identity() {
        let img = grid();
        let aug = Augmentation { crop_padding: 0, flip_prob: 0.0 };
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(aug.apply(&img, [3, 3], &mut rng), img);
    }
}
