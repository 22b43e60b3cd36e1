// ============================================================
// Layer 3 — LabeledImage Domain Type
// ============================================================
// One decoded image plus its class index.
//
// Pixels are stored channel-major (CHW) as raw bytes, which is
// exactly how the CIFAR-10 binary files lay them out:
//
//   [ R plane (H*W) | G plane (H*W) | B plane (H*W) ]
//
// Keeping bytes (not floats) means a 50k-image training set
// costs ~150MB instead of ~600MB; the conversion to normalised
// floats happens per batch in the batcher.
//
// Reference: Rust Book §5 (Structs and Methods)

use serde::{Deserialize, Serialize};

/// CIFAR-10 class names, indexed by label.
pub const CIFAR10_CLASSES: [&str; 10] = [
    "plane", "car", "bird", "cat", "deer",
    "dog", "frog", "horse", "ship", "truck",
];

/// A raw image with its class label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledImage {
    pub channels: usize,
    pub height:   usize,
    pub width:    usize,
    /// CHW pixel bytes, `channels * height * width` long
    pub pixels:   Vec<u8>,
    pub label:    usize,
}

impl LabeledImage {
    /// Create an image, checking the pixel buffer matches the shape.
    pub fn new(
        channels: usize,
        height:   usize,
        width:    usize,
        pixels:   Vec<u8>,
        label:    usize,
    ) -> anyhow::Result<Self> {
        let expected = channels * height * width;
        if pixels.len() != expected {
            anyhow::bail!(
                "Pixel buffer has {} bytes, expected {} for {}x{}x{}",
                pixels.len(), expected, channels, height, width
            );
        }
        Ok(Self { channels, height, width, pixels, label })
    }

    /// Pixel value at (channel, row, col).
    pub fn pixel(&self, c: usize, y: usize, x: usize) -> u8 {
        self.pixels[(c * self.height + y) * self.width + x]
    }

    pub fn num_pixels(&self) -> usize {
        self.height * self.width
    }
}

/// Human-readable class name for a CIFAR-10 label.
pub fn class_name(label: usize) -> &'static str {
    CIFAR10_CLASSES.get(label).copied().unwrap_or("unknown")
}
