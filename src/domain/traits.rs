// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The application layer asks for images through ImageSource,
// never through a concrete file format.
//
// Implementations:
//   - CifarBinaryLoader → CIFAR-10 binary batches on disk
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use anyhow::Result;
use crate::domain::image::LabeledImage;

/// Which half of a dataset to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test  => write!(f, "test"),
        }
    }
}

// ─── ImageSource ──────────────────────────────────────────────────────────────
/// Any component that can load labelled images for a split.
pub trait ImageSource {
    /// Load every image of the given split.
    fn load_split(&self, split: Split) -> Result<Vec<LabeledImage>>;

    /// Number of distinct labels this source produces.
    fn num_classes(&self) -> usize;
}
