// ============================================================
// Layer 4 — CIFAR-10 Binary Loader
// ============================================================
// Reads the "binary version" of CIFAR-10 as distributed at
// https://www.cs.toronto.edu/~kriz/cifar.html
//
// Each .bin file is a flat run of fixed-size records:
//
//   <1 byte label><3072 bytes pixels>
//
// The pixels are 1024 red, then 1024 green, then 1024 blue
// values, each plane row-major over a 32x32 image — i.e. CHW.
//
// Directory layout after extracting cifar-10-binary.tar.gz:
//   data/
//     cifar-10-batches-bin/
//       data_batch_1.bin ... data_batch_5.bin   ← train split
//       test_batch.bin                          ← test split
//
// Reference: Rust Book §9 (Error Handling)

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};

use crate::domain::image::LabeledImage;
use crate::domain::traits::{ImageSource, Split};

pub const CIFAR_CHANNELS:    usize = 3;
pub const CIFAR_SIDE:        usize = 32;
pub const CIFAR_NUM_CLASSES: usize = 10;
pub const CIFAR_IMAGE_BYTES: usize = CIFAR_CHANNELS * CIFAR_SIDE * CIFAR_SIDE;
pub const CIFAR_RECORD_BYTES: usize = 1 + CIFAR_IMAGE_BYTES;

const BATCHES_DIR: &str = "cifar-10-batches-bin";
const TRAIN_FILES: [&str; 5] = [
    "data_batch_1.bin",
    "data_batch_2.bin",
    "data_batch_3.bin",
    "data_batch_4.bin",
    "data_batch_5.bin",
];
const TEST_FILES: [&str; 1] = ["test_batch.bin"];

/// Loads CIFAR-10 from a local directory of binary batch files.
pub struct CifarBinaryLoader {
    /// Either the extracted `cifar-10-batches-bin` folder or its parent
    dir: PathBuf,
}

impl CifarBinaryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Resolve the folder that actually holds the .bin files.
    fn batches_dir(&self) -> Result<PathBuf> {
        let nested = self.dir.join(BATCHES_DIR);
        if nested.is_dir() {
            return Ok(nested);
        }
        if self.dir.join(TEST_FILES[0]).is_file() {
            return Ok(self.dir.clone());
        }
        anyhow::bail!(
            "No CIFAR-10 binary batches found under '{}'. \
             Download cifar-10-binary.tar.gz and extract it there.",
            self.dir.display()
        )
    }
}

impl ImageSource for CifarBinaryLoader {
    fn load_split(&self, split: Split) -> Result<Vec<LabeledImage>> {
        let dir   = self.batches_dir()?;
        let files: &[&str] = match split {
            Split::Train => &TRAIN_FILES,
            Split::Test  => &TEST_FILES,
        };

        let mut images = Vec::new();
        for name in files {
            let path = dir.join(name);
            let mut batch = load_batch_file(&path)?;
            tracing::debug!("Loaded {} images from '{}'", batch.len(), path.display());
            images.append(&mut batch);
        }

        tracing::info!("Loaded {} {} images", images.len(), split);
        Ok(images)
    }

    fn num_classes(&self) -> usize {
        CIFAR_NUM_CLASSES
    }
}

/// Read and decode one .bin batch file.
pub fn load_batch_file(path: &Path) -> Result<Vec<LabeledImage>> {
    let bytes = fs::read(path)
        .with_context(|| format!("Cannot read CIFAR-10 batch '{}'", path.display()))?;
    parse_records(&bytes)
        .with_context(|| format!("Malformed CIFAR-10 batch '{}'", path.display()))
}

/// Decode a buffer of concatenated CIFAR-10 records.
pub fn parse_records(bytes: &[u8]) -> Result<Vec<LabeledImage>> {
    if bytes.len() % CIFAR_RECORD_BYTES != 0 {
        anyhow::bail!(
            "Length {} is not a multiple of the {}-byte record size",
            bytes.len(), CIFAR_RECORD_BYTES
        );
    }

    bytes
        .chunks_exact(CIFAR_RECORD_BYTES)
        .enumerate()
        .map(|(i, record)| {
            let label = record[0] as usize;
            if label >= CIFAR_NUM_CLASSES {
                anyhow::bail!("Record {} has label {} (expected < {})", i, label, CIFAR_NUM_CLASSES);
            }
            LabeledImage::new(
                CIFAR_CHANNELS, CIFAR_SIDE, CIFAR_SIDE,
                record[1..].to_vec(),
                label,
            )
        })
        .collect()
}
