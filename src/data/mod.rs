// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from CIFAR-10 files on disk to device-ready batches.
//
//   *.bin batch files
//       │
//       ▼
//   CifarBinaryLoader → decodes records into LabeledImages
//       │
//       ▼
//   ImageDataset      → implements Burn's Dataset trait
//       │
//       ▼
//   ImageBatcher      → augment / resize / normalise, stack to tensors
//       │
//       ▼
//   DataLoader        → shuffles and feeds batches to the training loop
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads CIFAR-10 binary batch files
pub mod loader;

/// Random crop, flip and resize on raw image bytes
pub mod augment;

/// Implements Burn's Dataset trait for labelled images
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
