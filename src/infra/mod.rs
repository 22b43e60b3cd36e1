// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting persistence used by the application layer:
//
//   checkpoint.rs — model / optimizer / scheduler state and the
//                   run's TrainConfig, so training can resume and
//                   `eval` can rebuild the architecture
//
//   metrics.rs    — per-epoch CSV log for plotting learning curves
//
// Reference: Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Training metrics CSV logger
pub mod metrics;
