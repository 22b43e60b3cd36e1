// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model architecture, training loop and evaluation. The data
// layer also touches Burn (Dataset / Batcher), but all model
// math lives here.
//
// What's in this layer:
//
//   attention.rs    — Multi-head self-attention with two modes:
//                     standard softmax(QKᵀ/√d) and replay of a
//                     stored per-block attention matrix
//
//   model.rs        — The Vision Transformer
//                     • Patch embedding (LN → Linear → LN)
//                     • CLS token + learned position embeddings
//                     • Pre-norm transformer blocks (GELU MLP)
//                     • CLS or mean pooling → linear head
//
//   lr_scheduler.rs — Cosine annealing with optional warmup
//
//   trainer.rs      — The training loop: forward, loss, backward,
//                     Adam step, fixed-weight capture, per-epoch
//                     evaluation and checkpointing
//
//   evaluator.rs    — Accuracy counting, overall and per class
//
//   inferencer.rs   — Loads a checkpoint for evaluation
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Dosovitskiy et al. (2021) An Image is Worth 16x16 Words

/// Self-attention with standard and fixed-weight modes
pub mod attention;

/// Vision Transformer architecture
pub mod model;

/// Per-epoch learning rate schedules
pub mod lr_scheduler;

/// Full training loop with evaluation and checkpointing
pub mod trainer;

/// Accuracy metrics over a stream of batches
pub mod evaluator;

/// Checkpoint loading for evaluation
pub mod inferencer;
