// ============================================================
// Layer 5 — Evaluation
// ============================================================
// Runs an inference-mode model over a stream of batches and
// counts argmax hits, overall and per class.
//
// Used by the trainer after every epoch and by the `eval` command.

use anyhow::Result;
use burn::{prelude::*, tensor::TensorData};

use crate::data::batcher::ImageBatch;
use crate::ml::attention::AttentionMode;
use crate::ml::model::VisionTransformer;

/// Correct / total counts for one attention mode.
#[derive(Debug, Clone, PartialEq)]
pub struct Accuracy {
    pub mode:          AttentionMode,
    pub correct:       usize,
    pub total:         usize,
    pub class_correct: Vec<usize>,
    pub class_total:   Vec<usize>,
}

impl Accuracy {
    pub fn new(mode: AttentionMode, num_classes: usize) -> Self {
        Self {
            mode,
            correct: 0,
            total:   0,
            class_correct: vec![0; num_classes],
            class_total:   vec![0; num_classes],
        }
    }

    /// Fraction correct; 0.0 when nothing was seen.
    pub fn ratio(&self) -> f64 {
        if self.total > 0 { self.correct as f64 / self.total as f64 } else { 0.0 }
    }

    /// Per-class fraction correct.
    pub fn class_ratio(&self, class: usize) -> f64 {
        match (self.class_correct.get(class), self.class_total.get(class)) {
            (Some(&c), Some(&t)) if t > 0 => c as f64 / t as f64,
            _ => 0.0,
        }
    }

    /// Accumulate one batch of predicted vs true labels.
    pub fn record(&mut self, predicted: &[i64], targets: &[i64]) -> Result<()> {
        if predicted.len() != targets.len() {
            anyhow::bail!(
                "{} predictions for {} targets in {} evaluation",
                predicted.len(), targets.len(), self.mode
            );
        }
        for (&p, &t) in predicted.iter().zip(targets) {
            let hit = p == t;
            self.total += 1;
            self.correct += hit as usize;
            if let (Some(ct), Some(cc)) = (
                self.class_total.get_mut(t as usize),
                self.class_correct.get_mut(t as usize),
            ) {
                *ct += 1;
                *cc += hit as usize;
            }
        }
        Ok(())
    }
}

/// Argmax class per row of `logits` ([batch, classes]).
pub fn predictions<B: Backend>(logits: Tensor<B, 2>) -> Tensor<B, 1, Int> {
    logits.argmax(1).squeeze_dim::<1>(1)
}

/// Number of rows whose argmax equals the target.
pub fn count_correct<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    predictions(logits)
        .equal(targets)
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize
}

/// Read a label tensor back to the host.
fn to_i64<B: Backend>(t: Tensor<B, 1, Int>) -> Result<Vec<i64>> {
    labels_from_data(t.into_data())
}

fn labels_from_data(data: TensorData) -> Result<Vec<i64>> {
    data.convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| anyhow::anyhow!("Cannot read labels from tensor: {e:?}"))
}

/// Evaluate `model` on every batch, once per requested mode.
/// Returns one `Accuracy` per entry of `modes`, in the same order.
pub fn evaluate<B: Backend>(
    model:       &VisionTransformer<B>,
    batches:     impl Iterator<Item = ImageBatch<B>>,
    modes:       &[AttentionMode],
    num_classes: usize,
) -> Result<Vec<Accuracy>> {
    let mut results: Vec<Accuracy> = modes
        .iter()
        .map(|&mode| Accuracy::new(mode, num_classes))
        .collect();

    for batch in batches {
        let targets = to_i64(batch.targets)?;
        for acc in results.iter_mut() {
            let logits = model.forward(batch.images.clone(), acc.mode);
            acc.record(&to_i64(predictions(logits))?, &targets)?;
        }
    }

    for acc in &results {
        tracing::debug!("{} accuracy: {}/{}", acc.mode, acc.correct, acc.total);
    }
    Ok(results)
}
