// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Appends one CSV row per epoch so learning curves can be
// plotted after (or during) a run.
//
// Output file: <checkpoint_dir>/metrics.csv
//
//   epoch,lr,train_loss,train_acc,test_acc_standard,test_acc_fixed
//   1,0.001000,2.101234,0.221000,0.310000,0.104000
//   ...
//
// The gap between test_acc_standard and test_acc_fixed shows how
// much the model depends on input-dependent attention rather than
// the averaged matrix captured at the end of the epoch.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};
use serde::{Deserialize, Serialize};

const HEADER: &str = "epoch,lr,train_loss,train_acc,test_acc_standard,test_acc_fixed";

/// One row of metrics for a single training epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch:             usize,
    pub lr:                f64,
    /// Mean cross-entropy over training batches
    pub train_loss:        f64,
    pub train_acc:         f64,
    pub test_acc_standard: f64,
    pub test_acc_fixed:    f64,
}

impl EpochMetrics {
    /// True if this epoch beat `best_acc` on standard-mode test accuracy
    pub fn is_improvement(&self, best_acc: f64) -> bool {
        self.test_acc_standard > best_acc
    }

    fn csv_row(&self) -> String {
        format!(
            "{},{:.8},{:.6},{:.6},{:.6},{:.6}",
            self.epoch,
            self.lr,
            self.train_loss,
            self.train_acc,
            self.test_acc_standard,
            self.test_acc_fixed,
        )
    }
}

/// Appends epoch metrics to a CSV file.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    /// Create the logger, writing the header if the file is new.
    /// An existing file is appended to, so resumed runs extend the log.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create metrics dir '{}'", dir.display()))?;

        let csv_path = dir.join("metrics.csv");
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)?;
            writeln!(f, "{HEADER}")?;
            tracing::debug!("Created metrics CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    /// Append one epoch's metrics as a new row.
    pub fn log(&self, m: &EpochMetrics) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{}", m.csv_row())?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, test_acc={:.4}",
            m.epoch, m.train_loss, m.test_acc_standard,
        );
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}
