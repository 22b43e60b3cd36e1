//! Per-epoch learning rate schedules.
//!
//! Burn's optimizers take the learning rate as an argument to every
//! `step`, so the schedule only has to answer "what is the rate for
//! this epoch" and advance once per epoch.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Core trait for epoch-based learning rate schedulers.
///
/// ```ignore
/// let mut scheduler = CosineAnnealing::new(1e-3, 1e-6, 200);
/// for epoch in 0..200 {
///     let lr = scheduler.get_lr();
///     // ... train one epoch with `lr` ...
///     scheduler.step();
/// }
/// ```
pub trait LRScheduler {
    /// Learning rate for the current epoch.
    fn get_lr(&self) -> f64;

    /// Advance to the next epoch.
    fn step(&mut self);

    /// Return to epoch 0.
    fn reset(&mut self);
}

/// Cosine annealing from `initial_lr` down to `min_lr` over `t_max` epochs,
/// with an optional linear warmup.
///
/// Without warmup:
///
/// `lr(t) = min_lr + (initial_lr - min_lr) * (1 + cos(pi * t / t_max)) / 2`
///
/// During warmup (`t < warmup_epochs`) the rate ramps linearly:
/// `initial_lr * (t + 1) / warmup_epochs`; the cosine then spans the
/// remaining `t_max - warmup_epochs` epochs. From `t_max` onward the rate
/// stays at `min_lr`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CosineAnnealing {
    initial_lr:    f64,
    min_lr:        f64,
    t_max:         usize,
    warmup_epochs: usize,
    current_epoch: usize,
}

impl CosineAnnealing {
    pub fn new(initial_lr: f64, min_lr: f64, t_max: usize) -> Self {
        Self { initial_lr, min_lr, t_max, warmup_epochs: 0, current_epoch: 0 }
    }

    pub fn with_warmup(mut self, warmup_epochs: usize) -> Self {
        self.warmup_epochs = warmup_epochs.min(self.t_max);
        self
    }

    /// Rate at an arbitrary epoch, independent of the internal counter.
    pub fn lr_at(&self, epoch: usize) -> f64 {
        if epoch < self.warmup_epochs {
            return self.initial_lr * (epoch + 1) as f64 / self.warmup_epochs as f64;
        }

        let span = self.t_max.saturating_sub(self.warmup_epochs);
        let t    = epoch - self.warmup_epochs;
        if span == 0 || t >= span {
            return self.min_lr;
        }

        let cosine = (1.0 + (PI * t as f64 / span as f64).cos()) / 2.0;
        self.min_lr + (self.initial_lr - self.min_lr) * cosine
    }

    pub fn current_epoch(&self) -> usize {
        self.current_epoch
    }

    /// Jump the counter to `epoch`, as if `step` had been called that many times.
    pub fn set_epoch(&mut self, epoch: usize) {
        self.current_epoch = epoch;
    }
}

impl LRScheduler for CosineAnnealing {
    fn get_lr(&self) -> f64 {
        self.lr_at(self.current_epoch)
    }

    fn step(&mut self) {
        self.current_epoch += 1;
    }

    fn reset(&mut self) {
        self.current_epoch = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_starts_at_initial_lr() {
        let s = CosineAnnealing::new(1e-3, 1e-6, 200);
        assert_relative_eq!(s.get_lr(), 1e-3, epsilon = 1e-12);
    }

    #[test]
    fn test_halfway_is_midpoint() {
        let s = CosineAnnealing::new(1e-3, 1e-6, 200);
        assert_relative_eq!(s.lr_at(100), (1e-3 + 1e-6) / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_monotonic_decrease_to_min() {
        let mut s = CosineAnnealing::new(0.1, 0.001, 10);
        let mut prev = s.get_lr();
        for _ in 0..10 {
            s.step();
            let lr = s.get_lr();
            assert!(lr <= prev);
            prev = lr;
        }
        assert_relative_eq!(prev, 0.001, epsilon = 1e-12);
        // Stays at the floor past t_max
        s.step();
        assert_relative_eq!(s.get_lr(), 0.001, epsilon = 1e-12);
    }

    #[test]
    fn test_warmup_ramps_linearly() {
        let s = CosineAnnealing::new(1e-3, 0.0, 20).with_warmup(5);
        assert_relative_eq!(s.lr_at(0), 2e-4, epsilon = 1e-12);
        assert_relative_eq!(s.lr_at(4), 1e-3, epsilon = 1e-12);
        // Cosine restarts from the peak once warmup is over
        assert_relative_eq!(s.lr_at(5), 1e-3, epsilon = 1e-12);
        assert!(s.lr_at(6) < 1e-3);
    }

    #[test]
    fn test_reset_and_set_epoch() {
        let mut s = CosineAnnealing::new(0.1, 0.0, 4);
        s.set_epoch(3);
        assert_eq!(s.current_epoch(), 3);
        assert_relative_eq!(s.get_lr(), s.lr_at(3), epsilon = 1e-12);
        s.reset();
        assert_relative_eq!(s.get_lr(), 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_state_round_trips_through_json() {
        let mut s = CosineAnnealing::new(1e-3, 1e-6, 200).with_warmup(5);
        s.step();
        s.step();
        let json = serde_json::to_string(&s).unwrap();
        let back: CosineAnnealing = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
