//! Learning rate reduction when the validation score stops improving.

use serde::{Deserialize, Serialize};
use tracing::info;

const MIN_LR_CHANGE: f64 = 1e-8;

/// Multiplies the learning rate by `factor` once the score has failed to
/// improve by a relative `threshold` for more than `patience` epochs.
/// Higher scores are better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceLrOnPlateau {
    pub factor: f64,
    pub patience: usize,
    pub threshold: f64,
    pub best: Option<f64>,
    pub num_bad_epochs: usize,
    pub last_epoch: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(factor: f64, patience: usize, threshold: f64) -> Self {
        Self {
            factor,
            patience,
            threshold,
            best: None,
            num_bad_epochs: 0,
            last_epoch: 0,
        }
    }

    fn is_better(&self, score: f64) -> bool {
        match self.best {
            None => true,
            Some(best) => score > best * (1.0 + self.threshold),
        }
    }

    /// Record an epoch score and return the learning rate to use next.
    pub fn step(&mut self, score: f64, lr: f64) -> f64 {
        self.last_epoch += 1;
        if self.is_better(score) {
            self.best = Some(score);
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.num_bad_epochs > self.patience {
            self.num_bad_epochs = 0;
            let reduced = lr * self.factor;
            if lr - reduced > MIN_LR_CHANGE {
                info!("Epoch {}: reducing learning rate to {reduced:.4e}", self.last_epoch);
                return reduced;
            }
        }
        lr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_after_patience_is_exceeded() {
        let mut s = ReduceLrOnPlateau::new(0.25, 2, 0.01);
        let mut lr = 1.0;
        for score in [0.5, 0.5, 0.5] {
            lr = s.step(score, lr);
        }
        assert_eq!(lr, 1.0);
        lr = s.step(0.5, lr);
        assert_eq!(lr, 0.25);
        assert_eq!(s.num_bad_epochs, 0);
    }

    #[test]
    fn small_gains_are_not_improvements() {
        let mut s = ReduceLrOnPlateau::new(0.25, 0, 0.01);
        assert_eq!(s.step(0.5, 1.0), 1.0);
        assert_eq!(s.step(0.504, 1.0), 0.25);
        assert_eq!(s.step(0.6, 0.25), 0.25);
        assert_eq!(s.best, Some(0.6));
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut s = ReduceLrOnPlateau::new(0.25, 25, 0.01);
        s.step(0.3, 0.005);
        let back: ReduceLrOnPlateau = serde_json::from_str(&serde_json::to_string(&s).unwrap()).unwrap();
        assert_eq!(back, s);
    }
}
