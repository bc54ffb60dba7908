//! Binary classification metrics over rounded predictions and labels.

use serde::{Deserialize, Serialize};
use tcre_core::CandidateId;

/// Numerically stable binary cross entropy on a logit.
pub fn bce_with_logit(logit: f64, target: f64) -> f64 {
    logit.max(0.0) - logit * target + (-logit.abs()).exp().ln_1p()
}

/// One prediction row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub id: CandidateId,
    pub y_true: f32,
    pub y_pred: f32,
}

/// Running confusion counts plus summed loss.
#[derive(Debug, Clone, Default)]
pub struct BinaryMetrics {
    tp: usize,
    fp: usize,
    tn: usize,
    fn_: usize,
    loss_sum: f64,
}

impl BinaryMetrics {
    /// Record one prediction against its label, both rounded half to even.
    ///
    /// The loss term treats the rounded prediction as a logit, matching how
    /// evaluation loss has always been reported for these models.
    pub fn update(&mut self, y_pred: f32, y_true: f32) {
        let (p, t) = (y_pred.round_ties_even(), y_true.round_ties_even());
        self.loss_sum += bce_with_logit(f64::from(p), f64::from(t));
        match (p >= 0.5, t >= 0.5) {
            (true, true) => self.tp += 1,
            (true, false) => self.fp += 1,
            (false, false) => self.tn += 1,
            (false, true) => self.fn_ += 1,
        }
    }

    pub fn count(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn loss(&self) -> f64 {
        ratio(self.loss_sum, self.count() as f64)
    }

    pub fn accuracy(&self) -> f64 {
        ratio((self.tp + self.tn) as f64, self.count() as f64)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp as f64, (self.tp + self.fp) as f64)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp as f64, (self.tp + self.fn_) as f64)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        ratio(2.0 * p * r, p + r)
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den == 0.0 { 0.0 } else { num / den }
}

/// Dataset role of a history record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvalType {
    Training,
    Validation,
    Test,
}

impl std::fmt::Display for EvalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One row of the training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRecord {
    #[serde(rename = "type")]
    pub eval_type: EvalType,
    pub epoch: usize,
    pub ct: usize,
    pub loss: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub lr: f64,
}

impl EvalRecord {
    pub fn new(eval_type: EvalType, epoch: usize, metrics: &BinaryMetrics, lr: f64) -> Self {
        Self {
            eval_type,
            epoch,
            ct: metrics.count(),
            loss: metrics.loss(),
            accuracy: metrics.accuracy(),
            precision: metrics.precision(),
            recall: metrics.recall(),
            f1: metrics.f1(),
            lr,
        }
    }
}

impl std::fmt::Display for EvalRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} Results - Epoch: {}  Count: {} Loss: {:.2} Accuracy: {:.3} F1: {:.3}",
            self.eval_type, self.epoch, self.ct, self.loss, self.accuracy, self.f1
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_rounded_outcomes() {
        let mut m = BinaryMetrics::default();
        for (p, t) in [(1.0, 1.0), (1.0, 0.0), (0.0, 1.0), (0.0, 0.0), (0.9, 1.0)] {
            m.update(p, t);
        }
        assert_eq!(m.count(), 5);
        assert!((m.accuracy() - 0.6).abs() < 1e-12);
        assert!((m.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn half_rounds_to_even() {
        let mut m = BinaryMetrics::default();
        m.update(0.0, 0.5);
        assert_eq!(m.accuracy(), 1.0);

        let mut m = BinaryMetrics::default();
        m.update(0.5, 1.0);
        m.update(1.5, 1.0);
        assert_eq!(m.recall(), 0.5);
    }

    #[test]
    fn undefined_ratios_are_zero() {
        let mut m = BinaryMetrics::default();
        m.update(0.0, 0.0);
        assert_eq!(m.precision(), 0.0);
        assert_eq!(m.recall(), 0.0);
        assert_eq!(m.f1(), 0.0);
        assert_eq!(BinaryMetrics::default().loss(), 0.0);
    }

    #[test]
    fn bce_matches_closed_form() {
        assert!((bce_with_logit(0.0, 1.0) - std::f64::consts::LN_2).abs() < 1e-12);
        let expected = (1.0 + (-1.0f64).exp()).ln();
        assert!((bce_with_logit(1.0, 1.0) - expected).abs() < 1e-12);
    }

    #[test]
    fn history_record_shape() {
        let mut m = BinaryMetrics::default();
        m.update(1.0, 1.0);
        let record = EvalRecord::new(EvalType::Validation, 3, &m, 0.005);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "Validation");
        assert_eq!(json["ct"], 1);
        assert!(record.to_string().starts_with("Validation Results - Epoch: 3  Count: 1"));
    }
}
