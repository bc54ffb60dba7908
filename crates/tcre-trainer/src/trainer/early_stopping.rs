//! Patience counter over the validation score.

/// Signals a stop after `patience` consecutive epochs whose score does not
/// exceed the best seen so far.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    counter: usize,
    best: Option<f64>,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            counter: 0,
            best: None,
        }
    }

    /// Record a score; returns `true` when training should stop.
    pub fn update(&mut self, score: f64) -> bool {
        match self.best {
            Some(best) if score <= best => {
                self.counter += 1;
                tracing::debug!("EarlyStopping: {} / {}", self.counter, self.patience);
                self.counter >= self.patience
            }
            _ => {
                self.best = Some(score);
                self.counter = 0;
                false
            }
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stops_after_patience_non_improving_epochs() {
        let mut es = EarlyStopping::new(2);
        assert!(!es.update(0.4));
        assert!(!es.update(0.4));
        assert!(!es.update(0.6));
        assert!(!es.update(0.5));
        assert!(es.update(0.6));
        assert_eq!(es.best(), Some(0.6));
    }

    #[test]
    fn first_score_never_stops() {
        let mut es = EarlyStopping::new(1);
        assert!(!es.update(0.0));
        assert!(es.update(0.0));
    }
}
