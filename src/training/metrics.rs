//! Training metrics and evaluation

use std::fmt;

/// Metrics accumulated during a training or validation pass
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Sum of per-batch losses
    pub total_loss: f64,
    /// Number of exact-match predictions
    pub correct: usize,
    /// Total predictions
    pub total_predictions: usize,
    /// Number of batches that contributed a loss
    pub batch_count: usize,
    /// Batches skipped because they were too small to normalize
    pub skipped_batches: usize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update metrics with a training batch result
    pub fn update(&mut self, loss: f32, correct: usize, batch_size: usize) {
        self.total_loss += loss as f64;
        self.correct += correct;
        self.total_predictions += batch_size;
        self.batch_count += 1;
    }

    /// Update metrics with predictions only (no loss)
    pub fn update_predictions(&mut self, correct: usize, batch_size: usize) {
        self.correct += correct;
        self.total_predictions += batch_size;
    }

    pub fn skip_batch(&mut self) {
        self.skipped_batches += 1;
    }

    /// Get average loss
    pub fn avg_loss(&self) -> f64 {
        if self.batch_count == 0 {
            0.0
        } else {
            self.total_loss / self.batch_count as f64
        }
    }

    /// Exact-match accuracy
    pub fn accuracy(&self) -> f64 {
        if self.total_predictions == 0 {
            0.0
        } else {
            self.correct as f64 / self.total_predictions as f64
        }
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.batch_count > 0 {
            write!(f, "Loss: {:.4} | ", self.avg_loss())?;
        }
        write!(f, "Acc: {:.2}%", self.accuracy() * 100.0)
    }
}

/// Per-fold training history
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    pub train_losses: Vec<f64>,
    pub train_accuracies: Vec<f64>,
    pub val_accuracies: Vec<f64>,
    pub learning_rates: Vec<f64>,
    /// Best validation accuracy so far, if any epoch has been validated
    pub best_val_accuracy: Option<f64>,
    pub best_epoch: usize,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metrics for an epoch.
    ///
    /// Returns true when validation accuracy strictly beats every earlier epoch;
    /// ties keep the earlier epoch.
    pub fn record_epoch(
        &mut self,
        epoch: usize,
        learning_rate: f64,
        train: &Metrics,
        val: &Metrics,
    ) -> bool {
        self.train_losses.push(train.avg_loss());
        self.train_accuracies.push(train.accuracy());
        self.val_accuracies.push(val.accuracy());
        self.learning_rates.push(learning_rate);

        let improved = self
            .best_val_accuracy
            .map_or(true, |best| val.accuracy() > best);
        if improved {
            self.best_val_accuracy = Some(val.accuracy());
            self.best_epoch = epoch;
        }
        improved
    }

    /// Record a training-only epoch
    pub fn record_train_epoch(&mut self, learning_rate: f64, train: &Metrics) {
        self.train_losses.push(train.avg_loss());
        self.train_accuracies.push(train.accuracy());
        self.learning_rates.push(learning_rate);
    }

    pub fn epochs(&self) -> usize {
        self.train_losses.len()
    }

    /// Change in training loss between the first and last epoch
    pub fn loss_reduction(&self) -> Option<f64> {
        match (self.train_losses.first(), self.train_losses.last()) {
            (Some(first), Some(last)) if self.train_losses.len() > 1 => Some(first - last),
            _ => None,
        }
    }
}
