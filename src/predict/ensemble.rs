//! Fold-ensemble inference

use std::fmt;

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::data::dataset::{stack_tensors, CoverageDataset};
use crate::features::PlayTensor;
use crate::model::CoverageNet;
use crate::training::FoldCheckpoints;
use crate::{CoverageClasses, CoverageError, PlayKey, PlayPrediction, Result};

/// Plays per forward pass
const CHUNK_SIZE: usize = 256;

/// Averages mirror-augmented class probabilities over every fold model
pub struct EnsemblePredictor<B: Backend> {
    models: Vec<CoverageNet<B>>,
    classes: CoverageClasses,
    device: B::Device,
}

impl<B: Backend> EnsemblePredictor<B> {
    /// Build from trained checkpoints, in fold order
    pub fn from_checkpoints(checkpoints: &FoldCheckpoints<B>, device: B::Device) -> Result<Self> {
        if checkpoints.is_empty() {
            return Err(CoverageError::NoModel);
        }
        let models = checkpoints.iter().map(|(_, cp)| cp.model.clone()).collect();
        Ok(EnsemblePredictor {
            models,
            classes: checkpoints.classes.clone(),
            device,
        })
    }

    pub fn classes(&self) -> &CoverageClasses {
        &self.classes
    }

    pub fn model_count(&self) -> usize {
        self.models.len()
    }

    /// Class probabilities `[plays, classes]`, averaged across models
    pub fn predict_scores(&self, plays: &[PlayTensor]) -> Vec<Vec<f32>> {
        let num_classes = self.classes.len();
        let mut scores = Vec::with_capacity(plays.len());

        for chunk in plays.chunks(CHUNK_SIZE) {
            let input: Tensor<B, 4> = stack_tensors(chunk, &self.device);
            let mut sum: Option<Tensor<B, 2>> = None;
            for model in &self.models {
                let probs = model.forward_tta(input.clone());
                sum = Some(match sum {
                    Some(acc) => acc + probs,
                    None => probs,
                });
            }
            let Some(sum) = sum else {
                break;
            };
            let mean = sum / self.models.len() as f32;

            let data = mean.into_data();
            let values: Vec<f32> = data.iter::<f32>().collect();
            scores.extend(values.chunks(num_classes).map(|row| row.to_vec()));
        }

        scores
    }

    /// 1-based class code with the highest averaged probability, per play
    pub fn predict(&self, plays: &[PlayTensor]) -> Vec<u32> {
        self.predict_scores(plays)
            .iter()
            .map(|row| arg_max(row).0 as u32 + 1)
            .collect()
    }

    /// Named predictions with confidence, optionally paired with known labels
    pub fn predict_plays(
        &self,
        keys: &[PlayKey],
        plays: &[PlayTensor],
        actual: Option<&[u32]>,
    ) -> Result<Vec<PlayPrediction>> {
        if keys.len() != plays.len() {
            return Err(CoverageError::Parse(format!(
                "{} play keys for {} tensors",
                keys.len(),
                plays.len()
            )));
        }

        self.predict_scores(plays)
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let (index, confidence) = arg_max(row);
                Ok(PlayPrediction {
                    play: keys[i],
                    predicted: self.class_name(index as u32 + 1)?,
                    confidence,
                    actual: match actual.and_then(|codes| codes.get(i)) {
                        Some(&code) => Some(self.class_name(code)?),
                        None => None,
                    },
                })
            })
            .collect()
    }

    fn class_name(&self, code: u32) -> Result<String> {
        self.classes
            .name(code)
            .map(str::to_string)
            .ok_or_else(|| CoverageError::UnknownClass(format!("class code {}", code)))
    }

    /// Score the ensemble on a labeled dataset
    pub fn evaluate(&self, dataset: &CoverageDataset) -> Result<EnsembleReport> {
        let keys: Vec<PlayKey> = dataset.samples().iter().map(|s| s.play).collect();
        let labels = dataset.labels();
        let predictions = self.predict_plays(&keys, &dataset.tensors(), Some(labels.as_slice()))?;

        let mut confusion = ConfusionMatrix::new(self.classes.clone());
        for (prediction, &actual) in predictions.iter().zip(labels.iter()) {
            let predicted = self
                .classes
                .code(&prediction.predicted)
                .ok_or_else(|| CoverageError::UnknownClass(prediction.predicted.clone()))?;
            confusion.record(actual, predicted);
        }

        let accuracy = confusion.accuracy();
        log::info!(
            "Ensemble of {} models: {:.2}% on {} plays",
            self.models.len(),
            accuracy * 100.0,
            predictions.len()
        );

        Ok(EnsembleReport {
            predictions,
            accuracy,
            confusion,
        })
    }
}

/// Index and value of the largest entry; the earliest index wins ties
fn arg_max(row: &[f32]) -> (usize, f32) {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
}

/// Evaluation of the ensemble on labeled plays
#[derive(Debug, Clone)]
pub struct EnsembleReport {
    pub predictions: Vec<PlayPrediction>,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

/// Counts of (true class, predicted class) pairs
#[derive(Debug, Clone)]
pub struct ConfusionMatrix {
    classes: CoverageClasses,
    /// Row = true class, column = predicted class, both 0-based
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    pub fn new(classes: CoverageClasses) -> Self {
        let n = classes.len();
        ConfusionMatrix {
            classes,
            counts: vec![vec![0; n]; n],
        }
    }

    /// Record one play by 1-based class codes
    pub fn record(&mut self, actual: u32, predicted: u32) {
        let (row, col) = ((actual as usize).wrapping_sub(1), (predicted as usize).wrapping_sub(1));
        if let Some(cell) = self.counts.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell += 1;
        }
    }

    /// Count for 1-based class codes
    pub fn get(&self, actual: u32, predicted: u32) -> usize {
        self.counts
            .get((actual as usize).wrapping_sub(1))
            .and_then(|r| r.get((predicted as usize).wrapping_sub(1)))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let correct: usize = (0..self.counts.len()).map(|i| self.counts[i][i]).sum();
        correct as f64 / total as f64
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .classes
            .names()
            .iter()
            .map(|n| n.len())
            .max()
            .unwrap_or(0)
            .max(6);

        write!(f, "{:width$}", "", width = width)?;
        for code in 1..=self.classes.len() {
            write!(f, " {:>6}", format!("#{}", code))?;
        }
        writeln!(f)?;

        for (i, row) in self.counts.iter().enumerate() {
            let name = self.classes.names().get(i).map(String::as_str).unwrap_or("?");
            write!(f, "{:width$}", name, width = width)?;
            for count in row {
                write!(f, " {:>6}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
