//! Cross-validated training loop

use burn::data::dataloader::DataLoaderBuilder;
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::decay::WeightDecayConfig;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Int, Tensor};

use super::checkpoint::{Checkpoint, FoldCheckpoints};
use super::folds::stratified_k_fold;
use super::metrics::{Metrics, TrainingHistory};
use crate::data::dataset::{CoverageDataset, PlayBatch, PlayBatcher};
use crate::features::mirror_batch;
use crate::model::{CoverageNet, CoverageNetConfig};
use crate::{Config, CoverageError, Deployment, Result, TrainingConfig};

/// Number of rows whose arg-max matches the target index
pub fn count_correct<B: Backend>(scores: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> usize {
    let predicted = scores.argmax(1).squeeze::<1>(1);
    let correct: i64 = predicted.equal(targets).int().sum().into_scalar().elem();
    correct as usize
}

/// Trains one classifier instance
pub struct FoldTrainer<B: AutodiffBackend> {
    model: CoverageNet<B>,
    optimizer: burn::optim::adaptor::OptimizerAdaptor<burn::optim::Adam, CoverageNet<B>, B>,
    loss_fn: CrossEntropyLoss<B>,
    learning_rate: f64,
}

impl<B: AutodiffBackend> FoldTrainer<B> {
    /// Create a new trainer around a freshly initialized model
    pub fn new(
        model: CoverageNet<B>,
        learning_rate: f64,
        weight_decay: f64,
        device: &B::Device,
    ) -> Self {
        let weight_decay =
            (weight_decay > 0.0).then(|| WeightDecayConfig::new(weight_decay as f32));
        let optimizer = AdamConfig::new().with_weight_decay(weight_decay).init();

        FoldTrainer {
            model,
            optimizer,
            loss_fn: CrossEntropyLossConfig::new().init(device),
            learning_rate,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Multiply the learning rate by `factor`
    pub fn decay_learning_rate(&mut self, factor: f64) {
        self.learning_rate *= factor;
    }

    /// Train one epoch.
    ///
    /// Every batch is doubled with its mirrored copy. Batches of a single play
    /// are skipped: batch norm cannot estimate statistics from one sample.
    pub fn train_epoch(&mut self, loader: impl Iterator<Item = PlayBatch<B>>) -> Metrics {
        let mut metrics = Metrics::new();

        for batch in loader {
            let batch_size = batch.targets.dims()[0];
            if batch_size < 2 {
                log::debug!("Skipping tail batch of {} play", batch_size);
                metrics.skip_batch();
                continue;
            }

            let features = Tensor::cat(
                vec![batch.features.clone(), mirror_batch(batch.features)],
                0,
            );
            let targets = Tensor::cat(vec![batch.targets.clone(), batch.targets], 0);

            // Forward pass
            let logits = self.model.forward(features);
            let loss = self.loss_fn.forward(logits.clone(), targets.clone());

            // Get values before the backward pass consumes the graph
            let loss_val: f32 = loss.clone().into_scalar().elem();
            let correct = count_correct(logits, targets);

            // Backward pass
            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &self.model);

            // Update weights
            self.model = self
                .optimizer
                .step(self.learning_rate, self.model.clone(), grads);

            metrics.update(loss_val, correct, batch_size * 2);
        }

        metrics
    }

    /// Validate with the inference-mode model and mirror test-time augmentation
    pub fn validate_epoch(
        &self,
        loader: impl Iterator<Item = PlayBatch<B::InnerBackend>>,
    ) -> (CoverageNet<B::InnerBackend>, Metrics) {
        let model = self.model.valid();
        let mut metrics = Metrics::new();

        for batch in loader {
            let batch_size = batch.targets.dims()[0];
            let probs = model.forward_tta(batch.features);
            metrics.update_predictions(count_correct(probs, batch.targets), batch_size);
        }

        (model, metrics)
    }

    /// Get the model, consuming the trainer
    pub fn into_model(self) -> CoverageNet<B> {
        self.model
    }
}

/// Outcome of one fold
#[derive(Debug, Clone)]
pub struct FoldReport {
    pub fold: usize,
    pub train_size: usize,
    pub val_size: usize,
    pub history: TrainingHistory,
}

/// All fold checkpoints plus their training histories
pub struct CrossValidation<B: Backend> {
    pub checkpoints: FoldCheckpoints<B>,
    pub reports: Vec<FoldReport>,
}

/// Runs stratified k-fold training
pub struct CrossValidator<B: AutodiffBackend> {
    config: TrainingConfig,
    dropout: f64,
    device: B::Device,
}

impl<B: AutodiffBackend> CrossValidator<B> {
    pub fn new(config: TrainingConfig, dropout: f64, device: B::Device) -> Self {
        CrossValidator {
            config,
            dropout,
            device,
        }
    }

    pub fn from_config(config: &Config, device: B::Device) -> Self {
        Self::new(config.training.clone(), config.model.dropout, device)
    }

    fn fresh_trainer(&self, num_classes: usize, seed: u64) -> FoldTrainer<B> {
        B::seed(seed);
        let model_config = CoverageNetConfig::new(num_classes).with_dropout(self.dropout);
        let model = CoverageNet::<B>::new(&self.device, &model_config);
        FoldTrainer::new(
            model,
            self.config.learning_rate,
            self.config.weight_decay,
            &self.device,
        )
    }

    /// Train one model per fold and keep each fold's best checkpoint
    pub fn run(&self, dataset: &CoverageDataset) -> Result<CrossValidation<B::InnerBackend>> {
        let folds = stratified_k_fold(&dataset.labels(), self.config.folds, self.config.seed)?;
        let mut checkpoints =
            FoldCheckpoints::new(dataset.classes.clone(), Deployment::Ensemble, self.dropout);
        let mut reports = Vec::with_capacity(folds.len());

        log::info!(
            "Cross-validating {} plays over {} folds, {} epochs each",
            dataset.len(),
            folds.len(),
            self.config.epochs
        );

        for fold in folds {
            let train = dataset.subset(&fold.train);
            let val = dataset.subset(&fold.validation);
            let (train_size, val_size) = (train.len(), val.len());

            let (checkpoint, history) = self.train_fold(fold.index, train, val)?;
            log::info!(
                "Fold {}: best val acc {:.2}% at epoch {}",
                fold.index + 1,
                checkpoint.val_accuracy.unwrap_or(0.0) * 100.0,
                checkpoint.epoch + 1
            );
            checkpoints.insert(fold.index, checkpoint);
            reports.push(FoldReport {
                fold: fold.index,
                train_size,
                val_size,
                history,
            });
        }

        if let Some(mean) = checkpoints.mean_val_accuracy() {
            log::info!("Mean best validation accuracy: {:.2}%", mean * 100.0);
        }

        Ok(CrossValidation {
            checkpoints,
            reports,
        })
    }

    /// Train one fold for the full epoch budget
    pub fn train_fold(
        &self,
        fold: usize,
        train: CoverageDataset,
        val: CoverageDataset,
    ) -> Result<(Checkpoint<B::InnerBackend>, TrainingHistory)> {
        if train.is_empty() || val.is_empty() {
            return Err(CoverageError::InsufficientData(format!(
                "fold {} has {} training and {} validation plays",
                fold,
                train.len(),
                val.len()
            )));
        }

        let seed = self.config.seed + fold as u64;
        let mut trainer = self.fresh_trainer(train.classes.len(), seed);

        let train_loader = DataLoaderBuilder::new(PlayBatcher::<B>::new(self.device.clone()))
            .batch_size(self.config.batch_size)
            .shuffle(seed)
            .build(train);
        let val_loader =
            DataLoaderBuilder::new(PlayBatcher::<B::InnerBackend>::new(self.device.clone()))
                .batch_size(self.config.batch_size)
                .build(val);

        let mut history = TrainingHistory::new();
        let mut best: Option<Checkpoint<B::InnerBackend>> = None;

        for epoch in 0..self.config.epochs {
            let learning_rate = trainer.learning_rate();
            let train_metrics = trainer.train_epoch(train_loader.iter());
            let (model, val_metrics) = trainer.validate_epoch(val_loader.iter());

            let improved = history.record_epoch(epoch, learning_rate, &train_metrics, &val_metrics);

            log::info!(
                "Fold {} epoch {}/{}: Train: {} | Val: {} | lr {:.2e}",
                fold + 1,
                epoch + 1,
                self.config.epochs,
                train_metrics,
                val_metrics,
                learning_rate
            );

            if improved {
                log::info!("  New best model (val acc: {:.2}%)", val_metrics.accuracy() * 100.0);
                best = Some(Checkpoint {
                    model,
                    epoch,
                    val_accuracy: Some(val_metrics.accuracy()),
                });
            }

            trainer.decay_learning_rate(self.config.lr_decay);
        }

        let best = best.ok_or_else(|| {
            CoverageError::Config(format!("fold {} ran for zero epochs", fold))
        })?;
        Ok((best, history))
    }

    /// Train a single model on every play, keeping the final epoch
    pub fn train_full(
        &self,
        dataset: &CoverageDataset,
    ) -> Result<(FoldCheckpoints<B::InnerBackend>, TrainingHistory)> {
        if dataset.len() < 2 {
            return Err(CoverageError::InsufficientData(format!(
                "{} plays is too few to train on",
                dataset.len()
            )));
        }
        if self.config.epochs == 0 {
            return Err(CoverageError::Config("training.epochs must be positive".to_string()));
        }

        let mut trainer = self.fresh_trainer(dataset.classes.len(), self.config.seed);
        let loader = DataLoaderBuilder::new(PlayBatcher::<B>::new(self.device.clone()))
            .batch_size(self.config.batch_size)
            .shuffle(self.config.seed)
            .build(dataset.clone());

        log::info!(
            "Training one model on all {} plays for {} epochs",
            dataset.len(),
            self.config.epochs
        );

        let mut history = TrainingHistory::new();
        for epoch in 0..self.config.epochs {
            let learning_rate = trainer.learning_rate();
            let metrics = trainer.train_epoch(loader.iter());
            history.record_train_epoch(learning_rate, &metrics);
            log::info!(
                "Epoch {}/{}: Train: {} | lr {:.2e}",
                epoch + 1,
                self.config.epochs,
                metrics,
                learning_rate
            );
            trainer.decay_learning_rate(self.config.lr_decay);
        }

        let mut checkpoints =
            FoldCheckpoints::new(dataset.classes.clone(), Deployment::FullData, self.dropout);
        checkpoints.insert(
            0,
            Checkpoint {
                model: trainer.into_model().valid(),
                epoch: self.config.epochs - 1,
                val_accuracy: None,
            },
        );
        Ok((checkpoints, history))
    }
}
