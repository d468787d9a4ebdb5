//! Per-fold model checkpoints
//!
//! The trainer owns an in-memory map from fold index to the best snapshot of
//! that fold's model and hands it to the ensemble predictor by reference.
//! Saving to disk is optional: a directory with `manifest.json` and one
//! `fold_<k>.mpk` file per model.

use std::collections::BTreeMap;
use std::path::Path;

use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CoverageNet, CoverageNetConfig};
use crate::{CoverageClasses, CoverageError, Deployment, Result};

const MANIFEST_FILE: &str = "manifest.json";

/// Best snapshot of one fold's model
#[derive(Debug, Clone)]
pub struct Checkpoint<B: Backend> {
    /// Inference-mode model
    pub model: CoverageNet<B>,
    /// 0-based epoch the snapshot was taken after
    pub epoch: usize,
    /// Validation accuracy at that epoch; None for models trained without validation
    pub val_accuracy: Option<f64>,
}

/// Fold index → best checkpoint
#[derive(Debug, Clone)]
pub struct FoldCheckpoints<B: Backend> {
    entries: BTreeMap<usize, Checkpoint<B>>,
    pub classes: CoverageClasses,
    pub deployment: Deployment,
    pub dropout: f64,
}

/// On-disk description of a checkpoint directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub classes: CoverageClasses,
    pub deployment: Deployment,
    pub dropout: f64,
    pub trained_at: DateTime<Utc>,
    pub folds: Vec<FoldEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoldEntry {
    pub fold: usize,
    pub epoch: usize,
    pub val_accuracy: Option<f64>,
    /// Model file stem relative to the checkpoint directory
    pub file: String,
}

impl<B: Backend> FoldCheckpoints<B> {
    pub fn new(classes: CoverageClasses, deployment: Deployment, dropout: f64) -> Self {
        FoldCheckpoints {
            entries: BTreeMap::new(),
            classes,
            deployment,
            dropout,
        }
    }

    /// Store a fold's checkpoint, replacing any earlier one
    pub fn insert(&mut self, fold: usize, checkpoint: Checkpoint<B>) {
        self.entries.insert(fold, checkpoint);
    }

    pub fn get(&self, fold: usize) -> Option<&Checkpoint<B>> {
        self.entries.get(&fold)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Checkpoints in fold order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Checkpoint<B>)> {
        self.entries.iter().map(|(fold, cp)| (*fold, cp))
    }

    /// Mean best validation accuracy across folds that were validated
    pub fn mean_val_accuracy(&self) -> Option<f64> {
        let accuracies: Vec<f64> = self.entries.values().filter_map(|c| c.val_accuracy).collect();
        if accuracies.is_empty() {
            None
        } else {
            Some(accuracies.iter().sum::<f64>() / accuracies.len() as f64)
        }
    }

    fn model_config(&self) -> CoverageNetConfig {
        CoverageNetConfig::new(self.classes.len()).with_dropout(self.dropout)
    }

    /// Write every checkpoint and the manifest into `dir`
    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;

        let mut folds = Vec::with_capacity(self.entries.len());
        for (fold, checkpoint) in &self.entries {
            let file = format!("fold_{}", fold);
            let path = dir.join(&file);
            let path = path
                .to_str()
                .ok_or_else(|| CoverageError::Checkpoint(format!("invalid path {}", path.display())))?;
            checkpoint.model.save(path)?;
            folds.push(FoldEntry {
                fold: *fold,
                epoch: checkpoint.epoch,
                val_accuracy: checkpoint.val_accuracy,
                file,
            });
        }

        let manifest = CheckpointManifest {
            classes: self.classes.clone(),
            deployment: self.deployment,
            dropout: self.dropout,
            trained_at: Utc::now(),
            folds,
        };
        let file = std::fs::File::create(dir.join(MANIFEST_FILE))?;
        serde_json::to_writer_pretty(file, &manifest)?;

        log::info!("Saved {} checkpoints to {}", self.entries.len(), dir.display());
        Ok(())
    }

    /// Read the manifest in `dir`
    pub fn read_manifest(dir: &Path) -> Result<CheckpointManifest> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Err(CoverageError::NoModel);
        }
        let file = std::fs::File::open(&path)?;
        Ok(serde_json::from_reader(file)?)
    }

    /// Load every checkpoint listed in the manifest in `dir`
    pub fn load(dir: &Path, device: &B::Device) -> Result<Self> {
        let manifest = Self::read_manifest(dir)?;
        let mut checkpoints = Self::new(manifest.classes, manifest.deployment, manifest.dropout);
        let config = checkpoints.model_config();

        for entry in manifest.folds {
            let path = dir.join(&entry.file);
            let path = path
                .to_str()
                .ok_or_else(|| CoverageError::Checkpoint(format!("invalid path {}", path.display())))?;
            let model = CoverageNet::load(device, path, &config)?;
            checkpoints.insert(
                entry.fold,
                Checkpoint {
                    model,
                    epoch: entry.epoch,
                    val_accuracy: entry.val_accuracy,
                },
            );
        }

        if checkpoints.is_empty() {
            return Err(CoverageError::Checkpoint(format!(
                "{} lists no models",
                dir.join(MANIFEST_FILE).display()
            )));
        }
        log::info!(
            "Loaded {} {} checkpoints trained {}",
            checkpoints.len(),
            checkpoints.deployment,
            manifest.trained_at.format("%Y-%m-%d %H:%M")
        );
        Ok(checkpoints)
    }
}
