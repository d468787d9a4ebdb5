//! Model training
//!
//! Stratified folds, the cross-validated training loop, metrics tracking, and
//! per-fold checkpoints.

pub mod checkpoint;
pub mod folds;
pub mod metrics;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointManifest, FoldCheckpoints};
pub use folds::{stratified_holdout, stratified_k_fold, Fold};
pub use metrics::{Metrics, TrainingHistory};
pub use trainer::{CrossValidation, CrossValidator, FoldReport, FoldTrainer};
