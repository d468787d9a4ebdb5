//! Prediction and inference
//!
//! Combine fold checkpoints into an ensemble and classify plays.

pub mod ensemble;

pub use ensemble::{ConfusionMatrix, EnsemblePredictor, EnsembleReport};
