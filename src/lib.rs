//! Pass-coverage classification from player-tracking data
//!
//! Builds defender/offender relative-feature tensors per play and classifies the
//! defensive coverage scheme with a permutation-invariant convolutional network,
//! trained with stratified k-fold cross-validation and mirror augmentation.

pub mod data;
pub mod features;
pub mod model;
pub mod predict;
pub mod training;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Unique identifier for a play (game, play number)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PlayKey {
    pub game_id: u64,
    pub play_id: u32,
}

impl PlayKey {
    pub fn new(game_id: u64, play_id: u32) -> Self {
        PlayKey { game_id, play_id }
    }
}

impl fmt::Display for PlayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game_id, self.play_id)
    }
}

/// Which side of the ball a participant is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamSide {
    Offense,
    Defense,
}

impl fmt::Display for TeamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeamSide::Offense => write!(f, "offense"),
            TeamSide::Defense => write!(f, "defense"),
        }
    }
}

/// The ordered set of coverage-scheme classes fixed at training time.
///
/// Class codes are 1-based: the first name has code 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageClasses {
    names: Vec<String>,
}

impl CoverageClasses {
    /// Build the class enumeration from label names (sorted, de-duplicated)
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a str>) -> Self {
        let mut names: Vec<String> = labels.into_iter().map(str::to_string).collect();
        names.sort();
        names.dedup();
        CoverageClasses { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// 1-based code for a class name
    pub fn code(&self, name: &str) -> Option<u32> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| i as u32 + 1)
    }

    /// Class name for a 1-based code
    pub fn name(&self, code: u32) -> Option<&str> {
        if code == 0 {
            return None;
        }
        self.names.get(code as usize - 1).map(String::as_str)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Final prediction for one play
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayPrediction {
    pub play: PlayKey,
    pub predicted: String,
    pub confidence: f32,
    pub actual: Option<String>,
}

impl PlayPrediction {
    /// Whether the prediction matches the known label, if any
    pub fn is_correct(&self) -> Option<bool> {
        self.actual.as_ref().map(|a| *a == self.predicted)
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("Play {play} has no {side} participants in frame {frame_id}")]
    EmptyRoster {
        play: PlayKey,
        side: TeamSide,
        frame_id: u32,
    },

    #[error("Play {play} has {count} {side} participants, capacity is {capacity}")]
    RosterOverflow {
        play: PlayKey,
        side: TeamSide,
        count: usize,
        capacity: usize,
    },

    #[error("Unknown coverage class: {0}")]
    UnknownClass(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Model not trained - run `coverage train` first")]
    NoModel,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CoverageError>;

/// Application configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub training: TrainingConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
    pub predict: PredictConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub folds: usize,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Multiplicative learning-rate decay applied once per epoch
    pub lr_decay: f64,
    pub weight_decay: f64,
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub dropout: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    pub tracking_path: String,
    pub labels_path: String,
    pub model_dir: String,
    /// Frame to build tensors from; the earliest frame of each play when unset
    pub frame_id: Option<u32>,
    /// Stratified share of plays held out from cross-validation for the ensemble report
    pub test_fraction: f64,
}

/// Which predictor is deployed after training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    /// Average of the best checkpoint of every fold
    Ensemble,
    /// One model retrained on all training plays
    FullData,
}

impl fmt::Display for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deployment::Ensemble => write!(f, "ensemble"),
            Deployment::FullData => write!(f, "full_data"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictConfig {
    pub deployment: Deployment,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            training: TrainingConfig {
                folds: 5,
                epochs: 50,
                batch_size: 64,
                learning_rate: 1e-3,
                lr_decay: 0.975,
                weight_decay: 0.0,
                seed: 42,
            },
            model: ModelConfig { dropout: 0.3 },
            data: DataConfig {
                tracking_path: "data/tracking_week_1.csv".to_string(),
                labels_path: "data/coverages_week1.csv".to_string(),
                model_dir: "model".to_string(),
                frame_id: None,
                test_fraction: 0.2,
            },
            predict: PredictConfig {
                deployment: Deployment::Ensemble,
            },
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoverageError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CoverageError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| CoverageError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the trainer cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.training.folds < 2 {
            return Err(CoverageError::Config(format!(
                "training.folds must be at least 2, got {}",
                self.training.folds
            )));
        }
        if self.training.batch_size < 2 {
            return Err(CoverageError::Config(format!(
                "training.batch_size must be at least 2, got {}",
                self.training.batch_size
            )));
        }
        if !(0.0..1.0).contains(&self.data.test_fraction) {
            return Err(CoverageError::Config(format!(
                "data.test_fraction must be in [0, 1), got {}",
                self.data.test_fraction
            )));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(CoverageError::Config(format!(
                "model.dropout must be in [0, 1), got {}",
                self.model.dropout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_codes_are_one_based_and_sorted() {
        let classes =
            CoverageClasses::from_labels(["Cover 3 Zone", "Cover 1 Man", "Cover 3 Zone"]);
        assert_eq!(classes.len(), 2);
        assert_eq!(classes.code("Cover 1 Man"), Some(1));
        assert_eq!(classes.code("Cover 3 Zone"), Some(2));
        assert_eq!(classes.code("Prevent Zone"), None);
        assert_eq!(classes.name(2), Some("Cover 3 Zone"));
        assert_eq!(classes.name(0), None);
        assert_eq!(classes.name(3), None);
    }

    #[test]
    fn test_default_config_round_trips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.training.folds, 5);
        assert_eq!(parsed.training.epochs, 50);
        assert_eq!(parsed.predict.deployment, Deployment::Ensemble);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_single_fold() {
        let mut config = Config::default();
        config.training.folds = 1;
        assert!(matches!(config.validate(), Err(CoverageError::Config(_))));
    }
}
