//! Data ingestion and batching
//!
//! Tracking/label CSV loading and the burn dataset over assembled play tensors.

pub mod dataset;
pub mod tracking;

pub use dataset::{CoverageDataset, PlayBatch, PlayBatcher, PlaySample};
pub use tracking::{LoadedWeek, ParticipantRecord, Play, TrackingLoader, UnlabeledPlay};
