//! Feature extraction and encoding
//!
//! Converts participant records into model-ready play tensors.

pub mod augment;
pub mod relative;
pub mod tensor;

pub use augment::{mirror_batch, FIELD_WIDTH};
pub use relative::{build_relative_features, RelativeFeatureTable, RelativeFeatures};
pub use tensor::{assemble, PlayTensor, MAX_DEFENDERS, MAX_OFFENDERS};
