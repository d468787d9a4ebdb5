//! Neural network architecture
//!
//! A single fixed architecture: a permutation-invariant convolutional
//! classifier over defender × offender play tensors.

pub mod coverage_net;

pub use coverage_net::{CoverageNet, CoverageNetConfig};
