//! Permutation-invariant coverage classifier
//!
//! Architecture:
//!   [batch, 13, 11 defenders, 5 offenders]
//!     → 1×1 Conv2d 13→128→160→128 (ReLU)        per (defender, offender) cell
//!     → 0.7·avg + 0.3·max over offenders          [batch, 128, 11]
//!     → BN → Conv1d(k=1) 128→160 → ReLU → BN → 160→96 → ReLU → BN → 96→96 → ReLU → BN
//!     → 0.7·avg + 0.3·max over defenders          [batch, 96]
//!     → Linear 96→96 → BN → ReLU → Linear 96→256 → ReLU → BN → LayerNorm → Dropout
//!     → Linear 256→classes (logits)
//!
//! Every convolution has a unit kernel and both pooling steps are symmetric, so
//! the output does not depend on the order of defender slots or offender slots.
//! Zero padding and arbitrary slot assignment upstream rely on this.

use burn::module::Module;
use burn::nn::conv::{Conv1d, Conv1dConfig, Conv2d, Conv2dConfig};
use burn::nn::{
    BatchNorm, BatchNormConfig, Dropout, DropoutConfig, LayerNorm, LayerNormConfig, Linear,
    LinearConfig,
};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::activation::{relu, softmax};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::features::{mirror_batch, RelativeFeatures};
use crate::{CoverageError, Result};

/// Weight of average pooling in the dual pool
const AVG_POOL_WEIGHT: f32 = 0.7;
/// Weight of max pooling in the dual pool
const MAX_POOL_WEIGHT: f32 = 0.3;

/// Configuration for the coverage classifier
#[derive(Debug, Clone)]
pub struct CoverageNetConfig {
    /// Feature channels per (defender, offender) cell
    pub num_features: usize,
    /// Number of coverage classes
    pub num_classes: usize,
    /// Dropout rate before the output layer
    pub dropout: f64,
}

impl CoverageNetConfig {
    pub fn new(num_classes: usize) -> Self {
        CoverageNetConfig {
            num_features: RelativeFeatures::DIM,
            num_classes,
            dropout: 0.3,
        }
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }
}

/// Weighted average + max pooling over `dim`, keeping the dimension
fn dual_pool<B: Backend, const D: usize>(x: Tensor<B, D>, dim: usize) -> Tensor<B, D> {
    x.clone().mean_dim(dim) * AVG_POOL_WEIGHT + x.max_dim(dim) * MAX_POOL_WEIGHT
}

/// Batch norm over `[batch, features]`
fn norm_features<B: Backend>(norm: &BatchNorm<B, 1>, x: Tensor<B, 2>) -> Tensor<B, 2> {
    norm.forward(x.unsqueeze_dim::<3>(2)).squeeze::<2>(2)
}

/// Coverage-scheme classifier over play tensors
#[derive(Module, Debug)]
pub struct CoverageNet<B: Backend> {
    pair_conv1: Conv2d<B>,
    pair_conv2: Conv2d<B>,
    pair_conv3: Conv2d<B>,
    def_norm0: BatchNorm<B, 1>,
    def_conv1: Conv1d<B>,
    def_norm1: BatchNorm<B, 1>,
    def_conv2: Conv1d<B>,
    def_norm2: BatchNorm<B, 1>,
    def_conv3: Conv1d<B>,
    def_norm3: BatchNorm<B, 1>,
    fc1: Linear<B>,
    fc1_norm: BatchNorm<B, 1>,
    fc2: Linear<B>,
    fc2_norm: BatchNorm<B, 1>,
    layer_norm: LayerNorm<B>,
    dropout: Dropout,
    classifier: Linear<B>,
    num_classes: usize,
}

impl<B: Backend> CoverageNet<B> {
    /// Create a freshly initialized classifier
    pub fn new(device: &B::Device, config: &CoverageNetConfig) -> Self {
        let pair_conv = |input: usize, output: usize| -> Conv2d<B> {
            Conv2dConfig::new([input, output], [1, 1]).init(device)
        };
        let def_conv = |input: usize, output: usize| -> Conv1d<B> {
            Conv1dConfig::new(input, output, 1).init(device)
        };

        CoverageNet {
            pair_conv1: pair_conv(config.num_features, 128),
            pair_conv2: pair_conv(128, 160),
            pair_conv3: pair_conv(160, 128),
            def_norm0: BatchNormConfig::new(128).init(device),
            def_conv1: def_conv(128, 160),
            def_norm1: BatchNormConfig::new(160).init(device),
            def_conv2: def_conv(160, 96),
            def_norm2: BatchNormConfig::new(96).init(device),
            def_conv3: def_conv(96, 96),
            def_norm3: BatchNormConfig::new(96).init(device),
            fc1: LinearConfig::new(96, 96).init(device),
            fc1_norm: BatchNormConfig::new(96).init(device),
            fc2: LinearConfig::new(96, 256).init(device),
            fc2_norm: BatchNormConfig::new(256).init(device),
            layer_norm: LayerNormConfig::new(256).init(device),
            dropout: DropoutConfig::new(config.dropout).init(),
            classifier: LinearConfig::new(256, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Play tensors [batch, features, defenders, offenders]
    ///
    /// # Returns
    /// Class logits [batch, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = relu(self.pair_conv1.forward(x));
        let x = relu(self.pair_conv2.forward(x));
        let x = relu(self.pair_conv3.forward(x));

        // collapse offenders: [batch, 128, defenders]
        let x = dual_pool(x, 3).squeeze::<3>(3);

        let x = relu(self.def_conv1.forward(self.def_norm0.forward(x)));
        let x = relu(self.def_conv2.forward(self.def_norm1.forward(x)));
        let x = relu(self.def_conv3.forward(self.def_norm2.forward(x)));
        let x = self.def_norm3.forward(x);

        // collapse defenders: [batch, 96]
        let x = dual_pool(x, 2).squeeze::<2>(2);

        let x = relu(norm_features(&self.fc1_norm, self.fc1.forward(x)));
        let x = relu(self.fc2.forward(x));
        let x = norm_features(&self.fc2_norm, x);
        let x = self.layer_norm.forward(x);
        let x = self.dropout.forward(x);
        self.classifier.forward(x)
    }

    /// Class probabilities averaged over the input and its lateral mirror
    pub fn forward_tta(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let original = softmax(self.forward(x.clone()), 1);
        let mirrored = softmax(self.forward(mirror_batch(x)), 1);
        (original + mirrored) * 0.5
    }

    /// Save model to file
    pub fn save(&self, path: &str) -> Result<()> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        recorder
            .record(self.clone().into_record(), path.into())
            .map_err(|e| CoverageError::Checkpoint(format!("saving {}: {}", path, e)))
    }

    /// Load model from file
    pub fn load(device: &B::Device, path: &str, config: &CoverageNetConfig) -> Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let record = recorder
            .load(path.into(), device)
            .map_err(|e| CoverageError::Checkpoint(format!("loading {}: {}", path, e)))?;

        let model = Self::new(device, config);
        Ok(model.load_record(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{MAX_DEFENDERS, MAX_OFFENDERS};
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, ElementConversion, Int};

    type TestBackend = NdArray<f32>;

    fn random_batch(batch: usize) -> Tensor<TestBackend, 4> {
        let device = Default::default();
        Tensor::random(
            [batch, RelativeFeatures::DIM, MAX_DEFENDERS, MAX_OFFENDERS],
            Distribution::Normal(0.0, 1.0),
            &device,
        )
    }

    fn max_abs_diff(a: Tensor<TestBackend, 2>, b: Tensor<TestBackend, 2>) -> f32 {
        (a - b).abs().max().into_scalar().elem()
    }

    #[test]
    fn test_output_shape() {
        let device = Default::default();
        let model = CoverageNet::<TestBackend>::new(&device, &CoverageNetConfig::new(4));
        let logits = model.forward(random_batch(3));
        assert_eq!(logits.dims(), [3, 4]);
        assert_eq!(model.num_classes(), 4);
    }

    #[test]
    fn test_invariant_to_defender_and_offender_order() {
        let device = Default::default();
        let model = CoverageNet::<TestBackend>::new(&device, &CoverageNetConfig::new(3));
        let x = random_batch(2);

        let defender_order =
            Tensor::<TestBackend, 1, Int>::from_ints([4, 10, 0, 7, 1, 9, 2, 8, 3, 6, 5], &device);
        let offender_order = Tensor::<TestBackend, 1, Int>::from_ints([3, 1, 4, 0, 2], &device);
        let permuted = x.clone().select(2, defender_order).select(3, offender_order);

        let original = softmax(model.forward(x), 1);
        let shuffled = softmax(model.forward(permuted), 1);
        assert!(max_abs_diff(original, shuffled) < 1e-5);
    }

    #[test]
    fn test_inference_is_deterministic() {
        let device = Default::default();
        let model = CoverageNet::<TestBackend>::new(&device, &CoverageNetConfig::new(3));
        let x = random_batch(5);
        let first = model.forward(x.clone());
        let second = model.forward(x);
        assert_eq!(max_abs_diff(first, second), 0.0);
    }

    #[test]
    fn test_tta_agrees_for_padded_play_and_its_mirror() {
        let device = Default::default();
        let model = CoverageNet::<TestBackend>::new(&device, &CoverageNetConfig::new(3));

        // 4 defenders x 2 offenders, the rest padding
        let mask: Vec<f32> = (0..MAX_DEFENDERS * MAX_OFFENDERS)
            .map(|i| {
                let (d, o) = (i / MAX_OFFENDERS, i % MAX_OFFENDERS);
                if d < 4 && o < 2 {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        let mask = Tensor::<TestBackend, 1>::from_floats(mask.as_slice(), &device)
            .reshape([1, 1, MAX_DEFENDERS, MAX_OFFENDERS]);
        let x = random_batch(2) * mask;

        let mirrored = mirror_batch(x.clone());
        let padding: f32 = mirrored
            .clone()
            .slice([0..2, 0..RelativeFeatures::DIM, 4..MAX_DEFENDERS, 0..MAX_OFFENDERS])
            .abs()
            .sum()
            .into_scalar()
            .elem();
        assert_eq!(padding, 0.0);

        let original = model.forward_tta(x);
        let flipped = model.forward_tta(mirrored);
        assert!(max_abs_diff(original, flipped) < 1e-4);
    }

    #[test]
    fn test_tta_returns_probabilities() {
        let device = Default::default();
        let model = CoverageNet::<TestBackend>::new(&device, &CoverageNetConfig::new(5));
        let probs = model.forward_tta(random_batch(4));
        let sums = probs.sum_dim(1).into_data();
        for sum in sums.as_slice::<f32>().unwrap() {
            assert!((sum - 1.0).abs() < 1e-5, "row sums to {}", sum);
        }
    }

    #[test]
    fn test_save_and_load() {
        let device = Default::default();
        let config = CoverageNetConfig::new(2);
        let model = CoverageNet::<TestBackend>::new(&device, &config);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("net");
        let path = path.to_str().unwrap();

        model.save(path).unwrap();
        let loaded = CoverageNet::<TestBackend>::load(&device, path, &config).unwrap();

        let x = random_batch(2);
        assert!(max_abs_diff(model.forward(x.clone()), loaded.forward(x)) < 1e-6);
    }

    #[test]
    fn test_load_missing_file_is_checkpoint_error() {
        let device = Default::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing");
        let result =
            CoverageNet::<TestBackend>::load(&device, path.to_str().unwrap(), &CoverageNetConfig::new(2));
        assert!(matches!(result, Err(CoverageError::Checkpoint(_))));
    }
}
