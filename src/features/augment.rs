//! Lateral mirror augmentation
//!
//! Reflects a play across the field's lengthwise centerline: signed lateral
//! channels are negated and the lateral position becomes `FIELD_WIDTH - y`.
//! Padded slots (zero in every channel) are left at zero.
//! The same per-channel table drives the host-side [`PlayTensor::mirrored`]
//! and the batched [`mirror_batch`], so training-time augmentation and
//! test-time augmentation agree exactly.
//!
//! [`PlayTensor::mirrored`]: super::tensor::PlayTensor::mirrored

use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use super::relative::RelativeFeatures;

/// Lateral extent of the playing field in yards
pub const FIELD_WIDTH: f32 = 53.3;

/// Per-channel multiplier applied when mirroring: -1 for the lateral position
/// and every signed lateral channel
pub const MIRROR_SCALE: [f32; RelativeFeatures::DIM] = {
    let mut scale = [1.0; RelativeFeatures::DIM];
    scale[RelativeFeatures::Y_POSITION] = -1.0;
    let mut i = 0;
    while i < RelativeFeatures::LATERAL.len() {
        scale[RelativeFeatures::LATERAL[i]] = -1.0;
        i += 1;
    }
    scale
};

/// Per-channel offset added to occupied slots after scaling when mirroring
pub const MIRROR_OFFSET: [f32; RelativeFeatures::DIM] = {
    let mut offset = [0.0; RelativeFeatures::DIM];
    offset[RelativeFeatures::Y_POSITION] = FIELD_WIDTH;
    offset
};

/// Mirror a batch of play tensors `[batch, channels, defenders, offenders]`
pub fn mirror_batch<B: Backend>(features: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = features.device();
    let scale = Tensor::<B, 1>::from_floats(MIRROR_SCALE, &device)
        .reshape([1, RelativeFeatures::DIM, 1, 1]);
    let offset = Tensor::<B, 1>::from_floats(MIRROR_OFFSET, &device)
        .reshape([1, RelativeFeatures::DIM, 1, 1]);
    // [batch, 1, defenders, offenders]: 1 for real pairs, 0 for padding
    let occupied = features
        .clone()
        .abs()
        .sum_dim(1)
        .greater_elem(0.0)
        .float();
    features * scale + offset * occupied
}
