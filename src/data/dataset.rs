//! Dataset of assembled play tensors for training and evaluation

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor};

use super::tracking::Play;
use crate::features::{assemble, build_relative_features, PlayTensor, MAX_DEFENDERS, MAX_OFFENDERS};
use crate::{CoverageClasses, CoverageError, PlayKey, Result};

/// One labeled play ready for the network
#[derive(Debug, Clone)]
pub struct PlaySample {
    pub play: PlayKey,
    pub tensor: PlayTensor,
    /// 1-based coverage class code
    pub label: u32,
}

/// Labeled play tensors plus the class enumeration they were encoded with
#[derive(Debug, Clone)]
pub struct CoverageDataset {
    samples: Vec<PlaySample>,
    pub classes: CoverageClasses,
}

impl CoverageDataset {
    /// Build features and tensors for every play.
    ///
    /// Any play whose features cannot be built fails the whole dataset.
    pub fn from_plays(plays: &[Play], classes: &CoverageClasses) -> Result<Self> {
        let mut samples = Vec::with_capacity(plays.len());

        for play in plays {
            let label = classes
                .code(&play.label)
                .ok_or_else(|| CoverageError::UnknownClass(play.label.clone()))?;
            let table = build_relative_features(play.key, play.frame_id, &play.participants)?;
            let tensor = assemble(&table)?;
            log::debug!(
                "Play {}: {} defenders x {} offenders, label {}",
                play.key,
                table.defenders,
                table.offenders,
                play.label
            );
            samples.push(PlaySample {
                play: play.key,
                tensor,
                label,
            });
        }

        Ok(Self::from_samples(samples, classes.clone()))
    }

    /// Create dataset directly from pre-computed samples
    pub fn from_samples(samples: Vec<PlaySample>, classes: CoverageClasses) -> Self {
        CoverageDataset { samples, classes }
    }

    /// Dataset restricted to the given sample indices, in that order
    pub fn subset(&self, indices: &[usize]) -> Self {
        let samples = indices
            .iter()
            .filter_map(|&i| self.samples.get(i).cloned())
            .collect();
        Self::from_samples(samples, self.classes.clone())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[PlaySample] {
        &self.samples
    }

    /// 1-based labels in sample order
    pub fn labels(&self) -> Vec<u32> {
        self.samples.iter().map(|s| s.label).collect()
    }

    /// Play tensors in sample order
    pub fn tensors(&self) -> Vec<PlayTensor> {
        self.samples.iter().map(|s| s.tensor.clone()).collect()
    }
}

impl Dataset<PlaySample> for CoverageDataset {
    fn get(&self, index: usize) -> Option<PlaySample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Stack play tensors into a `[batch, channels, defenders, offenders]` tensor
pub fn stack_tensors<B: Backend>(tensors: &[PlayTensor], device: &B::Device) -> Tensor<B, 4> {
    let mut data = Vec::with_capacity(tensors.len() * PlayTensor::LEN);
    for tensor in tensors {
        data.extend_from_slice(tensor.as_slice());
    }
    Tensor::<B, 1>::from_floats(data.as_slice(), device).reshape([
        tensors.len(),
        PlayTensor::CHANNELS,
        MAX_DEFENDERS,
        MAX_OFFENDERS,
    ])
}

/// Batch of play samples
#[derive(Debug, Clone)]
pub struct PlayBatch<B: Backend> {
    /// Play tensors: [batch, channels, defenders, offenders]
    pub features: Tensor<B, 4>,
    /// 0-based class indices: [batch]
    pub targets: Tensor<B, 1, Int>,
}

/// Batcher for creating training batches
#[derive(Clone)]
pub struct PlayBatcher<B: Backend> {
    device: B::Device,
}

impl<B: Backend> PlayBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        PlayBatcher { device }
    }
}

impl<B: Backend> Batcher<B, PlaySample, PlayBatch<B>> for PlayBatcher<B> {
    fn batch(&self, items: Vec<PlaySample>, _device: &B::Device) -> PlayBatch<B> {
        let tensors: Vec<PlayTensor> = items.iter().map(|s| s.tensor.clone()).collect();
        let targets: Vec<i32> = items.iter().map(|s| s.label as i32 - 1).collect();

        PlayBatch {
            features: stack_tensors(&tensors, &self.device),
            targets: Tensor::<B, 1, Int>::from_ints(targets.as_slice(), &self.device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::tracking::ParticipantRecord;
    use crate::TeamSide;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn play(play_id: u32, label: &str, defenders: usize) -> Play {
        let mut participants = Vec::new();
        for d in 0..defenders {
            participants.push(ParticipantRecord {
                nfl_id: Some(d as u64),
                side: TeamSide::Defense,
                x: 20.0,
                y: 10.0 + d as f32,
                v_x: 0.0,
                v_y: 0.0,
                a_x: 0.0,
                a_y: 0.0,
                orientation: 0.0,
                facing_qb: 1.0,
                dist_from_los: 5.0,
            });
        }
        participants.push(ParticipantRecord {
            nfl_id: Some(100),
            side: TeamSide::Offense,
            x: 15.0,
            y: 20.0,
            v_x: 0.0,
            v_y: 0.0,
            a_x: 0.0,
            a_y: 0.0,
            orientation: 0.0,
            facing_qb: 0.0,
            dist_from_los: -1.0,
        });
        Play {
            key: PlayKey::new(1, play_id),
            label: label.to_string(),
            frame_id: 1,
            participants,
        }
    }

    #[test]
    fn test_from_plays_encodes_labels() {
        let plays = vec![play(1, "Cover 3 Zone", 4), play(2, "Cover 1 Man", 6)];
        let classes = CoverageClasses::from_labels(plays.iter().map(|p| p.label.as_str()));
        let dataset = CoverageDataset::from_plays(&plays, &classes).unwrap();

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.labels(), vec![2, 1]);
        assert_eq!(dataset.samples()[1].tensor.defenders(), 6);

        let subset = dataset.subset(&[1]);
        assert_eq!(subset.len(), 1);
        assert_eq!(subset.samples()[0].play, PlayKey::new(1, 2));
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let plays = vec![play(1, "Cover 6 Zone", 4)];
        let classes = CoverageClasses::from_labels(["Cover 3 Zone"]);
        let err = CoverageDataset::from_plays(&plays, &classes).unwrap_err();
        assert!(matches!(err, CoverageError::UnknownClass(_)));
    }

    #[test]
    fn test_play_without_offense_fails_dataset() {
        let mut bad = play(3, "Cover 3 Zone", 4);
        bad.participants.retain(|p| p.side == TeamSide::Defense);
        let classes = CoverageClasses::from_labels(["Cover 3 Zone"]);
        let err = CoverageDataset::from_plays(&[bad], &classes).unwrap_err();
        assert!(matches!(err, CoverageError::EmptyRoster { .. }));
    }

    #[test]
    fn test_batcher_shapes_and_zero_based_targets() {
        let device: <TestBackend as Backend>::Device = Default::default();
        let plays = vec![play(1, "Cover 3 Zone", 4), play(2, "Cover 1 Man", 6)];
        let classes = CoverageClasses::from_labels(plays.iter().map(|p| p.label.as_str()));
        let dataset = CoverageDataset::from_plays(&plays, &classes).unwrap();

        let batch = PlayBatcher::<TestBackend>::new(device.clone())
            .batch(dataset.samples().to_vec(), &device);

        assert_eq!(batch.features.dims(), [2, PlayTensor::CHANNELS, MAX_DEFENDERS, MAX_OFFENDERS]);
        let targets = batch.targets.into_data();
        let targets: Vec<i64> = targets.iter::<i64>().collect();
        assert_eq!(targets, vec![1, 0]);

        // second play, channel 1 (defender y) at defender slot 5
        let features = batch.features.into_data();
        let values: &[f32] = features.as_slice().unwrap();
        let index = PlayTensor::LEN + (MAX_DEFENDERS + 5) * MAX_OFFENDERS;
        assert_eq!(values[index], 15.0);
    }
}
