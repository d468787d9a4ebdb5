//! Fixed-shape play tensors
//!
//! Lays a play's pairwise features into a zero-padded
//! `[channel, defender slot, offender slot]` array.

use super::augment;
use super::relative::{RelativeFeatureTable, RelativeFeatures};
use crate::{CoverageError, Result, TeamSide};

/// Defender slot capacity
pub const MAX_DEFENDERS: usize = 11;

/// Eligible offensive player slot capacity
pub const MAX_OFFENDERS: usize = 5;

/// Feature tensor for one play, row-major `[CHANNELS, MAX_DEFENDERS, MAX_OFFENDERS]`.
///
/// Slots past the play's real participant counts are exactly zero. Slot order
/// carries no meaning; the classifier is invariant to it.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayTensor {
    data: Vec<f32>,
    defenders: usize,
    offenders: usize,
}

impl PlayTensor {
    pub const CHANNELS: usize = RelativeFeatures::DIM;
    pub const LEN: usize = Self::CHANNELS * MAX_DEFENDERS * MAX_OFFENDERS;

    /// All-zero tensor
    pub fn zeros() -> Self {
        PlayTensor {
            data: vec![0.0; Self::LEN],
            defenders: 0,
            offenders: 0,
        }
    }

    /// Wrap raw channel-major data
    pub fn from_raw(data: Vec<f32>, defenders: usize, offenders: usize) -> Option<Self> {
        if data.len() != Self::LEN || defenders > MAX_DEFENDERS || offenders > MAX_OFFENDERS {
            return None;
        }
        Some(PlayTensor {
            data,
            defenders,
            offenders,
        })
    }

    #[inline]
    fn index(channel: usize, defender: usize, offender: usize) -> usize {
        (channel * MAX_DEFENDERS + defender) * MAX_OFFENDERS + offender
    }

    pub fn get(&self, channel: usize, defender: usize, offender: usize) -> f32 {
        self.data[Self::index(channel, defender, offender)]
    }

    pub fn set(&mut self, channel: usize, defender: usize, offender: usize, value: f32) {
        self.data[Self::index(channel, defender, offender)] = value;
    }

    /// Real defender count
    pub fn defenders(&self) -> usize {
        self.defenders
    }

    /// Real offender count
    pub fn offenders(&self) -> usize {
        self.offenders
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Whether the (defender, offender) slot holds a real pair.
    ///
    /// Padded slots are zero in every channel.
    pub fn is_occupied(&self, defender: usize, offender: usize) -> bool {
        (0..Self::CHANNELS).any(|c| self.get(c, defender, offender) != 0.0)
    }

    /// The play mirrored across the field's lateral centerline.
    ///
    /// Padded slots stay zero.
    pub fn mirrored(&self) -> Self {
        let plane = MAX_DEFENDERS * MAX_OFFENDERS;
        let occupied: Vec<f32> = (0..plane)
            .map(|i| {
                let (d, o) = (i / MAX_OFFENDERS, i % MAX_OFFENDERS);
                if self.is_occupied(d, o) {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        let occupied = occupied.as_slice();

        let data = self
            .data
            .chunks_exact(plane)
            .enumerate()
            .flat_map(move |(c, values)| {
                let (scale, offset) = (augment::MIRROR_SCALE[c], augment::MIRROR_OFFSET[c]);
                values
                    .iter()
                    .zip(occupied.iter())
                    .map(move |(v, mask)| v * scale + offset * mask)
            })
            .collect();
        PlayTensor {
            data,
            defenders: self.defenders,
            offenders: self.offenders,
        }
    }
}

/// Lay a pairwise feature table into a play tensor.
///
/// Element `[c, d, o]` is feature `c` of defender `d` against offender `o`.
/// Rosters larger than the slot capacity are rejected.
pub fn assemble(table: &RelativeFeatureTable) -> Result<PlayTensor> {
    if table.defenders > MAX_DEFENDERS {
        return Err(CoverageError::RosterOverflow {
            play: table.play,
            side: TeamSide::Defense,
            count: table.defenders,
            capacity: MAX_DEFENDERS,
        });
    }
    if table.offenders > MAX_OFFENDERS {
        return Err(CoverageError::RosterOverflow {
            play: table.play,
            side: TeamSide::Offense,
            count: table.offenders,
            capacity: MAX_OFFENDERS,
        });
    }
    if table.rows.len() != table.defenders * table.offenders {
        return Err(CoverageError::Parse(format!(
            "play {} has {} feature rows for {}x{} pairs",
            table.play,
            table.rows.len(),
            table.defenders,
            table.offenders
        )));
    }

    let mut tensor = PlayTensor::zeros();
    tensor.defenders = table.defenders;
    tensor.offenders = table.offenders;

    // rows are (defender, offender, channel); the tensor is (channel, defender, offender)
    for (row, features) in table.rows.iter().enumerate() {
        let d = row / table.offenders;
        let o = row % table.offenders;
        for (c, value) in features.to_array().into_iter().enumerate() {
            tensor.set(c, d, o, value);
        }
    }

    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::relative::build_relative_features;
    use crate::features::relative::tests::player;
    use crate::PlayKey;

    fn table_for(defenders: usize, offenders: usize) -> RelativeFeatureTable {
        let mut participants = Vec::new();
        for d in 0..defenders {
            let mut p = player(TeamSide::Defense, 20.0 + d as f32, 5.0 + 3.0 * d as f32);
            p.v_x = 0.5 * d as f32 + 0.25;
            p.dist_from_los = 1.0 + d as f32;
            participants.push(p);
        }
        for o in 0..offenders {
            let mut p = player(TeamSide::Offense, 10.0 - o as f32, 8.0 + 7.0 * o as f32);
            p.v_y = -1.0 - o as f32;
            participants.push(p);
        }
        build_relative_features(PlayKey::new(9, 99), 1, &participants).unwrap()
    }

    #[test]
    fn test_element_matches_pair_feature() {
        let table = table_for(7, 4);
        let tensor = assemble(&table).unwrap();

        for d in 0..7 {
            for o in 0..4 {
                let expected = table.get(d, o).unwrap().to_array();
                for (c, value) in expected.iter().enumerate() {
                    assert_eq!(tensor.get(c, d, o), *value, "mismatch at [{}, {}, {}]", c, d, o);
                }
            }
        }
    }

    #[test]
    fn test_padding_is_exactly_zero() {
        let tensor = assemble(&table_for(7, 4)).unwrap();
        assert_eq!((tensor.defenders(), tensor.offenders()), (7, 4));

        for c in 0..PlayTensor::CHANNELS {
            for d in 0..MAX_DEFENDERS {
                for o in 0..MAX_OFFENDERS {
                    if d >= 7 || o >= 4 {
                        let v = tensor.get(c, d, o);
                        assert!(v == 0.0 && !v.is_nan(), "slot [{}, {}, {}] = {}", c, d, o, v);
                    }
                }
            }
        }
        // the y channel of every real cell is non-zero in this fixture
        assert!(tensor.get(RelativeFeatures::Y_POSITION, 6, 3) != 0.0);
    }

    #[test]
    fn test_full_roster_fits() {
        let tensor = assemble(&table_for(MAX_DEFENDERS, MAX_OFFENDERS)).unwrap();
        assert_eq!(tensor.as_slice().len(), PlayTensor::LEN);
        assert_eq!(tensor.defenders(), MAX_DEFENDERS);
    }

    #[test]
    fn test_roster_overflow_is_rejected() {
        let err = assemble(&table_for(12, 3)).unwrap_err();
        assert!(matches!(
            err,
            CoverageError::RosterOverflow {
                side: TeamSide::Defense,
                count: 12,
                capacity: MAX_DEFENDERS,
                ..
            }
        ));

        let err = assemble(&table_for(4, 6)).unwrap_err();
        assert!(matches!(
            err,
            CoverageError::RosterOverflow {
                side: TeamSide::Offense,
                count: 6,
                ..
            }
        ));
    }

    #[test]
    fn test_from_raw_checks_shape() {
        assert!(PlayTensor::from_raw(vec![0.0; PlayTensor::LEN], 11, 5).is_some());
        assert!(PlayTensor::from_raw(vec![0.0; 10], 1, 1).is_none());
        assert!(PlayTensor::from_raw(vec![0.0; PlayTensor::LEN], 12, 5).is_none());
    }
}
