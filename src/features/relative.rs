//! Defender-vs-offender relative features
//!
//! Each (defender, offender) pair in a frame is described by the defender's
//! own state plus the offender-minus-defender differences.

use crate::data::tracking::ParticipantRecord;
use crate::{CoverageError, PlayKey, Result, TeamSide};

/// Relative features for one (defender, offender) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelativeFeatures {
    /// Defender distance from the line of scrimmage
    pub def_dist_from_los: f32,
    /// Defender lateral position
    pub def_y: f32,
    pub def_v_x: f32,
    pub def_v_y: f32,
    pub def_a_x: f32,
    pub def_a_y: f32,
    /// Defender orientation toward the quarterback, in [0, 1]
    pub def_facing_qb: f32,
    pub d_x: f32,
    pub d_y: f32,
    pub d_v_x: f32,
    pub d_v_y: f32,
    pub d_a_x: f32,
    pub d_a_y: f32,
}

impl RelativeFeatures {
    /// Dimension of feature vector
    pub const DIM: usize = 13;

    /// Channel holding the defender's raw lateral position
    pub const Y_POSITION: usize = 1;

    /// Channels holding signed lateral quantities
    pub const LATERAL: [usize; 5] = [3, 5, 8, 10, 12];

    /// Features of `defender` relative to `offender`
    pub fn between(defender: &ParticipantRecord, offender: &ParticipantRecord) -> Self {
        RelativeFeatures {
            def_dist_from_los: defender.dist_from_los,
            def_y: defender.y,
            def_v_x: defender.v_x,
            def_v_y: defender.v_y,
            def_a_x: defender.a_x,
            def_a_y: defender.a_y,
            def_facing_qb: defender.facing_qb,
            d_x: offender.x - defender.x,
            d_y: offender.y - defender.y,
            d_v_x: offender.v_x - defender.v_x,
            d_v_y: offender.v_y - defender.v_y,
            d_a_x: offender.a_x - defender.a_x,
            d_a_y: offender.a_y - defender.a_y,
        }
    }

    /// Convert to a fixed-order array
    pub fn to_array(&self) -> [f32; Self::DIM] {
        [
            self.def_dist_from_los,
            self.def_y,
            self.def_v_x,
            self.def_v_y,
            self.def_a_x,
            self.def_a_y,
            self.def_facing_qb,
            self.d_x,
            self.d_y,
            self.d_v_x,
            self.d_v_y,
            self.d_a_x,
            self.d_a_y,
        ]
    }
}

/// Relative features for every pair in a play, grouped by defender
#[derive(Debug, Clone)]
pub struct RelativeFeatureTable {
    pub play: PlayKey,
    pub defenders: usize,
    pub offenders: usize,
    /// Row `d * offenders + o` holds defender `d` vs offender `o`
    pub rows: Vec<RelativeFeatures>,
}

impl RelativeFeatureTable {
    pub fn get(&self, defender: usize, offender: usize) -> Option<&RelativeFeatures> {
        if defender >= self.defenders || offender >= self.offenders {
            return None;
        }
        self.rows.get(defender * self.offenders + offender)
    }
}

/// Build the pairwise feature table for one play at one frame.
///
/// Fails if either side of the ball is absent, since relative features are
/// undefined without both.
pub fn build_relative_features(
    play: PlayKey,
    frame_id: u32,
    participants: &[ParticipantRecord],
) -> Result<RelativeFeatureTable> {
    let defense: Vec<&ParticipantRecord> = participants
        .iter()
        .filter(|p| p.side == TeamSide::Defense)
        .collect();
    let offense: Vec<&ParticipantRecord> = participants
        .iter()
        .filter(|p| p.side == TeamSide::Offense)
        .collect();

    if defense.is_empty() {
        return Err(CoverageError::EmptyRoster {
            play,
            side: TeamSide::Defense,
            frame_id,
        });
    }
    if offense.is_empty() {
        return Err(CoverageError::EmptyRoster {
            play,
            side: TeamSide::Offense,
            frame_id,
        });
    }

    let rows = defense
        .iter()
        .flat_map(|d| offense.iter().map(move |o| RelativeFeatures::between(d, o)))
        .collect();

    Ok(RelativeFeatureTable {
        play,
        defenders: defense.len(),
        offenders: offense.len(),
        rows,
    })
}
