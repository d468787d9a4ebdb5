//! Tracking frame loader
//!
//! Reads one game-week of per-player, per-frame tracking samples and the
//! coverage labels, joins them on play, and drops unlabeled plays.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::{CoverageClasses, PlayKey, Result, TeamSide};

/// One player at one frame of one play
#[derive(Debug, Clone, PartialEq)]
pub struct ParticipantRecord {
    pub nfl_id: Option<u64>,
    pub side: TeamSide,
    pub x: f32,
    pub y: f32,
    pub v_x: f32,
    pub v_y: f32,
    pub a_x: f32,
    pub a_y: f32,
    /// Orientation angle in degrees
    pub orientation: f32,
    /// How squarely the player faces the quarterback, in [0, 1]
    pub facing_qb: f32,
    /// Distance from the line of scrimmage (yards)
    pub dist_from_los: f32,
}

/// A labeled play at the frame its tensor is built from
#[derive(Debug, Clone)]
pub struct Play {
    pub key: PlayKey,
    pub label: String,
    pub frame_id: u32,
    pub participants: Vec<ParticipantRecord>,
}

/// A play without a label, for inference on unlabeled data
#[derive(Debug, Clone)]
pub struct UnlabeledPlay {
    pub key: PlayKey,
    pub frame_id: u32,
    pub participants: Vec<ParticipantRecord>,
}

/// Raw tracking CSV row
#[derive(Debug, Deserialize)]
struct TrackingRow {
    #[serde(rename = "gameId")]
    game_id: u64,
    #[serde(rename = "playId")]
    play_id: u32,
    #[serde(rename = "frameId")]
    frame_id: u32,
    #[serde(rename = "nflId")]
    nfl_id: Option<u64>,
    side: TeamSide,
    x: f32,
    y: f32,
    v_x: f32,
    v_y: f32,
    a_x: f32,
    a_y: f32,
    o: f32,
    facing_qb: f32,
    dist_from_los: f32,
}

impl TrackingRow {
    fn into_record(self) -> ParticipantRecord {
        ParticipantRecord {
            nfl_id: self.nfl_id,
            side: self.side,
            x: self.x,
            y: self.y,
            v_x: self.v_x,
            v_y: self.v_y,
            a_x: self.a_x,
            a_y: self.a_y,
            orientation: self.o,
            facing_qb: self.facing_qb.clamp(0.0, 1.0),
            dist_from_los: self.dist_from_los,
        }
    }
}

/// Raw label CSV row
#[derive(Debug, Deserialize)]
struct LabelRow {
    #[serde(rename = "gameId")]
    game_id: u64,
    #[serde(rename = "playId")]
    play_id: u32,
    coverage: Option<String>,
}

/// Result of loading one week
#[derive(Debug, Clone)]
pub struct LoadedWeek {
    pub plays: Vec<Play>,
    pub classes: CoverageClasses,
    /// Plays present in tracking data with no label
    pub dropped_unlabeled: usize,
}

impl LoadedWeek {
    /// Number of plays per class, in class order
    pub fn class_counts(&self) -> Vec<(String, usize)> {
        self.classes
            .names()
            .iter()
            .map(|name| {
                let count = self.plays.iter().filter(|p| &p.label == name).count();
                (name.clone(), count)
            })
            .collect()
    }
}

/// Loader for tracking + label files
#[derive(Debug, Clone, Default)]
pub struct TrackingLoader {
    frame_id: Option<u32>,
}

impl TrackingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this frame of every play instead of the earliest one
    pub fn with_frame(mut self, frame_id: Option<u32>) -> Self {
        self.frame_id = frame_id;
        self
    }

    /// Load tracking and labels from CSV files
    pub fn load_paths(&self, tracking: &Path, labels: &Path) -> Result<LoadedWeek> {
        log::info!(
            "Loading tracking from {} and labels from {}",
            tracking.display(),
            labels.display()
        );
        let tracking = std::fs::File::open(tracking)?;
        let labels = std::fs::File::open(labels)?;
        self.load(tracking, labels)
    }

    /// Load tracking and labels from CSV readers
    pub fn load(&self, tracking: impl Read, labels: impl Read) -> Result<LoadedWeek> {
        let labels = read_labels(labels)?;
        let frames = self.read_frames(tracking)?;

        let mut plays = Vec::with_capacity(frames.len());
        let mut dropped_unlabeled = 0;

        for (key, (frame_id, participants)) in frames {
            match labels.get(&key) {
                Some(label) => plays.push(Play {
                    key,
                    label: label.clone(),
                    frame_id,
                    participants,
                }),
                None => {
                    log::debug!("Dropping unlabeled play {}", key);
                    dropped_unlabeled += 1;
                }
            }
        }

        if dropped_unlabeled > 0 {
            log::warn!("Dropped {} plays without a coverage label", dropped_unlabeled);
        }

        let classes = CoverageClasses::from_labels(plays.iter().map(|p| p.label.as_str()));
        log::info!("Loaded {} labeled plays across {} classes", plays.len(), classes.len());

        Ok(LoadedWeek {
            plays,
            classes,
            dropped_unlabeled,
        })
    }

    /// Load tracking only, keeping every play
    pub fn load_unlabeled(&self, tracking: impl Read) -> Result<Vec<UnlabeledPlay>> {
        Ok(self
            .read_frames(tracking)?
            .into_iter()
            .map(|(key, (frame_id, participants))| UnlabeledPlay {
                key,
                frame_id,
                participants,
            })
            .collect())
    }

    /// Group tracking rows into one selected frame per play
    fn read_frames(
        &self,
        tracking: impl Read,
    ) -> Result<BTreeMap<PlayKey, (u32, Vec<ParticipantRecord>)>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(tracking);

        let mut by_play: BTreeMap<PlayKey, BTreeMap<u32, Vec<ParticipantRecord>>> = BTreeMap::new();
        let mut rows = 0usize;

        for row in reader.deserialize() {
            let row: TrackingRow = row?;
            rows += 1;
            if let Some(wanted) = self.frame_id {
                if row.frame_id != wanted {
                    continue;
                }
            }
            let key = PlayKey::new(row.game_id, row.play_id);
            let frame_id = row.frame_id;
            by_play
                .entry(key)
                .or_default()
                .entry(frame_id)
                .or_default()
                .push(row.into_record());
        }

        log::debug!("Read {} tracking rows covering {} plays", rows, by_play.len());

        Ok(by_play
            .into_iter()
            .filter_map(|(key, frames)| {
                frames
                    .into_iter()
                    .next()
                    .map(|(frame_id, participants)| (key, (frame_id, participants)))
            })
            .collect())
    }
}

/// Read the play -> coverage label mapping; blank labels count as missing
fn read_labels(labels: impl Read) -> Result<HashMap<PlayKey, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(labels);

    let mut map = HashMap::new();
    for row in reader.deserialize() {
        let row: LabelRow = row?;
        if let Some(coverage) = row.coverage.filter(|c| !c.is_empty()) {
            map.insert(PlayKey::new(row.game_id, row.play_id), coverage);
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACKING: &str = "\
gameId,playId,frameId,nflId,side,x,y,v_x,v_y,a_x,a_y,o,facing_qb,dist_from_los
1,10,2,100,offense,30.0,20.0,1.0,0.5,0.1,0.0,90.0,0.0,-1.0
1,10,2,200,defense,35.0,22.0,-1.0,0.0,0.0,0.2,270.0,0.9,4.0
1,10,1,100,offense,29.0,20.0,1.0,0.5,0.1,0.0,90.0,0.0,-1.0
1,10,1,200,defense,34.0,22.0,-1.0,0.0,0.0,0.2,270.0,1.4,3.0
1,11,1,100,offense,40.0,25.0,0.0,0.0,0.0,0.0,90.0,0.1,-1.0
1,11,1,200,defense,45.0,25.0,0.0,0.0,0.0,0.0,270.0,0.8,5.0
2,5,1,,offense,10.0,10.0,0.0,0.0,0.0,0.0,90.0,0.0,-1.0
2,5,1,300,defense,15.0,10.0,0.0,0.0,0.0,0.0,270.0,0.5,5.0
";

    const LABELS: &str = "\
gameId,playId,coverage
1,10,Cover 3 Zone
1,11,
2,5,Cover 1 Man
";

    #[test]
    fn test_load_joins_labels_and_drops_unlabeled() {
        let week = TrackingLoader::new()
            .load(TRACKING.as_bytes(), LABELS.as_bytes())
            .unwrap();

        assert_eq!(week.plays.len(), 2);
        assert_eq!(week.dropped_unlabeled, 1);
        assert_eq!(week.classes.names(), ["Cover 1 Man", "Cover 3 Zone"]);

        let play = week
            .plays
            .iter()
            .find(|p| p.key == PlayKey::new(1, 10))
            .unwrap();
        assert_eq!(play.label, "Cover 3 Zone");
        assert_eq!(play.frame_id, 1);
        assert_eq!(play.participants.len(), 2);
        // facing_qb is clamped into [0, 1]
        let defender = play
            .participants
            .iter()
            .find(|p| p.side == TeamSide::Defense)
            .unwrap();
        assert_eq!(defender.facing_qb, 1.0);
        assert_eq!(defender.dist_from_los, 3.0);
    }

    #[test]
    fn test_load_selects_configured_frame() {
        let week = TrackingLoader::new()
            .with_frame(Some(2))
            .load(TRACKING.as_bytes(), LABELS.as_bytes())
            .unwrap();

        assert_eq!(week.plays.len(), 1);
        assert_eq!(week.plays[0].key, PlayKey::new(1, 10));
        assert_eq!(week.plays[0].frame_id, 2);
        assert_eq!(week.plays[0].participants[0].x, 30.0);
    }

    #[test]
    fn test_missing_nfl_id_is_allowed() {
        let plays = TrackingLoader::new()
            .load_unlabeled(TRACKING.as_bytes())
            .unwrap();
        assert_eq!(plays.len(), 3);
        let ball_play = plays.iter().find(|p| p.key.game_id == 2).unwrap();
        assert!(ball_play.participants.iter().any(|p| p.nfl_id.is_none()));
    }

    #[test]
    fn test_class_counts() {
        let week = TrackingLoader::new()
            .load(TRACKING.as_bytes(), LABELS.as_bytes())
            .unwrap();
        assert_eq!(
            week.class_counts(),
            vec![("Cover 1 Man".to_string(), 1), ("Cover 3 Zone".to_string(), 1)]
        );
    }
}
