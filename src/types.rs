//! Trajectory samples and the events derived from them.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::geo::Coord;

/// One point of a cleaned trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    /// Seconds of day; extended past 86 400 when a log crosses midnight.
    pub time: f64,
    pub lon: f64,
    pub lat: f64,
    /// Miles per hour.
    pub speed: f64,
    /// Compass course in degrees, clockwise from north. Either reported by
    /// the receiver or back-filled by the cleaner.
    pub bearing: Option<f64>,
    /// Change of speed per second relative to the previous sample.
    pub delta_speed: Option<f64>,
}

impl PositionSample {
    pub fn new(time: f64, lon: f64, lat: f64, speed: f64) -> Self {
        Self {
            time,
            lon,
            lat,
            speed,
            bearing: None,
            delta_speed: None,
        }
    }

    pub fn coord(&self) -> Coord {
        Coord::new(self.lon, self.lat)
    }

    fn coord_key(&self) -> (u64, u64) {
        (self.lat.to_bits(), self.lon.to_bits())
    }
}

impl AsRef<PositionSample> for PositionSample {
    fn as_ref(&self) -> &PositionSample {
        self
    }
}

/// Fatal problems found while building a [`Trajectory`].
#[derive(Debug, Error, PartialEq)]
pub enum TrajectoryError {
    #[error(
        "inconsistent trajectory: {samples} samples, {out_of_range} out of range, \
         {non_finite} non-finite, {non_monotonic} out of time order"
    )]
    Structural {
        samples: usize,
        out_of_range: usize,
        non_finite: usize,
        non_monotonic: usize,
    },
}

/// An ordered, validated sequence of [`PositionSample`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trajectory {
    samples: Vec<PositionSample>,
}

impl Trajectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a trajectory, checking coordinate ranges, finiteness and
    /// strictly increasing time.
    ///
    /// # Errors
    ///
    /// Returns [`TrajectoryError::Structural`] with per-field counts if any
    /// sample violates an invariant. No partial trajectory is returned.
    pub fn try_from_samples(samples: Vec<PositionSample>) -> Result<Self, TrajectoryError> {
        let mut out_of_range = 0;
        let mut non_finite = 0;
        let mut non_monotonic = 0;

        for (i, s) in samples.iter().enumerate() {
            if !(s.time.is_finite() && s.lon.is_finite() && s.lat.is_finite() && s.speed.is_finite())
            {
                non_finite += 1;
            } else if !(-90.0..=90.0).contains(&s.lat) || !(-180.0..=180.0).contains(&s.lon) {
                out_of_range += 1;
            }

            if i > 0 && s.time.partial_cmp(&samples[i - 1].time) != Some(std::cmp::Ordering::Greater)
            {
                non_monotonic += 1;
            }
        }

        if out_of_range + non_finite + non_monotonic > 0 {
            return Err(TrajectoryError::Structural {
                samples: samples.len(),
                out_of_range,
                non_finite,
                non_monotonic,
            });
        }

        Ok(Self { samples })
    }

    /// Joins several logs into one sequence for clustering. Time order is
    /// only guaranteed within each constituent trajectory.
    pub fn concat<'a>(parts: impl IntoIterator<Item = &'a Trajectory>) -> Self {
        let samples = parts
            .into_iter()
            .flat_map(|t| t.samples.iter().cloned())
            .collect();
        Self { samples }
    }

    /// Removes every sample whose `(lat, lon)` was already seen, keeping the
    /// first occurrence. Returns the number of samples removed.
    pub fn dedup_coordinates(&mut self) -> usize {
        let before = self.samples.len();
        let mut seen = HashSet::with_capacity(before);
        self.samples.retain(|s| seen.insert(s.coord_key()));
        before - self.samples.len()
    }

    pub fn samples(&self) -> &[PositionSample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<PositionSample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PositionSample> {
        self.samples.iter()
    }

    pub(crate) fn from_samples_unchecked(samples: Vec<PositionSample>) -> Self {
        Self { samples }
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a PositionSample;
    type IntoIter = std::slice::Iter<'a, PositionSample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// A place where the vehicle lingered, represented by a real sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopEvent {
    /// Mean time of the cluster members.
    pub time: f64,
    /// Medoid longitude.
    pub lon: f64,
    /// Medoid latitude.
    pub lat: f64,
    /// Mean speed of the cluster members.
    pub speed: f64,
}

/// A change of direction detected at a trajectory sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    pub lon: f64,
    pub lat: f64,
    pub speed: f64,
    pub smoothed_bearing_delta: f64,
    pub is_right_turn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Stop,
    Turn,
    RouteVertex,
}

/// The flat record handed to a map-markup exporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkupRecord {
    pub name: String,
    pub lon: f64,
    pub lat: f64,
    pub speed: f64,
    pub category: EventCategory,
}

impl From<&StopEvent> for MarkupRecord {
    fn from(stop: &StopEvent) -> Self {
        Self {
            name: "Stop".to_string(),
            lon: stop.lon,
            lat: stop.lat,
            speed: stop.speed,
            category: EventCategory::Stop,
        }
    }
}

impl From<&TurnEvent> for MarkupRecord {
    fn from(turn: &TurnEvent) -> Self {
        let name = if turn.is_right_turn {
            "Right Turn"
        } else {
            "Left Turn"
        };
        Self {
            name: name.to_string(),
            lon: turn.lon,
            lat: turn.lat,
            speed: turn.speed,
            category: EventCategory::Turn,
        }
    }
}

impl From<&PositionSample> for MarkupRecord {
    fn from(sample: &PositionSample) -> Self {
        Self {
            name: "Route".to_string(),
            lon: sample.lon,
            lat: sample.lat,
            speed: sample.speed,
            category: EventCategory::RouteVertex,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: f64, lon: f64, lat: f64) -> PositionSample {
        PositionSample::new(time, lon, lat, 20.0)
    }

    #[test]
    fn test_try_from_samples_accepts_valid_sequence() {
        let traj = Trajectory::try_from_samples(vec![
            sample(1.0, -77.0, 43.0),
            sample(2.0, -77.1, 43.1),
        ])
        .unwrap();
        assert_eq!(traj.len(), 2);
    }

    #[test]
    fn test_try_from_samples_reports_counts() {
        let err = Trajectory::try_from_samples(vec![
            sample(1.0, -77.0, 43.0),
            sample(1.0, -77.0, 95.0),
            sample(3.0, 200.0, 43.0),
            sample(4.0, f64::NAN, 43.0),
        ])
        .unwrap_err();

        assert_eq!(
            err,
            TrajectoryError::Structural {
                samples: 4,
                out_of_range: 2,
                non_finite: 1,
                non_monotonic: 1,
            }
        );
    }

    #[test]
    fn test_dedup_coordinates_keeps_first_and_is_idempotent() {
        let mut traj = Trajectory::from_samples_unchecked(vec![
            sample(1.0, -77.0, 43.0),
            sample(2.0, -77.1, 43.1),
            sample(3.0, -77.0, 43.0),
            sample(4.0, -77.2, 43.2),
        ]);

        assert_eq!(traj.dedup_coordinates(), 1);
        let once = traj.clone();
        assert_eq!(traj.dedup_coordinates(), 0);
        assert_eq!(traj, once);

        let times: Vec<f64> = traj.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 4.0]);
    }

    #[test]
    fn test_concat_preserves_order() {
        let a = Trajectory::from_samples_unchecked(vec![sample(5.0, 0.0, 0.0)]);
        let b = Trajectory::from_samples_unchecked(vec![sample(1.0, 1.0, 1.0)]);
        let joined = Trajectory::concat([&a, &b]);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined.samples()[0].time, 5.0);
    }

    #[test]
    fn test_markup_record_names() {
        let turn = TurnEvent {
            lon: 1.0,
            lat: 2.0,
            speed: 3.0,
            smoothed_bearing_delta: -45.0,
            is_right_turn: false,
        };
        let record = MarkupRecord::from(&turn);
        assert_eq!(record.name, "Left Turn");
        assert_eq!(record.category, EventCategory::Turn);
    }
}
