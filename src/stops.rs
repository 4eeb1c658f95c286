//! Stop detection from the speed profile.
//!
//! A sample where the vehicle slows down (`delta_speed < 0`) opens a
//! candidate stop. The next few samples are searched for the moment it
//! accelerates again; the candidate is kept when the time between the two
//! lies strictly inside the dwell window. Works on a cleaned trajectory,
//! since `delta_speed` is filled in by the cleaner.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{StopEvent, Trajectory};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecelParams {
    /// Samples searched for the restart, the candidate included.
    pub lookahead: usize,
    /// `delta_speed` above which the vehicle counts as moving off.
    pub go_threshold: f64,
    /// Exclusive bounds on the stop duration, seconds.
    pub min_dwell: f64,
    pub max_dwell: f64,
}

impl Default for DecelParams {
    fn default() -> Self {
        Self {
            lookahead: 5,
            go_threshold: 0.005,
            min_dwell: 3.0,
            max_dwell: 30.0,
        }
    }
}

/// Every slowdown followed by a restart within the dwell window, reported
/// at the slowdown sample in trajectory order.
pub fn find_decel_stops(trajectory: &Trajectory, params: &DecelParams) -> Vec<StopEvent> {
    let samples = trajectory.samples();

    let stops: Vec<StopEvent> = samples
        .iter()
        .enumerate()
        .filter(|(_, s)| s.delta_speed.is_some_and(|d| d < 0.0))
        .filter_map(|(i, s)| {
            let go_time = samples
                .iter()
                .skip(i)
                .take(params.lookahead)
                .find(|next| next.delta_speed.is_some_and(|d| d > params.go_threshold))
                .map_or(s.time, |next| next.time);

            let dwell = go_time - s.time;
            (dwell > params.min_dwell && dwell < params.max_dwell).then(|| StopEvent {
                time: s.time,
                lon: s.lon,
                lat: s.lat,
                speed: s.speed,
            })
        })
        .collect();

    debug!(points = samples.len(), stops = stops.len(), "Deceleration scan finished");
    stops
}
