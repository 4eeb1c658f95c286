//! Turn detection from smoothed bearing changes.
//!
//! For each interior point the bearing change is averaged over two spans
//! (`b[i+1] - b[i]` and `b[i+1] - b[i-1]`). Spans whose magnitude exceeds
//! the artifact limit are zeroed so wrap-around at ±180° and receiver noise
//! cannot dominate. A point is a turn when the smoothed change lies strictly
//! between the minimum and maximum thresholds; its sign gives the
//! handedness.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::planar_bearing;
use crate::types::{PositionSample, Trajectory, TurnEvent};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnThresholds {
    /// Exclusive lower bound on `|bearing_delta|`, degrees.
    pub min_delta: f64,
    /// Exclusive upper bound on `|bearing_delta|`, degrees.
    pub max_delta: f64,
    /// Individual spans larger than this are treated as zero.
    pub artifact_limit: f64,
}

impl Default for TurnThresholds {
    fn default() -> Self {
        Self {
            min_delta: 20.0,
            max_delta: 170.0,
            artifact_limit: 150.0,
        }
    }
}

/// Derived per-point values. Edge points lack the neighbours some fields
/// need and carry `None` there.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TurnSignal {
    /// `speed[i] - speed[i-1]`.
    pub accel: Option<f64>,
    /// Bearing from the previous point, degrees.
    pub bearing: Option<f64>,
    /// Smoothed turn signal, degrees.
    pub bearing_delta: Option<f64>,
}

/// Average of the two bearing spans ending at `next`, each zeroed when its
/// magnitude exceeds `artifact_limit`.
pub fn smoothed_delta(previous: f64, current: f64, next: f64, artifact_limit: f64) -> f64 {
    let suppress = |span: f64| if span.abs() > artifact_limit { 0.0 } else { span };
    let short = suppress(next - current);
    let long = suppress(next - previous);
    (short + long) / 2.0
}

/// `Some(is_right_turn)` when `delta` qualifies as a turn.
pub fn classify_delta(delta: f64, thresholds: &TurnThresholds) -> Option<bool> {
    let magnitude = delta.abs();
    if magnitude > thresholds.min_delta && magnitude < thresholds.max_delta {
        Some(delta >= 0.0)
    } else {
        None
    }
}

pub fn turn_signals(samples: &[PositionSample], thresholds: &TurnThresholds) -> Vec<TurnSignal> {
    let n = samples.len();
    let mut signals = vec![TurnSignal::default(); n];

    for i in 1..n {
        signals[i].accel = Some(samples[i].speed - samples[i - 1].speed);
        signals[i].bearing = Some(planar_bearing(samples[i - 1].coord(), samples[i].coord()));
    }

    for i in 2..n.saturating_sub(1) {
        let (Some(previous), Some(current), Some(next)) = (
            signals[i - 1].bearing,
            signals[i].bearing,
            signals[i + 1].bearing,
        ) else {
            continue;
        };
        signals[i].bearing_delta = Some(smoothed_delta(
            previous,
            current,
            next,
            thresholds.artifact_limit,
        ));
    }

    signals
}

/// Turn events with the default [`TurnThresholds`].
pub fn find_turns(trajectory: &Trajectory) -> Vec<TurnEvent> {
    find_turns_with(trajectory, &TurnThresholds::default())
}

/// Every point whose smoothed bearing change qualifies, in trajectory order.
/// Consecutive points on one curve may all be reported.
pub fn find_turns_with(trajectory: &Trajectory, thresholds: &TurnThresholds) -> Vec<TurnEvent> {
    let samples = trajectory.samples();
    let signals = turn_signals(samples, thresholds);

    let turns: Vec<TurnEvent> = samples
        .iter()
        .zip(&signals)
        .filter_map(|(sample, signal)| {
            let delta = signal.bearing_delta?;
            let is_right_turn = classify_delta(delta, thresholds)?;
            Some(TurnEvent {
                lon: sample.lon,
                lat: sample.lat,
                speed: sample.speed,
                smoothed_bearing_delta: delta,
                is_right_turn,
            })
        })
        .collect();

    debug!(points = samples.len(), turns = turns.len(), "Turn classification finished");
    turns
}
