use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::parser::ParseStats;
use crate::types::Trajectory;
use crate::utility::{mean, stddev};

/// Per-log summary written as one CSV row.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LogStats {
    pub timestamp: DateTime<Utc>,
    pub source: Option<String>,

    // frames
    pub position_frames: usize,
    pub fix_frames: usize,
    pub skipped_frames: usize,

    // attrition
    pub retracted: usize,
    pub diverted_to_stops: usize,
    pub duplicates_removed: usize,
    pub cleaned_out: usize,

    // result
    pub final_points: usize,
    pub mean_speed: f64,
    pub speed_stddev: f64,
    pub stops: usize,
    pub decel_stops: usize,
    pub proximity_stops: usize,
    pub turns: usize,

    // error tracking
    pub error_type: Option<String>,
    pub error_message: Option<String>,
}

impl LogStats {
    pub fn from_parse(parse: &ParseStats) -> Self {
        LogStats {
            timestamp: Utc::now(),
            position_frames: parse.position_frames,
            fix_frames: parse.fix_frames,
            skipped_frames: parse.skipped,
            retracted: parse.retracted,
            diverted_to_stops: parse.diverted,
            duplicates_removed: parse.duplicates_removed,
            ..Default::default()
        }
    }

    /// Records the final trajectory size and speed profile.
    pub fn with_trajectory(mut self, trajectory: &Trajectory, parsed_points: usize) -> Self {
        let speeds: Vec<f64> = trajectory.iter().map(|s| s.speed).collect();
        self.final_points = trajectory.len();
        self.cleaned_out = parsed_points.saturating_sub(trajectory.len());
        self.mean_speed = mean(&speeds);
        self.speed_stddev = stddev(&speeds, self.mean_speed);
        self
    }

    /// Position frames that did not make it into the final trajectory.
    pub fn dropped(&self) -> usize {
        self.position_frames.saturating_sub(self.final_points)
    }

    pub fn pct(part: usize, total: usize) -> f64 {
        if total == 0 {
            0.0
        } else {
            (part as f64 / total as f64) * 100.0
        }
    }

    pub fn dropped_pct(&self) -> f64 {
        Self::pct(self.dropped(), self.position_frames)
    }

    /// Create an error record with timestamp and error information
    pub fn from_error(error_type: &str, error_message: &str) -> Self {
        LogStats {
            timestamp: Utc::now(),
            error_type: Some(error_type.to_string()),
            error_message: Some(error_message.to_string()),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = Some(source.to_string());
        self
    }
}
