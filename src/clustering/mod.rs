//! Stop detection by density clustering, plus a partitioning variant for
//! consolidating overlapping route points.
//!
//! Both methods end in the same medoid step, so every emitted coordinate is
//! a sample that was actually observed.

mod dbscan;
mod kmeans;
mod medoid;

pub use dbscan::dbscan;
pub use kmeans::kmeans;
pub use medoid::{medoid_events, medoid_index};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::geo::Coord;
use crate::types::{StopEvent, Trajectory};

/// Neighbourhood radius (degrees, Manhattan) and density threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DbscanParams {
    pub eps: f64,
    /// Minimum neighbourhood size, the point itself included.
    pub min_samples: usize,
}

impl DbscanParams {
    /// Tight radius for short stops along a single trip.
    pub fn stop_detection() -> Self {
        Self {
            eps: 0.00001,
            min_samples: 2,
        }
    }

    /// Wider radius for stop lights and intersections seen over several
    /// passes.
    pub fn intersection_aggregation() -> Self {
        Self {
            eps: 0.0001,
            min_samples: 15,
        }
    }
}

impl Default for DbscanParams {
    fn default() -> Self {
        Self::stop_detection()
    }
}

/// Named [`DbscanParams`] presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPreset {
    StopDetection,
    IntersectionAggregation,
}

impl StopPreset {
    pub fn params(self) -> DbscanParams {
        match self {
            StopPreset::StopDetection => DbscanParams::stop_detection(),
            StopPreset::IntersectionAggregation => DbscanParams::intersection_aggregation(),
        }
    }
}

impl fmt::Display for StopPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopPreset::StopDetection => f.write_str("stop_detection"),
            StopPreset::IntersectionAggregation => f.write_str("intersection_aggregation"),
        }
    }
}

impl FromStr for StopPreset {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "stop_detection" => Ok(StopPreset::StopDetection),
            "intersection_aggregation" => Ok(StopPreset::IntersectionAggregation),
            other => Err(anyhow::anyhow!("unknown stop preset '{other}'")),
        }
    }
}

/// Partitioning parameters. The cluster count should follow the expected
/// path density; a few hundred to about 1500 suits multi-trip overlays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParams {
    pub clusters: usize,
    pub seed: u64,
    pub max_iterations: usize,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            clusters: 200,
            seed: 0,
            max_iterations: 300,
        }
    }
}

fn coords(trajectory: &Trajectory) -> Vec<Coord> {
    trajectory.iter().map(|s| s.coord()).collect()
}

/// Density-clusters the trajectory and returns one [`StopEvent`] per
/// cluster, located at the cluster's medoid.
pub fn find_stops(trajectory: &Trajectory, params: &DbscanParams) -> Vec<StopEvent> {
    if trajectory.is_empty() {
        return Vec::new();
    }

    let labels = dbscan(&coords(trajectory), params);
    let noise = labels.iter().filter(|l| l.is_none()).count();
    let events = medoid_events(trajectory.samples(), &labels);

    debug!(
        points = trajectory.len(),
        noise,
        stops = events.len(),
        eps = params.eps,
        min_samples = params.min_samples,
        "Density clustering finished"
    );
    events
}

/// Merges nearby route points (e.g. the same road driven on several trips)
/// into `params.clusters` representative samples.
pub fn consolidate_path(trajectory: &Trajectory, params: &KMeansParams) -> Vec<StopEvent> {
    if trajectory.is_empty() {
        return Vec::new();
    }

    let labels = kmeans(&coords(trajectory), params);
    let vertices = medoid_events(trajectory.samples(), &labels);

    debug!(
        points = trajectory.len(),
        clusters = params.clusters,
        vertices = vertices.len(),
        "Path consolidation finished"
    );
    vertices
}
