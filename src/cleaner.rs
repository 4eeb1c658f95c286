//! Trajectory cleaning stages.
//!
//! Every stage works on anything that exposes a [`PositionSample`], so the
//! same code thins plain trajectories and pair-wise [`FrameRecord`]s. The
//! stages are order-sensitive: burp rows must go first, otherwise their
//! impossible jumps reach the straight-line detector.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::course_bearing;
use crate::parser::frame::has_embedded_header;
use crate::parser::records::FrameRecord;
use crate::types::{PositionSample, Trajectory, TrajectoryError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanOptions {
    /// Drop records whose raw text holds two sentences. Records only.
    pub remove_burps: bool,
    /// Collapse runs of identical coordinates to their first point.
    pub trim_not_moving: bool,
    /// Collapse runs of zero speed to their first point.
    pub collapse_parked: bool,
    /// Keep only every `straight_keep_every`-th sample while the bearing
    /// stays unchanged.
    pub thin_straight: bool,
    pub straight_keep_every: usize,
    /// Fill missing bearings and recompute `delta_speed`.
    pub backfill: bool,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            remove_burps: true,
            trim_not_moving: true,
            collapse_parked: false,
            thin_straight: false,
            straight_keep_every: 4,
            backfill: true,
        }
    }
}

impl AsMut<PositionSample> for PositionSample {
    fn as_mut(&mut self) -> &mut PositionSample {
        self
    }
}

impl AsMut<PositionSample> for FrameRecord {
    fn as_mut(&mut self) -> &mut PositionSample {
        &mut self.sample
    }
}

/// Drops records where either sentence carries a second embedded header.
pub fn remove_burps(records: Vec<FrameRecord>) -> Vec<FrameRecord> {
    records
        .into_iter()
        .filter(|r| !has_embedded_header(&r.position_text) && !has_embedded_header(&r.fix_text))
        .collect()
}

/// Keeps only the first point of every run of unchanged `(lon, lat)`.
pub fn trim_not_moving<T: AsRef<PositionSample>>(items: Vec<T>) -> Vec<T> {
    let mut previous: Option<(f64, f64)> = None;
    items
        .into_iter()
        .filter(|item| {
            let s = item.as_ref();
            let here = (s.lon, s.lat);
            let keep = previous != Some(here);
            previous = Some(here);
            keep
        })
        .collect()
}

/// Keeps only the first point of every run of exactly-zero speed.
pub fn collapse_parked<T: AsRef<PositionSample>>(items: Vec<T>) -> Vec<T> {
    let mut previous_parked = false;
    items
        .into_iter()
        .filter(|item| {
            let parked = item.as_ref().speed == 0.0;
            let keep = !(parked && previous_parked);
            previous_parked = parked;
            keep
        })
        .collect()
}

/// Thins straight stretches: while the bearing repeats, only every
/// `keep_every`-th repeat is kept. A bearing change is always kept and
/// resets the count.
pub fn thin_straight<T: AsRef<PositionSample>>(items: Vec<T>, keep_every: usize) -> Vec<T> {
    let keep_every = keep_every.max(1);
    let mut previous: Option<Option<f64>> = None;
    let mut repeats = 0usize;

    items
        .into_iter()
        .filter(|item| {
            let bearing = item.as_ref().bearing;
            let keep = match previous {
                Some(prev) if prev == bearing => {
                    repeats += 1;
                    if repeats >= keep_every {
                        repeats = 0;
                        true
                    } else {
                        false
                    }
                }
                _ => {
                    repeats = 0;
                    true
                }
            };
            previous = Some(bearing);
            keep
        })
        .collect()
}

/// Fills missing bearings with the compass course from the predecessor,
/// the same convention as the receiver's course field.
pub fn backfill_bearings<T: AsRef<PositionSample> + AsMut<PositionSample>>(items: &mut [T]) {
    for i in 1..items.len() {
        if items[i].as_ref().bearing.is_some() {
            continue;
        }
        let from = items[i - 1].as_ref().coord();
        let to = items[i].as_ref().coord();
        items[i].as_mut().bearing = Some(course_bearing(from, to));
    }
}

/// Recomputes `delta_speed` as speed change per second. The first sample
/// has none; a zero time step yields zero.
pub fn recompute_delta_speed<T: AsRef<PositionSample> + AsMut<PositionSample>>(items: &mut [T]) {
    if let Some(first) = items.first_mut() {
        first.as_mut().delta_speed = None;
    }
    for i in 1..items.len() {
        let (prev_time, prev_speed) = {
            let p = items[i - 1].as_ref();
            (p.time, p.speed)
        };
        let s = items[i].as_mut();
        let dt = s.time - prev_time;
        s.delta_speed = Some(if dt == 0.0 {
            0.0
        } else {
            (s.speed - prev_speed) / dt
        });
    }
}

fn run_stages<T>(mut items: Vec<T>, options: &CleanOptions) -> Vec<T>
where
    T: AsRef<PositionSample> + AsMut<PositionSample>,
{
    let before = items.len();

    if options.trim_not_moving {
        items = trim_not_moving(items);
    }
    if options.collapse_parked {
        items = collapse_parked(items);
    }
    if options.backfill {
        backfill_bearings(&mut items);
    }
    if options.thin_straight {
        items = thin_straight(items, options.straight_keep_every);
    }
    if options.backfill {
        recompute_delta_speed(&mut items);
    }

    debug!(before, after = items.len(), "Cleaned samples");
    items
}

/// Cleans a trajectory. Burp removal needs raw sentence text and is not
/// applied here; see [`clean_records`].
pub fn clean(trajectory: Trajectory, options: &CleanOptions) -> Trajectory {
    let samples = run_stages(trajectory.into_samples(), options);
    Trajectory::from_samples_unchecked(samples)
}

/// Cleans pair-wise records, starting with burp removal.
pub fn clean_records(records: Vec<FrameRecord>, options: &CleanOptions) -> Vec<FrameRecord> {
    let records = if options.remove_burps {
        let before = records.len();
        let kept = remove_burps(records);
        debug!(removed = before - kept.len(), "Removed burp records");
        kept
    } else {
        records
    };
    run_stages(records, options)
}

/// Builds the final trajectory from cleaned records.
///
/// # Errors
///
/// Returns [`TrajectoryError`] if the record samples violate trajectory
/// invariants.
pub fn records_to_trajectory(records: Vec<FrameRecord>) -> Result<Trajectory, TrajectoryError> {
    let samples = records.into_iter().map(|r| r.sample).collect();
    let mut trajectory = Trajectory::try_from_samples(samples)?;
    trajectory.dedup_coordinates();
    Ok(trajectory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::frame::FixQualityFrame;

    fn sample(time: f64, lon: f64, lat: f64, speed: f64) -> PositionSample {
        PositionSample::new(time, lon, lat, speed)
    }

    fn with_bearing(time: f64, bearing: f64) -> PositionSample {
        let mut s = sample(time, time, 0.0, 10.0);
        s.bearing = Some(bearing);
        s
    }

    fn record(time: f64, position_text: &str, fix_text: &str) -> FrameRecord {
        FrameRecord {
            position_text: position_text.to_string(),
            fix_text: fix_text.to_string(),
            sample: sample(time, time, 0.0, 10.0),
            fix: FixQualityFrame {
                time: None,
                satellites: 8,
                hdop: 1.0,
                altitude: 150.0,
            },
        }
    }

    #[test]
    fn test_remove_burps() {
        let records = vec![
            record(1.0, "$GPRMC,1", "$GPGGA,1"),
            record(2.0, "$GPRMC,2$GPGGA,2", "$GPGGA,2"),
            record(3.0, "$GPRMC,3", "$GPGGA,3,$GPRMC"),
            record(4.0, "$GPRMC,4", "$GPGGA,4"),
        ];
        let kept = remove_burps(records);
        let times: Vec<f64> = kept.iter().map(|r| r.sample.time).collect();
        assert_eq!(times, vec![1.0, 4.0]);
    }

    #[test]
    fn test_trim_not_moving_keeps_first_of_run() {
        let samples = vec![
            sample(1.0, 1.0, 1.0, 0.0),
            sample(2.0, 1.0, 1.0, 0.0),
            sample(3.0, 1.0, 1.0, 0.0),
            sample(4.0, 2.0, 1.0, 5.0),
            sample(5.0, 1.0, 1.0, 5.0),
            sample(6.0, 1.0, 1.0, 5.0),
        ];
        let kept = trim_not_moving(samples);
        let times: Vec<f64> = kept.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![1.0, 4.0, 5.0]);
    }

    #[test]
    fn test_collapse_parked() {
        let samples = vec![
            sample(1.0, 1.0, 1.0, 3.0),
            sample(2.0, 2.0, 1.0, 0.0),
            sample(3.0, 3.0, 1.0, 0.0),
            sample(4.0, 4.0, 1.0, 2.0),
            sample(5.0, 5.0, 1.0, 0.0),
        ];
        let kept = collapse_parked(samples);
        let times: Vec<f64> = kept.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![1.0, 2.0, 4.0, 5.0]);
    }

    #[test]
    fn test_thin_straight_keeps_every_fourth_repeat() {
        let samples: Vec<PositionSample> = (0..10).map(|i| with_bearing(i as f64, 45.0)).collect();
        let kept = thin_straight(samples, 4);
        let times: Vec<f64> = kept.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 4.0, 8.0]);
    }

    #[test]
    fn test_thin_straight_resets_on_bearing_change() {
        let samples = vec![
            with_bearing(0.0, 45.0),
            with_bearing(1.0, 45.0),
            with_bearing(2.0, 45.0),
            with_bearing(3.0, 90.0),
            with_bearing(4.0, 90.0),
            with_bearing(5.0, 90.0),
            with_bearing(6.0, 90.0),
            with_bearing(7.0, 90.0),
        ];
        let kept = thin_straight(samples, 4);
        let times: Vec<f64> = kept.iter().map(|s| s.time).collect();
        assert_eq!(times, vec![0.0, 3.0, 7.0]);
    }

    #[test]
    fn test_backfill_and_delta_speed() {
        let mut samples = vec![
            sample(0.0, 0.0, 0.0, 10.0),
            sample(2.0, 0.0, 0.001, 14.0),
            sample(2.0, 0.001, 0.001, 14.0),
        ];
        samples[2].bearing = Some(12.0);

        backfill_bearings(&mut samples);
        recompute_delta_speed(&mut samples);

        assert_eq!(samples[0].bearing, None);
        // Due north.
        assert!(samples[1].bearing.unwrap().abs() < 1e-9);
        assert_eq!(samples[2].bearing, Some(12.0));

        assert_eq!(samples[0].delta_speed, None);
        assert_eq!(samples[1].delta_speed, Some(2.0));
        assert_eq!(samples[2].delta_speed, Some(0.0));
    }

    #[test]
    fn test_backfilled_course_continues_receiver_course() {
        // Heading east: the receiver reports 90, the middle sample has no
        // course and is back-filled.
        let mut samples = vec![
            sample(0.0, 0.000, 0.0, 20.0),
            sample(1.0, 0.001, 0.0, 20.0),
            sample(2.0, 0.002, 0.0, 20.0),
        ];
        samples[0].bearing = Some(90.0);
        samples[2].bearing = Some(90.0);

        backfill_bearings(&mut samples);
        assert!((samples[1].bearing.unwrap() - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_clean_empty_trajectory() {
        let cleaned = clean(Trajectory::new(), &CleanOptions::default());
        assert!(cleaned.is_empty());
    }

    #[test]
    fn test_clean_records_runs_burps_first() {
        let records = vec![
            record(1.0, "$GPRMC,1", "$GPGGA,1"),
            record(2.0, "$GPRMC,2$GPRMC,2", "$GPGGA,2"),
            record(3.0, "$GPRMC,3", "$GPGGA,3"),
        ];

        let cleaned = clean_records(records, &CleanOptions::default());
        assert_eq!(cleaned.len(), 2);
        assert_eq!(cleaned[1].sample.delta_speed, Some(0.0));

        let trajectory = records_to_trajectory(cleaned).unwrap();
        assert_eq!(trajectory.len(), 2);
    }
}
