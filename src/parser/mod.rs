//! Streaming parser for receiver sentence logs.
//!
//! [`parse`] walks a log line by line and assembles a [`Trajectory`]:
//! position frames emit samples, the fix-quality frame that follows may
//! retract them, and slow samples close to the previous slow sample are
//! diverted into a side channel of proximity stops. [`records`] holds the
//! alternative pair-wise assembler used by the cleaner.

pub mod frame;
pub mod records;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geo::{Coord, haversine};
use crate::types::{PositionSample, Trajectory, TrajectoryError};
use frame::{Clock, FixQualityFrame, FrameKind, PositionFrame, RawFrame, has_embedded_header};

/// Quality gate applied to the fix-quality frame of each position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixGate {
    /// Minimum plausible altitude, in the receiver's unit.
    pub min_altitude: f64,
    pub max_hdop: f64,
    pub min_satellites: u32,
}

impl Default for FixGate {
    fn default() -> Self {
        Self {
            min_altitude: 100.0,
            max_hdop: 9.0,
            min_satellites: 3,
        }
    }
}

impl FixGate {
    pub fn accepts(&self, fix: &FixQualityFrame) -> bool {
        fix.altitude >= self.min_altitude
            && fix.hdop <= self.max_hdop
            && fix.satellites >= self.min_satellites
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Reject position frames whose status field is not `A`.
    pub require_valid_fix: bool,
    /// Speeds at or below this (mph) go through the low-speed pre-filter.
    pub stationary_speed: f64,
    /// Slow samples within this many meters of the previous slow anchor are
    /// diverted to the proximity-stop side channel.
    pub stop_radius_m: f64,
    pub gate: FixGate,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            require_valid_fix: true,
            stationary_speed: 0.5,
            stop_radius_m: 10.0,
            gate: FixGate::default(),
        }
    }
}

/// Counters collected while reading one log.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseStats {
    pub position_frames: usize,
    pub fix_frames: usize,
    /// Lines dropped because of a recoverable frame error.
    pub skipped: usize,
    /// Samples withdrawn by the fix-quality gate.
    pub retracted: usize,
    /// Slow samples moved to the proximity-stop side channel.
    pub diverted: usize,
    /// Position frames never matched with a fix-quality frame (pair-wise
    /// assembly only).
    pub orphaned: usize,
    pub duplicates_removed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParseOutcome {
    pub trajectory: Trajectory,
    pub proximity_stops: Vec<PositionSample>,
    pub stats: ParseStats,
}

/// Where the most recent position frame ended up, so the next fix-quality
/// frame knows what it may retract.
#[derive(Debug, Clone, Copy, PartialEq)]
enum OpenRecord {
    Idle,
    Rejected,
    Kept { previous_anchor: Option<Option<Coord>> },
    Diverted,
}

/// Per-log assembly state.
pub struct ParseContext<'a> {
    config: &'a ParserConfig,
    clock: Clock,
    samples: Vec<PositionSample>,
    proximity_stops: Vec<PositionSample>,
    anchor: Option<Coord>,
    open: OpenRecord,
    stats: ParseStats,
}

impl<'a> ParseContext<'a> {
    pub fn new(config: &'a ParserConfig) -> Self {
        Self {
            config,
            clock: Clock::default(),
            samples: Vec::new(),
            proximity_stops: Vec::new(),
            anchor: None,
            open: OpenRecord::Idle,
            stats: ParseStats::default(),
        }
    }

    /// Feeds one line into the context.
    pub fn push_line(&mut self, line_no: usize, line: &str) {
        let line = line.trim();
        let Some(kind) = FrameKind::of(line) else {
            return;
        };

        match kind {
            FrameKind::Position => self.stats.position_frames += 1,
            FrameKind::FixQuality => {
                self.stats.fix_frames += 1;
                // The fix frame paired with a rejected position frame is
                // consumed without effect.
                if self.open == OpenRecord::Rejected {
                    self.open = OpenRecord::Idle;
                    return;
                }
            }
        }

        let frame = if has_embedded_header(line) {
            Err(frame::FrameError::EmbeddedHeader)
        } else {
            frame::parse_line(line, self.config.require_valid_fix)
        };

        let result = match frame {
            Ok(Some(RawFrame::Position(position))) => self.accept_position(position),
            Ok(Some(RawFrame::FixQuality(fix))) => {
                self.apply_gate(&fix);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            debug!(line = line_no, ?kind, error = %e, "Skipping frame");
            self.stats.skipped += 1;
            self.open = match kind {
                FrameKind::Position => OpenRecord::Rejected,
                FrameKind::FixQuality => OpenRecord::Idle,
            };
        }
    }

    fn accept_position(&mut self, position: PositionFrame) -> Result<(), frame::FrameError> {
        let time = self.clock.advance(position.time)?;
        let mut sample = PositionSample::new(time, position.lon, position.lat, position.speed);
        sample.bearing = position.course;

        let here = sample.coord();
        let mut previous_anchor = None;

        if sample.speed <= self.config.stationary_speed {
            match self.anchor {
                Some(anchor) if haversine(here, anchor) <= self.config.stop_radius_m => {
                    self.proximity_stops.push(sample);
                    self.stats.diverted += 1;
                    self.open = OpenRecord::Diverted;
                    return Ok(());
                }
                _ => {
                    previous_anchor = Some(self.anchor);
                    self.anchor = Some(here);
                }
            }
        }

        self.samples.push(sample);
        self.open = OpenRecord::Kept { previous_anchor };
        Ok(())
    }

    fn apply_gate(&mut self, fix: &FixQualityFrame) {
        let open = std::mem::replace(&mut self.open, OpenRecord::Idle);
        if self.config.gate.accepts(fix) {
            return;
        }

        match open {
            OpenRecord::Kept { previous_anchor } => {
                self.samples.pop();
                if let Some(anchor) = previous_anchor {
                    self.anchor = anchor;
                }
            }
            OpenRecord::Diverted => {
                self.proximity_stops.pop();
                self.stats.diverted -= 1;
            }
            OpenRecord::Idle | OpenRecord::Rejected => return,
        }

        debug!(
            satellites = fix.satellites,
            hdop = fix.hdop,
            altitude = fix.altitude,
            "Fix quality gate retracted sample"
        );
        self.stats.retracted += 1;
    }

    /// Finalizes the trajectory, removing duplicate coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`TrajectoryError`] if the accumulated samples are
    /// structurally inconsistent.
    pub fn finish(self) -> Result<ParseOutcome, TrajectoryError> {
        let mut trajectory = Trajectory::try_from_samples(self.samples)?;
        let mut stats = self.stats;
        stats.duplicates_removed = trajectory.dedup_coordinates();

        Ok(ParseOutcome {
            trajectory,
            proximity_stops: self.proximity_stops,
            stats,
        })
    }
}

/// Parses a log with the default [`ParserConfig`].
pub fn parse<I, S>(lines: I) -> Result<ParseOutcome, TrajectoryError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parse_with(lines, &ParserConfig::default())
}

pub fn parse_with<I, S>(lines: I, config: &ParserConfig) -> Result<ParseOutcome, TrajectoryError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut context = ParseContext::new(config);
    for (i, line) in lines.into_iter().enumerate() {
        context.push_line(i + 1, line.as_ref());
    }
    context.finish()
}
