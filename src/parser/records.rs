//! Pair-wise assembly: one [`FrameRecord`] per position/fix-quality pair.
//!
//! Unlike the streaming parser, records keep the raw sentence text so that
//! the cleaner can detect corrupted lines after the fact.

use serde::Serialize;
use tracing::debug;

use super::frame::{self, Clock, FixQualityFrame, FrameKind, PositionFrame, RawFrame};
use super::{ParseStats, ParserConfig};
use crate::types::PositionSample;

/// A position frame and its fix-quality frame, describing the same instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRecord {
    pub position_text: String,
    pub fix_text: String,
    pub sample: PositionSample,
    pub fix: FixQualityFrame,
}

impl AsRef<PositionSample> for FrameRecord {
    fn as_ref(&self) -> &PositionSample {
        &self.sample
    }
}

/// Outcome of offering a fix-quality frame to a [`RecordBuilder`].
#[derive(Debug, Clone, PartialEq)]
pub enum Pairing {
    Record(FrameRecord),
    /// No position frame is waiting; the fix is dropped.
    NoPosition,
    /// The fix belongs to another second; the position keeps waiting.
    TimeMismatch,
}

/// Holds the open position frame until the fix-quality frame for the same
/// instant arrives.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    position: Option<(String, f64, PositionFrame)>,
}

impl RecordBuilder {
    /// Opens a position frame with its log time. Returns `true` if an
    /// unmatched position frame was overwritten.
    pub fn position(&mut self, text: &str, time: f64, frame: PositionFrame) -> bool {
        self.position.replace((text.to_string(), time, frame)).is_some()
    }

    pub fn is_open(&self) -> bool {
        self.position.is_some()
    }

    /// Drops the open position frame. Returns `true` if there was one.
    pub fn discard(&mut self) -> bool {
        self.position.take().is_some()
    }

    /// Completes the open position with `fix`. A fix stamped with a
    /// different second of day than the position is not paired.
    pub fn pair(&mut self, text: &str, fix: FixQualityFrame) -> Pairing {
        let Some((_, _, position)) = &self.position else {
            return Pairing::NoPosition;
        };
        if fix.time.is_some_and(|t| t.floor() != position.time.floor()) {
            return Pairing::TimeMismatch;
        }
        let Some((position_text, time, position)) = self.position.take() else {
            return Pairing::NoPosition;
        };

        let mut sample = PositionSample::new(time, position.lon, position.lat, position.speed);
        sample.bearing = position.course;

        Pairing::Record(FrameRecord {
            position_text,
            fix_text: text.to_string(),
            sample,
            fix,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordOutcome {
    pub records: Vec<FrameRecord>,
    pub stats: ParseStats,
}

/// Pairs position and fix-quality frames into [`FrameRecord`]s.
///
/// A fix-quality frame pairs only with the position frame just before it
/// and only when both carry the same second. The fix following a rejected
/// position frame is consumed without effect, as in the streaming parser.
/// Pairs whose fix-quality frame fails the gate are dropped. Malformed
/// frames are skipped. The low-speed pre-filter is not applied here.
pub fn assemble_records<I, S>(lines: I, config: &ParserConfig) -> RecordOutcome
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut builder = RecordBuilder::default();
    let mut clock = Clock::default();
    let mut outcome = RecordOutcome::default();
    let mut consume_next_fix = false;

    for (i, line) in lines.into_iter().enumerate() {
        let text = line.as_ref().trim();
        let Some(kind) = FrameKind::of(text) else {
            continue;
        };

        match kind {
            FrameKind::Position => {
                outcome.stats.position_frames += 1;
                consume_next_fix = false;

                let parsed = frame::parse_line(text, config.require_valid_fix).and_then(|f| match f {
                    Some(RawFrame::Position(p)) => clock.advance(p.time).map(|t| Some((t, p))),
                    _ => Ok(None),
                });

                match parsed {
                    Ok(Some((time, position))) => {
                        if builder.position(text, time, position) {
                            outcome.stats.orphaned += 1;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        debug!(line = i + 1, ?kind, error = %e, "Skipping frame");
                        outcome.stats.skipped += 1;
                        if builder.discard() {
                            outcome.stats.orphaned += 1;
                        }
                        consume_next_fix = true;
                    }
                }
            }
            FrameKind::FixQuality => {
                outcome.stats.fix_frames += 1;
                if std::mem::take(&mut consume_next_fix) {
                    continue;
                }

                let fix = match frame::parse_line(text, config.require_valid_fix) {
                    Ok(Some(RawFrame::FixQuality(fix))) => fix,
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(line = i + 1, ?kind, error = %e, "Skipping frame");
                        outcome.stats.skipped += 1;
                        if builder.discard() {
                            outcome.stats.orphaned += 1;
                        }
                        continue;
                    }
                };

                match builder.pair(text, fix) {
                    Pairing::Record(record) => {
                        if config.gate.accepts(&record.fix) {
                            outcome.records.push(record);
                        } else {
                            outcome.stats.retracted += 1;
                        }
                    }
                    Pairing::NoPosition => {
                        debug!(line = i + 1, "Dropping fix-quality frame without a position");
                    }
                    Pairing::TimeMismatch => {
                        debug!(line = i + 1, "Dropping fix-quality frame from another second");
                    }
                }
            }
        }
    }

    if builder.discard() {
        outcome.stats.orphaned += 1;
    }

    outcome
}
