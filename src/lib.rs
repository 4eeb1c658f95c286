//! Stop and turn detection from GPS receiver logs.
//!
//! Logs of `$GPRMC`/`$GPGGA` sentences are parsed into a [`Trajectory`],
//! cleaned, then density-clustered into stops and scanned for turns.

pub mod cleaner;
pub mod clustering;
pub mod config;
pub mod geo;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod source;
pub mod stats;
pub mod stops;
pub mod turns;
pub mod types;
pub mod utility;

pub use cleaner::{CleanOptions, clean};
pub use clustering::{DbscanParams, KMeansParams, StopPreset, consolidate_path, find_stops};
pub use config::Config;
pub use parser::{ParseOutcome, ParserConfig, parse, parse_with};
pub use pipeline::{MergedReport, TripReport, merge_trips, process_log};
pub use stops::{DecelParams, find_decel_stops};
pub use turns::{TurnThresholds, find_turns, find_turns_with};
pub use types::{MarkupRecord, PositionSample, StopEvent, Trajectory, TrajectoryError, TurnEvent};
