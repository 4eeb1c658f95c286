//! Pipeline configuration.
//!
//! Stored as a JSON object on disk; every section and field is optional and
//! falls back to the tuned defaults:
//! ```json
//! {
//!   "assembly": "paired",
//!   "parser": { "require_valid_fix": false },
//!   "clean": { "thin_straight": true },
//!   "stops": { "eps": 0.00001, "min_samples": 2 },
//!   "consolidation": { "clusters": 500, "seed": 7 }
//! }
//! ```
//!
//! `TRIP_EVENTS_STOP_PRESET` and `TRIP_EVENTS_MERGED_PRESET` override the
//! per-log and merged clustering parameters with a named preset.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::cleaner::CleanOptions;
use crate::clustering::{DbscanParams, KMeansParams, StopPreset};
use crate::parser::ParserConfig;
use crate::stops::DecelParams;
use crate::turns::TurnThresholds;

pub const STOP_PRESET_VAR: &str = "TRIP_EVENTS_STOP_PRESET";
pub const MERGED_PRESET_VAR: &str = "TRIP_EVENTS_MERGED_PRESET";

/// How frames are turned into a trajectory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assembly {
    /// Frame by frame, with the low-speed pre-filter.
    #[default]
    Streaming,
    /// Position/fix-quality pairs, enabling burp removal.
    Paired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub assembly: Assembly,
    pub parser: ParserConfig,
    pub clean: CleanOptions,
    /// Clustering for a single log.
    pub stops: DbscanParams,
    /// Clustering over several logs joined together.
    pub merged_stops: DbscanParams,
    pub turns: TurnThresholds,
    /// Slowdown-and-restart stop detection.
    pub decel_stops: DecelParams,
    /// Route consolidation over merged logs; disabled when absent.
    pub consolidation: Option<KMeansParams>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            assembly: Assembly::default(),
            parser: ParserConfig::default(),
            clean: CleanOptions::default(),
            stops: StopPreset::StopDetection.params(),
            merged_stops: StopPreset::IntersectionAggregation.params(),
            turns: TurnThresholds::default(),
            decel_stops: DecelParams::default(),
            consolidation: None,
        }
    }
}

impl Config {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("parsing config '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies preset overrides from the environment.
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(name) = std::env::var(STOP_PRESET_VAR) {
            self.stops = name.parse::<StopPreset>()?.params();
        }
        if let Ok(name) = std::env::var(MERGED_PRESET_VAR) {
            self.merged_stops = name.parse::<StopPreset>()?.params();
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks that thresholds are usable. Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        for (name, params) in [("stops", &self.stops), ("merged_stops", &self.merged_stops)] {
            if !(params.eps.is_finite() && params.eps > 0.0) {
                bail!("{name}.eps must be a positive number, got {}", params.eps);
            }
            if params.min_samples == 0 {
                bail!("{name}.min_samples must be at least 1");
            }
        }

        if self.turns.min_delta < 0.0 || self.turns.min_delta >= self.turns.max_delta {
            bail!(
                "turns.min_delta ({}) must be non-negative and below turns.max_delta ({})",
                self.turns.min_delta,
                self.turns.max_delta
            );
        }

        let decel = &self.decel_stops;
        if decel.lookahead == 0 || !(decel.min_dwell >= 0.0 && decel.min_dwell < decel.max_dwell) {
            bail!(
                "decel_stops needs a lookahead of at least 1 and 0 <= min_dwell ({}) < max_dwell ({})",
                decel.min_dwell,
                decel.max_dwell
            );
        }

        if self.parser.stop_radius_m < 0.0 {
            bail!("parser.stop_radius_m must not be negative");
        }

        if let Some(consolidation) = &self.consolidation {
            if consolidation.clusters == 0 {
                bail!("consolidation.clusters must be at least 1");
            }
        }

        Ok(())
    }
}
