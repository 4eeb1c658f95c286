//! End-to-end processing of receiver logs: parse, clean, then detect stops
//! and turns. Several processed logs can be merged for multi-trip
//! aggregation.

use anyhow::{Context, Result};
use tracing::info;

use crate::cleaner::{clean, clean_records, records_to_trajectory};
use crate::clustering::{consolidate_path, find_stops};
use crate::config::{Assembly, Config};
use crate::parser::parse_with;
use crate::parser::records::assemble_records;
use crate::stats::LogStats;
use crate::stops::find_decel_stops;
use crate::turns::find_turns_with;
use crate::types::{
    EventCategory, MarkupRecord, PositionSample, StopEvent, Trajectory, TurnEvent,
};

/// Everything derived from a single log.
#[derive(Debug, Clone)]
pub struct TripReport {
    pub source: String,
    pub trajectory: Trajectory,
    /// Slow samples held back near an earlier stationary point.
    pub proximity_stops: Vec<PositionSample>,
    pub stops: Vec<StopEvent>,
    /// Slowdowns followed by a restart within the dwell window.
    pub decel_stops: Vec<StopEvent>,
    pub turns: Vec<TurnEvent>,
    pub stats: LogStats,
}

impl TripReport {
    /// Clustered stops, then deceleration stops, then turns, then every
    /// trajectory sample as a route vertex.
    pub fn markup_records(&self) -> Vec<MarkupRecord> {
        self.stops
            .iter()
            .chain(&self.decel_stops)
            .map(MarkupRecord::from)
            .chain(self.turns.iter().map(MarkupRecord::from))
            .chain(self.trajectory.iter().map(MarkupRecord::from))
            .collect()
    }
}

/// Aggregate over several trips.
#[derive(Debug, Clone, Default)]
pub struct MergedReport {
    pub trajectory: Trajectory,
    pub stops: Vec<StopEvent>,
    pub turns: Vec<TurnEvent>,
    /// Consolidated route vertices, when consolidation is configured.
    pub route: Option<Vec<StopEvent>>,
}

impl MergedReport {
    /// Stops, then turns, then the consolidated route (or every joined
    /// sample when consolidation is off).
    pub fn markup_records(&self) -> Vec<MarkupRecord> {
        let mut records: Vec<MarkupRecord> = self
            .stops
            .iter()
            .map(MarkupRecord::from)
            .chain(self.turns.iter().map(MarkupRecord::from))
            .collect();

        match &self.route {
            Some(vertices) => records.extend(vertices.iter().map(route_vertex)),
            None => records.extend(self.trajectory.iter().map(MarkupRecord::from)),
        }
        records
    }
}

fn route_vertex(vertex: &StopEvent) -> MarkupRecord {
    MarkupRecord {
        name: "Route".to_string(),
        lon: vertex.lon,
        lat: vertex.lat,
        speed: vertex.speed,
        category: EventCategory::RouteVertex,
    }
}

/// Runs the full pipeline over the lines of one log.
///
/// # Errors
///
/// Fails only when the assembled samples violate trajectory invariants.
/// Malformed lines are skipped and counted, never fatal.
#[tracing::instrument(skip(lines, config), fields(source = %source))]
pub fn process_log<I, S>(source: &str, lines: I, config: &Config) -> Result<TripReport>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let (trajectory, proximity_stops, parse_stats, parsed_points) = match config.assembly {
        Assembly::Streaming => {
            let outcome = parse_with(lines, &config.parser)
                .with_context(|| format!("assembling trajectory for '{source}'"))?;
            let parsed_points = outcome.trajectory.len();
            let trajectory = clean(outcome.trajectory, &config.clean);
            (trajectory, outcome.proximity_stops, outcome.stats, parsed_points)
        }
        Assembly::Paired => {
            let outcome = assemble_records(lines, &config.parser);
            let parsed_points = outcome.records.len();
            let records = clean_records(outcome.records, &config.clean);
            let trajectory = records_to_trajectory(records)
                .with_context(|| format!("assembling trajectory for '{source}'"))?;
            (trajectory, Vec::new(), outcome.stats, parsed_points)
        }
    };

    let stops = find_stops(&trajectory, &config.stops);
    let decel_stops = find_decel_stops(&trajectory, &config.decel_stops);
    let turns = find_turns_with(&trajectory, &config.turns);

    let mut stats = LogStats::from_parse(&parse_stats)
        .with_source(source)
        .with_trajectory(&trajectory, parsed_points);
    stats.stops = stops.len();
    stats.decel_stops = decel_stops.len();
    stats.proximity_stops = proximity_stops.len();
    stats.turns = turns.len();

    info!(
        total = stats.position_frames,
        dropped = stats.dropped(),
        final_points = stats.final_points,
        stops = stats.stops,
        decel_stops = stats.decel_stops,
        turns = stats.turns,
        "Log processed"
    );

    Ok(TripReport {
        source: source.to_string(),
        trajectory,
        proximity_stops,
        stops,
        decel_stops,
        turns,
        stats,
    })
}

/// Joins the trips' trajectories and clusters them with the merged
/// parameters. Turns stay per trip since bearings across a join are
/// meaningless.
#[tracing::instrument(skip_all, fields(trips = reports.len()))]
pub fn merge_trips(reports: &[TripReport], config: &Config) -> MergedReport {
    let trajectory = Trajectory::concat(reports.iter().map(|r| &r.trajectory));
    let stops = find_stops(&trajectory, &config.merged_stops);
    let turns: Vec<TurnEvent> = reports.iter().flat_map(|r| r.turns.iter().cloned()).collect();
    let route = config
        .consolidation
        .as_ref()
        .map(|params| consolidate_path(&trajectory, params));

    info!(
        points = trajectory.len(),
        stops = stops.len(),
        turns = turns.len(),
        route_vertices = route.as_ref().map_or(0, Vec::len),
        "Trips merged"
    );

    MergedReport {
        trajectory,
        stops,
        turns,
        route,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::KMeansParams;

    fn rmc(time: &str, lat: &str, lon: &str, knots: &str) -> String {
        format!("$GPRMC,{time},A,{lat},N,{lon},W,{knots},,030319,,,A*7A")
    }

    fn gga(time: &str) -> String {
        format!("$GPGGA,{time},4305.1494,N,07740.8738,W,1,08,1.0,150.0,M,-34.4,M,,*5F")
    }

    /// East along a street, then north around a corner.
    fn corner_log() -> Vec<String> {
        let fixes = [
            ("120000.000", "4305.0000", "07741.0000"),
            ("120001.000", "4305.0000", "07740.9400"),
            ("120002.000", "4305.0000", "07740.8800"),
            ("120003.000", "4305.0600", "07740.8800"),
            ("120004.000", "4305.1200", "07740.8800"),
        ];
        fixes
            .iter()
            .flat_map(|(time, lat, lon)| [rmc(time, lat, lon, "20.0"), gga(time)])
            .collect()
    }

    #[test]
    fn test_process_log_finds_corner_turn() {
        let report = process_log("corner.txt", corner_log(), &Config::default()).unwrap();

        assert_eq!(report.source, "corner.txt");
        assert_eq!(report.trajectory.len(), 5);
        assert!(report.stops.is_empty());
        assert!(report.decel_stops.is_empty());
        assert!(!report.turns.is_empty());
        assert_eq!(report.stats.final_points, 5);
        assert_eq!(report.stats.turns, report.turns.len());
        assert_eq!(report.stats.source.as_deref(), Some("corner.txt"));
    }

    #[test]
    fn test_process_log_reports_halt_at_light() {
        // Cruises east, brakes hard at 120003, idles, pulls away at 120010.
        let fixes = [
            ("120000.000", "07741.0000", "20.0"),
            ("120001.000", "07740.9900", "20.0"),
            ("120002.000", "07740.9800", "20.0"),
            ("120003.000", "07740.9750", "4.0"),
            ("120005.000", "07740.9740", "2.0"),
            ("120008.000", "07740.9735", "1.5"),
            ("120010.000", "07740.9700", "9.0"),
            ("120011.000", "07740.9600", "20.0"),
        ];
        let lines: Vec<String> = fixes
            .iter()
            .flat_map(|(time, lon, knots)| [rmc(time, "4305.0000", lon, knots), gga(time)])
            .collect();
        let report = process_log("light.txt", lines, &Config::default()).unwrap();
        assert_eq!(report.trajectory.len(), fixes.len());
        assert_eq!(report.stats.decel_stops, report.decel_stops.len());

        let first = report.decel_stops.first().unwrap();
        let braking = &report.trajectory.samples()[3];
        assert_eq!((first.lon, first.lat, first.time), (braking.lon, braking.lat, braking.time));

        let markup = report.markup_records();
        let stop_rows = markup.iter().filter(|m| m.category == EventCategory::Stop).count();
        assert_eq!(stop_rows, report.stops.len() + report.decel_stops.len());
    }

    #[test]
    fn test_paired_assembly_matches_streaming_on_clean_log() {
        let streaming = process_log("a", corner_log(), &Config::default()).unwrap();
        let config = Config {
            assembly: Assembly::Paired,
            ..Config::default()
        };
        let paired = process_log("a", corner_log(), &config).unwrap();

        assert_eq!(paired.trajectory.len(), streaming.trajectory.len());
        assert_eq!(paired.turns.len(), streaming.turns.len());
        assert!(paired.proximity_stops.is_empty());
    }

    #[test]
    fn test_process_log_garbage_is_empty_not_error() {
        let lines = ["garbage", "$GPGGA,1,2", "$GPRMC,,,"];
        let report = process_log("junk", lines, &Config::default()).unwrap();

        assert!(report.trajectory.is_empty());
        assert!(report.stops.is_empty());
        assert!(report.turns.is_empty());
        assert_eq!(report.stats.skipped_frames, 2);
    }

    #[test]
    fn test_markup_order() {
        let report = process_log("corner.txt", corner_log(), &Config::default()).unwrap();
        let markup = report.markup_records();

        assert_eq!(markup.len(), report.turns.len() + report.trajectory.len());
        assert_eq!(markup[0].category, EventCategory::Turn);
        assert_eq!(markup.last().unwrap().category, EventCategory::RouteVertex);
        assert_eq!(markup.last().unwrap().name, "Route");
    }

    #[test]
    fn test_merge_trips_with_consolidation() {
        let first = process_log("a", corner_log(), &Config::default()).unwrap();
        let second = process_log("b", corner_log(), &Config::default()).unwrap();

        let plain = merge_trips(&[first.clone(), second.clone()], &Config::default());
        assert_eq!(plain.trajectory.len(), 10);
        assert_eq!(plain.turns.len(), first.turns.len() * 2);
        assert!(plain.route.is_none());
        assert_eq!(plain.markup_records().len(), plain.turns.len() + plain.stops.len() + 10);

        let config = Config {
            consolidation: Some(KMeansParams {
                clusters: 3,
                ..KMeansParams::default()
            }),
            ..Config::default()
        };
        let merged = merge_trips(&[first, second], &config);
        let route = merged.route.as_ref().unwrap();
        assert!(!route.is_empty() && route.len() <= 3);
        assert!(
            merged
                .markup_records()
                .iter()
                .filter(|m| m.category == EventCategory::RouteVertex)
                .count()
                == route.len()
        );
    }

    #[test]
    fn test_merge_no_trips() {
        let merged = merge_trips(&[], &Config::default());
        assert!(merged.trajectory.is_empty());
        assert!(merged.markup_records().is_empty());
    }
}
