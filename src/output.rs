//! Reporting and persistence for log statistics and map markup.
//!
//! Statistics rows accumulate in one CSV across runs; markup files are
//! rewritten on every run.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::stats::LogStats;
use crate::types::{EventCategory, MarkupRecord};
use csv::WriterBuilder;
use std::fs::OpenOptions;
use std::path::Path;

/// Logs the headline numbers of a processed log as structured fields.
pub fn print_summary(stats: &LogStats) {
    info!(
        source = stats.source.as_deref().unwrap_or("-"),
        position_frames = stats.position_frames,
        final_points = stats.final_points,
        dropped_pct = stats.dropped_pct(),
        mean_speed = stats.mean_speed,
        stops = stats.stops,
        decel_stops = stats.decel_stops,
        turns = stats.turns,
        "Log summary"
    );
}

/// Logs any serializable row as pretty JSON.
pub fn print_json<T: Serialize>(row: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(row).context("serializing row to JSON")?;
    info!("{json}");
    Ok(())
}

/// Appends `row` to the CSV at `path`. The header is written only when the
/// file is new or still empty, so repeated runs share one header.
pub fn append_record<T: Serialize>(path: impl AsRef<Path>, row: &T) -> Result<()> {
    let path = path.as_ref();
    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("opening stats file '{}'", path.display()))?;
    let needs_header = file.metadata()?.len() == 0;
    debug!(path = %path.display(), needs_header, "Appending row");

    let mut writer = WriterBuilder::new().has_headers(needs_header).from_writer(file);
    writer
        .serialize(row)
        .with_context(|| format!("writing row to '{}'", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Writes markup records to a fresh CSV file, replacing any existing one.
pub fn write_markup(path: impl AsRef<Path>, records: &[MarkupRecord]) -> Result<()> {
    let path = path.as_ref();
    let mut writer = WriterBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("creating markup file '{}'", path.display()))?;

    for (i, record) in records.iter().enumerate() {
        writer
            .serialize(record)
            .with_context(|| format!("writing markup row {i} to '{}'", path.display()))?;
    }
    writer.flush()?;

    let count = |category: EventCategory| records.iter().filter(|r| r.category == category).count();
    debug!(
        path = %path.display(),
        stops = count(EventCategory::Stop),
        turns = count(EventCategory::Turn),
        route = count(EventCategory::RouteVertex),
        "Markup written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StopEvent, TurnEvent};
    use std::env;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        env::temp_dir().join(name)
    }

    #[test]
    fn test_print_summary_and_json() {
        let stats = LogStats::from_error("read_error", "missing").with_source("trip.txt");
        print_summary(&stats);
        print_json(&stats).unwrap();
        let stop = StopEvent {
            time: 0.0,
            lon: -77.68,
            lat: 43.08,
            speed: 0.0,
        };
        print_json(&MarkupRecord::from(&stop)).unwrap();
    }

    #[test]
    fn test_append_record_writes_header_once() {
        let path = temp_path("trip_events_test_header.csv");
        let _ = fs::remove_file(&path);

        let stats = LogStats::default();
        append_record(&path, &stats).unwrap();
        append_record(&path, &stats).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.contains("timestamp")).count();
        assert_eq!(header_count, 1);
        // 1 header + 2 data rows
        assert_eq!(content.lines().count(), 3);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_headers_empty_existing_file() {
        let path = temp_path("trip_events_test_empty.csv");
        fs::write(&path, "").unwrap();

        append_record(&path, &LogStats::default().with_source("a.txt")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("timestamp,source,"));
        assert!(lines[0].contains(",decel_stops,"));
        assert!(lines[1].contains(",a.txt,"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_append_record_missing_directory_names_path() {
        let err = append_record("/nonexistent/dir/stats.csv", &LogStats::default()).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/dir/stats.csv"));
    }

    #[test]
    fn test_write_markup_replaces_file() {
        let path = temp_path("trip_events_test_markup.csv");
        let stop = StopEvent {
            time: 10.0,
            lon: -77.68,
            lat: 43.08,
            speed: 0.2,
        };
        let turn = TurnEvent {
            lon: -77.67,
            lat: 43.09,
            speed: 12.0,
            smoothed_bearing_delta: -45.0,
            is_right_turn: false,
        };
        let records = vec![MarkupRecord::from(&stop), MarkupRecord::from(&turn)];

        write_markup(&path, &records).unwrap();
        write_markup(&path, &records[..1]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "name,lon,lat,speed,category");
        assert!(lines[1].starts_with("Stop,"));
        assert!(lines[1].ends_with(",stop"));
        assert_eq!(records[1].category, EventCategory::Turn);

        fs::remove_file(&path).unwrap();
    }
}
