//! Single-sentence decoding for `$GPRMC` and `$GPGGA` lines.

use serde::Serialize;
use thiserror::Error;

use crate::geo::sexagesimal_to_decimal;

pub const POSITION_HEADER: &str = "$GPRMC";
pub const FIX_QUALITY_HEADER: &str = "$GPGGA";
/// Acknowledgment sentence the logger sometimes writes over the speed field.
pub const ACK_SENTINEL: &str = "$PGACK";
/// Knots to miles per hour.
pub const KNOTS_TO_MPH: f64 = 1.151;

const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FrameKind {
    Position,
    FixQuality,
}

impl FrameKind {
    /// Recognizes a sentence by its prefix.
    pub fn of(line: &str) -> Option<Self> {
        if line.starts_with(POSITION_HEADER) {
            Some(FrameKind::Position)
        } else if line.starts_with(FIX_QUALITY_HEADER) {
            Some(FrameKind::FixQuality)
        } else {
            None
        }
    }
}

/// A recoverable problem with one line. The line is skipped and parsing
/// continues.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    #[error("{kind:?} frame is missing field {index}")]
    MissingField { kind: FrameKind, index: usize },
    #[error("empty hemisphere-tagged coordinate")]
    EmptyCoordinate,
    #[error("acknowledgment sentinel in speed field")]
    AckSentinel,
    #[error("fix status {0:?} is not valid")]
    InvalidFix(String),
    #[error("malformed coordinate {0:?}")]
    BadCoordinate(String),
    #[error("coordinate out of range: lon {lon}, lat {lat}")]
    OutOfRange { lon: f64, lat: f64 },
    #[error("malformed numeric field {index}: {value:?}")]
    BadNumber { index: usize, value: String },
    #[error("malformed timestamp {0:?}")]
    BadTime(String),
    #[error("line holds more than one sentence")]
    EmbeddedHeader,
    #[error("time {time} does not advance past {last}")]
    OutOfOrder { time: f64, last: f64 },
}

/// Fields of a `$GPRMC` sentence, speed already converted to mph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionFrame {
    /// Seconds of day.
    pub time: f64,
    pub valid: bool,
    pub lat: f64,
    pub lon: f64,
    pub speed: f64,
    /// Course over ground in degrees, when the receiver reports one.
    pub course: Option<f64>,
}

/// Fields of a `$GPGGA` sentence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixQualityFrame {
    pub time: Option<f64>,
    pub satellites: u32,
    pub hdop: f64,
    pub altitude: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawFrame {
    Position(PositionFrame),
    FixQuality(FixQualityFrame),
}

impl RawFrame {
    pub fn kind(&self) -> FrameKind {
        match self {
            RawFrame::Position(_) => FrameKind::Position,
            RawFrame::FixQuality(_) => FrameKind::FixQuality,
        }
    }
}

/// Decodes one line. Lines that are neither frame kind yield `Ok(None)`.
///
/// Example inputs:
///
/// ```text
/// $GPRMC,183410.001,A,4305.1494,N,07740.8738,W,0.02,342.94,030319,,,A*7A
/// $GPGGA,183410.200,4305.1494,N,07740.8738,W,1,08,1.03,154.2,M,-34.4,M,,*5F
/// ```
pub fn parse_line(line: &str, require_valid_fix: bool) -> Result<Option<RawFrame>, FrameError> {
    match FrameKind::of(line) {
        Some(FrameKind::Position) => {
            parse_position(line, require_valid_fix).map(|f| Some(RawFrame::Position(f)))
        }
        Some(FrameKind::FixQuality) => parse_fix_quality(line).map(|f| Some(RawFrame::FixQuality(f))),
        None => Ok(None),
    }
}

/// True when a second sentence header appears after the start of `text`,
/// which happens when the logger writes two sentences onto one line.
pub fn has_embedded_header(text: &str) -> bool {
    text.get(1..)
        .map(|rest| rest.contains(POSITION_HEADER) || rest.contains(FIX_QUALITY_HEADER))
        .unwrap_or(false)
}

fn parse_position(line: &str, require_valid_fix: bool) -> Result<PositionFrame, FrameError> {
    let fields: Vec<&str> = line.split(',').collect();
    let field = |index: usize| {
        fields.get(index).copied().ok_or(FrameError::MissingField {
            kind: FrameKind::Position,
            index,
        })
    };

    let lat_field = field(3)?;
    let lon_field = field(5)?;
    let speed_field = field(7)?;

    if lat_field.is_empty() || lon_field.is_empty() {
        return Err(FrameError::EmptyCoordinate);
    }
    if speed_field.starts_with(ACK_SENTINEL) {
        return Err(FrameError::AckSentinel);
    }

    let status = field(2)?;
    let valid = status == "A";
    if require_valid_fix && !valid {
        return Err(FrameError::InvalidFix(status.to_string()));
    }

    let time = parse_time(field(1)?)?;
    let lat = sexagesimal_to_decimal(lat_field)?;
    let lon = sexagesimal_to_decimal(lon_field)?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(FrameError::OutOfRange { lon, lat });
    }

    let knots = parse_number(speed_field, 7)?;
    let speed = round_to(knots * KNOTS_TO_MPH, 3);

    let course = fields
        .get(8)
        .and_then(|c| c.trim().parse::<f64>().ok())
        .filter(|c| c.is_finite());

    Ok(PositionFrame {
        time,
        valid,
        lat,
        lon,
        speed,
        course,
    })
}

fn parse_fix_quality(line: &str) -> Result<FixQualityFrame, FrameError> {
    let fields: Vec<&str> = line.split(',').collect();
    let field = |index: usize| match fields.get(index).copied() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(FrameError::MissingField {
            kind: FrameKind::FixQuality,
            index,
        }),
    };

    let hdop = parse_number(field(8)?, 8)?;
    let altitude = parse_number(field(9)?, 9)?;
    let satellites_field = field(7)?;
    let satellites = satellites_field
        .trim()
        .parse::<u32>()
        .map_err(|_| FrameError::BadNumber {
            index: 7,
            value: satellites_field.to_string(),
        })?;
    let time = fields.get(1).and_then(|t| parse_time(t).ok());

    Ok(FixQualityFrame {
        time,
        satellites,
        hdop: round_to(hdop, 4),
        altitude: round_to(altitude, 1),
    })
}

/// `hhmmss[.sss]` to seconds of day.
pub fn parse_time(field: &str) -> Result<f64, FrameError> {
    let bad = || FrameError::BadTime(field.to_string());
    let (whole, frac) = field.trim().split_once('.').unwrap_or((field.trim(), ""));

    if whole.len() != 6 || !whole.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }

    let part = |range: std::ops::Range<usize>| whole[range].parse::<u32>().map_err(|_| bad());
    let (hours, minutes, seconds) = (part(0..2)?, part(2..4)?, part(4..6)?);
    if hours > 23 || minutes > 59 || seconds > 60 {
        return Err(bad());
    }

    let fraction = if frac.is_empty() {
        0.0
    } else {
        format!("0.{frac}").parse::<f64>().map_err(|_| bad())?
    };

    let time = f64::from(hours * 3600 + minutes * 60 + seconds) + fraction;
    debug_assert!(time < SECONDS_PER_DAY + 1.0);
    Ok(time)
}

fn parse_number(value: &str, index: usize) -> Result<f64, FrameError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| FrameError::BadNumber {
            index,
            value: value.to_string(),
        })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Turns receiver times into a strictly increasing key for one log.
///
/// A backwards jump of more than half a day is read as midnight rollover;
/// any other non-increasing time is rejected.
#[derive(Debug, Default)]
pub struct Clock {
    day_offset: f64,
    last: Option<f64>,
}

impl Clock {
    pub fn advance(&mut self, time_of_day: f64) -> Result<f64, FrameError> {
        let mut time = time_of_day + self.day_offset;

        if let Some(last) = self.last {
            if time <= last {
                if last - time > SECONDS_PER_DAY / 2.0 {
                    self.day_offset += SECONDS_PER_DAY;
                    time += SECONDS_PER_DAY;
                } else {
                    return Err(FrameError::OutOfOrder { time, last });
                }
            }
        }

        self.last = Some(time);
        Ok(time)
    }
}
