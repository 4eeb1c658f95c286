//! Coordinate helpers: sexagesimal decoding, distances and bearings.

use crate::parser::frame::FrameError;

/// Mean Earth radius used by [`haversine`], in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A longitude/latitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

impl Coord {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// Converts a `DDMM.mmmm` field into decimal degrees.
///
/// The receiver marks western and southern values with a leading `'0'`
/// rather than relying on the hemisphere letter: the digit is stripped and
/// the result negated.
///
/// The degree part is always the first two digits, so a longitude of 100°
/// or more in either hemisphere carries no leading `'0'` and decodes
/// wrongly (`10030.0000` reads as 10.5).
///
/// # Errors
///
/// Returns [`FrameError::BadCoordinate`] when the field is too short or
/// either the degree or minute part is not numeric.
pub fn sexagesimal_to_decimal(field: &str) -> Result<f64, FrameError> {
    let field = field.trim();
    let (negative, digits) = match field.strip_prefix('0') {
        Some(rest) => (true, rest),
        None => (false, field),
    };

    let bad = || FrameError::BadCoordinate(field.to_string());

    if digits.len() < 3 || !digits.is_char_boundary(2) {
        return Err(bad());
    }

    let degrees: f64 = digits[..2].parse().map_err(|_| bad())?;
    let minutes: f64 = digits[2..].parse().map_err(|_| bad())?;
    let value = degrees + minutes / 60.0;

    Ok(if negative { -value } else { value })
}

/// Great-circle distance between two coordinates in meters.
pub fn haversine(a: Coord, b: Coord) -> f64 {
    let phi_1 = a.lat.to_radians();
    let phi_2 = b.lat.to_radians();
    let delta_phi = (b.lat - a.lat).to_radians();
    let delta_lambda = (b.lon - a.lon).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi_1.cos() * phi_2.cos() * (delta_lambda / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_M * c
}

/// Heading from `a` to `b` in degrees, using a planar small-angle
/// approximation (longitude scaled by `cos(lat_a)`).
///
/// Measured counter-clockwise from east, in `(-180, 180]`.
pub fn planar_bearing(a: Coord, b: Coord) -> f64 {
    let d_lat = b.lat - a.lat;
    let d_lon = b.lon - a.lon;
    d_lat.atan2(a.lat.to_radians().cos() * d_lon).to_degrees()
}

/// Compass course from `a` to `b` in degrees, clockwise from north, in
/// `[0, 360)`. Matches the course field reported by the receiver.
pub fn course_bearing(a: Coord, b: Coord) -> f64 {
    let d_lat = b.lat - a.lat;
    let d_lon = (b.lon - a.lon) * a.lat.to_radians().cos();
    d_lon.atan2(d_lat).to_degrees().rem_euclid(360.0)
}

pub fn manhattan(a: Coord, b: Coord) -> f64 {
    (a.lon - b.lon).abs() + (a.lat - b.lat).abs()
}

pub fn euclidean(a: Coord, b: Coord) -> f64 {
    (a.lon - b.lon).hypot(a.lat - b.lat)
}

/// Arithmetic centroid of a set of points. `None` for an empty slice.
pub fn centroid(points: &[Coord]) -> Option<Coord> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lon, lat) = points
        .iter()
        .fold((0.0, 0.0), |(lon, lat), p| (lon + p.lon, lat + p.lat));
    Some(Coord::new(lon / n, lat / n))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sexagesimal_northern_latitude() {
        let value = sexagesimal_to_decimal("4305.1494").unwrap();
        assert!(approx(value, 43.0 + 5.1494 / 60.0));
    }

    #[test]
    fn test_sexagesimal_leading_zero_is_negated() {
        let value = sexagesimal_to_decimal("07740.8738").unwrap();
        assert!(approx(value, -(77.0 + 40.8738 / 60.0)));
    }

    #[test]
    fn test_sexagesimal_formatted_values() {
        for degrees in [10u32, 25, 43, 89] {
            for minutes in [0.0, 5.1494, 30.5, 59.9999] {
                let field = format!("{:02}{:07.4}", degrees, minutes);
                let value = sexagesimal_to_decimal(&field).unwrap();
                assert!(
                    approx(value, degrees as f64 + minutes / 60.0),
                    "field {field} decoded to {value}"
                );

                let flagged = format!("0{field}");
                let negated = sexagesimal_to_decimal(&flagged).unwrap();
                assert!(approx(negated, -value));
            }
        }
    }

    #[test]
    fn test_sexagesimal_rejects_garbage() {
        assert!(sexagesimal_to_decimal("").is_err());
        assert!(sexagesimal_to_decimal("0").is_err());
        assert!(sexagesimal_to_decimal("43").is_err());
        assert!(sexagesimal_to_decimal("4x05.1494").is_err());
        assert!(sexagesimal_to_decimal("4305.1z94").is_err());
    }

    #[test]
    fn test_haversine_zero_and_symmetry() {
        let a = Coord::new(-77.681236, 43.085823);
        let b = Coord::new(-77.672000, 43.090100);

        assert_eq!(haversine(a, a), 0.0);
        assert_eq!(haversine(a, b), haversine(b, a));
    }

    #[test]
    fn test_haversine_one_degree_of_latitude() {
        let d = haversine(Coord::new(0.0, 0.0), Coord::new(0.0, 1.0));
        // pi * R / 180
        assert!((d - 111_194.93).abs() < 1.0);
    }

    #[test]
    fn test_degree_part_is_two_digits() {
        // 100°30' east would need three degree digits; it reads as 10°030'.
        assert!(approx(sexagesimal_to_decimal("10030.0000").unwrap(), 10.5));
    }

    #[test]
    fn test_course_bearing_is_clockwise_from_north() {
        let origin = Coord::new(0.0, 0.0);
        assert!(approx(course_bearing(origin, Coord::new(0.0, 1.0)), 0.0));
        assert!(approx(course_bearing(origin, Coord::new(1.0, 0.0)), 90.0));
        assert!(approx(course_bearing(origin, Coord::new(0.0, -1.0)), 180.0));
        assert!(approx(course_bearing(origin, Coord::new(-1.0, 0.0)), 270.0));
    }

    #[test]
    fn test_planar_bearing_cardinal_directions() {
        let origin = Coord::new(0.0, 0.0);
        assert!(approx(planar_bearing(origin, Coord::new(1.0, 0.0)), 0.0));
        assert!(approx(planar_bearing(origin, Coord::new(0.0, 1.0)), 90.0));
        assert!(approx(planar_bearing(origin, Coord::new(-1.0, 0.0)), 180.0));
        assert!(approx(planar_bearing(origin, Coord::new(0.0, -1.0)), -90.0));
    }

    #[test]
    fn test_centroid_of_points() {
        assert!(centroid(&[]).is_none());

        let c = centroid(&[Coord::new(0.0, 0.0), Coord::new(2.0, 4.0)]).unwrap();
        assert!(approx(c.lon, 1.0));
        assert!(approx(c.lat, 2.0));
    }

    #[test]
    fn test_distances() {
        let a = Coord::new(0.0, 0.0);
        let b = Coord::new(3.0, -4.0);
        assert!(approx(manhattan(a, b), 7.0));
        assert!(approx(euclidean(a, b), 5.0));
    }
}
