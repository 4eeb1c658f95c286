use std::collections::{BTreeMap, HashSet};

use crate::geo::{Coord, centroid, euclidean};
use crate::types::{PositionSample, StopEvent};
use crate::utility::mean;

/// Index of the member nearest (Euclidean) to the arithmetic centroid.
/// Ties go to the earlier member.
pub fn medoid_index(members: &[Coord]) -> Option<usize> {
    let center = centroid(members)?;
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in members.iter().enumerate() {
        let d = euclidean(*p, center);
        if best.is_none_or(|(_, best_d)| d < best_d) {
            best = Some((i, d));
        }
    }
    best.map(|(i, _)| i)
}

/// One [`StopEvent`] per labelled group, in label order. Noise (`None`) is
/// ignored. Events that land on the same medoid coordinate are emitted
/// once.
pub fn medoid_events(samples: &[PositionSample], labels: &[Option<usize>]) -> Vec<StopEvent> {
    let mut groups: BTreeMap<usize, Vec<&PositionSample>> = BTreeMap::new();
    for (sample, label) in samples.iter().zip(labels) {
        if let Some(label) = label {
            groups.entry(*label).or_default().push(sample);
        }
    }

    let mut seen = HashSet::new();
    let mut events = Vec::with_capacity(groups.len());

    for members in groups.values() {
        let coords: Vec<Coord> = members.iter().map(|s| s.coord()).collect();
        let Some(medoid) = medoid_index(&coords).map(|i| members[i]) else {
            continue;
        };

        if !seen.insert((medoid.lon.to_bits(), medoid.lat.to_bits())) {
            continue;
        }

        let times: Vec<f64> = members.iter().map(|s| s.time).collect();
        let speeds: Vec<f64> = members.iter().map(|s| s.speed).collect();

        events.push(StopEvent {
            time: mean(&times),
            lon: medoid.lon,
            lat: medoid.lat,
            speed: mean(&speeds),
        });
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(time: f64, lon: f64, lat: f64, speed: f64) -> PositionSample {
        PositionSample::new(time, lon, lat, speed)
    }

    #[test]
    fn test_medoid_is_a_member() {
        let members = vec![
            Coord::new(0.0, 0.0),
            Coord::new(1.0, 0.0),
            Coord::new(0.0, 1.0),
            Coord::new(1.0, 1.0),
            Coord::new(0.6, 0.4),
        ];
        assert_eq!(medoid_index(&members), Some(4));
        assert_eq!(medoid_index(&[]), None);
    }

    #[test]
    fn test_events_use_means_and_skip_noise() {
        let samples = vec![
            sample(10.0, 0.0, 0.0, 1.0),
            sample(20.0, 0.2, 0.0, 3.0),
            sample(30.0, 0.1, 0.0, 2.0),
            sample(40.0, 9.0, 9.0, 50.0),
        ];
        let labels = vec![Some(0), Some(0), Some(0), None];

        let events = medoid_events(&samples, &labels);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 20.0);
        assert_eq!(events[0].speed, 2.0);
        assert_eq!((events[0].lon, events[0].lat), (0.1, 0.0));
    }

    #[test]
    fn test_duplicate_medoids_are_collapsed() {
        let samples = vec![
            sample(1.0, 0.0, 0.0, 0.0),
            sample(2.0, 0.0, 0.0, 0.0),
        ];
        let events = medoid_events(&samples, &[Some(0), Some(1)]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time, 1.0);
    }
}
