use super::KMeansParams;
use crate::geo::Coord;

fn distance_sq(a: Coord, b: Coord) -> f64 {
    let dx = a.lon - b.lon;
    let dy = a.lat - b.lat;
    dx * dx + dy * dy
}

fn nearest(centers: &[Coord], p: Coord) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, c) in centers.iter().enumerate() {
        let d = distance_sq(*c, p);
        if d < best_dist {
            best = i;
            best_dist = d;
        }
    }
    best
}

/// Farthest-point initialisation: the seed picks the first center, each
/// following center is the point farthest from all centers chosen so far.
fn initial_centers(points: &[Coord], k: usize, seed: u64) -> Vec<Coord> {
    let first = (seed % points.len() as u64) as usize;
    let mut centers = vec![points[first]];
    let mut closest: Vec<f64> = points.iter().map(|p| distance_sq(*p, points[first])).collect();

    while centers.len() < k {
        let (far, _) = closest
            .iter()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, d)| {
                if *d > best.1 { (i, *d) } else { best }
            });
        let center = points[far];
        centers.push(center);
        for (d, p) in closest.iter_mut().zip(points) {
            *d = d.min(distance_sq(*p, center));
        }
    }

    centers
}

/// Partitions points into at most `params.clusters` groups with Lloyd
/// iterations. Every point receives a label; the result is fully determined
/// by the input order and `params.seed`.
pub fn kmeans(points: &[Coord], params: &KMeansParams) -> Vec<Option<usize>> {
    let k = params.clusters.min(points.len());
    if k == 0 {
        return vec![None; points.len()];
    }

    let mut centers = initial_centers(points, k, params.seed);
    let mut assignment: Vec<usize> = points.iter().map(|p| nearest(&centers, *p)).collect();

    for _ in 0..params.max_iterations {
        let mut sums = vec![(0.0, 0.0, 0usize); k];
        for (p, &c) in points.iter().zip(&assignment) {
            sums[c].0 += p.lon;
            sums[c].1 += p.lat;
            sums[c].2 += 1;
        }
        for (center, (lon, lat, count)) in centers.iter_mut().zip(sums) {
            if count > 0 {
                *center = Coord::new(lon / count as f64, lat / count as f64);
            }
        }

        let next: Vec<usize> = points.iter().map(|p| nearest(&centers, *p)).collect();
        if next == assignment {
            break;
        }
        assignment = next;
    }

    assignment.into_iter().map(Some).collect()
}
