use rstar::{AABB, RTree, RTreeObject};
use std::collections::VecDeque;

use super::DbscanParams;
use crate::geo::{Coord, manhattan};

/// A point with its input index for R-tree queries.
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    idx: usize,
    lon: f64,
    lat: f64,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lon, self.lat])
    }
}

fn build_rtree(points: &[Coord]) -> RTree<IndexedPoint> {
    let indexed: Vec<IndexedPoint> = points
        .iter()
        .enumerate()
        .map(|(idx, p)| IndexedPoint {
            idx,
            lon: p.lon,
            lat: p.lat,
        })
        .collect();
    RTree::bulk_load(indexed)
}

/// Indices within Manhattan distance `eps` of `points[i]`, itself included,
/// in ascending order. The square envelope of side `2 * eps` contains the
/// Manhattan ball, so the post-filter only trims its corners.
fn neighbors(tree: &RTree<IndexedPoint>, points: &[Coord], i: usize, eps: f64) -> Vec<usize> {
    let center = points[i];
    let envelope = AABB::from_corners(
        [center.lon - eps, center.lat - eps],
        [center.lon + eps, center.lat + eps],
    );

    let mut found: Vec<usize> = tree
        .locate_in_envelope(&envelope)
        .map(|p| p.idx)
        .filter(|&j| manhattan(center, points[j]) <= eps)
        .collect();
    found.sort_unstable();
    found
}

/// Density-based clustering over `(lon, lat)` with Manhattan distance.
///
/// A point is a core point when at least `min_samples` points (itself
/// included) lie within `eps`. Clusters grow from core points in input
/// order; points reached by no core point are noise (`None`). Deterministic
/// for a given input order.
pub fn dbscan(points: &[Coord], params: &DbscanParams) -> Vec<Option<usize>> {
    expand_clusters(points, params).0
}

/// Labels plus the number of queue insertions made while growing clusters.
/// Each point enters the queue at most once.
fn expand_clusters(points: &[Coord], params: &DbscanParams) -> (Vec<Option<usize>>, usize) {
    let n = points.len();
    let mut labels = vec![None; n];
    if n == 0 {
        return (labels, 0);
    }

    let eps = params.eps.max(0.0);
    let tree = build_rtree(points);
    let mut visited = vec![false; n];
    let mut queued = vec![false; n];
    let mut enqueued = 0;
    let mut next_label = 0;

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        let seeds = neighbors(&tree, points, i, eps);
        if seeds.len() < params.min_samples {
            continue;
        }

        let label = next_label;
        next_label += 1;
        labels[i] = Some(label);

        let mut queue = VecDeque::new();
        let mut reach = seeds;
        loop {
            for j in reach {
                // Noise seen earlier becomes a border point of this cluster.
                if labels[j].is_none() {
                    labels[j] = Some(label);
                }
                if !visited[j] && !queued[j] {
                    queued[j] = true;
                    enqueued += 1;
                    queue.push_back(j);
                }
            }

            let Some(j) = queue.pop_front() else {
                break;
            };
            visited[j] = true;

            let found = neighbors(&tree, points, j, eps);
            reach = if found.len() >= params.min_samples {
                found
            } else {
                Vec::new()
            };
        }
    }

    (labels, enqueued)
}
