//! Nearest-neighbour index over normalized surface points.

use std::collections::{HashMap, HashSet};

use kiddo::SquaredEuclidean;
use kiddo::float::kdtree::KdTree;

/// Leaf capacity of the k-d tree.
const BUCKET: usize = 256;

type SurfaceTree = KdTree<f64, u64, 2, BUCKET, u32>;

/// Result of a nearest query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(super) struct Nearest {
    /// Position of the point in the slice the index was built from.
    pub slot: usize,
    /// Euclidean distance to the query.
    pub distance: f64,
}

enum Backend {
    Tree(SurfaceTree),
    /// Distinct points with the first slot each appeared at. Used when too
    /// many points share one axis value for a leaf split to separate them.
    Scan(Vec<([f64; 2], usize)>),
}

pub(super) struct PointIndex {
    backend: Backend,
    len: usize,
}

impl PointIndex {
    /// Index `points` by their position in the iterator.
    ///
    /// Coincident points are stored once under their first slot, which is
    /// the slot a tie would resolve to anyway.
    pub fn build(points: impl IntoIterator<Item = [f64; 2]>) -> Self {
        let mut seen = HashSet::new();
        let mut distinct = Vec::new();
        let mut len = 0;
        for (slot, point) in points.into_iter().enumerate() {
            len += 1;
            if seen.insert([point[0].to_bits(), point[1].to_bits()]) {
                distinct.push((point, slot));
            }
        }

        // A full leaf whose points all share the split value cannot be split.
        let crowded = (0..2).any(|axis| max_shared_value(&distinct, axis) >= BUCKET);
        let backend = if crowded {
            log::debug!(
                "{} points share an axis value beyond bucket size {}, using linear scan",
                distinct.len(),
                BUCKET
            );
            Backend::Scan(distinct)
        } else {
            let mut tree: SurfaceTree = KdTree::new();
            for (point, slot) in &distinct {
                tree.add(point, *slot as u64);
            }
            Backend::Tree(tree)
        };

        Self { backend, len }
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Nearest indexed point. Exact ties go to the lowest slot.
    pub fn nearest(&self, query: &[f64; 2]) -> Option<Nearest> {
        if self.is_empty() {
            return None;
        }

        let (slot, squared) = match &self.backend {
            Backend::Tree(tree) => nearest_in_tree(tree, query),
            Backend::Scan(points) => nearest_by_scan(points, query)?,
        };

        Some(Nearest {
            slot,
            distance: squared.sqrt(),
        })
    }
}

fn max_shared_value(points: &[([f64; 2], usize)], axis: usize) -> usize {
    let mut counts: HashMap<u64, usize> = HashMap::new();
    for (point, _) in points {
        *counts.entry(point[axis].to_bits()).or_default() += 1;
    }
    counts.into_values().max().unwrap_or(0)
}

fn nearest_in_tree(tree: &SurfaceTree, query: &[f64; 2]) -> (usize, f64) {
    let best = tree.nearest_one::<SquaredEuclidean>(query);

    // Widen the radius a hair so points at exactly `best.distance` are
    // returned whether or not the range query is inclusive.
    let radius = best.distance + f64::EPSILON.max(best.distance * 1e-9);
    let slot = tree
        .within_unsorted::<SquaredEuclidean>(query, radius)
        .into_iter()
        .filter(|n| n.distance == best.distance)
        .map(|n| n.item)
        .min()
        .unwrap_or(best.item);

    (slot as usize, best.distance)
}

/// Points are in slot order, so the first strict minimum is the lowest slot.
fn nearest_by_scan(points: &[([f64; 2], usize)], query: &[f64; 2]) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (point, slot) in points {
        let dx = point[0] - query[0];
        let dy = point[1] - query[1];
        let squared = dx * dx + dy * dy;
        if best.is_none_or(|(_, d)| squared < d) {
            best = Some((*slot, squared));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_empty_index() {
        let index = PointIndex::build(std::iter::empty());
        assert!(index.is_empty());
        assert_eq!(index.nearest(&[0.5, 0.5]), None);
    }

    #[test]
    fn test_nearest_distance_is_euclidean() {
        let index = PointIndex::build([[0.0, 0.0], [0.75, 0.75]]);
        let nearest = index.nearest(&[0.0, 0.5]).unwrap();
        assert_eq!(nearest.slot, 0);
        assert_eq!(nearest.distance, 0.5);
    }

    #[test]
    fn test_tie_goes_to_lowest_slot() {
        // Both points are exactly 0.25 from the query
        let index = PointIndex::build([[0.75, 0.5], [0.25, 0.5]]);
        let nearest = index.nearest(&[0.5, 0.5]).unwrap();
        assert_eq!(nearest.slot, 0);
        assert_eq!(nearest.distance, 0.25);

        let index = PointIndex::build([[0.5, 0.75], [0.5, 0.5], [0.5, 0.5]]);
        assert_eq!(index.nearest(&[0.5, 0.5]).unwrap().slot, 1);
    }

    #[test]
    fn test_many_identical_points() {
        let index = PointIndex::build(std::iter::repeat([0.5, 0.5]).take(1000));
        let nearest = index.nearest(&[0.5, 0.5]).unwrap();
        assert_eq!(nearest.slot, 0);
        assert_eq!(nearest.distance, 0.0);
    }

    #[test]
    fn test_shared_axis_value_beyond_bucket() {
        let points: Vec<[f64; 2]> = (0..600).map(|i| [0.4, i as f64 * 0.001]).collect();
        let index = PointIndex::build(points.iter().copied());
        assert!(matches!(index.backend, Backend::Scan(_)));

        let nearest = index.nearest(&[0.41, 0.2503]).unwrap();
        assert_eq!(nearest.slot, 250);
        assert_relative_eq!(
            nearest.distance,
            (0.01f64.powi(2) + 0.0003f64.powi(2)).sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_scan_matches_tree() {
        // One column of points just under the bucket size
        let points: Vec<[f64; 2]> = (0..BUCKET - 2)
            .map(|i| [0.5, i as f64 / 300.0])
            .chain((0..200).map(|i| [i as f64 / 200.0, 0.3]))
            .collect();
        let tree = PointIndex::build(points.iter().copied());
        assert!(matches!(tree.backend, Backend::Tree(_)));
        let distinct: Vec<_> = points.iter().copied().zip(0..).collect();
        let scan = PointIndex {
            backend: Backend::Scan(distinct),
            len: points.len(),
        };

        for query in [[0.5, 0.5], [0.0, 0.0], [0.77, 0.31], [0.5, 0.3], [1.2, -0.4]] {
            assert_eq!(tree.nearest(&query), scan.nearest(&query), "query {query:?}");
        }
    }

    #[test]
    fn test_scan_tie_goes_to_lowest_slot() {
        let mut points: Vec<[f64; 2]> = (0..BUCKET).map(|i| [0.9, i as f64]).collect();
        points.push([0.25, 0.5]);
        points.push([0.75, 0.5]);
        let index = PointIndex::build(points.iter().copied());
        assert!(matches!(index.backend, Backend::Scan(_)));
        assert_eq!(index.nearest(&[0.5, 0.5]).unwrap().slot, BUCKET);
    }
}
