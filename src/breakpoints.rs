//! # Breakpoint Aggregator
//!
//! Merges the measure breakpoints contributed by every attribute source
//! onto a route's shared base geometry, producing the sorted cut positions
//! the segmenter consumes.
//!
//! Near-coincident breakpoints are collapsed to a single representative
//! (the last of each cluster), trading at most sub-tolerance precision for
//! numerically stable geometry splits. Geometry part boundaries are hard
//! vertices and always survive; supplied breakpoints falling within
//! tolerance of one are redundant and dropped.

use ordered_float::OrderedFloat;
use std::collections::BTreeSet;

/// The aggregated, sorted cut positions for one route.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BreakpointSet {
    /// Strictly sorted breakpoints, always spanning 0 to the route length.
    pub points: Vec<f64>,
}

impl BreakpointSet {
    /// Pair consecutive breakpoints into `(lo, hi)` segment-cut ranges.
    pub fn cut_ranges(&self) -> Vec<(f64, f64)> {
        self.points.windows(2).map(|w| (w[0], w[1])).collect()
    }
}

/// Aggregate event-measure breakpoints with a route's part boundaries.
///
/// `ranges` holds every `(from, to)` interval contributed by any attribute
/// table for this route; `part_boundaries` are the cumulative lengths at
/// each geometry part boundary, including 0 and the total route length
/// (see [`crate::RouteGeometry::part_boundaries`]).
///
/// The result is strictly sorted and, except at part boundaries, no two
/// breakpoints lie within `tolerance` of each other.
pub fn aggregate_breakpoints(
    ranges: &[(f64, f64)],
    part_boundaries: &[f64],
    tolerance: f64,
) -> BreakpointSet {
    // Flatten, set-deduplicate, sort.
    let supplied: BTreeSet<OrderedFloat<f64>> = ranges
        .iter()
        .flat_map(|&(from, to)| [OrderedFloat(from), OrderedFloat(to)])
        .collect();
    let sorted: Vec<f64> = supplied.into_iter().map(OrderedFloat::into_inner).collect();

    // Collapse clusters of near-coincident points, retaining the LAST point
    // of each cluster: scan from the top down and keep a point only when it
    // clears the previously kept one by more than the tolerance.
    let mut kept: Vec<f64> = Vec::with_capacity(sorted.len());
    for &p in sorted.iter().rev() {
        match kept.last() {
            Some(&prev) if prev - p <= tolerance => {}
            _ => kept.push(p),
        }
    }
    kept.reverse();

    // Drop points redundant with a hard geometry vertex, then union with
    // the part boundaries.
    let mut merged: BTreeSet<OrderedFloat<f64>> = kept
        .into_iter()
        .filter(|&p| {
            !part_boundaries
                .iter()
                .any(|&b| (p - b).abs() <= tolerance)
        })
        .map(OrderedFloat)
        .collect();
    merged.extend(part_boundaries.iter().copied().map(OrderedFloat));

    BreakpointSet {
        points: merged.into_iter().map(OrderedFloat::into_inner).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_tables_on_simple_route() {
        // Attribute tables at [100, 250] and [250, 400] on a 500-unit route
        let bp = aggregate_breakpoints(
            &[(100.0, 250.0), (250.0, 400.0)],
            &[0.0, 500.0],
            1.0,
        );
        assert_eq!(bp.points, vec![0.0, 100.0, 250.0, 400.0, 500.0]);
        assert_eq!(
            bp.cut_ranges(),
            vec![(0.0, 100.0), (100.0, 250.0), (250.0, 400.0), (400.0, 500.0)]
        );
    }

    #[test]
    fn test_cluster_collapses_to_last_point() {
        let bp = aggregate_breakpoints(
            &[(100.0, 200.0), (100.4, 200.0), (100.8, 300.0)],
            &[0.0, 500.0],
            1.0,
        );
        // 100.0, 100.4, 100.8 chain within tolerance; the last survives
        assert!(bp.points.contains(&100.8));
        assert!(!bp.points.contains(&100.0));
        assert!(!bp.points.contains(&100.4));
    }

    #[test]
    fn test_breakpoint_near_part_boundary_dropped() {
        // 249.6 is redundant with the hard part boundary at 250
        let bp = aggregate_breakpoints(&[(100.0, 249.6)], &[0.0, 250.0, 500.0], 1.0);
        assert_eq!(bp.points, vec![0.0, 100.0, 250.0, 500.0]);
    }

    #[test]
    fn test_sort_invariant() {
        let bp = aggregate_breakpoints(
            &[(120.0, 400.0), (10.0, 40.0), (40.2, 90.0)],
            &[0.0, 500.0],
            1.0,
        );
        for w in bp.points.windows(2) {
            assert!(w[1] > w[0], "not strictly sorted: {:?}", bp.points);
            let gap = w[1] - w[0];
            let at_boundary = [0.0, 500.0].contains(&w[0]) || [0.0, 500.0].contains(&w[1]);
            assert!(
                gap > 1.0 || at_boundary,
                "sub-tolerance gap {} survived filtering: {:?}",
                gap,
                bp.points
            );
        }
    }

    #[test]
    fn test_no_events_yields_part_boundaries_only() {
        let bp = aggregate_breakpoints(&[], &[0.0, 120.0, 300.0], 1.0);
        assert_eq!(bp.points, vec![0.0, 120.0, 300.0]);
        assert_eq!(bp.cut_ranges(), vec![(0.0, 120.0), (120.0, 300.0)]);
    }

    #[test]
    fn test_duplicate_endpoints_deduplicated() {
        let bp = aggregate_breakpoints(
            &[(100.0, 250.0), (250.0, 400.0), (250.0, 400.0)],
            &[0.0, 500.0],
            1.0,
        );
        assert_eq!(bp.points, vec![0.0, 100.0, 250.0, 400.0, 500.0]);
    }
}
