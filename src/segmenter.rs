//! # Geometry Segmenter
//!
//! Splits route geometries at aggregated breakpoints.
//!
//! Cuts run once per generated segment, so the inner loop bisects the
//! precomputed cumulative-distance array instead of scanning vertices
//! linearly. Existing vertices are preferred over interpolated points
//! whenever they fall within tolerance of the requested measure, which
//! preserves original vertex precision and avoids spurious micro-segments.
//!
//! Multi-part (ordered MultiLineString) routes are handled by resolving
//! which constituent part a cut range overlaps via its cumulative-length
//! interval, re-basing the measures into that part, and cutting it the same
//! way. Because the breakpoint aggregator injects part boundaries, a range
//! produced by it never spans two parts; ranges from other callers may, and
//! then yield one LineString per overlapped part.

use crate::geo_utils::{cumulative_distances, interpolate_at};
use crate::Error;
use geo::{Coord, LineString};

/// A route geometry prepared for measure-based cutting.
///
/// Wraps the ordered parts of a (Multi)LineString together with per-part
/// cumulative vertex distances and part offsets, computed once at
/// construction.
#[derive(Debug, Clone)]
pub struct RouteGeometry {
    route_id: String,
    parts: Vec<LineString>,
    /// Cumulative vertex distances per part, each starting at 0.
    cum: Vec<Vec<f64>>,
    /// Cumulative length at each part boundary: 0, len1, len1+len2, ...
    /// Always has `parts.len() + 1` entries; the last is the route length.
    offsets: Vec<f64>,
}

impl RouteGeometry {
    /// Prepare a route geometry from its ordered parts.
    ///
    /// Returns [`Error::EmptyGeometry`] when no part carries at least two
    /// vertices.
    pub fn new(route_id: &str, parts: Vec<LineString>) -> Result<Self, Error> {
        let parts: Vec<LineString> = parts.into_iter().filter(|p| p.0.len() >= 2).collect();
        if parts.is_empty() {
            return Err(Error::EmptyGeometry {
                route_id: route_id.to_string(),
            });
        }
        let cum: Vec<Vec<f64>> = parts.iter().map(cumulative_distances).collect();
        let mut offsets = Vec::with_capacity(parts.len() + 1);
        let mut acc = 0.0;
        offsets.push(0.0);
        for c in &cum {
            acc += c.last().copied().unwrap_or(0.0);
            offsets.push(acc);
        }
        Ok(Self {
            route_id: route_id.to_string(),
            parts,
            cum,
            offsets,
        })
    }

    pub fn route_id(&self) -> &str {
        &self.route_id
    }

    /// The route's ordered parts.
    pub fn parts(&self) -> &[LineString] {
        &self.parts
    }

    /// Cumulative length at each part boundary, including 0 and the total
    /// route length. This is the `part_boundaries` input to
    /// [`crate::aggregate_breakpoints`].
    pub fn part_boundaries(&self) -> &[f64] {
        &self.offsets
    }

    /// Total route length in meters.
    pub fn total_length(&self) -> f64 {
        *self.offsets.last().expect("offsets are never empty")
    }

    /// Cut the range `(lo, hi)` out of the route.
    ///
    /// Returns one LineString per part the range overlaps; for
    /// aggregator-produced ranges that is always exactly one. A range
    /// covering the whole route (to rounding) returns the original parts
    /// unmodified - the route is not split for that record.
    pub fn cut(&self, lo: f64, hi: f64, tolerance: f64) -> Result<Vec<LineString>, Error> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };

        // Full-coverage shortcut: the record keeps its original geometry.
        if lo == 0.0 && hi.round() == self.total_length().round() {
            return Ok(self.parts.clone());
        }

        let mut pieces = Vec::with_capacity(1);
        for (i, part) in self.parts.iter().enumerate() {
            let start = self.offsets[i];
            let end = self.offsets[i + 1];
            // Linear-overlap test against the part's cumulative-length range.
            if lo < end && hi > start {
                // Re-base the measures into this part.
                let part_lo = (lo - start).max(0.0);
                let part_hi = (hi - start).min(end - start);
                if part_hi - part_lo > f64::EPSILON {
                    pieces.push(cut_part(part, &self.cum[i], part_lo, part_hi, tolerance));
                }
            }
        }
        Ok(pieces)
    }
}

/// Cut `(lo, hi)` out of a single part using bisection on the cumulative
/// vertex distances.
fn cut_part(part: &LineString, cum: &[f64], lo: f64, hi: f64, tolerance: f64) -> LineString {
    let coords = &part.0;

    // Lowest vertex with running distance >= lo, highest with <= hi.
    let first = cum.partition_point(|&d| d < lo);
    let last_pp = cum.partition_point(|&d| d <= hi);

    if first >= last_pp {
        // No vertex survives between the measures: synthesize both ends.
        return LineString::new(vec![
            interpolate_at(part, cum, lo),
            interpolate_at(part, cum, hi),
        ]);
    }
    let last = last_pp - 1;

    let mut kept: Vec<Coord> = coords[first..=last].to_vec();

    // Extend with interpolated endpoints only when the boundary vertex is
    // more than the tolerance away; otherwise the vertex itself stands in
    // for the cut position.
    if cum[first] - lo > tolerance {
        kept.insert(0, interpolate_at(part, cum, lo));
    }
    if hi - cum[last] > tolerance {
        kept.push(interpolate_at(part, cum, hi));
    }

    // A lone surviving vertex is bracketed into a valid two-point line.
    if kept.len() == 1 {
        let v = kept[0];
        kept = vec![interpolate_at(part, cum, lo), v, interpolate_at(part, cum, hi)];
        kept.dedup();
        if kept.len() == 1 {
            kept.push(v);
        }
    }

    LineString::new(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::linestring_length;

    fn line(coords: &[(f64, f64)]) -> LineString {
        LineString::new(coords.iter().map(|&(x, y)| Coord { x, y }).collect())
    }

    fn straight_route() -> RouteGeometry {
        RouteGeometry::new(
            "R1",
            vec![line(&[(0.0, 0.0), (200.0, 0.0), (500.0, 0.0)])],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let err = RouteGeometry::new("R1", vec![line(&[(0.0, 0.0)])]).unwrap_err();
        assert!(matches!(err, Error::EmptyGeometry { .. }));
    }

    #[test]
    fn test_part_boundaries() {
        let route = RouteGeometry::new(
            "R1",
            vec![
                line(&[(0.0, 0.0), (120.0, 0.0)]),
                line(&[(120.0, 0.0), (120.0, 180.0)]),
            ],
        )
        .unwrap();
        assert_eq!(route.part_boundaries(), &[0.0, 120.0, 300.0]);
        assert_eq!(route.total_length(), 300.0);
    }

    #[test]
    fn test_cut_between_vertices_interpolates() {
        let route = straight_route();
        let pieces = route.cut(100.0, 250.0, 1.0).unwrap();
        assert_eq!(pieces.len(), 1);
        // 200 is an existing vertex, 100 and 250 are interpolated
        assert_eq!(
            pieces[0],
            line(&[(100.0, 0.0), (200.0, 0.0), (250.0, 0.0)])
        );
    }

    #[test]
    fn test_cut_prefers_existing_vertex_within_tolerance() {
        let route = straight_route();
        // 199.5 is within tolerance of the vertex at 200: no interpolation
        let pieces = route.cut(199.5, 500.0, 1.0).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], line(&[(200.0, 0.0), (500.0, 0.0)]));
    }

    #[test]
    fn test_cut_with_no_interior_vertex() {
        let route = straight_route();
        let pieces = route.cut(300.0, 400.0, 1.0).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], line(&[(300.0, 0.0), (400.0, 0.0)]));
    }

    #[test]
    fn test_full_coverage_returns_original() {
        let route = straight_route();
        let pieces = route.cut(0.0, 500.2, 1.0).unwrap();
        assert_eq!(pieces, route.parts().to_vec());
    }

    #[test]
    fn test_multipart_cut_rebases_into_part() {
        let route = RouteGeometry::new(
            "R1",
            vec![
                line(&[(0.0, 0.0), (200.0, 0.0)]),
                line(&[(200.0, 0.0), (200.0, 300.0)]),
            ],
        )
        .unwrap();
        // (250, 400) falls entirely in the second part: 50..200 re-based
        let pieces = route.cut(250.0, 400.0, 1.0).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0], line(&[(200.0, 50.0), (200.0, 200.0)]));
    }

    #[test]
    fn test_range_spanning_parts_yields_piece_per_part() {
        let route = RouteGeometry::new(
            "R1",
            vec![
                line(&[(0.0, 0.0), (200.0, 0.0)]),
                line(&[(200.0, 0.0), (200.0, 300.0)]),
            ],
        )
        .unwrap();
        let pieces = route.cut(150.0, 260.0, 1.0).unwrap();
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0], line(&[(150.0, 0.0), (200.0, 0.0)]));
        assert_eq!(pieces[1], line(&[(200.0, 0.0), (200.0, 60.0)]));
    }

    #[test]
    fn test_segmentation_coverage() {
        // Cutting at every breakpoint pair reconstructs the route length
        let route = RouteGeometry::new(
            "R1",
            vec![line(&[
                (0.0, 0.0),
                (130.0, 0.0),
                (130.0, 170.0),
                (400.0, 170.0),
            ])],
        )
        .unwrap();
        let breakpoints = [0.0, 95.0, 130.0, 287.5, 410.0, route.total_length()];
        let mut total = 0.0;
        for w in breakpoints.windows(2) {
            for piece in route.cut(w[0], w[1], 1.0).unwrap() {
                total += linestring_length(&piece);
            }
        }
        assert!(
            (total - route.total_length()).abs() <= 1.0,
            "reconstructed {} vs {}",
            total,
            route.total_length()
        );
    }

    #[test]
    fn test_inverted_range_swapped() {
        let route = straight_route();
        let a = route.cut(250.0, 100.0, 1.0).unwrap();
        let b = route.cut(100.0, 250.0, 1.0).unwrap();
        assert_eq!(a, b);
    }
}
