//! # Geometry Utilities
//!
//! Core planar geometry helpers shared by the segmentation and identity
//! engines.
//!
//! All geometries are expected in a single projected CRS with meters as the
//! linear unit; distances here are straight-line Euclidean distances, not
//! geodesic ones.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`euclidean_distance`] | Planar distance between two coordinates |
//! | [`linestring_length`] | Total length of a LineString in meters |
//! | [`cumulative_distances`] | Running distance at every vertex |
//! | [`interpolate_at`] | Point at a given measure along a LineString |
//! | [`coord_key`] | Exact (bit-pattern) hash key for a coordinate |
//! | [`edge_set`] | Undirected edge keys of a LineString |
//! | [`wkb_linestring`] | Well-known-binary encoding, the identity equality key |
//! | [`linemerge`] | Merge touching LineStrings into maximal contiguous arcs |
//!
//! ## Example
//!
//! ```rust
//! use geo::{Coord, LineString};
//! use nrn_lrs::geo_utils;
//!
//! let line = LineString::new(vec![
//!     Coord { x: 0.0, y: 0.0 },
//!     Coord { x: 300.0, y: 0.0 },
//!     Coord { x: 300.0, y: 400.0 },
//! ]);
//!
//! assert_eq!(geo_utils::linestring_length(&line), 700.0);
//!
//! let cum = geo_utils::cumulative_distances(&line);
//! assert_eq!(cum, vec![0.0, 300.0, 700.0]);
//!
//! let mid = geo_utils::interpolate_at(&line, &cum, 150.0);
//! assert_eq!(mid, Coord { x: 150.0, y: 0.0 });
//! ```
//!
//! ## Exact coordinate identity
//!
//! The identity engine matches geometries by exact coordinate-sequence
//! equality, with no spatial tolerance. [`coord_key`] therefore keys on the
//! raw `f64` bit patterns: two coordinates are the same node only if they
//! are byte-identical, mirroring the WKB comparison used for whole arcs.

use geo::{Coord, Distance, Euclidean, LineString, Point};
use std::collections::{HashMap, HashSet, VecDeque};

/// Exact hash key for a coordinate: the bit patterns of its ordinates.
pub type CoordKey = (u64, u64);

/// Undirected edge key: the two endpoint keys in sorted order.
pub type EdgeKey = (CoordKey, CoordKey);

// =============================================================================
// Distance Functions
// =============================================================================

/// Planar Euclidean distance between two coordinates, in meters.
#[inline]
pub fn euclidean_distance(a: &Coord, b: &Coord) -> f64 {
    Euclidean::distance(Point::from(*a), Point::from(*b))
}

/// Total length of a LineString in meters. Fewer than two vertices is 0.0.
pub fn linestring_length(line: &LineString) -> f64 {
    line.0
        .windows(2)
        .map(|w| euclidean_distance(&w[0], &w[1]))
        .sum()
}

/// Cumulative distance at every vertex of a LineString, starting at 0.0.
///
/// The last entry equals [`linestring_length`]. This is the array the
/// segmenter bisects when cutting at a measure.
pub fn cumulative_distances(line: &LineString) -> Vec<f64> {
    let mut cum = Vec::with_capacity(line.0.len());
    let mut acc = 0.0;
    cum.push(0.0);
    for w in line.0.windows(2) {
        acc += euclidean_distance(&w[0], &w[1]);
        cum.push(acc);
    }
    cum
}

/// Interpolate the point at `measure` meters along a LineString.
///
/// `cum` must be the [`cumulative_distances`] of the same line. Measures
/// outside `[0, length]` clamp to the corresponding endpoint. Existing
/// vertices are returned exactly when the measure lands on one.
pub fn interpolate_at(line: &LineString, cum: &[f64], measure: f64) -> Coord {
    let coords = &line.0;
    if measure <= 0.0 {
        return coords[0];
    }
    let total = *cum.last().expect("cumulative distances are never empty");
    if measure >= total {
        return *coords.last().expect("linestring has vertices");
    }

    // Lowest vertex index whose running distance reaches the measure.
    let hi = cum.partition_point(|&d| d < measure);
    let lo = hi - 1;
    if (cum[hi] - measure).abs() == 0.0 {
        return coords[hi];
    }

    let span = cum[hi] - cum[lo];
    if span <= f64::EPSILON {
        return coords[lo];
    }
    let t = (measure - cum[lo]) / span;
    Coord {
        x: coords[lo].x + t * (coords[hi].x - coords[lo].x),
        y: coords[lo].y + t * (coords[hi].y - coords[lo].y),
    }
}

// =============================================================================
// Exact Coordinate Keys
// =============================================================================

/// Exact hash key for a coordinate (raw `f64` bit patterns).
#[inline]
pub fn coord_key(c: &Coord) -> CoordKey {
    (c.x.to_bits(), c.y.to_bits())
}

/// Undirected edge key for a pair of coordinates.
#[inline]
pub fn edge_key(a: &Coord, b: &Coord) -> EdgeKey {
    let ka = coord_key(a);
    let kb = coord_key(b);
    if ka <= kb {
        (ka, kb)
    } else {
        (kb, ka)
    }
}

/// The set of undirected edges of a LineString.
///
/// Two LineStrings share linear extent exactly when their edge sets
/// intersect; a segment is covered by an arc exactly when every one of its
/// edges belongs to the arc's set.
pub fn edge_set(line: &LineString) -> HashSet<EdgeKey> {
    line.0.windows(2).map(|w| edge_key(&w[0], &w[1])).collect()
}

// =============================================================================
// WKB Encoding
// =============================================================================

/// Encode a LineString as little-endian well-known binary.
///
/// Layout: byte order marker (0x01), geometry type (2), vertex count, then
/// x/y doubles. The identity engine compares these byte strings directly;
/// any coordinate-sequence change, however small, produces different bytes.
pub fn wkb_linestring(line: &LineString) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9 + line.0.len() * 16);
    buf.push(1u8); // little-endian
    buf.extend_from_slice(&2u32.to_le_bytes()); // wkbLineString
    buf.extend_from_slice(&(line.0.len() as u32).to_le_bytes());
    for c in &line.0 {
        buf.extend_from_slice(&c.x.to_le_bytes());
        buf.extend_from_slice(&c.y.to_le_bytes());
    }
    buf
}

// =============================================================================
// Line Merging
// =============================================================================

/// Merge touching LineStrings into maximal contiguous arcs.
///
/// Lines are joined only at nodes where exactly two line endpoints meet
/// (degree-2 nodes); higher-degree nodes and free ends terminate arcs, so
/// the result is the same maximal-contiguity dissolve a linemerge produces.
/// Nodes listed in `barriers` never join even at degree 2 - the identity
/// engine passes non-dead-end junctions here so that arcs never merge
/// across a real topological junction.
///
/// Input order is preserved where possible, making the output deterministic
/// for a given input ordering.
pub fn linemerge(lines: &[&LineString], barriers: &HashSet<CoordKey>) -> Vec<LineString> {
    // Endpoint incidence: node -> (line index, touches-at-start)
    let mut incidence: HashMap<CoordKey, Vec<(usize, bool)>> = HashMap::new();
    for (i, line) in lines.iter().enumerate() {
        if line.0.len() < 2 {
            continue;
        }
        incidence
            .entry(coord_key(&line.0[0]))
            .or_default()
            .push((i, true));
        incidence
            .entry(coord_key(line.0.last().expect("non-empty line")))
            .or_default()
            .push((i, false));
    }

    let joinable = |key: &CoordKey| -> bool {
        !barriers.contains(key) && incidence.get(key).is_some_and(|v| v.len() == 2)
    };

    let mut visited = vec![false; lines.len()];
    let mut merged = Vec::new();

    for seed in 0..lines.len() {
        if visited[seed] || lines[seed].0.len() < 2 {
            continue;
        }
        visited[seed] = true;

        // Chain of (line index, forward orientation), seed included.
        let mut chain: VecDeque<(usize, bool)> = VecDeque::new();
        chain.push_back((seed, true));

        // Grow at the tail.
        loop {
            let &(idx, fwd) = chain.back().expect("chain is never empty");
            let tail = if fwd {
                coord_key(lines[idx].0.last().expect("non-empty line"))
            } else {
                coord_key(&lines[idx].0[0])
            };
            if !joinable(&tail) {
                break;
            }
            let pair = &incidence[&tail];
            let (next, at_start) = if pair[0].0 == idx { pair[1] } else { pair[0] };
            if visited[next] {
                break;
            }
            visited[next] = true;
            // Entering at the next line's start means we traverse it forward.
            chain.push_back((next, at_start));
        }

        // Grow at the head.
        loop {
            let &(idx, fwd) = chain.front().expect("chain is never empty");
            let head = if fwd {
                coord_key(&lines[idx].0[0])
            } else {
                coord_key(lines[idx].0.last().expect("non-empty line"))
            };
            if !joinable(&head) {
                break;
            }
            let pair = &incidence[&head];
            let (next, at_start) = if pair[0].0 == idx { pair[1] } else { pair[0] };
            if visited[next] {
                break;
            }
            visited[next] = true;
            // The prepended line must END at the shared node.
            chain.push_front((next, !at_start));
        }

        // Concatenate, dropping the duplicated joint vertex at each seam.
        let mut coords: Vec<Coord> = Vec::new();
        for (k, &(idx, fwd)) in chain.iter().enumerate() {
            let part: Vec<Coord> = if fwd {
                lines[idx].0.clone()
            } else {
                lines[idx].0.iter().rev().cloned().collect()
            };
            if k == 0 {
                coords.extend(part);
            } else {
                coords.extend(part.into_iter().skip(1));
            }
        }
        merged.push(LineString::new(coords));
    }

    merged
}

// =============================================================================
// Unit Tests
// =============================================================================
