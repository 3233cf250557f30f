//! # Junction Classifier
//!
//! Derives the topological node classification from segment endpoint
//! multiplicity and boundary containment.
//!
//! Junctions are fully regenerated each run from the current road and ferry
//! segment endpoints; they are not persisted across vintages. The identity
//! engine additionally consumes the non-dead-end junction points as
//! linemerge barriers, so dissolved arcs never span a real topological
//! junction (see [`junction_breaks`]).

use crate::geo_utils::{coord_key, CoordKey};
use geo::{Contains, Coord, LineString, Point, Polygon};
use std::collections::{BTreeMap, HashSet};

/// Junction classification. Classes are mutually exclusive: a ferry
/// endpoint is always `Ferry` regardless of road degree, and any junction
/// outside the jurisdiction boundary becomes `NatProvTer`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JunctionKind {
    DeadEnd,
    Ferry,
    Intersection,
    NatProvTer,
}

impl JunctionKind {
    /// The `junctype` domain value written to the output dataset.
    pub fn as_str(&self) -> &'static str {
        match self {
            JunctionKind::DeadEnd => "Dead End",
            JunctionKind::Ferry => "Ferry",
            JunctionKind::Intersection => "Intersection",
            JunctionKind::NatProvTer => "NatProvTer",
        }
    }
}

/// The endpoint-relevant slice of a road or ferry segment.
#[derive(Debug, Clone)]
pub struct JunctionSegment {
    pub uuid: String,
    pub geometry: LineString,
    /// Planimetric accuracy of the segment, meters.
    pub accuracy: i32,
    /// Exit number, if the segment carries one.
    pub exitnbr: Option<String>,
}

impl JunctionSegment {
    pub fn new(uuid: &str, geometry: LineString) -> Self {
        Self {
            uuid: uuid.to_string(),
            geometry,
            accuracy: 0,
            exitnbr: None,
        }
    }
}

/// A classified junction with attributes aggregated from its incident
/// segments.
#[derive(Debug, Clone)]
pub struct Junction {
    pub point: Point,
    pub kind: JunctionKind,
    /// Incident segment uuids, sorted.
    pub uuids: Vec<String>,
    /// Maximum accuracy across incident segments.
    pub accuracy: i32,
    /// First defined exit number in sorted-uuid order.
    pub exitnbr: Option<String>,
}

struct Node<'a> {
    coord: Coord,
    road_degree: usize,
    ferry: bool,
    incident: Vec<&'a JunctionSegment>,
}

/// Classify every road/ferry segment endpoint.
///
/// Endpoints shared by exactly two road segments (and no ferry) are plain
/// connections, not junctions, and produce no output. Iteration order is
/// deterministic: nodes are visited in coordinate-key order.
///
/// # Arguments
///
/// * `roads` - Road segments contributing endpoint degree
/// * `ferries` - Ferry segments; any endpoint they touch classifies `Ferry`
/// * `boundary` - Jurisdiction polygon; classified endpoints outside it
///   are overridden to `NatProvTer`
///
/// # Returns
///
/// One [`Junction`] per classified endpoint, with attributes aggregated
/// from the incident segments.
///
/// # Example
///
/// ```rust
/// use geo::{Coord, LineString, Polygon};
/// use nrn_lrs::{classify_junctions, JunctionKind, JunctionSegment};
///
/// let line = |coords: &[(f64, f64)]| LineString::new(
///     coords.iter().map(|&(x, y)| Coord { x, y }).collect());
/// let boundary = Polygon::new(
///     line(&[(-10.0, -10.0), (500.0, -10.0), (500.0, 500.0),
///            (-10.0, 500.0), (-10.0, -10.0)]),
///     vec![],
/// );
///
/// let roads = vec![
///     JunctionSegment::new("a", line(&[(0.0, 0.0), (100.0, 0.0)])),
///     JunctionSegment::new("b", line(&[(100.0, 0.0), (200.0, 0.0)])),
///     JunctionSegment::new("c", line(&[(100.0, 0.0), (100.0, 100.0)])),
/// ];
/// let junctions = classify_junctions(&roads, &[], &boundary);
///
/// let center = junctions.iter()
///     .find(|j| j.point.x() == 100.0 && j.point.y() == 0.0)
///     .unwrap();
/// assert_eq!(center.kind, JunctionKind::Intersection);
/// ```
pub fn classify_junctions(
    roads: &[JunctionSegment],
    ferries: &[JunctionSegment],
    boundary: &Polygon,
) -> Vec<Junction> {
    let mut nodes: BTreeMap<CoordKey, Node> = BTreeMap::new();

    for seg in roads {
        for coord in endpoints(&seg.geometry) {
            let node = nodes.entry(coord_key(&coord)).or_insert_with(|| Node {
                coord,
                road_degree: 0,
                ferry: false,
                incident: Vec::new(),
            });
            node.road_degree += 1;
            node.incident.push(seg);
        }
    }
    for seg in ferries {
        for coord in endpoints(&seg.geometry) {
            let node = nodes.entry(coord_key(&coord)).or_insert_with(|| Node {
                coord,
                road_degree: 0,
                ferry: false,
                incident: Vec::new(),
            });
            node.ferry = true;
            node.incident.push(seg);
        }
    }

    let mut junctions = Vec::new();
    for node in nodes.values() {
        let kind = if node.ferry {
            JunctionKind::Ferry
        } else if node.road_degree == 1 {
            JunctionKind::DeadEnd
        } else if node.road_degree >= 3 {
            JunctionKind::Intersection
        } else {
            continue;
        };

        let point = Point::from(node.coord);
        // Boundary containment overrides every other classification.
        let kind = if boundary.contains(&point) {
            kind
        } else {
            JunctionKind::NatProvTer
        };

        let mut incident: Vec<&JunctionSegment> = node.incident.clone();
        incident.sort_by(|a, b| a.uuid.cmp(&b.uuid));
        incident.dedup_by(|a, b| a.uuid == b.uuid);

        junctions.push(Junction {
            point,
            kind,
            uuids: incident.iter().map(|s| s.uuid.clone()).collect(),
            accuracy: incident.iter().map(|s| s.accuracy).max().unwrap_or(0),
            exitnbr: incident.iter().find_map(|s| s.exitnbr.clone()),
        });
    }
    junctions
}

/// The non-dead-end junction points, as exact coordinate keys.
///
/// These feed the identity engine's dissolve step as linemerge barriers.
pub fn junction_breaks(junctions: &[Junction]) -> HashSet<CoordKey> {
    junctions
        .iter()
        .filter(|j| j.kind != JunctionKind::DeadEnd)
        .map(|j| coord_key(&j.point.0))
        .collect()
}

fn endpoints(line: &LineString) -> Vec<Coord> {
    match (line.0.first(), line.0.last()) {
        (Some(first), Some(last)) => vec![*first, *last],
        _ => vec![],
    }
}
