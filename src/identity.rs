//! # Identity Resolver
//!
//! Assigns stable network identifiers (NIDs) and structure identifiers
//! (structids) to the current vintage by matching against the previous
//! vintage, recovering identity across re-segmentation.
//!
//! ## Algorithm
//! 1. Group current segments by the configured match field and dissolve
//!    each group into maximal contiguous arcs (never merging across a
//!    non-dead-end junction)
//! 2. Dissolve the previous vintage by its existing NIDs, discarding
//!    invalid identifiers and still-multi-part dissolve results
//! 3. Match current arcs to previous arcs by exact WKB byte-equality -
//!    no spatial tolerance, only geometrically unchanged arcs recover
//!    their identity
//! 4. Classify every identifier as added / retired / modified / confirmed
//! 5. Propagate the arc identifiers back onto the original segments via a
//!    covered-by query, falling back to an intersection-type test for
//!    complex geometries
//!
//! ## Linkage failure policy
//!
//! When a segment still has no unique dissolved owner after the fallback,
//! [`LinkagePolicy`] decides: `Lenient` (the default) logs a warning and
//! leaves the identifier at [`NID_DEFAULT`]; `Strict` aborts with
//! [`Error::UnresolvedLinkage`] listing every offending uuid and a
//! ready-to-use filter query string. Exactly one policy applies per run.

use crate::geo_utils::{edge_set, linemerge, wkb_linestring, CoordKey, EdgeKey};
use crate::Error;
use geo::LineString;
use log::{debug, info, warn};
use rstar::{RTree, RTreeObject, AABB};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use uuid::Uuid;

/// Sentinel marking an identifier that has not been assigned.
pub const NID_DEFAULT: &str = "None";

/// A valid stable identifier is exactly 32 hexadecimal characters.
pub fn is_valid_nid(s: &str) -> bool {
    s.len() == 32 && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Generate a fresh 32-hex identifier.
pub fn new_nid() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A conformed road/ferry segment as seen by the identity engine.
#[derive(Debug, Clone)]
pub struct ArcSegment {
    /// Per-run segment identifier.
    pub uuid: String,
    /// Stable network identifier; [`NID_DEFAULT`] until assigned.
    pub nid: String,
    /// Stable structure identifier; [`NID_DEFAULT`] unless the segment is
    /// a structure.
    pub structid: String,
    pub geometry: LineString,
    /// The grouping value for dissolve (e.g. street name for roadseg).
    pub match_value: String,
    /// Structure type; [`NID_DEFAULT`] for ordinary segments.
    pub structtype: String,
}

impl ArcSegment {
    pub fn new(uuid: &str, geometry: LineString, match_value: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            nid: NID_DEFAULT.to_string(),
            structid: NID_DEFAULT.to_string(),
            geometry,
            match_value: match_value.to_string(),
            structtype: NID_DEFAULT.to_string(),
        }
    }

    fn is_structure(&self) -> bool {
        !self.structtype.is_empty() && self.structtype != NID_DEFAULT
    }
}

/// What to do with segments left without a unique dissolved owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkagePolicy {
    /// Log a warning, leave the identifier default, continue.
    #[default]
    Lenient,
    /// Abort with a diagnostic listing every offending uuid.
    Strict,
}

/// Configuration for identity resolution.
#[derive(Debug, Clone, Default)]
pub struct IdentityConfig {
    pub policy: LinkagePolicy,
}

/// Per-run change classification: four disjoint sets of identifiers.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChangeLog {
    pub added: BTreeSet<String>,
    pub retired: BTreeSet<String>,
    pub modified: BTreeSet<String>,
    pub confirmed: BTreeSet<String>,
}

impl ChangeLog {
    /// The classification sets with their log names, one identifier per
    /// line, ready for the external change-log writer.
    pub fn render(&self) -> Vec<(&'static str, String)> {
        [
            ("added", &self.added),
            ("retired", &self.retired),
            ("modified", &self.modified),
            ("confirmed", &self.confirmed),
        ]
        .into_iter()
        .map(|(name, set)| {
            let mut lines: Vec<&str> = set.iter().map(String::as_str).collect();
            lines.sort_unstable();
            (name, lines.join("\n"))
        })
        .collect()
    }
}

/// One dissolved, attribute-homogeneous arc awaiting identity.
struct DissolvedArc {
    geometry: LineString,
    wkb: Vec<u8>,
    group_value: String,
    id: String,
}

struct ArcEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for ArcEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

fn line_aabb(line: &LineString) -> AABB<[f64; 2]> {
    let mut min = [f64::MAX, f64::MAX];
    let mut max = [f64::MIN, f64::MIN];
    for c in &line.0 {
        min[0] = min[0].min(c.x);
        min[1] = min[1].min(c.y);
        max[0] = max[0].max(c.x);
        max[1] = max[1].max(c.y);
    }
    AABB::from_corners(min, max)
}

// ============================================================================
// NID resolution
// ============================================================================

/// Resolve stable NIDs for the current vintage against the previous one.
///
/// Assigns `nid` on every current segment and returns the change
/// classification. Only geometrically unchanged dissolved arcs recover
/// their previous identity; everything else gets a fresh NID.
///
/// # Arguments
///
/// * `current` - The current-vintage segments; `nid` is written in place
/// * `previous` - The previous-vintage segments carrying existing NIDs
/// * `junction_barriers` - Non-dead-end junction points from the junction
///   classifier (see [`crate::junction_breaks`]); dissolve never merges
///   arcs across them
/// * `config` - Linkage failure policy
///
/// # Returns
///
/// The [`ChangeLog`] classifying every identifier, or
/// [`Error::UnresolvedLinkage`] under [`LinkagePolicy::Strict`] when a
/// segment has no unique dissolved owner.
///
/// # Example
///
/// ```rust
/// use geo::{Coord, LineString};
/// use nrn_lrs::{resolve_nids, ArcSegment, IdentityConfig};
/// use std::collections::HashSet;
///
/// let line = LineString::new(vec![
///     Coord { x: 0.0, y: 0.0 },
///     Coord { x: 100.0, y: 0.0 },
/// ]);
/// let mut previous = vec![ArcSegment::new("p1", line.clone(), "Main St")];
/// previous[0].nid = "0123456789abcdef0123456789abcdef".to_string();
///
/// let mut current = vec![ArcSegment::new("c1", line, "Main St")];
/// let log = resolve_nids(&mut current, &previous, &HashSet::new(),
///     &IdentityConfig::default()).unwrap();
///
/// // Unchanged geometry recovers its identity
/// assert_eq!(current[0].nid, previous[0].nid);
/// assert!(log.confirmed.contains(&previous[0].nid));
/// ```
pub fn resolve_nids(
    current: &mut [ArcSegment],
    previous: &[ArcSegment],
    junction_barriers: &HashSet<CoordKey>,
    config: &IdentityConfig,
) -> Result<ChangeLog, Error> {
    // 1. Group by match field, dissolve each group.
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, seg) in current.iter().enumerate() {
        groups.entry(seg.match_value.as_str()).or_default().push(i);
    }
    let mut arcs: Vec<DissolvedArc> = Vec::new();
    for (value, indices) in &groups {
        let lines: Vec<&LineString> = indices.iter().map(|&i| &current[i].geometry).collect();
        for geometry in linemerge(&lines, junction_barriers) {
            let wkb = wkb_linestring(&geometry);
            arcs.push(DissolvedArc {
                geometry,
                wkb,
                group_value: value.to_string(),
                id: NID_DEFAULT.to_string(),
            });
        }
    }

    // 2. Previous-vintage preparation and 3./4. matching + classification.
    let (prev_index, prev_valid) = previous_index(previous, |seg| &seg.nid, |_| true);
    let mut log = ChangeLog::default();
    let mut recovered: BTreeSet<String> = BTreeSet::new();
    for arc in &mut arcs {
        match prev_index.get(&arc.wkb) {
            Some((nid, prev_value)) => {
                arc.id = nid.clone();
                recovered.insert(nid.clone());
                if prev_value != &arc.group_value {
                    // Geometry survived, grouping attribute did not.
                    log.confirmed.remove(nid);
                    log.modified.insert(nid.clone());
                } else if !log.modified.contains(nid) {
                    log.confirmed.insert(nid.clone());
                }
            }
            None => {
                arc.id = new_nid();
                log.added.insert(arc.id.clone());
            }
        }
    }
    log.retired = prev_valid.difference(&recovered).cloned().collect();

    // 5. Propagate arc identifiers back onto the original segments.
    let unresolved = link_segments(&arcs, current.iter_mut(), |seg, id| {
        seg.nid = id.to_string();
    });

    info!(
        "nid resolution: {} added, {} retired, {} modified, {} confirmed",
        log.added.len(),
        log.retired.len(),
        log.modified.len(),
        log.confirmed.len()
    );

    finish(unresolved, config, log)
}

// ============================================================================
// Structid resolution
// ============================================================================

/// Resolve stable structids, scoped to structure records only.
///
/// Same dissolve/match/assign/link pipeline as [`resolve_nids`] but grouped
/// independently of the match field, without junction splitting, and
/// without a `MODIFIED` class: structures are only confirmed, added, or
/// retired.
pub fn resolve_structids(
    current: &mut [ArcSegment],
    previous: &[ArcSegment],
    config: &IdentityConfig,
) -> Result<ChangeLog, Error> {
    let structures: Vec<usize> = current
        .iter()
        .enumerate()
        .filter(|(_, seg)| seg.is_structure())
        .map(|(i, _)| i)
        .collect();

    let lines: Vec<&LineString> = structures.iter().map(|&i| &current[i].geometry).collect();
    let mut arcs: Vec<DissolvedArc> = linemerge(&lines, &HashSet::new())
        .into_iter()
        .map(|geometry| {
            let wkb = wkb_linestring(&geometry);
            DissolvedArc {
                geometry,
                wkb,
                group_value: String::new(),
                id: NID_DEFAULT.to_string(),
            }
        })
        .collect();

    let (prev_index, prev_valid) =
        previous_index(previous, |seg| &seg.structid, |seg| seg.is_structure());
    let mut log = ChangeLog::default();
    let mut recovered: BTreeSet<String> = BTreeSet::new();
    for arc in &mut arcs {
        match prev_index.get(&arc.wkb) {
            Some((structid, _)) => {
                arc.id = structid.clone();
                recovered.insert(structid.clone());
                log.confirmed.insert(structid.clone());
            }
            None => {
                arc.id = new_nid();
                log.added.insert(arc.id.clone());
            }
        }
    }
    log.retired = prev_valid.difference(&recovered).cloned().collect();

    let unresolved = link_segments(
        &arcs,
        current.iter_mut().filter(|seg| seg.is_structure()),
        |seg, id| {
            seg.structid = id.to_string();
        },
    );

    info!(
        "structid resolution: {} added, {} retired, {} confirmed",
        log.added.len(),
        log.retired.len(),
        log.confirmed.len()
    );

    finish(unresolved, config, log)
}

// ============================================================================
// Shared steps
// ============================================================================

/// Dissolve the previous vintage by its existing identifiers.
///
/// Invalid identifiers are excluded from matching (history treated as
/// absent); identifier groups whose dissolve is still multi-part cannot be
/// matched unambiguously and are discarded. Returns the WKB index and the
/// full set of valid previous identifiers (retirement candidates).
fn previous_index<'a>(
    previous: &'a [ArcSegment],
    id_of: impl Fn(&'a ArcSegment) -> &'a str,
    in_scope: impl Fn(&'a ArcSegment) -> bool,
) -> (HashMap<Vec<u8>, (String, String)>, BTreeSet<String>) {
    let mut by_id: BTreeMap<&str, Vec<&ArcSegment>> = BTreeMap::new();
    for seg in previous.iter().filter(|s| in_scope(s)) {
        let id = id_of(seg);
        if is_valid_nid(id) {
            by_id.entry(id).or_default().push(seg);
        } else if id != NID_DEFAULT && !id.is_empty() {
            debug!("previous vintage: invalid identifier '{}' excluded", id);
        }
    }

    let mut index: HashMap<Vec<u8>, (String, String)> = HashMap::new();
    let mut valid: BTreeSet<String> = BTreeSet::new();
    for (id, segs) in by_id {
        valid.insert(id.to_string());
        let lines: Vec<&LineString> = segs.iter().map(|s| &s.geometry).collect();
        let dissolved = linemerge(&lines, &HashSet::new());
        match dissolved.as_slice() {
            [geometry] => {
                index.insert(
                    wkb_linestring(geometry),
                    (id.to_string(), segs[0].match_value.clone()),
                );
            }
            parts => {
                debug!(
                    "previous vintage: identifier '{}' dissolves to {} parts, discarded",
                    id,
                    parts.len()
                );
            }
        }
    }
    (index, valid)
}

/// Map each original segment onto its containing dissolved arc and assign
/// that arc's identifier. Returns the uuids left without a unique owner.
///
/// Coverage is evaluated exactly: a segment is covered by an arc when every
/// one of its edges belongs to the arc's edge set. Because that evaluation
/// can yield zero or several owners for complex (self-touching) geometries,
/// anything but exactly one falls back to the intersection-type test: only
/// candidates sharing linear extent (at least one full edge, never a lone
/// point) count as valid coverage.
fn link_segments<'a>(
    arcs: &[DissolvedArc],
    segments: impl Iterator<Item = &'a mut ArcSegment>,
    assign: impl Fn(&mut ArcSegment, &str),
) -> Vec<String> {
    let edge_sets: Vec<HashSet<EdgeKey>> = arcs.iter().map(|a| edge_set(&a.geometry)).collect();
    let tree = RTree::bulk_load(
        arcs.iter()
            .enumerate()
            .map(|(index, arc)| ArcEnvelope {
                index,
                aabb: line_aabb(&arc.geometry),
            })
            .collect(),
    );

    let mut unresolved = Vec::new();
    for seg in segments {
        let seg_edges = edge_set(&seg.geometry);
        let candidates: Vec<usize> = tree
            .locate_in_envelope_intersecting(&line_aabb(&seg.geometry))
            .map(|e| e.index)
            .collect();

        let mut covered: Vec<usize> = candidates
            .iter()
            .copied()
            .filter(|&i| seg_edges.iter().all(|e| edge_sets[i].contains(e)))
            .collect();

        if covered.len() != 1 {
            // covered_by is unreliable for self-touching lines; accept only
            // candidates whose intersection with the segment is linear.
            covered = candidates
                .iter()
                .copied()
                .filter(|&i| seg_edges.iter().any(|e| edge_sets[i].contains(e)))
                .collect();
        }

        match covered.as_slice() {
            [owner] => assign(seg, &arcs[*owner].id),
            _ => unresolved.push(seg.uuid.clone()),
        }
    }
    unresolved
}

/// Apply the linkage failure policy and return the change log.
fn finish(
    unresolved: Vec<String>,
    config: &IdentityConfig,
    log: ChangeLog,
) -> Result<ChangeLog, Error> {
    if unresolved.is_empty() {
        return Ok(log);
    }
    match config.policy {
        LinkagePolicy::Strict => {
            let quoted: Vec<String> = unresolved.iter().map(|u| format!("'{}'", u)).collect();
            Err(Error::UnresolvedLinkage {
                query: format!("uuid in ({})", quoted.join(", ")),
                uuids: unresolved,
            })
        }
        LinkagePolicy::Lenient => {
            warn!(
                "{} segment(s) without a unique dissolved owner, identifiers left default: {}",
                unresolved.len(),
                unresolved.join(", ")
            );
            Ok(log)
        }
    }
}
