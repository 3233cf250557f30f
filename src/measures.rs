//! # Measure-Interval Resolver
//!
//! Cleans, validates, and repairs the 1-D "from/to" measure ranges that LRS
//! source tables attach to routes, before any geometry is touched.
//!
//! Per route group this module:
//! 1. Swaps inverted ranges (`from > to`)
//! 2. Snaps measures onto nearby calibration points
//! 3. Rebases routes that begin outside the jurisdiction
//! 4. Closes sub-tolerance sliver gaps between neighboring ranges
//! 5. Detects (but never resolves) overlapping ranges
//!
//! Overlaps are a reported data-quality condition, not an error: downstream
//! consumers receive the route list and a `warn!` per route, and the run
//! continues. Non-finite measures, by contrast, indicate a broken source
//! extraction and abort with [`Error::MalformedMeasure`].

use crate::{CalibrationPoint, Error, EventTable};
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

/// Configuration for measure cleaning.
#[derive(Debug, Clone)]
pub struct MeasureConfig {
    /// Snapping / gap-closing tolerance in route linear units (meters).
    /// Default: 1.0
    pub tolerance: f64,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self { tolerance: 1.0 }
    }
}

/// What the cleaning pass did, for run logs.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MeasureReport {
    /// Records whose `from`/`to` were inverted and swapped.
    pub swapped: usize,
    /// Individual measures snapped onto a calibration point.
    pub snapped: usize,
    /// Routes rebased by an out-of-scope offset.
    pub offset_routes: usize,
    /// Sliver gaps closed by reducing a `from` to a neighbor's `to`.
    pub gaps_closed: usize,
    /// Routes with overlapping ranges after repair (warning-only).
    pub overlapping_routes: Vec<String>,
}

/// Clean a table of measure events in place.
///
/// Runs the swap, snap, offset, gap-repair, and overlap-detection passes
/// described in the module docs, per `route_id` group. Running the pass
/// twice is a no-op: gap repair is idempotent.
///
/// # Arguments
///
/// * `table` - The event table to clean; measures are mutated in place
/// * `calibrations` - Known measure pins, used for snapping and for
///   rebasing routes that begin outside the jurisdiction
/// * `config` - Snapping / gap-closing tolerance
///
/// # Returns
///
/// A [`MeasureReport`] summarizing what was repaired. The only fatal
/// condition is a non-finite measure ([`Error::MalformedMeasure`]);
/// everything else, overlaps included, is reported and logged.
///
/// # Example
///
/// ```rust
/// use nrn_lrs::{clean_measures, EventRecord, EventTable, MeasureConfig};
///
/// let mut table = EventTable::new("roadseg", &[]);
/// table.records.push(EventRecord::new("R1", 250.0, 100.0)); // inverted
///
/// let report = clean_measures(&mut table, &[], &MeasureConfig::default()).unwrap();
/// assert_eq!(report.swapped, 1);
/// assert_eq!(table.records[0].interval(), (100.0, 250.0));
/// ```
pub fn clean_measures(
    table: &mut EventTable,
    calibrations: &[CalibrationPoint],
    config: &MeasureConfig,
) -> Result<MeasureReport, Error> {
    let tol = config.tolerance;
    let mut report = MeasureReport::default();

    // 1. Validate and swap inverted ranges.
    for rec in &mut table.records {
        if !rec.from.is_finite() || !rec.to.is_finite() {
            return Err(Error::MalformedMeasure {
                table: table.name.clone(),
                route_id: rec.route_id.clone(),
            });
        }
        if rec.from > rec.to {
            std::mem::swap(&mut rec.from, &mut rec.to);
            report.swapped += 1;
        }
    }

    // 2. Snap measures onto calibration points within tolerance.
    let mut calib_by_route: HashMap<&str, Vec<f64>> = HashMap::new();
    for cp in calibrations {
        calib_by_route.entry(&cp.route_id).or_default().push(cp.measure);
    }
    for measures in calib_by_route.values_mut() {
        measures.sort_by(|a, b| a.total_cmp(b));
    }
    for rec in &mut table.records {
        if let Some(measures) = calib_by_route.get(rec.route_id.as_str()) {
            for value in [&mut rec.from, &mut rec.to] {
                if let Some(snapped) = nearest_within(measures, *value, tol) {
                    if snapped != *value {
                        *value = snapped;
                        report.snapped += 1;
                    }
                }
            }
        }
    }

    // 3. Rebase routes that begin outside the jurisdiction. The offset is
    //    the minimum calibration measure recorded for the out-of-scope
    //    portion of the route.
    let mut offsets: HashMap<&str, f64> = HashMap::new();
    for cp in calibrations.iter().filter(|cp| !cp.in_scope) {
        offsets
            .entry(&cp.route_id)
            .and_modify(|m| *m = m.min(cp.measure))
            .or_insert(cp.measure);
    }
    let mut offset_applied: BTreeSet<String> = BTreeSet::new();
    for rec in &mut table.records {
        if let Some(&offset) = offsets.get(rec.route_id.as_str()) {
            rec.from = (rec.from - offset).max(0.0);
            rec.to = (rec.to - offset).max(0.0);
            offset_applied.insert(rec.route_id.clone());
        }
    }
    report.offset_routes = offset_applied.len();

    // 4. Gap repair within each route group.
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (i, rec) in table.records.iter().enumerate() {
        groups.entry(rec.route_id.clone()).or_default().push(i);
    }
    let mut repairs: Vec<(usize, f64)> = Vec::new();
    for indices in groups.values() {
        if indices.len() < 2 {
            continue;
        }
        let group_min = indices
            .iter()
            .map(|&i| table.records[i].from)
            .fold(f64::INFINITY, f64::min);
        // `to` is never modified by this step, so a plain snapshot suffices
        // and the repair cannot chain transitively.
        for &i in indices {
            let from = table.records[i].from;
            if from <= group_min {
                continue;
            }
            let candidate = indices
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| table.records[j].to)
                .filter(|to| (from - to).abs() <= tol)
                .min_by(|a, b| {
                    ((from - a).abs(), *a)
                        .partial_cmp(&((from - b).abs(), *b))
                        .expect("finite measures")
                });
            if let Some(to) = candidate {
                if to != from {
                    repairs.push((i, to));
                }
            }
        }
    }
    for (i, to) in repairs {
        debug!(
            "closing sliver gap on route '{}': from {} -> {}",
            table.records[i].route_id, table.records[i].from, to
        );
        table.records[i].from = to;
        report.gaps_closed += 1;
    }

    // 5. Overlap detection (warning-only, never auto-resolved).
    let mut overlapping: BTreeSet<String> = BTreeSet::new();
    for indices in groups.values() {
        for (a, &i) in indices.iter().enumerate() {
            for &j in &indices[a + 1..] {
                let ri = &table.records[i];
                let rj = &table.records[j];
                if ri.from < rj.to && rj.from < ri.to {
                    overlapping.insert(ri.route_id.clone());
                }
            }
        }
    }
    for route_id in &overlapping {
        warn!(
            "table '{}': overlapping measure intervals on route '{}'",
            table.name, route_id
        );
    }
    report.overlapping_routes = overlapping.into_iter().collect();

    Ok(report)
}

/// Nearest value in a sorted slice within `tol` of `target`, ties toward
/// the smaller value.
fn nearest_within(sorted: &[f64], target: f64, tol: f64) -> Option<f64> {
    let idx = sorted.partition_point(|&m| m < target);
    let mut best: Option<f64> = None;
    for candidate in idx.checked_sub(1).map(|i| sorted[i]).into_iter().chain(
        sorted.get(idx).copied(),
    ) {
        if (candidate - target).abs() <= tol {
            best = match best {
                None => Some(candidate),
                Some(b) if (candidate - target).abs() < (b - target).abs() => Some(candidate),
                Some(b) => Some(b),
            };
        }
    }
    best
}
