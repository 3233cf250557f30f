//! # Attribute Assembler
//!
//! Re-attaches per-segment attributes from the cleaned source tables onto
//! the segmented base geometry.
//!
//! Two link cardinalities exist per (table, base record) pair:
//! - **Singular**: the base route was not segmented and the table carries at
//!   most one record for it - a direct one-to-one assignment.
//! - **Interval**: the route was segmented; the first table record whose
//!   measure interval overlaps the segment's interval wins.
//!
//! Unmatched base records get the table's output fields set explicitly to
//! null; a silent unmatched outcome is normal. Conflicting duplicate date
//! fields (multiple tables contributing a `credate`/`revdate` column) are
//! reduced by `min`/`max` respectively - other conflicting fields are
//! deliberately not resolved and the later table wins.

use crate::{Error, EventRecord, EventTable, FieldValue};
use geo::LineString;
use std::collections::HashMap;

/// One segmented arc with its inherited attributes.
#[derive(Debug, Clone)]
pub struct SegmentRecord {
    /// Per-run segment identifier (32-hex).
    pub uuid: String,
    /// Parent route/element identifier.
    pub route_id: String,
    /// The `(lo, hi)` measure interval this segment covers on its route.
    pub interval: (f64, f64),
    pub geometry: LineString,
    /// Attributes inherited from the assembled source tables.
    pub values: HashMap<String, FieldValue>,
}

impl SegmentRecord {
    fn overlaps(&self, event: &EventRecord) -> bool {
        let (lo, hi) = self.interval;
        lo < event.to && event.from < hi
    }
}

/// Attach every table's output fields onto the segmented base records.
///
/// Fails with [`Error::MissingField`] when a matched event record lacks a
/// field its table declares - a broken schema, not a data-quality issue.
pub fn attach_attributes(
    base: &mut [SegmentRecord],
    tables: &[EventTable],
) -> Result<(), Error> {
    // Route ids that were segmented (duplicated in the base). Keyed by
    // owned ids so no borrow of `base` survives into the mutable loop.
    let mut route_counts: HashMap<String, usize> = HashMap::new();
    for seg in base.iter() {
        *route_counts.entry(seg.route_id.clone()).or_insert(0) += 1;
    }

    for table in tables {
        // Table records grouped per route, original order preserved.
        let mut by_route: HashMap<&str, Vec<&EventRecord>> = HashMap::new();
        for rec in &table.records {
            by_route.entry(rec.route_id.as_str()).or_default().push(rec);
        }

        for seg in base.iter_mut() {
            let candidates = by_route.get(seg.route_id.as_str());
            let segmented = route_counts[seg.route_id.as_str()] > 1;

            let matched: Option<&EventRecord> = match candidates {
                None => None,
                Some(records) if !segmented => singular_match(seg, records),
                Some(records) => records.iter().find(|e| seg.overlaps(e)).copied(),
            };

            match matched {
                Some(event) => {
                    for field in &table.output_fields {
                        let value = event.values.get(field).ok_or_else(|| {
                            Error::MissingField {
                                table: table.name.clone(),
                                field: field.clone(),
                            }
                        })?;
                        assign_field(&mut seg.values, field, value.clone());
                    }
                }
                None => {
                    // Explicitly null; defined dates survive (see assign_field).
                    for field in &table.output_fields {
                        assign_field(&mut seg.values, field, FieldValue::Null);
                    }
                }
            }
        }
    }
    Ok(())
}

/// Resolve a one-to-one link: at most one record, or exactly one distinct
/// record after deduplication. Several distinct records against an
/// unsegmented base record fall back to interval matching.
fn singular_match<'a>(
    seg: &SegmentRecord,
    records: &[&'a EventRecord],
) -> Option<&'a EventRecord> {
    match records {
        [] => None,
        [only] => Some(only),
        [first, rest @ ..] => {
            if rest.iter().all(|r| r.values == first.values) {
                Some(first)
            } else {
                records.iter().find(|e| seg.overlaps(e)).copied()
            }
        }
    }
}

/// Assign a field, reducing competing date columns: `credate` keeps the
/// minimum, `revdate` the maximum, across non-null candidates. Any other
/// already-present field is overwritten (only dates are resolved).
fn assign_field(values: &mut HashMap<String, FieldValue>, field: &str, new: FieldValue) {
    if let Some(existing) = values.get(field) {
        if !existing.is_null() && !new.is_null() {
            if field.contains("credate") {
                values.insert(field.to_string(), date_reduce(existing, &new, true));
                return;
            }
            if field.contains("revdate") {
                values.insert(field.to_string(), date_reduce(existing, &new, false));
                return;
            }
        }
        if new.is_null() && !existing.is_null()
            && (field.contains("credate") || field.contains("revdate"))
        {
            // A null candidate never displaces a defined date.
            return;
        }
    }
    values.insert(field.to_string(), new);
}

fn date_reduce(a: &FieldValue, b: &FieldValue, take_min: bool) -> FieldValue {
    match (a, b) {
        (FieldValue::Date(da), FieldValue::Date(db)) => {
            if take_min {
                FieldValue::Date(*da.min(db))
            } else {
                FieldValue::Date(*da.max(db))
            }
        }
        // Non-date payloads in a date-named column: fall back to the newer
        _ => b.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn segment(uuid: &str, route_id: &str, interval: (f64, f64)) -> SegmentRecord {
        SegmentRecord {
            uuid: uuid.to_string(),
            route_id: route_id.to_string(),
            interval,
            geometry: LineString::new(vec![
                Coord { x: interval.0, y: 0.0 },
                Coord { x: interval.1, y: 0.0 },
            ]),
            values: HashMap::new(),
        }
    }

    fn event(route_id: &str, from: f64, to: f64, fields: &[(&str, FieldValue)]) -> EventRecord {
        let mut rec = EventRecord::new(route_id, from, to);
        for (name, value) in fields {
            rec.values.insert(name.to_string(), value.clone());
        }
        rec
    }

    fn text(s: &str) -> FieldValue {
        FieldValue::Text(s.to_string())
    }

    #[test]
    fn test_singular_match() {
        let mut base = vec![segment("s1", "R1", (0.0, 500.0))];
        let mut table = EventTable::new("names", &["l_stname"]);
        table.records.push(event("R1", 0.0, 500.0, &[("l_stname", text("Main St"))]));

        attach_attributes(&mut base, &[table]).unwrap();
        assert_eq!(base[0].values["l_stname"], text("Main St"));
    }

    #[test]
    fn test_interval_match_assigns_per_segment() {
        // Tables A and B contributing at [100,250] and [250,400]
        let mut base = vec![
            segment("s1", "R1", (0.0, 100.0)),
            segment("s2", "R1", (100.0, 250.0)),
            segment("s3", "R1", (250.0, 400.0)),
            segment("s4", "R1", (400.0, 500.0)),
        ];
        let mut table_a = EventTable::new("speed", &["speed"]);
        table_a
            .records
            .push(event("R1", 100.0, 250.0, &[("speed", FieldValue::Number(50.0))]));
        let mut table_b = EventTable::new("surface", &["surface"]);
        table_b
            .records
            .push(event("R1", 250.0, 400.0, &[("surface", text("paved"))]));

        attach_attributes(&mut base, &[table_a, table_b]).unwrap();

        assert_eq!(base[1].values["speed"], FieldValue::Number(50.0));
        assert_eq!(base[1].values["surface"], FieldValue::Null);
        assert_eq!(base[2].values["surface"], text("paved"));
        assert_eq!(base[2].values["speed"], FieldValue::Null);
        assert_eq!(base[0].values["speed"], FieldValue::Null);
        assert_eq!(base[3].values["surface"], FieldValue::Null);
    }

    #[test]
    fn test_mixed_singular_and_segmented_routes() {
        // One base holds a segmented route and an unsegmented one; the
        // duplication count must pick the right cardinality for each.
        let mut base = vec![
            segment("s1", "R1", (0.0, 100.0)),
            segment("s2", "R1", (100.0, 200.0)),
            segment("s3", "R2", (0.0, 300.0)),
        ];
        let mut table = EventTable::new("speed", &["speed"]);
        table
            .records
            .push(event("R1", 0.0, 100.0, &[("speed", FieldValue::Number(50.0))]));
        // Interval does not overlap R2's segment; singular matching
        // ignores intervals and must still assign it.
        table
            .records
            .push(event("R2", 500.0, 600.0, &[("speed", FieldValue::Number(90.0))]));

        attach_attributes(&mut base, &[table]).unwrap();

        assert_eq!(base[0].values["speed"], FieldValue::Number(50.0));
        assert_eq!(base[1].values["speed"], FieldValue::Null);
        assert_eq!(base[2].values["speed"], FieldValue::Number(90.0));
    }

    #[test]
    fn test_unmatched_fields_reset_to_null() {
        let mut base = vec![segment("s1", "R2", (0.0, 100.0))];
        let mut table = EventTable::new("speed", &["speed"]);
        table
            .records
            .push(event("R1", 0.0, 100.0, &[("speed", FieldValue::Number(80.0))]));

        attach_attributes(&mut base, &[table]).unwrap();
        assert_eq!(base[0].values["speed"], FieldValue::Null);
    }

    #[test]
    fn test_duplicate_singular_records_deduplicate() {
        let mut base = vec![segment("s1", "R1", (0.0, 100.0))];
        let mut table = EventTable::new("names", &["l_stname"]);
        table.records.push(event("R1", 0.0, 50.0, &[("l_stname", text("Main St"))]));
        table.records.push(event("R1", 50.0, 100.0, &[("l_stname", text("Main St"))]));

        attach_attributes(&mut base, &[table]).unwrap();
        assert_eq!(base[0].values["l_stname"], text("Main St"));
    }

    #[test]
    fn test_competing_credate_takes_min() {
        let mut base = vec![segment("s1", "R1", (0.0, 100.0))];
        let mut table_a = EventTable::new("a", &["credate"]);
        table_a
            .records
            .push(event("R1", 0.0, 100.0, &[("credate", FieldValue::Date(20200115))]));
        let mut table_b = EventTable::new("b", &["credate"]);
        table_b
            .records
            .push(event("R1", 0.0, 100.0, &[("credate", FieldValue::Date(20190301))]));

        attach_attributes(&mut base, &[table_a, table_b]).unwrap();
        assert_eq!(base[0].values["credate"], FieldValue::Date(20190301));
    }

    #[test]
    fn test_competing_revdate_takes_max() {
        let mut base = vec![segment("s1", "R1", (0.0, 100.0))];
        let mut table_a = EventTable::new("a", &["revdate"]);
        table_a
            .records
            .push(event("R1", 0.0, 100.0, &[("revdate", FieldValue::Date(20200115))]));
        let mut table_b = EventTable::new("b", &["revdate"]);
        table_b
            .records
            .push(event("R1", 0.0, 100.0, &[("revdate", FieldValue::Date(20230301))]));

        attach_attributes(&mut base, &[table_a, table_b]).unwrap();
        assert_eq!(base[0].values["revdate"], FieldValue::Date(20230301));
    }

    #[test]
    fn test_null_candidate_never_displaces_date() {
        let mut base = vec![segment("s1", "R1", (0.0, 100.0))];
        let mut table_a = EventTable::new("a", &["credate"]);
        table_a
            .records
            .push(event("R1", 0.0, 100.0, &[("credate", FieldValue::Date(20200115))]));
        // Table B has no record for R1 at all -> null candidate
        let table_b = EventTable::new("b", &["credate"]);

        attach_attributes(&mut base, &[table_a, table_b]).unwrap();
        assert_eq!(base[0].values["credate"], FieldValue::Date(20200115));
    }

    #[test]
    fn test_non_date_conflict_last_writer_wins() {
        let mut base = vec![segment("s1", "R1", (0.0, 100.0))];
        let mut table_a = EventTable::new("a", &["provider"]);
        table_a
            .records
            .push(event("R1", 0.0, 100.0, &[("provider", text("first"))]));
        let mut table_b = EventTable::new("b", &["provider"]);
        table_b
            .records
            .push(event("R1", 0.0, 100.0, &[("provider", text("second"))]));

        attach_attributes(&mut base, &[table_a, table_b]).unwrap();
        assert_eq!(base[0].values["provider"], text("second"));
    }

    #[test]
    fn test_missing_declared_field_is_fatal() {
        let mut base = vec![segment("s1", "R1", (0.0, 100.0))];
        let mut table = EventTable::new("speed", &["speed"]);
        table.records.push(event("R1", 0.0, 100.0, &[]));

        let err = attach_attributes(&mut base, &[table]).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
    }
}
