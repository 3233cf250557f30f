//! # LRS Conversion Pipeline
//!
//! Drives the full event-table-to-segments conversion: clean every table's
//! measures, aggregate the breakpoints each route accumulates across all
//! tables, cut the route geometry at every adjacent breakpoint pair, then
//! re-attach attributes onto the resulting segments.
//!
//! The pipeline is deliberately single-pass and order-stable: routes are
//! processed in input order and segments are emitted lo-to-hi per route, so
//! two runs over the same input produce the same segment sequence (uuids
//! excepted).

use crate::attributes::{attach_attributes, SegmentRecord};
use crate::breakpoints::aggregate_breakpoints;
use crate::identity::new_nid;
use crate::measures::{clean_measures, MeasureConfig, MeasureReport};
use crate::segmenter::RouteGeometry;
use crate::{CalibrationPoint, Error, EventTable};
use geo::LineString;
use log::{debug, info};
use std::collections::HashMap;

/// One input route: an identifier plus its (possibly multi-part) geometry.
#[derive(Debug, Clone)]
pub struct RouteFeature {
    pub id: String,
    pub parts: Vec<LineString>,
}

impl RouteFeature {
    pub fn new(id: &str, parts: Vec<LineString>) -> Self {
        Self {
            id: id.to_string(),
            parts,
        }
    }
}

/// Configuration for the conversion pipeline.
#[derive(Debug, Clone)]
pub struct LrsConfig {
    /// Linear tolerance, in the dataset's unit, applied uniformly to
    /// measure snapping, breakpoint clustering, and geometry cutting.
    /// Default: 1.0
    pub tolerance: f64,
}

impl Default for LrsConfig {
    fn default() -> Self {
        Self { tolerance: 1.0 }
    }
}

/// Output of a conversion run.
#[derive(Debug, Clone)]
pub struct SegmentedDataset {
    /// Segments in route input order, lo-to-hi within each route.
    pub segments: Vec<SegmentRecord>,
    /// One measure-cleaning report per event table, in table order.
    pub reports: Vec<(String, MeasureReport)>,
}

/// The conversion driver.
pub struct LrsConverter {
    config: LrsConfig,
}

impl LrsConverter {
    pub fn new(config: LrsConfig) -> Self {
        Self { config }
    }

    /// Run the full conversion.
    ///
    /// Tables are cleaned in place (their measures are mutated); routes
    /// without any event interval are still segmented at their part
    /// boundaries so that every input route appears in the output.
    pub fn convert(
        &self,
        routes: &[RouteFeature],
        tables: &mut [EventTable],
        calibrations: &[CalibrationPoint],
    ) -> Result<SegmentedDataset, Error> {
        let tol = self.config.tolerance;
        let measure_config = MeasureConfig { tolerance: tol };

        let mut reports = Vec::with_capacity(tables.len());
        for table in tables.iter_mut() {
            let report = clean_measures(table, calibrations, &measure_config)?;
            reports.push((table.name.clone(), report));
        }

        // Every table contributes intervals to its route's breakpoint pool.
        let mut intervals: HashMap<&str, Vec<(f64, f64)>> = HashMap::new();
        for table in tables.iter() {
            for rec in &table.records {
                intervals
                    .entry(rec.route_id.as_str())
                    .or_default()
                    .push(rec.interval());
            }
        }

        let mut segments = Vec::new();
        for route in routes {
            let geometry = RouteGeometry::new(&route.id, route.parts.clone())?;
            let ranges = intervals
                .get(route.id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let breakpoints =
                aggregate_breakpoints(ranges, geometry.part_boundaries(), tol);
            debug!(
                "route '{}': {} breakpoints over {:.1} units",
                route.id,
                breakpoints.points.len(),
                geometry.total_length()
            );

            for (lo, hi) in breakpoints.cut_ranges() {
                for piece in geometry.cut(lo, hi, tol)? {
                    segments.push(SegmentRecord {
                        uuid: new_nid(),
                        route_id: route.id.clone(),
                        interval: (lo, hi),
                        geometry: piece,
                        values: HashMap::new(),
                    });
                }
            }
        }

        attach_attributes(&mut segments, tables)?;
        info!(
            "converted {} route(s) into {} segment(s)",
            routes.len(),
            segments.len()
        );

        Ok(SegmentedDataset { segments, reports })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventRecord, FieldValue};
    use geo::Coord;

    fn straight(x0: f64, x1: f64) -> LineString {
        LineString::new(vec![Coord { x: x0, y: 0.0 }, Coord { x: x1, y: 0.0 }])
    }

    fn record(route: &str, from: f64, to: f64, field: &str, value: &str) -> EventRecord {
        let mut rec = EventRecord::new(route, from, to);
        rec.values
            .insert(field.to_string(), FieldValue::Text(value.to_string()));
        rec
    }

    #[test]
    fn test_convert_two_tables_one_route() {
        // A 500-unit route with surface [0, 250] / [250, 500] and a speed
        // event over [100, 400]: expected cuts at 0/100/250/400/500.
        let routes = vec![RouteFeature::new("R1", vec![straight(0.0, 500.0)])];

        let mut surface = EventTable::new("surface", &["pavstatus"]);
        surface.records.push(record("R1", 0.0, 250.0, "pavstatus", "Paved"));
        surface
            .records
            .push(record("R1", 250.0, 500.0, "pavstatus", "Unpaved"));

        let mut speed = EventTable::new("speed", &["speed"]);
        speed.records.push(record("R1", 100.0, 400.0, "speed", "80"));

        let mut tables = vec![surface, speed];
        let out = LrsConverter::new(LrsConfig::default())
            .convert(&routes, &mut tables, &[])
            .unwrap();

        let intervals: Vec<(f64, f64)> =
            out.segments.iter().map(|s| s.interval).collect();
        assert_eq!(
            intervals,
            vec![
                (0.0, 100.0),
                (100.0, 250.0),
                (250.0, 400.0),
                (400.0, 500.0)
            ]
        );

        // Attributes follow interval overlap per table.
        let pav: Vec<&FieldValue> =
            out.segments.iter().map(|s| &s.values["pavstatus"]).collect();
        assert_eq!(
            pav,
            vec![
                &FieldValue::Text("Paved".to_string()),
                &FieldValue::Text("Paved".to_string()),
                &FieldValue::Text("Unpaved".to_string()),
                &FieldValue::Text("Unpaved".to_string())
            ]
        );
        let speeds: Vec<&FieldValue> =
            out.segments.iter().map(|s| &s.values["speed"]).collect();
        assert_eq!(
            speeds,
            vec![
                &FieldValue::Null,
                &FieldValue::Text("80".to_string()),
                &FieldValue::Text("80".to_string()),
                &FieldValue::Null
            ]
        );

        // Geometry coverage: segment lengths sum to the route length.
        let total: f64 = out
            .segments
            .iter()
            .map(|s| crate::geo_utils::linestring_length(&s.geometry))
            .sum();
        assert!((total - 500.0).abs() < 1e-9);
    }

    #[test]
    fn test_route_without_events_still_segmented() {
        let routes = vec![RouteFeature::new(
            "R9",
            vec![straight(0.0, 100.0), straight(100.0, 300.0)],
        )];
        let out = LrsConverter::new(LrsConfig::default())
            .convert(&routes, &mut [], &[])
            .unwrap();

        // One segment per geometry part, cut at the part boundary.
        assert_eq!(out.segments.len(), 2);
        assert_eq!(out.segments[0].interval, (0.0, 100.0));
        assert_eq!(out.segments[1].interval, (100.0, 300.0));
        assert!(out.segments.iter().all(|s| s.values.is_empty()));
    }

    #[test]
    fn test_measure_reports_per_table() {
        let routes = vec![RouteFeature::new("R1", vec![straight(0.0, 100.0)])];
        let mut inverted = EventTable::new("inverted", &["f"]);
        inverted.records.push(record("R1", 80.0, 20.0, "f", "x"));

        let out = LrsConverter::new(LrsConfig::default())
            .convert(&routes, &mut [inverted], &[])
            .unwrap();

        assert_eq!(out.reports.len(), 1);
        assert_eq!(out.reports[0].0, "inverted");
        assert_eq!(out.reports[0].1.swapped, 1);
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let routes = vec![RouteFeature::new("bad", vec![])];
        let err = LrsConverter::new(LrsConfig::default())
            .convert(&routes, &mut [], &[])
            .unwrap_err();
        assert!(matches!(err, Error::EmptyGeometry { route_id } if route_id == "bad"));
    }

    #[test]
    fn test_segment_uuids_are_unique_and_valid() {
        let routes = vec![RouteFeature::new("R1", vec![straight(0.0, 300.0)])];
        let mut table = EventTable::new("t", &["f"]);
        table.records.push(record("R1", 100.0, 200.0, "f", "x"));

        let out = LrsConverter::new(LrsConfig::default())
            .convert(&routes, &mut [table], &[])
            .unwrap();

        let mut seen = std::collections::HashSet::new();
        for seg in &out.segments {
            assert!(crate::identity::is_valid_nid(&seg.uuid));
            assert!(seen.insert(seg.uuid.clone()));
        }
    }
}
