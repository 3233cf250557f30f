//! # NRN LRS Engine
//!
//! Linear-referencing segmentation and stable-identity engine for national
//! road network datasets.
//!
//! This library provides:
//! - Measure-interval cleaning for LRS ("from/to" along a route) event tables
//! - Breakpoint aggregation and numerically robust geometry segmentation
//! - Attribute re-attachment by interval-overlap matching
//! - Stable NID/structid assignment across dataset vintages by exact WKB matching
//! - Topological junction classification
//!
//! ## Features
//!
//! - **`serde`** - Enable serde derives on plain output types
//! - **`http`** - Enable HTTP client for previous-vintage download
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use geo::{Coord, LineString};
//! use nrn_lrs::{aggregate_breakpoints, RouteGeometry};
//!
//! // A straight 500 m route.
//! let route = RouteGeometry::new("R1", vec![LineString::new(vec![
//!     Coord { x: 0.0, y: 0.0 },
//!     Coord { x: 500.0, y: 0.0 },
//! ])]).unwrap();
//!
//! // Two attribute tables contribute events at [100, 250] and [250, 400].
//! let breakpoints = aggregate_breakpoints(
//!     &[(100.0, 250.0), (250.0, 400.0)],
//!     route.part_boundaries(),
//!     1.0,
//! );
//! assert_eq!(breakpoints.points, vec![0.0, 100.0, 250.0, 400.0, 500.0]);
//!
//! // Cut the route at every adjacent breakpoint pair.
//! for (lo, hi) in breakpoints.cut_ranges() {
//!     let pieces = route.cut(lo, hi, 1.0).unwrap();
//!     assert_eq!(pieces.len(), 1);
//! }
//! ```

use std::collections::HashMap;

// Shared geometry helpers (coordinate keys, WKB, linemerge)
pub mod geo_utils;

// Measure-interval cleaning for LRS event tables
pub mod measures;
pub use measures::{clean_measures, MeasureConfig, MeasureReport};

// Breakpoint aggregation onto the base geometry
pub mod breakpoints;
pub use breakpoints::{aggregate_breakpoints, BreakpointSet};

// Geometry segmentation at breakpoints
pub mod segmenter;
pub use segmenter::RouteGeometry;

// Attribute re-attachment onto segmented geometry
pub mod attributes;
pub use attributes::{attach_attributes, SegmentRecord};

// Stable NID/structid assignment across vintages
pub mod identity;
pub use identity::{
    resolve_nids, resolve_structids, ArcSegment, ChangeLog, IdentityConfig, LinkagePolicy,
    NID_DEFAULT,
};

// Topological junction classification
pub mod junctions;
pub use junctions::{
    classify_junctions, junction_breaks, Junction, JunctionKind, JunctionSegment,
};

// End-to-end LRS conversion
pub mod pipeline;
pub use pipeline::{LrsConfig, LrsConverter, RouteFeature, SegmentedDataset};

// Previous-vintage download (requires "http" feature)
#[cfg(feature = "http")]
pub mod vintage;

#[cfg(feature = "http")]
pub use vintage::fetch_previous_vintage;

// ============================================================================
// Core Types
// ============================================================================

/// A single attribute value carried by an event record or a segment.
///
/// Dates are modelled as `YYYYMMDD` integers, the convention used by the
/// source datasets; this keeps `min`/`max` conflict resolution a plain
/// integer comparison.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FieldValue {
    Null,
    Text(String),
    Number(f64),
    Date(u32),
}

impl FieldValue {
    /// Whether this value is the explicit null.
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

/// One attribute event attached to a route, optionally bounded by a
/// `(from, to)` measure interval along that route.
///
/// Measures are expressed in the route dataset's linear unit (meters).
#[derive(Debug, Clone)]
pub struct EventRecord {
    /// Source-native route/element identifier linking back to the geometry.
    pub route_id: String,
    /// Start measure along the route.
    pub from: f64,
    /// End measure along the route.
    pub to: f64,
    /// Arbitrary attribute columns carried by this event.
    pub values: HashMap<String, FieldValue>,
}

impl EventRecord {
    /// Create an event with no attribute values.
    pub fn new(route_id: &str, from: f64, to: f64) -> Self {
        Self {
            route_id: route_id.to_string(),
            from,
            to,
            values: HashMap::new(),
        }
    }

    /// The `(from, to)` interval of this event.
    pub fn interval(&self) -> (f64, f64) {
        (self.from, self.to)
    }
}

/// A table of attribute events from one source dataset.
#[derive(Debug, Clone)]
pub struct EventTable {
    /// Table name, used in diagnostics.
    pub name: String,
    /// Fields this table contributes to the segmented output. Every record
    /// must carry each of these; a missing field is a fatal schema error.
    pub output_fields: Vec<String>,
    pub records: Vec<EventRecord>,
}

impl EventTable {
    pub fn new(name: &str, output_fields: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            output_fields: output_fields.iter().map(|f| f.to_string()).collect(),
            records: Vec::new(),
        }
    }
}

/// A calibration point pinning a known measure onto a route.
///
/// Points flagged out of scope mark the portion of a route that lies outside
/// the jurisdiction; their minimum measure becomes the route's rebasing
/// offset.
#[derive(Debug, Clone)]
pub struct CalibrationPoint {
    pub route_id: String,
    pub measure: f64,
    pub in_scope: bool,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised by the engine.
///
/// Configuration and schema problems are fatal and surface as `Err`;
/// data-quality anomalies are logged as warnings by the stage that detects
/// them and never abort the run, except unresolved identity linkage under
/// [`LinkagePolicy::Strict`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A measure field was NaN or infinite. Indicates a broken source
    /// extraction, not a data-quality issue.
    #[error("table '{table}': non-finite measure on route '{route_id}'")]
    MalformedMeasure { table: String, route_id: String },

    /// An event record is missing a field its table declares as output.
    #[error("table '{table}': missing expected field '{field}'")]
    MissingField { table: String, field: String },

    /// A route geometry has no part with at least two vertices.
    #[error("route '{route_id}': geometry has no usable parts")]
    EmptyGeometry { route_id: String },

    /// Segments left without exactly one dissolved-geometry owner under
    /// strict linkage. Carries a ready-to-use filter query string.
    #[error("{} segment(s) without a unique dissolved owner; filter: {query}", uuids.len())]
    UnresolvedLinkage { uuids: Vec<String>, query: String },

    /// Previous-vintage download exhausted its retry budget.
    #[error("download failed after {attempts} attempts: {url}: {message}")]
    Download {
        url: String,
        attempts: u32,
        message: String,
    },
}
