#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Overpass endpoint configuration and the raw building record produced
//! by fetching.
//!
//! Endpoints are described in TOML files embedded at compile time. A
//! [`RawBuilding`] is the normalized shape of one footprint before
//! classification and enrichment.

use std::collections::BTreeMap;

use footprints_building_models::OsmId;
use serde::{Deserialize, Serialize};

/// An Overpass API endpoint, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverpassEndpoint {
    /// Unique endpoint identifier (e.g., `"overpass_de"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Interpreter URL that accepts a `data=` form parameter.
    pub url: String,
    /// Whether this endpoint is tried at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Order in which endpoints are tried; lower values first.
    pub priority: u32,
}

const fn default_true() -> bool {
    true
}

/// One building footprint as read from the source, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBuilding {
    /// Stable external identifier.
    pub osm_id: OsmId,
    /// Footprint geometry.
    pub geometry: geojson::Geometry,
    /// Geodesic footprint area in square meters, absent for points.
    pub footprint_area_m2: Option<f64>,
    /// Raw `building` tag, if present.
    pub building_type: Option<String>,
    /// `name` tag.
    pub name: Option<String>,
    /// Parsed `building:levels`.
    pub floors: Option<u32>,
    /// Parsed `height`, in meters.
    pub height_m: Option<f64>,
    /// `roof:shape` tag.
    pub roof_shape: Option<String>,
    /// Roof pitch in degrees from `roof:angle`, `roof:slope` or
    /// `roof:height`, unclamped.
    pub source_pitch_deg: Option<f64>,
    /// Construction year parsed from the date-like tags.
    pub construction_year: Option<i32>,
    /// Every source tag, verbatim.
    pub tags: BTreeMap<String, String>,
}

/// The result of one fetch for one polygon.
#[derive(Debug, Clone, Default)]
pub struct FetchedBuildings {
    /// Buildings intersecting the polygon, unique by `osm_id`.
    pub buildings: Vec<RawBuilding>,
    /// Name of the data source that produced them.
    pub data_source: String,
    /// Number of malformed elements skipped during normalization.
    pub skipped: usize,
}
