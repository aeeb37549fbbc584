#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Building record, category taxonomy, and collection types.
//!
//! Every stage of the footprint pipeline (fetching, classification,
//! enrichment, merging) speaks in terms of the types defined here. A
//! [`BuildingRecord`] is produced once by the pipeline and treated as
//! immutable afterwards; re-computation with different estimation
//! parameters produces a new record rather than mutating the stored one.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use strum_macros::{AsRefStr, Display, EnumString};

/// Name of the `OpenStreetMap` data source as it appears in collection
/// metadata.
pub const OSM_DATA_SOURCE: &str = "osm";

/// Semantic building category derived from the raw `building` tag and
/// structural heuristics.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum Category {
    /// Houses, apartments, dormitories.
    Residential,
    /// Churches, mosques, temples, and other places of worship.
    Religious,
    /// Schools and kindergartens.
    Education,
    /// University and college buildings.
    University,
    /// Hotels, hostels, motels.
    Hotel,
    /// Retail, offices, and other commercial premises.
    Commercial,
    /// Hospitals and clinics.
    Healthcare,
    /// Factories, warehouses, storage.
    #[serde(rename = "Industrial/Storage")]
    #[strum(serialize = "Industrial/Storage")]
    IndustrialStorage,
    /// Stations, garages, parking structures.
    Transport,
    /// Civic, government, museums, and other public buildings.
    #[serde(rename = "Cultural/Public")]
    #[strum(serialize = "Cultural/Public")]
    CulturalPublic,
    /// Towers of any kind.
    Tower,
    /// Tagged, but with no more specific category.
    Other,
    /// Too little information to classify (large untagged buildings).
    Unknown,
}

impl Category {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Residential,
            Self::Religious,
            Self::Education,
            Self::University,
            Self::Hotel,
            Self::Commercial,
            Self::Healthcare,
            Self::IndustrialStorage,
            Self::Transport,
            Self::CulturalPublic,
            Self::Tower,
            Self::Other,
            Self::Unknown,
        ]
    }
}

/// Kind of `OpenStreetMap` element a building was read from.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum OsmElementKind {
    /// A single tagged point.
    Node,
    /// A closed way.
    Way,
    /// A multipolygon relation.
    Relation,
}

/// Stable external identifier of a building.
///
/// OSM numbers ids independently per element kind, so way 42 and relation
/// 42 are different buildings. Rendered and serialized as `"way/42"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OsmId {
    /// Element kind.
    pub kind: OsmElementKind,
    /// Numeric id within that kind.
    pub id: i64,
}

impl OsmId {
    /// Creates a new identifier.
    #[must_use]
    pub const fn new(kind: OsmElementKind, id: i64) -> Self {
        Self { kind, id }
    }

    /// Shorthand for a way id.
    #[must_use]
    pub const fn way(id: i64) -> Self {
        Self::new(OsmElementKind::Way, id)
    }

    /// Shorthand for a relation id.
    #[must_use]
    pub const fn relation(id: i64) -> Self {
        Self::new(OsmElementKind::Relation, id)
    }

    /// Shorthand for a node id.
    #[must_use]
    pub const fn node(id: i64) -> Self {
        Self::new(OsmElementKind::Node, id)
    }
}

impl fmt::Display for OsmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

/// Error returned when an [`OsmId`] string is not of the form `kind/id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidOsmIdError {
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for InvalidOsmIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid OSM id {:?}: expected node/<id>, way/<id> or relation/<id>",
            self.value
        )
    }
}

impl std::error::Error for InvalidOsmIdError {}

impl FromStr for OsmId {
    type Err = InvalidOsmIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || InvalidOsmIdError {
            value: s.to_string(),
        };
        let (kind, id) = s.split_once('/').ok_or_else(err)?;
        let kind = kind.parse::<OsmElementKind>().map_err(|_| err())?;
        let id = id.parse::<i64>().map_err(|_| err())?;
        Ok(Self { kind, id })
    }
}

impl Serialize for OsmId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for OsmId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// One classified, enriched building footprint.
///
/// Source fields (`source_height_m`, `floors`, `footprint_area_m2`,
/// `category`, ...) are set once when the record is built from the raw
/// fetch result. Derived fields (`height_m`, `roof_area_m2`,
/// `estimated_population`, ...) are a pure function of the source fields,
/// the optional `custom_pitch_deg` overlay and the global estimation
/// parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingRecord {
    /// Stable external identifier.
    pub osm_id: OsmId,
    /// Footprint geometry (`Polygon`, `MultiPolygon` or `Point`).
    pub geometry: geojson::Geometry,
    /// Raw `building` tag (`"yes"` when the source had no value).
    pub building_type: String,
    /// Derived semantic category.
    pub category: Category,
    /// Label of the structural heuristic that decided the category, if any.
    pub inferred_type: Option<String>,
    /// Building name.
    pub name: Option<String>,
    /// Geodesic footprint area. Absent for point geometries.
    pub footprint_area_m2: Option<f64>,
    /// Number of above-ground floors.
    pub floors: Option<u32>,
    /// Height as given by the source, in meters.
    pub source_height_m: Option<f64>,
    /// Roof shape tag (e.g. `"flat"`, `"gabled"`).
    pub roof_shape: Option<String>,
    /// Roof pitch in degrees taken from the source's roof tags.
    pub source_pitch_deg: Option<f64>,
    /// Construction year parsed from the date-like source tags.
    pub construction_year: Option<i32>,
    /// User-chosen pitch angle overlay for this building.
    pub custom_pitch_deg: Option<f64>,
    /// Height in meters, actual or estimated.
    pub height_m: Option<f64>,
    /// Whether [`Self::height_m`] was estimated from the floor count.
    pub height_estimated: bool,
    /// Roof surface area derived from the footprint and pitch angle.
    pub roof_area_m2: Option<f64>,
    /// Estimated number of residents (residential buildings only).
    pub estimated_population: Option<u64>,
    /// Footprint multiplied by floor count.
    pub total_floor_area_m2: Option<f64>,
    /// Height divided by floor count.
    pub estimated_floor_height_m: Option<f64>,
    /// Share of key attributes present, 0-100.
    pub data_completeness: f64,
    /// Names of the data sources that contributed to this record.
    pub data_sources: Vec<String>,
    /// Every source tag, preserved verbatim.
    pub attributes: BTreeMap<String, String>,
}

/// A set of building records plus collection-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingCollection {
    /// The buildings, in the order they were produced.
    pub buildings: Vec<BuildingRecord>,
    /// Summary of the collection.
    pub metadata: CollectionMetadata,
}

impl BuildingCollection {
    /// Builds a collection and summarizes its metadata.
    #[must_use]
    pub fn new(
        buildings: Vec<BuildingRecord>,
        data_sources: Vec<String>,
        generated_at: Option<DateTime<Utc>>,
    ) -> Self {
        let metadata = CollectionMetadata::summarize(&buildings, data_sources, generated_at);
        Self {
            buildings,
            metadata,
        }
    }

    /// An empty collection with no contributing sources.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new(), None)
    }

    /// Number of buildings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    /// Whether the collection has no buildings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }
}

/// Collection-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMetadata {
    /// Names of the contributing data sources, in first-seen order.
    pub data_sources: Vec<String>,
    /// Number of buildings in the collection.
    pub total_buildings: usize,
    /// Count of buildings per category.
    pub category_distribution: BTreeMap<Category, usize>,
    /// Count of buildings per raw `building` tag.
    pub building_type_distribution: BTreeMap<String, usize>,
    /// Mean of the records' data completeness scores.
    pub avg_data_completeness: f64,
    /// When the newest contributing result was produced.
    pub generated_at: Option<DateTime<Utc>>,
}

impl CollectionMetadata {
    /// Computes the metadata for a list of records.
    #[must_use]
    pub fn summarize(
        buildings: &[BuildingRecord],
        data_sources: Vec<String>,
        generated_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut category_distribution = BTreeMap::new();
        let mut building_type_distribution = BTreeMap::new();
        let mut completeness_sum = 0.0;

        for building in buildings {
            *category_distribution.entry(building.category).or_insert(0) += 1;
            *building_type_distribution
                .entry(building.building_type.clone())
                .or_insert(0) += 1;
            completeness_sum += building.data_completeness;
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_data_completeness = if buildings.is_empty() {
            0.0
        } else {
            (completeness_sum / buildings.len() as f64 * 10.0).round() / 10.0
        };

        Self {
            data_sources,
            total_buildings: buildings.len(),
            category_distribution,
            building_type_distribution,
            avg_data_completeness,
            generated_at,
        }
    }
}
