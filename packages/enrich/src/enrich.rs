//! Derivation of height, roof area, population and floor metrics.
//!
//! [`build_record`] turns a fetched [`RawBuilding`] into a classified
//! [`BuildingRecord`] carrying source fields only. [`enrich`] fills in every
//! derived field from those source fields and the [`EnrichParams`]. It never
//! reads a previously derived value, so enriching an enriched record with
//! the same parameters gives back an identical record, and changing the
//! parameters later only requires calling it again.

use std::collections::BTreeMap;

use footprints_building_models::{BuildingCollection, BuildingRecord, Category, OsmId};
use footprints_geometry::{clamp_pitch, roof_area, round2};
use footprints_source_models::RawBuilding;
use serde::{Deserialize, Serialize};

use crate::EnrichError;
use crate::classify::{DEFAULT_BUILDING_TAG, StructuralSignals, classify_building};

/// Default global roof pitch in degrees.
pub const DEFAULT_PITCH_DEG: f64 = 12.5;

/// Default occupancy factor, square meters of floor area per resident.
pub const DEFAULT_OCCUPANCY_M2: f64 = 41.0;

/// Assumed storey height when estimating height from floor count.
pub const FLOOR_HEIGHT_M: f64 = 3.0;

/// Tags that count towards the data completeness score, besides floors and
/// height. Address counts once for any `addr:*` tag.
const COMPLETENESS_TAGS: &[&str] = &["building", "building:units", "name"];
const COMPLETENESS_FIELDS: f64 = 6.0;

/// Global estimation parameters.
///
/// The pitch is clamped to `[0, 45]` degrees on construction and the
/// occupancy factor is validated, so every instance is usable as is.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichParams {
    pitch_deg: f64,
    occupancy_m2_per_person: f64,
}

impl Default for EnrichParams {
    fn default() -> Self {
        Self {
            pitch_deg: DEFAULT_PITCH_DEG,
            occupancy_m2_per_person: DEFAULT_OCCUPANCY_M2,
        }
    }
}

impl EnrichParams {
    /// Creates parameters, clamping the pitch.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::InvalidParams`] if the occupancy factor is not
    /// a positive, finite number.
    pub fn new(pitch_deg: f64, occupancy_m2_per_person: f64) -> Result<Self, EnrichError> {
        if !occupancy_m2_per_person.is_finite() || occupancy_m2_per_person <= 0.0 {
            return Err(EnrichError::InvalidParams {
                message: format!(
                    "occupancy must be a positive number of square meters per person, got {occupancy_m2_per_person}"
                ),
            });
        }
        Ok(Self {
            pitch_deg: clamp_pitch(pitch_deg),
            occupancy_m2_per_person,
        })
    }

    /// Global roof pitch in degrees, within `[0, 45]`.
    #[must_use]
    pub const fn pitch_deg(&self) -> f64 {
        self.pitch_deg
    }

    /// Square meters of floor area per resident.
    #[must_use]
    pub const fn occupancy_m2_per_person(&self) -> f64 {
        self.occupancy_m2_per_person
    }
}

/// Per-building pitch angles chosen by the user, applied as overlays at
/// recomputation time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitchOverrides(BTreeMap<OsmId, f64>);

impl PitchOverrides {
    /// Sets the pitch for one building. The value is clamped when used.
    pub fn set(&mut self, osm_id: OsmId, pitch_deg: f64) {
        self.0.insert(osm_id, pitch_deg);
    }

    /// Removes the overlay for one building.
    pub fn clear(&mut self, osm_id: &OsmId) {
        self.0.remove(osm_id);
    }

    #[must_use]
    pub fn get(&self, osm_id: &OsmId) -> Option<f64> {
        self.0.get(osm_id).copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Classifies a fetched building and copies its source fields into a
/// record. Derived fields are left empty; see [`enrich`].
#[must_use]
pub fn build_record(raw: RawBuilding, data_source: &str) -> BuildingRecord {
    let classification = classify_building(
        raw.building_type.as_deref(),
        StructuralSignals {
            footprint_area_m2: raw.footprint_area_m2,
            floors: raw.floors,
            roof_shape: raw.roof_shape.as_deref(),
        },
    );

    BuildingRecord {
        osm_id: raw.osm_id,
        geometry: raw.geometry,
        building_type: raw
            .building_type
            .unwrap_or_else(|| DEFAULT_BUILDING_TAG.to_string()),
        category: classification.category,
        inferred_type: classification.inferred_type.map(str::to_string),
        name: raw.name,
        footprint_area_m2: raw.footprint_area_m2,
        floors: raw.floors,
        source_height_m: raw.height_m,
        roof_shape: raw.roof_shape,
        source_pitch_deg: raw.source_pitch_deg,
        construction_year: raw.construction_year,
        custom_pitch_deg: None,
        height_m: None,
        height_estimated: false,
        roof_area_m2: None,
        estimated_population: None,
        total_floor_area_m2: None,
        estimated_floor_height_m: None,
        data_completeness: 0.0,
        data_sources: vec![data_source.to_string()],
        attributes: raw.tags,
    }
}

/// Computes every derived field of a record.
///
/// * Height: the source height unmodified, else `floors * 3.0` flagged as
///   estimated, else absent.
/// * Roof area: from the user's pitch overlay, else the pitch in the
///   source's roof tags, else the global pitch. Per-building pitches are
///   clamped to `[0, 45]`.
/// * Population: residential buildings with positive floors and footprint
///   only, `footprint * floors / occupancy` rounded half away from zero.
#[must_use]
pub fn enrich(building: &BuildingRecord, params: &EnrichParams) -> BuildingRecord {
    let floors = building.floors.filter(|&f| f > 0);
    let footprint = building.footprint_area_m2;

    let (height_m, height_estimated) = match (building.source_height_m, floors) {
        (Some(height), _) => (Some(height), false),
        (None, Some(f)) => (Some(f64::from(f) * FLOOR_HEIGHT_M), true),
        (None, None) => (None, false),
    };

    let pitch = building
        .custom_pitch_deg
        .or(building.source_pitch_deg)
        .map_or(params.pitch_deg, clamp_pitch);

    BuildingRecord {
        height_m,
        height_estimated,
        roof_area_m2: footprint.map(|area| roof_area(area, pitch)),
        estimated_population: estimate_population(
            building.category,
            footprint,
            floors,
            params.occupancy_m2_per_person,
        ),
        total_floor_area_m2: footprint
            .map(|area| round2(floors.map_or(area, |f| area * f64::from(f)))),
        estimated_floor_height_m: height_m
            .zip(floors)
            .map(|(height, f)| round1(height / f64::from(f))),
        data_completeness: completeness(building),
        ..building.clone()
    }
}

/// Applies pitch overlays and re-enriches a whole collection with new
/// parameters. Metadata is recomputed; sources and timestamp are kept.
#[must_use]
pub fn enrich_collection(
    collection: &BuildingCollection,
    params: &EnrichParams,
    overrides: &PitchOverrides,
) -> BuildingCollection {
    let buildings = collection
        .buildings
        .iter()
        .map(|building| {
            match overrides.get(&building.osm_id) {
                Some(pitch) => {
                    let overlaid = BuildingRecord {
                        custom_pitch_deg: Some(pitch),
                        ..building.clone()
                    };
                    enrich(&overlaid, params)
                }
                None => enrich(building, params),
            }
        })
        .collect();

    log::debug!(
        "Re-enriched {} buildings (pitch {}°, occupancy {} m²/person, {} overrides)",
        collection.len(),
        params.pitch_deg,
        params.occupancy_m2_per_person,
        overrides.0.len()
    );

    BuildingCollection::new(
        buildings,
        collection.metadata.data_sources.clone(),
        collection.metadata.generated_at,
    )
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn estimate_population(
    category: Category,
    footprint: Option<f64>,
    floors: Option<u32>,
    occupancy: f64,
) -> Option<u64> {
    if category != Category::Residential {
        return None;
    }
    let footprint = footprint.filter(|&area| area > 0.0)?;
    let floors = floors?;
    Some((footprint * f64::from(floors) / occupancy).round() as u64)
}

/// Percentage of key attributes present, rounded to one decimal.
fn completeness(building: &BuildingRecord) -> f64 {
    let attributes = &building.attributes;
    let has_tag = |key: &str| attributes.get(key).is_some_and(|v| !v.trim().is_empty());

    let mut filled = COMPLETENESS_TAGS.iter().filter(|key| has_tag(key)).count();
    if building.floors.is_some() {
        filled += 1;
    }
    if building.source_height_m.is_some() {
        filled += 1;
    }
    if attributes.keys().any(|key| key.starts_with("addr:")) {
        filled += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    round1(filled as f64 / COMPLETENESS_FIELDS * 100.0)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
