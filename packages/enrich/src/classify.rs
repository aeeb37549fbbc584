//! Building classification.
//!
//! Maps the raw OSM `building` tag to a [`Category`] using an ordered table
//! of disjoint tag sets, then falls back to structural heuristics (footprint
//! size, floor count, roof shape) when the tag says nothing specific.

use footprints_building_models::Category;

/// Tag assumed when a building carries no `building` value.
pub const DEFAULT_BUILDING_TAG: &str = "yes";

/// Category table. Member sets must stay disjoint; the first match wins.
const CATEGORY_TAGS: &[(Category, &[&str])] = &[
    (
        Category::Residential,
        &[
            "apartments",
            "residential",
            "house",
            "detached",
            "semidetached_house",
            "terrace",
            "bungalow",
            "dormitory",
            "farm",
            "cabin",
            "houseboat",
            "static_caravan",
        ],
    ),
    (
        Category::Religious,
        &[
            "religious",
            "church",
            "cathedral",
            "chapel",
            "mosque",
            "synagogue",
            "temple",
            "shrine",
            "monastery",
            "presbytery",
        ],
    ),
    (Category::Education, &["school", "kindergarten"]),
    (Category::University, &["university", "college"]),
    (Category::Hotel, &["hotel"]),
    (
        Category::Commercial,
        &["commercial", "retail", "office", "supermarket", "kiosk"],
    ),
    (Category::Healthcare, &["hospital", "clinic"]),
    (
        Category::IndustrialStorage,
        &[
            "industrial",
            "warehouse",
            "factory",
            "manufacture",
            "storage_tank",
            "silo",
            "hangar",
            "barn",
        ],
    ),
    (
        Category::Transport,
        &[
            "train_station",
            "transportation",
            "garage",
            "garages",
            "parking",
            "carport",
        ],
    ),
    (
        Category::CulturalPublic,
        &[
            "public",
            "civic",
            "government",
            "townhall",
            "museum",
            "library",
            "theatre",
            "fire_station",
            "sports_hall",
            "stadium",
        ],
    ),
    (
        Category::Tower,
        &["tower", "bell_tower", "water_tower", "transformer_tower"],
    ),
];

/// Footprint below which an untagged building is a small structure.
const SMALL_FOOTPRINT_M2: f64 = 100.0;

/// Footprint above which an untagged building counts as large.
const LARGE_FOOTPRINT_M2: f64 = 1000.0;

/// Most floors a mid-sized untagged building may have to still be read as
/// residential.
const RESIDENTIAL_MAX_FLOORS: u32 = 5;

/// Classifies a raw `building` tag. Total and case-insensitive; an absent
/// tag is treated as `"yes"`, and unmatched tags are [`Category::Other`].
#[must_use]
pub fn classify(raw_tag: Option<&str>) -> Category {
    let tag = raw_tag
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_BUILDING_TAG)
        .to_lowercase();

    CATEGORY_TAGS
        .iter()
        .find(|(_, tags)| tags.contains(&tag.as_str()))
        .map_or(Category::Other, |(category, _)| *category)
}

/// Structural facts about a building used when its tag is uninformative.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StructuralSignals<'a> {
    /// Footprint area in square meters.
    pub footprint_area_m2: Option<f64>,
    /// Number of floors.
    pub floors: Option<u32>,
    /// `roof:shape` tag.
    pub roof_shape: Option<&'a str>,
}

/// Result of [`classify_building`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Final category.
    pub category: Category,
    /// Label of the heuristic that decided it, when one did.
    pub inferred_type: Option<&'static str>,
}

impl Classification {
    const fn tagged(category: Category) -> Self {
        Self {
            category,
            inferred_type: None,
        }
    }

    const fn inferred(category: Category, label: &'static str) -> Self {
        Self {
            category,
            inferred_type: Some(label),
        }
    }
}

/// Classifies a building from its tag and, when the tag maps to nothing
/// specific, from its structural signals.
///
/// Heuristics, first match wins:
///
/// | footprint | floors | roof | result |
/// |---|---|---|---|
/// | < 100 m² | ≤ 1 | any | Other (`small_structure`) |
/// | 100-1000 m² | ≤ 5 | any | Residential (`residential`) |
/// | > 1000 m² | > 1 | any | Residential (`apartment_block`) |
/// | > 1000 m² | none | flat | Industrial/Storage (`industrial_flat_roof`) |
/// | > 1000 m² | none | none | Unknown (`large_building`) |
#[must_use]
pub fn classify_building(raw_tag: Option<&str>, signals: StructuralSignals<'_>) -> Classification {
    let category = classify(raw_tag);
    if category != Category::Other {
        return Classification::tagged(category);
    }

    let Some(area) = signals.footprint_area_m2 else {
        return Classification::tagged(category);
    };
    let floors = signals.floors;
    let roof_shape = signals
        .roof_shape
        .map(str::trim)
        .filter(|shape| !shape.is_empty());

    if area < SMALL_FOOTPRINT_M2 && floors.is_some_and(|f| f <= 1) {
        return Classification::inferred(Category::Other, "small_structure");
    }
    if (SMALL_FOOTPRINT_M2..=LARGE_FOOTPRINT_M2).contains(&area)
        && floors.is_some_and(|f| f <= RESIDENTIAL_MAX_FLOORS)
    {
        return Classification::inferred(Category::Residential, "residential");
    }
    if area > LARGE_FOOTPRINT_M2 {
        match (floors, roof_shape) {
            (Some(f), _) if f > 1 => {
                return Classification::inferred(Category::Residential, "apartment_block");
            }
            (None, Some(shape)) if shape.eq_ignore_ascii_case("flat") => {
                return Classification::inferred(
                    Category::IndustrialStorage,
                    "industrial_flat_roof",
                );
            }
            (None, None) => {
                return Classification::inferred(Category::Unknown, "large_building");
            }
            _ => {}
        }
    }

    Classification::tagged(category)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn signals(area: f64, floors: Option<u32>, roof: Option<&str>) -> StructuralSignals<'_> {
        StructuralSignals {
            footprint_area_m2: Some(area),
            floors,
            roof_shape: roof,
        }
    }

    #[test]
    fn tag_lookup() {
        assert_eq!(classify(Some("hospital")), Category::Healthcare);
        assert_eq!(classify(Some("Apartments")), Category::Residential);
        assert_eq!(classify(Some(" church ")), Category::Religious);
        assert_eq!(classify(Some("warehouse")), Category::IndustrialStorage);
        assert_eq!(classify(Some("university")), Category::University);
    }

    #[test]
    fn yes_absent_and_unknown_tags_are_other() {
        assert_eq!(classify(Some("yes")), Category::Other);
        assert_eq!(classify(None), Category::Other);
        assert_eq!(classify(Some("")), Category::Other);
        assert_eq!(classify(Some("zzz")), Category::Other);
    }

    #[test]
    fn tag_sets_are_disjoint() {
        let mut seen = BTreeSet::new();
        for (category, tags) in CATEGORY_TAGS {
            for tag in *tags {
                assert!(seen.insert(*tag), "{tag} listed twice (again under {category})");
                assert_eq!(*tag, tag.to_lowercase(), "{tag} must be lowercase");
            }
        }
    }

    #[test]
    fn specific_tag_beats_heuristics() {
        let result = classify_building(Some("hospital"), signals(5000.0, None, None));
        assert_eq!(result, Classification::tagged(Category::Healthcare));
    }

    #[test]
    fn heuristics_for_untagged_buildings() {
        let cases = [
            (signals(60.0, Some(1), None), Category::Other, "small_structure"),
            (signals(400.0, Some(4), None), Category::Residential, "residential"),
            (signals(2500.0, Some(8), None), Category::Residential, "apartment_block"),
            (
                signals(2500.0, None, Some("flat")),
                Category::IndustrialStorage,
                "industrial_flat_roof",
            ),
            (signals(2500.0, None, None), Category::Unknown, "large_building"),
        ];
        for (signals, category, label) in cases {
            let result = classify_building(Some("yes"), signals);
            assert_eq!(result, Classification::inferred(category, label), "{signals:?}");
        }
    }

    #[test]
    fn no_heuristic_matches() {
        // Mid-sized but tall, or large single-storey with a pitched roof.
        assert_eq!(
            classify_building(None, signals(400.0, Some(9), None)),
            Classification::tagged(Category::Other)
        );
        assert_eq!(
            classify_building(None, signals(2500.0, None, Some("gabled"))),
            Classification::tagged(Category::Other)
        );
        assert_eq!(
            classify_building(None, signals(60.0, None, None)),
            Classification::tagged(Category::Other)
        );
        assert_eq!(
            classify_building(None, StructuralSignals::default()),
            Classification::tagged(Category::Other)
        );
    }
}
