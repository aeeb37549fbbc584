//! Merging of per-polygon results.
//!
//! A building that intersects several polygons shows up in each of their
//! results. Merging keeps the first copy seen, in the order collections are
//! supplied, so callers pass results in polygon submission order.

use std::collections::BTreeSet;

use footprints_building_models::BuildingCollection;

/// Concatenates collections, deduplicating buildings by `osm_id`
/// (first occurrence wins).
///
/// A single collection is returned unchanged. Metadata of the merged
/// collection is recomputed: sources are unioned in first-seen order and
/// the generation time is the newest of the inputs.
#[must_use]
pub fn merge<'a, I>(collections: I) -> BuildingCollection
where
    I: IntoIterator<Item = &'a BuildingCollection>,
{
    let collections: Vec<&BuildingCollection> = collections.into_iter().collect();

    match collections.as_slice() {
        [] => return BuildingCollection::empty(),
        [single] => return (*single).clone(),
        _ => {}
    }

    let capacity = collections.iter().map(|c| c.len()).sum();
    let mut seen = BTreeSet::new();
    let mut buildings = Vec::with_capacity(capacity);
    let mut data_sources: Vec<String> = Vec::new();
    let mut generated_at = None;

    for collection in &collections {
        for source in &collection.metadata.data_sources {
            if !data_sources.contains(source) {
                data_sources.push(source.clone());
            }
        }
        generated_at = generated_at.max(collection.metadata.generated_at);

        buildings.extend(
            collection
                .buildings
                .iter()
                .filter(|building| seen.insert(building.osm_id))
                .cloned(),
        );
    }

    let duplicates = capacity - buildings.len();
    if duplicates > 0 {
        log::debug!(
            "Merged {} collections: {} buildings, {duplicates} duplicates dropped",
            collections.len(),
            buildings.len()
        );
    }

    BuildingCollection::new(buildings, data_sources, generated_at)
}
