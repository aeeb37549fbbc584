//! Normalizes Overpass JSON responses into [`RawBuilding`] values.
//!
//! The response is a flat `elements` array mixing tagged buildings (nodes,
//! ways, multipolygon relations) with the untagged nodes and member ways
//! that carry their geometry. Buildings are resolved against those, their
//! geodesic footprint area is computed, and any building that does not
//! intersect the query boundary is dropped. A malformed building is logged
//! and skipped without failing the rest of the response.

use std::collections::{BTreeMap, BTreeSet};

use footprints_building_models::{OsmElementKind, OsmId};
use footprints_geometry::{ClosedRing, multi_polygon_area, normalize_ring, polygon_area};
use footprints_source_models::{FetchedBuildings, RawBuilding};
use geo::{Contains, Intersects, MultiPolygon, Point, Polygon};

use crate::SourceError;
use crate::tags::{construction_year, non_empty, parse_floors, parse_height, roof_pitch};

/// Geometry of one building before conversion to `GeoJSON`.
#[derive(Debug, Clone)]
enum Footprint {
    Point(Point<f64>),
    Polygon(Polygon<f64>),
    MultiPolygon(MultiPolygon<f64>),
}

impl Footprint {
    fn intersects(&self, boundary: &Polygon<f64>) -> bool {
        match self {
            Self::Point(p) => boundary.intersects(p),
            Self::Polygon(p) => boundary.intersects(p),
            Self::MultiPolygon(mp) => boundary.intersects(mp),
        }
    }

    fn area(&self) -> Option<f64> {
        match self {
            Self::Point(_) => None,
            Self::Polygon(p) => Some(polygon_area(p)),
            Self::MultiPolygon(mp) => Some(multi_polygon_area(mp)),
        }
    }

    fn to_geojson(&self) -> geojson::Geometry {
        let value = match self {
            Self::Point(p) => geojson::Value::from(p),
            Self::Polygon(p) => geojson::Value::from(p),
            Self::MultiPolygon(mp) => geojson::Value::from(mp),
        };
        geojson::Geometry::new(value)
    }
}

/// Lookup tables for the untagged geometry elements of a response.
struct ElementIndex<'a> {
    nodes: BTreeMap<i64, [f64; 2]>,
    ways: BTreeMap<i64, &'a serde_json::Value>,
}

impl<'a> ElementIndex<'a> {
    fn build(elements: &'a [serde_json::Value]) -> Self {
        let mut nodes = BTreeMap::new();
        let mut ways = BTreeMap::new();

        for element in elements {
            let Some(id) = element["id"].as_i64() else {
                continue;
            };
            match element["type"].as_str() {
                Some("node") => {
                    if let (Some(lon), Some(lat)) = (element["lon"].as_f64(), element["lat"].as_f64()) {
                        nodes.insert(id, [lon, lat]);
                    }
                }
                Some("way") => {
                    ways.entry(id).or_insert(element);
                }
                _ => {}
            }
        }

        Self { nodes, ways }
    }

    fn way_node_ids(&self, way_id: i64) -> Option<Vec<i64>> {
        node_ids(self.ways.get(&way_id)?)
    }

    fn coords(&self, node_ids: &[i64]) -> Result<Vec<[f64; 2]>, String> {
        node_ids
            .iter()
            .map(|id| {
                self.nodes
                    .get(id)
                    .copied()
                    .ok_or_else(|| format!("node {id} missing from response"))
            })
            .collect()
    }
}

fn node_ids(way: &serde_json::Value) -> Option<Vec<i64>> {
    way["nodes"]
        .as_array()?
        .iter()
        .map(serde_json::Value::as_i64)
        .collect()
}

/// Normalizes an Overpass `out:json` response.
///
/// # Errors
///
/// Returns [`SourceError::Upstream`] if the response has no `elements`
/// array or reports a server-side runtime error (Overpass answers query
/// timeouts with HTTP 200 and a `remark`).
pub fn normalize_response(
    body: &serde_json::Value,
    boundary: &ClosedRing,
    data_source: &str,
) -> Result<FetchedBuildings, SourceError> {
    if let Some(remark) = body["remark"].as_str() {
        if remark.contains("runtime error") {
            return Err(SourceError::Upstream {
                message: format!("Overpass query failed: {remark}"),
            });
        }
    }

    let elements = body["elements"]
        .as_array()
        .ok_or_else(|| SourceError::Upstream {
            message: "No elements array in Overpass response".to_string(),
        })?;

    let index = ElementIndex::build(elements);
    let boundary = boundary.to_polygon();

    let mut seen = BTreeSet::new();
    let mut buildings = Vec::new();
    let mut skipped = 0;
    let mut outside = 0;

    for element in elements.iter().filter(|e| is_building(e)) {
        match normalize_element(element, &index) {
            Ok((osm_id, footprint, tags)) => {
                if !footprint.intersects(&boundary) {
                    outside += 1;
                    continue;
                }
                if !seen.insert(osm_id) {
                    log::debug!("Duplicate element {osm_id} in response, keeping first");
                    continue;
                }
                buildings.push(raw_building(osm_id, &footprint, tags));
            }
            Err(e) => {
                log::warn!("{e}");
                skipped += 1;
            }
        }
    }

    log::info!(
        "Normalized {} buildings ({skipped} skipped, {outside} outside boundary)",
        buildings.len()
    );

    Ok(FetchedBuildings {
        buildings,
        data_source: data_source.to_string(),
        skipped,
    })
}

/// Whether the element carries a `building` tag other than `no`.
fn is_building(element: &serde_json::Value) -> bool {
    element["tags"]["building"]
        .as_str()
        .is_some_and(|v| v != "no")
}

fn normalize_element(
    element: &serde_json::Value,
    index: &ElementIndex<'_>,
) -> Result<(OsmId, Footprint, BTreeMap<String, String>), SourceError> {
    let kind = match element["type"].as_str() {
        Some("node") => OsmElementKind::Node,
        Some("way") => OsmElementKind::Way,
        Some("relation") => OsmElementKind::Relation,
        other => {
            return Err(SourceError::PartialRecord {
                element: format!("{other:?}/{}", element["id"]),
                message: "unsupported element type".to_string(),
            });
        }
    };
    let id = element["id"]
        .as_i64()
        .ok_or_else(|| SourceError::PartialRecord {
            element: format!("{kind}/?"),
            message: "missing numeric id".to_string(),
        })?;
    let osm_id = OsmId::new(kind, id);
    let partial = |message: String| SourceError::PartialRecord {
        element: osm_id.to_string(),
        message,
    };

    let footprint = match kind {
        OsmElementKind::Node => {
            let lon = element["lon"].as_f64();
            let lat = element["lat"].as_f64();
            match (lon, lat) {
                (Some(lon), Some(lat)) => Footprint::Point(Point::new(lon, lat)),
                _ => return Err(partial("node without coordinates".to_string())),
            }
        }
        OsmElementKind::Way => {
            let ids = node_ids(element).ok_or_else(|| partial("way without node list".to_string()))?;
            let coords = index.coords(&ids).map_err(partial)?;
            let ring = normalize_ring(&coords).map_err(|e| partial(e.to_string()))?;
            Footprint::Polygon(ring.to_polygon())
        }
        OsmElementKind::Relation => relation_footprint(element, index).map_err(partial)?,
    };

    Ok((osm_id, footprint, tag_map(element)))
}

fn tag_map(element: &serde_json::Value) -> BTreeMap<String, String> {
    element["tags"]
        .as_object()
        .map(|tags| {
            tags.iter()
                .filter_map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s.clone(),
                        serde_json::Value::Null => return None,
                        other => other.to_string(),
                    };
                    Some((k.clone(), value))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Assembles a multipolygon relation from its member ways.
///
/// Outer members are stitched into closed rings; each inner ring becomes a
/// hole of the first outer polygon containing it.
fn relation_footprint(
    relation: &serde_json::Value,
    index: &ElementIndex<'_>,
) -> Result<Footprint, String> {
    let members = relation["members"]
        .as_array()
        .ok_or_else(|| "relation without members".to_string())?;

    let mut outer_segments = Vec::new();
    let mut inner_segments = Vec::new();

    for member in members {
        if member["type"].as_str() != Some("way") {
            continue;
        }
        let way_id = member["ref"]
            .as_i64()
            .ok_or_else(|| "member without ref".to_string())?;
        let ids = index
            .way_node_ids(way_id)
            .ok_or_else(|| format!("member way {way_id} missing from response"))?;
        match member["role"].as_str() {
            Some("inner") => inner_segments.push(ids),
            _ => outer_segments.push(ids),
        }
    }

    let mut outers: Vec<Polygon<f64>> = stitch_rings(outer_segments)?
        .iter()
        .map(|ids| ring_polygon(index, ids))
        .collect::<Result<_, _>>()?;

    if outers.is_empty() {
        return Err("relation has no outer ring".to_string());
    }

    for ids in stitch_rings(inner_segments)? {
        let hole = ring_polygon(index, &ids)?;
        let Some(probe) = hole.exterior().0.first().copied() else {
            continue;
        };
        if let Some(outer) = outers
            .iter_mut()
            .find(|outer| outer.contains(&Point::from(probe)))
        {
            outer.interiors_push(hole.exterior().clone());
        }
    }

    if outers.len() == 1 {
        Ok(Footprint::Polygon(outers.remove(0)))
    } else {
        Ok(Footprint::MultiPolygon(MultiPolygon::new(outers)))
    }
}

fn ring_polygon(index: &ElementIndex<'_>, node_ids: &[i64]) -> Result<Polygon<f64>, String> {
    let coords = index.coords(node_ids)?;
    let ring = normalize_ring(&coords).map_err(|e| e.to_string())?;
    Ok(ring.to_polygon())
}

/// Joins way segments end to end into closed rings of node ids.
///
/// Segments may need reversing to connect. Fails if a ring cannot be
/// closed with the available segments.
fn stitch_rings(mut segments: Vec<Vec<i64>>) -> Result<Vec<Vec<i64>>, String> {
    segments.retain(|s| !s.is_empty());
    let mut rings = Vec::new();

    while !segments.is_empty() {
        let mut ring = segments.remove(0);

        while ring.first() != ring.last() || ring.len() < 2 {
            let Some(&tail) = ring.last() else {
                break;
            };
            let next = segments
                .iter()
                .position(|s| s.first() == Some(&tail) || s.last() == Some(&tail));
            let Some(pos) = next else {
                return Err(format!("unclosed ring ending at node {tail}"));
            };
            let mut segment = segments.remove(pos);
            if segment.first() != Some(&tail) {
                segment.reverse();
            }
            ring.extend(segment.into_iter().skip(1));
        }

        rings.push(ring);
    }

    Ok(rings)
}

fn raw_building(
    osm_id: OsmId,
    footprint: &Footprint,
    tags: BTreeMap<String, String>,
) -> RawBuilding {
    let footprint_area_m2 = footprint.area();
    RawBuilding {
        osm_id,
        geometry: footprint.to_geojson(),
        footprint_area_m2,
        building_type: non_empty(&tags, "building").map(String::from),
        name: non_empty(&tags, "name").map(String::from),
        floors: non_empty(&tags, "building:levels").and_then(parse_floors),
        height_m: non_empty(&tags, "height").and_then(parse_height),
        roof_shape: non_empty(&tags, "roof:shape").map(str::to_lowercase),
        source_pitch_deg: roof_pitch(&tags, footprint_area_m2),
        construction_year: construction_year(&tags),
        tags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boundary() -> ClosedRing {
        normalize_ring(&[[0.0, 0.0], [0.01, 0.0], [0.01, 0.01], [0.0, 0.01]]).unwrap()
    }

    fn square_nodes(base_id: i64, x: f64, y: f64, size: f64) -> Vec<serde_json::Value> {
        [(0.0, 0.0), (size, 0.0), (size, size), (0.0, size)]
            .iter()
            .enumerate()
            .map(|(i, (dx, dy))| {
                serde_json::json!({
                    "type": "node",
                    "id": base_id + i64::try_from(i).unwrap(),
                    "lon": x + dx,
                    "lat": y + dy,
                })
            })
            .collect()
    }

    fn closed_way(id: i64, base: i64, tags: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "type": "way",
            "id": id,
            "nodes": [base, base + 1, base + 2, base + 3, base],
            "tags": tags,
        })
    }

    fn response(mut elements: Vec<serde_json::Value>, nodes: Vec<Vec<serde_json::Value>>) -> serde_json::Value {
        for group in nodes {
            elements.extend(group);
        }
        serde_json::json!({ "version": 0.6, "elements": elements })
    }

    #[test]
    fn empty_response_is_empty_collection() {
        let body = serde_json::json!({ "elements": [] });
        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert!(fetched.buildings.is_empty());
        assert_eq!(fetched.skipped, 0);
        assert_eq!(fetched.data_source, "osm");
    }

    #[test]
    fn missing_elements_is_an_error() {
        let body = serde_json::json!({ "error": "nope" });
        assert!(matches!(
            normalize_response(&body, &boundary(), "osm"),
            Err(SourceError::Upstream { .. })
        ));
    }

    #[test]
    fn runtime_error_remark_is_an_error() {
        let body = serde_json::json!({
            "elements": [],
            "remark": "runtime error: Query timed out in \"query\" at line 3 after 60 seconds."
        });
        assert!(normalize_response(&body, &boundary(), "osm").is_err());
    }

    #[test]
    fn normalizes_tagged_way() {
        let body = response(
            vec![closed_way(
                10,
                100,
                serde_json::json!({
                    "building": "apartments",
                    "building:levels": "6",
                    "height": "19 m",
                    "roof:shape": "Flat",
                    "start_date": "1962",
                    "addr:street": "Via Roma",
                }),
            )],
            vec![square_nodes(100, 0.001, 0.001, 0.0002)],
        );

        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert_eq!(fetched.buildings.len(), 1);

        let b = &fetched.buildings[0];
        assert_eq!(b.osm_id, OsmId::way(10));
        assert_eq!(b.building_type.as_deref(), Some("apartments"));
        assert_eq!(b.floors, Some(6));
        assert_eq!(b.height_m, Some(19.0));
        assert_eq!(b.roof_shape.as_deref(), Some("flat"));
        assert_eq!(b.construction_year, Some(1962));
        assert_eq!(b.tags["addr:street"], "Via Roma");
        let area = b.footprint_area_m2.unwrap();
        assert!(area > 450.0 && area < 550.0, "area was {area}");
        assert!(matches!(b.geometry.value, geojson::Value::Polygon(_)));
    }

    #[test]
    fn clockwise_way_has_its_own_area() {
        let mut clockwise = closed_way(
            18,
            150,
            serde_json::json!({ "building": "house", "roof:angle": "30" }),
        );
        clockwise["nodes"] = serde_json::json!([150, 153, 152, 151, 150]);
        let body = response(
            vec![
                clockwise,
                closed_way(19, 170, serde_json::json!({ "building": "house" })),
            ],
            vec![
                square_nodes(150, 0.001, 0.001, 0.0002),
                square_nodes(170, 0.002, 0.002, 0.0002),
            ],
        );

        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert_eq!(fetched.buildings.len(), 2);
        let cw = fetched.buildings[0].footprint_area_m2.unwrap();
        let ccw = fetched.buildings[1].footprint_area_m2.unwrap();
        assert!(cw > 450.0 && cw < 550.0, "area was {cw}");
        assert!((cw - ccw).abs() < 1.0);
        assert_eq!(fetched.buildings[0].source_pitch_deg, Some(30.0));
        assert_eq!(fetched.buildings[1].source_pitch_deg, None);
    }

    #[test]
    fn skips_way_with_missing_node_and_keeps_the_rest() {
        let mut broken = closed_way(11, 200, serde_json::json!({ "building": "yes" }));
        broken["nodes"] = serde_json::json!([200, 201, 999, 200]);

        let body = response(
            vec![
                broken,
                closed_way(12, 300, serde_json::json!({ "building": "house" })),
            ],
            vec![
                square_nodes(200, 0.002, 0.002, 0.0001),
                square_nodes(300, 0.003, 0.003, 0.0001),
            ],
        );

        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert_eq!(fetched.skipped, 1);
        assert_eq!(fetched.buildings.len(), 1);
        assert_eq!(fetched.buildings[0].osm_id, OsmId::way(12));
    }

    #[test]
    fn drops_buildings_outside_boundary() {
        let body = response(
            vec![closed_way(13, 400, serde_json::json!({ "building": "yes" }))],
            vec![square_nodes(400, 0.5, 0.5, 0.0001)],
        );
        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert!(fetched.buildings.is_empty());
        assert_eq!(fetched.skipped, 0);
    }

    #[test]
    fn keeps_building_straddling_boundary() {
        let body = response(
            vec![closed_way(14, 500, serde_json::json!({ "building": "yes" }))],
            vec![square_nodes(500, 0.0099, 0.005, 0.001)],
        );
        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert_eq!(fetched.buildings.len(), 1);
    }

    #[test]
    fn ignores_untagged_and_building_no() {
        let body = response(
            vec![
                closed_way(15, 600, serde_json::json!({ "building": "no" })),
                serde_json::json!({ "type": "way", "id": 16, "nodes": [600, 601, 602, 600] }),
            ],
            vec![square_nodes(600, 0.004, 0.004, 0.0001)],
        );
        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert!(fetched.buildings.is_empty());
        assert_eq!(fetched.skipped, 0);
    }

    #[test]
    fn duplicate_elements_keep_first() {
        let body = response(
            vec![
                closed_way(17, 700, serde_json::json!({ "building": "house" })),
                closed_way(17, 700, serde_json::json!({ "building": "garage" })),
            ],
            vec![square_nodes(700, 0.004, 0.004, 0.0001)],
        );
        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert_eq!(fetched.buildings.len(), 1);
        assert_eq!(fetched.buildings[0].building_type.as_deref(), Some("house"));
    }

    #[test]
    fn building_node_becomes_point_without_area() {
        let body = serde_json::json!({
            "elements": [{
                "type": "node", "id": 20, "lon": 0.005, "lat": 0.005,
                "tags": { "building": "hut" }
            }]
        });
        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert_eq!(fetched.buildings.len(), 1);
        assert_eq!(fetched.buildings[0].osm_id, OsmId::node(20));
        assert!(fetched.buildings[0].footprint_area_m2.is_none());
    }

    #[test]
    fn relation_with_courtyard_subtracts_hole() {
        // Outer ring split across two ways, inner ring as one closed way.
        let mut nodes = square_nodes(800, 0.004, 0.004, 0.0004);
        nodes.extend(square_nodes(900, 0.0041, 0.0041, 0.0002));
        let body = response(
            vec![
                serde_json::json!({ "type": "way", "id": 80, "nodes": [800, 801, 802] }),
                serde_json::json!({ "type": "way", "id": 81, "nodes": [800, 803, 802] }),
                serde_json::json!({ "type": "way", "id": 90, "nodes": [900, 901, 902, 903, 900] }),
                serde_json::json!({
                    "type": "relation",
                    "id": 5,
                    "members": [
                        { "type": "way", "ref": 80, "role": "outer" },
                        { "type": "way", "ref": 81, "role": "outer" },
                        { "type": "way", "ref": 90, "role": "inner" },
                    ],
                    "tags": { "type": "multipolygon", "building": "school" },
                }),
            ],
            vec![nodes],
        );

        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert_eq!(fetched.buildings.len(), 1);
        let b = &fetched.buildings[0];
        assert_eq!(b.osm_id, OsmId::relation(5));

        let full = 44.5 * 44.2;
        let area = b.footprint_area_m2.unwrap();
        // 0.0004 deg square minus a quarter-sized hole.
        assert!(area < full && area > full * 0.6, "area was {area}");
    }

    #[test]
    fn relation_with_open_ring_is_skipped() {
        let body = response(
            vec![
                serde_json::json!({ "type": "way", "id": 82, "nodes": [800, 801, 802] }),
                serde_json::json!({
                    "type": "relation",
                    "id": 6,
                    "members": [{ "type": "way", "ref": 82, "role": "outer" }],
                    "tags": { "building": "yes" },
                }),
            ],
            vec![square_nodes(800, 0.004, 0.004, 0.0004)],
        );
        let fetched = normalize_response(&body, &boundary(), "osm").unwrap();
        assert!(fetched.buildings.is_empty());
        assert_eq!(fetched.skipped, 1);
    }

    #[test]
    fn stitches_reversed_segments() {
        let rings = stitch_rings(vec![vec![1, 2, 3], vec![1, 4, 3]]).unwrap();
        assert_eq!(rings, vec![vec![1, 2, 3, 4, 1]]);
    }
}
