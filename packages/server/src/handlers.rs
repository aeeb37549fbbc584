//! HTTP handler functions for the footprints API.

use std::sync::PoisonError;

use actix_web::{HttpResponse, web};
use footprints_building_models::{Category, OsmElementKind, OsmId};
use footprints_enrich::{EnrichParams, enrich_collection};
use footprints_server_models::{
    ApiBuildings, ApiCategory, ApiHealth, ApiPolygonTask, ApiPolygonWithdrawn, ApiProgress,
    BuildingsQueryParams, PitchOverrideRequest, PolygonRequest,
};
use footprints_tasks::{PolygonId, TaskError, TaskId};
use serde_json::json;

use crate::AppState;

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        tasks: state.registry.manager().len(),
    })
}

/// `GET /api/categories`
pub async fn categories() -> HttpResponse {
    let categories: Vec<ApiCategory> = Category::all()
        .iter()
        .copied()
        .map(ApiCategory::from)
        .collect();
    HttpResponse::Ok().json(categories)
}

/// `POST /api/process-polygon`
///
/// Submits a standalone task and returns its initial progress.
pub async fn process_polygon(
    state: web::Data<AppState>,
    body: web::Json<PolygonRequest>,
) -> HttpResponse {
    let manager = state.registry.manager();
    let snapshot = manager
        .submit(&body.coordinates)
        .and_then(|task_id| manager.get_progress(task_id));

    match snapshot {
        Ok(snapshot) => HttpResponse::Ok().json(ApiProgress::from(&snapshot)),
        Err(e) => task_error(&e),
    }
}

/// `GET /api/progress/{task_id}`
pub async fn progress(state: web::Data<AppState>, path: web::Path<TaskId>) -> HttpResponse {
    match state.registry.manager().get_progress(path.into_inner()) {
        Ok(snapshot) => HttpResponse::Ok().json(ApiProgress::from(&snapshot)),
        Err(e) => task_error(&e),
    }
}

/// `GET /api/polygons`
pub async fn list_polygons(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.registry.active())
}

/// `POST /api/polygons`
pub async fn add_polygon(
    state: web::Data<AppState>,
    body: web::Json<PolygonRequest>,
) -> HttpResponse {
    match state.registry.add(&body.coordinates) {
        Ok(entry) => HttpResponse::Created().json(ApiPolygonTask {
            polygon_id: entry.polygon_id,
            task_id: entry.task_id,
        }),
        Err(e) => task_error(&e),
    }
}

/// `PUT /api/polygons/{polygon_id}`
///
/// Starts a new task for the edited polygon. The previous task's result
/// stops counting towards `GET /api/buildings`.
pub async fn replace_polygon(
    state: web::Data<AppState>,
    path: web::Path<PolygonId>,
    body: web::Json<PolygonRequest>,
) -> HttpResponse {
    let polygon_id = path.into_inner();
    match state.registry.replace(polygon_id, &body.coordinates) {
        Ok(task_id) => HttpResponse::Ok().json(ApiPolygonTask {
            polygon_id,
            task_id,
        }),
        Err(e) => task_error(&e),
    }
}

/// `DELETE /api/polygons/{polygon_id}`
pub async fn withdraw_polygon(
    state: web::Data<AppState>,
    path: web::Path<PolygonId>,
) -> HttpResponse {
    let polygon_id = path.into_inner();
    match state.registry.withdraw(polygon_id) {
        Ok(orphaned_task_id) => HttpResponse::Ok().json(ApiPolygonWithdrawn {
            polygon_id,
            orphaned_task_id,
        }),
        Err(e) => task_error(&e),
    }
}

/// `GET /api/buildings?pitch=&occupancy=`
///
/// Merges the completed results of the active polygons and re-enriches
/// them with the requested parameters and the per-building pitch overlays.
pub async fn buildings(
    state: web::Data<AppState>,
    query: web::Query<BuildingsQueryParams>,
) -> HttpResponse {
    let defaults = state.params;
    let params = match EnrichParams::new(
        query.pitch.unwrap_or_else(|| defaults.pitch_deg()),
        query
            .occupancy
            .unwrap_or_else(|| defaults.occupancy_m2_per_person()),
    ) {
        Ok(params) => params,
        Err(e) => {
            return HttpResponse::BadRequest().json(json!({ "error": e.to_string() }));
        }
    };

    let merged = state.registry.merged();
    let overrides = state
        .overrides
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let collection = enrich_collection(&merged.collection, &params, &overrides);

    HttpResponse::Ok().json(ApiBuildings {
        collection,
        pending_polygons: merged.pending,
        failed_polygons: merged.unavailable,
        pitch_deg: params.pitch_deg(),
        occupancy_m2_per_person: params.occupancy_m2_per_person(),
    })
}

/// `PUT /api/buildings/{kind}/{id}/pitch`
///
/// Sets a pitch overlay for one building. It applies to every later
/// `GET /api/buildings`.
pub async fn set_pitch(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
    body: web::Json<PitchOverrideRequest>,
) -> HttpResponse {
    let osm_id = match parse_osm_id(path.into_inner()) {
        Ok(osm_id) => osm_id,
        Err(response) => return response,
    };
    if !body.pitch_deg.is_finite() {
        return HttpResponse::BadRequest().json(json!({ "error": "pitchDeg must be a number" }));
    }

    state
        .overrides
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .set(osm_id, body.pitch_deg);
    HttpResponse::NoContent().finish()
}

/// `DELETE /api/buildings/{kind}/{id}/pitch`
pub async fn clear_pitch(
    state: web::Data<AppState>,
    path: web::Path<(String, i64)>,
) -> HttpResponse {
    let osm_id = match parse_osm_id(path.into_inner()) {
        Ok(osm_id) => osm_id,
        Err(response) => return response,
    };

    state
        .overrides
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .clear(&osm_id);
    HttpResponse::NoContent().finish()
}

fn parse_osm_id((kind, id): (String, i64)) -> Result<OsmId, HttpResponse> {
    kind.parse::<OsmElementKind>()
        .map(|kind| OsmId::new(kind, id))
        .map_err(|_| {
            HttpResponse::BadRequest().json(json!({
                "error": format!("Unknown OSM element kind: {kind}")
            }))
        })
}

/// Maps a task-layer error to a JSON error response.
fn task_error(e: &TaskError) -> HttpResponse {
    let body = json!({ "error": e.to_string() });
    match e {
        TaskError::InvalidGeometry(_) => {
            log::debug!("Rejected polygon: {e}");
            HttpResponse::BadRequest().json(body)
        }
        TaskError::NotFound { .. } | TaskError::UnknownPolygon { .. } => {
            HttpResponse::NotFound().json(body)
        }
    }
}
