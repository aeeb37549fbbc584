#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for building footprint acquisition.
//!
//! Clients submit polygons, poll their tasks' progress, and fetch the
//! merged, re-enriched buildings of their active polygons. Tasks live in
//! memory; finished tasks are pruned after a retention window.

pub mod config;
mod handlers;

use std::sync::{Arc, RwLock};

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use footprints_enrich::{EnrichParams, PitchOverrides};
use footprints_source::BuildingSource;
use footprints_source::overpass::{OverpassConfig, OverpassSource};
use footprints_tasks::{PolygonRegistry, TaskManager};

use crate::config::ServerConfig;

/// Shared application state.
pub struct AppState {
    /// Polygon bookkeeping and the task manager behind it.
    pub registry: PolygonRegistry,
    /// Estimation parameters used when a request does not give its own.
    pub params: EnrichParams,
    /// Per-building pitch overlays.
    pub overrides: RwLock<PitchOverrides>,
}

impl AppState {
    /// Creates state around a building source.
    #[must_use]
    pub fn new(source: Arc<dyn BuildingSource>, params: EnrichParams) -> Self {
        Self {
            registry: PolygonRegistry::new(TaskManager::new(source, params)),
            params,
            overrides: RwLock::new(PitchOverrides::default()),
        }
    }
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/categories", web::get().to(handlers::categories))
            .route("/process-polygon", web::post().to(handlers::process_polygon))
            .route("/progress/{task_id}", web::get().to(handlers::progress))
            .route("/polygons", web::get().to(handlers::list_polygons))
            .route("/polygons", web::post().to(handlers::add_polygon))
            .route("/polygons/{polygon_id}", web::put().to(handlers::replace_polygon))
            .route("/polygons/{polygon_id}", web::delete().to(handlers::withdraw_polygon))
            .route("/buildings", web::get().to(handlers::buildings))
            .route(
                "/buildings/{kind}/{id}/pitch",
                web::put().to(handlers::set_pitch),
            )
            .route(
                "/buildings/{kind}/{id}/pitch",
                web::delete().to(handlers::clear_pitch),
            ),
    );
}

/// Starts the footprints API server.
///
/// Reads [`ServerConfig`] from the environment, builds the Overpass source,
/// starts the finished-task pruner and runs the Actix-Web HTTP server. The
/// caller provides the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the configuration is invalid, the
/// HTTP client cannot be built, or the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env().map_err(std::io::Error::other)?;
    log::info!(
        "Estimation defaults: pitch {}°, occupancy {} m²/person",
        config.params.pitch_deg(),
        config.params.occupancy_m2_per_person()
    );

    let overpass = OverpassConfig {
        query_timeout: config.overpass_timeout,
        ..OverpassConfig::default()
    };
    log::info!("Using {} Overpass endpoints", overpass.endpoints.len());
    let source = OverpassSource::new(overpass).map_err(std::io::Error::other)?;

    let state = web::Data::new(AppState::new(Arc::new(source), config.params));

    spawn_pruner(state.clone().into_inner(), config.task_retention);

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}

/// Periodically drops finished tasks older than `retention` that no active
/// polygon points at.
fn spawn_pruner(state: Arc<AppState>, retention: std::time::Duration) {
    let period = (retention / 4).max(std::time::Duration::from_secs(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            state.registry.prune_finished(retention);
        }
    });
}
