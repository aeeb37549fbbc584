#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the footprints server.
//!
//! These types are serialized to JSON for the REST API. They are separate
//! from the task and building types to allow independent evolution of the
//! API contract.

use chrono::{DateTime, Utc};
use footprints_building_models::{BuildingCollection, Category};
use footprints_tasks::{PolygonId, TaskId, TaskSnapshot, TaskStatus};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the service is healthy.
    pub healthy: bool,
    /// Service version.
    pub version: String,
    /// Number of tasks currently held in memory.
    pub tasks: usize,
}

/// A building category as listed by `GET /api/categories`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiCategory {
    /// Display name, also the serialized form in building records.
    pub name: String,
}

impl From<Category> for ApiCategory {
    fn from(category: Category) -> Self {
        Self {
            name: category.to_string(),
        }
    }
}

/// Body of polygon submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolygonRequest {
    /// Ring as `[lng, lat]` pairs. Closing the ring is optional.
    pub coordinates: Vec<[f64; 2]>,
}

/// Progress of one task.
///
/// `data` is only present once the task has completed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiProgress<'a> {
    /// Task id.
    pub task_id: TaskId,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Percentage, 0-100.
    pub progress: u8,
    /// Short name of the current stage.
    pub current_step: &'a str,
    /// Human-readable detail.
    pub message: &'a str,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Time of the last change.
    pub updated_at: DateTime<Utc>,
    /// Resulting buildings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a BuildingCollection>,
}

impl<'a> From<&'a TaskSnapshot> for ApiProgress<'a> {
    fn from(snapshot: &'a TaskSnapshot) -> Self {
        Self {
            task_id: snapshot.task_id,
            status: snapshot.status,
            progress: snapshot.progress,
            current_step: &snapshot.current_step,
            message: &snapshot.message,
            error: snapshot.error.as_deref(),
            created_at: snapshot.created_at,
            updated_at: snapshot.updated_at,
            data: snapshot.result.as_deref(),
        }
    }
}

/// Response to adding or editing a polygon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPolygonTask {
    /// The polygon.
    pub polygon_id: PolygonId,
    /// Its current task.
    pub task_id: TaskId,
}

/// Response to withdrawing a polygon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPolygonWithdrawn {
    /// The removed polygon.
    pub polygon_id: PolygonId,
    /// Its last task, whose result no longer counts.
    pub orphaned_task_id: TaskId,
}

/// Query parameters for `GET /api/buildings`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingsQueryParams {
    /// Global roof pitch in degrees. Clamped to `[0, 45]`.
    pub pitch: Option<f64>,
    /// Square meters of floor area per resident.
    pub occupancy: Option<f64>,
}

/// Merged buildings of the active polygons.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiBuildings {
    /// The merged, re-enriched collection.
    #[serde(flatten)]
    pub collection: BuildingCollection,
    /// Active polygons still processing.
    pub pending_polygons: usize,
    /// Active polygons whose task failed.
    pub failed_polygons: usize,
    /// Pitch the collection was enriched with.
    pub pitch_deg: f64,
    /// Occupancy factor the collection was enriched with.
    pub occupancy_m2_per_person: f64,
}

/// Body of `PUT /api/buildings/{kind}/{id}/pitch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PitchOverrideRequest {
    /// Pitch for this one building, in degrees.
    pub pitch_deg: f64,
}
