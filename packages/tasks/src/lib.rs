#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Asynchronous polygon processing.
//!
//! Each submitted polygon becomes a [`Task`](task::Task) with its own id and
//! its own tokio task running fetch, classification and enrichment. Callers
//! poll progress by id. The [`PolygonRegistry`] tracks which task currently
//! stands for each of a caller's polygons, and [`merge`] combines their
//! completed results into one deduplicated collection.

pub mod manager;
pub mod merge;
mod pipeline;
pub mod polygons;
pub mod task;

use std::fmt;
use std::str::FromStr;

use footprints_geometry::GeometryError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use manager::TaskManager;
pub use merge::merge;
pub use polygons::{ActivePolygon, MergedBuildings, PolygonId, PolygonRegistry};
pub use task::{TaskSnapshot, TaskStatus};

/// Unique identifier of one processing task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Errors from the task layer.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The submitted polygon failed validation; no task was created.
    #[error(transparent)]
    InvalidGeometry(#[from] GeometryError),

    /// No task with this id exists (never did, or was pruned).
    #[error("Task not found: {task_id}")]
    NotFound {
        /// The unknown id.
        task_id: TaskId,
    },

    /// No active polygon with this id exists.
    #[error("Polygon not found: {polygon_id}")]
    UnknownPolygon {
        /// The unknown id.
        polygon_id: PolygonId,
    },
}
