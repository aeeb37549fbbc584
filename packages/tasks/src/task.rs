//! Task record and its state machine.
//!
//! `queued -> running -> {completed | failed}`. Terminal states are final:
//! every transition method on a terminal task is a no-op returning `false`.
//! Progress never decreases.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use footprints_building_models::BuildingCollection;
use footprints_geometry::ClosedRing;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::TaskId;

/// Lifecycle state of a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskStatus {
    /// Created, pipeline not started yet.
    Queued,
    /// Pipeline in progress.
    Running,
    /// Finished with a building collection.
    Completed,
    /// Finished with an error message.
    Failed,
}

impl TaskStatus {
    /// Whether no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One polygon's processing job.
#[derive(Debug, Clone)]
pub struct Task {
    id: TaskId,
    polygon: ClosedRing,
    status: TaskStatus,
    current_step: String,
    message: String,
    progress: u8,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    result: Option<Arc<BuildingCollection>>,
    error: Option<String>,
}

impl Task {
    /// Creates a queued task.
    #[must_use]
    pub fn new(id: TaskId, polygon: ClosedRing) -> Self {
        let now = Utc::now();
        Self {
            id,
            polygon,
            status: TaskStatus::Queued,
            current_step: "Queued".to_string(),
            message: "Waiting to start".to_string(),
            progress: 0,
            created_at: now,
            updated_at: now,
            result: None,
            error: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    #[must_use]
    pub const fn polygon(&self) -> &ClosedRing {
        &self.polygon
    }

    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    #[must_use]
    pub const fn progress(&self) -> u8 {
        self.progress
    }

    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// The collection, once completed.
    #[must_use]
    pub fn result(&self) -> Option<Arc<BuildingCollection>> {
        self.result.clone()
    }

    /// Moves a queued task to `running`.
    pub fn start(&mut self, step: &str, progress: u8, message: impl Into<String>) -> bool {
        if self.status != TaskStatus::Queued {
            return false;
        }
        self.status = TaskStatus::Running;
        self.set_step(step, progress, message.into());
        true
    }

    /// Records a checkpoint on a running task. Progress below the current
    /// value is ignored.
    pub fn advance(&mut self, step: &str, progress: u8, message: impl Into<String>) -> bool {
        if self.status != TaskStatus::Running {
            return false;
        }
        self.set_step(step, progress, message.into());
        true
    }

    /// Finishes the task successfully.
    pub fn complete(&mut self, collection: BuildingCollection) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let message = format!("Processed {} buildings", collection.len());
        self.status = TaskStatus::Completed;
        self.result = Some(Arc::new(collection));
        self.set_step("Completed", 100, message);
        true
    }

    /// Finishes the task with an error. Progress stays where it was.
    pub fn fail(&mut self, error: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        let error = error.into();
        self.status = TaskStatus::Failed;
        self.current_step = "Failed".to_string();
        self.message = format!("Processing failed: {error}");
        self.error = Some(error);
        self.updated_at = Utc::now();
        true
    }

    fn set_step(&mut self, step: &str, progress: u8, message: String) {
        step.clone_into(&mut self.current_step);
        self.message = message;
        self.progress = self.progress.max(progress.min(100));
        self.updated_at = Utc::now();
    }

    /// A consistent copy of the task's observable state.
    #[must_use]
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            task_id: self.id,
            status: self.status,
            current_step: self.current_step.clone(),
            message: self.message.clone(),
            progress: self.progress,
            created_at: self.created_at,
            updated_at: self.updated_at,
            error: self.error.clone(),
            result: self.result.clone(),
        }
    }
}

/// Point-in-time view of a task, as returned to pollers.
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    /// Task id.
    pub task_id: TaskId,
    /// Lifecycle state.
    pub status: TaskStatus,
    /// Short name of the current pipeline stage.
    pub current_step: String,
    /// Human-readable detail for the current stage.
    pub message: String,
    /// Percentage, 0-100.
    pub progress: u8,
    /// When the task was submitted.
    pub created_at: DateTime<Utc>,
    /// When the task last changed.
    pub updated_at: DateTime<Utc>,
    /// Failure message, when failed.
    pub error: Option<String>,
    /// Building collection, when completed.
    pub result: Option<Arc<BuildingCollection>>,
}
