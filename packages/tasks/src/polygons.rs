//! Caller-side polygon bookkeeping.
//!
//! Each drawn polygon has a stable [`PolygonId`] and, at any time, exactly
//! one current task. Editing a polygon submits a new task and orphans the
//! old one; withdrawing it orphans its task. Only current tasks of active
//! polygons contribute to [`PolygonRegistry::merged`], so an orphaned task
//! that finishes late is simply never looked at.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use footprints_building_models::BuildingCollection;
use serde::{Deserialize, Serialize};

use crate::{TaskError, TaskId, TaskManager, merge};

/// Identifier of a polygon in a [`PolygonRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolygonId(u64);

impl fmt::Display for PolygonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PolygonId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

/// An active polygon and the task that currently stands for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivePolygon {
    pub polygon_id: PolygonId,
    pub task_id: TaskId,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    /// In submission order. Editing keeps a polygon's position.
    active: Vec<ActivePolygon>,
}

/// Result of [`PolygonRegistry::merged`].
#[derive(Debug, Clone)]
pub struct MergedBuildings {
    /// Merge of the completed results.
    pub collection: BuildingCollection,
    /// Active polygons whose task has not finished yet.
    pub pending: usize,
    /// Active polygons whose task failed or is no longer known.
    pub unavailable: usize,
}

/// Tracks a caller's polygons on top of a [`TaskManager`].
pub struct PolygonRegistry {
    manager: TaskManager,
    inner: RwLock<Inner>,
}

impl PolygonRegistry {
    #[must_use]
    pub fn new(manager: TaskManager) -> Self {
        Self {
            manager,
            inner: RwLock::new(Inner::default()),
        }
    }

    /// The underlying task manager.
    #[must_use]
    pub const fn manager(&self) -> &TaskManager {
        &self.manager
    }

    /// Registers a new polygon and starts its task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidGeometry`] if the polygon fails
    /// validation; nothing is registered then.
    pub fn add(&self, coordinates: &[[f64; 2]]) -> Result<ActivePolygon, TaskError> {
        let task_id = self.manager.submit(coordinates)?;

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.next_id += 1;
        let entry = ActivePolygon {
            polygon_id: PolygonId(inner.next_id),
            task_id,
        };
        inner.active.push(entry);
        drop(inner);

        log::debug!("Polygon {}: added with task {task_id}", entry.polygon_id);
        Ok(entry)
    }

    /// Replaces a polygon's geometry, starting a new task. The previous
    /// task is orphaned.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::UnknownPolygon`] if the polygon is not active,
    /// or [`TaskError::InvalidGeometry`] if the new geometry fails
    /// validation (the polygon then keeps its previous task).
    pub fn replace(
        &self,
        polygon_id: PolygonId,
        coordinates: &[[f64; 2]],
    ) -> Result<TaskId, TaskError> {
        if !self.contains(polygon_id) {
            return Err(TaskError::UnknownPolygon { polygon_id });
        }

        let task_id = self.manager.submit(coordinates)?;

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = inner
            .active
            .iter_mut()
            .find(|entry| entry.polygon_id == polygon_id)
        else {
            // Withdrawn while the new task was being submitted.
            return Err(TaskError::UnknownPolygon { polygon_id });
        };
        let orphaned = std::mem::replace(&mut entry.task_id, task_id);
        drop(inner);

        log::debug!("Polygon {polygon_id}: task {orphaned} replaced by {task_id}");
        Ok(task_id)
    }

    /// Removes a polygon. Returns the task that is now orphaned.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::UnknownPolygon`] if the polygon is not active.
    pub fn withdraw(&self, polygon_id: PolygonId) -> Result<TaskId, TaskError> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let index = inner
            .active
            .iter()
            .position(|entry| entry.polygon_id == polygon_id)
            .ok_or(TaskError::UnknownPolygon { polygon_id })?;
        let removed = inner.active.remove(index);
        drop(inner);

        log::debug!(
            "Polygon {polygon_id}: withdrawn, task {} orphaned",
            removed.task_id
        );
        Ok(removed.task_id)
    }

    fn contains(&self, polygon_id: PolygonId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .iter()
            .any(|entry| entry.polygon_id == polygon_id)
    }

    /// Active polygons in submission order.
    #[must_use]
    pub fn active(&self) -> Vec<ActivePolygon> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .active
            .clone()
    }

    /// Drops finished tasks older than `older_than`, except the current
    /// tasks of active polygons.
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        let keep: BTreeSet<TaskId> = self.active().iter().map(|entry| entry.task_id).collect();
        self.manager.prune_finished_except(older_than, &keep)
    }

    /// Merges the completed results of the active polygons' current tasks,
    /// in submission order.
    #[must_use]
    pub fn merged(&self) -> MergedBuildings {
        let mut results = Vec::new();
        let mut pending = 0;
        let mut unavailable = 0;

        for entry in self.active() {
            match self.manager.get_progress(entry.task_id) {
                Ok(snapshot) => match snapshot.result {
                    Some(result) => results.push(result),
                    None if snapshot.status.is_terminal() => unavailable += 1,
                    None => pending += 1,
                },
                Err(_) => unavailable += 1,
            }
        }

        MergedBuildings {
            collection: merge(results.iter().map(|result| result.as_ref())),
            pending,
            unavailable,
        }
    }
}
