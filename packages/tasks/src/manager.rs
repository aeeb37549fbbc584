//! Task registry and submission.
//!
//! The manager owns the map from [`TaskId`] to task. Submission validates
//! the polygon synchronously, inserts a queued task and spawns its pipeline;
//! it never waits for the pipeline. Polls take a read lock on the map and
//! then on the one task, copy a snapshot and return.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use footprints_building_models::BuildingCollection;
use footprints_enrich::EnrichParams;
use footprints_geometry::normalize_ring;
use footprints_source::BuildingSource;

use crate::task::{Task, TaskSnapshot};
use crate::{TaskError, TaskId, pipeline};

type TaskMap = BTreeMap<TaskId, Arc<RwLock<Task>>>;

/// Creates tasks and answers progress queries. Cheap to clone; clones share
/// the same task map.
#[derive(Clone)]
pub struct TaskManager {
    source: Arc<dyn BuildingSource>,
    params: EnrichParams,
    tasks: Arc<RwLock<TaskMap>>,
}

impl TaskManager {
    /// Creates a manager fetching from `source` and enriching with `params`.
    #[must_use]
    pub fn new(source: Arc<dyn BuildingSource>, params: EnrichParams) -> Self {
        Self {
            source,
            params,
            tasks: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Parameters the pipeline enriches with.
    #[must_use]
    pub const fn params(&self) -> &EnrichParams {
        &self.params
    }

    /// Validates a polygon and starts processing it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::InvalidGeometry`] if the polygon fails
    /// validation. No task is created in that case.
    pub fn submit(&self, coordinates: &[[f64; 2]]) -> Result<TaskId, TaskError> {
        let polygon = normalize_ring(coordinates)?;
        let task_id = TaskId::new();
        let task = Arc::new(RwLock::new(Task::new(task_id, polygon)));

        self.tasks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task_id, Arc::clone(&task));

        log::info!(
            "Task {task_id}: submitted polygon with {} points",
            coordinates.len()
        );
        pipeline::spawn(Arc::clone(&self.source), self.params, task);

        Ok(task_id)
    }

    fn task(&self, task_id: TaskId) -> Result<Arc<RwLock<Task>>, TaskError> {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&task_id)
            .cloned()
            .ok_or(TaskError::NotFound { task_id })
    }

    /// Returns the latest state of a task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] for an unknown id.
    pub fn get_progress(&self, task_id: TaskId) -> Result<TaskSnapshot, TaskError> {
        let task = self.task(task_id)?;
        let snapshot = task
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();
        Ok(snapshot)
    }

    /// Returns the collection of a completed task, or `None` while it is
    /// queued, running or failed.
    ///
    /// # Errors
    ///
    /// Returns [`TaskError::NotFound`] for an unknown id.
    pub fn result(&self, task_id: TaskId) -> Result<Option<Arc<BuildingCollection>>, TaskError> {
        let task = self.task(task_id)?;
        let result = task.read().unwrap_or_else(PoisonError::into_inner).result();
        Ok(result)
    }

    /// Number of tasks currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops completed and failed tasks that have not changed for longer
    /// than `older_than`. Returns how many were removed.
    pub fn prune_finished(&self, older_than: Duration) -> usize {
        self.prune_finished_except(older_than, &BTreeSet::new())
    }

    /// Like [`Self::prune_finished`], but never removes the tasks in `keep`.
    pub fn prune_finished_except(&self, older_than: Duration, keep: &BTreeSet<TaskId>) -> usize {
        let Some(cutoff) = TimeDelta::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
        let before = tasks.len();
        tasks.retain(|task_id, task| {
            if keep.contains(task_id) {
                return true;
            }
            let task = task.read().unwrap_or_else(PoisonError::into_inner);
            !(task.status().is_terminal() && task.updated_at() < cutoff)
        });
        let removed = before - tasks.len();
        drop(tasks);

        if removed > 0 {
            log::info!("Pruned {removed} finished tasks");
        }
        removed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use footprints_building_models::{OSM_DATA_SOURCE, OsmId};
    use footprints_geometry::ClosedRing;
    use footprints_source::SourceError;
    use footprints_source_models::{FetchedBuildings, RawBuilding};
    use tokio::sync::Notify;

    use super::*;
    use crate::task::TaskStatus;

    pub const SQUARE: [[f64; 2]; 4] = [[12.49, 41.89], [12.50, 41.89], [12.50, 41.90], [12.49, 41.90]];

    pub fn raw(id: i64, tag: &str, area: f64, floors: Option<u32>) -> RawBuilding {
        let mut tags = BTreeMap::new();
        tags.insert("building".to_string(), tag.to_string());
        RawBuilding {
            osm_id: OsmId::way(id),
            geometry: geojson::Geometry::new(geojson::Value::Point(vec![12.495, 41.895])),
            footprint_area_m2: Some(area),
            building_type: Some(tag.to_string()),
            name: None,
            floors,
            height_m: None,
            roof_shape: None,
            source_pitch_deg: None,
            construction_year: None,
            tags,
        }
    }

    /// In-memory source. Optionally waits on a gate before answering.
    pub struct StaticSource {
        pub buildings: Vec<RawBuilding>,
        pub fail: bool,
        pub gate: Option<Arc<Notify>>,
    }

    impl StaticSource {
        pub fn ok(buildings: Vec<RawBuilding>) -> Self {
            Self {
                buildings,
                fail: false,
                gate: None,
            }
        }
    }

    #[async_trait]
    impl BuildingSource for StaticSource {
        fn name(&self) -> &str {
            OSM_DATA_SOURCE
        }

        async fn fetch(&self, _boundary: &ClosedRing) -> Result<FetchedBuildings, SourceError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(SourceError::Exhausted {
                    attempted: 2,
                    message: "all endpoints timed out".to_string(),
                });
            }
            Ok(FetchedBuildings {
                buildings: self.buildings.clone(),
                data_source: OSM_DATA_SOURCE.to_string(),
                skipped: 0,
            })
        }
    }

    pub async fn wait_terminal(manager: &TaskManager, task_id: TaskId) -> TaskSnapshot {
        for _ in 0..500 {
            let snapshot = manager.get_progress(task_id).unwrap();
            if snapshot.status.is_terminal() {
                return snapshot;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {task_id} did not finish");
    }

    #[tokio::test]
    async fn submit_runs_pipeline_to_completion() {
        let source = StaticSource::ok(vec![
            raw(1, "apartments", 750.0, Some(6)),
            raw(2, "hospital", 3000.0, Some(4)),
        ]);
        let manager = TaskManager::new(Arc::new(source), EnrichParams::default());

        let task_id = manager.submit(&SQUARE).unwrap();
        let snapshot = wait_terminal(&manager, task_id).await;

        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert_eq!(snapshot.progress, 100);
        let collection = snapshot.result.unwrap();
        assert_eq!(collection.len(), 2);
        assert_eq!(collection.buildings[0].estimated_population, Some(110));
        assert_eq!(collection.metadata.data_sources, vec!["osm".to_string()]);
        assert!(collection.metadata.generated_at.is_some());

        let result = manager.result(task_id).unwrap().unwrap();
        assert_eq!(result.len(), 2);
    }

    #[tokio::test]
    async fn empty_fetch_completes_with_empty_collection() {
        let manager = TaskManager::new(Arc::new(StaticSource::ok(Vec::new())), EnrichParams::default());
        let task_id = manager.submit(&SQUARE).unwrap();
        let snapshot = wait_terminal(&manager, task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
        assert!(snapshot.result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_error_fails_task_with_message() {
        let source = StaticSource {
            buildings: Vec::new(),
            fail: true,
            gate: None,
        };
        let manager = TaskManager::new(Arc::new(source), EnrichParams::default());
        let task_id = manager.submit(&SQUARE).unwrap();
        let snapshot = wait_terminal(&manager, task_id).await;

        assert_eq!(snapshot.status, TaskStatus::Failed);
        assert!(snapshot.error.unwrap().contains("all endpoints timed out"));
        assert!(snapshot.result.is_none());
        assert!(manager.result(task_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_polygon_creates_no_task() {
        let manager = TaskManager::new(Arc::new(StaticSource::ok(Vec::new())), EnrichParams::default());
        let err = manager
            .submit(&[[12.49, 41.89], [12.50, 41.89], [12.49, 41.89]])
            .unwrap_err();
        assert!(matches!(err, TaskError::InvalidGeometry(_)));
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn unknown_task_is_not_found() {
        let manager = TaskManager::new(Arc::new(StaticSource::ok(Vec::new())), EnrichParams::default());
        let missing = TaskId::new();
        assert!(matches!(
            manager.get_progress(missing),
            Err(TaskError::NotFound { task_id }) if task_id == missing
        ));
        assert!(manager.result(missing).is_err());
    }

    #[tokio::test]
    async fn polling_does_not_wait_for_slow_fetch() {
        let gate = Arc::new(Notify::new());
        let source = StaticSource {
            buildings: vec![raw(1, "house", 120.0, Some(2))],
            fail: false,
            gate: Some(Arc::clone(&gate)),
        };
        let manager = TaskManager::new(Arc::new(source), EnrichParams::default());
        let task_id = manager.submit(&SQUARE).unwrap();

        let snapshot = manager.get_progress(task_id).unwrap();
        assert!(!snapshot.status.is_terminal());
        assert!(snapshot.progress <= 10);

        gate.notify_one();
        let snapshot = wait_terminal(&manager, task_id).await;
        assert_eq!(snapshot.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn resubmission_gets_new_id() {
        let manager = TaskManager::new(Arc::new(StaticSource::ok(Vec::new())), EnrichParams::default());
        let first = manager.submit(&SQUARE).unwrap();
        let second = manager.submit(&SQUARE).unwrap();
        assert_ne!(first, second);
        assert_eq!(manager.len(), 2);
    }

    struct PanickingSource;

    #[async_trait]
    impl BuildingSource for PanickingSource {
        fn name(&self) -> &str {
            OSM_DATA_SOURCE
        }

        async fn fetch(&self, _boundary: &ClosedRing) -> Result<FetchedBuildings, SourceError> {
            panic!("malformed upstream payload");
        }
    }

    #[tokio::test]
    async fn panicking_pipeline_fails_task() {
        let manager = TaskManager::new(Arc::new(PanickingSource), EnrichParams::default());
        let task_id = manager.submit(&SQUARE).unwrap();
        let snapshot = wait_terminal(&manager, task_id).await;

        assert_eq!(snapshot.status, TaskStatus::Failed);
        let error = snapshot.error.unwrap();
        assert!(error.contains("panicked"), "error was {error}");
        assert!(error.contains("malformed upstream payload"), "error was {error}");

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(manager.prune_finished(Duration::ZERO), 1);
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn prune_removes_only_finished_tasks() {
        let gate = Arc::new(Notify::new());
        let slow = TaskManager::new(
            Arc::new(StaticSource {
                buildings: Vec::new(),
                fail: false,
                gate: Some(Arc::clone(&gate)),
            }),
            EnrichParams::default(),
        );
        let pending = slow.submit(&SQUARE).unwrap();

        let done = TaskManager {
            source: Arc::new(StaticSource::ok(Vec::new())),
            ..slow.clone()
        };
        let finished = done.submit(&SQUARE).unwrap();
        wait_terminal(&done, finished).await;
        tokio::time::sleep(Duration::from_millis(2)).await;

        assert_eq!(slow.prune_finished(Duration::from_secs(3600)), 0);
        assert_eq!(slow.prune_finished(Duration::ZERO), 1);
        assert!(slow.get_progress(finished).is_err());
        assert!(slow.get_progress(pending).is_ok());

        gate.notify_one();
    }
}
