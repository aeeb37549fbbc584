//! The per-task pipeline: fetch, classify, enrich.
//!
//! Runs on its own tokio task and is the only writer of its [`Task`]. The
//! task lock is taken briefly for each checkpoint and never held across an
//! `.await`. Classification and enrichment run on the blocking pool so a
//! large area does not stall the runtime thread that serves polls.

use std::any::Any;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use footprints_building_models::{BuildingCollection, BuildingRecord};
use footprints_enrich::{EnrichParams, build_record, enrich};
use footprints_source::BuildingSource;
use footprints_source_models::RawBuilding;
use tokio::task::JoinError;

use crate::task::Task;

const FETCHING: u8 = 10;
const RECEIVED: u8 = 40;
const CLASSIFYING: (u8, u8) = (50, 70);
const ENRICHING: (u8, u8) = (70, 95);

/// Number of checkpoints reported within the classifying and enriching
/// stages.
const STAGE_CHECKPOINTS: usize = 10;

/// Spawns the pipeline for `task` together with a watcher that fails the
/// task if the pipeline panics, so every task reaches a terminal state.
pub fn spawn(source: Arc<dyn BuildingSource>, params: EnrichParams, task: Arc<RwLock<Task>>) {
    let handle = tokio::spawn(run(source, params, Arc::clone(&task)));
    tokio::spawn(async move {
        if let Err(e) = handle.await {
            abort(&task, &join_failure(e));
        }
    });
}

async fn run(source: Arc<dyn BuildingSource>, params: EnrichParams, task: Arc<RwLock<Task>>) {
    let (task_id, polygon) = {
        let guard = task.read().unwrap_or_else(PoisonError::into_inner);
        (guard.id(), guard.polygon().clone())
    };

    update(&task, |t| {
        t.start(
            "Fetching",
            FETCHING,
            format!("Querying {} for buildings", source.name()),
        )
    });

    let fetched = match source.fetch(&polygon).await {
        Ok(fetched) => fetched,
        Err(e) => {
            log::error!("Task {task_id}: fetch failed: {e}");
            update(&task, |t| t.fail(e.to_string()));
            return;
        }
    };

    let total = fetched.buildings.len();
    log::info!(
        "Task {task_id}: received {total} buildings from {} ({} skipped)",
        fetched.data_source,
        fetched.skipped
    );
    update(&task, |t| {
        t.advance(
            "Received",
            RECEIVED,
            format!("Found {total} buildings"),
        )
    });

    let data_source = fetched.data_source;
    let processed = tokio::task::spawn_blocking({
        let task = Arc::clone(&task);
        let data_source = data_source.clone();
        move || process(&task, fetched.buildings, &data_source, &params)
    })
    .await;
    let records = match processed {
        Ok(records) => records,
        Err(e) => {
            abort(&task, &join_failure(e));
            return;
        }
    };

    let collection = BuildingCollection::new(records, vec![data_source], Some(Utc::now()));
    log::info!(
        "Task {task_id}: completed with {} buildings",
        collection.len()
    );
    update(&task, |t| t.complete(collection));
}

fn process(
    task: &RwLock<Task>,
    buildings: Vec<RawBuilding>,
    data_source: &str,
    params: &EnrichParams,
) -> Vec<BuildingRecord> {
    let records = staged(task, "Classifying", CLASSIFYING, buildings, |raw| {
        build_record(raw, data_source)
    });
    staged(task, "Enriching", ENRICHING, records, |record| {
        enrich(&record, params)
    })
}

fn abort(task: &RwLock<Task>, reason: &str) {
    let task_id = task.read().unwrap_or_else(PoisonError::into_inner).id();
    log::error!("Task {task_id}: {reason}");
    update(task, |t| t.fail(reason));
}

fn join_failure(e: JoinError) -> String {
    match e.try_into_panic() {
        Ok(payload) => match panic_message(payload.as_ref()) {
            Some(message) => format!("pipeline panicked: {message}"),
            None => "pipeline panicked".to_string(),
        },
        Err(_) => "pipeline was cancelled".to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> Option<&str> {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
}

/// Maps every item, reporting progress from `range.0` towards `range.1`.
fn staged<T, U>(
    task: &RwLock<Task>,
    step: &str,
    range: (u8, u8),
    items: Vec<T>,
    f: impl Fn(T) -> U,
) -> Vec<U> {
    let total = items.len();
    let every = (total / STAGE_CHECKPOINTS).max(1);
    let (start, end) = range;

    update(task, |t| {
        t.advance(step, start, format!("{step} {total} buildings"))
    });

    let mut out = Vec::with_capacity(total);
    for (i, item) in items.into_iter().enumerate() {
        out.push(f(item));
        let done = i + 1;
        if done % every == 0 && done < total {
            let progress = interpolate(start, end, done, total);
            update(task, |t| {
                t.advance(step, progress, format!("{step} {done}/{total} buildings"))
            });
        }
    }

    update(task, |t| {
        t.advance(step, end, format!("{step} {total}/{total} buildings"))
    });
    out
}

#[allow(clippy::cast_possible_truncation)]
fn interpolate(start: u8, end: u8, done: usize, total: usize) -> u8 {
    let span = usize::from(end - start);
    start + (span * done / total.max(1)).min(span) as u8
}

fn update(task: &RwLock<Task>, f: impl FnOnce(&mut Task) -> bool) {
    let mut guard = task.write().unwrap_or_else(PoisonError::into_inner);
    if !f(&mut *guard) {
        log::debug!(
            "Task {}: ignored update in state {}",
            guard.id(),
            guard.status()
        );
    }
}
