use chartfetch_logging::{cf_debug, cf_info};

use crate::{AppState, Effect, EngineError, EventEnvelope, Msg, Task, TaskRequest, TaskPhase};

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::LoadCatalogClicked => {
            state.begin_catalog_request();
            vec![Effect::ListCatalog]
        }
        Msg::RefreshCatalogClicked { dir } => {
            let dir = dir.trim();
            if dir.is_empty() {
                let error = EngineError::validation("refresh directory is empty");
                state.push_log(format!("failed to refresh catalog: {error}"));
                return (state, vec![Effect::NotifyError(error)]);
            }
            state.begin_catalog_request();
            vec![Effect::RefreshCatalog {
                dir: dir.to_string(),
            }]
        }
        Msg::CatalogLoaded(catalog) => {
            state.finish_catalog_request();
            cf_info!("Catalog loaded with {} manifests", catalog.len());
            state.replace_catalog(catalog);
            Vec::new()
        }
        Msg::CatalogRefreshed { dir, catalog } => {
            state.finish_catalog_request();
            cf_info!("Catalog refreshed from {} with {} manifests", dir, catalog.len());
            state.replace_catalog(catalog);
            state.push_log(format!("catalog refreshed: {dir}"));
            Vec::new()
        }
        Msg::CatalogFailed(error) => {
            state.finish_catalog_request();
            state.push_log(format!("failed to load catalog: {error}"));
            vec![Effect::NotifyError(error)]
        }
        Msg::PathToggled(path) => {
            state.selection_mut().toggle(&path);
            Vec::new()
        }
        Msg::SelectAllClicked => {
            let catalog = state.catalog().to_vec();
            state.selection_mut().select_all(&catalog);
            Vec::new()
        }
        Msg::ClearAllClicked => {
            state.selection_mut().clear();
            Vec::new()
        }
        Msg::ClearLogsClicked => {
            state.clear_logs();
            Vec::new()
        }
        Msg::LaunchClicked(options) => {
            // A second launch inside the busy window is silently dropped.
            if state.busy() {
                cf_debug!("Launch ignored: a task is already {:?}", state.phase());
                return (state, Vec::new());
            }

            let manifest_paths = state.deduped_selection();
            let missing = if manifest_paths.is_empty() {
                Some("select at least one manifest")
            } else {
                options.missing_field()
            };
            if let Some(reason) = missing {
                let error = EngineError::validation(reason);
                state.push_log(format!("failed to start task: {error}"));
                return (state, vec![Effect::NotifyError(error)]);
            }

            state.begin_start();
            vec![
                Effect::TrackTask { task_id: None },
                Effect::StartTask(TaskRequest {
                    manifest_paths,
                    options,
                }),
            ]
        }
        Msg::TaskStarted { task_id } => {
            if state.phase() != TaskPhase::Starting {
                cf_debug!("Ignoring start result for {} outside the start window", task_id);
                return (state, Vec::new());
            }
            state.push_log(format!("task started: {task_id}"));
            state.start_succeeded(task_id.clone());
            vec![Effect::TrackTask {
                task_id: Some(task_id),
            }]
        }
        Msg::TaskStartFailed(error) => {
            state.start_failed();
            state.push_log(format!("failed to start task: {error}"));
            vec![Effect::NotifyError(error)]
        }
        Msg::CancelClicked => match state.tracked_task_id() {
            Some(task_id) => vec![Effect::CancelTask {
                task_id: task_id.to_string(),
            }],
            None => Vec::new(),
        },
        Msg::CancelSent { task_id } => {
            state.push_log(format!("cancel requested: {task_id}"));
            Vec::new()
        }
        Msg::CancelFailed { task_id, error } => {
            cf_debug!("Cancel of {} failed", task_id);
            state.push_log(format!("failed to cancel task: {error}"));
            vec![Effect::NotifyError(error)]
        }
        Msg::PollCompleted { task_id, task } => {
            apply_poll(&mut state, &task_id, task);
            Vec::new()
        }
        Msg::PollFailed { task_id, error } => {
            if state.is_tracked(&task_id) {
                state.push_log(format!("failed to poll task state: {error}"));
            }
            Vec::new()
        }
        Msg::EventReceived(envelope) => {
            apply_event(&mut state, envelope);
            Vec::new()
        }
        Msg::EventStreamClosed { task_id } => {
            if state.is_tracked(&task_id) {
                state.push_log("task event stream closed");
            }
            Vec::new()
        }
    };

    (state, effects)
}

fn apply_poll(state: &mut AppState, task_id: &str, task: Option<Task>) {
    if !state.is_tracked(task_id) {
        cf_debug!("Dropping stale poll result for {}", task_id);
        return;
    }
    // Not registered by the engine yet.
    let Some(task) = task else {
        return;
    };
    let status = task.status;
    state.replace_task(task);
    if status.is_terminal() {
        state.settle(status);
    }
}

fn apply_event(state: &mut AppState, envelope: EventEnvelope) {
    if !state.is_tracked(&envelope.task_id) {
        cf_debug!(
            "Dropping event {} for untracked task {}",
            envelope.event,
            envelope.task_id
        );
        return;
    }
    let terminal = envelope.status.filter(|status| status.is_terminal());
    state.push_log(envelope.message);
    if let Some(status) = terminal {
        state.settle(status);
    }
}
