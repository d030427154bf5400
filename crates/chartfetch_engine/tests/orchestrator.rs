use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use chartfetch_core::{
    AppViewModel, AuthMode, EngineError, EventEnvelope, EventLevel, ManifestDescriptor,
    ManifestSource, Task, TaskId, TaskOptions, TaskRequest, TaskStatus,
};
use chartfetch_engine::{
    broadcast_events, EventStream, Orchestrator, OrchestratorHandle, OrchestratorSettings,
    TaskEngine,
};
use pretty_assertions::assert_eq;
use tokio::sync::{broadcast, Notify};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(chartfetch_logging::initialize_for_tests);
}

type Poll = Result<Option<Task>, EngineError>;

#[derive(Default)]
struct Script {
    catalog: Vec<ManifestDescriptor>,
    catalog_error: Option<EngineError>,
    refreshed: Vec<(String, Vec<ManifestDescriptor>)>,
    start_results: VecDeque<Result<TaskId, EngineError>>,
    started: Vec<TaskRequest>,
    cancelled: Vec<TaskId>,
    polls: HashMap<TaskId, VecDeque<Poll>>,
    fetched: Vec<TaskId>,
}

/// In-memory engine driven by a script; the last poll of a task repeats.
struct ScriptedEngine {
    script: Mutex<Script>,
    events: broadcast::Sender<EventEnvelope>,
    start_gate: Option<Notify>,
    fetch_delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedEngine {
    fn new(script: Script) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            script: Mutex::new(script),
            events,
            start_gate: None,
            fetch_delay: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    fn emit(&self, task_id: &str, message: &str, status: Option<TaskStatus>) {
        let _ = self.events.send(EventEnvelope {
            task_id: task_id.to_string(),
            level: EventLevel::Info,
            event: "log".to_string(),
            message: message.to_string(),
            status,
        });
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        f(&mut self.script.lock().unwrap())
    }
}

#[async_trait]
impl TaskEngine for ScriptedEngine {
    async fn list_catalog(&self) -> Result<Vec<ManifestDescriptor>, EngineError> {
        self.with_script(|script| match &script.catalog_error {
            Some(error) => Err(error.clone()),
            None => Ok(script.catalog.clone()),
        })
    }

    async fn refresh_catalog(&self, dir: &str) -> Result<(), EngineError> {
        self.with_script(|script| {
            let position = script.refreshed.iter().position(|(known, _)| known == dir);
            match position {
                Some(index) => {
                    script.catalog = script.refreshed[index].1.clone();
                    Ok(())
                }
                None => Err(EngineError::io(format!("no collections in {dir}"))),
            }
        })
    }

    async fn start_task(&self, request: &TaskRequest) -> Result<TaskId, EngineError> {
        self.with_script(|script| script.started.push(request.clone()));
        if let Some(gate) = &self.start_gate {
            gate.notified().await;
        }
        self.with_script(|script| {
            script
                .start_results
                .pop_front()
                .unwrap_or_else(|| Err(EngineError::io("no start scripted")))
        })
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), EngineError> {
        self.with_script(|script| script.cancelled.push(task_id.to_string()));
        Ok(())
    }

    async fn fetch_task_state(&self, task_id: &str) -> Result<Option<Task>, EngineError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }
        let result = self.with_script(|script| {
            script.fetched.push(task_id.to_string());
            match script.polls.get_mut(task_id) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Ok(None)),
                Some(queue) => queue.front().cloned().unwrap_or(Ok(None)),
                None => Ok(None),
            }
        });
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn subscribe(&self) -> EventStream {
        broadcast_events(self.events.subscribe())
    }
}

fn manifest(path: &str) -> ManifestDescriptor {
    ManifestDescriptor {
        id: path.to_string(),
        name: path.to_string(),
        path: path.to_string(),
        relative_path: format!("{path}.json"),
        level_count: 3,
        source: ManifestSource::Builtin,
    }
}

fn options() -> TaskOptions {
    TaskOptions {
        output_dir: "/tmp/charts".to_string(),
        session_credential: "connect-sid-0001".to_string(),
        auth_mode: AuthMode::Key,
        secret: "download-key-01".to_string(),
        ..TaskOptions::default()
    }
}

fn snapshot(task_id: &str, status: TaskStatus, processed: usize) -> Poll {
    Ok(Some(Task {
        status,
        processed_ids: processed,
        total_ids: 10,
        ..Task::new(task_id)
    }))
}

fn script_with_catalog(paths: &[&str]) -> Script {
    Script {
        catalog: paths.iter().map(|path| manifest(path)).collect(),
        ..Script::default()
    }
}

fn spawn(engine: Arc<ScriptedEngine>) -> OrchestratorHandle {
    Orchestrator::spawn(engine, OrchestratorSettings::default())
}

async fn ready(engine: Arc<ScriptedEngine>) -> OrchestratorHandle {
    let handle = spawn(engine);
    handle.load_catalog().await.unwrap();
    handle.toggle("a").await.unwrap();
    handle
}

async fn wait_until(
    handle: &OrchestratorHandle,
    check: impl FnMut(&AppViewModel) -> bool,
) -> AppViewModel {
    let mut views = handle.subscribe_view();
    let view = views.wait_for(check).await.unwrap().clone();
    view
}

#[tokio::test(start_paused = true)]
async fn launch_then_polls_drive_task_to_completion() {
    init_logging();
    let mut script = script_with_catalog(&["a", "b"]);
    script.start_results.push_back(Ok("t1".to_string()));
    script.polls.insert(
        "t1".to_string(),
        VecDeque::from([
            snapshot("t1", TaskStatus::Running, 3),
            snapshot("t1", TaskStatus::Completed, 10),
        ]),
    );
    let engine = Arc::new(ScriptedEngine::new(script));
    let handle = ready(engine.clone()).await;

    handle.launch(options()).await.unwrap();
    let view = handle.view();
    assert!(view.busy);
    assert_eq!(view.task_id.as_deref(), Some("t1"));
    assert_eq!(view.logs, vec!["task started: t1".to_string()]);

    let running = wait_until(&handle, |view| view.task.is_some()).await;
    assert!(running.busy);
    assert_eq!(running.task.map(|task| task.processed_ids), Some(3));

    let done = wait_until(&handle, |view| !view.busy).await;
    assert_eq!(done.task.map(|task| task.processed_ids), Some(10));

    let started = engine.with_script(|script| script.started.clone());
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].manifest_paths, vec!["a".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn launch_while_starting_does_not_start_twice() {
    init_logging();
    let mut script = script_with_catalog(&["a"]);
    script.start_results.push_back(Ok("t1".to_string()));
    let mut engine = ScriptedEngine::new(script);
    engine.start_gate = Some(Notify::new());
    let engine = Arc::new(engine);
    let handle = ready(engine.clone()).await;

    let first = tokio::spawn({
        let handle = handle.clone();
        async move { handle.launch(options()).await }
    });
    wait_until(&handle, |view| view.busy).await;

    // Silently ignored while the first start is in flight.
    handle.launch(options()).await.unwrap();
    if let Some(gate) = &engine.start_gate {
        gate.notify_one();
    }
    first.await.unwrap().unwrap();
    handle.launch(options()).await.unwrap();

    assert_eq!(engine.with_script(|script| script.started.len()), 1);
    assert_eq!(handle.view().task_id.as_deref(), Some("t1"));
}

#[tokio::test(start_paused = true)]
async fn start_failure_is_returned_and_clears_busy() {
    init_logging();
    let mut script = script_with_catalog(&["a"]);
    script
        .start_results
        .push_back(Err(EngineError::validation("selectedManifestPaths is empty")));
    let engine = Arc::new(ScriptedEngine::new(script));
    let handle = ready(engine).await;

    let err = handle.launch(options()).await.unwrap_err();

    assert_eq!(
        err,
        EngineError::Validation("selectedManifestPaths is empty".to_string())
    );
    let view = handle.view();
    assert!(!view.busy);
    assert_eq!(view.task_id, None);
    assert_eq!(
        view.logs,
        vec![
            "failed to start task: validation failed: selectedManifestPaths is empty".to_string()
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn launch_with_nothing_selected_never_reaches_engine() {
    init_logging();
    let engine = Arc::new(ScriptedEngine::new(script_with_catalog(&["a"])));
    let handle = spawn(engine.clone());
    handle.load_catalog().await.unwrap();

    let err = handle.launch(options()).await.unwrap_err();

    assert!(matches!(err, EngineError::Validation(_)));
    assert!(engine.with_script(|script| script.started.is_empty()));
    assert!(!handle.view().busy);
}

#[tokio::test(start_paused = true)]
async fn events_for_other_tasks_are_dropped() {
    init_logging();
    let mut script = script_with_catalog(&["a"]);
    script.start_results.push_back(Ok("t1".to_string()));
    let engine = Arc::new(ScriptedEngine::new(script));
    let handle = ready(engine.clone()).await;
    handle.launch(options()).await.unwrap();

    engine.emit("t0", "stale line", Some(TaskStatus::Completed));
    engine.emit("t1", "[ok] 42 -> 42.adx", Some(TaskStatus::Running));

    let view = wait_until(&handle, |view| view.logs.len() == 2).await;
    assert_eq!(
        view.logs,
        vec!["task started: t1".to_string(), "[ok] 42 -> 42.adx".to_string()]
    );
    assert!(view.busy);
    // Events never touch the counted fields.
    assert!(view.task.is_none());
}

#[tokio::test(start_paused = true)]
async fn cancel_is_advisory_and_engine_terminal_event_settles() {
    init_logging();
    let mut script = script_with_catalog(&["a"]);
    script.start_results.push_back(Ok("t1".to_string()));
    let engine = Arc::new(ScriptedEngine::new(script));
    let handle = ready(engine.clone()).await;
    handle.launch(options()).await.unwrap();

    handle.cancel().await.unwrap();
    handle.cancel().await.unwrap();

    let view = handle.view();
    assert!(view.busy);
    assert_eq!(
        engine.with_script(|script| script.cancelled.clone()),
        vec!["t1".to_string(), "t1".to_string()]
    );
    assert_eq!(view.logs.last().map(String::as_str), Some("cancel requested: t1"));

    engine.emit("t1", "task cancelled", Some(TaskStatus::Cancelled));
    let view = wait_until(&handle, |view| !view.busy).await;
    assert_eq!(view.logs.last().map(String::as_str), Some("task cancelled"));
}

#[tokio::test(start_paused = true)]
async fn cancel_without_task_is_silent_noop() {
    init_logging();
    let engine = Arc::new(ScriptedEngine::new(Script::default()));
    let handle = spawn(engine.clone());

    handle.cancel().await.unwrap();

    assert!(engine.with_script(|script| script.cancelled.is_empty()));
    assert!(handle.view().logs.is_empty());
}

#[tokio::test(start_paused = true)]
async fn failed_poll_does_not_stop_polling() {
    init_logging();
    let mut script = script_with_catalog(&["a"]);
    script.start_results.push_back(Ok("t1".to_string()));
    script.polls.insert(
        "t1".to_string(),
        VecDeque::from([
            Err(EngineError::io("worker busy")),
            Ok(None),
            snapshot("t1", TaskStatus::Failed, 2),
        ]),
    );
    let engine = Arc::new(ScriptedEngine::new(script));
    let handle = ready(engine).await;
    handle.launch(options()).await.unwrap();

    let view = wait_until(&handle, |view| !view.busy).await;

    assert_eq!(view.task.map(|task| task.status), Some(TaskStatus::Failed));
    assert!(view
        .logs
        .contains(&"failed to poll task state: engine call failed: worker busy".to_string()));
}

#[tokio::test(start_paused = true)]
async fn slow_fetches_never_overlap() {
    init_logging();
    let mut script = script_with_catalog(&["a"]);
    script.start_results.push_back(Ok("t1".to_string()));
    script
        .polls
        .insert("t1".to_string(), VecDeque::from([snapshot("t1", TaskStatus::Running, 1)]));
    let mut engine = ScriptedEngine::new(script);
    engine.fetch_delay = Duration::from_secs(3);
    let engine = Arc::new(engine);
    let handle = ready(engine.clone()).await;
    handle.launch(options()).await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert!(engine.with_script(|script| script.fetched.len()) >= 3);
    assert_eq!(engine.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn relaunch_moves_polling_to_the_new_task() {
    init_logging();
    let mut script = script_with_catalog(&["a"]);
    script.start_results.push_back(Ok("t1".to_string()));
    script.start_results.push_back(Ok("t2".to_string()));
    script
        .polls
        .insert("t1".to_string(), VecDeque::from([snapshot("t1", TaskStatus::Completed, 10)]));
    script
        .polls
        .insert("t2".to_string(), VecDeque::from([snapshot("t2", TaskStatus::Running, 1)]));
    let engine = Arc::new(ScriptedEngine::new(script));
    let handle = ready(engine.clone()).await;

    handle.launch(options()).await.unwrap();
    wait_until(&handle, |view| !view.busy && view.task.is_some()).await;

    handle.launch(options()).await.unwrap();
    let relaunched_at = engine.with_script(|script| script.fetched.len());
    let view = wait_until(&handle, |view| view.task.is_some()).await;
    assert_eq!(view.task.map(|task| task.task_id), Some("t2".to_string()));

    tokio::time::sleep(Duration::from_secs(5)).await;
    let fetched_after = engine.with_script(|script| script.fetched[relaunched_at..].to_vec());
    assert!(!fetched_after.is_empty());
    assert!(fetched_after.iter().all(|task_id| task_id == "t2"));
    assert!(handle.view().busy);
}

#[tokio::test(start_paused = true)]
async fn catalog_reload_reconciles_selection() {
    init_logging();
    let mut script = script_with_catalog(&["a", "b", "c"]);
    script.refreshed.push((
        "/overlay".to_string(),
        vec![manifest("b"), manifest("c")],
    ));
    let engine = Arc::new(ScriptedEngine::new(script));
    let handle = spawn(engine);
    handle.load_catalog().await.unwrap();
    handle.toggle("a").await.unwrap();
    handle.toggle("b").await.unwrap();

    handle.refresh_catalog_from_directory(" /overlay ").await.unwrap();

    let view = handle.view();
    assert!(!view.loading);
    assert_eq!(view.selected_paths, vec!["b".to_string()]);
    assert_eq!(view.deduped_count, 1);
    assert_eq!(view.catalog.len(), 2);
    assert_eq!(view.logs, vec!["catalog refreshed: /overlay".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn catalog_failures_are_returned_and_logged() {
    init_logging();
    let engine = Arc::new(ScriptedEngine::new(script_with_catalog(&["a"])));
    let handle = spawn(engine.clone());
    handle.load_catalog().await.unwrap();
    handle.select_all().await.unwrap();

    let err = handle.refresh_catalog_from_directory("  ").await.unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = handle
        .refresh_catalog_from_directory("/missing")
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::Io("no collections in /missing".to_string()));

    engine.with_script(|script| script.catalog_error = Some(EngineError::io("down")));
    let err = handle.load_catalog().await.unwrap_err();
    assert_eq!(err, EngineError::Io("down".to_string()));

    let view = handle.view();
    assert_eq!(view.catalog.len(), 1);
    assert_eq!(view.selected_paths, vec!["a".to_string()]);
    assert_eq!(view.logs.len(), 3);

    handle.clear_logs().await.unwrap();
    handle.clear_all().await.unwrap();
    let view = handle.view();
    assert!(view.logs.is_empty());
    assert_eq!(view.selected_count, 0);
}

#[tokio::test]
async fn independent_orchestrators_do_not_share_state() {
    init_logging();
    let first = spawn(Arc::new(ScriptedEngine::new(script_with_catalog(&["a"]))));
    let second = spawn(Arc::new(ScriptedEngine::new(script_with_catalog(&["x", "y"]))));

    first.load_catalog().await.unwrap();
    second.load_catalog().await.unwrap();
    first.toggle("a").await.unwrap();

    assert_eq!(first.view().catalog.len(), 1);
    assert_eq!(second.view().catalog.len(), 2);
    assert_eq!(second.view().selected_count, 0);
}
