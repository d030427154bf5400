use std::sync::Arc;
use std::time::Duration;

use chartfetch_core::{
    update, AppState, AppViewModel, Effect, EngineError, Msg, TaskId, TaskOptions, LOG_CAPACITY,
};
use chartfetch_logging::{cf_debug, cf_info, cf_warn};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::client::{EventStream, TaskEngine};

/// Interval between two task state fetches.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(900);

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub poll_interval: Duration,
    pub log_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_capacity: LOG_CAPACITY,
        }
    }
}

type Reply = oneshot::Sender<Result<(), EngineError>>;

/// A message for the reducer, with the caller waiting on its outcome (if any).
struct Inbound {
    msg: Msg,
    reply: Option<Reply>,
}

impl Inbound {
    fn observation(msg: Msg) -> Self {
        Self { msg, reply: None }
    }
}

/// Owns the state and applies every message to it, one at a time.
///
/// Commands from handles and observations from the poll loop, the event
/// subscription and finished engine calls all arrive as messages; nothing
/// else writes the state.
pub struct Orchestrator {
    engine: Arc<dyn TaskEngine>,
    settings: OrchestratorSettings,
    state: AppState,
    commands: mpsc::UnboundedReceiver<Inbound>,
    observations: mpsc::UnboundedReceiver<Inbound>,
    observation_tx: mpsc::UnboundedSender<Inbound>,
    view_tx: watch::Sender<AppViewModel>,
    channels: Option<CancellationToken>,
}

impl Orchestrator {
    /// Spawns the driver on the current tokio runtime and returns its handle.
    ///
    /// The driver stops once every handle is dropped.
    pub fn spawn(
        engine: Arc<dyn TaskEngine>,
        settings: OrchestratorSettings,
    ) -> OrchestratorHandle {
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (observation_tx, observations) = mpsc::unbounded_channel();
        let state = AppState::with_log_capacity(settings.log_capacity);
        let (view_tx, view_rx) = watch::channel(state.view());

        let driver = Self {
            engine,
            settings,
            state,
            commands,
            observations,
            observation_tx,
            view_tx,
            channels: None,
        };
        tokio::spawn(driver.run());

        OrchestratorHandle {
            command_tx,
            view_rx,
        }
    }

    async fn run(mut self) {
        loop {
            let inbound = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
                Some(observation) = self.observations.recv() => observation,
            };
            self.dispatch(inbound);
        }
        self.stop_channels();
        cf_debug!("Orchestrator stopped");
    }

    fn dispatch(&mut self, Inbound { msg, mut reply }: Inbound) {
        let state = std::mem::take(&mut self.state);
        let (mut state, effects) = update(state, msg);
        if state.consume_dirty() {
            self.view_tx.send_replace(state.view());
        }
        self.state = state;

        for effect in effects {
            self.run_effect(effect, &mut reply);
        }
        if let Some(reply) = reply {
            let _ = reply.send(Ok(()));
        }
    }

    fn run_effect(&mut self, effect: Effect, reply: &mut Option<Reply>) {
        match effect {
            Effect::ListCatalog => {
                let engine = self.engine.clone();
                self.spawn_call(reply.take(), async move {
                    match engine.list_catalog().await {
                        Ok(catalog) => Msg::CatalogLoaded(catalog),
                        Err(error) => Msg::CatalogFailed(error),
                    }
                });
            }
            Effect::RefreshCatalog { dir } => {
                let engine = self.engine.clone();
                self.spawn_call(reply.take(), async move {
                    let refreshed = match engine.refresh_catalog(&dir).await {
                        Ok(()) => engine.list_catalog().await,
                        Err(error) => Err(error),
                    };
                    match refreshed {
                        Ok(catalog) => Msg::CatalogRefreshed { dir, catalog },
                        Err(error) => Msg::CatalogFailed(error),
                    }
                });
            }
            Effect::StartTask(request) => {
                cf_info!(
                    "Starting task over {} manifests with {:?}",
                    request.manifest_paths.len(),
                    request.options
                );
                let engine = self.engine.clone();
                self.spawn_call(reply.take(), async move {
                    match engine.start_task(&request).await {
                        Ok(task_id) => Msg::TaskStarted { task_id },
                        Err(error) => Msg::TaskStartFailed(error),
                    }
                });
            }
            Effect::CancelTask { task_id } => {
                let engine = self.engine.clone();
                self.spawn_call(reply.take(), async move {
                    match engine.cancel_task(&task_id).await {
                        Ok(()) => Msg::CancelSent { task_id },
                        Err(error) => Msg::CancelFailed { task_id, error },
                    }
                });
            }
            Effect::TrackTask { task_id } => self.track(task_id),
            Effect::NotifyError(error) => {
                cf_warn!("{}", error);
                if let Some(reply) = reply.take() {
                    let _ = reply.send(Err(error));
                }
            }
        }
    }

    /// Runs one engine call off the driver and feeds its outcome back in.
    ///
    /// The caller's reply travels with the outcome so it resolves only after
    /// the outcome has been applied.
    fn spawn_call<F>(&self, reply: Option<Reply>, call: F)
    where
        F: std::future::Future<Output = Msg> + Send + 'static,
    {
        let tx = self.observation_tx.clone();
        tokio::spawn(async move {
            let msg = call.await;
            let _ = tx.send(Inbound { msg, reply });
        });
    }

    fn track(&mut self, task_id: Option<TaskId>) {
        self.stop_channels();
        let Some(task_id) = task_id else {
            return;
        };

        cf_info!("Tracking task {}", task_id);
        let token = CancellationToken::new();
        // Subscribe before returning so no event after the start reply is missed.
        let events = self.engine.subscribe();
        tokio::spawn(event_loop(
            events,
            task_id.clone(),
            self.observation_tx.clone(),
            token.clone(),
        ));
        tokio::spawn(poll_loop(
            self.engine.clone(),
            task_id,
            self.settings.poll_interval,
            self.observation_tx.clone(),
            token.clone(),
        ));
        self.channels = Some(token);
    }

    fn stop_channels(&mut self) {
        if let Some(token) = self.channels.take() {
            token.cancel();
        }
    }
}

/// Fetches the task state every `period`. A fetch is never issued while the
/// previous one is still outstanding.
async fn poll_loop(
    engine: Arc<dyn TaskEngine>,
    task_id: TaskId,
    period: Duration,
    tx: mpsc::UnboundedSender<Inbound>,
    token: CancellationToken,
) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            result = engine.fetch_task_state(&task_id) => result,
        };
        let msg = match result {
            Ok(task) => Msg::PollCompleted {
                task_id: task_id.clone(),
                task,
            },
            Err(error) => {
                cf_warn!("Polling task {} failed: {}", task_id, error);
                Msg::PollFailed {
                    task_id: task_id.clone(),
                    error,
                }
            }
        };
        if tx.send(Inbound::observation(msg)).is_err() {
            break;
        }
    }
    cf_debug!("Poll loop for {} stopped", task_id);
}

async fn event_loop(
    mut events: EventStream,
    task_id: TaskId,
    tx: mpsc::UnboundedSender<Inbound>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.next() => event,
        };
        let msg = match event {
            Some(envelope) => Msg::EventReceived(envelope),
            None => {
                let _ = tx.send(Inbound::observation(Msg::EventStreamClosed {
                    task_id: task_id.clone(),
                }));
                break;
            }
        };
        if tx.send(Inbound::observation(msg)).is_err() {
            break;
        }
    }
    cf_debug!("Event subscription for {} stopped", task_id);
}

/// Cloneable entry point for display collaborators.
#[derive(Clone)]
pub struct OrchestratorHandle {
    command_tx: mpsc::UnboundedSender<Inbound>,
    view_rx: watch::Receiver<AppViewModel>,
}

impl OrchestratorHandle {
    /// Launches a task over the current deduplicated selection.
    ///
    /// Returns `Ok(())` without doing anything while a task is busy.
    pub async fn launch(&self, options: TaskOptions) -> Result<(), EngineError> {
        self.request(Msg::LaunchClicked(options)).await
    }

    /// Asks the engine to cancel the tracked task. No-op without one.
    pub async fn cancel(&self) -> Result<(), EngineError> {
        self.request(Msg::CancelClicked).await
    }

    pub async fn load_catalog(&self) -> Result<(), EngineError> {
        self.request(Msg::LoadCatalogClicked).await
    }

    pub async fn refresh_catalog_from_directory(
        &self,
        dir: impl Into<String>,
    ) -> Result<(), EngineError> {
        self.request(Msg::RefreshCatalogClicked { dir: dir.into() })
            .await
    }

    pub async fn toggle(&self, path: impl Into<String>) -> Result<(), EngineError> {
        self.request(Msg::PathToggled(path.into())).await
    }

    pub async fn select_all(&self) -> Result<(), EngineError> {
        self.request(Msg::SelectAllClicked).await
    }

    pub async fn clear_all(&self) -> Result<(), EngineError> {
        self.request(Msg::ClearAllClicked).await
    }

    pub async fn clear_logs(&self) -> Result<(), EngineError> {
        self.request(Msg::ClearLogsClicked).await
    }

    /// Latest published view.
    pub fn view(&self) -> AppViewModel {
        self.view_rx.borrow().clone()
    }

    /// Receiver notified after every visible state change.
    pub fn subscribe_view(&self) -> watch::Receiver<AppViewModel> {
        self.view_rx.clone()
    }

    async fn request(&self, msg: Msg) -> Result<(), EngineError> {
        let (reply, outcome) = oneshot::channel();
        self.command_tx
            .send(Inbound {
                msg,
                reply: Some(reply),
            })
            .map_err(|_| EngineError::Closed)?;
        outcome.await.map_err(|_| EngineError::Closed)?
    }
}
