use crate::{EngineError, EventEnvelope, ManifestDescriptor, Task, TaskId, TaskOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// User asked for the catalog to be (re)loaded.
    LoadCatalogClicked,
    /// User asked the engine to rebuild the catalog from a directory.
    RefreshCatalogClicked { dir: String },
    /// Engine returned a full catalog.
    CatalogLoaded(Vec<ManifestDescriptor>),
    /// Engine rebuilt the catalog from `dir` and returned it.
    CatalogRefreshed {
        dir: String,
        catalog: Vec<ManifestDescriptor>,
    },
    /// Catalog load or refresh failed.
    CatalogFailed(EngineError),
    /// User toggled one manifest.
    PathToggled(String),
    SelectAllClicked,
    ClearAllClicked,
    ClearLogsClicked,
    /// User launched a task over the current selection.
    LaunchClicked(TaskOptions),
    /// Engine accepted the start command.
    TaskStarted { task_id: TaskId },
    /// Engine rejected the start command.
    TaskStartFailed(EngineError),
    /// User asked to cancel the tracked task.
    CancelClicked,
    /// Engine accepted the cancel command.
    CancelSent { task_id: TaskId },
    CancelFailed { task_id: TaskId, error: EngineError },
    /// One poll of the engine's task state finished.
    PollCompleted {
        task_id: TaskId,
        task: Option<Task>,
    },
    PollFailed { task_id: TaskId, error: EngineError },
    /// Push notification from the engine.
    EventReceived(EventEnvelope),
    /// The engine's event stream ended while `task_id` was tracked.
    EventStreamClosed { task_id: TaskId },
}
