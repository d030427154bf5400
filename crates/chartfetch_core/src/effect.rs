use crate::{EngineError, TaskId, TaskRequest};

/// Work the reducer asks the driver to perform.
///
/// At most one engine call (`ListCatalog`, `RefreshCatalog`, `StartTask`,
/// `CancelTask`) is produced per message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ListCatalog,
    /// Rebuild the catalog from `dir`, then list it.
    RefreshCatalog { dir: String },
    StartTask(TaskRequest),
    CancelTask { task_id: TaskId },
    /// Replace the poll loop and event subscription. `None` tears both down.
    TrackTask { task_id: Option<TaskId> },
    /// Surface a failure to whoever triggered the message.
    NotifyError(EngineError),
}
