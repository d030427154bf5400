use chartfetch_core::{
    EngineError, EventEnvelope, ManifestDescriptor, Task, TaskId, TaskRequest,
};
use chartfetch_logging::cf_warn;
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;

/// Push events from the engine. Dropping the stream unsubscribes.
pub type EventStream = BoxStream<'static, EventEnvelope>;

/// Command boundary of the external worker engine.
///
/// Every call may take arbitrarily long; callers impose no timeout.
#[async_trait::async_trait]
pub trait TaskEngine: Send + Sync {
    async fn list_catalog(&self) -> Result<Vec<ManifestDescriptor>, EngineError>;

    /// Rebuilds the catalog from `dir`. The next `list_catalog` reflects it.
    async fn refresh_catalog(&self, dir: &str) -> Result<(), EngineError>;

    async fn start_task(&self, request: &TaskRequest) -> Result<TaskId, EngineError>;

    async fn cancel_task(&self, task_id: &str) -> Result<(), EngineError>;

    /// `Ok(None)` when the engine does not know the task (yet).
    async fn fetch_task_state(&self, task_id: &str) -> Result<Option<Task>, EngineError>;

    /// Events emitted after this call. Delivery is best effort.
    fn subscribe(&self) -> EventStream;
}

/// Adapts a broadcast receiver into an [`EventStream`].
///
/// A lagging receiver skips the lost events and keeps going.
pub fn broadcast_events(rx: broadcast::Receiver<EventEnvelope>) -> EventStream {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    cf_warn!("Event subscriber lagged; {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
