use std::collections::HashMap;
use std::ffi::OsStr;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chartfetch_core::{EngineError, EventEnvelope, ManifestDescriptor, Task, TaskId, TaskRequest};
use chartfetch_logging::{cf_debug, cf_info, cf_warn};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::client::{broadcast_events, EventStream, TaskEngine};
use crate::wire::{self, Frame, StartTaskInput, StartTaskResult};

const EVENT_BUFFER: usize = 256;

type ResponseSender = oneshot::Sender<Result<Value, EngineError>>;

#[derive(Default)]
struct PendingCalls {
    calls: HashMap<u64, ResponseSender>,
    closed: bool,
}

struct Shared {
    pending: Mutex<PendingCalls>,
    events: broadcast::Sender<EventEnvelope>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, PendingCalls> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails every outstanding call and refuses new ones.
    fn close(&self, reason: &str) {
        let drained: Vec<ResponseSender> = {
            let mut pending = self.pending();
            pending.closed = true;
            pending.calls.drain().map(|(_, tx)| tx).collect()
        };
        for tx in drained {
            let _ = tx.send(Err(EngineError::io(reason)));
        }
    }
}

/// [`TaskEngine`] speaking newline-delimited JSON over a byte stream pair.
///
/// Must be created inside a tokio runtime; it spawns one reader and one
/// writer task.
pub struct JsonLineEngine {
    shared: Arc<Shared>,
    outgoing: mpsc::UnboundedSender<String>,
    next_id: AtomicU64,
}

impl JsonLineEngine {
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let shared = Arc::new(Shared {
            pending: Mutex::new(PendingCalls::default()),
            events,
        });
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();

        tokio::spawn(write_loop(writer, outgoing_rx, shared.clone()));
        tokio::spawn(read_loop(reader, shared.clone()));

        Self {
            shared,
            outgoing,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        command: &str,
        args: Value,
    ) -> Result<T, EngineError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let line = wire::encode_request(id, command, &args)
            .map_err(|err| EngineError::io(err.to_string()))?;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.shared.pending();
            if pending.closed {
                return Err(EngineError::io("worker connection is closed"));
            }
            pending.calls.insert(id, tx);
        }

        cf_debug!("-> #{} {}", id, command);
        if self.outgoing.send(line).is_err() {
            self.shared.pending().calls.remove(&id);
            return Err(EngineError::io("worker connection is closed"));
        }

        let value = rx
            .await
            .map_err(|_| EngineError::io("worker connection is closed"))??;
        serde_json::from_value(value)
            .map_err(|err| EngineError::io(format!("malformed {command} response: {err}")))
    }
}

async fn write_loop<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<String>, shared: Arc<Shared>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(err) = result {
            cf_warn!("Writing to worker failed: {}", err);
            shared.close("failed to write to worker");
            return;
        }
    }
}

async fn read_loop<R>(reader: R, shared: Arc<Shared>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                cf_warn!("Reading from worker failed: {}", err);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match wire::decode_frame(&line) {
            Ok(Frame::Response { id, result }) => {
                let tx = shared.pending().calls.remove(&id);
                match tx {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => cf_warn!("Response for unknown request #{}", id),
                }
            }
            Ok(Frame::Event(event)) => {
                // No subscribers is fine; the event is simply dropped.
                let _ = shared.events.send(event);
            }
            Ok(Frame::OtherEvent(name)) => cf_debug!("Ignoring worker event {}", name),
            Err(err) => cf_warn!("Skipping worker line: {}", err),
        }
    }
    cf_info!("Worker connection closed");
    shared.close("worker closed the connection");
}

#[async_trait]
impl TaskEngine for JsonLineEngine {
    async fn list_catalog(&self) -> Result<Vec<ManifestDescriptor>, EngineError> {
        self.call(wire::LIST_CATALOG, json!({})).await
    }

    async fn refresh_catalog(&self, dir: &str) -> Result<(), EngineError> {
        if dir.trim().is_empty() {
            return Err(EngineError::validation("refresh directory is empty"));
        }
        let _: IgnoredAny = self
            .call(wire::REFRESH_CATALOG, json!({ "dir": dir }))
            .await?;
        Ok(())
    }

    async fn start_task(&self, request: &TaskRequest) -> Result<TaskId, EngineError> {
        let input = serde_json::to_value(StartTaskInput::from(request))
            .map_err(|err| EngineError::io(err.to_string()))?;
        let result: StartTaskResult = self
            .call(wire::START_TASK, json!({ "input": input }))
            .await?;
        Ok(result.task_id)
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), EngineError> {
        let _: IgnoredAny = self
            .call(wire::CANCEL_TASK, json!({ "taskId": task_id }))
            .await?;
        Ok(())
    }

    async fn fetch_task_state(&self, task_id: &str) -> Result<Option<Task>, EngineError> {
        self.call(wire::GET_TASK_STATE, json!({ "taskId": task_id }))
            .await
    }

    fn subscribe(&self) -> EventStream {
        broadcast_events(self.shared.events.subscribe())
    }
}

/// Worker engine running as a child process, talking over its stdin/stdout.
///
/// The child is killed when this value is dropped.
pub struct ProcessEngine {
    inner: JsonLineEngine,
    _child: Child,
}

impl ProcessEngine {
    pub fn spawn<S: AsRef<OsStr>>(program: S, args: &[String]) -> Result<Self, EngineError> {
        let program = program.as_ref();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| EngineError::io(format!("failed to spawn worker {program:?}: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::io("worker stdin is not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::io("worker stdout is not piped"))?;
        cf_info!("Spawned worker {:?} (pid {:?})", program, child.id());

        Ok(Self {
            inner: JsonLineEngine::new(stdout, stdin),
            _child: child,
        })
    }
}

#[async_trait]
impl TaskEngine for ProcessEngine {
    async fn list_catalog(&self) -> Result<Vec<ManifestDescriptor>, EngineError> {
        self.inner.list_catalog().await
    }

    async fn refresh_catalog(&self, dir: &str) -> Result<(), EngineError> {
        self.inner.refresh_catalog(dir).await
    }

    async fn start_task(&self, request: &TaskRequest) -> Result<TaskId, EngineError> {
        self.inner.start_task(request).await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<(), EngineError> {
        self.inner.cancel_task(task_id).await
    }

    async fn fetch_task_state(&self, task_id: &str) -> Result<Option<Task>, EngineError> {
        self.inner.fetch_task_state(task_id).await
    }

    fn subscribe(&self) -> EventStream {
        self.inner.subscribe()
    }
}
