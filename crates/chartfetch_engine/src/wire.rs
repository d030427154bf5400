//! Newline-delimited JSON frames exchanged with the worker process.
//!
//! Requests: `{"id": 7, "command": "get_task_state", "args": {"taskId": "..."}}`.
//! Responses: `{"id": 7, "ok": <value>}` or `{"id": 7, "error": "<message>"}`.
//! Events: `{"event": "task_event", "payload": <EventEnvelope>}`.

use chartfetch_core::{AuthMode, EngineError, EventEnvelope, OutputFormat, TaskId, TaskRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub const LIST_CATALOG: &str = "list_builtin_collections";
pub const REFRESH_CATALOG: &str = "refresh_collections_from_dir";
pub const START_TASK: &str = "start_download_task";
pub const CANCEL_TASK: &str = "cancel_task";
pub const GET_TASK_STATE: &str = "get_task_state";
pub const TASK_EVENT: &str = "task_event";

/// Prefix the worker uses for argument errors.
const VALIDATION_PREFIX: &str = "validation:";

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("frame is neither a response nor an event")]
    Unrecognized,
}

/// One decoded line from the worker.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Response {
        id: u64,
        result: Result<Value, EngineError>,
    },
    Event(EventEnvelope),
    /// An event this client does not consume.
    OtherEvent(String),
}

#[derive(Serialize)]
struct RequestFrame<'a> {
    id: u64,
    command: &'a str,
    args: &'a Value,
}

#[derive(Deserialize)]
struct RawFrame {
    id: Option<u64>,
    #[serde(default)]
    ok: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Encodes a request as one line, without the trailing newline.
pub fn encode_request(id: u64, command: &str, args: &Value) -> Result<String, WireError> {
    Ok(serde_json::to_string(&RequestFrame { id, command, args })?)
}

pub fn decode_frame(line: &str) -> Result<Frame, WireError> {
    let raw: RawFrame = serde_json::from_str(line)?;
    if let Some(id) = raw.id {
        let result = match raw.error {
            Some(message) => Err(engine_error(message)),
            None => Ok(raw.ok.unwrap_or(Value::Null)),
        };
        return Ok(Frame::Response { id, result });
    }
    match raw.event {
        Some(event) if event == TASK_EVENT => {
            let payload = raw.payload.unwrap_or(Value::Null);
            Ok(Frame::Event(serde_json::from_value(payload)?))
        }
        Some(event) => Ok(Frame::OtherEvent(event)),
        None => Err(WireError::Unrecognized),
    }
}

fn engine_error(message: String) -> EngineError {
    match message.strip_prefix(VALIDATION_PREFIX) {
        Some(reason) => EngineError::Validation(reason.trim().to_string()),
        None => EngineError::Io(message),
    }
}

/// `args` of the start command, in the worker's field names.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTaskInput<'a> {
    pub selected_manifest_paths: &'a [String],
    pub output_dir: &'a str,
    pub connect_sid: &'a str,
    pub auth_mode: AuthMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha: Option<&'a str>,
    pub download_no_bga: bool,
    pub output_format: OutputFormat,
    pub auto_bundle: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_output_path: Option<&'a str>,
    pub retries: u32,
    pub request_interval_ms: u64,
}

impl<'a> From<&'a TaskRequest> for StartTaskInput<'a> {
    fn from(request: &'a TaskRequest) -> Self {
        let options = &request.options;
        let secret = Some(options.secret.as_str());
        Self {
            selected_manifest_paths: &request.manifest_paths,
            output_dir: &options.output_dir,
            connect_sid: &options.session_credential,
            auth_mode: options.auth_mode,
            key: secret.filter(|_| options.auth_mode == AuthMode::Key),
            captcha: secret.filter(|_| options.auth_mode == AuthMode::Captcha),
            download_no_bga: options.skip_large_media,
            output_format: options.output_format,
            auto_bundle: options.auto_bundle,
            bundle_output_path: options.bundle_output_path.as_deref(),
            retries: options.retries,
            request_interval_ms: options.request_interval_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartTaskResult {
    pub task_id: TaskId,
}
