//! Chartfetch core: pure task orchestration state machine, selection
//! reconciliation, and view-model helpers.
mod effect;
mod error;
mod log_buffer;
mod msg;
mod selection;
mod state;
mod types;
mod update;
mod view_model;

pub use effect::Effect;
pub use error::EngineError;
pub use log_buffer::{LogBuffer, LOG_CAPACITY};
pub use msg::Msg;
pub use selection::Selection;
pub use state::{AppState, TaskPhase};
pub use types::{
    mask_secret, AuthMode, EventEnvelope, EventLevel, FailItem, ManifestDescriptor,
    ManifestSource, OutputFormat, Task, TaskId, TaskOptions, TaskRequest, TaskStatus,
};
pub use update::update;
pub use view_model::{AppViewModel, TaskStatusView};
