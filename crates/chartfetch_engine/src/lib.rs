//! Chartfetch engine side: the worker boundary, its JSON-line transport, and
//! the async driver that executes core effects against it.
mod client;
mod orchestrator;
mod transport;
pub mod wire;

pub use client::{broadcast_events, EventStream, TaskEngine};
pub use orchestrator::{
    Orchestrator, OrchestratorHandle, OrchestratorSettings, DEFAULT_POLL_INTERVAL,
};
pub use transport::{JsonLineEngine, ProcessEngine};
