use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chartfetch_core::{AppViewModel, TaskOptions, TaskStatus};
use chartfetch_engine::{
    Orchestrator, OrchestratorHandle, OrchestratorSettings, ProcessEngine, DEFAULT_POLL_INTERVAL,
};
use chartfetch_logging::{cf_debug, cf_info, cf_warn};
use tokio::sync::mpsc;
use tokio::time;

use crate::render;

/// Where the worker process comes from.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    pub program: String,
    pub args: Vec<String>,
}

/// Which catalog entries a run should select.
#[derive(Debug, Clone, Default)]
pub struct SelectionRequest {
    pub all: bool,
    pub paths: Vec<String>,
}

pub fn start(worker: &WorkerCommand) -> Result<OrchestratorHandle> {
    let engine = ProcessEngine::spawn(&worker.program, &worker.args)
        .with_context(|| format!("failed to start worker {:?}", worker.program))?;
    cf_info!("Worker {:?} started", worker.program);
    Ok(Orchestrator::spawn(Arc::new(engine), OrchestratorSettings::default()))
}

/// Loads the catalog, or refreshes it from `refresh_dir` when given.
pub async fn load_catalog(handle: &OrchestratorHandle, refresh_dir: Option<&str>) -> Result<()> {
    match refresh_dir {
        Some(dir) => handle
            .refresh_catalog_from_directory(dir)
            .await
            .with_context(|| format!("failed to refresh catalog from {dir:?}")),
        None => handle.load_catalog().await.context("failed to load catalog"),
    }
}

pub fn print_catalog(view: &AppViewModel) {
    if view.catalog.is_empty() {
        println!("catalog is empty");
        return;
    }
    for line in render::catalog_lines(view) {
        println!("{line}");
    }
}

pub async fn apply_selection(
    handle: &OrchestratorHandle,
    request: &SelectionRequest,
) -> Result<()> {
    if request.all {
        handle.select_all().await?;
    }
    for path in &request.paths {
        let view = handle.view();
        if !view.catalog.iter().any(|entry| &entry.path == path) {
            cf_warn!("{path:?} is not in the catalog");
            bail!("{path:?} is not in the catalog");
        }
        if !view.is_selected(path) {
            handle.toggle(path.as_str()).await?;
        }
    }
    Ok(())
}

/// Launches a task and follows it until it is no longer busy, printing log
/// lines as they arrive. Ctrl-C asks the engine to cancel.
pub async fn run_task(handle: &OrchestratorHandle, options: TaskOptions) -> Result<TaskStatus> {
    let (interrupt_tx, interrupts) = mpsc::unbounded_channel();
    let forward = tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if interrupt_tx.send(()).is_err() {
                break;
            }
        }
    });
    let result = follow_task(handle, options, interrupts, &mut io::stdout()).await;
    forward.abort();
    result
}

async fn follow_task<W: Write>(
    handle: &OrchestratorHandle,
    options: TaskOptions,
    mut interrupts: mpsc::UnboundedReceiver<()>,
    out: &mut W,
) -> Result<TaskStatus> {
    let mut views = handle.subscribe_view();
    handle.launch(options).await.context("launch rejected")?;

    let mut printed: Vec<String> = Vec::new();
    let mut cancel_requested = false;
    loop {
        let view = views.borrow_and_update().clone();
        print_new_lines(out, &mut printed, &view)?;
        if !view.busy {
            break;
        }

        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    bail!("orchestrator stopped while the task was running");
                }
            }
            Some(()) = interrupts.recv() => {
                if cancel_requested {
                    bail!("interrupted");
                }
                cancel_requested = true;
                eprintln!("cancelling, press Ctrl-C again to quit");
                if let Err(err) = handle.cancel().await {
                    eprintln!("cancel failed: {err}");
                }
            }
        }
    }

    // A terminal event may arrive before the poll that carries the final
    // counters; give the poll up to two intervals to catch up.
    let caught_up = time::timeout(
        DEFAULT_POLL_INTERVAL * 2,
        views.wait_for(|view| view.task.as_ref().is_some_and(|t| t.status.is_terminal())),
    )
    .await
    .is_ok_and(|result| result.is_ok());
    if !caught_up {
        cf_debug!("No terminal task state polled; using the reported terminal status");
    }

    let view = views.borrow_and_update().clone();
    print_new_lines(out, &mut printed, &view)?;
    finish(out, &view)
}

fn print_new_lines<W: Write>(
    out: &mut W,
    printed: &mut Vec<String>,
    view: &AppViewModel,
) -> io::Result<()> {
    for line in render::new_log_lines(printed, &view.logs) {
        writeln!(out, "{line}")?;
    }
    printed.clone_from(&view.logs);
    Ok(())
}

fn finish<W: Write>(out: &mut W, view: &AppViewModel) -> Result<TaskStatus> {
    let status = view
        .final_status()
        .context("task ended without a terminal status")?;
    match render::status_line(view) {
        Some(line) => writeln!(out, "{line}")?,
        None => writeln!(out, "[{status}] no task state reported")?,
    }
    for line in render::failure_lines(view) {
        writeln!(out, "{line}")?;
    }
    Ok(status)
}
