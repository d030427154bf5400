use crate::view_model::AppViewModel;
use crate::{LogBuffer, ManifestDescriptor, Selection, Task, TaskId, TaskStatus};

/// Orchestrator phase. `Starting` and `Active` both count as busy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskPhase {
    #[default]
    Idle,
    /// Start command sent, no task id yet.
    Starting,
    /// Task id tracked and no terminal status observed yet.
    Active,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppState {
    catalog: Vec<ManifestDescriptor>,
    selection: Selection,
    catalog_requests: usize,
    phase: TaskPhase,
    tracked_task_id: Option<TaskId>,
    task: Option<Task>,
    /// First terminal status seen for the tracked task, from either channel.
    terminal_status: Option<TaskStatus>,
    logs: LogBuffer,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            logs: LogBuffer::with_capacity(capacity),
            ..Self::default()
        }
    }

    pub fn view(&self) -> AppViewModel {
        AppViewModel {
            catalog: self.catalog.clone(),
            selected_paths: self.selection.paths().map(ToOwned::to_owned).collect(),
            selected_count: self.selection.len(),
            deduped_count: self.deduped_selection().len(),
            loading: self.loading(),
            busy: self.busy(),
            phase: self.phase,
            task_id: self.tracked_task_id.clone(),
            task: self.task.clone(),
            terminal_status: self.terminal_status,
            logs: self.logs.to_vec(),
        }
    }

    /// Returns whether anything visible changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn catalog(&self) -> &[ManifestDescriptor] {
        &self.catalog
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// The paths a launch would submit right now.
    pub fn deduped_selection(&self) -> Vec<String> {
        self.selection.deduped(&self.catalog)
    }

    pub fn loading(&self) -> bool {
        self.catalog_requests > 0
    }

    pub fn phase(&self) -> TaskPhase {
        self.phase
    }

    pub fn busy(&self) -> bool {
        self.phase != TaskPhase::Idle
    }

    pub fn tracked_task_id(&self) -> Option<&str> {
        self.tracked_task_id.as_deref()
    }

    pub fn task(&self) -> Option<&Task> {
        self.task.as_ref()
    }

    pub fn terminal_status(&self) -> Option<TaskStatus> {
        self.terminal_status
    }

    pub fn logs(&self) -> &LogBuffer {
        &self.logs
    }

    pub(crate) fn begin_catalog_request(&mut self) {
        self.catalog_requests += 1;
        self.dirty = true;
    }

    pub(crate) fn finish_catalog_request(&mut self) {
        self.catalog_requests = self.catalog_requests.saturating_sub(1);
        self.dirty = true;
    }

    /// Replaces the catalog wholesale and drops selections it no longer has.
    pub(crate) fn replace_catalog(&mut self, catalog: Vec<ManifestDescriptor>) {
        self.selection.retain_in(&catalog);
        self.catalog = catalog;
        self.dirty = true;
    }

    pub(crate) fn selection_mut(&mut self) -> &mut Selection {
        self.dirty = true;
        &mut self.selection
    }

    pub(crate) fn push_log(&mut self, line: impl Into<String>) {
        self.logs.append(line);
        self.dirty = true;
    }

    pub(crate) fn clear_logs(&mut self) {
        self.logs.clear();
        self.dirty = true;
    }

    /// Forgets the previous task entirely and enters `Starting`.
    pub(crate) fn begin_start(&mut self) {
        self.logs.clear();
        self.task = None;
        self.terminal_status = None;
        self.tracked_task_id = None;
        self.phase = TaskPhase::Starting;
        self.dirty = true;
    }

    pub(crate) fn start_succeeded(&mut self, task_id: TaskId) {
        self.tracked_task_id = Some(task_id);
        self.phase = TaskPhase::Active;
        self.dirty = true;
    }

    pub(crate) fn start_failed(&mut self) {
        self.phase = TaskPhase::Idle;
        self.dirty = true;
    }

    pub(crate) fn replace_task(&mut self, task: Task) {
        self.task = Some(task);
        self.dirty = true;
    }

    /// Terminal status observed for the tracked task. The first one sticks.
    pub(crate) fn settle(&mut self, status: TaskStatus) {
        if self.terminal_status.is_none() {
            self.terminal_status = Some(status);
            self.dirty = true;
        }
        if self.phase != TaskPhase::Idle {
            self.phase = TaskPhase::Idle;
            self.dirty = true;
        }
    }

    pub(crate) fn is_tracked(&self, task_id: &str) -> bool {
        self.tracked_task_id.as_deref() == Some(task_id)
    }
}
