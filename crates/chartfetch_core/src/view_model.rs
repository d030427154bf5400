use crate::{FailItem, ManifestDescriptor, Task, TaskId, TaskPhase, TaskStatus};

/// Snapshot published to display collaborators after every visible change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AppViewModel {
    pub catalog: Vec<ManifestDescriptor>,
    pub selected_paths: Vec<String>,
    pub selected_count: usize,
    pub deduped_count: usize,
    pub loading: bool,
    pub busy: bool,
    pub phase: TaskPhase,
    pub task_id: Option<TaskId>,
    pub task: Option<Task>,
    /// Terminal status as soon as either channel reported one. The polled
    /// `task` may still show an earlier status until the next poll.
    pub terminal_status: Option<TaskStatus>,
    pub logs: Vec<String>,
}

/// Display summary of the current task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusView {
    pub status: TaskStatus,
    pub total_ids: usize,
    pub processed_ids: usize,
    pub ok_count: usize,
    pub skip_count: usize,
    pub fail_count: usize,
    pub new_files_count: usize,
    pub bundle_output_path: String,
    pub message: Option<String>,
    pub fail_items: Vec<FailItem>,
}

impl AppViewModel {
    pub fn status(&self) -> Option<TaskStatusView> {
        let task = self.task.as_ref()?;
        // A terminal hint from an event outranks a non-terminal snapshot.
        let status = match self.terminal_status {
            Some(terminal) if !task.status.is_terminal() => terminal,
            _ => task.status,
        };
        Some(TaskStatusView {
            status,
            total_ids: task.total_ids,
            processed_ids: task.processed_ids,
            ok_count: task.ok_count,
            skip_count: task.skip_count,
            fail_count: task.fail_count,
            new_files_count: task.new_files_count,
            bundle_output_path: task
                .bundle_output_path
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            message: task.message.clone(),
            fail_items: task.fail_items.clone(),
        })
    }

    /// Status the task ended with, once it is no longer busy.
    pub fn final_status(&self) -> Option<TaskStatus> {
        self.task
            .as_ref()
            .map(|task| task.status)
            .filter(|status| status.is_terminal())
            .or(self.terminal_status)
    }

    pub fn is_selected(&self, path: &str) -> bool {
        self.selected_paths.iter().any(|selected| selected == path)
    }
}
