//! Plain-text rendering of the published view for the terminal.

use chartfetch_core::{AppViewModel, ManifestSource};

/// Lines in `current` that have not been printed yet.
///
/// The log buffer drops its oldest lines once full and is cleared on every
/// launch, so `printed` is matched against `current` by its longest suffix
/// that `current` starts with. Without any overlap everything is new.
pub fn new_log_lines<'a>(printed: &[String], current: &'a [String]) -> &'a [String] {
    let max_overlap = printed.len().min(current.len());
    let overlap = (0..=max_overlap)
        .rev()
        .find(|&len| printed[printed.len() - len..] == current[..len])
        .unwrap_or(0);
    &current[overlap..]
}

/// One-line progress summary, or `None` before any task state arrived.
pub fn status_line(view: &AppViewModel) -> Option<String> {
    let status = view.status()?;
    let mut line = format!(
        "[{}] {}/{} processed, ok {}, skipped {}, failed {}, new files {}, bundle {}",
        status.status,
        status.processed_ids,
        status.total_ids,
        status.ok_count,
        status.skip_count,
        status.fail_count,
        status.new_files_count,
        status.bundle_output_path,
    );
    if let Some(message) = status.message.as_deref().filter(|m| !m.is_empty()) {
        line.push_str(" - ");
        line.push_str(message);
    }
    Some(line)
}

/// Failed items of the current task, one per line.
pub fn failure_lines(view: &AppViewModel) -> Vec<String> {
    view.status()
        .map(|status| {
            status
                .fail_items
                .iter()
                .map(|item| format!("  {}: {}", item.id, item.reason))
                .collect()
        })
        .unwrap_or_default()
}

/// Catalog listing with a selection marker per entry.
pub fn catalog_lines(view: &AppViewModel) -> Vec<String> {
    view.catalog
        .iter()
        .map(|entry| {
            let marker = if view.is_selected(&entry.path) { "x" } else { " " };
            let source = match entry.source {
                ManifestSource::Builtin => "builtin",
                ManifestSource::Overlay => "overlay",
            };
            format!(
                "[{marker}] {} ({} levels, {source}) {}",
                entry.name, entry.level_count, entry.path
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chartfetch_core::{FailItem, ManifestDescriptor, Task, TaskStatus};
    use pretty_assertions::assert_eq;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn appended_lines_are_new() {
        let printed = lines(&["a", "b"]);
        let current = lines(&["a", "b", "c"]);
        assert_eq!(new_log_lines(&printed, &current), &lines(&["c"])[..]);
    }

    #[test]
    fn evicted_head_is_not_reprinted() {
        let printed = lines(&["a", "b", "c"]);
        let current = lines(&["b", "c", "d", "e"]);
        assert_eq!(new_log_lines(&printed, &current), &lines(&["d", "e"])[..]);
    }

    #[test]
    fn cleared_buffer_prints_everything() {
        let printed = lines(&["a", "b"]);
        let current = lines(&["x"]);
        assert_eq!(new_log_lines(&printed, &current), &lines(&["x"])[..]);
        assert!(new_log_lines(&printed, &[]).is_empty());
    }

    #[test]
    fn status_line_shows_counters_and_default_bundle() {
        let mut task = Task::new("t1");
        task.status = TaskStatus::Running;
        task.total_ids = 10;
        task.processed_ids = 3;
        task.ok_count = 2;
        task.fail_count = 1;
        task.fail_items = vec![FailItem {
            id: "9".to_string(),
            reason: "link error".to_string(),
        }];
        let view = AppViewModel {
            task: Some(task),
            ..AppViewModel::default()
        };

        assert_eq!(
            status_line(&view).as_deref(),
            Some("[running] 3/10 processed, ok 2, skipped 0, failed 1, new files 0, bundle -")
        );
        assert_eq!(failure_lines(&view), lines(&["  9: link error"]));
        assert_eq!(status_line(&AppViewModel::default()), None);
    }

    #[test]
    fn catalog_lines_mark_selected_entries() {
        let entry = |name: &str, path: &str| ManifestDescriptor {
            id: name.to_string(),
            name: name.to_string(),
            path: path.to_string(),
            relative_path: format!("{name}.json"),
            level_count: 4,
            source: ManifestSource::Builtin,
        };
        let view = AppViewModel {
            catalog: vec![entry("A", "/c/a.json"), entry("B", "/c/b.json")],
            selected_paths: vec!["/c/b.json".to_string()],
            ..AppViewModel::default()
        };

        assert_eq!(
            catalog_lines(&view),
            lines(&[
                "[ ] A (4 levels, builtin) /c/a.json",
                "[x] B (4 levels, builtin) /c/b.json",
            ])
        );
    }
}
