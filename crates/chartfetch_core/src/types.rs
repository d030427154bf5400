use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque task identifier handed out by the engine.
pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestSource {
    Builtin,
    Overlay,
}

/// One selectable catalog entry. `path` is the stable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestDescriptor {
    pub id: String,
    pub name: String,
    pub path: String,
    pub relative_path: String,
    pub level_count: usize,
    pub source: ManifestSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Key,
    Captcha,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Key => write!(f, "key"),
            AuthMode::Captcha => write!(f, "captcha"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Adx,
    Zip,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Adx => write!(f, "adx"),
            OutputFormat::Zip => write!(f, "zip"),
        }
    }
}

/// Everything a task needs besides the manifest paths.
///
/// `secret` is the key or the captcha, depending on `auth_mode`.
#[derive(Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub output_dir: String,
    pub session_credential: String,
    pub auth_mode: AuthMode,
    pub secret: String,
    pub output_format: OutputFormat,
    pub skip_large_media: bool,
    pub auto_bundle: bool,
    pub bundle_output_path: Option<String>,
    pub retries: u32,
    pub request_interval_ms: u64,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            output_dir: String::new(),
            session_credential: String::new(),
            auth_mode: AuthMode::Key,
            secret: String::new(),
            output_format: OutputFormat::Adx,
            skip_large_media: false,
            auto_bundle: false,
            bundle_output_path: None,
            retries: 3,
            request_interval_ms: 1000,
        }
    }
}

impl TaskOptions {
    /// Checks the fields the engine cannot run without.
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.output_dir.trim().is_empty() {
            return Some("output directory is empty");
        }
        if self.session_credential.trim().is_empty() {
            return Some("session credential is empty");
        }
        if self.secret.trim().is_empty() {
            return Some(match self.auth_mode {
                AuthMode::Key => "auth mode is key but the key is empty",
                AuthMode::Captcha => "auth mode is captcha but the captcha is empty",
            });
        }
        if self.retries == 0 {
            return Some("retries must be at least 1");
        }
        None
    }
}

impl fmt::Debug for TaskOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOptions")
            .field("output_dir", &self.output_dir)
            .field("session_credential", &mask_secret(&self.session_credential))
            .field("auth_mode", &self.auth_mode)
            .field("secret", &mask_secret(&self.secret))
            .field("output_format", &self.output_format)
            .field("skip_large_media", &self.skip_large_media)
            .field("auto_bundle", &self.auto_bundle)
            .field("bundle_output_path", &self.bundle_output_path)
            .field("retries", &self.retries)
            .field("request_interval_ms", &self.request_interval_ms)
            .finish()
    }
}

/// Value handed to the engine's start operation. Built once per launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
    pub manifest_paths: Vec<String>,
    pub options: TaskOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// No further progress is expected once a task reaches one of these.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailItem {
    pub id: String,
    pub reason: String,
}

/// Authoritative record of one execution, as last reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_id: TaskId,
    pub status: TaskStatus,
    #[serde(default)]
    pub total_ids: usize,
    #[serde(default)]
    pub processed_ids: usize,
    #[serde(default)]
    pub ok_count: usize,
    #[serde(default)]
    pub skip_count: usize,
    #[serde(default)]
    pub fail_count: usize,
    #[serde(default)]
    pub new_files_count: usize,
    #[serde(default)]
    pub bundle_output_path: Option<String>,
    #[serde(default)]
    pub fail_items: Vec<FailItem>,
    #[serde(default)]
    pub logs: Vec<String>,
    #[serde(default)]
    pub started_at: Option<String>,
    #[serde(default)]
    pub ended_at: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Task {
    /// A freshly registered task with zero progress.
    pub fn new(task_id: impl Into<TaskId>) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            total_ids: 0,
            processed_ids: 0,
            ok_count: 0,
            skip_count: 0,
            fail_count: 0,
            new_files_count: 0,
            bundle_output_path: None,
            fail_items: Vec::new(),
            logs: Vec::new(),
            started_at: None,
            ended_at: None,
            message: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

/// Push notification from the engine about one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub task_id: TaskId,
    pub level: EventLevel,
    pub event: String,
    pub message: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

/// Hides the middle of a credential for log output: `abc***xyz`.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return String::new();
    }
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}***{tail}")
}
