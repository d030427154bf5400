use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chartfetch_core::{AuthMode, OutputFormat, TaskOptions};
use chartfetch_logging::cf_info;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// File name used when no profile path is given.
pub const DEFAULT_PROFILE: &str = "chartfetch.ron";

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("io error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid profile {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("failed to serialize profile: {0}")]
    Serialize(#[from] ron::Error),
}

/// Task form values as stored on disk. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunProfile {
    pub output_dir: String,
    pub connect_sid: String,
    pub auth_mode: AuthMode,
    pub key: String,
    pub captcha: String,
    pub output_format: OutputFormat,
    pub download_no_bga: bool,
    pub auto_bundle: bool,
    pub bundle_output_path: String,
    pub retries: u32,
    pub request_interval_ms: u64,
}

impl Default for RunProfile {
    fn default() -> Self {
        Self {
            output_dir: String::new(),
            connect_sid: String::new(),
            auth_mode: AuthMode::Key,
            key: String::new(),
            captcha: String::new(),
            output_format: OutputFormat::Adx,
            download_no_bga: false,
            auto_bundle: false,
            bundle_output_path: String::new(),
            retries: 3,
            request_interval_ms: 1000,
        }
    }
}

impl RunProfile {
    pub fn load(path: &Path) -> Result<Self, ProfileError> {
        let content = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        ron::from_str(&content).map_err(|source| ProfileError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Writes the profile through a temp file and a rename, so a crash never
    /// leaves a half-written profile behind. The captcha is one-shot and is
    /// not stored.
    pub fn save(&self, path: &Path) -> Result<(), ProfileError> {
        let stored = RunProfile {
            captcha: String::new(),
            ..self.clone()
        };
        let content = ron::ser::to_string_pretty(&stored, ron::ser::PrettyConfig::new())?;

        let io_err = |source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.as_file_mut().sync_all().map_err(io_err)?;
        tmp.persist(path).map_err(|err| io_err(err.error))?;

        cf_info!("Saved run profile to {:?}", path);
        Ok(())
    }

    /// Form values as task options: text trimmed, only the active secret kept,
    /// an empty bundle path meaning "engine default".
    pub fn to_options(&self) -> TaskOptions {
        let secret = match self.auth_mode {
            AuthMode::Key => &self.key,
            AuthMode::Captcha => &self.captcha,
        };
        let bundle_output_path = self.bundle_output_path.trim();
        TaskOptions {
            output_dir: self.output_dir.trim().to_string(),
            session_credential: self.connect_sid.trim().to_string(),
            auth_mode: self.auth_mode,
            secret: secret.trim().to_string(),
            output_format: self.output_format,
            skip_large_media: self.download_no_bga,
            auto_bundle: self.auto_bundle,
            bundle_output_path: (!bundle_output_path.is_empty())
                .then(|| bundle_output_path.to_string()),
            retries: self.retries,
            request_interval_ms: self.request_interval_ms,
        }
    }
}
