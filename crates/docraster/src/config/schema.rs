use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::StorageError;

/// Lowest accepted rendering resolution.
pub const MIN_DPI: u32 = 72;
/// Highest accepted rendering resolution.
pub const MAX_DPI: u32 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Defaults to `<data_dir>/uploads`.
    #[serde(default)]
    pub upload_dir: Option<PathBuf>,
    /// Defaults to `<data_dir>/results`.
    #[serde(default)]
    pub result_dir: Option<PathBuf>,
    #[serde(default = "default_libreoffice_path")]
    pub libreoffice_path: String,
    /// Directory holding poppler's `pdftoppm`; `PATH` lookup when unset.
    #[serde(default)]
    pub poppler_path: Option<PathBuf>,
    #[serde(default = "default_convert_timeout")]
    pub convert_timeout_seconds: u64,
    /// Pause after each task before a worker claims the next one.
    #[serde(default = "default_worker_pause")]
    pub worker_pause_ms: u64,
    #[serde(default = "default_worker_threads")]
    pub max_worker_threads: usize,
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
    #[serde(default = "default_cleanup_hours")]
    pub cleanup_hours: u32,
    #[serde(default = "default_dpi")]
    pub default_dpi: u32,
    #[serde(default = "default_threshold")]
    pub background_color_threshold: u8,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_libreoffice_path() -> String {
    "soffice".to_string()
}

fn default_convert_timeout() -> u64 {
    300
}

fn default_worker_pause() -> u64 {
    2000
}

fn default_worker_threads() -> usize {
    2
}

fn default_shutdown_timeout() -> u64 {
    2000
}

fn default_cleanup_hours() -> u32 {
    24
}

fn default_dpi() -> u32 {
    144
}

fn default_threshold() -> u8 {
    235
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            upload_dir: None,
            result_dir: None,
            libreoffice_path: default_libreoffice_path(),
            poppler_path: None,
            convert_timeout_seconds: default_convert_timeout(),
            worker_pause_ms: default_worker_pause(),
            max_worker_threads: default_worker_threads(),
            shutdown_timeout_ms: default_shutdown_timeout(),
            cleanup_hours: default_cleanup_hours(),
            default_dpi: default_dpi(),
            background_color_threshold: default_threshold(),
            auth: AuthConfig::default(),
        }
    }
}

impl Settings {
    /// Settings rooted at `data_dir`, everything else default.
    pub fn with_data_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.upload_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("uploads"))
    }

    pub fn result_dir(&self) -> PathBuf {
        self.result_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("results"))
    }

    pub fn pdftoppm_path(&self) -> PathBuf {
        match &self.poppler_path {
            Some(dir) => dir.join("pdftoppm"),
            None => PathBuf::from("pdftoppm"),
        }
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_seconds)
    }

    pub fn worker_pause(&self) -> Duration {
        Duration::from_millis(self.worker_pause_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.cleanup_hours))
    }

    /// Creates the data, upload and result directories.
    pub fn ensure_directories(&self) -> Result<(), StorageError> {
        for dir in [self.data_dir.clone(), self.upload_dir(), self.result_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| StorageError::CreateDirectory {
                path: dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_base_url")]
    pub base_url: String,
    #[serde(default = "default_auth_timeout")]
    pub timeout_seconds: u64,
    /// Static bearer tokens accepted without contacting the provider.
    #[serde(default)]
    pub dev_tokens: HashMap<String, DevToken>,
}

fn default_auth_base_url() -> String {
    "http://localhost:1337".to_string()
}

fn default_auth_timeout() -> u64 {
    5
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            base_url: default_auth_base_url(),
            timeout_seconds: default_auth_timeout(),
            dev_tokens: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevToken {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}
