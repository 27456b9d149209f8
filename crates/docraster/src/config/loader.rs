use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::{Settings, MAX_DPI, MIN_DPI};
use crate::error::ConfigError;

const ENV_PREFIX: &str = "DOCRASTER_";

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(content)?;

    validate_settings(&settings)?;

    Ok(settings)
}

/// `<config dir>/docraster/settings.json` for the current user, if a config
/// directory exists on this platform.
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("docraster").join("settings.json"))
}

pub fn validate_settings(settings: &Settings) -> Result<(), ConfigError> {
    if settings.max_worker_threads == 0 {
        return Err(ConfigError::Validation {
            message: "max_worker_threads must be at least 1".to_string(),
        });
    }

    if !(MIN_DPI..=MAX_DPI).contains(&settings.default_dpi) {
        return Err(ConfigError::Validation {
            message: format!(
                "default_dpi must be between {} and {}, got {}",
                MIN_DPI, MAX_DPI, settings.default_dpi
            ),
        });
    }

    if settings.convert_timeout_seconds == 0 {
        return Err(ConfigError::Validation {
            message: "convert_timeout_seconds must be at least 1".to_string(),
        });
    }

    if settings.cleanup_hours == 0 {
        return Err(ConfigError::Validation {
            message: "cleanup_hours must be at least 1".to_string(),
        });
    }

    if settings.libreoffice_path.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "libreoffice_path must not be empty".to_string(),
        });
    }

    Ok(())
}

/// Applies `DOCRASTER_*` process environment variables on top of `settings`.
pub fn apply_env_overrides(settings: &mut Settings) -> Result<(), ConfigError> {
    apply_overrides_with(settings, |key| std::env::var(key).ok())
}

/// Applies overrides from an arbitrary lookup, then re-validates.
pub fn apply_overrides_with<F>(settings: &mut Settings, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    if let Some(v) = get("DATA_DIR") {
        settings.data_dir = PathBuf::from(v);
    }
    if let Some(v) = get("UPLOAD_DIR") {
        settings.upload_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("RESULT_DIR") {
        settings.result_dir = Some(PathBuf::from(v));
    }
    if let Some(v) = get("LIBREOFFICE_PATH") {
        settings.libreoffice_path = v;
    }
    if let Some(v) = get("POPPLER_PATH") {
        settings.poppler_path = Some(PathBuf::from(v));
    }
    if let Some(v) = get("CONVERT_TIMEOUT_SECONDS") {
        settings.convert_timeout_seconds = parse_number("CONVERT_TIMEOUT_SECONDS", &v)?;
    }
    if let Some(v) = get("WORKER_PAUSE_MS") {
        settings.worker_pause_ms = parse_number("WORKER_PAUSE_MS", &v)?;
    }
    if let Some(v) = get("MAX_WORKER_THREADS") {
        settings.max_worker_threads = parse_number("MAX_WORKER_THREADS", &v)?;
    }
    if let Some(v) = get("CLEANUP_HOURS") {
        settings.cleanup_hours = parse_number("CLEANUP_HOURS", &v)?;
    }
    if let Some(v) = get("DEFAULT_DPI") {
        settings.default_dpi = parse_number("DEFAULT_DPI", &v)?;
    }
    if let Some(v) = get("BACKGROUND_COLOR_THRESHOLD") {
        settings.background_color_threshold = parse_number("BACKGROUND_COLOR_THRESHOLD", &v)?;
    }
    if let Some(v) = get("AUTH_BASE_URL") {
        settings.auth.base_url = v;
    }

    validate_settings(settings)
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::Validation {
            message: format!("{}{} has invalid value '{}': {}", ENV_PREFIX, name, value, e),
        })
}
