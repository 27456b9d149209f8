use std::path::PathBuf;
use std::time::Duration;

use crate::config::Settings;

pub struct PipelineConfig {
    pub result_dir: PathBuf,
    pub libreoffice_path: PathBuf,
    pub pdftoppm_path: PathBuf,
    pub convert_timeout: Duration,
    pub retention: chrono::Duration,
    pub background_threshold: u8,
}

impl PipelineConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            result_dir: settings.result_dir(),
            libreoffice_path: PathBuf::from(&settings.libreoffice_path),
            pdftoppm_path: settings.pdftoppm_path(),
            convert_timeout: settings.convert_timeout(),
            retention: settings.retention(),
            background_threshold: settings.background_color_threshold,
        }
    }
}
