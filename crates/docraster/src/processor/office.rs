use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{ConfigError, ConversionError, StorageError};
use crate::pipeline::PipelineError;
use crate::processor::command::{describe_status, run_with_timeout, ProcessOutcome};

/// Turns an office document into a PDF inside `out_dir`.
pub trait OfficeConverter: Send + Sync {
    fn convert(
        &self,
        source: &Path,
        out_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, PipelineError>;
}

/// Headless LibreOffice (`soffice --convert-to pdf`).
pub struct LibreOfficeConverter {
    program: PathBuf,
}

impl LibreOfficeConverter {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn args(source: &Path, out_dir: &Path, profile_dir: &Path) -> Vec<OsString> {
        // Each run gets its own profile so concurrent workers do not fight
        // over the user installation lock.
        let mut profile = OsString::from("-env:UserInstallation=file://");
        profile.push(profile_dir);

        vec![
            profile,
            "--headless".into(),
            "--nologo".into(),
            "--convert-to".into(),
            "pdf".into(),
            "--outdir".into(),
            out_dir.into(),
            source.into(),
        ]
    }
}

impl OfficeConverter for LibreOfficeConverter {
    fn convert(
        &self,
        source: &Path,
        out_dir: &Path,
        timeout: Duration,
    ) -> Result<PathBuf, PipelineError> {
        let _span = tracing::info_span!("processor.libreoffice").entered();

        std::fs::create_dir_all(out_dir).map_err(|e| StorageError::CreateDirectory {
            path: out_dir.to_path_buf(),
            source: e,
        })?;
        let profile = tempfile::tempdir().map_err(|e| StorageError::CreateDirectory {
            path: std::env::temp_dir(),
            source: e,
        })?;

        let outcome = run_with_timeout(
            &self.program,
            Self::args(source, out_dir, profile.path()),
            timeout,
        )
        .map_err(|e| -> PipelineError {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::ToolMissing {
                    tool: self.program.display().to_string(),
                    source: e,
                }
                .into()
            } else {
                ConversionError::ConverterFailed {
                    status: "not started".to_string(),
                    stderr: e.to_string(),
                }
                .into()
            }
        })?;

        let output = match outcome {
            ProcessOutcome::Finished(output) => output,
            ProcessOutcome::TimedOut => {
                return Err(ConversionError::ConverterTimeout { timeout }.into())
            }
        };

        if !output.status.success() {
            return Err(ConversionError::ConverterFailed {
                status: describe_status(&output),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let pdf = find_pdf(out_dir).ok_or(ConversionError::NoPdfOutput)?;
        debug!("LibreOffice produced {}", crate::sanitize::redact_path(&pdf));
        Ok(pdf)
    }
}

/// First `*.pdf` in `dir` by name.
pub(crate) fn find_pdf(dir: &Path) -> Option<PathBuf> {
    let mut pdfs: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
        })
        .collect();
    pdfs.sort();
    pdfs.into_iter().next()
}
