use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::DynamicImage;
use tracing::debug;

use crate::error::ConversionError;
use crate::processor::command::{describe_status, run_with_timeout, ProcessOutcome};

/// Renders every page of a PDF, in page order.
pub trait Rasterizer: Send + Sync {
    fn rasterize(&self, pdf: &Path, dpi: u32) -> Result<Vec<DynamicImage>, ConversionError>;
}

/// Poppler's `pdftoppm`.
pub struct PdftoppmRasterizer {
    program: PathBuf,
    timeout: Duration,
}

impl PdftoppmRasterizer {
    pub fn new<P: Into<PathBuf>>(program: P, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn rasterize(&self, pdf: &Path, dpi: u32) -> Result<Vec<DynamicImage>, ConversionError> {
        let _span = tracing::info_span!("processor.pdftoppm", dpi).entered();

        let out_dir = tempfile::tempdir()
            .map_err(|e| ConversionError::Rasterize(format!("Failed to create temp dir: {}", e)))?;
        let prefix = out_dir.path().join("page");

        let args: Vec<OsString> = vec![
            "-png".into(),
            "-r".into(),
            dpi.to_string().into(),
            pdf.into(),
            prefix.into(),
        ];

        let outcome = run_with_timeout(&self.program, args, self.timeout).map_err(|e| {
            ConversionError::Rasterize(format!(
                "Failed to run {}: {}. Make sure poppler-utils is installed.",
                self.program.display(),
                e
            ))
        })?;

        let output = match outcome {
            ProcessOutcome::Finished(output) => output,
            ProcessOutcome::TimedOut => {
                return Err(ConversionError::Rasterize(format!(
                    "pdftoppm did not finish within {}s",
                    self.timeout.as_secs()
                )))
            }
        };

        if !output.status.success() {
            return Err(ConversionError::Rasterize(format!(
                "pdftoppm failed ({}): {}",
                describe_status(&output),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let pages = rendered_pages(out_dir.path())?;
        if pages.is_empty() {
            return Err(ConversionError::NoPages);
        }
        debug!("Rendered {} page(s)", pages.len());

        pages
            .iter()
            .map(|path| {
                image::open(path).map_err(|e| {
                    ConversionError::Rasterize(format!(
                        "Failed to load rendered page {}: {}",
                        path.display(),
                        e
                    ))
                })
            })
            .collect()
    }
}

/// PNGs written by pdftoppm, ordered by the page number suffix
/// (`page-1.png`, `page-01.png`, ... depending on the page count).
fn rendered_pages(dir: &Path) -> Result<Vec<PathBuf>, ConversionError> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| ConversionError::Rasterize(format!("Failed to read output: {}", e)))?;

    let mut pages: Vec<(u32, PathBuf)> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter_map(|path| page_number(&path).map(|n| (n, path)))
        .collect();
    pages.sort_by_key(|(n, _)| *n);

    Ok(pages.into_iter().map(|(_, path)| path).collect())
}

fn page_number(path: &Path) -> Option<u32> {
    if path.extension().and_then(|e| e.to_str()) != Some("png") {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    stem.rsplit('-').next()?.parse().ok()
}
