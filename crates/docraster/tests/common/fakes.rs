#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::{DynamicImage, Rgb, RgbImage};

use docraster::error::{ConfigError, ConversionError};
use docraster::pipeline::PipelineError;
use docraster::processor::{OfficeConverter, Rasterizer};

pub const PAGE_WIDTH: u32 = 20;
pub const PAGE_HEIGHT: u32 = 10;

/// Writes `<stem>.pdf` into the output directory, or reports the tool missing.
#[derive(Clone, Default)]
pub struct FakeConverter {
    pub calls: Arc<AtomicUsize>,
    pub missing: bool,
}

impl FakeConverter {
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OfficeConverter for FakeConverter {
    fn convert(
        &self,
        source: &Path,
        out_dir: &Path,
        _timeout: Duration,
    ) -> Result<PathBuf, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.missing {
            return Err(ConfigError::ToolMissing {
                tool: "soffice".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file"),
            }
            .into());
        }

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document");
        let pdf = out_dir.join(format!("{}.pdf", stem));
        std::fs::write(&pdf, b"%PDF-1.4\n%%EOF\n").map_err(|_| ConversionError::NoPdfOutput)?;
        Ok(pdf)
    }
}

/// Renders a fixed number of white pages with a black block in the corner.
#[derive(Clone)]
pub struct FakeRasterizer {
    pub pages: usize,
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl FakeRasterizer {
    pub fn new(pages: usize) -> Self {
        Self {
            pages,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn slow(pages: usize, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new(pages)
        }
    }
}

impl Rasterizer for FakeRasterizer {
    fn rasterize(&self, _pdf: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, ConversionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok((0..self.pages)
            .map(|_| {
                let mut page = RgbImage::from_pixel(PAGE_WIDTH, PAGE_HEIGHT, Rgb([255, 255, 255]));
                for x in 0..4 {
                    for y in 0..4 {
                        page.put_pixel(x, y, Rgb([0, 0, 0]));
                    }
                }
                DynamicImage::ImageRgb8(page)
            })
            .collect())
    }
}
