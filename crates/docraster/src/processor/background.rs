//! Near-white background replacement for rendered pages.
//!
//! A pixel whose luminance is below the threshold is page content and is
//! kept; everything at or above it is replaced by the chosen background.

use std::collections::HashMap;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};

use crate::error::ConversionError;
use crate::task::{BackgroundMode, Task};

/// Resolved background for one task, ready to be applied.
#[derive(Debug, Clone)]
pub enum BackgroundSpec {
    None,
    Color(Rgb<u8>),
    Image(RgbImage),
}

impl BackgroundSpec {
    /// Checks and loads everything the task's background mode needs.
    /// Runs before any page is rendered so a missing parameter fails fast.
    pub fn from_task(task: &Task) -> Result<Self, ConversionError> {
        match task.background {
            BackgroundMode::None => Ok(BackgroundSpec::None),
            BackgroundMode::Color => {
                let color = task
                    .background_color
                    .as_deref()
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .ok_or(ConversionError::MissingBackgroundColor)?;
                Ok(BackgroundSpec::Color(parse_hex_color(color)?))
            }
            BackgroundMode::Image => {
                let path = task
                    .background_image
                    .as_deref()
                    .ok_or(ConversionError::MissingBackgroundImage)?;
                Ok(BackgroundSpec::Image(load_background(path)?))
            }
        }
    }
}

fn load_background(path: &Path) -> Result<RgbImage, ConversionError> {
    if !path.is_file() {
        return Err(ConversionError::MissingBackgroundImage);
    }
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|e| ConversionError::BackgroundImage {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Parses `#RGB` or `#RRGGBB` (leading `#` optional, case-insensitive).
pub fn parse_hex_color(value: &str) -> Result<Rgb<u8>, ConversionError> {
    let invalid = || ConversionError::InvalidColor(value.to_string());
    let hex = value.trim().trim_start_matches('#');
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let channel = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
    match hex.len() {
        3 => {
            let mut rgb = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = channel(&c.to_string())?;
                rgb[i] = v * 17;
            }
            Ok(Rgb(rgb))
        }
        6 => Ok(Rgb([
            channel(&hex[0..2])?,
            channel(&hex[2..4])?,
            channel(&hex[4..6])?,
        ])),
        _ => Err(invalid()),
    }
}

/// Composites every page over `spec`. `BackgroundSpec::None` returns the
/// pages untouched.
pub fn apply_background(
    pages: Vec<DynamicImage>,
    spec: &BackgroundSpec,
    threshold: u8,
) -> Vec<DynamicImage> {
    match spec {
        BackgroundSpec::None => pages,
        BackgroundSpec::Color(color) => pages
            .iter()
            .map(|page| composite(page, threshold, |_, _| *color))
            .collect(),
        BackgroundSpec::Image(template) => {
            // Pages of one document usually share a size; resize once per size.
            let mut resized: HashMap<(u32, u32), RgbImage> = HashMap::new();
            pages
                .iter()
                .map(|page| {
                    let size = (page.width(), page.height());
                    let background = resized.entry(size).or_insert_with(|| {
                        image::imageops::resize(template, size.0, size.1, FilterType::Lanczos3)
                    });
                    composite(page, threshold, |x, y| *background.get_pixel(x, y))
                })
                .collect()
        }
    }
}

/// ITU-R 601 luma with integer weights.
fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0.map(u32::from);
    // At most 255.
    ((r * 299 + g * 587 + b * 114) / 1000) as u8
}

fn composite<F>(page: &DynamicImage, threshold: u8, background_at: F) -> DynamicImage
where
    F: Fn(u32, u32) -> Rgb<u8>,
{
    let foreground = page.to_rgb8();
    let out = RgbImage::from_fn(foreground.width(), foreground.height(), |x, y| {
        let pixel = foreground.get_pixel(x, y);
        if luma(pixel) < threshold {
            *pixel
        } else {
            background_at(x, y)
        }
    });
    DynamicImage::ImageRgb8(out)
}
