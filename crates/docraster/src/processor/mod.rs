pub mod background;
pub mod command;
pub mod office;
pub mod raster;

use std::path::Path;

pub use background::{apply_background, parse_hex_color, BackgroundSpec};
pub use office::{LibreOfficeConverter, OfficeConverter};
pub use raster::{PdftoppmRasterizer, Rasterizer};

/// Upload formats accepted for conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Doc,
    Docx,
    Pdf,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "doc" => Some(Self::Doc),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Docx => "docx",
            Self::Pdf => "pdf",
        }
    }

    /// PDFs go straight to the rasterizer; everything else goes through the
    /// office converter first.
    pub fn needs_office_conversion(&self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

/// Whether an uploaded file name carries an accepted suffix.
pub fn is_allowed_upload(filename: &str) -> bool {
    DocumentFormat::from_path(Path::new(filename)).is_some()
}

/// MIME type used when serving `path` back to a client.
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(DocumentFormat::from_extension("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("Doc"), Some(DocumentFormat::Doc));
        assert_eq!(DocumentFormat::from_extension("txt"), None);
        assert_eq!(DocumentFormat::from_extension(""), None);
    }

    #[test]
    fn test_needs_office_conversion() {
        assert!(DocumentFormat::Doc.needs_office_conversion());
        assert!(DocumentFormat::Docx.needs_office_conversion());
        assert!(!DocumentFormat::Pdf.needs_office_conversion());
    }

    #[test]
    fn test_is_allowed_upload() {
        assert!(is_allowed_upload("report.pdf"));
        assert!(is_allowed_upload("Report.DOCX"));
        assert!(is_allowed_upload("legacy.doc"));
        assert!(!is_allowed_upload("notes.txt"));
        assert!(!is_allowed_upload("pdf"));
        assert!(!is_allowed_upload("archive.pdf.zip"));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("x.zip")), "application/zip");
        assert_eq!(content_type_for(Path::new("page-001.png")), "image/png");
        assert_eq!(
            content_type_for(Path::new("no-extension")),
            "application/octet-stream"
        );
    }
}
