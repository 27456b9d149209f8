//! Helpers for turning user-supplied names into safe filesystem and span values.
//!
//! Upload names end up both as directory names on disk and as tracing span
//! attributes. Neither should carry directory components or full paths.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

/// Fallback slug when a name has no usable characters.
pub const DEFAULT_SLUG: &str = "document";

static RE_DISALLOWED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w\s-]").unwrap());
static RE_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\s-]+").unwrap());

/// Returns only the filename component of a path (no directory).
///
/// Safe for span fields: reveals the file name without exposing the full path.
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Lowercase, dash-separated slug of `name`.
///
/// Word characters (Unicode aware), whitespace and dashes survive; runs of
/// whitespace/dashes collapse into one dash. Empty results become
/// [`DEFAULT_SLUG`].
pub fn slugify(name: &str) -> String {
    let stripped = RE_DISALLOWED.replace_all(name, "");
    let lowered = stripped.trim().to_lowercase();
    let slug = RE_SEPARATORS.replace_all(&lowered, "-").into_owned();

    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug
    }
}

/// First eight characters of a task id, used to disambiguate workspace names.
pub fn short_id(task_id: &str) -> &str {
    task_id.get(..8).unwrap_or(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_path_returns_filename() {
        assert_eq!(
            redact_path(Path::new("/data/uploads/3f2a.docx")),
            "3f2a.docx"
        );
    }

    #[test]
    fn test_redact_path_no_filename() {
        assert_eq!(redact_path(Path::new("/")), "<unknown>");
    }

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("Quarterly Report"), "quarterly-report");
        assert_eq!(slugify("  Annual   Plan -- Final "), "annual-plan-final");
    }

    #[test]
    fn test_slugify_strips_punctuation() {
        assert_eq!(slugify("invoice#42 (copy)"), "invoice42-copy");
        assert_eq!(slugify("../../etc/passwd"), "etcpasswd");
    }

    #[test]
    fn test_slugify_keeps_unicode_word_chars() {
        assert_eq!(slugify("Übersicht 2024"), "übersicht-2024");
        assert_eq!(slugify("报告 文档"), "报告-文档");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify(""), DEFAULT_SLUG);
        assert_eq!(slugify("!!!"), DEFAULT_SLUG);
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
