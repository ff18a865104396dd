//! String helpers and file system checks shared across the crate.
//!
//! - Whitespace collapsing for flattened markup text and titles
//! - Ellipsis truncation for the title display boundary
//! - Log-preview truncation for skipped units
//! - Output directory validation for the CLI

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

pub const ELLIPSIS: &str = "...";

/// Collapse every run of whitespace into a single space and trim the ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("  Estate \n  Sale "), "Estate Sale");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    WHITESPACE_RE.replace_all(s.trim(), " ").into_owned()
}

/// Cap `s` at `max` characters, replacing the tail with `"..."`.
///
/// Counts characters rather than bytes so multi-byte text is never cut
/// inside a code point. Strings that already fit are returned unchanged.
/// A cap too small to hold the ellipsis truncates without one.
pub fn truncate_with_ellipsis(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    if max <= ELLIPSIS.len() {
        return s.chars().take(max).collect();
    }
    let keep = max.saturating_sub(ELLIPSIS.len());
    let mut out: String = s.chars().take(keep).collect();
    out.truncate(out.trim_end().len());
    out.push_str(ELLIPSIS);
    out
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to `max` characters with an ellipsis and
/// byte count indicator appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        None => s.to_string(),
        Some((cut, _)) => format!("{}…(+{} bytes)", &s[..cut], s.len() - cut),
    }
}

/// Ensure a directory exists and is writable.
///
/// This function creates the directory if it doesn't exist, then performs
/// a write test by creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Output directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Estate \n\t Sale  "), "Estate Sale");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn test_truncate_with_ellipsis_short_string() {
        assert_eq!(truncate_with_ellipsis("Garage Sale", 40), "Garage Sale");
    }

    #[test]
    fn test_truncate_with_ellipsis_long_string() {
        let result = truncate_with_ellipsis("Everything Must Go Moving Sale", 12);
        assert_eq!(result, "Everythin...");
        assert_eq!(result.chars().count(), 12);
    }

    #[test]
    fn test_truncate_with_ellipsis_trims_before_marker() {
        assert_eq!(truncate_with_ellipsis("Estate Sale Today", 10), "Estate...");
    }

    #[test]
    fn test_truncate_with_ellipsis_multibyte() {
        let result = truncate_with_ellipsis("Café Crème Brûlée Sale", 8);
        assert_eq!(result, "Café...");
    }

    #[test]
    fn test_truncate_with_ellipsis_tiny_cap() {
        assert_eq!(truncate_with_ellipsis("Estate Sale", 2), "Es");
        assert_eq!(truncate_with_ellipsis("Estate Sale", 3), "Est");
        assert_eq!(truncate_with_ellipsis("Estate Sale", 0), "");
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("out/listings");
        ensure_writable_dir(nested.to_str().unwrap()).await.unwrap();
        assert!(nested.is_dir());
    }
}
