//! Binary downloads (PDF and spreadsheet exports).

use chrono::NaiveDate;
use portal_core::{PortalError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A downloaded file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Download {
    /// File contents.
    pub bytes: Vec<u8>,
    /// Name to save the file under.
    pub filename: String,
    /// Content type reported by the server, if any.
    pub content_type: Option<String>,
}

impl Download {
    /// Writes the file into `dir` and returns its path.
    ///
    /// # Errors
    /// Returns [`PortalError::Persistence`] if the directory or file cannot be
    /// written.
    pub fn save_in(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| PortalError::Persistence(e.to_string()))?;
        let path = dir.join(sanitize(&self.filename));
        fs::write(&path, &self.bytes).map_err(|e| PortalError::Persistence(e.to_string()))?;
        debug!(path = %path.display(), bytes = self.bytes.len(), "Saved download");
        Ok(path)
    }
}

/// Extracts the filename from a `Content-Disposition` header value.
///
/// `filename*` (RFC 5987) wins over `filename`. Separators inside quoted
/// values are part of the value.
#[must_use]
pub fn filename_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in parameters(header) {
        let Some((name, value)) = part.split_once('=') else {
            continue;
        };
        match name.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let encoded = value.trim().rsplit("''").next().unwrap_or_default();
                let decoded = urlencoding::decode_binary(encoded.trim_matches('"').as_bytes());
                let decoded = String::from_utf8_lossy(&decoded);
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
            "filename" => {
                let value = value.trim();
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                if !value.is_empty() {
                    plain = Some(value.replace("\\\"", "\"").replace("\\\\", "\\"));
                }
            }
            _ => {}
        }
    }
    plain
}

/// Splits a header value on `;` outside double quotes.
fn parameters(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in header.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                parts.push(header[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(header[start..].trim());
    parts
}

/// Builds `<stem>_<date>.<ext>`, the extension chosen from the content type.
#[must_use]
pub fn synthesize_filename(stem: &str, date: NaiveDate, content_type: Option<&str>) -> String {
    format!("{stem}_{}.{}", date.format("%Y-%m-%d"), extension_for(content_type))
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();
    match mime.as_str() {
        "application/pdf" => "pdf",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-excel" => "xls",
        "text/csv" => "csv",
        "application/json" => "json",
        "application/zip" => "zip",
        _ => "bin",
    }
}

fn sanitize(filename: &str) -> String {
    let name: String = filename
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
        .collect();
    match name.trim_matches('.') {
        "" => "download".to_string(),
        _ => name,
    }
}
