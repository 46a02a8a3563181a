//! Input validation and output path derivation.
//!
//! ## Why check magic bytes ourselves?
//!
//! pdfium reports every unreadable file with the same opaque error. Checking
//! existence, read permission and the `%PDF` header first gives callers a
//! meaningful error before any OCR work or service traffic happens.

use crate::error::SearchablePdfError;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Validate that `path` names a readable file starting with `%PDF`.
pub fn validate_input(path: &Path) -> Result<(), SearchablePdfError> {
    if !path.exists() {
        return Err(SearchablePdfError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let mut file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SearchablePdfError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(_) => {
            return Err(SearchablePdfError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
    };

    let mut magic = [0u8; 4];
    let n = read_prefix(&mut file, &mut magic);
    if n < 4 || &magic != b"%PDF" {
        return Err(SearchablePdfError::NotAPdf {
            path: path.to_path_buf(),
            magic,
        });
    }

    debug!("Validated input PDF: {}", path.display());
    Ok(())
}

/// Read up to `buf.len()` bytes, tolerating short files.
fn read_prefix(file: &mut std::fs::File, buf: &mut [u8]) -> usize {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) | Err(_) => break,
            Ok(n) => filled += n,
        }
    }
    filled
}

/// Sibling path with `suffix` appended to the stem: `scan.pdf` → `scan_ocr.pdf`.
pub fn output_path_for(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "pdf".to_string());
    input.with_file_name(format!("{stem}{suffix}.{ext}"))
}
