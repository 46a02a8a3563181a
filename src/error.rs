//! Error types for the searchable-pdf library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SearchablePdfError`] is **fatal**: the conversion cannot proceed at all
//!   (bad input file, unusable font, output not writable). Returned as
//!   `Err(SearchablePdfError)` from the top-level `convert*` functions.
//!
//! * [`OcrError`] is **per attempt**: one recognition request failed (timeout,
//!   degenerate generation, transport glitch). The escalation controller
//!   absorbs these into a degraded or empty page; they only surface as fatal
//!   when the up-front availability check fails.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All fatal errors returned by the searchable-pdf library.
#[derive(Debug, Error)]
pub enum SearchablePdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// pdfium could not open the source document.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Imagery or layout for a page could not be produced.
    #[error("Page {page} could not be reconstructed: {detail}")]
    PageReconstructionFailed { page: usize, detail: String },

    // ── Font errors ───────────────────────────────────────────────────────
    /// None of the candidate font files could be loaded.
    #[error(
        "No usable font found. Tried:\n{}\nPass --font <FILE.ttf> to point at a TrueType font.",
        tried.iter().map(|p| format!("  • {}", p.display())).collect::<Vec<_>>().join("\n")
    )]
    NoUsableFont { tried: Vec<PathBuf> },

    // ── Service errors ────────────────────────────────────────────────────
    /// The OCR service failed the availability check.
    #[error(transparent)]
    Service(#[from] OcrError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {detail}")]
    OutputWriteFailed { path: PathBuf, detail: String },

    // ── Control ───────────────────────────────────────────────────────────
    /// The caller cancelled the conversion.
    #[error("Conversion cancelled")]
    Cancelled,

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
You can:\n\
  • Place libpdfium next to the binary or in the working directory.\n\
  • Set PDFIUM_LIB_PATH=/path/to/libpdfium.\n\
  • Install pdfium system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which of the two time budgets of a recognition request ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// No chunk arrived within the per-chunk budget.
    ChunkStall,
    /// The wall-clock deadline measured from request start passed.
    Deadline,
}

impl std::fmt::Display for TimeoutKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutKind::ChunkStall => f.write_str("no chunk received"),
            TimeoutKind::Deadline => f.write_str("deadline exceeded"),
        }
    }
}

/// Why a candidate font file was rejected.
#[derive(Debug, Error)]
pub enum FontError {
    #[error("cannot read font file: {0}")]
    Read(#[from] std::io::Error),

    #[error("not a TrueType/OpenType font: {0}")]
    Parse(#[from] ttf_parser::FaceParsingError),

    /// The face parsed but its cmap maps no characters.
    #[error("font maps no characters")]
    NoCharacters,
}

/// A failed recognition attempt against the OCR service.
#[derive(Debug, Clone, Error)]
pub enum OcrError {
    /// The service could not be reached at all.
    #[error("Could not connect to the OCR service at {url}: {reason}\nIs Ollama running?")]
    ServiceUnreachable { url: String, reason: String },

    /// The catalog has no model whose name contains the configured substring.
    #[error("Model '{model}' not found (available: {}). Pull it first: ollama pull {model}", available.join(", "))]
    ModelNotFound { model: String, available: Vec<String> },

    /// The service answered with a non-success status.
    #[error("OCR service returned HTTP {status}: {body}")]
    ServiceStatus { status: u16, body: String },

    /// The service reported an error inside the response stream.
    #[error("OCR service error: {0}")]
    Service(String),

    /// One of the two time budgets expired.
    #[error("Attempt {attempt}: inference timed out after {elapsed:?} ({kind})")]
    InferenceTimeout {
        attempt: u32,
        kind: TimeoutKind,
        elapsed: Duration,
    },

    /// The model entered a repetition loop; the stream was aborted early.
    #[error("Attempt {attempt}: hallucination detected, {pattern:?} repeated {repeats}+ times")]
    HallucinationDetected {
        attempt: u32,
        pattern: String,
        repeats: usize,
    },

    /// Any other HTTP/transport failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The page image could not be prepared for the request.
    #[error("Image encoding failed: {0}")]
    Encode(String),
}

impl OcrError {
    /// Short label used in progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            OcrError::ServiceUnreachable { .. } => "service unreachable",
            OcrError::ModelNotFound { .. } => "model not found",
            OcrError::ServiceStatus { .. } | OcrError::Service(_) => "service error",
            OcrError::InferenceTimeout { .. } => "timeout",
            OcrError::HallucinationDetected { .. } => "hallucination",
            OcrError::Transport(_) => "transport error",
            OcrError::Encode(_) => "encoding error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_usable_font_lists_candidates() {
        let e = SearchablePdfError::NoUsableFont {
            tried: vec![PathBuf::from("/a/One.ttf"), PathBuf::from("/b/Two.ttf")],
        };
        let msg = e.to_string();
        assert!(msg.contains("/a/One.ttf"), "got: {msg}");
        assert!(msg.contains("/b/Two.ttf"), "got: {msg}");
    }

    #[test]
    fn model_not_found_display() {
        let e = OcrError::ModelNotFound {
            model: "deepseek-ocr".into(),
            available: vec!["llava:7b".into(), "qwen2.5vl".into()],
        };
        let msg = e.to_string();
        assert!(msg.contains("deepseek-ocr"));
        assert!(msg.contains("llava:7b, qwen2.5vl"));
    }

    #[test]
    fn timeout_display_names_budget() {
        let e = OcrError::InferenceTimeout {
            attempt: 2,
            kind: TimeoutKind::Deadline,
            elapsed: Duration::from_secs(60),
        };
        let msg = e.to_string();
        assert!(msg.contains("Attempt 2"));
        assert!(msg.contains("deadline exceeded"));
    }

    #[test]
    fn service_error_wraps_transparently() {
        let inner = OcrError::ServiceUnreachable {
            url: "http://localhost:11434".into(),
            reason: "connection refused".into(),
        };
        let e: SearchablePdfError = inner.clone().into();
        assert_eq!(e.to_string(), inner.to_string());
    }

    #[test]
    fn labels_are_short() {
        let e = OcrError::HallucinationDetected {
            attempt: 1,
            pattern: "ab".into(),
            repeats: 15,
        };
        assert_eq!(e.label(), "hallucination");
        assert_eq!(OcrError::Transport("x".into()).label(), "transport error");
    }
}
