//! # searchable-pdf
//!
//! Turn scanned PDFs into searchable PDFs with a vision-language OCR model
//! (DeepSeek-OCR) served by Ollama.
//!
//! ## Why this crate?
//!
//! A scanned PDF is a stack of pictures: nothing can be searched, selected
//! or copied. Classic OCR engines struggle with mixed scripts, tables and
//! degraded scans, while a vision-language model reads the page the way a
//! person does and reports where each block of text sits. This crate keeps
//! the original scan as the visible page and lays an invisible,
//! position-matched text layer over it.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Imagery     largest embedded scan, or a 300 DPI render (pdfium)
//!  ├─ 2. Encode      JPEG → base64
//!  ├─ 3. OCR         grounded request, streamed; loop/timeout aborts
//!  ├─ 4. Escalate    cooldown → one free-text fallback → degrade
//!  ├─ 5. Parse       <|ref|>/<|det|> markup → positioned regions
//!  ├─ 6. Layout      font-size search + word wrap inside each box
//!  └─ 7. Output      background + invisible text, atomic write
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use searchable_pdf::{convert, CancellationToken, ConversionConfig, ProgressEvent};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::default(); // http://localhost:11434, deepseek-ocr
//!     let progress = Arc::new(|e: &ProgressEvent| eprintln!("{}", e.message));
//!     let report = convert("scan.pdf", &config, progress, CancellationToken::new()).await?;
//!     println!("wrote {}", report.output.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `searchable-pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! searchable-pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod fonts;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod task;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{BboxOrder, ConversionConfig, ConversionConfigBuilder};
pub use convert::{check_service, convert, convert_sync, convert_to_file, DocumentPipeline};
pub use error::{FontError, OcrError, SearchablePdfError, TimeoutKind};
pub use fonts::{FontMetrics, FontRegistry};
pub use output::{ConversionReport, PageReport};
pub use pipeline::client::{AttemptMode, OcrAttempt, OllamaClient, Recognizer};
pub use pipeline::escalation::{DebugHook, OutcomeKind, PageOutcome};
pub use pipeline::imagery::{BackgroundSource, SourceDocument};
pub use pipeline::layout::{ArtifactWriter, ComposedPage, TextMeasure, TextPlacement};
pub use pipeline::parse::{parse, BBox, Region};
pub use progress::{NoopProgress, ProgressEvent, ProgressObserver, SharedObserver};
pub use task::{CancellationToken, ConversionHandle, ConversionTask};
