//! Conversion reports.
//!
//! The searchable PDF itself goes to disk; these types describe what was
//! produced so callers (and `--json`) can see which pages carry a
//! positioned text layer, which fell back to unpositioned text, and which
//! have none.

use crate::pipeline::escalation::OutcomeKind;
use crate::pipeline::imagery::BackgroundSource;
use serde::Serialize;
use std::path::PathBuf;

/// Summary of one output page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageReport {
    /// 1-based page number.
    pub page_num: usize,
    pub outcome: OutcomeKind,
    /// Regions returned by the parser (0 unless `outcome` is recognized).
    pub regions: usize,
    /// Invisible text lines written to the page.
    pub text_entries: usize,
    /// Recognition requests issued for this page.
    pub attempts: u32,
    pub background: BackgroundSource,
    /// Page size in points (= background pixels).
    pub width: u32,
    pub height: u32,
    pub duration_ms: u64,
}

/// Summary of a whole conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Exact model name used for recognition.
    pub model: String,
    pub pages: Vec<PageReport>,
    pub recognized_pages: usize,
    pub degraded_pages: usize,
    pub empty_pages: usize,
    pub total_duration_ms: u64,
}

impl ConversionReport {
    pub fn new(
        input: PathBuf,
        output: PathBuf,
        model: String,
        pages: Vec<PageReport>,
        total_duration_ms: u64,
    ) -> Self {
        let count = |kind: OutcomeKind| pages.iter().filter(|p| p.outcome == kind).count();
        Self {
            recognized_pages: count(OutcomeKind::Recognized),
            degraded_pages: count(OutcomeKind::Degraded),
            empty_pages: count(OutcomeKind::Empty),
            input,
            output,
            model,
            pages,
            total_duration_ms,
        }
    }

    pub fn total_pages(&self) -> usize {
        self.pages.len()
    }

    /// Invisible text lines across all pages.
    pub fn text_entries(&self) -> usize {
        self.pages.iter().map(|p| p.text_entries).sum()
    }
}
