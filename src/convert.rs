//! Document conversion entry points.
//!
//! ## Why a generic pipeline plus thin wrappers?
//!
//! [`DocumentPipeline::run`] holds the per-page loop and knows nothing about
//! pdfium or HTTP: it works through [`SourceDocument`], [`Recognizer`],
//! [`TextMeasure`] and [`ArtifactWriter`]. The `convert*` functions below
//! wire in the real implementations: input validation, the availability
//! check, pdfium binding, font resolution and the atomic output write.
//!
//! ## Why spawn_blocking + block_on?
//!
//! pdfium is blocking and must stay on one thread for the whole document,
//! while the OCR requests are async. The document run therefore lives on a
//! blocking thread and drives each async OCR call through the runtime
//! handle. Only one request is ever in flight.

use crate::config::ConversionConfig;
use crate::error::{OcrError, SearchablePdfError};
use crate::fonts::FontRegistry;
use crate::output::{ConversionReport, PageReport};
use crate::pipeline::client::{OllamaClient, Recognizer};
use crate::pipeline::document::{bind_pdfium, PdfiumSource, PdfiumWriter};
use crate::pipeline::encode::encode_for_ocr;
use crate::pipeline::escalation::{
    DebugHook, EscalationController, PageOutcome, PageRecognition,
};
use crate::pipeline::imagery::{page_background, SourceDocument};
use crate::pipeline::input::{output_path_for, validate_input};
use crate::pipeline::layout::{compose_page, ArtifactWriter, TextMeasure};
use crate::progress::{ProgressEvent, ProgressObserver, SharedObserver};
use crate::task::CancellationToken;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

/// The per-page loop over abstract collaborators.
pub struct DocumentPipeline<'a, R: Recognizer> {
    recognizer: &'a R,
    config: &'a ConversionConfig,
    observer: &'a dyn ProgressObserver,
    cancel: &'a CancellationToken,
    hook: Option<&'a dyn DebugHook>,
}

impl<'a, R: Recognizer> DocumentPipeline<'a, R> {
    pub fn new(
        recognizer: &'a R,
        config: &'a ConversionConfig,
        observer: &'a dyn ProgressObserver,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self {
            recognizer,
            config,
            observer,
            cancel,
            hook: None,
        }
    }

    pub fn with_hook(mut self, hook: &'a dyn DebugHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Process every page of `source` in order and commit it to `writer`.
    ///
    /// OCR problems never fail the run; they degrade the page. Imagery and
    /// writer failures abort it, as does cancellation.
    ///
    /// Completion ("Done") is left to the caller, which knows when the
    /// output has actually been persisted.
    pub async fn run<S, W, M>(
        &self,
        source: &S,
        writer: &mut W,
        measure: &M,
    ) -> Result<Vec<PageReport>, SearchablePdfError>
    where
        S: SourceDocument + ?Sized,
        W: ArtifactWriter + ?Sized,
        M: TextMeasure + ?Sized,
    {
        let total = source.page_count();
        let mut controller =
            EscalationController::new(self.recognizer, self.config, self.observer, self.cancel);
        if let Some(hook) = self.hook {
            controller = controller.with_hook(hook);
        }

        let mut reports = Vec::with_capacity(total);
        for index in 0..total {
            let page_num = index + 1;
            self.ensure_active()?;
            self.emit(page_num, total, format!("Processing page {page_num}/{total}..."));
            let started = Instant::now();

            let background = page_background(source, index, self.config)?;

            let recognition = match encode_for_ocr(
                &background.image,
                self.config.jpeg_quality,
                self.config.ocr_max_dimension,
            ) {
                Ok(b64) => controller.recognize_page(page_num, total, &b64).await?,
                Err(e) => {
                    warn!("Page {}: {}; page left without text", page_num, e);
                    PageRecognition {
                        outcome: PageOutcome::Empty,
                        attempts: 0,
                    }
                }
            };

            // A page whose recognition finished after cancellation is dropped.
            self.ensure_active()?;

            let regions = match &recognition.outcome {
                PageOutcome::Recognized(r) => r.len(),
                _ => 0,
            };
            let (width, height) = (background.image.width(), background.image.height());
            let composed = compose_page(background.image, &recognition.outcome, measure);
            writer.add_page(&composed)?;

            let report = PageReport {
                page_num,
                outcome: recognition.outcome.kind(),
                regions,
                text_entries: composed.text.len(),
                attempts: recognition.attempts,
                background: background.source,
                width,
                height,
                duration_ms: started.elapsed().as_millis() as u64,
            };
            info!(
                "Page {}/{}: {:?}, {} text lines, {}ms",
                page_num, total, report.outcome, report.text_entries, report.duration_ms
            );
            reports.push(report);
        }

        Ok(reports)
    }

    fn ensure_active(&self) -> Result<(), SearchablePdfError> {
        if self.cancel.is_cancelled() {
            Err(SearchablePdfError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn emit(&self, current: usize, total: usize, message: String) {
        self.observer
            .on_progress(&ProgressEvent::new(current, total, message));
    }
}

/// Convert `input` into a searchable sibling (`scan.pdf` → `scan_ocr.pdf`).
///
/// This is the primary entry point for the library.
///
/// # Errors
/// Returns `Err` only for fatal problems: invalid input, unavailable
/// service (when `verify_service` is on), missing pdfium or font, an
/// unreadable source page, an unwritable output, or cancellation. Pages
/// that cannot be recognised are reported, not raised.
///
/// # Example
/// ```rust,no_run
/// use searchable_pdf::{convert, CancellationToken, ConversionConfig, NoopProgress};
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = ConversionConfig::default();
/// let report = convert("scan.pdf", &config, Arc::new(NoopProgress), CancellationToken::new()).await?;
/// println!("{} of {} pages recognised", report.recognized_pages, report.total_pages());
/// # Ok(())
/// # }
/// ```
pub async fn convert(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
    observer: SharedObserver,
    cancel: CancellationToken,
) -> Result<ConversionReport, SearchablePdfError> {
    let input = input.as_ref();
    let output = output_path_for(input, &config.output_suffix);
    convert_to_file(input, &output, config, observer, cancel).await
}

/// Convert `input` and write the searchable PDF to `output`.
///
/// The output is written to a temporary file in the target directory and
/// renamed into place, so a failed or cancelled run never leaves a partial
/// file behind.
pub async fn convert_to_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    config: &ConversionConfig,
    observer: SharedObserver,
    cancel: CancellationToken,
) -> Result<ConversionReport, SearchablePdfError> {
    let total_start = Instant::now();
    let input = input.as_ref().to_path_buf();
    let output = output.as_ref().to_path_buf();
    info!("Starting conversion: {}", input.display());

    observer.on_progress(&ProgressEvent::new(0, 0, "Opening PDF..."));

    // ── Step 1: Validate paths ───────────────────────────────────────────
    validate_input(&input)?;
    if same_file(&input, &output) {
        return Err(SearchablePdfError::InvalidConfig(format!(
            "Output path '{}' would overwrite the input",
            output.display()
        )));
    }

    // ── Step 2: Resolve the OCR model ────────────────────────────────────
    let mut client = OllamaClient::new(config)?;
    if config.verify_service {
        let model = client.check_availability().await?;
        client = client.with_model(model);
    }
    let model = client.model().to_string();

    // ── Step 3: Run the document on a blocking thread ────────────────────
    let handle = tokio::runtime::Handle::current();
    let config = config.clone();
    let (task_input, task_output) = (input.clone(), output.clone());

    let pages = tokio::task::spawn_blocking(move || {
        let pdfium = bind_pdfium(config.pdfium_library_path.as_deref())?;
        let fonts = FontRegistry::load(&config.font_candidates)?;
        let source = PdfiumSource::open(&pdfium, &task_input)?;
        let mut writer = PdfiumWriter::new(&pdfium, &fonts)?;

        let pipeline = DocumentPipeline::new(&client, &config, observer.as_ref(), &cancel);
        let pages = handle.block_on(pipeline.run(&source, &mut writer, fonts.metrics()))?;

        commit(|| writer.save(&task_output), observer.as_ref(), pages.len())?;
        Ok::<_, SearchablePdfError>(pages)
    })
    .await
    .map_err(|e| SearchablePdfError::Internal(format!("Conversion task panicked: {}", e)))??;

    let report = ConversionReport::new(
        input,
        output,
        model,
        pages,
        total_start.elapsed().as_millis() as u64,
    );
    info!(
        "Conversion complete: {}/{} pages recognised, {} degraded, {} empty, {}ms total",
        report.recognized_pages,
        report.total_pages(),
        report.degraded_pages,
        report.empty_pages,
        report.total_duration_ms
    );
    Ok(report)
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input: impl AsRef<Path>,
    config: &ConversionConfig,
    observer: SharedObserver,
    cancel: CancellationToken,
) -> Result<ConversionReport, SearchablePdfError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SearchablePdfError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input, config, observer, cancel))
}

/// Check that the OCR service is reachable and serves the configured model.
///
/// Returns the exact model name that would be used.
pub async fn check_service(config: &ConversionConfig) -> Result<String, OcrError> {
    OllamaClient::new(config)?.check_availability().await
}

/// Persist the output, then announce completion.
fn commit<F>(save: F, observer: &dyn ProgressObserver, pages: usize) -> Result<(), SearchablePdfError>
where
    F: FnOnce() -> Result<(), SearchablePdfError>,
{
    save()?;
    observer.on_progress(&ProgressEvent::new(pages, pages, "Done"));
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    let canon = |p: &Path| -> PathBuf { p.canonicalize().unwrap_or_else(|_| p.to_path_buf()) };
    canon(a) == canon(b)
}
