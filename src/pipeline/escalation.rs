//! Per-page escalation: grounded attempt, cooldown, one free-text fallback.
//!
//! ```text
//! Grounded ──ok──────────────────────────────▶ Recognized(regions)
//!    │ err (timeout / hallucination / service)
//!    ▼
//! Cooldown ──sleep──▶ Fallback ──ok, regions──▶ Recognized(regions)
//!                        │ ok, no regions, text ▶ Degraded(raw)
//!                        │ ok, blank ──────────▶ Empty
//!                        └ err ────────────────▶ Empty
//! ```
//!
//! No error ever leaves this module except cancellation: a page that cannot
//! be recognised becomes a page without a text layer, and the document
//! carries on. There is exactly one fallback per page.

use crate::config::ConversionConfig;
use crate::error::{OcrError, SearchablePdfError};
use crate::pipeline::client::{OcrAttempt, Recognizer};
use crate::pipeline::parse::{parse_with, Region};
use crate::progress::{ProgressEvent, ProgressObserver};
use crate::task::CancellationToken;
use serde::Serialize;
use tracing::{debug, info, warn};

/// What recognition produced for one page.
#[derive(Debug, Clone, PartialEq)]
pub enum PageOutcome {
    /// Positioned regions, in model output order.
    Recognized(Vec<Region>),
    /// Text without positions; laid out as flowing blocks.
    Degraded(String),
    /// No text layer.
    Empty,
}

impl PageOutcome {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            PageOutcome::Recognized(_) => OutcomeKind::Recognized,
            PageOutcome::Degraded(_) => OutcomeKind::Degraded,
            PageOutcome::Empty => OutcomeKind::Empty,
        }
    }
}

/// Outcome tag used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    Recognized,
    Degraded,
    Empty,
}

/// Result of the escalation for one page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageRecognition {
    pub outcome: PageOutcome,
    /// Recognition requests issued (1 or 2).
    pub attempts: u32,
}

/// Observes OCR inputs and raw outputs, e.g. to dump them for inspection.
pub trait DebugHook: Send + Sync {
    fn on_ocr_input(&self, _page_num: usize, _attempt: &OcrAttempt, _image_b64: &str) {}
    fn on_raw_response(&self, _page_num: usize, _attempt: &OcrAttempt, _raw: &str) {}
}

enum State {
    Grounded,
    Cooldown(OcrError),
    Fallback,
    Done(PageOutcome),
}

/// Drives a [`Recognizer`] through the escalation policy for one page at a time.
pub struct EscalationController<'a, R: Recognizer> {
    recognizer: &'a R,
    config: &'a ConversionConfig,
    observer: &'a dyn ProgressObserver,
    cancel: &'a CancellationToken,
    hook: Option<&'a dyn DebugHook>,
}

impl<'a, R: Recognizer> EscalationController<'a, R> {
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

    /// Recognise one page. `page_num` is 1-based.
    ///
    /// Only [`SearchablePdfError::Cancelled`] is returned as an error.
    pub async fn recognize_page(
        &self,
        page_num: usize,
        total: usize,
        image_b64: &str,
    ) -> Result<PageRecognition, SearchablePdfError> {
        let mut attempts = 0u32;
        let mut state = State::Grounded;

        loop {
            state = match state {
                State::Grounded => {
                    self.ensure_active()?;
                    attempts += 1;
                    let attempt = OcrAttempt::grounded(self.config);
                    match self.attempt(page_num, &attempt, attempts, image_b64).await {
                        Ok(raw) => {
                            let regions = parse_with(&raw, self.config.bbox_order);
                            debug!("Page {}: grounded attempt found {} regions", page_num, regions.len());
                            State::Done(PageOutcome::Recognized(regions))
                        }
                        Err(e) => State::Cooldown(e),
                    }
                }

                State::Cooldown(err) => {
                    warn!("Page {}: grounded OCR failed: {}", page_num, err);
                    self.emit(
                        page_num,
                        total,
                        format!(
                            "Page {page_num}/{total}: {}, retrying with free OCR...",
                            err.label()
                        ),
                    );
                    tokio::time::sleep(self.config.cooldown()).await;
                    State::Fallback
                }

                State::Fallback => {
                    self.ensure_active()?;
                    attempts += 1;
                    let attempt = OcrAttempt::fallback(self.config);
                    match self.attempt(page_num, &attempt, attempts, image_b64).await {
                        Ok(raw) => State::Done(self.classify_fallback(page_num, raw)),
                        Err(e) => {
                            warn!("Page {}: fallback OCR failed, page left without text: {}", page_num, e);
                            self.emit(
                                page_num,
                                total,
                                format!("Page {page_num}/{total}: OCR failed ({}), no text layer", e.label()),
                            );
                            State::Done(PageOutcome::Empty)
                        }
                    }
                }

                State::Done(outcome) => {
                    return Ok(PageRecognition { outcome, attempts });
                }
            };
        }
    }

    async fn attempt(
        &self,
        page_num: usize,
        attempt: &OcrAttempt,
        attempt_id: u32,
        image_b64: &str,
    ) -> Result<String, OcrError> {
        if let Some(hook) = self.hook {
            hook.on_ocr_input(page_num, attempt, image_b64);
        }
        let raw = self
            .recognizer
            .recognize(image_b64, attempt, attempt_id)
            .await?;
        if let Some(hook) = self.hook {
            hook.on_raw_response(page_num, attempt, &raw);
        }
        Ok(raw)
    }

    fn classify_fallback(&self, page_num: usize, raw: String) -> PageOutcome {
        let regions = parse_with(&raw, self.config.bbox_order);
        if !regions.is_empty() {
            info!("Page {}: fallback returned {} regions", page_num, regions.len());
            PageOutcome::Recognized(regions)
        } else if raw.trim().is_empty() {
            info!("Page {}: fallback returned no text", page_num);
            PageOutcome::Empty
        } else {
            warn!(
                "Page {}: no region markup in fallback output, using unpositioned text ({} chars)",
                page_num,
                raw.chars().count()
            );
            PageOutcome::Degraded(raw.trim().to_string())
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TimeoutKind;
    use crate::pipeline::client::AttemptMode;
    use crate::progress::NoopProgress;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Scripted {
        replies: Mutex<VecDeque<Result<String, OcrError>>>,
        calls: Mutex<Vec<OcrAttempt>>,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, OcrError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<OcrAttempt> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Recognizer for Scripted {
        async fn recognize(
            &self,
            _image_b64: &str,
            attempt: &OcrAttempt,
            _attempt_id: u32,
        ) -> Result<String, OcrError> {
            self.calls.lock().unwrap().push(attempt.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(OcrError::Service("script exhausted".into())))
        }
    }

    fn timeout_err() -> OcrError {
        OcrError::InferenceTimeout {
            attempt: 1,
            kind: TimeoutKind::Deadline,
            elapsed: Duration::from_secs(60),
        }
    }

    const MARKUP: &str = "<|ref|>text<|/ref|><|det|>[[100, 100, 900, 200]]<|/det|>\nHello";

    async fn run(script: &Scripted, cancel: &CancellationToken) -> Result<PageRecognition, SearchablePdfError> {
        let config = ConversionConfig::default();
        EscalationController::new(script, &config, &NoopProgress, cancel)
            .recognize_page(1, 3, "QUJD")
            .await
    }

    #[tokio::test]
    async fn grounded_success_needs_one_attempt() {
        let script = Scripted::new(vec![Ok(MARKUP.to_string())]);
        let rec = run(&script, &CancellationToken::new()).await.unwrap();
        assert_eq!(rec.attempts, 1);
        match rec.outcome {
            PageOutcome::Recognized(regions) => assert_eq!(regions[0].text, "Hello"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(script.calls()[0].mode, AttemptMode::Grounded);
    }

    #[tokio::test]
    async fn grounded_success_without_regions_is_still_recognized() {
        let script = Scripted::new(vec![Ok("plain words".to_string())]);
        let rec = run(&script, &CancellationToken::new()).await.unwrap();
        assert_eq!(rec.outcome, PageOutcome::Recognized(vec![]));
        assert_eq!(script.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_escalates_once_with_longer_budget_after_cooldown() {
        let script = Scripted::new(vec![Err(timeout_err()), Ok("Some free text".to_string())]);
        let started = Instant::now();
        let rec = run(&script, &CancellationToken::new()).await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(3000));
        let calls = script.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].mode, AttemptMode::Free);
        assert!(calls[1].timeout > calls[0].timeout);
        assert_eq!(rec.attempts, 2);
        assert_eq!(rec.outcome, PageOutcome::Degraded("Some free text".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_failure_yields_empty_without_third_attempt() {
        let script = Scripted::new(vec![
            Err(OcrError::HallucinationDetected {
                attempt: 1,
                pattern: "|".into(),
                repeats: 15,
            }),
            Err(timeout_err()),
            Ok(MARKUP.to_string()),
        ]);
        let rec = run(&script, &CancellationToken::new()).await.unwrap();
        assert_eq!(rec.outcome, PageOutcome::Empty);
        assert_eq!(script.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_blank_is_empty_and_markup_is_recognized() {
        let blank = Scripted::new(vec![Err(timeout_err()), Ok("  \n ".to_string())]);
        assert_eq!(
            run(&blank, &CancellationToken::new()).await.unwrap().outcome,
            PageOutcome::Empty
        );

        let markup = Scripted::new(vec![Err(OcrError::Transport("reset".into())), Ok(MARKUP.to_string())]);
        let rec = run(&markup, &CancellationToken::new()).await.unwrap();
        assert_eq!(rec.outcome.kind(), OutcomeKind::Recognized);
    }

    #[tokio::test]
    async fn cancelled_before_request_makes_no_calls() {
        let script = Scripted::new(vec![Ok(MARKUP.to_string())]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run(&script, &cancel).await.unwrap_err();
        assert!(matches!(err, SearchablePdfError::Cancelled));
        assert!(script.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn escalation_is_reported_through_progress() {
        let script = Scripted::new(vec![Err(timeout_err()), Ok(String::new())]);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ProgressEvent>();
        let config = ConversionConfig::default();
        let cancel = CancellationToken::new();
        EscalationController::new(&script, &config, &tx, &cancel)
            .recognize_page(2, 5, "QUJD")
            .await
            .unwrap();

        let event = rx.try_recv().expect("retry notice");
        assert_eq!((event.current, event.total), (2, 5));
        assert!(event.message.contains("timeout"), "got: {}", event.message);
    }

    #[tokio::test]
    async fn debug_hook_sees_input_and_output() {
        #[derive(Default)]
        struct Recording(Mutex<Vec<String>>);
        impl DebugHook for Recording {
            fn on_ocr_input(&self, page: usize, _: &OcrAttempt, img: &str) {
                self.0.lock().unwrap().push(format!("in:{page}:{img}"));
            }
            fn on_raw_response(&self, page: usize, _: &OcrAttempt, raw: &str) {
                self.0.lock().unwrap().push(format!("out:{page}:{}", raw.len()));
            }
        }

        let hook = Recording::default();
        let script = Scripted::new(vec![Ok("abc".to_string())]);
        let config = ConversionConfig::default();
        let cancel = CancellationToken::new();
        EscalationController::new(&script, &config, &NoopProgress, &cancel)
            .with_hook(&hook)
            .recognize_page(4, 4, "QUJD")
            .await
            .unwrap();
        assert_eq!(*hook.0.lock().unwrap(), vec!["in:4:QUJD", "out:4:3"]);
    }
}
