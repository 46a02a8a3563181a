//! Background conversion tasks with progress and cooperative cancellation.
//!
//! [`ConversionTask::submit`] starts a conversion on the Tokio runtime and
//! returns immediately. The returned [`ConversionHandle`] carries the
//! progress channel, the cancellation token, and the eventual result, so a
//! host (terminal, GUI, server) never blocks its own thread on OCR.
//!
//! Cancellation is cooperative: it is observed before each recognition
//! request and before each page is committed. A request already in flight
//! runs to completion or timeout; its page is then discarded and no output
//! file is written.
//!
//! # Example
//!
//! ```rust,no_run
//! use searchable_pdf::{ConversionConfig, ConversionTask};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut handle = ConversionTask::submit("scan.pdf", ConversionConfig::default());
//! while let Some(event) = handle.next_event().await {
//!     println!("[{}/{}] {}", event.current, event.total, event.message);
//! }
//! let report = handle.wait().await?;
//! println!("wrote {}", report.output.display());
//! # Ok(())
//! # }
//! ```

use crate::config::ConversionConfig;
use crate::convert::convert_to_file;
use crate::error::SearchablePdfError;
use crate::output::ConversionReport;
use crate::pipeline::input::output_path_for;
use crate::progress::ProgressEvent;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Shared flag checked by the pipeline between blocking steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Entry point for background conversions.
pub struct ConversionTask;

impl ConversionTask {
    /// Convert `input` to its default sibling output (`scan.pdf` → `scan_ocr.pdf`).
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(input: impl Into<PathBuf>, config: ConversionConfig) -> ConversionHandle {
        let input = input.into();
        let output = output_path_for(&input, &config.output_suffix);
        Self::submit_to(input, output, config)
    }

    /// Convert `input` and write the result to `output`.
    pub fn submit_to(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        config: ConversionConfig,
    ) -> ConversionHandle {
        let (tx, rx) = unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let input = input.into();
        let output = output.into();

        let join = tokio::spawn(async move {
            convert_to_file(&input, &output, &config, Arc::new(tx), token).await
        });

        ConversionHandle {
            events: Some(rx),
            cancel,
            join,
        }
    }
}

/// A running conversion.
pub struct ConversionHandle {
    events: Option<UnboundedReceiver<ProgressEvent>>,
    cancel: CancellationToken,
    join: JoinHandle<Result<ConversionReport, SearchablePdfError>>,
}

impl ConversionHandle {
    /// Next progress event; `None` once the conversion has finished (or the
    /// stream was taken).
    pub async fn next_event(&mut self) -> Option<ProgressEvent> {
        match self.events.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }

    /// Take the progress events as a `Stream`. Returns `None` if already taken.
    pub fn progress_stream(&mut self) -> Option<UnboundedReceiverStream<ProgressEvent>> {
        self.events.take().map(UnboundedReceiverStream::new)
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A clone of the token, e.g. for a Ctrl-C handler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the conversion to finish.
    pub async fn wait(self) -> Result<ConversionReport, SearchablePdfError> {
        self.join
            .await
            .map_err(|e| SearchablePdfError::Internal(format!("Conversion task panicked: {}", e)))?
    }
}
