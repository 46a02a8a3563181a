//! OCR client: the only stage with network I/O.
//!
//! Talks to Ollama's native API directly:
//!
//! * `GET  /api/tags`     model catalog, used by the availability check
//! * `POST /api/generate` one streamed recognition per attempt
//!
//! ## Why stream?
//!
//! A non-streamed request gives no signal until generation ends, so a model
//! stuck in a repetition loop burns the whole wall-clock budget. Streaming
//! lets [`RepeatDetector`] see the tail of the output as it is produced and
//! abort within a few hundred tokens. It also makes a stalled backend
//! visible through the per-chunk timeout long before the hard deadline.
//!
//! ## Connection release
//!
//! The response body stream is owned by [`collect_stream`] and dropped on
//! every return path, which closes the HTTP connection. Ollama stops
//! generating when its client disconnects, so the next attempt never queues
//! behind an abandoned one.

use crate::config::ConversionConfig;
use crate::error::{OcrError, TimeoutKind};
use crate::pipeline::hallucination::RepeatDetector;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::pin::pin;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Longest error body kept from a failed HTTP response.
const MAX_ERROR_BODY: usize = 512;

/// Prompt mode of one recognition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptMode {
    /// Region markup with bounding boxes.
    Grounded,
    /// Plain text.
    Free,
}

/// One try at recognising a page.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrAttempt {
    pub mode: AttemptMode,
    pub prompt: String,
    /// Wall-clock budget, measured from request start.
    pub timeout: Duration,
}

impl OcrAttempt {
    pub fn grounded(config: &ConversionConfig) -> Self {
        Self {
            mode: AttemptMode::Grounded,
            prompt: config.grounded_prompt.clone(),
            timeout: config.grounded_timeout(),
        }
    }

    pub fn fallback(config: &ConversionConfig) -> Self {
        Self {
            mode: AttemptMode::Free,
            prompt: config.free_prompt.clone(),
            timeout: config.fallback_timeout(),
        }
    }
}

/// Anything that can turn a page image into raw model output.
///
/// [`OllamaClient`] is the production implementation; tests drive the
/// escalation controller with scripted fakes.
pub trait Recognizer: Send + Sync {
    /// Run one attempt on a base64-encoded JPEG and return the raw text.
    fn recognize(
        &self,
        image_b64: &str,
        attempt: &OcrAttempt,
        attempt_id: u32,
    ) -> impl Future<Output = Result<String, OcrError>> + Send;
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: [&'a str; 1],
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_ctx: u32,
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateChunk {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

// ── Client ───────────────────────────────────────────────────────────────

/// HTTP client for an Ollama-hosted OCR model.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    context_window: u32,
    max_output_tokens: u32,
    chunk_timeout: Duration,
    availability_timeout: Duration,
}

impl OllamaClient {
    pub fn new(config: &ConversionConfig) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OcrError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.service_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            context_window: config.context_window,
            max_output_tokens: config.max_output_tokens,
            chunk_timeout: config.chunk_timeout(),
            availability_timeout: Duration::from_secs(config.availability_timeout_secs),
        })
    }

    /// Model name sent with each request.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Use an exact catalog name, typically the one returned by
    /// [`check_availability`](Self::check_availability).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Query the model catalog and return the first name containing the
    /// configured model substring.
    pub async fn check_availability(&self) -> Result<String, OcrError> {
        let url = format!("{}/api/tags", self.base_url);
        debug!("Checking OCR service at {}", url);

        let response = self
            .http
            .get(&url)
            .timeout(self.availability_timeout)
            .send()
            .await
            .map_err(|e| OcrError::ServiceUnreachable {
                url: self.base_url.clone(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OcrError::ServiceStatus {
                status,
                body: truncate(body),
            });
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Service(format!("unreadable model catalog: {e}")))?;
        let names: Vec<String> = tags.models.into_iter().map(|m| m.name).collect();

        match match_model(&names, &self.model) {
            Some(name) => {
                info!("OCR model available: {}", name);
                Ok(name.to_string())
            }
            None => Err(OcrError::ModelNotFound {
                model: self.model.clone(),
                available: names,
            }),
        }
    }

    fn map_send_error(&self, e: reqwest::Error) -> OcrError {
        if e.is_connect() {
            OcrError::ServiceUnreachable {
                url: self.base_url.clone(),
                reason: e.to_string(),
            }
        } else {
            OcrError::Transport(e.to_string())
        }
    }
}

impl Recognizer for OllamaClient {
    async fn recognize(
        &self,
        image_b64: &str,
        attempt: &OcrAttempt,
        attempt_id: u32,
    ) -> Result<String, OcrError> {
        let started = Instant::now();
        let deadline = started + attempt.timeout;
        let body = GenerateRequest {
            model: &self.model,
            prompt: &attempt.prompt,
            images: [image_b64],
            stream: true,
            options: GenerateOptions {
                num_ctx: self.context_window,
                num_predict: self.max_output_tokens,
                temperature: 0.0,
            },
        };

        debug!(
            "Attempt {}: {:?} request to {} (budget {:?})",
            attempt_id, attempt.mode, self.model, attempt.timeout
        );

        let send = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send();

        // The deadline covers connect and response headers too.
        let response = match timeout_at(deadline, send).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => return Err(self.map_send_error(e)),
            Err(_) => {
                return Err(OcrError::InferenceTimeout {
                    attempt: attempt_id,
                    kind: TimeoutKind::Deadline,
                    elapsed: started.elapsed(),
                })
            }
        };

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = match timeout_at(deadline, response.text()).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            };
            return Err(OcrError::ServiceStatus {
                status,
                body: truncate(body),
            });
        }

        let text = collect_stream(
            response.bytes_stream(),
            started,
            deadline,
            self.chunk_timeout,
            attempt_id,
        )
        .await?;

        debug!(
            "Attempt {}: {} chars in {:?}",
            attempt_id,
            text.chars().count(),
            started.elapsed()
        );
        Ok(text)
    }
}

/// First catalog name that contains `needle`, in catalog order.
pub fn match_model<'a>(names: &'a [String], needle: &str) -> Option<&'a str> {
    names
        .iter()
        .find(|name| name.contains(needle))
        .map(String::as_str)
}

/// Consume an NDJSON generate stream into the concatenated `response` text.
///
/// Stops at a `done` chunk or when the stream closes. Each read waits at
/// most `chunk_timeout`, clipped to the remaining time before `deadline`.
pub(crate) async fn collect_stream<S, B, E>(
    stream: S,
    started: Instant,
    deadline: Instant,
    chunk_timeout: Duration,
    attempt_id: u32,
) -> Result<String, OcrError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = pin!(stream);
    let mut detector = RepeatDetector::default();
    let mut text = String::new();
    let mut pending: Vec<u8> = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (wait, kind) = if remaining <= chunk_timeout {
            (remaining, TimeoutKind::Deadline)
        } else {
            (chunk_timeout, TimeoutKind::ChunkStall)
        };

        let item = match timeout(wait, stream.next()).await {
            Ok(item) => item,
            Err(_) => {
                warn!("Attempt {}: {} after {:?}", attempt_id, kind, started.elapsed());
                return Err(OcrError::InferenceTimeout {
                    attempt: attempt_id,
                    kind,
                    elapsed: started.elapsed(),
                });
            }
        };

        let bytes = match item {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return Err(OcrError::Transport(e.to_string())),
            None => break,
        };

        // A stream that is always ready never reaches the timer above.
        if Instant::now() >= deadline {
            warn!("Attempt {}: {} after {:?}", attempt_id, TimeoutKind::Deadline, started.elapsed());
            return Err(OcrError::InferenceTimeout {
                attempt: attempt_id,
                kind: TimeoutKind::Deadline,
                elapsed: started.elapsed(),
            });
        }

        pending.extend_from_slice(bytes.as_ref());
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = pending.drain(..=pos).collect();
            if apply_line(&line, &mut text, &mut detector, attempt_id)? {
                return Ok(text);
            }
        }
    }

    // Stream closed; the final line may lack its newline.
    apply_line(&pending, &mut text, &mut detector, attempt_id)?;
    Ok(text)
}

/// Apply one NDJSON line. Returns `true` once the generation is done.
fn apply_line(
    line: &[u8],
    text: &mut String,
    detector: &mut RepeatDetector,
    attempt_id: u32,
) -> Result<bool, OcrError> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(false);
    }

    let chunk: GenerateChunk = serde_json::from_slice(line)
        .map_err(|e| OcrError::Transport(format!("malformed stream chunk: {e}")))?;

    if let Some(err) = chunk.error {
        return Err(OcrError::Service(err));
    }

    if !chunk.response.is_empty() {
        text.push_str(&chunk.response);
        if let Some(rep) = detector.push(&chunk.response) {
            warn!(
                "Attempt {}: aborting stream, {:?} repeated {} times",
                attempt_id, rep.pattern, rep.repeats
            );
            return Err(OcrError::HallucinationDetected {
                attempt: attempt_id,
                pattern: rep.pattern,
                repeats: rep.repeats,
            });
        }
    }

    Ok(chunk.done)
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}
