//! Configuration types for scanned-PDF to searchable-PDF conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. Every knob lives in one struct so a
//! run can be logged, serialised, and reproduced.

use crate::error::SearchablePdfError;
use crate::prompts::{FREE_OCR_PROMPT, GROUNDED_PROMPT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a searchable-PDF conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use searchable_pdf::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .service_url("http://gpu-box:11434")
///     .grounded_timeout_secs(45)
///     .fallback_timeout_secs(240)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Base URL of the Ollama service. Default: `http://localhost:11434`.
    pub service_url: String,

    /// Identifying substring of the OCR model. Default: `deepseek-ocr`.
    ///
    /// The availability check picks the first catalog entry whose name
    /// contains this substring (e.g. `deepseek-ocr:latest`) and that exact
    /// name is used for every recognition request.
    pub model: String,

    /// Prompt for grounded (region + bbox) extraction.
    pub grounded_prompt: String,

    /// Prompt for the free-text fallback.
    pub free_prompt: String,

    /// Wall-clock budget of the grounded attempt in seconds. Default: 60.
    pub grounded_timeout_secs: u64,

    /// Wall-clock budget of the fallback attempt in seconds. Default: 180.
    ///
    /// Must be strictly longer than `grounded_timeout_secs`.
    pub fallback_timeout_secs: u64,

    /// Maximum silence between two stream chunks in seconds. Default: 30.
    pub chunk_timeout_secs: u64,

    /// Pause between a failed grounded attempt and the fallback, in
    /// milliseconds. Default: 3000.
    ///
    /// Gives the inference backend time to release the aborted generation.
    pub cooldown_ms: u64,

    /// Timeout of the model catalog request in seconds. Default: 2.
    pub availability_timeout_secs: u64,

    /// `num_ctx` sent to the model. Default: 8192.
    pub context_window: u32,

    /// `num_predict` sent to the model. Default: 8192.
    pub max_output_tokens: u32,

    /// Rasterisation DPI when no usable embedded scan exists. Default: 300.
    pub render_dpi: u32,

    /// An embedded image is used as the page background only if it is
    /// taller than this many pixels. Default: 1000.
    pub min_embedded_height: u32,

    /// JPEG quality for the OCR request image (1–100). Default: 90.
    pub jpeg_quality: u8,

    /// Downscale the OCR request image so its longest edge fits. Default: None.
    ///
    /// Only the copy sent to the model is resized; the background keeps its
    /// original resolution. Bounding boxes are normalised, so placement is
    /// unaffected.
    pub ocr_max_dimension: Option<u32>,

    /// Coordinate order of the model's bounding boxes. Default: [`BboxOrder::XyXy`].
    pub bbox_order: BboxOrder,

    /// TrueType fonts to try, in order, for the text layer.
    pub font_candidates: Vec<PathBuf>,

    /// Suffix appended to the input file stem. Default: `_ocr`.
    pub output_suffix: String,

    /// Check the model catalog before opening the document. Default: true.
    pub verify_service: bool,

    /// Explicit pdfium library path. `PDFIUM_LIB_PATH` is used when unset.
    pub pdfium_library_path: Option<PathBuf>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            service_url: "http://localhost:11434".to_string(),
            model: "deepseek-ocr".to_string(),
            grounded_prompt: GROUNDED_PROMPT.to_string(),
            free_prompt: FREE_OCR_PROMPT.to_string(),
            grounded_timeout_secs: 60,
            fallback_timeout_secs: 180,
            chunk_timeout_secs: 30,
            cooldown_ms: 3000,
            availability_timeout_secs: 2,
            context_window: 8192,
            max_output_tokens: 8192,
            render_dpi: 300,
            min_embedded_height: 1000,
            jpeg_quality: 90,
            ocr_max_dimension: None,
            bbox_order: BboxOrder::default(),
            font_candidates: default_font_candidates(),
            output_suffix: "_ocr".to_string(),
            verify_service: true,
            pdfium_library_path: None,
        }
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn grounded_timeout(&self) -> Duration {
        Duration::from_secs(self.grounded_timeout_secs)
    }

    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_secs(self.fallback_timeout_secs)
    }

    pub fn chunk_timeout(&self) -> Duration {
        Duration::from_secs(self.chunk_timeout_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Scale factor applied to the page's point space when rasterising.
    pub fn render_scale(&self) -> f32 {
        self.render_dpi as f32 / 72.0
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn service_url(mut self, url: impl Into<String>) -> Self {
        self.config.service_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn grounded_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.grounded_prompt = prompt.into();
        self
    }

    pub fn free_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.free_prompt = prompt.into();
        self
    }

    pub fn grounded_timeout_secs(mut self, secs: u64) -> Self {
        self.config.grounded_timeout_secs = secs.max(1);
        self
    }

    pub fn fallback_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fallback_timeout_secs = secs.max(1);
        self
    }

    pub fn chunk_timeout_secs(mut self, secs: u64) -> Self {
        self.config.chunk_timeout_secs = secs.max(1);
        self
    }

    pub fn cooldown_ms(mut self, ms: u64) -> Self {
        self.config.cooldown_ms = ms;
        self
    }

    pub fn availability_timeout_secs(mut self, secs: u64) -> Self {
        self.config.availability_timeout_secs = secs.max(1);
        self
    }

    pub fn context_window(mut self, n: u32) -> Self {
        self.config.context_window = n;
        self
    }

    pub fn max_output_tokens(mut self, n: u32) -> Self {
        self.config.max_output_tokens = n;
        self
    }

    pub fn render_dpi(mut self, dpi: u32) -> Self {
        self.config.render_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn min_embedded_height(mut self, px: u32) -> Self {
        self.config.min_embedded_height = px;
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn ocr_max_dimension(mut self, px: u32) -> Self {
        self.config.ocr_max_dimension = Some(px.max(64));
        self
    }

    pub fn bbox_order(mut self, order: BboxOrder) -> Self {
        self.config.bbox_order = order;
        self
    }

    /// Replace the candidate font list.
    pub fn font_candidates(mut self, fonts: Vec<PathBuf>) -> Self {
        self.config.font_candidates = fonts;
        self
    }

    /// Try `font` before the built-in candidates.
    pub fn prefer_font(mut self, font: impl Into<PathBuf>) -> Self {
        self.config.font_candidates.insert(0, font.into());
        self
    }

    pub fn output_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.config.output_suffix = suffix.into();
        self
    }

    pub fn verify_service(mut self, v: bool) -> Self {
        self.config.verify_service = v;
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, SearchablePdfError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(SearchablePdfError::InvalidConfig(
                "Model name must not be empty".into(),
            ));
        }
        if c.fallback_timeout_secs <= c.grounded_timeout_secs {
            return Err(SearchablePdfError::InvalidConfig(format!(
                "Fallback timeout ({}s) must be longer than the grounded timeout ({}s)",
                c.fallback_timeout_secs, c.grounded_timeout_secs
            )));
        }
        if c.render_dpi < 72 || c.render_dpi > 600 {
            return Err(SearchablePdfError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.render_dpi
            )));
        }
        if c.output_suffix.is_empty() {
            return Err(SearchablePdfError::InvalidConfig(
                "Output suffix must not be empty (it would overwrite the input)".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Coordinate order inside a `[[a, b, c, d]]` bounding box.
///
/// DeepSeek-OCR builds have been observed emitting both orders, so the
/// convention of the deployed model should be confirmed on a sample page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BboxOrder {
    /// `(xmin, ymin, xmax, ymax)` (default)
    #[default]
    XyXy,
    /// `(ymin, xmin, ymax, xmax)`
    YxYx,
}

/// Fonts tried when the caller supplies none. Wide-coverage faces first so
/// CJK and Hangul text stays searchable.
pub fn default_font_candidates() -> Vec<PathBuf> {
    [
        // Windows
        r"C:\Windows\Fonts\NanumGothic.ttf",
        r"C:\Windows\Fonts\malgun.ttf",
        r"C:\Windows\Fonts\arial.ttf",
        // macOS
        "/Library/Fonts/Arial Unicode.ttf",
        "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
        // Linux
        "/usr/share/fonts/truetype/nanum/NanumGothic.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}
