//! Prompts sent to the OCR model.
//!
//! DeepSeek-OCR switches modes on the prompt alone: the `<|grounding|>`
//! token asks for `<|ref|>`/`<|det|>` region markup, while the plain
//! free-OCR prompt returns flat text. Callers can override both via
//! [`crate::config::ConversionConfig`]; these constants are the defaults.

/// Grounded extraction: one announcement plus content per text region.
pub const GROUNDED_PROMPT: &str = "<|grounding|>Extract text with bounding boxes.";

/// Free-form OCR used when grounded extraction fails.
pub const FREE_OCR_PROMPT: &str = "Free OCR.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grounded_prompt_requests_grounding() {
        assert!(GROUNDED_PROMPT.starts_with("<|grounding|>"));
        assert!(!FREE_OCR_PROMPT.contains("<|grounding|>"));
    }
}
