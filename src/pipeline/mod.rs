//! Pipeline stages for scanned-PDF to searchable-PDF conversion.
//!
//! Each submodule implements one step. Only [`document`] touches pdfium and
//! only [`client`] touches the network; everything else is pure and tested
//! in isolation.
//!
//! ## Data Flow
//!
//! ```text
//! input ─▶ imagery ─▶ encode ─▶ escalation ─▶ layout ─▶ document
//! (%PDF)   (bg pick)  (JPEG)    │  client       (fit)     (write)
//!                               │  hallucination
//!                               └▶ parse
//! ```
//!
//! 1. [`input`]      validate the source file and derive the output path
//! 2. [`imagery`]    pick the embedded scan or render the page
//! 3. [`encode`]     JPEG-encode and base64-wrap the OCR copy
//! 4. [`escalation`] grounded attempt, cooldown, one fallback
//! 5. [`client`]     streamed Ollama requests with early loop detection
//!    ([`hallucination`])
//! 6. [`parse`]      region markup → normalised regions
//! 7. [`layout`]     font-size search and wrapping into page points
//! 8. [`document`]   pdfium reader and writer

pub mod client;
pub mod document;
pub mod encode;
pub mod escalation;
pub mod hallucination;
pub mod imagery;
pub mod input;
pub mod layout;
pub mod parse;
