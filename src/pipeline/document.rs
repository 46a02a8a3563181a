//! pdfium-backed source reading and output writing.
//!
//! ## Why is this the only module that names pdfium?
//!
//! The rest of the pipeline works through [`SourceDocument`] and
//! [`ArtifactWriter`] so it can be tested with in-memory fakes. Everything
//! here is blocking and must run on a `spawn_blocking` thread: pdfium keeps
//! global state and is not safe to drive from Tokio worker threads.

use crate::error::SearchablePdfError;
use crate::fonts::FontRegistry;
use crate::pipeline::imagery::SourceDocument;
use crate::pipeline::layout::{ArtifactWriter, ComposedPage};
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bind to a pdfium library.
///
/// Tries `explicit`, then `PDFIUM_LIB_PATH`, then the executable's
/// directory and the working directory, then the system library.
/// A path may name the library file itself or the directory holding it.
pub fn bind_pdfium(explicit: Option<&Path>) -> Result<Pdfium, SearchablePdfError> {
    let configured = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from));

    if let Some(path) = configured {
        let lib = if path.is_dir() {
            Pdfium::pdfium_platform_library_name_at_path(&path)
        } else {
            path
        };
        let bindings = Pdfium::bind_to_library(&lib).map_err(|e| {
            SearchablePdfError::PdfiumBindingFailed(format!("{}: {}", lib.display(), e))
        })?;
        debug!("Bound pdfium from {}", lib.display());
        return Ok(Pdfium::new(bindings));
    }

    let mut candidates = Vec::new();
    if let Some(dir) = std::env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) {
        candidates.push(Pdfium::pdfium_platform_library_name_at_path(&dir));
    }
    candidates.push(Pdfium::pdfium_platform_library_name_at_path("./"));

    for lib in &candidates {
        if let Ok(bindings) = Pdfium::bind_to_library(lib) {
            debug!("Bound pdfium from {}", lib.display());
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library()
        .map_err(|e| SearchablePdfError::PdfiumBindingFailed(e.to_string()))?;
    Ok(Pdfium::new(bindings))
}

// ── Source ───────────────────────────────────────────────────────────────

/// An opened input PDF.
pub struct PdfiumSource<'a> {
    document: PdfDocument<'a>,
}

impl<'a> PdfiumSource<'a> {
    pub fn open(pdfium: &'a Pdfium, path: &Path) -> Result<Self, SearchablePdfError> {
        let document = pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| SearchablePdfError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
        info!("PDF loaded: {} pages", document.pages().len());
        Ok(Self { document })
    }

    fn page(&self, index: usize) -> Result<PdfPage<'_>, SearchablePdfError> {
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| SearchablePdfError::PageReconstructionFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })
    }
}

impl SourceDocument for PdfiumSource<'_> {
    fn page_count(&self) -> usize {
        self.document.pages().len() as usize
    }

    fn embedded_images(&self, index: usize) -> Result<Vec<DynamicImage>, SearchablePdfError> {
        let page = self.page(index)?;
        let mut images = Vec::new();
        for object in page.objects().iter() {
            let Some(image_object) = object.as_image_object() else {
                continue;
            };
            match image_object.get_raw_image() {
                Ok(img) => images.push(img),
                Err(e) => debug!("Page {}: skipping undecodable image: {:?}", index + 1, e),
            }
        }
        Ok(images)
    }

    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, SearchablePdfError> {
        let page = self.page(index)?;
        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            SearchablePdfError::PageReconstructionFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            }
        })?;
        Ok(bitmap.as_image())
    }
}

// ── Writer ───────────────────────────────────────────────────────────────

/// Builds the searchable output PDF page by page.
pub struct PdfiumWriter<'a> {
    document: PdfDocument<'a>,
    font: PdfFontToken,
    pages: usize,
}

impl<'a> PdfiumWriter<'a> {
    /// Start an empty document with `fonts`' face embedded for the text layer.
    pub fn new(pdfium: &'a Pdfium, fonts: &FontRegistry) -> Result<Self, SearchablePdfError> {
        let mut document = pdfium
            .create_new_pdf()
            .map_err(|e| SearchablePdfError::Internal(format!("create document: {:?}", e)))?;
        let font = document
            .fonts_mut()
            .load_true_type_from_bytes(fonts.bytes(), true)
            .map_err(|e| {
                SearchablePdfError::Internal(format!(
                    "embed font {}: {:?}",
                    fonts.path().display(),
                    e
                ))
            })?;
        Ok(Self {
            document,
            font,
            pages: 0,
        })
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    /// Write the document next to `output` and move it into place.
    ///
    /// The temporary file lives in the target directory so the final rename
    /// never crosses filesystems.
    pub fn save(self, output: &Path) -> Result<(), SearchablePdfError> {
        let write_err = |detail: String| SearchablePdfError::OutputWriteFailed {
            path: output.to_path_buf(),
            detail,
        };

        let dir = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| write_err(e.to_string()))?;

        let tmp = tempfile::Builder::new()
            .prefix(".searchable-pdf-")
            .suffix(".pdf")
            .tempfile_in(&dir)
            .map_err(|e| write_err(e.to_string()))?;

        self.document
            .save_to_file(tmp.path())
            .map_err(|e| write_err(format!("{:?}", e)))?;

        tmp.persist(output).map_err(|e| write_err(e.error.to_string()))?;
        info!("Wrote {} pages to {}", self.pages, output.display());
        Ok(())
    }

    fn page_error(&self, detail: impl std::fmt::Debug) -> SearchablePdfError {
        SearchablePdfError::PageReconstructionFailed {
            page: self.pages + 1,
            detail: format!("{:?}", detail),
        }
    }
}

impl ArtifactWriter for PdfiumWriter<'_> {
    fn add_page(&mut self, composed: &ComposedPage) -> Result<(), SearchablePdfError> {
        let width = PdfPoints::new(composed.width_pt);
        let height = PdfPoints::new(composed.height_pt);

        let mut page = self
            .document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::Custom(width, height))
            .map_err(|e| self.page_error(e))?;
        page.set_content_regeneration_strategy(PdfPageContentRegenerationStrategy::AutomaticOnDrop);

        page.objects_mut()
            .create_image_object(
                PdfPoints::ZERO,
                PdfPoints::ZERO,
                &composed.background,
                Some(width),
                Some(height),
            )
            .map_err(|e| self.page_error(e))?;

        let mut skipped = 0usize;
        for placement in &composed.text {
            let object = PdfPageTextObject::new(
                &self.document,
                &placement.text,
                self.font,
                PdfPoints::new(placement.font_size),
            )
            .and_then(|mut obj| {
                obj.set_render_mode(PdfPageTextRenderMode::Invisible)?;
                obj.translate(PdfPoints::new(placement.x), PdfPoints::new(placement.y))?;
                Ok(obj)
            });

            match object {
                Ok(obj) => {
                    page.objects_mut()
                        .add_text_object(obj)
                        .map_err(|e| self.page_error(e))?;
                }
                Err(e) => {
                    skipped += 1;
                    debug!("Page {}: text object rejected: {:?}", self.pages + 1, e);
                }
            }
        }
        if skipped > 0 {
            warn!("Page {}: {} text lines could not be added", self.pages + 1, skipped);
        }

        self.pages += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::TextPlacement;

    #[test]
    fn missing_explicit_library_is_reported() {
        match bind_pdfium(Some(Path::new("/no/such/libpdfium.so"))) {
            Err(SearchablePdfError::PdfiumBindingFailed(msg)) => {
                assert!(msg.contains("/no/such/libpdfium.so"), "got: {msg}")
            }
            Err(other) => panic!("unexpected: {other}"),
            Ok(_) => panic!("bound a library that does not exist"),
        }
    }

    /// Writes and re-reads a page when a pdfium library and a font are
    /// available on the host; otherwise there is nothing to exercise.
    #[test]
    fn written_page_has_background_and_invisible_text() {
        let Ok(pdfium) = bind_pdfium(None) else {
            println!("SKIP: pdfium not available");
            return;
        };
        let Ok(fonts) = FontRegistry::load(&crate::config::default_font_candidates()) else {
            println!("SKIP: no system font");
            return;
        };

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("page_ocr.pdf");

        let mut writer = PdfiumWriter::new(&pdfium, &fonts).unwrap();
        writer
            .add_page(&ComposedPage {
                width_pt: 400.0,
                height_pt: 600.0,
                background: DynamicImage::new_rgb8(400, 600),
                text: vec![
                    TextPlacement {
                        x: 20.0,
                        y: 500.0,
                        font_size: 12.0,
                        text: "Searchable words".into(),
                    },
                    TextPlacement {
                        x: 20.0,
                        y: 300.0,
                        font_size: 10.0,
                        text: "Second line".into(),
                    },
                ],
            })
            .unwrap();
        assert_eq!(writer.page_count(), 1);
        writer.save(&out).unwrap();

        let reopened = PdfiumSource::open(&pdfium, &out).unwrap();
        assert_eq!(reopened.page_count(), 1);
        let page = reopened.page(0).unwrap();
        assert!((page.width().value - 400.0).abs() < 0.5);
        assert!((page.height().value - 600.0).abs() < 0.5);
        let text = page.text().unwrap().all();
        assert!(text.contains("Searchable"), "got: {text}");

        let modes: Vec<PdfPageTextRenderMode> = page
            .objects()
            .iter()
            .filter_map(|object| object.as_text_object().map(|t| t.render_mode()))
            .collect();
        assert_eq!(modes.len(), 2, "one text object per placement");
        assert!(modes.iter().all(|m| *m == PdfPageTextRenderMode::Invisible), "got: {modes:?}");

        let images = page
            .objects()
            .iter()
            .filter(|object| object.as_image_object().is_some())
            .count();
        assert_eq!(images, 1, "background drawn once");
    }
}
