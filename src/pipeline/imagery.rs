//! Page imagery: choose the background raster for each output page.
//!
//! A scanned PDF page is usually one full-page image. Re-using that image
//! keeps the scanner's native resolution and avoids a lossy re-render.
//! Small embedded images (logos, stamps, thumbnails) are not scans, so a
//! height threshold decides between the embedded image and a fresh render.

use crate::config::ConversionConfig;
use crate::error::SearchablePdfError;
use image::DynamicImage;
use serde::Serialize;
use tracing::debug;

/// Read access to the pages of a source document.
pub trait SourceDocument {
    fn page_count(&self) -> usize;

    /// Raster images embedded on page `index` (0-based). Images that cannot
    /// be decoded are left out.
    fn embedded_images(&self, index: usize) -> Result<Vec<DynamicImage>, SearchablePdfError>;

    /// Rasterise page `index` at `scale` pixels per point.
    fn render_page(&self, index: usize, scale: f32) -> Result<DynamicImage, SearchablePdfError>;
}

/// Where a page background came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundSource {
    Embedded,
    Rendered,
}

/// The chosen background of one page.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: DynamicImage,
    pub source: BackgroundSource,
}

/// Index of the embedded image with the largest pixel area. Ties keep the
/// first in page order.
pub fn select_background(images: &[DynamicImage]) -> Option<usize> {
    images
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, u64)>, (i, img)| {
            let area = img.width() as u64 * img.height() as u64;
            match best {
                Some((_, best_area)) if best_area >= area => best,
                _ => Some((i, area)),
            }
        })
        .map(|(i, _)| i)
}

/// Produce the background for page `index` (0-based).
pub fn page_background<S: SourceDocument + ?Sized>(
    doc: &S,
    index: usize,
    config: &ConversionConfig,
) -> Result<PageImage, SearchablePdfError> {
    let mut images = doc.embedded_images(index)?;

    if let Some(best) = select_background(&images) {
        let img = images.swap_remove(best);
        if img.height() > config.min_embedded_height {
            debug!(
                "Page {}: using embedded image {}x{}",
                index + 1,
                img.width(),
                img.height()
            );
            return Ok(PageImage {
                image: img,
                source: BackgroundSource::Embedded,
            });
        }
        debug!(
            "Page {}: largest embedded image is only {}px tall, rendering",
            index + 1,
            img.height()
        );
    }

    let image = doc.render_page(index, config.render_scale())?;
    if image.width() == 0 || image.height() == 0 {
        return Err(SearchablePdfError::PageReconstructionFailed {
            page: index + 1,
            detail: "rendered page is empty".into(),
        });
    }
    debug!(
        "Page {}: rendered at {} DPI → {}x{}",
        index + 1,
        config.render_dpi,
        image.width(),
        image.height()
    );
    Ok(PageImage {
        image,
        source: BackgroundSource::Rendered,
    })
}
