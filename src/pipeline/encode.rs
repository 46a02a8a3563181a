//! Image encoding: `DynamicImage` → base64 JPEG for the Ollama request body.
//!
//! Ollama's `/api/generate` takes images as bare base64 strings in the
//! `images` array (no data-URI prefix). Scans are photographic greyscale or
//! colour captures, and at 300 DPI a PNG of one page easily reaches tens of
//! megabytes, so a high-quality JPEG keeps request bodies small without
//! hurting recognition.

use crate::error::OcrError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use std::borrow::Cow;
use tracing::debug;

/// Encode a page image as a base64 JPEG ready for the OCR request.
///
/// ## Why convert to RGB first?
/// The JPEG encoder rejects alpha channels and 16-bit samples. Embedded scans
/// come in every pixel format pdfium knows, so everything is normalised to
/// 8-bit RGB before encoding.
///
/// `max_dimension` downscales the request copy only (Lanczos3); the caller's
/// image is untouched.
pub fn encode_for_ocr(
    img: &DynamicImage,
    quality: u8,
    max_dimension: Option<u32>,
) -> Result<String, OcrError> {
    let img: Cow<'_, DynamicImage> = match max_dimension {
        Some(max) if img.width().max(img.height()) > max => {
            debug!(
                "Downscaling OCR input {}x{} to fit {}px",
                img.width(),
                img.height(),
                max
            );
            Cow::Owned(img.resize(max, max, FilterType::Lanczos3))
        }
        _ => Cow::Borrowed(img),
    };

    let rgb = img.to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(|e| OcrError::Encode(e.to_string()))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());
    Ok(b64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgba, RgbaImage};

    fn decode(b64: &str) -> DynamicImage {
        let bytes = STANDARD.decode(b64).expect("valid base64");
        image::load_from_memory(&bytes).expect("valid jpeg")
    }

    #[test]
    fn encodes_rgba_as_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 128])));
        let b64 = encode_for_ocr(&img, 90, None).expect("encode should succeed");
        let bytes = STANDARD.decode(&b64).unwrap();
        // JPEG SOI marker
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(decode(&b64).dimensions(), (10, 10));
    }

    #[test]
    fn downscales_only_when_larger() {
        let img = DynamicImage::new_rgb8(400, 200);
        let small = encode_for_ocr(&img, 80, Some(100)).unwrap();
        assert_eq!(decode(&small).dimensions(), (100, 50));

        let same = encode_for_ocr(&img, 80, Some(1000)).unwrap();
        assert_eq!(decode(&same).dimensions(), (400, 200));
    }

    #[test]
    fn handles_sixteen_bit_luma() {
        let img = DynamicImage::new_luma16(8, 8);
        assert!(encode_for_ocr(&img, 90, None).is_ok());
    }
}
