//! Font resolution for the invisible text layer.
//!
//! The overlay font is never seen, but it still has to (a) cover every
//! character the model returns, otherwise viewers drop or mangle it on copy,
//! and (b) supply real advance widths so wrapped lines match the width of the
//! scanned text they sit on. [`FontRegistry`] tries an ordered list of
//! TrueType files and keeps the first one that parses.

use crate::error::{FontError, SearchablePdfError};
use crate::pipeline::layout::TextMeasure;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use ttf_parser::{Face, GlyphId};

/// Advance widths of one face, in font units.
#[derive(Debug, Clone)]
pub struct FontMetrics {
    advances: HashMap<char, u16>,
    units_per_em: u16,
    /// Used for characters the face has no glyph for.
    fallback_advance: u16,
}

impl FontMetrics {
    /// Extract advances for every Basic Multilingual Plane character the face maps.
    pub fn from_face(face: &Face<'_>) -> Self {
        let mut advances = HashMap::new();
        for code in 0u32..=0xFFFF {
            let Some(ch) = char::from_u32(code) else {
                continue;
            };
            if let Some(gid) = face.glyph_index(ch) {
                if let Some(adv) = face.glyph_hor_advance(gid) {
                    advances.insert(ch, adv);
                }
            }
        }

        let units_per_em = face.units_per_em().max(1);
        let fallback_advance = face
            .glyph_hor_advance(GlyphId(0))
            .filter(|&a| a > 0)
            .unwrap_or_else(|| average_advance(&advances, units_per_em));

        Self {
            advances,
            units_per_em,
            fallback_advance,
        }
    }

    pub fn covers(&self, ch: char) -> bool {
        self.advances.contains_key(&ch)
    }

    fn advance(&self, ch: char) -> u16 {
        self.advances
            .get(&ch)
            .copied()
            .unwrap_or(self.fallback_advance)
    }
}

impl TextMeasure for FontMetrics {
    fn text_width(&self, text: &str, font_size: f32) -> f32 {
        let units: u32 = text.chars().map(|c| self.advance(c) as u32).sum();
        units as f32 * font_size / self.units_per_em as f32
    }
}

fn average_advance(advances: &HashMap<char, u16>, units_per_em: u16) -> u16 {
    let nonzero: Vec<u32> = advances
        .values()
        .filter(|&&a| a > 0)
        .map(|&a| a as u32)
        .collect();
    if nonzero.is_empty() {
        units_per_em / 2
    } else {
        (nonzero.iter().sum::<u32>() / nonzero.len() as u32) as u16
    }
}

/// The resolved overlay font: file bytes for embedding plus its metrics.
#[derive(Debug, Clone)]
pub struct FontRegistry {
    path: PathBuf,
    bytes: Arc<Vec<u8>>,
    metrics: Arc<FontMetrics>,
}

impl FontRegistry {
    /// Use the first candidate that can be read and parsed.
    pub fn load(candidates: &[PathBuf]) -> Result<Self, SearchablePdfError> {
        for path in candidates {
            match Self::from_file(path) {
                Ok(registry) => {
                    info!("Using text-layer font: {}", path.display());
                    return Ok(registry);
                }
                Err(reason) => debug!("Skipping font {}: {}", path.display(), reason),
            }
        }
        Err(SearchablePdfError::NoUsableFont {
            tried: candidates.to_vec(),
        })
    }

    fn from_file(path: &Path) -> Result<Self, FontError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(path.to_path_buf(), bytes)
    }

    /// Build from in-memory font data.
    pub fn from_bytes(path: PathBuf, bytes: Vec<u8>) -> Result<Self, FontError> {
        let metrics = {
            let face = Face::parse(&bytes, 0)?;
            FontMetrics::from_face(&face)
        };
        if metrics.advances.is_empty() {
            return Err(FontError::NoCharacters);
        }
        Ok(Self {
            path,
            bytes: Arc::new(bytes),
            metrics: Arc::new(metrics),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw TrueType data to embed in the output document.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn metrics(&self) -> &FontMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_candidates_report_every_path() {
        let tried = vec![
            PathBuf::from("/no/such/NanumGothic.ttf"),
            PathBuf::from("/no/such/arial.ttf"),
        ];
        match FontRegistry::load(&tried) {
            Err(SearchablePdfError::NoUsableFont { tried: t }) => assert_eq!(t, tried),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unparseable_file_is_skipped() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"definitely not a font").unwrap();
        let err = FontRegistry::load(&[f.path().to_path_buf()]).unwrap_err();
        assert!(matches!(err, SearchablePdfError::NoUsableFont { .. }));
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = FontRegistry::from_bytes("junk.ttf".into(), b"not a font".to_vec()).unwrap_err();
        assert!(matches!(err, FontError::Parse(_)), "got: {err}");
    }

    #[test]
    fn unreadable_file_is_an_io_error() {
        let err = FontRegistry::from_file(Path::new("/no/such/font.ttf")).unwrap_err();
        assert!(matches!(err, FontError::Read(_)), "got: {err}");
    }

    #[test]
    fn width_scales_with_size_and_uses_fallback() {
        let metrics = FontMetrics {
            advances: [('a', 500u16), ('W', 1000)].into_iter().collect(),
            units_per_em: 1000,
            fallback_advance: 600,
        };
        assert_eq!(metrics.text_width("aW", 10.0), 15.0);
        assert_eq!(metrics.text_width("aW", 20.0), 30.0);
        // '한' is unmapped.
        assert_eq!(metrics.text_width("한", 10.0), 6.0);
        assert!(!metrics.covers('한'));
    }

    #[test]
    fn average_of_empty_map_is_half_em() {
        assert_eq!(average_advance(&HashMap::new(), 2048), 1024);
    }

    #[test]
    fn system_font_loads_when_present() {
        // Only meaningful on hosts with one of the default fonts installed.
        let candidates = crate::config::default_font_candidates();
        if let Ok(reg) = FontRegistry::load(&candidates) {
            assert!(!reg.bytes().is_empty());
            assert!(reg.metrics().covers('A'));
            assert!(reg.metrics().text_width("Hello", 12.0) > 0.0);
        }
    }
}
