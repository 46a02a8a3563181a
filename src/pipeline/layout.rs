//! Text layout for the invisible overlay.
//!
//! Page space is PDF points with the origin at the bottom-left, and one
//! point per background pixel. Region boxes arrive normalised with a top-left
//! origin, so the y axis flips here.
//!
//! ## Why search for a font size?
//!
//! The text layer is invisible, but its glyph positions drive selection
//! highlighting and search hits in every viewer. Text that spills far past
//! its box highlights the wrong part of the scan. The search below picks
//! the largest size whose wrapped lines roughly fill the detected box.

use crate::error::SearchablePdfError;
use crate::pipeline::escalation::PageOutcome;
use crate::pipeline::parse::Region;
use image::DynamicImage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Smallest font size ever used.
pub const MIN_FONT_SIZE: f32 = 4.0;
/// Lower bound of the initial size guess.
const SEED_MIN_SIZE: f32 = 5.0;
/// Share of the box area a glyph is assumed to cover.
const FILL_FACTOR: f32 = 0.8;
const MAX_SHRINKS: usize = 5;
const SHRINK_FACTOR: f32 = 0.85;
pub const LINE_SPACING: f32 = 1.2;
/// Wrapped text may exceed the box height by this factor.
const HEIGHT_TOLERANCE: f32 = 1.2;

const FALLBACK_MARGIN: f32 = 20.0;
const FALLBACK_FONT_SIZE: f32 = 10.0;

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());

/// Width of a string set in the overlay font.
pub trait TextMeasure {
    fn text_width(&self, text: &str, font_size: f32) -> f32;
}

/// One line of invisible text, baseline-anchored, in page points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPlacement {
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
    pub text: String,
}

/// Greedy word wrap to `max_width`.
///
/// Explicit newlines always break. A word wider than `max_width` sits alone
/// on its own line rather than being split.
pub fn wrap_text<M: TextMeasure + ?Sized>(
    text: &str,
    font_size: f32,
    max_width: f32,
    measure: &M,
) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut words = paragraph.split_whitespace();
        let Some(first) = words.next() else {
            lines.push(String::new());
            continue;
        };
        let mut current = first.to_string();
        for word in words {
            let candidate = format!("{current} {word}");
            if measure.text_width(&candidate, font_size) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            }
        }
        lines.push(current);
    }
    lines
}

/// Pick a font size for `text` in a `box_width` × `box_height` box and
/// return it with the wrapped lines.
///
/// Starts from an area-based guess and shrinks by 15% up to five times
/// until the wrapped block fits within 120% of the box height. The size
/// never drops below [`MIN_FONT_SIZE`].
pub fn fit_font_size<M: TextMeasure + ?Sized>(
    text: &str,
    box_width: f32,
    box_height: f32,
    measure: &M,
) -> (f32, Vec<String>) {
    let chars = text.chars().count().max(1) as f32;
    let seed = (box_width * box_height / (chars * FILL_FACTOR)).sqrt();
    let mut size = seed.max(SEED_MIN_SIZE).min(box_height).max(MIN_FONT_SIZE);

    for _ in 0..MAX_SHRINKS {
        let lines = wrap_text(text, size, box_width, measure);
        let total_height = lines.len() as f32 * size * LINE_SPACING;
        if total_height <= box_height * HEIGHT_TOLERANCE {
            return (size, lines);
        }
        size *= SHRINK_FACTOR;
        if size < MIN_FONT_SIZE {
            size = MIN_FONT_SIZE;
            return (size, wrap_text(text, size, box_width, measure));
        }
    }

    (size, wrap_text(text, size, box_width, measure))
}

/// Lay out one region on a `page_width` × `page_height` page.
///
/// Lines run top-down from one font size below the box top and stop once
/// the baseline falls more than half a font size below the box bottom.
pub fn place_region<M: TextMeasure + ?Sized>(
    region: &Region,
    page_width: f32,
    page_height: f32,
    measure: &M,
) -> Vec<TextPlacement> {
    if region.text.trim().is_empty() {
        return Vec::new();
    }

    let b = &region.bbox;
    let x = b.xmin * page_width;
    let bottom = (1.0 - b.ymax) * page_height;
    let box_width = b.width() * page_width;
    let box_height = b.height() * page_height;
    let top = bottom + box_height;

    let (size, lines) = fit_font_size(&region.text, box_width, box_height, measure);

    let mut placements = Vec::with_capacity(lines.len());
    let mut cursor = top - size;
    for line in lines {
        if cursor < bottom - size * 0.5 {
            break;
        }
        if !line.is_empty() {
            placements.push(TextPlacement {
                x,
                y: cursor,
                font_size: size,
                text: line,
            });
        }
        cursor -= size * LINE_SPACING;
    }
    placements
}

/// Lay out unpositioned text as flowing blocks from the top of the page.
pub fn fallback_layout<M: TextMeasure + ?Sized>(
    raw: &str,
    page_width: f32,
    page_height: f32,
    measure: &M,
) -> Vec<TextPlacement> {
    let line_height = FALLBACK_FONT_SIZE * LINE_SPACING;
    let wrap_width = (page_width - 2.0 * FALLBACK_MARGIN).max(1.0);
    let mut cursor = page_height - FALLBACK_MARGIN;
    let mut placements = Vec::new();

    'blocks: for block in RE_BLANK_LINES.split(raw.trim()) {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        for line in wrap_text(block, FALLBACK_FONT_SIZE, wrap_width, measure) {
            if cursor < FALLBACK_MARGIN {
                break 'blocks;
            }
            if !line.is_empty() {
                placements.push(TextPlacement {
                    x: FALLBACK_MARGIN,
                    y: cursor,
                    font_size: FALLBACK_FONT_SIZE,
                    text: line,
                });
            }
            cursor -= line_height;
        }
        cursor -= line_height * 0.5;
    }
    placements
}

// ── Composition ──────────────────────────────────────────────────────────

/// A finished output page: background plus invisible text, in points.
#[derive(Debug, Clone)]
pub struct ComposedPage {
    pub width_pt: f32,
    pub height_pt: f32,
    pub background: DynamicImage,
    pub text: Vec<TextPlacement>,
}

/// Build the output page for a background and its recognition outcome.
pub fn compose_page<M: TextMeasure + ?Sized>(
    background: DynamicImage,
    outcome: &PageOutcome,
    measure: &M,
) -> ComposedPage {
    let width = background.width() as f32;
    let height = background.height() as f32;

    let text = match outcome {
        PageOutcome::Recognized(regions) => regions
            .iter()
            .flat_map(|r| place_region(r, width, height, measure))
            .collect(),
        PageOutcome::Degraded(raw) => fallback_layout(raw, width, height, measure),
        PageOutcome::Empty => Vec::new(),
    };

    ComposedPage {
        width_pt: width,
        height_pt: height,
        background,
        text,
    }
}

/// Destination for composed pages, committed in source order.
pub trait ArtifactWriter {
    fn add_page(&mut self, page: &ComposedPage) -> Result<(), SearchablePdfError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::parse::BBox;

    /// Every glyph half an em wide.
    struct Mono;

    impl TextMeasure for Mono {
        fn text_width(&self, text: &str, font_size: f32) -> f32 {
            text.chars().count() as f32 * font_size * 0.5
        }
    }

    fn region(text: &str, xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Region {
        Region {
            kind: "text".into(),
            bbox: BBox::normalized(xmin, ymin, xmax, ymax),
            text: text.into(),
        }
    }

    #[test]
    fn wrap_is_greedy_and_keeps_long_words() {
        // 10pt Mono: 5pt per char, 50pt = 10 chars per line.
        let lines = wrap_text("aaa bbb ccc supercalifragilistic d", 10.0, 50.0, &Mono);
        assert_eq!(lines, vec!["aaa bbb", "ccc", "supercalifragilistic", "d"]);
    }

    #[test]
    fn wrap_honours_newlines() {
        let lines = wrap_text("one\ntwo three\n\nfour", 10.0, 1000.0, &Mono);
        assert_eq!(lines, vec!["one", "two three", "", "four"]);
    }

    #[test]
    fn short_text_in_large_box_keeps_seed_size() {
        let (size, lines) = fit_font_size("Title", 400.0, 40.0, &Mono);
        // seed = sqrt(400*40 / 4) = 63.2, clamped to box height 40
        assert_eq!(size, 40.0);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn font_search_never_goes_below_floor() {
        let text = "word ".repeat(500);
        let (size, lines) = fit_font_size(&text, 50.0, 10.0, &Mono);
        assert_eq!(size, MIN_FONT_SIZE);
        assert!(!lines.is_empty());
    }

    #[test]
    fn font_search_stops_after_five_shrinks() {
        // Twenty forced lines would need ~2.5pt, which five shrinks from the
        // seed never reach, so the iteration cap ends the search.
        let text = vec!["x"; 20].join("\n");
        let (size, lines) = fit_font_size(&text, 1000.0, 50.0, &Mono);
        let seed = (1000.0f32 * 50.0 / (39.0 * FILL_FACTOR)).sqrt().min(50.0);
        assert_eq!(lines.len(), 20);
        assert!((size - seed * SHRINK_FACTOR.powi(5)).abs() < 1e-2, "size {size}");
        assert!(size > MIN_FONT_SIZE);
    }

    #[test]
    fn tiny_box_uses_floor() {
        let (size, _) = fit_font_size("abc", 100.0, 2.0, &Mono);
        assert_eq!(size, MIN_FONT_SIZE);
    }

    #[test]
    fn placements_stay_inside_scaled_box() {
        let r = region("Revenue grew by twelve percent over the prior year.", 0.1, 0.2, 0.9, 0.3);
        let (w, h) = (2000.0, 3000.0);
        let placed = place_region(&r, w, h, &Mono);
        assert!(!placed.is_empty());

        let bottom = (1.0 - 0.3) * h;
        let top = (1.0 - 0.2) * h;
        for p in &placed {
            assert!((p.x - 0.1 * w).abs() < 1e-3);
            assert!(p.y <= top - p.font_size + 1e-3, "{p:?}");
            assert!(p.y >= bottom - p.font_size * 0.5 - 1e-3, "{p:?}");
        }
        // Lines descend by 1.2 × font size.
        for pair in placed.windows(2) {
            let step = pair[0].y - pair[1].y;
            assert!((step - pair[0].font_size * LINE_SPACING).abs() < 1e-3);
        }
    }

    #[test]
    fn empty_region_text_is_skipped() {
        assert!(place_region(&region("   ", 0.0, 0.0, 1.0, 1.0), 100.0, 100.0, &Mono).is_empty());
    }

    #[test]
    fn fallback_layout_flows_blocks_with_margins() {
        let raw = "First paragraph line.\n\n  \nSecond paragraph.";
        let placed = fallback_layout(raw, 1000.0, 1000.0, &Mono);
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].y, 980.0);
        assert_eq!(placed[0].x, 20.0);
        assert_eq!(placed[0].font_size, 10.0);
        // One line plus half a line between blocks.
        assert!((placed[0].y - placed[1].y - 18.0).abs() < 1e-3);
    }

    #[test]
    fn fallback_layout_stops_at_bottom_margin() {
        let raw = (0..500).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let placed = fallback_layout(&raw, 600.0, 200.0, &Mono);
        assert!(!placed.is_empty());
        assert!(placed.iter().all(|p| p.y >= 20.0));
        assert!(placed.len() < 20);
    }

    #[test]
    fn compose_sizes_page_to_background() {
        let bg = DynamicImage::new_rgb8(800, 600);
        let outcome = PageOutcome::Recognized(vec![
            region("one", 0.0, 0.0, 0.5, 0.1),
            region("", 0.0, 0.2, 0.5, 0.3),
        ]);
        let page = compose_page(bg, &outcome, &Mono);
        assert_eq!((page.width_pt, page.height_pt), (800.0, 600.0));
        assert_eq!(page.text.len(), 1);

        let empty = compose_page(DynamicImage::new_rgb8(10, 10), &PageOutcome::Empty, &Mono);
        assert!(empty.text.is_empty());
    }
}
