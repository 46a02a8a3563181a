//! Response parsing: grounded OCR markup → positioned [`Region`]s.
//!
//! Grounded output is a sequence of region announcements, each followed by
//! that region's text:
//!
//! ```text
//! <|ref|>title<|/ref|><|det|>[[120, 40, 880, 95]]<|/det|>
//! Annual Report 2023
//! <|ref|>text<|/ref|><|det|>[[120, 110, 880, 400]]<|/det|>
//! Revenue grew by ...
//! ```
//!
//! The scanner below walks the delimiters explicitly instead of relying on a
//! pattern engine. A region's content runs from the end of its announcement
//! to the start of the next announcement (or the end of the text). Parsing
//! never fails: malformed announcements are skipped, and free-form text
//! without markup yields no regions.

use crate::config::BboxOrder;
use serde::{Deserialize, Serialize};

const REF_OPEN: &str = "<|ref|>";
const REF_CLOSE: &str = "<|/ref|>";
const DET_OPEN: &str = "<|det|>";
const DET_CLOSE: &str = "<|/det|>";
const BOX_OPEN: &str = "[[";
const BOX_CLOSE: &str = "]]";

/// Scale of the model's integer coordinates.
const COORD_SCALE: f32 = 1000.0;

/// Normalised bounding box, origin top-left, all values in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BBox {
    /// Build from raw normalised values, clamping into `[0, 1]` and ordering
    /// each axis so `min <= max`.
    pub fn normalized(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let (x0, x1) = (x0.clamp(0.0, 1.0), x1.clamp(0.0, 1.0));
        let (y0, y1) = (y0.clamp(0.0, 1.0), y1.clamp(0.0, 1.0));
        Self {
            xmin: x0.min(x1),
            ymin: y0.min(y1),
            xmax: x0.max(x1),
            ymax: y0.max(y1),
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

/// One recognised text block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Block type reported by the model (`text`, `title`, `table`, …).
    pub kind: String,
    pub bbox: BBox,
    /// Whitespace-trimmed content; may be empty.
    pub text: String,
}

/// Parse grounded output using `(xmin, ymin, xmax, ymax)` boxes.
pub fn parse(raw: &str) -> Vec<Region> {
    parse_with(raw, BboxOrder::XyXy)
}

/// Parse grounded output with an explicit coordinate order.
pub fn parse_with(raw: &str, order: BboxOrder) -> Vec<Region> {
    let announcements = scan(raw);
    let mut regions = Vec::with_capacity(announcements.len());

    for (i, ann) in announcements.iter().enumerate() {
        let content_end = announcements
            .get(i + 1)
            .map_or(raw.len(), |next| next.start);

        let Some(bbox) = parse_coords(ann.coords, order) else {
            tracing::debug!("Skipping region {:?}: bad coordinates {:?}", ann.kind, ann.coords);
            continue;
        };

        regions.push(Region {
            kind: ann.kind.to_string(),
            bbox,
            text: raw[ann.end..content_end].trim().to_string(),
        });
    }

    regions
}

/// A region announcement located in the raw text.
#[derive(Debug, Clone, PartialEq)]
struct Announcement<'a> {
    /// Byte offset of `<|ref|>`.
    start: usize,
    /// Byte offset just past `<|/det|>`.
    end: usize,
    kind: &'a str,
    coords: &'a str,
}

/// Find every well-delimited announcement, in order.
fn scan(text: &str) -> Vec<Announcement<'_>> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(rel) = text[pos..].find(REF_OPEN) {
        let start = pos + rel;
        match read_announcement(text, start) {
            Some(ann) => {
                pos = ann.end;
                found.push(ann);
            }
            None => pos = start + REF_OPEN.len(),
        }
    }

    found
}

fn read_announcement(text: &str, start: usize) -> Option<Announcement<'_>> {
    let mut cur = Cursor { text, pos: start };

    cur.expect(REF_OPEN)?;
    let kind = cur.take_until_on_line(REF_CLOSE)?.trim();
    cur.expect(REF_CLOSE)?;
    cur.skip_whitespace();
    cur.expect(DET_OPEN)?;
    cur.skip_whitespace();
    cur.expect(BOX_OPEN)?;
    let coords = cur.take_until_on_line(BOX_CLOSE)?;
    cur.expect(BOX_CLOSE)?;
    cur.skip_whitespace();
    cur.expect(DET_CLOSE)?;

    Some(Announcement {
        start,
        end: cur.pos,
        kind,
        coords,
    })
}

/// Forward-only cursor over the raw response.
struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn expect(&mut self, token: &str) -> Option<()> {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            Some(())
        } else {
            None
        }
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Consume up to (not including) `delim`, which must appear before the
    /// next line break.
    fn take_until_on_line(&mut self, delim: &str) -> Option<&'a str> {
        let rest = self.rest();
        let idx = rest.find(delim)?;
        let taken = &rest[..idx];
        if taken.trim().contains('\n') {
            return None;
        }
        self.pos += idx;
        Some(taken)
    }
}

fn parse_coords(coords: &str, order: BboxOrder) -> Option<BBox> {
    let values = coords
        .split(',')
        .map(|v| v.trim().parse::<f32>().ok().filter(|f| f.is_finite()))
        .collect::<Option<Vec<f32>>>()?;

    let [a, b, c, d] = <[f32; 4]>::try_from(values).ok()?;
    let [a, b, c, d] = [a, b, c, d].map(|v| v / COORD_SCALE);

    Some(match order {
        BboxOrder::XyXy => BBox::normalized(a, b, c, d),
        BboxOrder::YxYx => BBox::normalized(b, a, d, c),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn announce(kind: &str, coords: &str) -> String {
        format!("<|ref|>{kind}<|/ref|><|det|>[[{coords}]]<|/det|>")
    }

    #[test]
    fn parses_regions_in_source_order() {
        let raw = format!(
            "{}\n  Annual Report  \n{}\nRevenue grew.\n\n{}\nPage 1",
            announce("title", "100, 50, 900, 120"),
            announce("text", "100,150,900,400"),
            announce("footer", "450, 950, 550, 980"),
        );
        let regions = parse(&raw);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].kind, "title");
        assert_eq!(regions[0].text, "Annual Report");
        assert_eq!(regions[1].text, "Revenue grew.");
        assert_eq!(regions[2].text, "Page 1");
        assert_eq!(
            regions[0].bbox,
            BBox {
                xmin: 0.1,
                ymin: 0.05,
                xmax: 0.9,
                ymax: 0.12
            }
        );
    }

    #[test]
    fn three_number_box_is_skipped_and_neighbours_survive() {
        let raw = format!(
            "{}\nfirst\n{}\nbroken\n{}\nthird",
            announce("text", "0, 0, 500, 100"),
            announce("text", "0, 100, 500"),
            announce("text", "0, 200, 500, 300"),
        );
        let regions = parse(&raw);
        assert_eq!(regions.len(), 2);
        // The malformed announcement still ends the first region's content.
        assert_eq!(regions[0].text, "first");
        assert_eq!(regions[1].text, "third");
    }

    #[test]
    fn non_numeric_coordinates_are_skipped() {
        let raw = format!("{}\nx\n{}\ny", announce("text", "a, b, c, d"), announce("text", "1,2,3,4"));
        let regions = parse(&raw);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "y");
    }

    #[test]
    fn tolerates_whitespace_between_tokens() {
        let raw = "<|ref|> sub_title <|/ref|>\n<|det|> [[ 10 , 20 , 30 , 40 ]] <|/det|>\nHello";
        let regions = parse(raw);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].kind, "sub_title");
        assert_eq!(regions[0].text, "Hello");
    }

    #[test]
    fn empty_content_is_kept_as_empty_text() {
        let raw = format!("{}\n   \n{}\nbody", announce("image", "0,0,10,10"), announce("text", "0,10,10,20"));
        let regions = parse(&raw);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].text.is_empty());
        assert_eq!(regions[1].text, "body");
    }

    #[test]
    fn free_form_text_yields_nothing() {
        assert!(parse("Just some recognised text.\n\nSecond paragraph.").is_empty());
        assert!(parse("").is_empty());
        assert!(parse("<|ref|>dangling").is_empty());
    }

    #[test]
    fn type_spanning_lines_is_not_an_announcement() {
        let raw = "<|ref|>te\nxt<|/ref|><|det|>[[0,0,1,1]]<|/det|>x";
        assert!(parse(raw).is_empty());
    }

    #[test]
    fn coordinates_are_clamped_and_ordered() {
        let raw = format!("{}\nodd box", announce("text", "900, 1200, 100, -50"));
        let regions = parse(&raw);
        assert_eq!(regions.len(), 1);
        let b = regions[0].bbox;
        for v in [b.xmin, b.ymin, b.xmax, b.ymax] {
            assert!((0.0..=1.0).contains(&v), "{v} out of range");
        }
        assert!(b.xmin <= b.xmax && b.ymin <= b.ymax);
        assert_eq!(b.ymax, 1.0);
        assert_eq!(b.ymin, 0.0);
    }

    #[test]
    fn yxyx_order_swaps_axes() {
        let raw = format!("{}\nt", announce("text", "100, 200, 300, 400"));
        let r = parse_with(&raw, BboxOrder::YxYx);
        assert_eq!(
            r[0].bbox,
            BBox {
                xmin: 0.2,
                ymin: 0.1,
                xmax: 0.4,
                ymax: 0.3
            }
        );
    }

    #[test]
    fn multi_box_detection_is_skipped() {
        let raw = format!("{}\ntwo boxes\n{}\nok", announce("text", "1,2,3,4],[5,6,7,8"), announce("text", "1,2,3,4"));
        let regions = parse(&raw);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].text, "ok");
    }

    #[test]
    fn unicode_content_is_preserved() {
        let raw = format!("{}\n대한민국 헌법\n", announce("title", "0,0,1000,100"));
        assert_eq!(parse(&raw)[0].text, "대한민국 헌법");
    }

    #[test]
    fn many_regions_roundtrip_count() {
        let raw: String = (0..25)
            .map(|i| format!("{}\nline {i}\n", announce("text", &format!("0,{},1000,{}", i * 40, i * 40 + 30))))
            .collect();
        let regions = parse(&raw);
        assert_eq!(regions.len(), 25);
        assert!(regions.iter().enumerate().all(|(i, r)| r.text == format!("line {i}")));
    }
}
