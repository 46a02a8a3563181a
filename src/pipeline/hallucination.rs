//! Online detection of degenerate repetition loops in streamed output.
//!
//! Vision-language OCR models occasionally lock into emitting one short
//! pattern forever (`"| | | | "`, `"0.0.0.0."`). Left alone such a stream
//! runs until the wall-clock deadline. [`RepeatDetector`] watches the tail
//! of the stream and flags the loop after roughly one window of tokens.

use std::collections::VecDeque;

/// Characters kept from the tail of the stream.
pub const WINDOW_CHARS: usize = 200;
/// Longest repeating unit considered.
pub const MAX_PATTERN_LEN: usize = 10;
/// Contiguous repetitions that count as a loop.
pub const MIN_REPEATS: usize = 15;

/// A detected repetition at the end of the window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repetition {
    pub pattern: String,
    pub repeats: usize,
}

/// Sliding-window repetition detector.
#[derive(Debug, Clone)]
pub struct RepeatDetector {
    window: VecDeque<char>,
    capacity: usize,
    max_pattern_len: usize,
    min_repeats: usize,
}

impl Default for RepeatDetector {
    fn default() -> Self {
        Self::new(WINDOW_CHARS, MAX_PATTERN_LEN, MIN_REPEATS)
    }
}

impl RepeatDetector {
    pub fn new(capacity: usize, max_pattern_len: usize, min_repeats: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            max_pattern_len,
            min_repeats,
        }
    }

    /// Append a chunk and check the updated tail.
    pub fn push(&mut self, chunk: &str) -> Option<Repetition> {
        for ch in chunk.chars() {
            if self.window.len() == self.capacity {
                self.window.pop_front();
            }
            self.window.push_back(ch);
        }
        self.check()
    }

    /// Check whether the window currently ends in a loop.
    ///
    /// For each unit length `k` the last `k` characters form the candidate
    /// segment; the window must end with at least `min_repeats` contiguous
    /// copies of it.
    pub fn check(&self) -> Option<Repetition> {
        let len = self.window.len();
        for k in 1..=self.max_pattern_len {
            let needed = k * self.min_repeats;
            if needed > len {
                break;
            }
            let at = |i: usize| self.window[len - needed + i];
            // Every char must equal the char one period later.
            let periodic = (0..needed - k).all(|i| at(i) == at(i + k));
            if periodic {
                let pattern: String = self.window.range(len - k..).collect();
                return Some(Repetition {
                    repeats: self.count_repeats(k),
                    pattern,
                });
            }
        }
        None
    }

    /// Number of full copies of the trailing `k`-char unit in the window.
    fn count_repeats(&self, k: usize) -> usize {
        let len = self.window.len();
        let mut span = k;
        while span + k <= len
            && self
                .window
                .range(len - span - k..len - span)
                .eq(self.window.range(len - k..))
        {
            span += k;
        }
        span / k
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_char_loop_triggers_at_threshold() {
        let mut d = RepeatDetector::default();
        assert!(d.push(&"=".repeat(14)).is_none());
        let hit = d.push("=").expect("15 repeats should trigger");
        assert_eq!(hit.pattern, "=");
        assert_eq!(hit.repeats, 15);
    }

    #[test]
    fn every_pattern_length_up_to_ten_triggers() {
        for k in 1..=MAX_PATTERN_LEN {
            let unit: String = (0..k).map(|i| (b'a' + i as u8) as char).collect();
            let mut d = RepeatDetector::default();
            let hit = d.push(&unit.repeat(MIN_REPEATS));
            assert!(hit.is_some(), "k={k} should trigger");
        }
    }

    #[test]
    fn eleven_char_unit_is_not_considered() {
        let unit = "abcdefghijk";
        let mut d = RepeatDetector::default();
        // 15 * 11 = 165 chars fits the window but exceeds the max unit length.
        assert!(d.push(&unit.repeat(MIN_REPEATS)).is_none());
    }

    #[test]
    fn fourteen_repeats_do_not_trigger() {
        let mut d = RepeatDetector::default();
        assert!(d.push("Intro text. ").is_none());
        assert!(d.push(&"ab".repeat(14)).is_none());
    }

    #[test]
    fn natural_prose_of_window_length_does_not_trigger() {
        let prose = "The committee reviewed the quarterly figures and noted that \
                     revenue grew modestly while operating costs declined, leaving \
                     a small surplus that will be carried into the next fiscal year \
                     pending approval by the board.";
        assert!(prose.chars().count() >= WINDOW_CHARS);
        let mut d = RepeatDetector::default();
        for word in prose.split_inclusive(' ') {
            assert!(d.push(word).is_none(), "false positive at {word:?}");
        }
    }

    #[test]
    fn loop_split_across_chunks_is_caught() {
        let mut d = RepeatDetector::default();
        d.push("Total: ");
        let mut hit = None;
        for _ in 0..40 {
            if let Some(h) = d.push("0.") {
                hit = Some(h);
                break;
            }
        }
        let hit = hit.expect("repeated '0.' should trigger");
        assert_eq!(hit.repeats, MIN_REPEATS);
        assert!(hit.pattern == "0." || hit.pattern == ".0", "got {:?}", hit.pattern);
    }

    #[test]
    fn window_is_bounded() {
        let mut d = RepeatDetector::default();
        for i in 0..1000 {
            d.push(&char::from(b'a' + (i % 26) as u8).to_string());
        }
        assert_eq!(d.window.len(), WINDOW_CHARS);
    }

    #[test]
    fn multibyte_characters_count_as_single_chars() {
        let mut d = RepeatDetector::default();
        assert!(d.push(&"한".repeat(14)).is_none());
        assert_eq!(d.push("한").map(|h| h.pattern), Some("한".to_string()));
    }
}
