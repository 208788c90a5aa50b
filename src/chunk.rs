//! Sliding-window text chunker.
//!
//! Splits normalized document text into overlapping passages of roughly
//! `chunk_size` characters. Each window's end is moved to a nearby natural
//! boundary so passages tend to end on whole sentences.
//!
//! # Algorithm
//!
//! 1. Start a window at offset 0 with a naive end of `start + chunk_size`.
//! 2. If the naive end reaches the end of the text, the tail is the last
//!    window.
//! 3. Otherwise look for a break point within `overlap` characters on either
//!    side of the naive end, preferring a sentence-ending period, then a
//!    newline, then a space. Among candidates of the same kind the one
//!    closest to the naive end wins. With no candidate, the naive end is
//!    used.
//! 4. The next window starts `overlap` characters before the break point.
//!    If that would not move forward, it starts at the break point instead.
//! 5. Windows are trimmed, and passages shorter than `min_chars` or with
//!    fewer than `min_words` words are dropped.
//!
//! Offsets are byte offsets snapped to UTF-8 character boundaries, so the
//! chunker is safe on arbitrary input even though normalized text is ASCII.
//!
//! # Example
//!
//! ```rust
//! use context_retrieval::chunk::Chunker;
//!
//! let chunker = Chunker::default();
//! let text = "The quick brown fox jumps over the lazy dog. ".repeat(30);
//! let chunks = chunker.chunk(&text);
//! assert!(chunks.len() > 1);
//! assert!(chunks.iter().all(|c| c.split_whitespace().count() >= 5));
//! ```

use std::ops::Range;

use crate::config::ChunkingConfig;

/// Character-budget chunker with boundary-aware window ends.
#[derive(Debug, Clone)]
pub struct Chunker {
    /// Target window length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive windows, and the search
    /// radius around the naive end for a break point.
    pub overlap: usize,
    pub min_words: usize,
    pub min_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
            min_words: 5,
            min_chars: 50,
        }
    }
}

impl From<&ChunkingConfig> for Chunker {
    fn from(config: &ChunkingConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            overlap: config.overlap,
            min_words: config.min_words,
            min_chars: config.min_chars,
        }
    }
}

impl Chunker {
    /// Split `text` into passages, dropping those below the minimum size.
    ///
    /// Returns an empty vector for empty input; callers treat that as
    /// "no content to index".
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.spans(text)
            .into_iter()
            .map(|span| text[span].trim())
            .filter(|piece| self.keeps(piece))
            .map(str::to_string)
            .collect()
    }

    /// Raw window ranges before trimming and filtering.
    ///
    /// Consecutive windows overlap or touch, so together they cover the
    /// whole text.
    pub fn spans(&self, text: &str) -> Vec<Range<usize>> {
        let len = text.len();
        let size = self.chunk_size.max(1);
        let mut spans = Vec::new();
        let mut start = 0usize;

        while start < len {
            let naive_end = start + size;
            if naive_end >= len {
                spans.push(start..len);
                break;
            }
            let naive_end = snap_to_char_boundary(text, naive_end);
            let mut end = self.find_break(text, start, naive_end);
            if end <= start {
                end = next_char_boundary(text, start);
            }
            spans.push(start..end);

            let next = snap_to_char_boundary(text, end.saturating_sub(self.overlap));
            start = if next > start { next } else { end };
        }

        spans
    }

    fn keeps(&self, piece: &str) -> bool {
        !piece.is_empty()
            && piece.chars().count() >= self.min_chars
            && piece.split_whitespace().count() >= self.min_words
    }

    /// Choose the window end near `naive_end`, never at or before `start`.
    fn find_break(&self, text: &str, start: usize, naive_end: usize) -> usize {
        let bytes = text.as_bytes();
        let lo = naive_end.saturating_sub(self.overlap).max(start + 1);
        let hi = (naive_end + self.overlap).min(text.len());
        if lo >= hi {
            return naive_end;
        }

        // Break positions are exclusive end offsets.
        let closest = |candidates: Vec<usize>| {
            candidates
                .into_iter()
                .min_by_key(|&pos| pos.abs_diff(naive_end))
        };

        let periods: Vec<usize> = (lo..hi)
            .filter(|&i| {
                bytes[i] == b'.'
                    && bytes
                        .get(i + 1)
                        .map_or(true, |next| next.is_ascii_whitespace())
            })
            .map(|i| i + 1)
            .collect();
        if let Some(pos) = closest(periods) {
            return pos;
        }

        let newlines: Vec<usize> = (lo..hi).filter(|&i| bytes[i] == b'\n').collect();
        if let Some(pos) = closest(newlines) {
            return pos;
        }

        let spaces: Vec<usize> = (lo..hi).filter(|&i| bytes[i] == b' ').collect();
        if let Some(pos) = closest(spaces) {
            return pos;
        }

        naive_end
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn next_char_boundary(s: &str, index: usize) -> usize {
    s[index..]
        .char_indices()
        .nth(1)
        .map(|(i, _)| index + i)
        .unwrap_or(s.len())
}
