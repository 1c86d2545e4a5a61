//! Text chunking for the write path.
//!
//! Splits raw document or transcript text into overlapping windows measured in
//! characters, preferring paragraph and sentence boundaries over hard cuts.

use crate::config::ChunkingSettings;
use crate::error::{CoreError, CoreResult};

/// Default chunk length in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap between consecutive chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// A chunk together with the byte range it was cut from.
///
/// `start..end` indexes the text passed to [`Chunker::split_spans`]; `text` is
/// that range with surrounding whitespace trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Deterministic overlapping splitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> CoreResult<Self> {
        if chunk_size == 0 {
            return Err(CoreError::InvalidConfig("chunk size must be positive".into()));
        }
        if overlap >= chunk_size {
            return Err(CoreError::InvalidConfig(format!(
                "chunk overlap ({}) must be less than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    pub fn from_settings(settings: &ChunkingSettings) -> CoreResult<Self> {
        Self::new(settings.size, settings.overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into chunk strings. Blank input yields no chunks.
    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_spans(text).into_iter().map(|s| s.text).collect()
    }

    /// Split text into chunks with their byte ranges in `text`.
    pub fn split_spans(&self, text: &str) -> Vec<TextSpan> {
        let lead = text.len() - text.trim_start().len();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }

        // bounds[i] is the byte offset of char i; the last entry is trimmed.len().
        let bounds: Vec<usize> = trimmed
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(trimmed.len()))
            .collect();
        let n_chars = bounds.len() - 1;

        if n_chars <= self.chunk_size {
            return vec![TextSpan {
                text: trimmed.to_string(),
                start: lead,
                end: lead + trimmed.len(),
            }];
        }

        let mut spans = Vec::new();
        let mut start = 0usize;

        while start < n_chars {
            let end = (start + self.chunk_size).min(n_chars);

            let chunk_end = if end < n_chars {
                let window = &trimmed[bounds[start]..bounds[end]];
                match find_break_point(window) {
                    Some(offset) if offset > 0 => char_index(&bounds, bounds[start] + offset),
                    _ => end,
                }
            } else {
                end
            };

            let (byte_start, byte_end) = (bounds[start], bounds[chunk_end]);
            let piece = trimmed[byte_start..byte_end].trim();
            if !piece.is_empty() {
                spans.push(TextSpan {
                    text: piece.to_string(),
                    start: lead + byte_start,
                    end: lead + byte_end,
                });
            }

            if chunk_end >= n_chars {
                break;
            }

            let step = chunk_end - start;
            start = if step <= self.overlap {
                chunk_end
            } else {
                snap_to_word_start(trimmed, &bounds, chunk_end - self.overlap, chunk_end)
            };
        }

        spans
    }
}

/// Char index for a byte offset that is known to sit on a char boundary.
fn char_index(bounds: &[usize], byte: usize) -> usize {
    bounds.binary_search(&byte).unwrap_or_else(|i| i)
}

/// Move an overlap start forward to the beginning of the next word, staying below `limit`.
fn snap_to_word_start(text: &str, bounds: &[usize], from: usize, limit: usize) -> usize {
    if from == 0 || text[..bounds[from]].ends_with(char::is_whitespace) {
        return from;
    }
    let region = &text[bounds[from]..bounds[limit]];
    match region.char_indices().find(|(_, c)| c.is_whitespace()) {
        Some((pos, c)) => {
            let candidate = char_index(bounds, bounds[from] + pos + c.len_utf8());
            if candidate < limit {
                candidate
            } else {
                from
            }
        }
        None => from,
    }
}

/// Find a good break point in a window (prefer paragraph, then sentence boundaries).
/// Returns a byte offset into `window`.
fn find_break_point(window: &str) -> Option<usize> {
    let max_len = window.len();

    if let Some(pos) = window.rfind("\n\n") {
        if pos > max_len / 3 {
            return Some(pos + 2);
        }
    }

    for pattern in &[". ", "! ", "? ", ".\n", "!\n", "?\n"] {
        if let Some(pos) = window.rfind(pattern) {
            if pos > max_len / 3 {
                return Some(pos + pattern.len());
            }
        }
    }

    if let Some(pos) = window.rfind('\n') {
        if pos > max_len / 3 {
            return Some(pos + 1);
        }
    }

    for pattern in &[", ", "; "] {
        if let Some(pos) = window.rfind(pattern) {
            if pos > max_len / 2 {
                return Some(pos + pattern.len());
            }
        }
    }

    window.rfind(' ').map(|pos| pos + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rebuild the covered text from spans, taking each span only up to where the next begins.
    fn reconstruct(text: &str, spans: &[TextSpan]) -> String {
        let mut out = String::new();
        for (i, span) in spans.iter().enumerate() {
            let stop = spans.get(i + 1).map(|n| n.start).unwrap_or(span.end);
            out.push_str(&text[span.start..stop]);
        }
        out
    }

    #[test]
    fn blank_input_yields_nothing() {
        let c = Chunker::default();
        assert!(c.split("").is_empty());
        assert!(c.split("  \n\t ").is_empty());
    }

    #[test]
    fn short_text_is_one_trimmed_chunk() {
        let c = Chunker::default();
        let spans = c.split_spans("  Hello world \n");
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].text, "Hello world");
        assert_eq!(spans[0].start, 2);
        assert_eq!(spans[0].end, 13);
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        assert!(Chunker::new(100, 100).is_err());
        assert!(Chunker::new(0, 0).is_err());
        assert!(Chunker::new(100, 99).is_ok());
    }

    #[test]
    fn long_text_covers_everything_with_overlap() {
        let text = "The supplier ships every Monday. Late delivery incurs a penalty. ".repeat(60);
        let c = Chunker::new(200, 50).unwrap();
        let spans = c.split_spans(&text);
        assert!(spans.len() > 1);

        for span in &spans {
            assert!(span.text.chars().count() <= 200);
        }
        for pair in spans.windows(2) {
            assert!(pair[1].start < pair[0].end, "consecutive chunks must overlap");
            assert!(pair[1].start > pair[0].start);
        }
        assert_eq!(reconstruct(&text, &spans), text.trim());
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let text = "Alpha beta gamma delta. ".repeat(50);
        let c = Chunker::new(100, 20).unwrap();
        let chunks = c.split(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with('.'), "chunk did not end on a sentence: {:?}", chunk);
        }
    }

    #[test]
    fn hard_cuts_without_whitespace() {
        let text = "a".repeat(2500);
        let spans = Chunker::default().split_spans(&text);
        let ranges: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(ranges, vec![(0, 1000), (800, 1800), (1600, 2500)]);
    }

    #[test]
    fn sizes_are_counted_in_characters() {
        let text = "žluťoučký kůň úpěl ďábelské ódy. ".repeat(40);
        let c = Chunker::new(120, 30).unwrap();
        let spans = c.split_spans(&text);
        assert!(spans.len() > 1);
        for span in &spans {
            assert!(span.text.chars().count() <= 120);
        }
        assert_eq!(reconstruct(&text, &spans), text.trim());
    }

    #[test]
    fn identical_input_splits_identically() {
        let text = "Paragraph one talks about scope.\n\nParagraph two covers pricing, terms; and notes. "
            .repeat(30);
        let c = Chunker::new(300, 60).unwrap();
        assert_eq!(c.split_spans(&text), c.split_spans(&text));
    }
}
