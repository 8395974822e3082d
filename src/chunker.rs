//! Deterministic windowed splitting of documents into retrieval-sized chunks.

use crate::types::{CharSpan, Chunk, Document};

/// Splits documents into fixed-size character windows with overlap.
///
/// Boundaries are a pure function of the text and the window settings, so
/// re-splitting an unchanged document reproduces the same chunk contents and
/// spans. Windows are measured in characters and never split a UTF-8 scalar.
#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    window: usize,
    overlap: usize,
}

impl Chunker {
    /// `overlap` must be smaller than `window`; validated by
    /// [`PipelineConfig::validate`](crate::config::PipelineConfig::validate)
    /// before a chunker is constructed from it.
    pub fn new(window: usize, overlap: usize) -> Self {
        debug_assert!(window > 0 && overlap < window);
        Self { window, overlap }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Splits `document` into ordered chunks.
    ///
    /// A whitespace-only document yields no chunks; a document shorter than
    /// one window yields exactly one chunk covering the whole text.
    /// Consecutive chunks share exactly `overlap` characters.
    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let text = document.raw_text.as_str();
        if text.trim().is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, plus the end sentinel.
        let mut boundaries: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        boundaries.push(text.len());
        let char_count = boundaries.len() - 1;

        if char_count <= self.window {
            return vec![Chunk::new(
                &document.id,
                0,
                text,
                CharSpan {
                    start: 0,
                    end: char_count,
                },
            )];
        }

        let step = self.window - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;
        loop {
            let end = (start + self.window).min(char_count);
            let content = &text[boundaries[start]..boundaries[end]];
            chunks.push(Chunk::new(
                &document.id,
                chunks.len(),
                content,
                CharSpan { start, end },
            ));
            if end == char_count {
                break;
            }
            start += step;
        }
        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new("https://example.org/page", "Page", text)
    }

    fn splitter() -> Chunker {
        Chunker::new(100, 20)
    }

    #[test]
    fn whitespace_only_yields_nothing() {
        assert!(splitter().split(&doc("   \n\t  ")).is_empty());
        assert!(splitter().split(&doc("")).is_empty());
    }

    #[test]
    fn short_document_yields_single_whole_chunk() {
        let document = doc("A hymn of moderate tempo suits a reverent prelude.");
        let chunks = splitter().split(&document);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, document.raw_text);
        assert_eq!(chunks[0].ordinal, 0);
        assert_eq!(chunks[0].span.start, 0);
        assert_eq!(chunks[0].span.end, document.raw_text.chars().count());
    }

    #[test]
    fn long_document_overlaps_exactly() {
        let text: String = (0..350).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let document = doc(&text);
        let chunks = splitter().split(&document);
        assert!(chunks.len() >= 2);

        for pair in chunks.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            assert_eq!(left.span.end - right.span.start, 20, "overlap width");
            let left_tail: String = left.content.chars().skip(left.content.chars().count() - 20).collect();
            let right_head: String = right.content.chars().take(20).collect();
            assert_eq!(left_tail, right_head);
        }

        // Concatenating with the overlap removed reconstructs the text.
        let mut rebuilt = chunks[0].content.clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.content.chars().skip(20));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn boundaries_are_deterministic() {
        let text: String = "conducting patterns for triple meter ".repeat(12);
        let document = doc(&text);
        let first: Vec<_> = splitter()
            .split(&document)
            .into_iter()
            .map(|c| (c.span, c.content))
            .collect();
        let second: Vec<_> = splitter()
            .split(&document)
            .into_iter()
            .map(|c| (c.span, c.content))
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "é".repeat(250);
        let chunks = splitter().split(&doc(&text));
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.content.chars().all(|c| c == 'é'));
        }
        assert_eq!(chunks[0].content.chars().count(), 100);
    }

    #[test]
    fn ordinals_are_sequential() {
        let text = "x".repeat(500);
        let chunks = splitter().split(&doc(&text));
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.ordinal, i);
        }
    }
}
