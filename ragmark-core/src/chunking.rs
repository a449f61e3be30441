//! Document chunking.
//!
//! [`SlidingWindowChunker`] splits documents into fixed-size character
//! windows with configurable overlap. Offsets and sizes are counted in
//! characters, not bytes, so multi-byte UTF-8 text never splits inside a
//! code point.

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata; embeddings
/// are attached later by the engine.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has no text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Splits text into fixed-size character windows with overlap.
///
/// Window `i` covers characters `[i * (window - overlap), i * (window -
/// overlap) + window)`; the final window may be shorter. For text of
/// character length `L`, this produces `ceil((L - overlap) / (window -
/// overlap))` chunks (one chunk when `L <= window`, zero when `L == 0`),
/// and consecutive chunks from the same document overlap by exactly
/// `overlap` characters.
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    window: usize,
    overlap: usize,
}

impl SlidingWindowChunker {
    /// Create a chunker with the given window and overlap, in characters.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfig`] if `window == 0` or
    /// `overlap >= window`. Validation happens here, before any I/O.
    pub fn new(window: usize, overlap: usize) -> Result<Self> {
        if window == 0 {
            return Err(RagError::InvalidConfig("chunk window must be greater than zero".into()));
        }
        if overlap >= window {
            return Err(RagError::InvalidConfig(format!(
                "chunk overlap ({overlap}) must be less than the window ({window})"
            )));
        }
        Ok(Self { window, overlap })
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        let text = &document.text;
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char start, plus the end sentinel, so a
        // char window maps to a byte slice.
        let char_starts: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        let char_len = char_starts.len();
        let byte_at = |char_idx: usize| {
            if char_idx >= char_len { text.len() } else { char_starts[char_idx] }
        };

        let step = self.window - self.overlap;
        let mut chunks = Vec::new();
        let mut start = 0;
        let mut index = 0;

        loop {
            let end = (start + self.window).min(char_len);
            let chunk_text = &text[byte_at(start)..byte_at(end)];

            let mut metadata = document.metadata.clone();
            metadata.insert("chunk_index".to_string(), index.to_string());

            chunks.push(Chunk {
                id: format!("{}_{index}", document.id),
                document_id: document.id.clone(),
                text: chunk_text.to_string(),
                start_offset: start,
                end_offset: end,
                metadata,
            });

            if end >= char_len {
                break;
            }
            start += step;
            index += 1;
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::path::PathBuf;

    use super::*;

    fn doc(text: &str) -> Document {
        Document {
            id: "doc".to_string(),
            source_path: PathBuf::from("doc.txt"),
            text: text.to_string(),
            metadata: HashMap::from([("source".to_string(), "doc.txt".to_string())]),
        }
    }

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn invalid_parameters_are_rejected() {
        assert!(SlidingWindowChunker::new(0, 0).is_err());
        assert!(SlidingWindowChunker::new(100, 100).is_err());
        assert!(SlidingWindowChunker::new(100, 150).is_err());
        assert!(SlidingWindowChunker::new(100, 99).is_ok());
    }

    #[test]
    fn empty_document_yields_no_chunks() {
        let chunker = SlidingWindowChunker::new(100, 20).unwrap();
        assert!(chunker.chunk(&doc("")).is_empty());
    }

    #[test]
    fn short_document_yields_one_chunk() {
        let chunker = SlidingWindowChunker::new(100, 20).unwrap();
        let chunks = chunker.chunk(&doc("short text"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!(chunks[0].id, "doc_0");
        assert_eq!(chunks[0].metadata["chunk_index"], "0");
    }

    #[test]
    fn chunk_count_matches_closed_form() {
        // count = ceil((L - O) / (W - O)) for L > 0
        let cases = [(1000usize, 1000usize, 200usize), (1001, 1000, 200), (5000, 1000, 200),
            (999, 1000, 200), (2600, 1000, 200)];
        for (len, window, overlap) in cases {
            let text: String = "a".repeat(len);
            let chunker = SlidingWindowChunker::new(window, overlap).unwrap();
            let chunks = chunker.chunk(&doc(&text));
            let expected = (len.saturating_sub(overlap)).div_ceil(window - overlap).max(1);
            assert_eq!(chunks.len(), expected, "L={len} W={window} O={overlap}");
        }
    }

    #[test]
    fn all_but_last_chunk_have_window_length() {
        let text: String = "x".repeat(2600);
        let chunker = SlidingWindowChunker::new(1000, 200).unwrap();
        let chunks = chunker.chunk(&doc(&text));
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(char_len(&chunk.text), 1000);
        }
        assert!(char_len(&chunks.last().unwrap().text) <= 1000);
    }

    #[test]
    fn consecutive_chunks_overlap_exactly() {
        let text: String = (0..2600).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunker = SlidingWindowChunker::new(1000, 200).unwrap();
        let chunks = chunker.chunk(&doc(&text));
        for pair in chunks.windows(2) {
            let head: String = pair[0].text.chars().skip(800).collect();
            let tail: String = pair[1].text.chars().take(200).collect();
            assert_eq!(head, tail);
            assert_eq!(pair[1].start_offset, pair[0].end_offset - 200);
        }
    }

    #[test]
    fn multibyte_text_chunks_on_char_boundaries() {
        let text: String = "ระบบควบคุม".repeat(40); // 400 chars, 3 bytes each
        let chunker = SlidingWindowChunker::new(100, 10).unwrap();
        let chunks = chunker.chunk(&doc(&text));
        assert!(chunks.len() > 1);
        for chunk in &chunks[..chunks.len() - 1] {
            assert_eq!(char_len(&chunk.text), 100);
        }
        let rebuilt: String = chunks
            .iter()
            .map(|c| {
                if c.start_offset == 0 {
                    c.text.clone()
                } else {
                    c.text.chars().skip(10).collect()
                }
            })
            .collect();
        assert_eq!(rebuilt, text);
    }
}
