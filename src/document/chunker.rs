use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::loader::Document;
use crate::config::{ChunkingConfig, ConfigError};

/// A contiguous passage of exactly one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: String,
    pub index: usize,
    pub text: String,
}

impl Chunk {
    /// Stable id derived from owner and position, so re-ingesting a document
    /// writes the same ids again instead of new ones.
    pub fn chunk_id(&self) -> String {
        let key = format!("{}#{}", self.document_id, self.index);
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes()).to_string()
    }
}

/// Fixed-size character windows with a fixed overlap.
///
/// Sizes count Unicode scalar values, not bytes. Consecutive chunks share
/// exactly `chunk_overlap` characters, the last chunk may be shorter, and
/// empty text gives no chunks at all.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(ConfigError::Invalid {
                key: "CHUNK_OVERLAP".to_string(),
                value: chunk_overlap.to_string(),
                reason: format!("must be less than a non-zero CHUNK_SIZE ({})", chunk_size),
            });
        }
        Ok(Self { chunk_size, chunk_overlap })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self, ConfigError> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    pub fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split(&document.id, &document.text)
    }

    pub fn split(&self, document_id: &str, text: &str) -> Vec<Chunk> {
        // Byte offset of every char boundary, end of text included
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = bounds.len() - 1;

        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            chunks.push(Chunk {
                document_id: document_id.to_string(),
                index: chunks.len(),
                text: text[bounds[start]..bounds[end]].to_string(),
            });
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
    use proptest::prelude::*;

    fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
        let mut text = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                text.push_str(&chunk.text);
            } else {
                text.extend(chunk.text.chars().skip(overlap));
            }
        }
        text
    }

    fn shared_chars(previous: &str, next: &str, overlap: usize) -> bool {
        let tail: String = previous.chars().skip(previous.chars().count() - overlap).collect();
        let head: String = next.chars().take(overlap).collect();
        tail == head
    }

    #[test]
    fn ten_thousand_chars_with_overlap() {
        let text: String = (0..10_000).map(|i| (b'a' + (i % 26) as u8) as char).collect();
        let chunker = Chunker::new(1000, 100).unwrap();
        let chunks = chunker.split("notes.pdf", &text);

        assert!(chunks.iter().all(|c| c.text.chars().count() <= 1000));
        assert!(chunks.iter().all(|c| !c.text.is_empty()));
        for pair in chunks.windows(2) {
            assert!(shared_chars(&pair[0].text, &pair[1].text, 100));
        }
        assert_eq!(reassemble(&chunks, 100), text);
        assert_eq!(chunks.len(), 11);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        let chunker = Chunker::new(10, 2).unwrap();
        assert!(chunker.split("empty.pdf", "").is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = Chunker::new(100, 10).unwrap();
        let chunks = chunker.split("short.pdf", "A stack follows LIFO order.");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A stack follows LIFO order.");
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn counts_characters_not_bytes() {
        let chunker = Chunker::new(4, 1).unwrap();
        let chunks = chunker.split("tr.pdf", "çğıöşüÇĞİÖ");
        assert_eq!(chunks[0].text, "çğıö");
        assert_eq!(chunks[1].text, "öşüÇ");
        assert_eq!(reassemble(&chunks, 1), "çğıöşüÇĞİÖ");
    }

    #[test]
    fn rejects_overlap_not_below_size() {
        assert!(Chunker::new(10, 10).is_err());
        assert!(Chunker::new(0, 0).is_err());
    }

    #[test]
    fn chunk_ids_are_stable_per_position() {
        let chunker = Chunker::new(5, 1).unwrap();
        let first = chunker.split("a.pdf", "abcdefghij");
        let second = chunker.split("a.pdf", "abcdefghij");
        let other = chunker.split("b.pdf", "abcdefghij");

        assert_eq!(first[0].chunk_id(), second[0].chunk_id());
        assert_ne!(first[0].chunk_id(), first[1].chunk_id());
        assert_ne!(first[0].chunk_id(), other[0].chunk_id());
    }

    proptest! {
        #[test]
        fn overlap_removal_reconstructs_text(
            text in "\\PC{0,400}",
            size in 2usize..80,
            overlap_seed in 0usize..80,
        ) {
            let overlap = overlap_seed % size;
            let chunker = Chunker::new(size, overlap).unwrap();
            let chunks = chunker.split("doc.pdf", &text);

            prop_assert_eq!(reassemble(&chunks, overlap), text.clone());
            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert!(!chunk.text.is_empty());
                prop_assert!(chunk.text.chars().count() <= size);
            }
            for pair in chunks.windows(2) {
                prop_assert!(shared_chars(&pair[0].text, &pair[1].text, overlap));
            }
        }
    }
}
