//! Chunking utilities for splitting a document into overlapping segments.
//!
//! Each chunk is embedded separately, so the chunk size trades retrieval
//! precision (small chunks) against context per reference (large chunks).
//! Sizes are measured in characters, not bytes or tokens.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 2048;

/// Default overlap between chunks in characters.
pub const DEFAULT_CHUNK_OVERLAP: usize = 512;

/// Separator groups tried in order of preference. Within a group the
/// split point closest to the size limit wins.
const SEPARATOR_LEVELS: &[&[&str]] = &[
    &["\n\n"],
    &["\n"],
    &[". ", "! ", "? ", "。", "！", "？"],
];

/// Chunking configuration.
///
/// # Examples
///
/// ```
/// use docrag::chunking::{ChunkingConfig, DEFAULT_CHUNK_SIZE};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between adjacent chunks in characters.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Reject configurations that cannot make progress.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be at least 1".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn split(&self, text: &str) -> Vec<Chunk> {
        chunk_text(text, self.chunk_size, self.overlap)
    }
}

/// A chunk of text from a larger document.
///
/// Produced by [`chunk_text`]. `index` is the chunk's position in the
/// split sequence and doubles as its identity in the vector index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// The chunk text content.
    pub text: String,
    /// Zero-based chunk index within the document.
    pub index: usize,
    /// Byte offset where this chunk starts in the original document.
    pub start_offset: usize,
}

/// Split text into overlapping chunks.
///
/// Every chunk holds at most `chunk_size` characters, and each chunk after
/// the first begins with the last `overlap` characters of its predecessor.
/// Split points snap back to a paragraph, line, sentence or word boundary
/// when one exists in the back half of the window; otherwise the chunk is
/// cut hard at `chunk_size`.
///
/// Empty text yields no chunks. An `overlap` of `chunk_size` or more is
/// clamped to `chunk_size - 1`.
///
/// # Examples
///
/// ```
/// use docrag::chunking::chunk_text;
///
/// let chunks = chunk_text("Hello, world!", 1000, 0);
/// assert_eq!(chunks.len(), 1);
/// assert_eq!(chunks[0].text, "Hello, world!");
///
/// let text = "word ".repeat(500);
/// let chunks = chunk_text(&text, 1000, 200);
/// assert!(chunks.len() >= 2);
/// ```
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    // char index -> byte index, with one trailing entry for text.len()
    let char_to_byte: Vec<usize> = text
        .char_indices()
        .map(|(byte_idx, _)| byte_idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = char_to_byte.len() - 1;

    if char_count <= chunk_size {
        return vec![Chunk {
            text: text.to_string(),
            index: 0,
            start_offset: 0,
        }];
    }

    let mut chunks = Vec::new();
    let mut start_char = 0;

    loop {
        let limit = start_char + chunk_size;
        let end_char = if limit >= char_count {
            char_count
        } else {
            // Boundaries must leave more than `overlap` chars behind so the
            // next chunk starts strictly later than this one.
            let floor = (start_char + overlap + 1).max(limit - chunk_size / 2);
            find_boundary(text, &char_to_byte, start_char, floor, limit)
        };

        let start_byte = char_to_byte[start_char];
        let end_byte = char_to_byte[end_char];
        chunks.push(Chunk {
            text: text[start_byte..end_byte].to_string(),
            index: chunks.len(),
            start_offset: start_byte,
        });

        if end_char == char_count {
            break;
        }
        start_char = end_char - overlap;
    }

    chunks
}

/// Pick the split point (a char index in `floor..=limit`) for a chunk that
/// starts at `start_char`.
fn find_boundary(
    text: &str,
    char_to_byte: &[usize],
    start_char: usize,
    floor: usize,
    limit: usize,
) -> usize {
    let start_byte = char_to_byte[start_char];
    let window = &text[start_byte..char_to_byte[limit]];
    let floor_rel = char_to_byte[floor] - start_byte;

    let best = SEPARATOR_LEVELS
        .iter()
        .find_map(|separators| {
            separators
                .iter()
                .filter_map(|sep| {
                    window
                        .rmatch_indices(sep)
                        .next()
                        .map(|(i, s)| i + s.len())
                        .filter(|&end| end >= floor_rel)
                })
                .max()
        })
        .or_else(|| {
            window
                .char_indices()
                .rev()
                .find(|(_, c)| c.is_whitespace())
                .map(|(i, c)| i + c.len_utf8())
                .filter(|&end| end >= floor_rel)
        });

    match best {
        Some(end_rel) => char_to_byte
            .binary_search(&(start_byte + end_rel))
            .unwrap_or_else(|pos| pos),
        None => limit,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    fn head(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    fn tail(s: &str, n: usize) -> String {
        let skip = char_len(s).saturating_sub(n);
        s.chars().skip(skip).collect()
    }

    fn reassemble(chunks: &[Chunk], overlap: usize) -> String {
        let mut out = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(&chunk.text);
            } else {
                out.extend(chunk.text.chars().skip(overlap));
            }
        }
        out
    }

    #[test]
    fn empty_text_no_chunks() {
        assert!(chunk_text("", 100, 10).is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text(
            "Hello, world!",
            DEFAULT_CHUNK_SIZE,
            DEFAULT_CHUNK_OVERLAP,
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, world!");
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_offset, 0);
    }

    #[test]
    fn long_text_multiple_chunks() {
        let text = "word ".repeat(500); // 2500 chars
        let chunks = chunk_text(&text, 1000, 200);

        assert!(chunks.len() >= 3);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(char_len(&chunk.text) <= 1000);
        }

        let first_end = chunks[0].start_offset + chunks[0].text.len();
        assert_eq!(chunks[1].start_offset, first_end - 200);
    }

    #[test]
    fn splits_after_sentences() {
        let text = "A cat sat. A dog ran. A cat and dog played.";
        let chunks = chunk_text(text, 20, 5);

        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text, "A cat sat. ");
        assert_eq!(chunks[1].text, "sat. A dog ran. ");
        assert_eq!(chunks[2].text, "ran. A cat and dog ");
        assert_eq!(chunks[3].text, " dog played.");
        assert_eq!(reassemble(&chunks, 5), text);
    }

    #[test]
    fn prefers_paragraph_over_sentence() {
        let text = "First one. Second one.\n\nThird paragraph goes here and on.";
        let chunks = chunk_text(text, 30, 0);
        assert_eq!(chunks[0].text, "First one. Second one.\n\n");
    }

    #[test]
    fn hard_cut_without_boundaries() {
        let text = "a".repeat(25);
        let chunks = chunk_text(&text, 10, 2);

        assert_eq!(chunks[0].text.len(), 10);
        assert_eq!(chunks[1].start_offset, 8);
        assert_eq!(reassemble(&chunks, 2), text);
    }

    #[test]
    fn overlap_is_clamped() {
        let text = "abcdefghij".repeat(3);
        let chunks = chunk_text(&text, 5, 50);
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks, 4), text);
    }

    #[test]
    fn whitespace_only_text() {
        let text = " ".repeat(50);
        let chunks = chunk_text(&text, 20, 5);
        assert!(!chunks.is_empty());
        assert_eq!(reassemble(&chunks, 5), text);
    }

    #[test]
    fn handles_emoji_and_multibyte_chars() {
        let emoji_text = "Hello 👉 world 🌍 test ".repeat(100);
        let chunks = chunk_text(&emoji_text, 200, 50);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(char_len(&chunk.text) <= 200);
            assert_eq!(
                &emoji_text[chunk.start_offset
                    ..chunk.start_offset + chunk.text.len()],
                chunk.text
            );
        }
        assert_eq!(reassemble(&chunks, 50), emoji_text);
    }

    #[test]
    fn splits_on_cjk_sentence_end() {
        let text = "营业收入增长。净利润下降。现金流稳定。".repeat(3);
        let chunks = chunk_text(&text, 10, 2);
        assert!(chunks[0].text.ends_with('。'));
        assert_eq!(reassemble(&chunks, 2), text);
    }

    #[test]
    fn config_validation() {
        assert!(ChunkingConfig::default().validate().is_ok());
        let zero = ChunkingConfig {
            chunk_size: 0,
            overlap: 0,
        };
        assert!(matches!(zero.validate(), Err(Error::Config(_))));
        let too_much = ChunkingConfig {
            chunk_size: 10,
            overlap: 10,
        };
        assert!(matches!(too_much.validate(), Err(Error::Config(_))));
    }

    fn chunk_inputs() -> impl Strategy<Value = (String, usize, usize)> {
        (r"[a-zé日 .!?\n]{0,400}", 1usize..64).prop_flat_map(|(text, size)| {
            (Just(text), Just(size), 0..size)
        })
    }

    proptest! {
        #[test]
        fn chunks_respect_max_size((text, size, overlap) in chunk_inputs()) {
            for chunk in chunk_text(&text, size, overlap) {
                prop_assert!(char_len(&chunk.text) <= size);
            }
        }

        #[test]
        fn consecutive_chunks_share_overlap(
            (text, size, overlap) in chunk_inputs()
        ) {
            let chunks = chunk_text(&text, size, overlap);
            for pair in chunks.windows(2) {
                prop_assert_eq!(
                    tail(&pair[0].text, overlap),
                    head(&pair[1].text, overlap)
                );
            }
        }

        #[test]
        fn reassembly_reconstructs_text((text, size, overlap) in chunk_inputs()) {
            let chunks = chunk_text(&text, size, overlap);
            prop_assert_eq!(reassemble(&chunks, overlap), text);
        }

        #[test]
        fn offsets_point_into_source((text, size, overlap) in chunk_inputs()) {
            for (i, chunk) in chunk_text(&text, size, overlap).iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert_eq!(
                    &text[chunk.start_offset..chunk.start_offset + chunk.text.len()],
                    chunk.text.as_str()
                );
            }
        }
    }
}
