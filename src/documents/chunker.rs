//! Document chunking strategies.
//!
//! Provides the `Chunker` trait and the fixed-window implementation used for
//! SOP documents. Windows are measured in characters, never bytes, so a split
//! may fall mid-word but never inside a UTF-8 sequence.

use super::config::ChunkingConfig;

/// A raw chunk before being assigned IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChunk {
    /// Character offset of the window start in the source text.
    pub char_offset: usize,

    /// The text content of this chunk.
    pub content: String,
}

impl RawChunk {
    /// Create a new raw chunk.
    pub fn new(char_offset: usize, content: String) -> Self {
        Self {
            char_offset,
            content,
        }
    }

    /// Get character count.
    pub fn char_count(&self) -> usize {
        self.content.chars().count()
    }
}

/// Trait for document chunking strategies.
pub trait Chunker: Send + Sync {
    /// Split document content into chunks.
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Vec<RawChunk>;
}

/// Fixed-size character windows with overlap.
///
/// No trimming, whitespace normalization or sentence detection: the chunks
/// cover the source text exactly, left to right, with no gaps.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedWindowChunker;

impl FixedWindowChunker {
    /// Create a new fixed-window chunker.
    pub fn new() -> Self {
        Self
    }
}

impl Chunker for FixedWindowChunker {
    fn chunk(&self, content: &str, config: &ChunkingConfig) -> Vec<RawChunk> {
        chunk_spans(content, config.chunk_size, config.overlap)
    }
}

/// Split `text` into overlapping windows of at most `chunk_size` characters.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    chunk_spans(text, chunk_size, overlap)
        .into_iter()
        .map(|chunk| chunk.content)
        .collect()
}

/// Same windows as [`chunk_text`], keeping each window's character offset.
///
/// The next window starts at `end - overlap` when that moves past the current
/// start, otherwise at `end`, so an overlap >= `chunk_size` still terminates.
/// A zero `chunk_size` is treated as one.
pub fn chunk_spans(text: &str, chunk_size: usize, overlap: usize) -> Vec<RawChunk> {
    if text.is_empty() {
        return Vec::new();
    }

    let size = chunk_size.max(1);

    // Byte position of every char boundary, including the end of the text
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let total_chars = boundaries.len() - 1;

    let mut chunks = Vec::with_capacity(total_chars / size + 1);
    let mut start = 0;

    loop {
        let end = (start + size).min(total_chars);
        chunks.push(RawChunk::new(
            start,
            text[boundaries[start]..boundaries[end]].to_string(),
        ));

        if end == total_chars {
            break;
        }

        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Undo the overlap: first chunk whole, then each later chunk minus the
    /// characters it shares with its predecessor.
    fn reconstruct(chunks: &[RawChunk]) -> String {
        let mut out = String::new();
        let mut covered = 0;
        for chunk in chunks {
            let skip = covered - chunk.char_offset;
            out.extend(chunk.content.chars().skip(skip));
            covered = chunk.char_offset + chunk.char_count();
        }
        out
    }

    #[test]
    fn test_empty_content() {
        assert!(chunk_text("", 800, 120).is_empty());
        assert!(chunk_text("", 10, 3).is_empty());
        assert!(
            FixedWindowChunker::new()
                .chunk("", &ChunkingConfig::default())
                .is_empty()
        );
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let text = "Berth allocation request must be filed 24h in advance.";
        assert_eq!(chunk_text(text, 800, 120), vec![text.to_string()]);

        // Exactly chunk_size characters
        let text = "abcdefghij";
        assert_eq!(chunk_text(text, 10, 3), vec![text.to_string()]);
    }

    #[test]
    fn test_boundary_offsets() {
        let text: String = ('a'..='y').collect();
        assert_eq!(text.chars().count(), 25);

        let spans = chunk_spans(&text, 10, 3);
        let offsets: Vec<usize> = spans.iter().map(|c| c.char_offset).collect();
        assert_eq!(offsets, vec![0, 7, 14, 21]);
        assert_eq!(spans.len(), 4);

        assert_eq!(spans[0].content, "abcdefghij");
        assert_eq!(spans[1].content, "hijklmnopq");
        assert_eq!(spans[2].content, "opqrstuvwx");
        assert_eq!(spans[3].content, "vwxy");
        assert!(spans[3].char_count() < 10);
    }

    #[test]
    fn test_all_but_last_have_full_size() {
        let text = "Container yard SOP. ".repeat(97);
        let spans = chunk_spans(&text, 64, 16);
        let (last, rest) = spans.split_last().unwrap();
        for chunk in rest {
            assert_eq!(chunk.char_count(), 64);
        }
        assert!(last.char_count() <= 64);

        for pair in spans.windows(2) {
            assert_eq!(pair[1].char_offset, pair[0].char_offset + 64 - 16);
            let tail: String = pair[0].content.chars().skip(64 - 16).collect();
            assert!(pair[1].content.starts_with(&tail));
        }
    }

    #[test]
    fn test_reconstruction_property() {
        let samples = [
            "x".to_string(),
            "short".to_string(),
            "Gate-in procedure: verify seal number, then weigh. ".repeat(40),
            "Übergabe – Kran 3 → Liegeplatz 7; ✓ geprüft. ".repeat(25),
            (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect(),
        ];

        for text in &samples {
            for size in [1usize, 2, 3, 7, 10, 64, 800] {
                for overlap in [0usize, 1, 3, 6] {
                    if overlap >= size {
                        continue;
                    }
                    let spans = chunk_spans(text, size, overlap);
                    assert_eq!(&reconstruct(&spans), text, "size={size} overlap={overlap}");
                }
            }
        }
    }

    #[test]
    fn test_overlap_not_smaller_than_size_terminates() {
        let text = "abcdefghijklmnopqrstuvwxyz";

        let equal = chunk_text(text, 5, 5);
        assert_eq!(equal, vec!["abcde", "fghij", "klmno", "pqrst", "uvwxy", "z"]);

        let larger = chunk_text(text, 5, 50);
        assert_eq!(larger, equal);
    }

    #[test]
    fn test_zero_chunk_size_terminates() {
        let chunks = chunk_text("abc", 0, 0);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "äöüßéèêëñç";
        let chunks = chunk_text(text, 4, 1);
        assert_eq!(chunks, vec!["äöüß", "ßéèê", "êëñç"]);
    }

    #[test]
    fn test_chunker_trait_uses_config() {
        let chunker = FixedWindowChunker::new();
        let config = ChunkingConfig {
            chunk_size: 10,
            overlap: 3,
        };
        let text: String = ('a'..='y').collect();
        let chunks = chunker.chunk(&text, &config);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[3].char_offset, 21);
    }
}
