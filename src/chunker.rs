use crate::errors::ChunkError;

/// Default ceiling on the UTF-8 size of one recognizer input.
pub const DEFAULT_MAX_BYTES: usize = 40_000;

/// Blank line between paragraphs.
pub const DEFAULT_SEPARATOR: &str = "\n\n";

/// How a chunk was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    /// One or more whole paragraphs that fit the budget together
    Block { paragraphs: usize },
    /// A character window cut out of a paragraph larger than the budget
    Window,
}

/// A contiguous slice of the source text handed to a recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub index: usize,
    pub text: &'a str,
    /// Codepoint offset of `text` within the full source
    pub char_offset: usize,
    pub kind: ChunkKind,
}

impl Chunk<'_> {
    pub fn byte_len(&self) -> usize {
        self.text.len()
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits text into paragraph blocks that each fit a byte budget.
///
/// Paragraphs keep their trailing separator, so chunks are adjacent slices
/// of the input: joining them gives back the input, and the offset of each
/// chunk is the character count of everything before it.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_bytes: usize,
    separator: String,
}

impl Chunker {
    pub fn new(max_bytes: usize, separator: &str) -> Result<Self, ChunkError> {
        if max_bytes < 4 {
            return Err(ChunkError::BudgetTooSmall(max_bytes));
        }
        if separator.is_empty() {
            return Err(ChunkError::EmptySeparator);
        }
        Ok(Self {
            max_bytes,
            separator: separator.to_string(),
        })
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Characters per window when a single paragraph overflows the budget.
    pub fn window_chars(&self) -> usize {
        (self.max_bytes / 2).max(1)
    }

    pub fn chunks<'a>(&self, text: &'a str) -> Vec<Chunk<'a>> {
        let mut builder = ChunkBuilder::new(text);

        // Pending block as a byte range of `text`
        let mut block_start = 0;
        let mut block_end = 0;
        let mut block_paragraphs = 0;
        let mut cursor = 0;

        for paragraph in text.split_inclusive(self.separator.as_str()) {
            let para_start = cursor;
            let para_end = para_start + paragraph.len();
            cursor = para_end;

            if paragraph.len() > self.max_bytes {
                if block_paragraphs > 0 {
                    builder.push(block_start, block_end, ChunkKind::Block {
                        paragraphs: block_paragraphs,
                    });
                }
                let mut window_start = para_start;
                while window_start < para_end {
                    let window_end = self.window_end(text, window_start, para_end);
                    builder.push(window_start, window_end, ChunkKind::Window);
                    window_start = window_end;
                }
                block_start = para_end;
                block_end = para_end;
                block_paragraphs = 0;
            } else if block_end - block_start + paragraph.len() > self.max_bytes {
                builder.push(block_start, block_end, ChunkKind::Block {
                    paragraphs: block_paragraphs,
                });
                block_start = para_start;
                block_end = para_end;
                block_paragraphs = 1;
            } else {
                block_end = para_end;
                block_paragraphs += 1;
            }
        }

        if block_paragraphs > 0 && block_end > block_start {
            builder.push(block_start, block_end, ChunkKind::Block {
                paragraphs: block_paragraphs,
            });
        }

        builder.finish()
    }

    /// End of the window starting at `start`: at most `window_chars`
    /// characters and never more than `max_bytes` bytes.
    fn window_end(&self, text: &str, start: usize, limit: usize) -> usize {
        let mut end = start;
        for (taken, ch) in text[start..limit].chars().enumerate() {
            if taken == self.window_chars() || end - start + ch.len_utf8() > self.max_bytes {
                break;
            }
            end += ch.len_utf8();
        }
        end
    }
}

/// Accumulates chunks and keeps the running character offset.
struct ChunkBuilder<'a> {
    text: &'a str,
    chunks: Vec<Chunk<'a>>,
    char_offset: usize,
}

impl<'a> ChunkBuilder<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chunks: Vec::new(),
            char_offset: 0,
        }
    }

    fn push(&mut self, start: usize, end: usize, kind: ChunkKind) {
        let slice = &self.text[start..end];
        let chunk = Chunk {
            index: self.chunks.len(),
            text: slice,
            char_offset: self.char_offset,
            kind,
        };
        self.char_offset += slice.chars().count();
        self.chunks.push(chunk);
    }

    fn finish(self) -> Vec<Chunk<'a>> {
        self.chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joined(chunks: &[Chunk<'_>]) -> String {
        chunks.iter().map(|c| c.text).collect()
    }

    #[test]
    fn test_small_text_is_one_chunk() {
        let chunker = Chunker::new(100, DEFAULT_SEPARATOR).unwrap();
        let text = "佐助は大阪に生まれた。\n\n春琴は盲目であった。";
        let chunks = chunker.chunks(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
        assert_eq!(chunks[0].char_offset, 0);
        assert_eq!(chunks[0].kind, ChunkKind::Block { paragraphs: 2 });
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let chunker = Chunker::new(100, DEFAULT_SEPARATOR).unwrap();
        assert!(chunker.chunks("").is_empty());
    }

    #[test]
    fn test_blocks_respect_budget_and_rebuild_text() {
        // Each paragraph is 3 CJK chars (9 bytes) + separator (2 bytes)
        let text = "春琴抄\n\n佐助女\n\n大阪府\n\n道修町\n\n鵙屋家";
        let chunker = Chunker::new(24, DEFAULT_SEPARATOR).unwrap();
        let chunks = chunker.chunks(text);

        assert_eq!(joined(&chunks), text);
        assert!(chunks.iter().all(|c| c.byte_len() <= 24));
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "春琴抄\n\n佐助女\n\n");
        // trailing block without separator is still flushed
        assert_eq!(chunks[2].text, "鵙屋家");
    }

    #[test]
    fn test_offsets_are_cumulative_characters() {
        let text = "春琴抄\n\n佐助女\n\n大阪府\n\n道修町";
        let chunker = Chunker::new(12, DEFAULT_SEPARATOR).unwrap();
        let chunks = chunker.chunks(text);

        let mut expected = 0;
        for chunk in &chunks {
            assert_eq!(chunk.char_offset, expected);
            let from_source: String = text.chars().skip(expected).take(chunk.char_len()).collect();
            assert_eq!(from_source, chunk.text);
            expected += chunk.char_len();
        }
        assert_eq!(expected, text.chars().count());
    }

    #[test]
    fn test_oversized_paragraph_falls_back_to_windows() {
        let long: String = "琴".repeat(10);
        let text = format!("前書\n\n{long}\n\n後書");
        // 30 bytes of 琴 + separator exceed 16; windows hold at most 8 chars / 16 bytes
        let chunker = Chunker::new(16, DEFAULT_SEPARATOR).unwrap();
        let chunks = chunker.chunks(&text);

        assert_eq!(joined(&chunks), text);
        assert!(chunks.iter().all(|c| c.byte_len() <= 16));
        assert_eq!(chunks[0].text, "前書\n\n");
        assert!(chunks[1..chunks.len() - 1]
            .iter()
            .all(|c| c.kind == ChunkKind::Window));
        assert_eq!(chunks.last().unwrap().text, "後書");
        assert_eq!(chunks.last().unwrap().char_offset, text.chars().count() - 2);
    }

    #[test]
    fn test_window_never_exceeds_character_count() {
        let text = "a".repeat(25);
        let chunker = Chunker::new(10, DEFAULT_SEPARATOR).unwrap();
        let chunks = chunker.chunks(&text);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.char_len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 5, 5]);
    }

    #[test]
    fn test_custom_separator() {
        let chunker = Chunker::new(8, "\n").unwrap();
        let chunks = chunker.chunks("abc\ndef\nghi");
        assert_eq!(joined(&chunks), "abc\ndef\nghi");
        assert_eq!(chunks[0].text, "abc\ndef\n");
    }

    #[test]
    fn test_rejects_tiny_budget_and_empty_separator() {
        assert!(matches!(
            Chunker::new(3, DEFAULT_SEPARATOR),
            Err(ChunkError::BudgetTooSmall(3))
        ));
        assert!(matches!(Chunker::new(100, ""), Err(ChunkError::EmptySeparator)));
    }
}
