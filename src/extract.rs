use log::{debug, trace};
use tei_ner_types::{EntityLabel, EntityMention, RecognizedEntity};

use crate::chunker::{Chunk, Chunker};
use crate::errors::RecognizerError;
use crate::recognizer::Recognizer;

/// Counts gathered over one extraction run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractStats {
    pub chunks: usize,
    /// Entities returned by the recognizer, any label
    pub recognized: usize,
    /// Entities with one of the three target labels
    pub kept: usize,
}

/// Chunk `text`, run the recognizer on every chunk and return the target
/// mentions with offsets into the whole of `text`.
///
/// `on_chunk` is called after each chunk has been recognized. The first
/// recognizer error aborts the run.
pub fn extract_entities<F>(
    text: &str,
    chunker: &Chunker,
    recognizer: &dyn Recognizer,
    mut on_chunk: F,
) -> Result<(Vec<EntityMention>, ExtractStats), RecognizerError>
where
    F: FnMut(&Chunk<'_>),
{
    let chunks = chunker.chunks(text);
    let mut stats = ExtractStats {
        chunks: chunks.len(),
        ..Default::default()
    };
    let mut mentions = Vec::new();

    for chunk in &chunks {
        let recognized = recognizer.recognize(chunk.text)?;
        debug!(
            "Chunk {} ({:?}, {} bytes at char {}): {} entities from {}",
            chunk.index,
            chunk.kind,
            chunk.byte_len(),
            chunk.char_offset,
            recognized.len(),
            recognizer.name()
        );
        stats.recognized += recognized.len();

        let rebased = rebase(chunk, recognized)?;
        stats.kept += rebased.len();
        mentions.extend(rebased);
        on_chunk(chunk);
    }

    Ok((mentions, stats))
}

/// Validate chunk-relative spans, drop non-target labels and shift the rest
/// by the chunk's global character offset.
pub fn rebase(
    chunk: &Chunk<'_>,
    recognized: Vec<RecognizedEntity>,
) -> Result<Vec<EntityMention>, RecognizerError> {
    let len = chunk.char_len();
    let mut mentions = Vec::with_capacity(recognized.len());

    for entity in recognized {
        if entity.start_char > entity.end_char || entity.end_char > len {
            return Err(RecognizerError::InvalidSpan {
                start: entity.start_char,
                end: entity.end_char,
                len,
            });
        }
        let Some(label) = EntityLabel::from_label(&entity.label) else {
            trace!("Dropping {:?} labelled {}", entity.text, entity.label);
            continue;
        };
        mentions.push(EntityMention {
            text: entity.text,
            start: chunk.char_offset + entity.start_char,
            end: chunk.char_offset + entity.end_char,
            label,
        });
    }

    Ok(mentions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::DEFAULT_SEPARATOR;
    use crate::recognizer::GazetteerRecognizer;

    fn gazetteer(entries: &[(&str, &str)]) -> GazetteerRecognizer {
        GazetteerRecognizer::from_entries(
            entries
                .iter()
                .map(|(s, l)| (s.to_string(), l.to_string())),
        )
        .unwrap()
    }

    fn slice_chars(text: &str, start: usize, end: usize) -> String {
        text.chars().skip(start).take(end - start).collect()
    }

    /// Returns whatever it was built with, regardless of input.
    struct Canned(Vec<RecognizedEntity>);

    impl Recognizer for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        fn recognize(&self, _text: &str) -> Result<Vec<RecognizedEntity>, RecognizerError> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl Recognizer for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn recognize(&self, _text: &str) -> Result<Vec<RecognizedEntity>, RecognizerError> {
            Err(RecognizerError::Failed {
                program: "broken".into(),
                status: "exit status: 1".into(),
                stderr: "model not found".into(),
            })
        }
    }

    fn entity(text: &str, start: usize, end: usize, label: &str) -> RecognizedEntity {
        RecognizedEntity {
            text: text.to_string(),
            start_char: start,
            end_char: end,
            label: label.to_string(),
        }
    }

    #[test]
    fn test_offsets_point_into_source_across_chunks() {
        let text = "佐助は大阪に生まれた。\n\n春琴は道修町の娘。\n\n佐助と春琴。";
        let chunker = Chunker::new(40, DEFAULT_SEPARATOR).unwrap();
        let recognizer = gazetteer(&[
            ("佐助", "Person"),
            ("春琴", "Person"),
            ("大阪", "City"),
            ("道修町", "City"),
        ]);

        let mut seen = 0;
        let (mentions, stats) =
            extract_entities(text, &chunker, &recognizer, |_| seen += 1).unwrap();

        assert_eq!(stats.chunks, 3);
        assert_eq!(seen, 3);
        assert_eq!(mentions.len(), 6);
        for m in &mentions {
            assert_eq!(slice_chars(text, m.start, m.end), m.text);
        }
        let last = mentions.last().unwrap();
        assert_eq!(last.text, "春琴");
        assert_eq!(last.label, EntityLabel::Person);
    }

    #[test]
    fn test_offsets_survive_window_fallback() {
        let text = "前書。\n\n佐助佐助佐助佐助\n\n春琴";
        // The middle paragraph does not fit and is cut into windows
        let chunker = Chunker::new(12, DEFAULT_SEPARATOR).unwrap();
        let recognizer = gazetteer(&[("佐助", "Person"), ("春琴", "Person")]);

        let (mentions, _) = extract_entities(text, &chunker, &recognizer, |_| {}).unwrap();
        assert!(mentions.iter().any(|m| m.text == "春琴"));
        for m in &mentions {
            assert_eq!(slice_chars(text, m.start, m.end), m.text);
        }
    }

    #[test]
    fn test_non_target_labels_are_dropped() {
        let chunker = Chunker::new(100, DEFAULT_SEPARATOR).unwrap();
        let recognizer = Canned(vec![
            entity("鵙屋", 0, 2, "Organization"),
            entity("佐助", 2, 4, "Person"),
            entity("大阪", 4, 6, "city"),
        ]);
        let (mentions, stats) =
            extract_entities("鵙屋佐助大阪", &chunker, &recognizer, |_| {}).unwrap();
        assert_eq!(stats.recognized, 3);
        assert_eq!(stats.kept, 1);
        assert_eq!(mentions[0].text, "佐助");
    }

    #[test]
    fn test_span_past_chunk_end_is_fatal() {
        let chunker = Chunker::new(100, DEFAULT_SEPARATOR).unwrap();
        let recognizer = Canned(vec![entity("佐助", 2, 9, "Person")]);
        let err = extract_entities("佐助", &chunker, &recognizer, |_| {}).unwrap_err();
        assert!(matches!(
            err,
            RecognizerError::InvalidSpan { start: 2, end: 9, len: 2 }
        ));
    }

    #[test]
    fn test_recognizer_failure_aborts() {
        let chunker = Chunker::new(100, DEFAULT_SEPARATOR).unwrap();
        let mut seen = 0;
        let result = extract_entities("佐助", &chunker, &Broken, |_| seen += 1);
        assert!(matches!(result, Err(RecognizerError::Failed { .. })));
        assert_eq!(seen, 0);
    }

    #[test]
    fn test_empty_text() {
        let chunker = Chunker::new(100, DEFAULT_SEPARATOR).unwrap();
        let (mentions, stats) = extract_entities("", &chunker, &Broken, |_| {}).unwrap();
        assert!(mentions.is_empty());
        assert_eq!(stats.chunks, 0);
    }
}
