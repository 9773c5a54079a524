use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;

use log::{debug, warn};
use regex::{Regex, RegexBuilder};
use tei_ner_types::RecognizedEntity;

use crate::config::RecognizerConfig;
use crate::errors::RecognizerError;

/// A named-entity recognizer that works on one chunk at a time.
///
/// Offsets in the result are codepoint offsets relative to `text`. Rebasing
/// them onto the whole document is the caller's job.
pub trait Recognizer {
    fn name(&self) -> &str;

    fn recognize(&self, text: &str) -> Result<Vec<RecognizedEntity>, RecognizerError>;
}

/// Build the recognizer described by the configuration.
pub fn from_config(config: &RecognizerConfig) -> Result<Box<dyn Recognizer>, RecognizerError> {
    match config {
        RecognizerConfig::Gazetteer { path } => Ok(Box::new(GazetteerRecognizer::load(path)?)),
        RecognizerConfig::Command { program, args } => {
            Ok(Box::new(CommandRecognizer::new(program.clone(), args.clone())))
        }
    }
}

// ── Gazetteer ────────────────────────────────────────────────────────

/// Dictionary recognizer over a `surface<TAB>label` list.
///
/// All surfaces are compiled into one alternation, longest first, so the
/// leftmost match at any position is also the longest known name there.
#[derive(Debug)]
pub struct GazetteerRecognizer {
    pattern: Option<Regex>,
    labels: HashMap<String, String>,
}

impl GazetteerRecognizer {
    pub fn from_entries<I>(entries: I) -> Result<Self, RecognizerError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut labels = HashMap::new();
        let mut surfaces = Vec::new();
        for (surface, label) in entries {
            if surface.is_empty() || labels.contains_key(&surface) {
                continue;
            }
            surfaces.push(surface.clone());
            labels.insert(surface, label);
        }

        surfaces.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));

        let pattern = if surfaces.is_empty() {
            None
        } else {
            let alternation = surfaces
                .iter()
                .map(|s| regex::escape(s))
                .collect::<Vec<_>>()
                .join("|");
            Some(RegexBuilder::new(&alternation).size_limit(64 << 20).build()?)
        };

        Ok(Self { pattern, labels })
    }

    /// Parse gazetteer content. Blank lines are skipped; every other line
    /// needs a surface and a label separated by a tab.
    pub fn parse(content: &str) -> Result<Self, RecognizerError> {
        let mut entries = Vec::new();
        for (idx, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let Some((surface, label)) = line.split_once('\t') else {
                return Err(RecognizerError::Gazetteer {
                    line: idx + 1,
                    reason: "expected `surface<TAB>label`".to_string(),
                });
            };
            let (surface, label) = (surface.trim(), label.trim());
            if surface.is_empty() || label.is_empty() {
                return Err(RecognizerError::Gazetteer {
                    line: idx + 1,
                    reason: "empty surface or label".to_string(),
                });
            }
            entries.push((surface.to_string(), label.to_string()));
        }
        Self::from_entries(entries)
    }

    pub fn load(path: &Path) -> Result<Self, RecognizerError> {
        let content = fs::read_to_string(path)?;
        let gazetteer = Self::parse(&content)?;
        if gazetteer.is_empty() {
            warn!("Gazetteer {} has no entries, nothing will be recognized", path.display());
        }
        debug!(
            "Loaded gazetteer {} ({} entries)",
            path.display(),
            gazetteer.len()
        );
        Ok(gazetteer)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Recognizer for GazetteerRecognizer {
    fn name(&self) -> &str {
        "gazetteer"
    }

    fn recognize(&self, text: &str) -> Result<Vec<RecognizedEntity>, RecognizerError> {
        let Some(pattern) = &self.pattern else {
            return Ok(Vec::new());
        };

        let mut entities = Vec::new();
        // Byte → char conversion, advanced incrementally between matches
        let mut byte_pos = 0;
        let mut char_pos = 0;
        for m in pattern.find_iter(text) {
            char_pos += text[byte_pos..m.start()].chars().count();
            let len = m.as_str().chars().count();
            entities.push(RecognizedEntity {
                text: m.as_str().to_string(),
                start_char: char_pos,
                end_char: char_pos + len,
                label: self.labels[m.as_str()].clone(),
            });
            char_pos += len;
            byte_pos = m.end();
        }
        Ok(entities)
    }
}

// ── External command ─────────────────────────────────────────────────

/// Runs an external program once per chunk.
///
/// The chunk is written to the program's stdin; stdout must hold a JSON
/// array of `{"text", "start_char", "end_char", "label"}` objects. This is
/// how a Python NER model (spaCy, GiNZA) is plugged in.
#[derive(Debug, Clone)]
pub struct CommandRecognizer {
    program: String,
    args: Vec<String>,
}

impl CommandRecognizer {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }
}

impl Recognizer for CommandRecognizer {
    fn name(&self) -> &str {
        &self.program
    }

    fn recognize(&self, text: &str) -> Result<Vec<RecognizedEntity>, RecognizerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecognizerError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        // stdin is fed from its own thread while stdout and stderr drain
        // here, so neither side blocks on a full pipe.
        let stdin = child.stdin.take();
        let (output, written) = thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(text.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(io::Error::other("stdin writer panicked")));
            (output, written)
        });

        // A program that exits early closes its stdin; its exit status and
        // stderr say more than the resulting broken pipe.
        let output = output?;
        if !output.status.success() {
            return Err(RecognizerError::Failed {
                program: self.program.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        written?;
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}
