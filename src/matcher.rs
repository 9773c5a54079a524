use std::collections::HashSet;
use std::fmt::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// The two families of names the embedder tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Person,
    Place,
}

impl EntityKind {
    /// Inline element wrapping a mention
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Person => "persName",
            Self::Place => "placeName",
        }
    }

    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Place => "place",
        }
    }

    /// Back-matter registry container
    pub fn list_tag(&self) -> &'static str {
        match self {
            Self::Person => "listPerson",
            Self::Place => "listPlace",
        }
    }

    /// One registry entry inside the container
    pub fn entry_tag(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Place => "place",
        }
    }
}

/// How registry identifiers are derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdScheme {
    /// `person_<n>`, n = 1-based rank in the longest-first order.
    /// Changes whenever the candidate list changes.
    #[default]
    Positional,
    /// `person_<hex>` from a SHA-256 of the surface string
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub surface: String,
    pub id: String,
}

/// Result of splitting one text fragment on a candidate.
#[derive(Debug)]
pub struct Split<'m, 't> {
    pub candidate: &'m Candidate,
    /// Text around the occurrences; there are `occurrences() + 1` parts
    pub parts: Vec<&'t str>,
}

impl Split<'_, '_> {
    pub fn occurrences(&self) -> usize {
        self.parts.len() - 1
    }
}

/// Candidate names ordered longest first, with their registry ids.
///
/// Ordering by descending length is what keeps "春琴女" from being tagged
/// as "春琴" followed by a stray "女": the first containing candidate wins.
#[derive(Debug, Clone)]
pub struct EntityMatcher {
    kind: EntityKind,
    candidates: Vec<Candidate>,
}

impl EntityMatcher {
    pub fn new<I>(kind: EntityKind, surfaces: I, scheme: IdScheme) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut seen = HashSet::new();
        let mut surfaces: Vec<String> = surfaces
            .into_iter()
            .filter(|s| !s.is_empty() && seen.insert(s.clone()))
            .collect();
        // Stable: equal lengths keep list order
        surfaces.sort_by_key(|s| std::cmp::Reverse(s.chars().count()));

        let mut used_ids = HashSet::new();
        let candidates = surfaces
            .into_iter()
            .enumerate()
            .map(|(i, surface)| {
                let id = match scheme {
                    IdScheme::Positional => format!("{}_{}", kind.id_prefix(), i + 1),
                    IdScheme::Content => content_id(kind.id_prefix(), &surface, &used_ids),
                };
                used_ids.insert(id.clone());
                Candidate { surface, id }
            })
            .collect();

        Self { kind, candidates }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// First candidate, in longest-first order, contained in `text`.
    pub fn find(&self, text: &str) -> Option<&Candidate> {
        self.candidates
            .iter()
            .find(|c| text.contains(c.surface.as_str()))
    }

    /// Split `text` on every occurrence of the first matching candidate.
    /// Later candidates are not tried on the same fragment.
    pub fn split<'t>(&self, text: &'t str) -> Option<Split<'_, 't>> {
        let candidate = self.find(text)?;
        Some(Split {
            candidate,
            parts: text.split(candidate.surface.as_str()).collect(),
        })
    }
}

/// Encode bytes as lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, b| {
        let _ = write!(acc, "{:02x}", b);
        acc
    })
}

fn content_id(prefix: &str, surface: &str, used: &HashSet<String>) -> String {
    let digest = Sha256::digest(surface.as_bytes());
    let short = format!("{}_{}", prefix, hex_encode(&digest[..4]));
    if used.contains(&short) {
        format!("{}_{}", prefix, hex_encode(&digest))
    } else {
        short
    }
}
