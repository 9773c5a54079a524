#![allow(dead_code)]
use serde::{Deserialize, Serialize};

// ── Entity label ─────────────────────────────────────────────────────────

/// The three categories kept from recognizer output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityLabel {
    /// 人名
    Person,
    /// 国・県 level place names
    Province,
    /// 市・町 level place names
    City,
}

impl EntityLabel {
    pub const ALL: [EntityLabel; 3] = [Self::Person, Self::Province, Self::City];

    /// Parse a recognizer label. Exact match only: "person" or "CITY" are dropped.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Person" => Some(Self::Person),
            "Province" => Some(Self::Province),
            "City" => Some(Self::City),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Person => "Person",
            Self::Province => "Province",
            Self::City => "City",
        }
    }
}

impl std::fmt::Display for EntityLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Recognizer output ────────────────────────────────────────────────────

/// One entity as reported by a recognizer, relative to the chunk it was given.
///
/// Offsets are codepoint offsets, not byte offsets. The label is free-form;
/// anything other than `Person`/`Province`/`City` is filtered later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedEntity {
    pub text: String,
    pub start_char: usize,
    pub end_char: usize,
    pub label: String,
}

// ── Document-level mention ───────────────────────────────────────────────

/// A mention with offsets rebased onto the full source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityMention {
    pub text: String,
    /// Codepoint offset of the first character in the source text
    pub start: usize,
    /// Codepoint offset one past the last character
    pub end: usize,
    pub label: EntityLabel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_exact_match() {
        assert_eq!(EntityLabel::from_label("Person"), Some(EntityLabel::Person));
        assert_eq!(EntityLabel::from_label("City"), Some(EntityLabel::City));
        assert_eq!(EntityLabel::from_label("person"), None);
        assert_eq!(EntityLabel::from_label("Organization"), None);
    }

    #[test]
    fn test_label_round_trip_through_str() {
        for label in EntityLabel::ALL {
            assert_eq!(EntityLabel::from_label(label.as_str()), Some(label));
        }
    }
}
