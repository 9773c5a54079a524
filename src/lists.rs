use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tei_ner_types::{EntityLabel, EntityMention};

/// Deduplicated, sorted surfaces per label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityLists {
    pub persons: Vec<String>,
    pub provinces: Vec<String>,
    pub cities: Vec<String>,
}

impl EntityLists {
    /// Group mentions by label, keep the surface only, dedupe by exact
    /// string equality and sort ascending. No normalization is applied, so
    /// "大阪" and "ｵｵｻｶ" or full- and half-width digits stay distinct.
    pub fn from_mentions(mentions: &[EntityMention]) -> Self {
        let mut persons = BTreeSet::new();
        let mut provinces = BTreeSet::new();
        let mut cities = BTreeSet::new();

        for mention in mentions {
            let set = match mention.label {
                EntityLabel::Person => &mut persons,
                EntityLabel::Province => &mut provinces,
                EntityLabel::City => &mut cities,
            };
            set.insert(mention.text.clone());
        }

        Self {
            persons: persons.into_iter().collect(),
            provinces: provinces.into_iter().collect(),
            cities: cities.into_iter().collect(),
        }
    }

    pub fn get(&self, label: EntityLabel) -> &[String] {
        match label {
            EntityLabel::Person => &self.persons,
            EntityLabel::Province => &self.provinces,
            EntityLabel::City => &self.cities,
        }
    }

    pub fn total(&self) -> usize {
        self.persons.len() + self.provinces.len() + self.cities.len()
    }
}

/// `<prefix>_<Label>.txt`
pub fn list_file_name(prefix: &str, label: EntityLabel) -> String {
    format!("{prefix}_{label}.txt")
}

// ── Entity list files ────────────────────────────────────────────────

/// One surface per line; surrounding whitespace trimmed, blank lines dropped.
pub fn parse_entity_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_entity_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Cannot read entity list {}", path.display()))?;
    Ok(parse_entity_list(&content))
}

pub fn write_entity_list(path: &Path, surfaces: &[String]) -> Result<()> {
    let mut content = String::with_capacity(surfaces.iter().map(|s| s.len() + 1).sum());
    for surface in surfaces {
        content.push_str(surface);
        content.push('\n');
    }
    fs::write(path, content).with_context(|| format!("Cannot write {}", path.display()))
}

// ── Full records ─────────────────────────────────────────────────────

/// Every `(surface, label)` pair in extraction order, tab separated. The
/// gazetteer recognizer reads the same format back.
pub fn records_tsv(mentions: &[EntityMention]) -> String {
    mentions
        .iter()
        .map(|m| format!("{}\t{}\n", m.text, m.label))
        .collect()
}

pub fn write_records(path: &Path, mentions: &[EntityMention]) -> Result<()> {
    fs::write(path, records_tsv(mentions))
        .with_context(|| format!("Cannot write {}", path.display()))
}

pub fn write_mentions_json(path: &Path, mentions: &[EntityMention]) -> Result<()> {
    let json = serde_json::to_string_pretty(mentions)?;
    fs::write(path, json).with_context(|| format!("Cannot write {}", path.display()))
}
