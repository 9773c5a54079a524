use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::config::EmbedConfig;
use crate::dom::Document;
use crate::errors::XmlError;
use crate::matcher::{EntityKind, EntityMatcher};
use crate::registry::{RegistrySummary, append_registry};
use crate::tagger::{ProtectedElement, TagContext, Tagger};

/// Outcome of embedding markup into one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmbedReport {
    /// `persName` elements created
    pub persons_tagged: usize,
    /// `placeName` elements created
    pub places_tagged: usize,
    pub registry: RegistrySummary,
    /// False when neither `body` nor `text` exists
    pub body_found: bool,
    pub skipped: usize,
}

/// Person and place matchers plus the protected subtrees, built once and
/// applied to any number of documents.
#[derive(Debug, Clone)]
pub struct Embedder {
    persons: EntityMatcher,
    places: EntityMatcher,
    protected: Vec<ProtectedElement>,
}

impl Embedder {
    pub fn new(persons: Vec<String>, places: Vec<String>, config: &EmbedConfig) -> Self {
        let persons = EntityMatcher::new(EntityKind::Person, persons, config.id_scheme);
        let places = EntityMatcher::new(EntityKind::Place, places, config.id_scheme);
        info!(
            "Loaded {} person and {} place candidates",
            persons.len(),
            places.len()
        );
        debug!("Place samples: {:?}", sample(&places));
        Self {
            persons,
            places,
            protected: config.protected.clone(),
        }
    }

    pub fn persons(&self) -> &EntityMatcher {
        &self.persons
    }

    pub fn places(&self) -> &EntityMatcher {
        &self.places
    }

    /// Tag the document body and append the back-matter registry.
    ///
    /// Without a `body` (or `text`) element nothing is tagged, but the empty
    /// registry lists are still appended.
    pub fn embed(&self, doc: &mut Document) -> Result<EmbedReport, XmlError> {
        let start = doc.find_first("body").or_else(|| doc.find_first("text"));
        let ctx = match start {
            Some(start) => {
                debug!(
                    "Tagging below <{}> ({} characters of text)",
                    doc.element(start).map(|e| e.name.as_str()).unwrap_or("?"),
                    doc.text_content(start).chars().count()
                );
                let tagger = Tagger::new(&self.persons, &self.places, &self.protected);
                tagger.tag(doc, start, TagContext::new())
            }
            None => {
                warn!("No <body> or <text> element, leaving the document untagged");
                TagContext::new()
            }
        };

        let registry = append_registry(doc, &self.persons, &self.places, &ctx)?;
        debug!("Tagged persons: {:?}", counted(&self.persons, &ctx));
        debug!("Tagged places: {:?}", counted(&self.places, &ctx));

        Ok(EmbedReport {
            persons_tagged: ctx.total_for(&self.persons),
            places_tagged: ctx.total_for(&self.places),
            registry,
            body_found: start.is_some(),
            skipped: ctx.skipped(),
        })
    }

    /// Parse, embed and serialize.
    pub fn embed_str(&self, xml: &str) -> Result<(String, EmbedReport), XmlError> {
        let mut doc = Document::parse(xml)?;
        let report = self.embed(&mut doc)?;
        Ok((doc.to_xml(), report))
    }
}

/// `<output_dir>/<subdir>/<stem><suffix>.xml`, where `subdir` is the
/// input's directory relative to the scanned `root`. Documents with the same
/// stem in different subdirectories therefore get different outputs. When
/// `root` is the input file itself, `subdir` is empty.
pub fn tagged_output_path(input: &Path, root: &Path, output_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let subdir = input
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .unwrap_or(Path::new(""));
    output_dir.join(subdir).join(format!("{stem}{suffix}.xml"))
}

fn sample(matcher: &EntityMatcher) -> Vec<&str> {
    matcher
        .candidates()
        .iter()
        .take(5)
        .map(|c| c.surface.as_str())
        .collect()
}

fn counted<'m>(matcher: &'m EntityMatcher, ctx: &TagContext) -> Vec<(&'m str, usize)> {
    matcher
        .candidates()
        .iter()
        .map(|c| (c.surface.as_str(), ctx.count(&c.id)))
        .filter(|&(_, n)| n > 0)
        .take(5)
        .collect()
}
