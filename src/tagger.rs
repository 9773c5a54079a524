use std::collections::HashMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::dom::{Document, Element, NodeId};
use crate::matcher::{Candidate, EntityMatcher};

// ── Protected subtrees ───────────────────────────────────────────────

/// An element whose content must never be tagged, e.g. ruby annotations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedElement {
    /// Local name, without namespace prefix
    pub element: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Required attribute value; any value when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl ProtectedElement {
    pub fn named(element: &str) -> Self {
        Self {
            element: element.to_string(),
            attribute: None,
            value: None,
        }
    }

    pub fn with_attribute(element: &str, attribute: &str, value: &str) -> Self {
        Self {
            element: element.to_string(),
            attribute: Some(attribute.to_string()),
            value: Some(value.to_string()),
        }
    }

    pub fn matches(&self, element: &Element) -> bool {
        if element.local_name() != self.element {
            return false;
        }
        match &self.attribute {
            None => true,
            Some(attr) => element
                .attribute(attr)
                .is_some_and(|actual| self.value.as_deref().is_none_or(|v| actual == v)),
        }
    }
}

// ── Per-run state ────────────────────────────────────────────────────

/// Occurrence counts for one tagging run, keyed by registry id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagContext {
    occurrences: HashMap<String, usize>,
    skipped: usize,
}

impl TagContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: &str, count: usize) {
        *self.occurrences.entry(id.to_string()).or_insert(0) += count;
    }

    pub fn count(&self, id: &str) -> usize {
        self.occurrences.get(id).copied().unwrap_or(0)
    }

    /// Total occurrences over all candidates of one matcher.
    pub fn total_for(&self, matcher: &EntityMatcher) -> usize {
        matcher.candidates().iter().map(|c| self.count(&c.id)).sum()
    }

    /// Fragments dropped because their node was no longer in the tree.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

// ── Walker ───────────────────────────────────────────────────────────

/// Wraps person and place names found in text nodes.
///
/// Each element is handled in two passes over its direct text children,
/// persons first, then places. Per pass, a fragment is split on the first
/// candidate it contains and no other candidate is tried on it.
pub struct Tagger<'a> {
    persons: &'a EntityMatcher,
    places: &'a EntityMatcher,
    protected: &'a [ProtectedElement],
}

impl<'a> Tagger<'a> {
    pub fn new(
        persons: &'a EntityMatcher,
        places: &'a EntityMatcher,
        protected: &'a [ProtectedElement],
    ) -> Self {
        Self {
            persons,
            places,
            protected,
        }
    }

    /// Tag everything below `start`. Counts are added to `ctx`, which is
    /// handed back when the walk is over.
    pub fn tag(&self, doc: &mut Document, start: NodeId, mut ctx: TagContext) -> TagContext {
        let mut work = vec![start];

        while let Some(node) = work.pop() {
            let Some(element) = doc.element(node) else {
                continue;
            };
            if self.is_protected(element) {
                debug!("Skipping protected <{}>", element.name);
                continue;
            }

            // Children as they were before this element was rewritten;
            // inline tags created below are never visited.
            let snapshot = doc.children(node).to_vec();
            for &child in &snapshot {
                self.apply(doc, child, self.persons, &mut ctx);
            }

            let refreshed = doc.children(node).to_vec();
            for &child in &refreshed {
                self.apply(doc, child, self.places, &mut ctx);
            }

            work.extend(
                snapshot
                    .iter()
                    .rev()
                    .copied()
                    .filter(|&child| doc.element(child).is_some()),
            );
        }

        ctx
    }

    /// Own inline tags are protected too, so tagged text is left alone
    /// when a document is processed a second time.
    fn is_protected(&self, element: &Element) -> bool {
        let local = element.local_name();
        local == self.persons.kind().tag()
            || local == self.places.kind().tag()
            || self.protected.iter().any(|p| p.matches(element))
    }

    fn apply(
        &self,
        doc: &mut Document,
        node: NodeId,
        matcher: &EntityMatcher,
        ctx: &mut TagContext,
    ) {
        let (candidate, parts, occurrences) = {
            let Some(text) = doc.text(node) else {
                return;
            };
            if !doc.is_attached(node) {
                debug!("Skipping detached text node {node:?}");
                ctx.skipped += 1;
                return;
            }
            if text.trim().is_empty() {
                return;
            }
            let Some(split) = matcher.split(text) else {
                return;
            };
            let parts: Vec<String> = split.parts.iter().map(|p| p.to_string()).collect();
            (split.candidate, parts, split.occurrences())
        };

        let replacements = build_replacements(doc, matcher, candidate, &parts);
        match doc.replace_with(node, &replacements) {
            Ok(()) => ctx.record(&candidate.id, occurrences),
            Err(err) => {
                debug!("Leaving fragment untagged: {err}");
                ctx.skipped += 1;
            }
        }
    }
}

/// Text parts interleaved with one inline tag per occurrence. Empty parts
/// are dropped.
fn build_replacements(
    doc: &mut Document,
    matcher: &EntityMatcher,
    candidate: &Candidate,
    parts: &[String],
) -> Vec<NodeId> {
    let reference = format!("#{}", candidate.id);
    let mut nodes = Vec::with_capacity(parts.len() * 2);
    for (i, part) in parts.iter().enumerate() {
        if !part.is_empty() {
            nodes.push(doc.create_text(part));
        }
        if i + 1 < parts.len() {
            nodes.push(doc.create_element_with(
                matcher.kind().tag(),
                &[("corresp", reference.as_str())],
                Some(&candidate.surface),
            ));
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{EntityKind, IdScheme};

    fn matcher(kind: EntityKind, list: &[&str]) -> EntityMatcher {
        EntityMatcher::new(
            kind,
            list.iter().map(|s| s.to_string()),
            IdScheme::Positional,
        )
    }

    fn default_protected() -> Vec<ProtectedElement> {
        vec![
            ProtectedElement::with_attribute("seg", "type", "ruby"),
            ProtectedElement::named("ruby"),
        ]
    }

    fn run(xml: &str, persons: &[&str], places: &[&str]) -> (String, TagContext) {
        let persons = matcher(EntityKind::Person, persons);
        let places = matcher(EntityKind::Place, places);
        let protected = default_protected();
        let mut doc = Document::parse(xml).unwrap();
        let root = doc.document_element().unwrap();
        let ctx = Tagger::new(&persons, &places, &protected).tag(&mut doc, root, TagContext::new());
        (doc.to_xml(), ctx)
    }

    #[test]
    fn test_person_then_place() {
        let (xml, ctx) = run("<body><p>佐助は大阪に生まれた。</p></body>", &["佐助"], &["大阪"]);
        assert_eq!(
            xml,
            "<body><p><persName corresp=\"#person_1\">佐助</persName>は\
             <placeName corresp=\"#place_1\">大阪</placeName>に生まれた。</p></body>"
        );
        assert_eq!(ctx.count("person_1"), 1);
        assert_eq!(ctx.count("place_1"), 1);
    }

    #[test]
    fn test_count_equals_wrapped_occurrences() {
        let (xml, ctx) = run("<p>佐助、佐助、佐助</p>", &["佐助"], &[]);
        assert_eq!(xml.matches("<persName").count(), 3);
        assert_eq!(ctx.count("person_1"), 3);
    }

    #[test]
    fn test_longest_name_wins() {
        let (xml, ctx) = run("<p>春琴女と春琴</p>", &["春琴", "春琴女"], &[]);
        // 春琴女 is person_1; the trailing 春琴 is in a later fragment of the same pass
        assert_eq!(
            xml,
            "<p><persName corresp=\"#person_1\">春琴女</persName>と春琴</p>"
        );
        assert!(!xml.contains("</persName>女"));
        assert_eq!(ctx.count("person_1"), 1);
        assert_eq!(ctx.count("person_2"), 0);
    }

    #[test]
    fn test_one_candidate_per_fragment_per_pass() {
        let (xml, ctx) = run("<p>佐助と利太郎</p>", &["佐助", "利太郎"], &[]);
        assert_eq!(
            xml,
            "<p>佐助と<persName corresp=\"#person_1\">利太郎</persName></p>"
        );
        assert_eq!(ctx.count("person_2"), 0);
    }

    #[test]
    fn test_ruby_subtree_is_not_entered() {
        let (xml, ctx) = run(
            "<p>佐助<seg type=\"ruby\"><rb>佐助</rb><rt>さすけ</rt></seg><ruby>佐助</ruby></p>",
            &["佐助"],
            &[],
        );
        assert!(xml.contains("<seg type=\"ruby\"><rb>佐助</rb><rt>さすけ</rt></seg>"));
        assert!(xml.contains("<ruby>佐助</ruby>"));
        assert_eq!(ctx.count("person_1"), 1);
    }

    #[test]
    fn test_other_seg_types_are_tagged() {
        let (_, ctx) = run("<p><seg type=\"emph\">佐助</seg></p>", &["佐助"], &[]);
        assert_eq!(ctx.count("person_1"), 1);
    }

    #[test]
    fn test_nested_elements_are_visited() {
        let (xml, ctx) = run(
            "<div><p>佐助</p><note><hi>大阪</hi></note></div>",
            &["佐助"],
            &["大阪"],
        );
        assert!(xml.contains("<hi><placeName corresp=\"#place_1\">大阪</placeName></hi>"));
        assert_eq!(ctx.count("person_1"), 1);
        assert_eq!(ctx.count("place_1"), 1);
    }

    #[test]
    fn test_second_run_does_not_retag() {
        let (first, _) = run("<p>佐助は大阪の人</p>", &["佐助"], &["大阪"]);
        let (second, ctx) = run(&first, &["佐助"], &["大阪"]);
        assert_eq!(first, second);
        assert_eq!(ctx.count("person_1"), 0);
        assert_eq!(ctx.count("place_1"), 0);
    }

    #[test]
    fn test_place_inside_person_tag_is_left_alone() {
        // 大阪屋 as a person name must not get a nested placeName
        let (xml, ctx) = run("<p>大阪屋</p>", &["大阪屋"], &["大阪"]);
        assert_eq!(xml, "<p><persName corresp=\"#person_1\">大阪屋</persName></p>");
        assert_eq!(ctx.count("place_1"), 0);
    }

    #[test]
    fn test_detached_fragment_is_skipped() {
        let persons = matcher(EntityKind::Person, &["佐助"]);
        let places = matcher(EntityKind::Place, &[]);
        let protected = Vec::new();
        let tagger = Tagger::new(&persons, &places, &protected);

        let mut doc = Document::parse("<p/>").unwrap();
        let loose = doc.create_text("佐助");
        let mut ctx = TagContext::new();
        tagger.apply(&mut doc, loose, &persons, &mut ctx);

        assert_eq!(ctx.count("person_1"), 0);
        assert_eq!(ctx.skipped(), 1);
        assert_eq!(doc.to_xml(), "<p/>");
    }

    #[test]
    fn test_whitespace_only_text_is_ignored() {
        let (xml, ctx) = run("<p>  \n </p>", &["佐助"], &[]);
        assert_eq!(xml, "<p>  \n </p>");
        assert_eq!(ctx.total_for(&matcher(EntityKind::Person, &["佐助"])), 0);
    }
}
