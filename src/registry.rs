use std::fmt::Write;

use log::debug;
use quick_xml::escape::escape;

use crate::dom::{Document, NodeId};
use crate::errors::XmlError;
use crate::matcher::EntityMatcher;
use crate::tagger::TagContext;

/// Entries written per list by [`append_registry`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistrySummary {
    pub persons: usize,
    pub places: usize,
}

/// Append `listPerson` and `listPlace` to the document's back matter.
///
/// Only candidates that were actually wrapped at least once are listed, in
/// id order. A missing `back` is created under `text`, or under the document
/// element when there is no `text` either. Both lists are appended even when
/// empty, unless `back` already holds a list of that kind; an empty list is
/// then dropped so a re-run on tagged output adds nothing.
pub fn append_registry(
    doc: &mut Document,
    persons: &EntityMatcher,
    places: &EntityMatcher,
    ctx: &TagContext,
) -> Result<RegistrySummary, XmlError> {
    let back = find_or_create_back(doc)?;

    let person_list = build_list(doc, persons, |id| ctx.count(id) > 0)?;
    let place_list = build_list(doc, places, |id| ctx.count(id) > 0)?;
    let summary = RegistrySummary {
        persons: doc.children(person_list).len(),
        places: doc.children(place_list).len(),
    };

    for list in [person_list, place_list] {
        if doc.children(list).is_empty() && has_child_named(doc, back, list) {
            debug!("Keeping the existing <{}>", element_name(doc, list));
            continue;
        }
        doc.append_child(back, list)?;
    }
    Ok(summary)
}

/// Whether `parent` has an element child with the same name as `like`.
fn has_child_named(doc: &Document, parent: NodeId, like: NodeId) -> bool {
    let Some(name) = doc.element(like).map(|e| e.local_name()) else {
        return false;
    };
    doc.children(parent)
        .iter()
        .filter_map(|&child| doc.element(child))
        .any(|e| e.local_name() == name)
}

fn element_name(doc: &Document, id: NodeId) -> &str {
    doc.element(id).map(|e| e.name.as_str()).unwrap_or("?")
}

fn find_or_create_back(doc: &mut Document) -> Result<NodeId, XmlError> {
    if let Some(back) = doc.find_first("back") {
        return Ok(back);
    }
    let parent = match doc.find_first("text") {
        Some(text) => text,
        None => doc.document_element().ok_or(XmlError::NoRootElement)?,
    };
    let back = doc.create_element("back");
    doc.append_child(parent, back)?;
    Ok(back)
}

fn build_list(
    doc: &mut Document,
    matcher: &EntityMatcher,
    include: impl Fn(&str) -> bool,
) -> Result<NodeId, XmlError> {
    let kind = matcher.kind();
    let list = doc.create_element(kind.list_tag());
    for candidate in matcher.candidates().iter().filter(|c| include(&c.id)) {
        let entry = doc.create_element_with(
            kind.entry_tag(),
            &[("xml:id", candidate.id.as_str())],
            None,
        );
        let name = doc.create_element_with(kind.tag(), &[], Some(&candidate.surface));
        doc.append_child(entry, name)?;
        doc.append_child(list, entry)?;
    }
    Ok(list)
}

/// Render every candidate as an indented standalone fragment, persons
/// first. No XML declaration is written.
pub fn render_fragment(persons: &EntityMatcher, places: &EntityMatcher) -> String {
    let mut out = String::new();
    for matcher in [persons, places] {
        write_list(&mut out, matcher);
    }
    out
}

fn write_list(out: &mut String, matcher: &EntityMatcher) {
    let kind = matcher.kind();
    if matcher.is_empty() {
        let _ = writeln!(out, "<{}/>", kind.list_tag());
        return;
    }
    let _ = writeln!(out, "<{}>", kind.list_tag());
    for candidate in matcher.candidates() {
        let _ = writeln!(
            out,
            "    <{} xml:id=\"{}\">",
            kind.entry_tag(),
            escape(candidate.id.as_str())
        );
        let _ = writeln!(
            out,
            "        <{tag}>{}</{tag}>",
            escape(candidate.surface.as_str()),
            tag = kind.tag()
        );
        let _ = writeln!(out, "    </{}>", kind.entry_tag());
    }
    let _ = writeln!(out, "</{}>", kind.list_tag());
}
