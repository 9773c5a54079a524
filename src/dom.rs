use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::escape::{escape, partial_escape, unescape};
use quick_xml::events::{BytesStart, Event};

use crate::errors::XmlError;

/// Index of a node in a [`Document`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// An attribute as written in the source. The value is kept escaped so
/// untouched attributes serialize exactly as they were read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    raw_value: String,
}

impl Attribute {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            raw_value: escape(value).into_owned(),
        }
    }

    pub fn value(&self) -> Cow<'_, str> {
        unescape(&self.raw_value).unwrap_or(Cow::Borrowed(self.raw_value.as_str()))
    }

    fn write_to(&self, out: &mut String) {
        let quote = if self.raw_value.contains('"') { '\'' } else { '"' };
        out.push(' ');
        out.push_str(&self.name);
        out.push('=');
        out.push(quote);
        out.push_str(&self.raw_value);
        out.push(quote);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Qualified name, prefix included
    pub name: String,
    pub attributes: Vec<Attribute>,
    /// Written as `<name/>` when it has no children
    self_closing: bool,
}

impl Element {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    fn from_start(start: &BytesStart<'_>, self_closing: bool) -> Result<Self, XmlError> {
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            attributes.push(Attribute {
                name: String::from_utf8_lossy(attr.key.as_ref()).into_owned(),
                raw_value: String::from_utf8_lossy(&attr.value).into_owned(),
            });
        }
        Ok(Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            attributes,
            self_closing,
        })
    }

    /// Name without namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.rsplit_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<Cow<'_, str>> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(Attribute::value)
    }

    pub fn set_attribute(&mut self, name: &str, value: &str) {
        let attr = Attribute::new(name, value);
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => *existing = attr,
            None => self.attributes.push(attr),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element(Element),
    /// Unescaped character data
    Text(String),
    CData(String),
    Comment(String),
    /// `<?xml ...?>` content
    Declaration(String),
    ProcessingInstruction(String),
    DocType(String),
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A mutable XML tree stored as an arena.
///
/// Nodes are never freed: replacing a node only unlinks it, so a stale
/// [`NodeId`] stays valid to inspect but is reported as detached.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<NodeData>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: vec![NodeData {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub fn parse(xml: &str) -> Result<Self, XmlError> {
        let mut doc = Self::new();
        let mut reader = Reader::from_str(xml);
        let mut open = vec![doc.root()];

        loop {
            let parent = open[open.len() - 1];
            match reader.read_event()? {
                Event::Start(e) => {
                    let id = doc.alloc(NodeKind::Element(Element::from_start(&e, false)?));
                    doc.link(parent, id);
                    open.push(id);
                }
                Event::Empty(e) => {
                    let id = doc.alloc(NodeKind::Element(Element::from_start(&e, true)?));
                    doc.link(parent, id);
                }
                Event::End(e) => {
                    if open.len() == 1 {
                        return Err(XmlError::UnexpectedEnd(
                            String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                        ));
                    }
                    open.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape()?.into_owned();
                    let id = doc.alloc(NodeKind::Text(text));
                    doc.link(parent, id);
                }
                Event::CData(e) => {
                    let id = doc.alloc(NodeKind::CData(String::from_utf8_lossy(&e).into_owned()));
                    doc.link(parent, id);
                }
                Event::Comment(e) => {
                    let id = doc.alloc(NodeKind::Comment(String::from_utf8_lossy(&e).into_owned()));
                    doc.link(parent, id);
                }
                Event::Decl(e) => {
                    let id = doc.alloc(NodeKind::Declaration(
                        String::from_utf8_lossy(&e).into_owned(),
                    ));
                    doc.link(parent, id);
                }
                Event::PI(e) => {
                    let id = doc.alloc(NodeKind::ProcessingInstruction(
                        String::from_utf8_lossy(&e).into_owned(),
                    ));
                    doc.link(parent, id);
                }
                Event::DocType(e) => {
                    let id = doc.alloc(NodeKind::DocType(
                        String::from_utf8_lossy(&e).trim_start().to_string(),
                    ));
                    doc.link(parent, id);
                }
                Event::Eof => break,
            }
        }

        if open.len() > 1 {
            let name = doc
                .element(open[open.len() - 1])
                .map(|e| e.name.clone())
                .unwrap_or_default();
            return Err(XmlError::Unclosed(name));
        }
        if doc.document_element().is_none() {
            return Err(XmlError::NoRootElement);
        }
        Ok(doc)
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id.index()].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Content of a text node; `None` for every other kind.
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.index()].kind {
            NodeKind::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.index()].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.index()].children
    }

    /// True when `id` is reachable from the document node.
    pub fn is_attached(&self, mut id: NodeId) -> bool {
        loop {
            if id == self.root() {
                return true;
            }
            match self.parent(id) {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// The single top-level element.
    pub fn document_element(&self) -> Option<NodeId> {
        self.children(self.root())
            .iter()
            .copied()
            .find(|&id| self.element(id).is_some())
    }

    /// `id` and everything below it, in document order.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev());
        }
        out
    }

    /// First element in document order with the given local name.
    pub fn find_first(&self, local_name: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&id| self.element(id).is_some_and(|e| e.local_name() == local_name))
    }

    /// Create a detached element.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        self.alloc(NodeKind::Element(Element::new(name)))
    }

    /// Create a detached element with attributes and an optional text child.
    pub fn create_element_with(
        &mut self,
        name: &str,
        attributes: &[(&str, &str)],
        text: Option<&str>,
    ) -> NodeId {
        let mut element = Element::new(name);
        for (attr, value) in attributes {
            element.set_attribute(attr, value);
        }
        let id = self.alloc(NodeKind::Element(element));
        if let Some(text) = text {
            let child = self.alloc(NodeKind::Text(text.to_string()));
            self.link(id, child);
        }
        id
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeKind::Text(text.to_string()))
    }

    /// Append `child` as the last child of `parent`, unlinking it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), XmlError> {
        if !matches!(
            self.kind(parent),
            NodeKind::Document | NodeKind::Element(_)
        ) {
            return Err(XmlError::NotAContainer(parent));
        }
        self.unlink(child);
        self.link(parent, child);
        Ok(())
    }

    /// Put `replacements` where `old` was and unlink `old`.
    ///
    /// Fails with [`XmlError::Detached`] when `old` has already been
    /// replaced or was never part of the tree.
    pub fn replace_with(&mut self, old: NodeId, replacements: &[NodeId]) -> Result<(), XmlError> {
        let Some(parent) = self.parent(old) else {
            return Err(XmlError::Detached(old));
        };
        let Some(pos) = self.children(parent).iter().position(|&c| c == old) else {
            return Err(XmlError::Detached(old));
        };

        for &node in replacements {
            self.unlink(node);
            self.nodes[node.index()].parent = Some(parent);
        }
        self.nodes[parent.index()]
            .children
            .splice(pos..=pos, replacements.iter().copied());
        self.nodes[old.index()].parent = None;
        Ok(())
    }

    /// Concatenated text and CDATA below `id`.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.descendants(id) {
            match self.kind(node) {
                NodeKind::Text(text) | NodeKind::CData(text) => out.push_str(text),
                _ => {}
            }
        }
        out
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root(), &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Document => {
                for &child in self.children(id) {
                    self.write_node(child, out);
                }
            }
            NodeKind::Element(element) => {
                out.push('<');
                out.push_str(&element.name);
                for attr in &element.attributes {
                    attr.write_to(out);
                }
                let children = self.children(id);
                if children.is_empty() && element.self_closing {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for &child in children {
                    self.write_node(child, out);
                }
                out.push_str("</");
                out.push_str(&element.name);
                out.push('>');
            }
            NodeKind::Text(text) => out.push_str(&partial_escape(text)),
            NodeKind::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Declaration(text) | NodeKind::ProcessingInstruction(text) => {
                out.push_str("<?");
                out.push_str(text);
                out.push_str("?>");
            }
            NodeKind::DocType(text) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(text);
                out.push('>');
            }
        }
    }

    fn alloc(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(NodeData {
            kind,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    fn link(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child.index()].parent = Some(parent);
        self.nodes[parent.index()].children.push(child);
    }

    fn unlink(&mut self, child: NodeId) {
        if let Some(parent) = self.nodes[child.index()].parent.take() {
            self.nodes[parent.index()].children.retain(|&c| c != child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<TEI xmlns="http://www.tei-c.org/ns/1.0">
  <teiHeader><title type='main'>春琴抄</title></teiHeader>
  <text>
    <body>
      <p>佐助は<seg type="ruby"><rb>大阪</rb><rt>おおさか</rt></seg>に<lb/>生まれた。</p>
      <!-- 注 -->
    </body>
  </text>
</TEI>"#;

    #[test]
    fn test_round_trip_preserves_structure() {
        let doc = Document::parse(SAMPLE).unwrap();
        assert_eq!(doc.to_xml(), SAMPLE.replace("type='main'", "type=\"main\""));
    }

    #[test]
    fn test_escaped_text_is_unescaped_and_written_back() {
        let xml = r#"<p a="x &amp; y">A &amp; B &lt;C&gt;</p>"#;
        let doc = Document::parse(xml).unwrap();
        let p = doc.document_element().unwrap();
        assert_eq!(doc.text_content(p), "A & B <C>");
        assert_eq!(doc.element(p).unwrap().attribute("a").unwrap(), "x & y");
        assert_eq!(doc.to_xml(), xml);
    }

    #[test]
    fn test_find_first_uses_local_name_in_document_order() {
        let doc = Document::parse("<tei:TEI xmlns:tei='urn:x'><tei:text><tei:body/></tei:text><body/></tei:TEI>")
            .unwrap();
        let body = doc.find_first("body").unwrap();
        assert_eq!(doc.element(body).unwrap().name, "tei:body");
        assert!(doc.find_first("back").is_none());
    }

    #[test]
    fn test_replace_with_splices_children_in_place() {
        let mut doc = Document::parse("<p>a<b/>c</p>").unwrap();
        let p = doc.document_element().unwrap();
        let old = doc.children(p)[0];

        let x = doc.create_text("x");
        let y = doc.create_element("y");
        doc.replace_with(old, &[x, y]).unwrap();

        assert_eq!(doc.to_xml(), "<p>x<y></y><b/>c</p>");
        assert!(!doc.is_attached(old));
        assert!(doc.is_attached(y));
    }

    #[test]
    fn test_replacing_a_detached_node_fails() {
        let mut doc = Document::parse("<p>a</p>").unwrap();
        let p = doc.document_element().unwrap();
        let old = doc.children(p)[0];
        let first = doc.create_text("b");
        doc.replace_with(old, &[first]).unwrap();

        let second = doc.create_text("c");
        assert!(matches!(doc.replace_with(old, &[second]), Err(XmlError::Detached(id)) if id == old));
        assert_eq!(doc.to_xml(), "<p>b</p>");
    }

    #[test]
    fn test_append_child_escapes_new_attributes() {
        let mut doc = Document::parse("<TEI/>").unwrap();
        let root = doc.document_element().unwrap();
        let back = doc.create_element_with("back", &[("xml:id", "b\"1")], None);
        doc.append_child(root, back).unwrap();
        assert_eq!(doc.to_xml(), "<TEI><back xml:id=\"b&quot;1\"></back></TEI>");

        let text = doc.create_text("t");
        assert!(matches!(
            doc.append_child(text, back),
            Err(XmlError::NotAContainer(_))
        ));
    }

    #[test]
    fn test_malformed_documents_are_rejected() {
        assert!(matches!(Document::parse("<a><b></a>"), Err(XmlError::Parse(_))));
        assert!(Document::parse("<a><b>").is_err());
        assert!(matches!(Document::parse("<!-- only -->"), Err(XmlError::NoRootElement)));
    }
}
