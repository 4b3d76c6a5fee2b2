//! Output node tree shared by both backends.

use crate::util::escape_xml;

/// An XML node in the target vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// An XML element with ordered attributes and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: &'static str,
    pub attrs: Vec<(&'static str, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.attrs.push((name, value.into()));
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_children(mut self, children: impl IntoIterator<Item = Node>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Node::Text(text.into()))
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Insert text before the first text node (descending into the
    /// first child element when needed).
    pub fn prepend_text(&mut self, prefix: &str) {
        match self.children.first_mut() {
            Some(Node::Text(text)) => text.insert_str(0, prefix),
            _ => self.children.insert(0, Node::Text(prefix.to_string())),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(text.into())
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        }
    }

    /// Concatenated text content.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                for child in &el.children {
                    child.collect_text(out);
                }
            }
        }
    }

    /// Serialize as XML. Childless elements self-close.
    pub fn write_xml(&self, out: &mut String) {
        match self {
            Node::Text(text) => out.push_str(&escape_xml(text)),
            Node::Element(el) => {
                out.push('<');
                out.push_str(el.name);
                for (key, value) in &el.attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_xml(value));
                    out.push('"');
                }
                if el.children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in &el.children {
                    child.write_xml(out);
                }
                out.push_str("</");
                out.push_str(el.name);
                out.push('>');
            }
        }
    }

    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_xml(&mut out);
        out
    }
}

/// Serialize a sequence of nodes, one top-level node per line.
pub fn nodes_to_xml(nodes: &[Node]) -> String {
    let mut out = String::new();
    for node in nodes {
        node.write_xml(&mut out);
        out.push('\n');
    }
    out
}
