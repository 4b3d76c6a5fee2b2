//! html5ever TreeSink building the small DOM the markup normalizer walks.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::tree_builder::{ElementFlags, NodeOrText, QuirksMode, TreeSink};
use html5ever::{Attribute, ParseOpts, QualName, parse_document};

use super::MAX_DEPTH;
use crate::error::{Error, Result};

/// Element nesting accepted when lowering the parse tree; inline wrappers
/// count too.
const MAX_ELEMENT_DEPTH: usize = MAX_DEPTH * 2;

/// Parsed markup, reduced to elements and text.
#[derive(Debug)]
pub(super) enum Dom {
    Element(Element),
    Text(String),
}

#[derive(Debug, Default)]
pub(super) struct Element {
    /// Lowercase local name.
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Dom>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// Parse a markup fragment the way a browser would and return the children
/// of its `<body>`.
pub(super) fn parse_body(raw: &str) -> Result<Vec<Dom>> {
    let wrapped = format!("<!DOCTYPE html><html><head></head><body>{raw}</body></html>");
    let sink = parse_document(HtmlSink::new(), ParseOpts::default())
        .from_utf8()
        .one(wrapped.as_bytes());

    let Some(body) = find_element(&sink.document, "body") else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for child in body.children.borrow().iter() {
        lower(child, 1, &mut out)?;
    }
    Ok(out)
}

fn find_element(root: &NodeRef, local: &str) -> Option<NodeRef> {
    let mut stack = vec![Rc::clone(root)];
    while let Some(node) = stack.pop() {
        if let NodeData::Element { name, .. } = &node.data
            && name.local.as_ref() == local
        {
            return Some(node);
        }
        stack.extend(node.children.borrow().iter().rev().cloned());
    }
    None
}

fn lower(node: &NodeRef, depth: usize, out: &mut Vec<Dom>) -> Result<()> {
    match &node.data {
        NodeData::Text(text) => out.push(Dom::Text(text.borrow().clone())),
        NodeData::Element { name, attrs } => {
            if depth > MAX_ELEMENT_DEPTH {
                return Err(Error::MalformedContent(format!(
                    "markup nesting deeper than {MAX_ELEMENT_DEPTH}"
                )));
            }
            let mut element = Element {
                name: name.local.to_string(),
                attrs: attrs
                    .borrow()
                    .iter()
                    .map(|a| (a.name.local.to_string(), a.value.to_string()))
                    .collect(),
                children: Vec::new(),
            };
            for child in node.children.borrow().iter() {
                lower(child, depth + 1, &mut element.children)?;
            }
            out.push(Dom::Element(element));
        }
        NodeData::Document | NodeData::Comment => {}
    }
    Ok(())
}

// ============================================================================
// Tree sink
// ============================================================================

type NodeRef = Rc<HtmlNode>;

enum NodeData {
    Document,
    Element {
        name: QualName,
        attrs: RefCell<Vec<Attribute>>,
    },
    Text(RefCell<String>),
    Comment,
}

struct HtmlNode {
    data: NodeData,
    parent: Cell<Option<Weak<HtmlNode>>>,
    children: RefCell<Vec<NodeRef>>,
}

impl HtmlNode {
    fn new(data: NodeData) -> NodeRef {
        Rc::new(HtmlNode {
            data,
            parent: Cell::new(None),
            children: RefCell::new(Vec::new()),
        })
    }
}

// Deep trees would otherwise drop recursively.
impl Drop for HtmlNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(self.children.get_mut());
        while let Some(node) = pending.pop() {
            if let Ok(mut node) = Rc::try_unwrap(node) {
                pending.append(node.children.get_mut());
            }
        }
    }
}

fn parent_of(node: &NodeRef) -> Option<NodeRef> {
    let weak = node.parent.take()?;
    let parent = weak.upgrade();
    node.parent.set(Some(weak));
    parent
}

fn detach(node: &NodeRef) {
    if let Some(parent) = node.parent.take().and_then(|weak| weak.upgrade()) {
        parent
            .children
            .borrow_mut()
            .retain(|child| !Rc::ptr_eq(child, node));
    }
}

fn push_child(parent: &NodeRef, child: NodeRef) {
    detach(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    parent.children.borrow_mut().push(child);
}

fn new_text(text: &str) -> NodeRef {
    HtmlNode::new(NodeData::Text(RefCell::new(text.to_string())))
}

/// TreeSink producing an `Rc` tree.
///
/// html5ever drives the sink through `&self`, so children and attributes
/// sit behind `RefCell`s. Element names are immutable, which lets
/// `elem_name` borrow straight from the handle.
struct HtmlSink {
    document: NodeRef,
}

impl HtmlSink {
    fn new() -> Self {
        Self {
            document: HtmlNode::new(NodeData::Document),
        }
    }
}

impl TreeSink for HtmlSink {
    type Handle = NodeRef;
    type Output = Self;
    type ElemName<'a>
        = &'a QualName
    where
        Self: 'a;

    fn finish(self) -> Self::Output {
        self
    }

    // Chapter markup is routinely sloppy; recover like a browser.
    fn parse_error(&self, _msg: Cow<'static, str>) {}

    fn get_document(&self) -> Self::Handle {
        Rc::clone(&self.document)
    }

    fn elem_name<'a>(&'a self, target: &'a Self::Handle) -> Self::ElemName<'a> {
        static EMPTY: QualName = QualName {
            prefix: None,
            ns: html5ever::ns!(),
            local: html5ever::local_name!(""),
        };
        match &target.data {
            NodeData::Element { name, .. } => name,
            _ => &EMPTY,
        }
    }

    fn create_element(
        &self,
        name: QualName,
        attrs: Vec<Attribute>,
        _flags: ElementFlags,
    ) -> Self::Handle {
        HtmlNode::new(NodeData::Element {
            name,
            attrs: RefCell::new(attrs),
        })
    }

    fn create_comment(&self, _text: StrTendril) -> Self::Handle {
        HtmlNode::new(NodeData::Comment)
    }

    fn create_pi(&self, _target: StrTendril, _data: StrTendril) -> Self::Handle {
        HtmlNode::new(NodeData::Comment)
    }

    fn append(&self, parent: &Self::Handle, child: NodeOrText<Self::Handle>) {
        match child {
            NodeOrText::AppendNode(node) => push_child(parent, node),
            NodeOrText::AppendText(text) => {
                {
                    let children = parent.children.borrow();
                    if let Some(last) = children.last()
                        && let NodeData::Text(existing) = &last.data
                    {
                        existing.borrow_mut().push_str(&text);
                        return;
                    }
                }
                push_child(parent, new_text(&text));
            }
        }
    }

    fn append_based_on_parent_node(
        &self,
        element: &Self::Handle,
        prev_element: &Self::Handle,
        child: NodeOrText<Self::Handle>,
    ) {
        if parent_of(element).is_some() {
            self.append_before_sibling(element, child);
        } else {
            self.append(prev_element, child);
        }
    }

    fn append_doctype_to_document(
        &self,
        _name: StrTendril,
        _public_id: StrTendril,
        _system_id: StrTendril,
    ) {
    }

    fn get_template_contents(&self, target: &Self::Handle) -> Self::Handle {
        Rc::clone(target)
    }

    fn same_node(&self, x: &Self::Handle, y: &Self::Handle) -> bool {
        Rc::ptr_eq(x, y)
    }

    fn set_quirks_mode(&self, _mode: QuirksMode) {}

    fn append_before_sibling(&self, sibling: &Self::Handle, new_node: NodeOrText<Self::Handle>) {
        let Some(parent) = parent_of(sibling) else {
            return;
        };
        let node = match new_node {
            NodeOrText::AppendNode(node) => {
                detach(&node);
                node
            }
            NodeOrText::AppendText(text) => {
                let children = parent.children.borrow();
                let index = children.iter().position(|c| Rc::ptr_eq(c, sibling));
                if let Some(i) = index
                    && i > 0
                    && let NodeData::Text(existing) = &children[i - 1].data
                {
                    existing.borrow_mut().push_str(&text);
                    return;
                }
                new_text(&text)
            }
        };

        node.parent.set(Some(Rc::downgrade(&parent)));
        let mut children = parent.children.borrow_mut();
        let index = children
            .iter()
            .position(|c| Rc::ptr_eq(c, sibling))
            .unwrap_or(children.len());
        children.insert(index, node);
    }

    fn add_attrs_if_missing(&self, target: &Self::Handle, attrs: Vec<Attribute>) {
        if let NodeData::Element {
            attrs: existing, ..
        } = &target.data
        {
            let mut existing = existing.borrow_mut();
            for attr in attrs {
                if !existing.iter().any(|a| a.name == attr.name) {
                    existing.push(attr);
                }
            }
        }
    }

    fn remove_from_parent(&self, target: &Self::Handle) {
        detach(target);
    }

    fn reparent_children(&self, node: &Self::Handle, new_parent: &Self::Handle) {
        let children = std::mem::take(&mut *node.children.borrow_mut());
        let mut adopted = new_parent.children.borrow_mut();
        for child in children {
            child.parent.set(Some(Rc::downgrade(new_parent)));
            adopted.push(child);
        }
    }
}
