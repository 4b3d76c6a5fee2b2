//! Block structure rendering.
//!
//! Walks normalized [`ContentNode`]s once and emits target-vocabulary
//! [`Node`]s. Everything format specific goes through [`Vocabulary`], so the
//! Container and Single-File XML backends share the same walk.

mod inline;
mod node;

pub use inline::render_marks;
pub use node::{Element, Node, nodes_to_xml};

use crate::content::{Align, ContentNode, ImageRef, Inline, ListItem, MAX_DEPTH};
use crate::error::{Error, Result};
use crate::images::ImageResource;

/// How a vocabulary expresses lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    /// List and list-item elements, nested per level.
    Native,
    /// Flattened paragraphs carrying a bullet/ordinal prefix, indented by depth.
    Prefixed,
}

/// Title distinction for headings. Targets only know two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingRank {
    Major,
    Minor,
}

impl HeadingRank {
    pub fn from_level(level: u8) -> HeadingRank {
        if level <= 2 {
            HeadingRank::Major
        } else {
            HeadingRank::Minor
        }
    }
}

/// Target-specific element choices.
pub trait Vocabulary {
    fn list_style(&self) -> ListStyle;

    /// Wrapper for one inline mark. Unknown marks get a neutral wrapper.
    fn mark(&self, mark: &crate::content::Mark) -> Element;

    fn line_break(&self) -> Node;

    fn paragraph(&self, align: Align) -> Element;

    fn heading(&self, rank: HeadingRank, align: Align, content: Vec<Node>) -> Element;

    fn divider(&self) -> Node;

    /// List container. Only consulted for [`ListStyle::Native`].
    fn list(&self, ordered: bool, _start: u32) -> Element {
        Element::new(if ordered { "ol" } else { "ul" })
    }

    /// List entry. Only consulted for [`ListStyle::Native`].
    fn list_item(&self) -> Element {
        Element::new("li")
    }

    fn quote(&self) -> Element;

    fn image(&self, resource: &ImageResource) -> Node;

    /// Empty stand-in for content that could not or should not be rendered.
    fn placeholder(&self) -> Node;

    fn is_paragraph(&self, element: &Element) -> bool {
        element.name == "p"
    }
}

/// Resolves image references while rendering.
pub trait ResolveImage {
    /// `Ok(None)` means images are switched off; render a placeholder.
    fn resolve(&mut self, image: &ImageRef) -> Result<Option<ImageResource>>;
}

/// Rendered chapter body plus the images that had to be skipped.
#[derive(Debug, Default)]
pub struct Rendered {
    pub body: Vec<Node>,
    pub skipped: Vec<Error>,
}

/// Prefix for one entry of a prefixed list.
///
/// `depth` starts at 1 for a top-level list; indentation grows with it.
pub fn list_prefix(ordinal: Option<u32>, depth: usize) -> String {
    let mut prefix = "\u{a0}".repeat(2 * depth);
    match ordinal {
        Some(n) => {
            prefix.push_str(&n.to_string());
            prefix.push_str(". ");
        }
        None => prefix.push_str("• "),
    }
    prefix
}

/// Render a chapter's nodes.
pub fn render_chapter<V, R>(vocab: &V, images: &mut R, nodes: &[ContentNode]) -> Rendered
where
    V: Vocabulary + ?Sized,
    R: ResolveImage + ?Sized,
{
    let mut renderer = BlockRenderer {
        vocab,
        images,
        skipped: Vec::new(),
    };
    let mut body = renderer.blocks(nodes, 0);
    strip_internal_attrs(&mut body);
    Rendered {
        body,
        skipped: renderer.skipped,
    }
}

struct BlockRenderer<'a, V: ?Sized, R: ?Sized> {
    vocab: &'a V,
    images: &'a mut R,
    skipped: Vec<Error>,
}

impl<V, R> BlockRenderer<'_, V, R>
where
    V: Vocabulary + ?Sized,
    R: ResolveImage + ?Sized,
{
    fn blocks(&mut self, nodes: &[ContentNode], list_depth: usize) -> Vec<Node> {
        let mut out = Vec::with_capacity(nodes.len());
        for node in nodes {
            self.block(node, list_depth, &mut out);
        }
        out
    }

    fn block(&mut self, node: &ContentNode, list_depth: usize, out: &mut Vec<Node>) {
        match node {
            ContentNode::Text(inline) => {
                let mut p = self.vocab.paragraph(Align::default());
                p.children = self.inlines(std::slice::from_ref(inline));
                out.push(p.into());
            }
            ContentNode::Paragraph { align, content } => {
                let mut p = self.vocab.paragraph(align.unwrap_or_default());
                p.children = self.inlines(content);
                out.push(p.into());
            }
            ContentNode::Heading {
                level,
                align,
                content,
            } => {
                let content = self.inlines(content);
                let heading = self.vocab.heading(
                    HeadingRank::from_level(*level),
                    align.unwrap_or_default(),
                    content,
                );
                out.push(heading.into());
            }
            ContentNode::HorizontalRule => out.push(self.vocab.divider()),
            ContentNode::BulletList(items) => self.list(items, None, list_depth, out),
            ContentNode::OrderedList { start, items } => {
                self.list(items, Some(*start), list_depth, out)
            }
            ContentNode::ListItem(item) => out.extend(self.blocks(&item.children, list_depth)),
            ContentNode::Blockquote(children) => {
                if list_depth >= MAX_DEPTH {
                    out.push(self.vocab.placeholder());
                    return;
                }
                let quote = self
                    .vocab
                    .quote()
                    .with_children(self.blocks(children, list_depth));
                out.push(quote.into());
            }
            ContentNode::Image(image) => out.push(self.image(image)),
            ContentNode::Unknown(kind) => {
                log::debug!("rendering placeholder for unknown block '{kind}'");
                out.push(self.vocab.placeholder());
            }
        }
    }

    fn list(&mut self, items: &[ListItem], start: Option<u32>, depth: usize, out: &mut Vec<Node>) {
        let depth = depth + 1;
        if depth > MAX_DEPTH {
            out.push(self.vocab.placeholder());
            return;
        }

        match self.vocab.list_style() {
            ListStyle::Native => {
                let mut list = self.vocab.list(start.is_some(), start.unwrap_or(1));
                for item in items {
                    let li = self
                        .vocab
                        .list_item()
                        .with_children(self.blocks(&item.children, depth));
                    list.children.push(li.into());
                }
                out.push(list.into());
            }
            ListStyle::Prefixed => {
                for (i, item) in items.iter().enumerate() {
                    let ordinal = start.map(|s| s.saturating_add(i as u32));
                    let prefix = list_prefix(ordinal, depth);
                    self.prefixed_item(item, &prefix, depth, out);
                }
            }
        }
    }

    fn prefixed_item(&mut self, item: &ListItem, prefix: &str, depth: usize, out: &mut Vec<Node>) {
        let continuation = "\u{a0}".repeat(prefix.chars().count());
        let mut labelled = false;
        for mut node in self.blocks(&item.children, depth) {
            if let Node::Element(el) = &mut node
                && self.vocab.is_paragraph(el)
                // Nested list entries already carry their own prefix.
                && !el.attrs.iter().any(|(k, _)| *k == LIST_MARKER_ATTR)
            {
                if labelled {
                    el.prepend_text(&continuation);
                } else {
                    el.prepend_text(prefix);
                    labelled = true;
                }
            }
            if !labelled {
                let mut label = self.vocab.paragraph(Align::Left);
                label.prepend_text(prefix);
                out.push(mark_list_entry(label).into());
                labelled = true;
            }
            out.push(mark_list_entry_node(node));
        }
        if !labelled {
            let mut label = self.vocab.paragraph(Align::Left);
            label.prepend_text(prefix);
            out.push(mark_list_entry(label).into());
        }
    }

    fn inlines(&self, content: &[Inline]) -> Vec<Node> {
        content
            .iter()
            .map(|inline| match inline {
                Inline::Text { text, marks } => render_marks(self.vocab, marks, text),
                Inline::Break => self.vocab.line_break(),
            })
            .collect()
    }

    fn image(&mut self, image: &ImageRef) -> Node {
        match self.images.resolve(image) {
            Ok(Some(resource)) => self.vocab.image(&resource),
            Ok(None) => self.vocab.placeholder(),
            Err(e) => {
                self.skipped.push(e);
                self.vocab.placeholder()
            }
        }
    }
}

/// Transient marker on paragraphs produced for prefixed list entries, so an
/// enclosing list does not prefix them again. Stripped before output.
const LIST_MARKER_ATTR: &str = "data-list-entry";

fn mark_list_entry(mut el: Element) -> Element {
    if !el.attrs.iter().any(|(k, _)| *k == LIST_MARKER_ATTR) {
        el.attrs.push((LIST_MARKER_ATTR, String::new()));
    }
    el
}

fn mark_list_entry_node(node: Node) -> Node {
    match node {
        Node::Element(el) => Node::Element(mark_list_entry(el)),
        text => text,
    }
}

fn strip_internal_attrs(nodes: &mut [Node]) {
    for node in nodes {
        if let Node::Element(el) = node {
            el.attrs.retain(|(k, _)| *k != LIST_MARKER_ATTR);
            strip_internal_attrs(&mut el.children);
        }
    }
}
