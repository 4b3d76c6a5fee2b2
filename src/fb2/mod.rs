//! Single-file XML backend: FictionBook 2.
//!
//! Lists are flattened into prefixed paragraphs since FB2 has no list
//! elements. Images are embedded as base64 `<binary>` blocks and referenced
//! by `#id`.

mod writer;

pub use writer::write_document;

use crate::backend::{Backend, WriteSeek};
use crate::book::{BookDraft, SequenceAxis};
use crate::content::{Align, Mark};
use crate::error::Result;
use crate::images::ImageResource;
use crate::render::{Element, HeadingRank, ListStyle, Node, Vocabulary};

/// Separator text used for horizontal rules.
pub const DIVIDER: &str = "***";

/// Configuration for FB2 output.
#[derive(Debug, Clone)]
pub struct Fb2Config {
    /// Language used when the metadata carries none.
    pub language: String,
    /// Written to `document-info/program-used`.
    pub program_used: String,
}

impl Default for Fb2Config {
    fn default() -> Self {
        Self {
            language: "ru".to_string(),
            program_used: concat!("ranobe2ebook ", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// FB2 format backend.
#[derive(Debug, Clone, Default)]
pub struct Fb2Backend {
    config: Fb2Config,
}

impl Fb2Backend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: Fb2Config) -> Self {
        self.config = config;
        self
    }
}

impl Vocabulary for Fb2Backend {
    fn list_style(&self) -> ListStyle {
        ListStyle::Prefixed
    }

    fn mark(&self, mark: &Mark) -> Element {
        match mark {
            Mark::Bold => Element::new("strong"),
            Mark::Italic => Element::new("emphasis"),
            Mark::Underline => Element::new("style").with_attr("name", "underline"),
            Mark::Strike => Element::new("strikethrough"),
            Mark::Unknown(name) => Element::new("style").with_attr("name", name.clone()),
        }
    }

    // FB2 paragraphs cannot hold line breaks.
    fn line_break(&self) -> Node {
        Node::text("\n")
    }

    // FictionBook has no alignment markup.
    fn paragraph(&self, _align: Align) -> Element {
        Element::new("p")
    }

    fn heading(&self, rank: HeadingRank, _align: Align, content: Vec<Node>) -> Element {
        match rank {
            HeadingRank::Major => {
                Element::new("title").with_child(Element::new("p").with_children(content))
            }
            HeadingRank::Minor => Element::new("subtitle").with_children(content),
        }
    }

    fn divider(&self) -> Node {
        Element::new("subtitle").with_text(DIVIDER).into()
    }

    fn quote(&self) -> Element {
        Element::new("epigraph")
    }

    fn image(&self, resource: &ImageResource) -> Node {
        Element::new("image")
            .with_attr("l:href", format!("#{}", resource.id))
            .into()
    }

    fn placeholder(&self) -> Node {
        Element::new("empty-line").into()
    }
}

impl Backend for Fb2Backend {
    fn extension(&self) -> &'static str {
        "fb2"
    }

    fn sequence_axis(&self) -> SequenceAxis {
        SequenceAxis::Volume
    }

    fn format_name(&self) -> &'static str {
        "FB2"
    }

    fn default_language(&self) -> &str {
        &self.config.language
    }

    fn write_book(&self, draft: &BookDraft, out: &mut dyn WriteSeek) -> Result<()> {
        write_document(draft, &self.config, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentNode, ImageRef, Inline, ListItem};
    use crate::error::Error;
    use crate::render::{ResolveImage, nodes_to_xml, render_chapter};
    use crate::util::MediaFormat;

    struct Fixed;

    impl ResolveImage for Fixed {
        fn resolve(&mut self, _: &ImageRef) -> Result<Option<ImageResource>> {
            Ok(Some(ImageResource::new("7_a.png", MediaFormat::Png, vec![0])))
        }
    }

    fn render(nodes: &[ContentNode]) -> String {
        nodes_to_xml(&render_chapter(&Fb2Backend::new(), &mut Fixed, nodes).body)
    }

    #[test]
    fn test_marks() {
        let text = Inline::Text {
            text: "x".into(),
            marks: vec![Mark::Bold, Mark::Underline, Mark::Strike],
        };
        assert_eq!(
            render(&[ContentNode::paragraph(vec![text])]),
            "<p><strong><style name=\"underline\"><strikethrough>x</strikethrough></style></strong></p>\n"
        );
    }

    #[test]
    fn test_blocks() {
        let nodes = vec![
            ContentNode::Heading {
                level: 2,
                align: None,
                content: vec![Inline::text("Major")],
            },
            ContentNode::Heading {
                level: 4,
                align: Some(Align::Center),
                content: vec![Inline::text("Minor")],
            },
            ContentNode::HorizontalRule,
            ContentNode::Blockquote(vec![ContentNode::paragraph(vec![Inline::text("q")])]),
            ContentNode::Image(ImageRef::Attachment("a".into())),
            ContentNode::Unknown("table".into()),
        ];
        assert_eq!(
            render(&nodes),
            "<title><p>Major</p></title>\n<subtitle>Minor</subtitle>\n<subtitle>***</subtitle>\n\
             <epigraph><p>q</p></epigraph>\n<image l:href=\"#7_a.png\"/>\n<empty-line/>\n"
        );
    }

    #[test]
    fn test_lists_are_prefixed_paragraphs() {
        let nodes = vec![ContentNode::OrderedList {
            start: 3,
            items: vec![
                ListItem {
                    children: vec![ContentNode::paragraph(vec![Inline::text("c")])],
                },
                ListItem {
                    children: vec![ContentNode::paragraph(vec![Inline::text("d")])],
                },
            ],
        }];
        assert_eq!(
            render(&nodes),
            "<p>\u{a0}\u{a0}3. c</p>\n<p>\u{a0}\u{a0}4. d</p>\n"
        );
    }

    #[test]
    fn test_failed_image_renders_empty_line() {
        struct Failing;
        impl ResolveImage for Failing {
            fn resolve(&mut self, _: &ImageRef) -> Result<Option<ImageResource>> {
                Err(Error::image("u", "404"))
            }
        }
        let nodes = [ContentNode::Image(ImageRef::Url("u".into()))];
        let rendered = render_chapter(&Fb2Backend::new(), &mut Failing, &nodes);
        assert_eq!(nodes_to_xml(&rendered.body), "<empty-line/>\n");
        assert_eq!(rendered.skipped.len(), 1);
    }
}
