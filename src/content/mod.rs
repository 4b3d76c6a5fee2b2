//! Chapter content model.
//!
//! Both upstream encodings (HTML-like markup fragments and the JSON
//! block/inline document tree) normalize into [`ContentNode`] before
//! rendering, so nothing downstream depends on how a chapter arrived.

mod html;
mod markup;
mod tree;

pub use markup::from_markup_fragment;
pub use tree::from_block_tree;

/// Nesting bound for lists, quotes and inline wrappers.
pub const MAX_DEPTH: usize = 32;

/// Inline style annotation on a text run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Mark {
    Bold,
    Italic,
    Underline,
    Strike,
    /// A mark type this crate does not know. Rendered without visual effect.
    Unknown(String),
}

impl Mark {
    /// Map an upstream mark name (tree `marks[].type`) to a [`Mark`].
    pub fn from_name(name: &str) -> Mark {
        match name {
            "bold" => Mark::Bold,
            "italic" => Mark::Italic,
            "underline" => Mark::Underline,
            "strike" => Mark::Strike,
            other => Mark::Unknown(other.to_string()),
        }
    }
}

/// Text alignment of a paragraph or heading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Align {
    pub fn parse(value: &str) -> Align {
        match value.trim().to_ascii_lowercase().as_str() {
            "center" => Align::Center,
            "right" => Align::Right,
            "justify" => Align::Justify,
            _ => Align::Left,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Align::Left => "left",
            Align::Center => "center",
            Align::Right => "right",
            Align::Justify => "justify",
        }
    }
}

/// Inline content of a paragraph or heading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inline {
    /// A text run. `marks` are ordered outermost first; empty means plain.
    Text { text: String, marks: Vec<Mark> },
    /// Hard line break.
    Break,
}

impl Inline {
    pub fn text(text: impl Into<String>) -> Self {
        Inline::Text {
            text: text.into(),
            marks: Vec::new(),
        }
    }

    pub fn marked(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Inline::Text {
            text: text.into(),
            marks,
        }
    }
}

/// Reference to an image that still has to be resolved to bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ImageRef {
    /// Image addressed directly by URL (markup `<img src>`).
    Url(String),
    /// Image addressed by name in the chapter's attachment list.
    Attachment(String),
}

/// One list entry; holds block content.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ListItem {
    pub children: Vec<ContentNode>,
}

/// Normalized unit of chapter content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentNode {
    /// Bare inline content at block level.
    Text(Inline),
    Paragraph {
        align: Option<Align>,
        content: Vec<Inline>,
    },
    Heading {
        level: u8,
        align: Option<Align>,
        content: Vec<Inline>,
    },
    HorizontalRule,
    BulletList(Vec<ListItem>),
    OrderedList {
        start: u32,
        items: Vec<ListItem>,
    },
    /// A list item found outside of any list.
    ListItem(ListItem),
    Blockquote(Vec<ContentNode>),
    Image(ImageRef),
    /// Block type not understood; carries the upstream type name.
    Unknown(String),
}

impl ContentNode {
    pub fn paragraph(content: Vec<Inline>) -> Self {
        ContentNode::Paragraph {
            align: None,
            content,
        }
    }
}

/// Raw chapter content as delivered by the content source.
#[derive(Debug, Clone, PartialEq)]
pub enum ChapterContent {
    /// HTML-like markup fragment.
    Markup(String),
    /// JSON block/inline document tree (`content` array of a `doc` node).
    Tree(serde_json::Value),
    /// Any other payload type; carries the type name.
    Other(String),
}

impl ChapterContent {
    /// Normalize into content nodes.
    pub fn normalize(&self) -> crate::Result<Vec<ContentNode>> {
        match self {
            ChapterContent::Markup(raw) => from_markup_fragment(raw),
            ChapterContent::Tree(tree) => from_block_tree(tree),
            ChapterContent::Other(kind) => Err(crate::Error::MalformedContent(format!(
                "unrecognized chapter content type '{kind}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_from_name() {
        assert_eq!(Mark::from_name("bold"), Mark::Bold);
        assert_eq!(Mark::from_name("strike"), Mark::Strike);
        assert_eq!(Mark::from_name("highlight"), Mark::Unknown("highlight".into()));
    }

    #[test]
    fn test_align_parse() {
        assert_eq!(Align::parse("CENTER"), Align::Center);
        assert_eq!(Align::parse("start"), Align::Left);
    }

    #[test]
    fn test_unknown_content_type_is_malformed() {
        let err = ChapterContent::Other("pdf".into()).normalize().unwrap_err();
        assert!(matches!(err, crate::Error::MalformedContent(_)));
    }
}
