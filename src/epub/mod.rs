//! Container backend: EPUB 3 packages with an NCX for older readers.
//!
//! Chapters become XHTML documents at the package root, images live under
//! `static/`, and navigation is built once the last chapter is in.

mod writer;

pub use writer::write_package;

use crate::backend::{Backend, WriteSeek, seal_with_sequence};
use crate::book::{BookDraft, SequenceAxis, SpineItem, TocEntry};
use crate::content::{Align, Mark};
use crate::error::Result;
use crate::images::ImageResource;
use crate::render::{Element, HeadingRank, ListStyle, Node, Vocabulary};

/// Navigation document, always first in reading order.
pub const NAV_ID: &str = "nav";
pub const NAV_HREF: &str = "nav.xhtml";

/// Configuration for EPUB output.
#[derive(Debug, Clone)]
pub struct EpubConfig {
    /// Language used when the metadata carries none.
    pub language: String,
    /// Compression level for deflate (0-9, default 6).
    pub compression_level: Option<u32>,
    /// Written as `dc:contributor`.
    pub contributor: Option<String>,
}

impl Default for EpubConfig {
    fn default() -> Self {
        Self {
            language: "ru".to_string(),
            compression_level: None,
            contributor: Some(concat!("ranobe2ebook ", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

/// EPUB format backend.
#[derive(Debug, Clone, Default)]
pub struct EpubBackend {
    config: EpubConfig,
}

impl EpubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EpubConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EpubConfig {
        &self.config
    }
}

pub fn chapter_id(index: usize) -> String {
    format!("chapter_{:04}", index + 1)
}

pub fn chapter_href(index: usize) -> String {
    format!("{}.xhtml", chapter_id(index))
}

fn text_align(align: Align) -> String {
    format!("text-align: {};", align.as_str())
}

impl Vocabulary for EpubBackend {
    fn list_style(&self) -> ListStyle {
        ListStyle::Native
    }

    fn mark(&self, mark: &Mark) -> Element {
        Element::new(match mark {
            Mark::Bold => "b",
            Mark::Italic => "i",
            Mark::Underline => "ins",
            Mark::Strike => "del",
            Mark::Unknown(_) => "span",
        })
    }

    fn line_break(&self) -> Node {
        Element::new("br").into()
    }

    fn paragraph(&self, align: Align) -> Element {
        Element::new("p").with_attr("style", text_align(align))
    }

    fn heading(&self, rank: HeadingRank, align: Align, content: Vec<Node>) -> Element {
        let name = match rank {
            HeadingRank::Major => "h2",
            HeadingRank::Minor => "h3",
        };
        Element::new(name)
            .with_attr("style", text_align(align))
            .with_children(content)
    }

    fn divider(&self) -> Node {
        Element::new("hr").with_attr("style", "width: 100%;").into()
    }

    fn list(&self, ordered: bool, start: u32) -> Element {
        if !ordered {
            return Element::new("ul");
        }
        let list = Element::new("ol");
        if start == 1 {
            list
        } else {
            list.with_attr("start", start.to_string())
        }
    }

    fn list_item(&self) -> Element {
        Element::new("li")
    }

    fn quote(&self) -> Element {
        Element::new("blockquote")
    }

    fn image(&self, resource: &ImageResource) -> Node {
        Element::new("div")
            .with_attr("class", "image")
            .with_child(
                Element::new("img")
                    .with_attr("src", resource.href())
                    .with_attr("alt", ""),
            )
            .into()
    }

    fn placeholder(&self) -> Node {
        Element::new("span").into()
    }
}

impl Backend for EpubBackend {
    fn extension(&self) -> &'static str {
        "epub"
    }

    fn sequence_axis(&self) -> SequenceAxis {
        SequenceAxis::Chapter
    }

    fn format_name(&self) -> &'static str {
        "EPUB"
    }

    fn default_language(&self) -> &str {
        &self.config.language
    }

    /// Build the table of contents (insertion order) and the spine, then
    /// seal. The spine opens with the navigation document, followed by the
    /// last chapter added and then the rest in insertion order.
    fn end_book(&self, draft: &mut BookDraft, sequence_name: &str) -> Result<()> {
        let count = draft.chapters.len();

        if !draft.is_sealed() {
            draft.toc = draft
                .chapters
                .iter()
                .enumerate()
                .map(|(i, chapter)| TocEntry::new(chapter.title.clone(), chapter_href(i), i + 1))
                .collect();

            let mut spine = vec![SpineItem {
                id: NAV_ID.to_string(),
                href: NAV_HREF.to_string(),
            }];
            let order = count
                .checked_sub(1)
                .into_iter()
                .chain(0..count.saturating_sub(1));
            spine.extend(order.map(|i| SpineItem {
                id: chapter_id(i),
                href: chapter_href(i),
            }));
            draft.spine = spine;
        }

        seal_with_sequence(draft, self.sequence_axis(), sequence_name)
    }

    fn write_book(&self, draft: &BookDraft, out: &mut dyn WriteSeek) -> Result<()> {
        write_package(draft, &self.config, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{ChapterMeta, Metadata, RenderedChapter};
    use crate::render::nodes_to_xml;

    fn add(backend: &EpubBackend, draft: &mut BookDraft, volume: u32, number: u32) {
        let meta = ChapterMeta::new(format!("n{number}"), volume, number);
        let chapter = RenderedChapter {
            title: meta.title(),
            volume: meta.volume,
            number: meta.number,
            body: Vec::new(),
        };
        backend.add_chapter(draft, chapter).unwrap();
    }

    #[test]
    fn test_spine_puts_last_chapter_after_nav() {
        let backend = EpubBackend::new();
        let mut draft = backend.make_book(Metadata::new("Book")).unwrap();
        for n in 1..=3 {
            add(&backend, &mut draft, 1, n);
        }
        backend.end_book(&mut draft, "Book").unwrap();

        let spine: Vec<&str> = draft.spine.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(spine, vec!["nav", "chapter_0003", "chapter_0001", "chapter_0002"]);

        let toc: Vec<&str> = draft.toc.iter().map(|t| t.href.as_str()).collect();
        assert_eq!(toc, vec!["chapter_0001.xhtml", "chapter_0002.xhtml", "chapter_0003.xhtml"]);
        assert_eq!(draft.sequence.as_ref().unwrap().label(), "Chapters 1 to 3");
    }

    #[test]
    fn test_empty_book_spine_is_nav_only() {
        let backend = EpubBackend::new();
        let mut draft = backend.make_book(Metadata::new("Book")).unwrap();
        backend.end_book(&mut draft, "Book").unwrap();
        assert_eq!(draft.spine.len(), 1);
        assert!(draft.toc.is_empty());
        assert!(backend.end_book(&mut draft, "Book").is_err());
    }

    #[test]
    fn test_vocabulary() {
        let backend = EpubBackend::new();
        let p = Node::from(backend.paragraph(Align::default()).with_text("x"));
        assert_eq!(p.to_xml(), r#"<p style="text-align: left;">x</p>"#);
        assert_eq!(backend.divider().to_xml(), r#"<hr style="width: 100%;"/>"#);
        assert_eq!(backend.mark(&Mark::Underline).name, "ins");
        assert_eq!(backend.mark(&Mark::Strike).name, "del");
        assert_eq!(
            nodes_to_xml(&[backend.list(true, 4).into(), backend.list(true, 1).into()]),
            "<ol start=\"4\"/>\n<ol/>\n"
        );
    }
}
