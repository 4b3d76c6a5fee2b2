use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use super::Fb2Config;
use crate::backend::WriteSeek;
use crate::book::{BookDraft, Metadata, RenderedChapter};
use crate::error::{Error, Result};
use crate::render::{Element, Node};
use crate::util::{escape_xml, now_utc};

const FB2_NS: &str = "http://www.gribuser.ru/xml/fictionbook/2.0";
const XLINK_NS: &str = "http://www.w3.org/1999/xlink";

/// Serialize a sealed draft as one FictionBook document.
pub fn write_document(
    draft: &BookDraft,
    config: &Fb2Config,
    out: &mut dyn WriteSeek,
) -> Result<()> {
    if !draft.is_sealed() {
        return Err(Error::Assembly("book must be finished before writing".to_string()));
    }

    let mut doc = String::new();
    doc.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    doc.push_str(&format!(
        "<FictionBook xmlns=\"{FB2_NS}\" xmlns:l=\"{XLINK_NS}\">\n"
    ));

    write_description(&mut doc, draft, config);

    doc.push_str("  <body>\n");
    doc.push_str(&format!(
        "    <title><p>{}</p></title>\n",
        escape_xml(&draft.metadata.title)
    ));
    for chapter in &draft.chapters {
        doc.push_str("    ");
        section(chapter).write_xml(&mut doc);
        doc.push('\n');
    }
    doc.push_str("  </body>\n");

    for image in draft.images.iter() {
        doc.push_str(&format!(
            "  <binary id=\"{}\" content-type=\"{}\">{}</binary>\n",
            escape_xml(&image.id),
            image.media_type(),
            STANDARD.encode(&image.data)
        ));
    }

    doc.push_str("</FictionBook>\n");
    out.write_all(doc.as_bytes())?;
    Ok(())
}

fn write_description(doc: &mut String, draft: &BookDraft, config: &Fb2Config) {
    let metadata = &draft.metadata;

    doc.push_str("  <description>\n    <title-info>\n");
    for genre in &metadata.genres {
        doc.push_str(&format!("      <genre>{}</genre>\n", escape_xml(genre)));
    }
    write_authors(doc, metadata, "      ");
    doc.push_str(&format!(
        "      <book-title>{}</book-title>\n",
        escape_xml(&metadata.title)
    ));

    if let Some(ref summary) = metadata.summary {
        doc.push_str("      <annotation>\n");
        for line in summary.lines().map(str::trim).filter(|l| !l.is_empty()) {
            doc.push_str(&format!("        <p>{}</p>\n", escape_xml(line)));
        }
        doc.push_str("      </annotation>\n");
    }

    if let Some(ref cover) = draft.cover {
        doc.push_str(&format!(
            "      <coverpage><image l:href=\"#{}\"/></coverpage>\n",
            escape_xml(&cover.id)
        ));
    }

    doc.push_str(&format!(
        "      <lang>{}</lang>\n",
        escape_xml(&metadata.language)
    ));

    if let Some(ref sequence) = draft.sequence {
        doc.push_str(&format!(
            "      <sequence name=\"{}\" number=\"{}\"/>\n",
            escape_xml(&sequence.name),
            escape_xml(&sequence.label())
        ));
    }
    doc.push_str("    </title-info>\n");

    let date = now_utc();
    let date = &date[..10];
    doc.push_str("    <document-info>\n");
    write_authors(doc, metadata, "      ");
    doc.push_str(&format!(
        "      <program-used>{}</program-used>\n",
        escape_xml(&config.program_used)
    ));
    doc.push_str(&format!("      <date value=\"{date}\">{date}</date>\n"));
    doc.push_str(&format!("      <id>{}</id>\n", metadata.uuid()));
    doc.push_str("      <version>1.0</version>\n");
    doc.push_str("    </document-info>\n  </description>\n");
}

// FB2 requires at least one author.
fn write_authors(doc: &mut String, metadata: &Metadata, indent: &str) {
    if metadata.authors.is_empty() {
        doc.push_str(&format!("{indent}<author><nickname>Unknown</nickname></author>\n"));
    }
    for author in &metadata.authors {
        doc.push_str(&format!(
            "{indent}<author><nickname>{}</nickname></author>\n",
            escape_xml(author)
        ));
    }
}

/// A chapter as a `<section>` opened by its title.
fn section(chapter: &RenderedChapter) -> Node {
    let title =
        Element::new("title").with_child(Element::new("p").with_text(chapter.title.clone()));
    let mut section = Element::new("section").with_child(title);
    if chapter.body.is_empty() {
        section.children.push(Element::new("empty-line").into());
    }
    section.children.extend(chapter.body.iter().cloned());
    section.into()
}
