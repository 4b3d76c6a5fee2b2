use std::io::Write;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{EpubConfig, NAV_HREF, NAV_ID, chapter_href, chapter_id};
use crate::backend::WriteSeek;
use crate::book::{BookDraft, RenderedChapter, TocEntry};
use crate::error::{Error, Result};
use crate::render::nodes_to_xml;
use crate::util::{escape_xml, now_utc};

/// Serialize a sealed draft as an EPUB package.
///
/// Layout: `mimetype` (stored, first), `META-INF/container.xml`, and under
/// `OEBPS/` the package document, `toc.ncx`, `nav.xhtml`, one XHTML file per
/// chapter and every registered image at `static/{id}`.
pub fn write_package(
    draft: &BookDraft,
    config: &EpubConfig,
    writer: &mut dyn WriteSeek,
) -> Result<()> {
    if !draft.is_sealed() {
        return Err(Error::Assembly("book must be finished before writing".to_string()));
    }

    let mut zip = ZipWriter::new(writer);

    let compression_level = config.compression_level.unwrap_or(6);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(compression_level as i64));

    // mimetype must be first and uncompressed
    zip.start_file("mimetype", stored)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)?;
    zip.write_all(CONTAINER_XML)?;

    let identifier = format!("urn:uuid:{}", draft.metadata.uuid());

    zip.start_file("OEBPS/content.opf", deflated)?;
    zip.write_all(generate_opf(draft, config, &identifier).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", deflated)?;
    zip.write_all(generate_ncx(draft, &identifier).as_bytes())?;

    zip.start_file(format!("OEBPS/{NAV_HREF}"), deflated)?;
    zip.write_all(generate_nav(draft).as_bytes())?;

    for (i, chapter) in draft.chapters.iter().enumerate() {
        zip.start_file(format!("OEBPS/{}", chapter_href(i)), deflated)?;
        zip.write_all(chapter_document(chapter, &draft.metadata.language).as_bytes())?;
    }

    // Images are already compressed
    for image in draft.images.iter() {
        zip.start_file(format!("OEBPS/{}", image.href()), stored)?;
        zip.write_all(&image.data)?;
    }

    zip.finish()?;
    Ok(())
}

const CONTAINER_XML: &[u8] = br#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

fn generate_opf(draft: &BookDraft, config: &EpubConfig, identifier: &str) -> String {
    let metadata = &draft.metadata;
    let mut opf = String::new();

    opf.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="BookId">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
"#,
    );

    opf.push_str(&format!(
        "    <dc:identifier id=\"BookId\">{}</dc:identifier>\n",
        escape_xml(identifier)
    ));
    opf.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        escape_xml(&metadata.title)
    ));
    opf.push_str(&format!(
        "    <dc:language>{}</dc:language>\n",
        escape_xml(&metadata.language)
    ));
    opf.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        now_utc()
    ));

    for author in &metadata.authors {
        opf.push_str(&format!(
            "    <dc:creator>{}</dc:creator>\n",
            escape_xml(author)
        ));
    }
    if let Some(ref contributor) = config.contributor {
        opf.push_str(&format!(
            "    <dc:contributor>{}</dc:contributor>\n",
            escape_xml(contributor)
        ));
    }
    for genre in &metadata.genres {
        opf.push_str(&format!(
            "    <dc:subject>{}</dc:subject>\n",
            escape_xml(genre)
        ));
    }
    if let Some(ref summary) = metadata.summary {
        opf.push_str(&format!(
            "    <dc:description>{}</dc:description>\n",
            escape_xml(summary)
        ));
    }
    if let Some(ref source) = metadata.source_url {
        opf.push_str(&format!(
            "    <dc:source>{}</dc:source>\n",
            escape_xml(source)
        ));
    }

    if let Some(ref sequence) = draft.sequence {
        opf.push_str(&format!(
            "    <meta name=\"series\" content=\"{}\"/>\n",
            escape_xml(&sequence.name)
        ));
        opf.push_str(&format!(
            "    <meta name=\"series_index\" content=\"{}\"/>\n",
            escape_xml(&sequence.label())
        ));
        opf.push_str(&format!(
            "    <meta property=\"belongs-to-collection\" id=\"series\">{}</meta>\n",
            escape_xml(&sequence.name)
        ));
        opf.push_str("    <meta refines=\"#series\" property=\"collection-type\">series</meta>\n");
    }

    if draft.cover.is_some() {
        opf.push_str("    <meta name=\"cover\" content=\"cover-image\"/>\n");
    }

    opf.push_str("  </metadata>\n  <manifest>\n");
    opf.push_str(
        "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
    );
    opf.push_str(&format!(
        "    <item id=\"{NAV_ID}\" href=\"{NAV_HREF}\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n"
    ));

    for i in 0..draft.chapters.len() {
        opf.push_str(&format!(
            "    <item id=\"{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
            chapter_id(i),
            chapter_href(i)
        ));
    }

    let cover_id = draft.cover.as_ref().map(|c| c.id.as_str());
    for (i, image) in draft.images.iter().enumerate() {
        if Some(image.id.as_str()) == cover_id {
            opf.push_str(&format!(
                "    <item id=\"cover-image\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\"/>\n",
                escape_xml(&image.href()),
                image.media_type()
            ));
        } else {
            opf.push_str(&format!(
                "    <item id=\"image_{}\" href=\"{}\" media-type=\"{}\"/>\n",
                i + 1,
                escape_xml(&image.href()),
                image.media_type()
            ));
        }
    }

    opf.push_str("  </manifest>\n  <spine toc=\"ncx\">\n");
    for item in &draft.spine {
        opf.push_str(&format!(
            "    <itemref idref=\"{}\"/>\n",
            escape_xml(&item.id)
        ));
    }
    opf.push_str("  </spine>\n</package>\n");
    opf
}

fn generate_ncx(draft: &BookDraft, identifier: &str) -> String {
    let mut ncx = String::new();

    ncx.push_str(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content=""#,
    );
    ncx.push_str(&escape_xml(identifier));
    ncx.push_str(
        r#""/>
    <meta name="dtb:depth" content="1"/>
    <meta name="dtb:totalPageCount" content="0"/>
    <meta name="dtb:maxPageNumber" content="0"/>
  </head>
  <docTitle>
    <text>"#,
    );
    ncx.push_str(&escape_xml(&draft.metadata.title));
    ncx.push_str(
        r#"</text>
  </docTitle>
  <navMap>
"#,
    );

    for entry in &draft.toc {
        write_nav_point(&mut ncx, entry);
    }

    ncx.push_str("  </navMap>\n</ncx>\n");
    ncx
}

fn write_nav_point(ncx: &mut String, entry: &TocEntry) {
    ncx.push_str(&format!(
        "    <navPoint id=\"navPoint-{0}\" playOrder=\"{0}\">\n",
        entry.play_order
    ));
    ncx.push_str(&format!(
        "      <navLabel><text>{}</text></navLabel>\n",
        escape_xml(&entry.title)
    ));
    ncx.push_str(&format!(
        "      <content src=\"{}\"/>\n",
        escape_xml(&entry.href)
    ));
    ncx.push_str("    </navPoint>\n");
}

fn generate_nav(draft: &BookDraft) -> String {
    let language = escape_xml(&draft.metadata.language);
    let mut nav = format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{language}" xml:lang="{language}">
<head>
  <title>{title}</title>
</head>
<body>
  <nav epub:type="toc" id="toc">
    <h1>{title}</h1>
    <ol>
"#,
        title = escape_xml(&draft.metadata.title)
    );

    if draft.toc.is_empty() {
        // An empty <ol> is invalid; point the toc at itself.
        nav.push_str(&format!(
            "      <li><a href=\"{NAV_HREF}\">{}</a></li>\n",
            escape_xml(&draft.metadata.title)
        ));
    }
    for entry in &draft.toc {
        nav.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            escape_xml(&entry.href),
            escape_xml(&entry.title)
        ));
    }

    nav.push_str("    </ol>\n  </nav>\n</body>\n</html>\n");
    nav
}

/// One chapter as an XHTML document, opened by an `<h1>` title.
pub(crate) fn chapter_document(chapter: &RenderedChapter, language: &str) -> String {
    let title = escape_xml(&chapter.title);
    let language = escape_xml(language);
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{language}" xml:lang="{language}">
<head>
  <title>{title}</title>
</head>
<body>
<h1>{title}</h1>
{body}</body>
</html>
"#,
        body = nodes_to_xml(&chapter.body)
    )
}
