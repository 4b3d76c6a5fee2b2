mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use ranobe2ebook::{Assembly, BuildConfig, BuildRequest, Events, Fb2Backend, LocalSource};
use tempfile::TempDir;

fn build_fb2(config: BuildConfig) -> (String, Vec<String>) {
    let dump = common::novel_dump();
    let out = TempDir::new().unwrap();

    let source = LocalSource::new(dump.path());
    let manifest = source.manifest().unwrap();
    let request = BuildRequest::new(manifest.metadata, manifest.chapters)
        .with_series(manifest.series_id, manifest.branch_id);

    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let report = Assembly::new(Fb2Backend::new(), Arc::new(source), config)
        .with_events(Events::new(
            move |line| sink.lock().unwrap().push(line.to_string()),
            |_| {},
        ))
        .run(request, out.path())
        .unwrap();

    let path = report.path.unwrap();
    assert_eq!(path.extension().unwrap(), "fb2");
    let text = std::fs::read_to_string(path).unwrap();
    let lines = lines.lock().unwrap().clone();
    (text, lines)
}

fn config() -> BuildConfig {
    BuildConfig::default().with_delay(Duration::ZERO)
}

#[test]
fn test_description() {
    let (doc, _) = build_fb2(config());

    assert!(doc.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
    assert!(doc.contains("<genre>Fantasy</genre>"));
    assert!(doc.contains("<author><nickname>Writer</nickname></author>"));
    assert!(doc.contains("<book-title>Novel &amp; Co</book-title>"));
    assert!(doc.contains("<p>First line.</p>"));
    assert!(doc.contains("<p>Second line.</p>"));
    assert!(doc.contains("<lang>ru</lang>"));
    assert!(doc.contains("<coverpage><image l:href=\"#cover_cover.png\"/></coverpage>"));
    assert!(doc.contains("<sequence name=\"Novel &amp; Co\" number=\"Volumes 1 to 1\"/>"));
}

#[test]
fn test_sections_follow_chapter_order() {
    let (doc, _) = build_fb2(config());

    let first = doc.find("<title><p>Volume 1. Chapter 1. Arrival</p></title>").unwrap();
    let second = doc.find("<title><p>Volume 1. Chapter 2.</p></title>").unwrap();
    assert!(first < second);
    assert_eq!(doc.matches("<section>").count(), 2);
    assert!(!doc.contains("Lost"));

    assert!(doc.contains("<p>Hello <strong>world</strong></p>"));
    assert!(doc.contains("<p>Tom &amp; Jerry, 5 &lt; 6\u{2009}!</p>"));
    assert!(doc.contains("<epigraph>"));
    assert!(doc.contains("<subtitle>Part</subtitle>"));
    assert!(doc.contains("<subtitle>***</subtitle>"));
    assert!(doc.contains("<image l:href=\"#102_art.png\"/>"));
}

#[test]
fn test_document_is_well_formed() {
    let (doc, _) = build_fb2(config());
    let mut reader = quick_xml::Reader::from_str(&doc);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => break,
            Ok(_) => {}
            Err(e) => panic!("not well-formed at {}: {e}", reader.buffer_position()),
        }
    }
}

#[test]
fn test_binaries_are_base64() {
    let (doc, _) = build_fb2(config());

    let start = doc.find("<binary id=\"102_art.png\" content-type=\"image/png\">").unwrap();
    let body_start = doc[start..].find('>').unwrap() + start + 1;
    let body_end = doc[body_start..].find("</binary>").unwrap() + body_start;
    let decoded = STANDARD.decode(&doc[body_start..body_end]).unwrap();
    assert_eq!(&decoded[..8], b"\x89PNG\r\n\x1a\n");

    assert_eq!(doc.matches("<binary ").count(), 2);
}

#[test]
fn test_log_lines() {
    let (_, lines) = build_fb2(config());

    assert_eq!(lines[0], "Preparing book...");
    assert_eq!(lines[1], "Book prepared.");
    assert_eq!(lines[2], "Downloading chapters: 3");
    assert_eq!(lines[3], "Downloaded 1: Volume 1. Chapter 1. Arrival");
    assert_eq!(lines[4], "Downloaded 2: Volume 1. Chapter 2.");
    assert!(lines[5].starts_with("Volume 2. Chapter 3:"));
    assert!(lines[5].ends_with("Skipping chapter."));
    assert_eq!(lines[6], "Book Novel & Co saved as FB2.");
    assert!(lines[7].starts_with("Created Novel & Co.fb2 in "));
}
