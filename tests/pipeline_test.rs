use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ranobe2ebook::book::SequenceAxis;
use ranobe2ebook::{
    Assembly, AssemblyState, Attachment, BuildConfig, BuildEvent, BuildRequest, ChapterContent,
    ChapterData, ChapterMeta, ContentSource, EpubBackend, Events, Fb2Backend, Metadata, Ordinal,
    SourceError, spawn_build,
};
use tempfile::TempDir;

/// In-memory source recording every request it serves.
#[derive(Default)]
struct FakeSource {
    chapters: HashMap<(String, String), ChapterData>,
    images: HashMap<String, Vec<u8>>,
    requests: Mutex<Vec<String>>,
}

impl FakeSource {
    fn with_chapter(mut self, volume: u32, number: u32, markup: &str) -> Self {
        let data = ChapterData {
            id: format!("{volume}{number:03}"),
            number: number.into(),
            volume: volume.into(),
            content: ChapterContent::Markup(markup.to_string()),
            attachments: Vec::new(),
        };
        self.chapters.insert((volume.to_string(), number.to_string()), data);
        self
    }

    fn with_attachment(mut self, volume: u32, number: u32, name: &str, url: &str) -> Self {
        let key = (volume.to_string(), number.to_string());
        let tree = serde_json::json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "Before"}]},
                {"type": "image", "attrs": {"images": [{"image": name}]}}
            ]
        });
        let data = self.chapters.entry(key).or_insert_with(|| ChapterData {
            id: format!("{volume}{number:03}"),
            number: number.into(),
            volume: volume.into(),
            content: ChapterContent::Tree(serde_json::Value::Null),
            attachments: Vec::new(),
        });
        data.content = ChapterContent::Tree(tree);
        data.attachments.push(Attachment {
            name: name.to_string(),
            filename: String::new(),
            extension: String::new(),
            url: url.to_string(),
        });
        self
    }

    fn with_image(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.images.insert(url.to_string(), bytes);
        self
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    fn image_requests(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.starts_with("image "))
            .collect()
    }
}

impl ContentSource for FakeSource {
    fn get_chapter(
        &self,
        _series_id: &str,
        _branch_id: &str,
        number: &Ordinal,
        volume: &Ordinal,
    ) -> Result<ChapterData, SourceError> {
        self.requests
            .lock()
            .unwrap()
            .push(format!("chapter {volume}-{number}"));
        self.chapters
            .get(&(volume.to_string(), number.to_string()))
            .cloned()
            .ok_or(SourceError::Status(500))
    }

    fn get_image_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError> {
        self.requests.lock().unwrap().push(format!("image {url}"));
        self.images
            .get(url)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(url.to_string()))
    }
}

fn png(r: u8, g: u8, b: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb([r, g, b]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn config() -> BuildConfig {
    BuildConfig::default().with_delay(Duration::ZERO)
}

fn capture() -> (Events, Arc<Mutex<Vec<String>>>) {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&lines);
    let events = Events::new(move |line| sink.lock().unwrap().push(line.to_string()), |_| {});
    (events, lines)
}

fn request(chapters: Vec<ChapterMeta>) -> BuildRequest {
    BuildRequest::new(Metadata::new("Test Novel").with_author("Author"), chapters)
        .with_series("novel", "1")
}

#[test]
fn test_failed_chapter_is_skipped_and_book_saved() {
    let source = FakeSource::default()
        .with_chapter(1, 1, "<p>One</p>")
        .with_chapter(1, 3, "<p>Three</p>");
    let dir = TempDir::new().unwrap();
    let (events, lines) = capture();

    let chapters = vec![
        ChapterMeta::new("First", 1, 1),
        ChapterMeta::new("Second", 1, 2),
        ChapterMeta::new("Third", 1, 3),
    ];
    let report = Assembly::new(EpubBackend::new(), Arc::new(source), config())
        .with_events(events)
        .run(request(chapters.clone()), dir.path())
        .unwrap();

    assert_eq!(report.added, 2);
    assert_eq!(report.skipped, vec![chapters[1].clone()]);
    assert!(!report.cancelled);

    let path = report.path.unwrap();
    assert!(path.exists());
    assert_eq!(path.file_name().unwrap(), "Test Novel.epub");

    let lines = lines.lock().unwrap();
    let skips: Vec<&String> = lines.iter().filter(|l| l.contains("Skipping chapter.")).collect();
    assert_eq!(skips.len(), 1);
    assert!(skips[0].starts_with("Volume 1. Chapter 2:"));
    assert_eq!(lines.first().map(String::as_str), Some("Preparing book..."));
    assert!(lines.contains(&"Downloading chapters: 3".to_string()));
    assert!(lines.contains(&"Book Test Novel saved as EPUB.".to_string()));
}

#[test]
fn test_cancel_after_first_chapter() {
    let source = Arc::new(
        FakeSource::default()
            .with_chapter(1, 1, "<p>One</p>")
            .with_chapter(1, 2, "<p>Two</p>")
            .with_chapter(1, 3, "<p>Three</p>"),
    );
    let dir = TempDir::new().unwrap();

    let mut assembly = Assembly::new(Fb2Backend::new(), source.clone(), config());
    let token = assembly.cancel_token();
    assembly = assembly.with_events(Events::new(
        move |line| {
            if line.starts_with("Downloaded 1:") {
                token.cancel();
            }
        },
        |_| {},
    ));
    let progress = assembly.progress();

    let report = assembly
        .run(
            request(vec![
                ChapterMeta::new("", 1, 1),
                ChapterMeta::new("", 1, 2),
                ChapterMeta::new("", 1, 3),
            ]),
            dir.path(),
        )
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.added, 1);
    assert_eq!(progress.load(Ordering::SeqCst), 1);
    assert_eq!(source.requests(), vec!["chapter 1-1"]);

    // The partial book is still written.
    let written = std::fs::read_to_string(report.path.unwrap()).unwrap();
    assert!(written.contains("<sequence name=\"Test Novel\" number=\"Volumes 1 to 1\"/>"));
}

#[test]
fn test_disabled_images_still_fetch_cover() {
    let source = Arc::new(
        FakeSource::default()
            .with_attachment(1, 1, "pic", "https://cdn.test/pic.png")
            .with_image("https://cdn.test/pic.png", png(10, 20, 30))
            .with_image("https://cdn.test/cover.png", png(200, 0, 0)),
    );
    let mut assembly = Assembly::new(
        EpubBackend::new(),
        source.clone(),
        config().with_images(false),
    );

    let metadata = Metadata::new("Book").with_cover("https://cdn.test/cover.png");
    assembly.make_book(metadata).unwrap();
    assembly
        .fill_book("s", "b", &[ChapterMeta::new("", 1, 1)])
        .unwrap();

    assert_eq!(source.image_requests(), vec!["image https://cdn.test/cover.png"]);
    let draft = assembly.draft().unwrap();
    assert!(draft.cover.is_some());
    assert_eq!(draft.images.len(), 1);
    assert_eq!(assembly.report().skipped_images, 0);
}

#[test]
fn test_identical_images_are_stored_once() {
    let bytes = png(1, 2, 3);
    let source = Arc::new(
        FakeSource::default()
            .with_attachment(1, 1, "a", "https://cdn.test/a.png")
            .with_attachment(1, 2, "b", "https://cdn.test/b.png")
            .with_image("https://cdn.test/a.png", bytes.clone())
            .with_image("https://cdn.test/b.png", bytes),
    );
    let mut assembly = Assembly::new(EpubBackend::new(), source.clone(), config());

    assembly.make_book(Metadata::new("Book")).unwrap();
    assembly
        .fill_book(
            "s",
            "b",
            &[ChapterMeta::new("", 1, 1), ChapterMeta::new("", 1, 2)],
        )
        .unwrap();

    assert_eq!(source.image_requests().len(), 2);
    let draft = assembly.draft().unwrap();
    assert_eq!(draft.images.len(), 1);
    assert_eq!(draft.chapters.len(), 2);
}

#[test]
fn test_missing_image_keeps_chapter() {
    let source = Arc::new(FakeSource::default().with_attachment(
        1,
        1,
        "gone",
        "https://cdn.test/gone.png",
    ));
    let (events, lines) = capture();
    let mut assembly = Assembly::new(EpubBackend::new(), source, config()).with_events(events);

    assembly.make_book(Metadata::new("Book")).unwrap();
    assembly
        .fill_book("s", "b", &[ChapterMeta::new("", 1, 1)])
        .unwrap();

    assert_eq!(assembly.report().added, 1);
    assert_eq!(assembly.report().skipped_images, 1);
    assert!(lines.lock().unwrap().iter().any(|l| l.contains("gone.png")));
}

#[test]
fn test_sequence_bounds_ignore_skipped_chapters() {
    let source = Arc::new(
        FakeSource::default()
            .with_chapter(1, 4, "<p>a</p>")
            .with_chapter(2, 5, "<p>b</p>"),
    );
    let mut assembly = Assembly::new(EpubBackend::new(), source, config());

    assembly.make_book(Metadata::new("Book").with_series("Saga")).unwrap();
    assembly
        .fill_book(
            "s",
            "b",
            &[
                ChapterMeta::new("", 1, 4),
                ChapterMeta::new("", 2, 5),
                ChapterMeta::new("", 3, 6),
            ],
        )
        .unwrap();
    assembly.end_book().unwrap();
    assert_eq!(assembly.state(), AssemblyState::Ending);

    let sequence = assembly.draft().unwrap().sequence.clone().unwrap();
    assert_eq!(sequence.name, "Saga");
    assert_eq!(sequence.axis, SequenceAxis::Chapter);
    assert_eq!(sequence.range.min.as_str(), "4");
    assert_eq!(sequence.range.max.as_str(), "5");
    assert_eq!(sequence.label(), "Chapters 4 to 5");
}

#[test]
fn test_background_build_reports_events() {
    let source = Arc::new(
        FakeSource::default()
            .with_chapter(1, 1, "<p>One</p>")
            .with_chapter(1, 2, "<p>Two</p>"),
    );
    let dir = TempDir::new().unwrap();
    let assembly = Assembly::new(Fb2Backend::new(), source, config());

    let handle = spawn_build(
        assembly,
        request(vec![ChapterMeta::new("", 1, 1), ChapterMeta::new("", 1, 2)]),
        dir.path(),
    )
    .unwrap();

    let mut logs = Vec::new();
    let mut progress = Vec::new();
    let report = handle
        .wait(|event| match event {
            BuildEvent::Log(line) => logs.push(line.clone()),
            BuildEvent::Progress(n) => progress.push(*n),
            BuildEvent::Finished(_) => unreachable!("finished is returned, not passed"),
        })
        .unwrap();

    assert_eq!(report.added, 2);
    assert_eq!(progress, vec![1, 2]);
    assert!(logs.iter().any(|l| l == "Book Test Novel saved as FB2."));
    assert!(dir.path().join("Test Novel.fb2").exists());
}

#[test]
fn test_background_build_surfaces_errors() {
    let dir = TempDir::new().unwrap();
    let assembly = Assembly::new(EpubBackend::new(), Arc::new(FakeSource::default()), config());

    let request = BuildRequest::new(Metadata::new(""), Vec::new());
    let handle = spawn_build(assembly, request, dir.path()).unwrap();
    assert!(handle.wait(|_| {}).is_err());
}
