//! Book assembly pipeline.
//!
//! [`Assembly`] drives one [`Backend`] through `make_book`, `fill_book`,
//! `end_book` and `save_book`. Chapters are processed strictly in order on
//! the calling thread; [`spawn_build`] moves a whole run to a background
//! thread.
//!
//! Per-chapter and per-image failures are logged and skipped. Only failures
//! in the book-level steps are returned to the caller.

mod worker;

pub use worker::{BuildEvent, BuildHandle, spawn_build};

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use crate::backend::Backend;
use crate::book::{BookDraft, ChapterMeta, Metadata, RenderedChapter};
use crate::error::{Error, Result};
use crate::images::{ImageOptions, ImageResolver, fetch_cover};
use crate::render::render_chapter;
use crate::source::ContentSource;

/// Configuration for one build.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Embed chapter images (the cover is fetched either way).
    pub include_images: bool,
    /// Pause before every chapter fetch.
    pub delay: Duration,
    /// Prefix for relative attachment URLs.
    pub image_base_url: String,
    /// Re-encode fetched images.
    pub normalize_images: bool,
    /// JPEG quality for re-encoded images.
    pub image_quality: u8,
    /// Total attempts for an image whose body arrives truncated.
    pub max_image_retries: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let images = ImageOptions::default();
        Self {
            include_images: images.include,
            delay: Duration::from_millis(500),
            image_base_url: images.base_url,
            normalize_images: images.normalize,
            image_quality: images.quality,
            max_image_retries: images.max_attempts,
        }
    }
}

impl BuildConfig {
    pub fn with_images(mut self, include: bool) -> Self {
        self.include_images = include;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_image_base_url(mut self, url: impl Into<String>) -> Self {
        self.image_base_url = url.into();
        self
    }

    pub fn with_normalize_images(mut self, normalize: bool) -> Self {
        self.normalize_images = normalize;
        self
    }

    pub fn with_image_quality(mut self, quality: u8) -> Self {
        self.image_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_max_image_retries(mut self, attempts: u32) -> Self {
        self.max_image_retries = attempts.max(1);
        self
    }

    fn image_options(&self) -> ImageOptions {
        ImageOptions {
            include: self.include_images,
            base_url: self.image_base_url.clone(),
            normalize: self.normalize_images,
            quality: self.image_quality,
            max_attempts: self.max_image_retries.max(1),
        }
    }
}

/// Cooperative cancellation flag, checked once per chapter.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type LogFn = Box<dyn FnMut(&str) + Send>;
type ProgressFn = Box<dyn FnMut(usize) + Send>;

/// Callbacks for human-readable log lines and progress steps.
pub struct Events {
    log: LogFn,
    progress: ProgressFn,
}

impl Events {
    pub fn new(
        log: impl FnMut(&str) + Send + 'static,
        progress: impl FnMut(usize) + Send + 'static,
    ) -> Self {
        Self {
            log: Box::new(log),
            progress: Box::new(progress),
        }
    }

    /// Discard everything.
    pub fn silent() -> Self {
        Self::new(|_| {}, |_| {})
    }

    fn log(&mut self, line: &str) {
        (self.log)(line);
    }

    fn step(&mut self, n: usize) {
        (self.progress)(n);
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::silent()
    }
}

impl fmt::Debug for Events {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Events").finish_non_exhaustive()
    }
}

/// Everything a run needs to know about the book.
#[derive(Debug, Clone, Default)]
pub struct BuildRequest {
    pub series_id: String,
    pub branch_id: String,
    pub metadata: Metadata,
    pub chapters: Vec<ChapterMeta>,
}

impl BuildRequest {
    pub fn new(metadata: Metadata, chapters: Vec<ChapterMeta>) -> Self {
        Self {
            metadata,
            chapters,
            ..Default::default()
        }
    }

    pub fn with_series(
        mut self,
        series_id: impl Into<String>,
        branch_id: impl Into<String>,
    ) -> Self {
        self.series_id = series_id.into();
        self.branch_id = branch_id.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    Created,
    Building,
    Cancelled,
    Ending,
    Saved,
}

/// Outcome of a run.
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    pub added: usize,
    pub skipped: Vec<ChapterMeta>,
    pub skipped_images: usize,
    pub cancelled: bool,
    pub path: Option<PathBuf>,
}

pub struct Assembly<B: Backend> {
    backend: B,
    source: Arc<dyn ContentSource>,
    config: BuildConfig,
    images: ImageOptions,
    cancel: CancelToken,
    progress: Arc<AtomicUsize>,
    events: Events,
    state: AssemblyState,
    draft: Option<BookDraft>,
    report: BuildReport,
}

impl<B: Backend> Assembly<B> {
    pub fn new(backend: B, source: Arc<dyn ContentSource>, config: BuildConfig) -> Self {
        Self {
            backend,
            source,
            images: config.image_options(),
            config,
            cancel: CancelToken::new(),
            progress: Arc::new(AtomicUsize::new(0)),
            events: Events::silent(),
            state: AssemblyState::Created,
            draft: None,
            report: BuildReport::default(),
        }
    }

    pub fn with_events(mut self, events: Events) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Chapters processed so far (added or skipped).
    pub fn progress(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.progress)
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn draft(&self) -> Option<&BookDraft> {
        self.draft.as_ref()
    }

    pub fn report(&self) -> &BuildReport {
        &self.report
    }

    /// Run every step and return the report.
    pub fn run(mut self, request: BuildRequest, dir: &Path) -> Result<BuildReport> {
        self.make_book(request.metadata)?;
        self.fill_book(&request.series_id, &request.branch_id, &request.chapters)?;
        self.end_book()?;
        self.save_book(dir)?;
        Ok(self.report)
    }

    /// Start the draft and fetch the cover.
    ///
    /// The cover is fetched even when chapter images are off. A failed cover
    /// fetch is logged and the book continues without one.
    pub fn make_book(&mut self, metadata: Metadata) -> Result<()> {
        if self.state != AssemblyState::Created || self.draft.is_some() {
            return Err(self.out_of_order("make_book"));
        }

        self.events.log("Preparing book...");
        let mut draft = self.backend.make_book(metadata)?;

        if let Some(url) = draft.metadata.cover_url.clone() {
            match fetch_cover(self.source.as_ref(), &mut draft.images, &self.images, &url) {
                Ok(cover) => draft.cover = Some(cover),
                Err(e) => {
                    log::warn!("continuing without cover: {e}");
                    self.events.log(&format!("{e}. Continuing without a cover."));
                }
            }
        }

        self.draft = Some(draft);
        self.events.log("Book prepared.");
        Ok(())
    }

    /// Fetch, render and add each chapter in order.
    pub fn fill_book(
        &mut self,
        series_id: &str,
        branch_id: &str,
        chapters: &[ChapterMeta],
    ) -> Result<()> {
        if self.state != AssemblyState::Created || self.draft.is_none() {
            return Err(self.out_of_order("fill_book"));
        }
        self.state = AssemblyState::Building;

        let widths = Widths::of(chapters);
        self.events.log(&format!("Downloading chapters: {}", chapters.len()));

        for (i, meta) in chapters.iter().enumerate() {
            if !self.config.delay.is_zero() {
                thread::sleep(self.config.delay);
            }
            if self.cancel.is_cancelled() {
                log::info!("cancelled after {} of {} chapters", i, chapters.len());
                self.events.log("Cancelled.");
                self.report.cancelled = true;
                self.state = AssemblyState::Cancelled;
                break;
            }

            match self.make_chapter(series_id, branch_id, meta) {
                Ok(chapter) => {
                    let draft = self.draft.as_mut().ok_or_else(no_draft)?;
                    self.backend.add_chapter(draft, chapter)?;
                    self.report.added += 1;
                    self.events.log(&widths.downloaded(i + 1, meta));
                }
                Err(e) => {
                    let reason = match &e {
                        Error::ChapterFetch { source, .. } => source.to_string(),
                        other => other.to_string(),
                    };
                    log::warn!(
                        "skipping volume {} chapter {}: {}",
                        meta.volume,
                        meta.number,
                        reason
                    );
                    self.events.log(&format!(
                        "Volume {}. Chapter {}: {}. Skipping chapter.",
                        meta.volume, meta.number, reason
                    ));
                    self.report.skipped.push(meta.clone());
                }
            }

            self.progress.fetch_add(1, Ordering::SeqCst);
            self.events.step(1);
        }

        Ok(())
    }

    fn make_chapter(
        &mut self,
        series_id: &str,
        branch_id: &str,
        meta: &ChapterMeta,
    ) -> Result<RenderedChapter> {
        let data = self
            .source
            .get_chapter(series_id, branch_id, &meta.number, &meta.volume)
            .map_err(|source| Error::ChapterFetch {
                volume: meta.volume.to_string(),
                number: meta.number.to_string(),
                source,
            })?;
        if !data.matches(meta) {
            log::debug!(
                "payload for volume {} chapter {} reports volume {} chapter {}",
                meta.volume,
                meta.number,
                data.volume,
                data.number
            );
        }

        let nodes = data.content.normalize()?;

        let draft = self.draft.as_mut().ok_or_else(no_draft)?;
        let mut resolver = ImageResolver::new(
            self.source.as_ref(),
            &mut draft.images,
            &self.images,
            &data.id,
            &data.attachments,
        );
        let rendered = render_chapter(&self.backend, &mut resolver, &nodes);

        for e in &rendered.skipped {
            log::warn!("volume {} chapter {}: {e}", meta.volume, meta.number);
            self.events.log(&e.to_string());
            self.report.skipped_images += 1;
        }

        Ok(RenderedChapter {
            title: meta.title(),
            volume: meta.volume.clone(),
            number: meta.number.clone(),
            body: rendered.body,
        })
    }

    /// Finalize navigation and sequence metadata. Runs after cancellation
    /// too, so a partial book can still be saved.
    pub fn end_book(&mut self) -> Result<()> {
        let ready = matches!(
            self.state,
            AssemblyState::Created | AssemblyState::Building | AssemblyState::Cancelled
        );
        if !ready || self.draft.is_none() {
            return Err(self.out_of_order("end_book"));
        }

        let draft = self.draft.as_mut().ok_or_else(no_draft)?;
        let series = draft.metadata.series_name().to_string();
        self.backend.end_book(draft, &series)?;
        self.state = AssemblyState::Ending;
        Ok(())
    }

    /// Serialize into `dir`. The draft is consumed.
    pub fn save_book(&mut self, dir: &Path) -> Result<PathBuf> {
        if self.state != AssemblyState::Ending {
            return Err(self.out_of_order("save_book"));
        }
        let draft = self.draft.take().ok_or_else(no_draft)?;
        let title = draft.metadata.title.clone();

        let path = self.backend.save_book(draft, dir)?;
        self.state = AssemblyState::Saved;

        self.events.log(&format!(
            "Book {} saved as {}.",
            title,
            self.backend.format_name()
        ));
        if let Some(name) = path.file_name() {
            self.events.log(&format!(
                "Created {} in {}.",
                name.to_string_lossy(),
                dir.display()
            ));
        }
        self.report.path = Some(path.clone());
        Ok(path)
    }

    fn out_of_order(&self, step: &str) -> Error {
        Error::Assembly(format!("{step} called in state {:?}", self.state))
    }
}

fn no_draft() -> Error {
    Error::Assembly("no book in progress".to_string())
}

/// Column widths for progress lines, so counters line up.
struct Widths {
    index: usize,
    volume: usize,
    number: usize,
}

impl Widths {
    fn of(chapters: &[ChapterMeta]) -> Self {
        let widest = |f: fn(&ChapterMeta) -> usize| chapters.iter().map(f).max().unwrap_or(1);
        Self {
            index: chapters.len().to_string().len(),
            volume: widest(|c| c.volume.as_str().chars().count()),
            number: widest(|c| c.number.as_str().chars().count()),
        }
    }

    fn downloaded(&self, index: usize, meta: &ChapterMeta) -> String {
        let mut line = format!(
            "Downloaded {index:>iw$}: Volume {:>vw$}. Chapter {:>nw$}.",
            meta.volume,
            meta.number,
            iw = self.index,
            vw = self.volume,
            nw = self.number,
        );
        let name = meta.name.trim();
        if !name.is_empty() {
            line.push(' ');
            line.push_str(name);
        }
        line
    }
}
