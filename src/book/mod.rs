//! Book-level data: metadata, chapter descriptors and the in-progress draft.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer};

use crate::images::{ImageResource, ImageStore};
use crate::render::Node;

/// Book metadata fed to `make_book`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Metadata {
    pub title: String,
    pub authors: Vec<String>,
    pub language: String,
    pub genres: Vec<String>,
    pub summary: Option<String>,
    /// Series or franchise name. Falls back to the title.
    pub series: Option<String>,
    pub cover_url: Option<String>,
    /// Page the book was taken from.
    pub source_url: Option<String>,
}

impl Metadata {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genres.push(genre.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn with_series(mut self, series: impl Into<String>) -> Self {
        self.series = Some(series.into());
        self
    }

    pub fn with_cover(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    pub fn with_source(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn series_name(&self) -> &str {
        self.series.as_deref().unwrap_or(&self.title)
    }

    /// Name-based UUID (version 5 layout) over title and authors, so
    /// rebuilding the same book keeps its identifier.
    pub fn uuid(&self) -> String {
        let mut hasher = sha1_smol::Sha1::new();
        hasher.update(self.title.as_bytes());
        for author in &self.authors {
            hasher.update(b"\0");
            hasher.update(author.as_bytes());
        }
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&hasher.digest().bytes()[..16]);
        bytes[6] = (bytes[6] & 0x0f) | 0x50;
        bytes[8] = (bytes[8] & 0x3f) | 0x80;

        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        format!(
            "{}-{}-{}-{}-{}",
            &hex[0..8],
            &hex[8..12],
            &hex[12..16],
            &hex[16..20],
            &hex[20..32]
        )
    }
}

/// A volume or chapter number as published upstream.
///
/// Upstream numbers are strings and may be fractional (`"10.5"`). The raw
/// text is kept for display; ordering is numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ordinal(String);

impl Ordinal {
    pub fn new(raw: impl Into<String>) -> Self {
        Ordinal(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Integer part, then fractional digits with trailing zeros dropped.
    /// Digit strings of a decimal fraction order lexicographically.
    fn key(&self) -> (u64, &str) {
        let (major, minor) = self.0.split_once('.').unwrap_or((&self.0, ""));
        let minor = if minor.bytes().all(|b| b.is_ascii_digit()) {
            minor.trim_end_matches('0')
        } else {
            ""
        };
        (major.parse().unwrap_or(u64::MAX), minor)
    }
}

impl Ord for Ordinal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key()
            .cmp(&other.key())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for Ordinal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<u32> for Ordinal {
    fn from(n: u32) -> Self {
        Ordinal(n.to_string())
    }
}

impl From<i32> for Ordinal {
    fn from(n: i32) -> Self {
        Ordinal(n.to_string())
    }
}

impl From<&str> for Ordinal {
    fn from(s: &str) -> Self {
        Ordinal::new(s)
    }
}

impl<'de> Deserialize<'de> for Ordinal {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(u64),
            Float(f64),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Ordinal(n.to_string()),
            Raw::Float(f) => Ordinal(f.to_string()),
            Raw::Text(s) => Ordinal::new(s),
        })
    }
}

/// Descriptor for one chapter of the run, in caller-supplied order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChapterMeta {
    #[serde(default)]
    pub name: String,
    pub number: Ordinal,
    pub volume: Ordinal,
}

impl ChapterMeta {
    pub fn new(
        name: impl Into<String>,
        volume: impl Into<Ordinal>,
        number: impl Into<Ordinal>,
    ) -> Self {
        Self {
            name: name.into(),
            number: number.into(),
            volume: volume.into(),
        }
    }

    /// Display title used for the chapter heading and table of contents.
    pub fn title(&self) -> String {
        let mut title = format!("Volume {}. Chapter {}.", self.volume, self.number);
        if !self.name.trim().is_empty() {
            title.push(' ');
            title.push_str(self.name.trim());
        }
        title
    }
}

/// A chapter after rendering, ready to be added to a draft.
#[derive(Debug, Clone)]
pub struct RenderedChapter {
    pub title: String,
    pub volume: Ordinal,
    pub number: Ordinal,
    pub body: Vec<Node>,
}

/// A table of contents entry
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TocEntry {
    pub title: String,
    pub href: String,
    pub play_order: usize,
}

impl TocEntry {
    pub fn new(title: impl Into<String>, href: impl Into<String>, play_order: usize) -> Self {
        Self {
            title: title.into(),
            href: href.into(),
            play_order,
        }
    }
}

/// An item in the reading order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineItem {
    pub id: String,
    pub href: String,
}

/// Which counter the final sequence annotation summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceAxis {
    Volume,
    Chapter,
}

/// Inclusive min/max of the volumes or chapters actually added.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRange {
    pub min: Ordinal,
    pub max: Ordinal,
}

impl SequenceRange {
    fn widen(range: &mut Option<SequenceRange>, value: &Ordinal) {
        match range {
            Some(r) => {
                if *value < r.min {
                    r.min = value.clone();
                }
                if *value > r.max {
                    r.max = value.clone();
                }
            }
            None => {
                *range = Some(SequenceRange {
                    min: value.clone(),
                    max: value.clone(),
                })
            }
        }
    }
}

/// Series annotation written by `end_book`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub name: String,
    pub axis: SequenceAxis,
    pub range: SequenceRange,
}

impl Sequence {
    pub fn label(&self) -> String {
        let unit = match self.axis {
            SequenceAxis::Volume => "Volumes",
            SequenceAxis::Chapter => "Chapters",
        };
        format!("{} {} to {}", unit, self.range.min, self.range.max)
    }
}

/// Accumulator for one book being assembled.
///
/// Created by `make_book`, filled by `add_chapter`, sealed by `end_book`
/// and consumed by `save_book`.
#[derive(Debug, Default)]
pub struct BookDraft {
    pub metadata: Metadata,
    pub cover: Option<ImageResource>,
    pub chapters: Vec<RenderedChapter>,
    pub images: ImageStore,
    pub toc: Vec<TocEntry>,
    pub spine: Vec<SpineItem>,
    pub sequence: Option<Sequence>,
    volumes: Option<SequenceRange>,
    numbers: Option<SequenceRange>,
    sealed: bool,
}

impl BookDraft {
    pub fn new(metadata: Metadata) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn push_chapter(&mut self, chapter: RenderedChapter) {
        SequenceRange::widen(&mut self.volumes, &chapter.volume);
        SequenceRange::widen(&mut self.numbers, &chapter.number);
        self.chapters.push(chapter);
    }

    /// Bounds over the chapters added so far.
    pub fn range(&self, axis: SequenceAxis) -> Option<&SequenceRange> {
        match axis {
            SequenceAxis::Volume => self.volumes.as_ref(),
            SequenceAxis::Chapter => self.numbers.as_ref(),
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }
}
