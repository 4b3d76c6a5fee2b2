//! A [`ContentSource`] backed by a directory dump.
//!
//! Layout:
//!
//! ```text
//! book.json                        manifest: metadata + chapter list
//! chapters/<volume>-<number>.json  one upstream chapter payload each
//! images/<filename>                image bytes, looked up by URL file name
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{ChapterData, ContentSource};
use crate::book::{ChapterMeta, Metadata, Ordinal};
use crate::error::{Result, SourceError};
use crate::util::{decode_text, filename_from_url};

/// Contents of `book.json`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookManifest {
    pub series_id: String,
    pub branch_id: String,
    pub metadata: Metadata,
    pub chapters: Vec<ChapterMeta>,
}

#[derive(Debug, Clone)]
pub struct LocalSource {
    root: PathBuf,
}

impl LocalSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read and parse `book.json`.
    pub fn manifest(&self) -> Result<BookManifest> {
        let bytes = fs::read(self.root.join("book.json"))?;
        let text = decode_text(&bytes, None);
        Ok(serde_json::from_str(&text)?)
    }

    fn chapter_path(&self, volume: &Ordinal, number: &Ordinal) -> PathBuf {
        self.root
            .join("chapters")
            .join(format!("{}-{}.json", volume.as_str(), number.as_str()))
    }

    fn read(&self, path: &Path, what: &str) -> std::result::Result<Vec<u8>, SourceError> {
        fs::read(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => SourceError::NotFound(what.to_string()),
            _ => SourceError::Transport(format!("{}: {e}", path.display())),
        })
    }
}

impl ContentSource for LocalSource {
    fn get_chapter(
        &self,
        _series_id: &str,
        _branch_id: &str,
        number: &Ordinal,
        volume: &Ordinal,
    ) -> std::result::Result<ChapterData, SourceError> {
        let path = self.chapter_path(volume, number);
        let bytes = self.read(&path, &format!("volume {volume} chapter {number}"))?;
        let text = decode_text(&bytes, None);
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| SourceError::Invalid(e.to_string()))?;
        ChapterData::from_json(value).map_err(|e| SourceError::Invalid(e.to_string()))
    }

    fn get_image_bytes(&self, url: &str) -> std::result::Result<Vec<u8>, SourceError> {
        let name = filename_from_url(url);
        if name.is_empty() || name == ".." {
            return Err(SourceError::NotFound(url.to_string()));
        }
        self.read(&self.root.join("images").join(name), url)
    }
}
