//! The output-format seam.
//!
//! A [`Backend`] is a [`Vocabulary`] plus the book-level operations a format
//! needs. The assembly pipeline only talks to this trait.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::{Path, PathBuf};

use crate::book::{BookDraft, Metadata, RenderedChapter, Sequence, SequenceAxis};
use crate::error::{Error, Result};
use crate::render::Vocabulary;
use crate::util::sanitize_filename;

/// Output formats known to the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
pub enum Format {
    /// Zipped package (EPUB)
    Epub,
    /// Single XML document (FB2)
    Fb2,
}

pub trait Backend: Vocabulary + Send {
    /// File extension of saved books, without the dot.
    fn extension(&self) -> &'static str;

    /// Counter summarized by the sequence annotation.
    fn sequence_axis(&self) -> SequenceAxis;

    /// Human name used in log lines.
    fn format_name(&self) -> &'static str;

    /// Start a draft. The title is required; the language falls back to the
    /// backend's default.
    fn make_book(&self, metadata: Metadata) -> Result<BookDraft> {
        if metadata.title.trim().is_empty() {
            return Err(Error::Assembly("book title is empty".to_string()));
        }
        let mut metadata = metadata;
        if metadata.language.is_empty() {
            metadata.language = self.default_language().to_string();
        }
        Ok(BookDraft::new(metadata))
    }

    fn default_language(&self) -> &str {
        "ru"
    }

    /// Append a rendered chapter.
    fn add_chapter(&self, draft: &mut BookDraft, chapter: RenderedChapter) -> Result<()> {
        if draft.is_sealed() {
            return Err(Error::Assembly(format!(
                "cannot add '{}' to a finished book",
                chapter.title
            )));
        }
        draft.push_chapter(chapter);
        Ok(())
    }

    /// Finalize: record the sequence over the chapters actually added and
    /// seal the draft. Backends with navigation extend this.
    fn end_book(&self, draft: &mut BookDraft, sequence_name: &str) -> Result<()> {
        seal_with_sequence(draft, self.sequence_axis(), sequence_name)
    }

    /// Serialize a sealed draft.
    fn write_book(&self, draft: &BookDraft, out: &mut dyn WriteSeek) -> Result<()>;

    /// Write `{sanitized title}.{extension}` into `dir` and return its path.
    fn save_book(&self, draft: BookDraft, dir: &Path) -> Result<PathBuf> {
        if !draft.is_sealed() {
            return Err(Error::Assembly("book must be finished before saving".to_string()));
        }
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!(
            "{}.{}",
            sanitize_filename(&draft.metadata.title),
            self.extension()
        ));

        let written = File::create(&path).map_err(Error::from).and_then(|file| {
            let mut out = BufWriter::new(file);
            self.write_book(&draft, &mut out)?;
            out.flush()?;
            Ok(())
        });
        if let Err(e) = written {
            // A truncated book must not be left behind.
            if let Err(remove) = std::fs::remove_file(&path)
                && remove.kind() != std::io::ErrorKind::NotFound
            {
                log::warn!("could not remove partial {}: {remove}", path.display());
            }
            return Err(e);
        }

        log::info!("saved {} as {}", draft.metadata.title, path.display());
        Ok(path)
    }
}

/// Record the sequence over `axis` and seal the draft.
pub(crate) fn seal_with_sequence(
    draft: &mut BookDraft,
    axis: SequenceAxis,
    sequence_name: &str,
) -> Result<()> {
    if draft.is_sealed() {
        return Err(Error::Assembly("book already finished".to_string()));
    }
    draft.sequence = draft.range(axis).map(|range| Sequence {
        name: sequence_name.to_string(),
        axis,
        range: range.clone(),
    });
    draft.seal();
    Ok(())
}

/// Output sink for [`Backend::write_book`].
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek> WriteSeek for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{ChapterMeta, Ordinal};
    use crate::render::tests::TestVocab;

    impl Backend for TestVocab {
        fn extension(&self) -> &'static str {
            "txt"
        }
        fn sequence_axis(&self) -> SequenceAxis {
            SequenceAxis::Volume
        }
        fn format_name(&self) -> &'static str {
            "text"
        }
        fn write_book(&self, draft: &BookDraft, out: &mut dyn WriteSeek) -> Result<()> {
            for chapter in &draft.chapters {
                writeln!(out, "{}", chapter.title)?;
            }
            if draft.metadata.title == "Broken" {
                return Err(Error::Assembly("writer failed".to_string()));
            }
            Ok(())
        }
    }

    fn chapter(volume: u32, number: u32) -> RenderedChapter {
        let meta = ChapterMeta::new("", volume, number);
        RenderedChapter {
            title: meta.title(),
            volume: meta.volume,
            number: meta.number,
            body: Vec::new(),
        }
    }

    #[test]
    fn test_make_book_requires_title() {
        assert!(matches!(TestVocab.make_book(Metadata::new("  ")), Err(Error::Assembly(_))));
        let draft = TestVocab.make_book(Metadata::new("T")).unwrap();
        assert_eq!(draft.metadata.language, "ru");
    }

    #[test]
    fn test_end_book_records_sequence_and_seals() {
        let mut draft = TestVocab.make_book(Metadata::new("T").with_series("S")).unwrap();
        TestVocab.add_chapter(&mut draft, chapter(3, 1)).unwrap();
        TestVocab.add_chapter(&mut draft, chapter(1, 2)).unwrap();
        TestVocab.end_book(&mut draft, "S").unwrap();

        let sequence = draft.sequence.as_ref().unwrap();
        assert_eq!(sequence.range.min, Ordinal::from(1));
        assert_eq!(sequence.range.max, Ordinal::from(3));
        assert_eq!(sequence.label(), "Volumes 1 to 3");
        assert!(TestVocab.add_chapter(&mut draft, chapter(4, 1)).is_err());
    }

    #[test]
    fn test_empty_book_has_no_sequence() {
        let mut draft = TestVocab.make_book(Metadata::new("T")).unwrap();
        TestVocab.end_book(&mut draft, "T").unwrap();
        assert!(draft.sequence.is_none());
    }

    #[test]
    fn test_save_book_uses_sanitized_title() {
        let dir = tempfile::tempdir().unwrap();
        let mut draft = TestVocab.make_book(Metadata::new("What? A: Book")).unwrap();
        let unsealed = TestVocab.make_book(Metadata::new("x")).unwrap();
        assert!(TestVocab.save_book(unsealed, dir.path()).is_err());

        TestVocab.add_chapter(&mut draft, chapter(1, 1)).unwrap();
        TestVocab.end_book(&mut draft, "T").unwrap();
        let path = TestVocab.save_book(draft, dir.path()).unwrap();

        assert_eq!(path.file_name().unwrap(), "What A Book.txt");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "Volume 1. Chapter 1.\n");
    }

    #[test]
    fn test_failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut draft = TestVocab.make_book(Metadata::new("Broken")).unwrap();
        TestVocab.add_chapter(&mut draft, chapter(1, 1)).unwrap();
        TestVocab.end_book(&mut draft, "Broken").unwrap();

        assert!(TestVocab.save_book(draft, dir.path()).is_err());
        assert!(!dir.path().join("Broken.txt").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
