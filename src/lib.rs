//! # ranobe2ebook
//!
//! Assemble web-novel chapters into EPUB and FB2 ebooks.
//!
//! Chapters arrive from a [`ContentSource`] either as a markup fragment or as
//! a JSON block tree. Both normalize into one [content model](content), are
//! rendered through a backend-specific [`Vocabulary`], and are collected into
//! a [`BookDraft`] that the backend finally serializes.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use ranobe2ebook::{Assembly, BuildConfig, BuildRequest, EpubBackend, LocalSource};
//!
//! let source = LocalSource::new("dump/");
//! let manifest = source.manifest()?;
//! let request = BuildRequest::new(manifest.metadata, manifest.chapters)
//!     .with_series(manifest.series_id, manifest.branch_id);
//!
//! let report = Assembly::new(EpubBackend::new(), Arc::new(source), BuildConfig::default())
//!     .run(request, Path::new("out/"))?;
//! println!("{} chapters, saved to {:?}", report.added, report.path);
//! # Ok::<(), ranobe2ebook::Error>(())
//! ```

pub mod backend;
pub mod book;
pub mod content;
pub mod epub;
pub mod error;
pub mod fb2;
pub mod images;
pub mod pipeline;
pub mod render;
pub mod source;
pub(crate) mod util;

pub use backend::{Backend, Format};
pub use book::{BookDraft, ChapterMeta, Metadata, Ordinal, RenderedChapter};
pub use content::{ChapterContent, ContentNode};
pub use epub::{EpubBackend, EpubConfig};
pub use error::{Error, Result, SourceError};
pub use fb2::{Fb2Backend, Fb2Config};
pub use images::{ImageResource, ImageStore};
pub use pipeline::{
    Assembly, AssemblyState, BuildConfig, BuildEvent, BuildHandle, BuildReport, BuildRequest,
    CancelToken, Events, spawn_build,
};
pub use render::Vocabulary;
pub use source::{Attachment, ChapterData, ContentSource, LocalSource};
pub use util::MediaFormat;
