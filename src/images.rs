//! Image fetching, normalization and per-book storage.
//!
//! Every image that ends up in a book goes through [`ImageStore`], which
//! hands out stable identifiers and keeps one copy of identical bytes.

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, ImageFormat};

use crate::content::ImageRef;
use crate::error::{Error, Result, SourceError};
use crate::render::ResolveImage;
use crate::source::{Attachment, ContentSource};
use crate::util::{MediaFormat, detect_media_format, filename_from_url, split_extension};

/// An image stored in a book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageResource {
    /// Identifier, unique within the book. Also the file name inside the
    /// container (`static/{id}`).
    pub id: String,
    pub format: MediaFormat,
    pub data: Arc<[u8]>,
}

impl ImageResource {
    pub fn new(id: impl Into<String>, format: MediaFormat, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            format,
            data: data.into(),
        }
    }

    pub fn href(&self) -> String {
        format!("static/{}", self.id)
    }

    pub fn media_type(&self) -> &'static str {
        self.format.mime_type()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Images registered with one book, in registration order.
#[derive(Debug, Default)]
pub struct ImageStore {
    resources: Vec<ImageResource>,
    /// sha1 of the stored bytes -> indices with that digest
    by_digest: HashMap<String, Vec<usize>>,
    /// source URL -> index
    by_source: HashMap<String, usize>,
}

impl ImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageResource> {
        self.resources.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ImageResource> {
        self.resources.iter().find(|r| r.id == id)
    }

    /// The resource previously registered for `source`, if any.
    pub fn by_source(&self, source: &str) -> Option<&ImageResource> {
        self.by_source.get(source).map(|&i| &self.resources[i])
    }

    /// Register `candidate` as the image fetched from `source`.
    ///
    /// Bytes identical to an already stored image are not stored twice; the
    /// existing resource is returned instead. A candidate whose id is taken
    /// by different bytes gets a numeric suffix.
    pub fn register(&mut self, source: &str, candidate: ImageResource) -> ImageResource {
        let digest = sha1_smol::Sha1::from(&candidate.data[..]).hexdigest();

        let existing = self.by_digest.get(&digest).and_then(|indices| {
            indices
                .iter()
                .copied()
                .find(|&i| self.resources[i].data == candidate.data)
        });
        if let Some(index) = existing {
            log::debug!(
                "image {} duplicates {}, reusing",
                source,
                self.resources[index].id
            );
            self.by_source.insert(source.to_string(), index);
            return self.resources[index].clone();
        }

        let mut resource = candidate;
        resource.id = self.unique_id(&resource.id);
        let index = self.resources.len();
        self.by_digest.entry(digest).or_default().push(index);
        self.by_source.insert(source.to_string(), index);
        self.resources.push(resource.clone());
        resource
    }

    fn unique_id(&self, wanted: &str) -> String {
        if self.get(wanted).is_none() {
            return wanted.to_string();
        }
        let (stem, ext) = split_extension(wanted);
        (2..)
            .map(|n| match ext {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            })
            .find(|id| self.get(id).is_none())
            .unwrap_or_else(|| wanted.to_string())
    }
}

/// Image handling options.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    /// Embed chapter images. When off, images render as placeholders and
    /// nothing is fetched. The cover is always fetched.
    pub include: bool,
    /// Prefix for relative attachment URLs.
    pub base_url: String,
    /// Re-encode fetched images (JPEG/PNG kept, other formats converted).
    pub normalize: bool,
    /// JPEG quality used when re-encoding.
    pub quality: u8,
    /// Total fetch attempts when the body arrives truncated.
    pub max_attempts: u32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            include: true,
            base_url: "https://ranobelib.me".to_string(),
            normalize: true,
            quality: 70,
            max_attempts: 3,
        }
    }
}

impl ImageOptions {
    fn absolute_url(&self, url: &str) -> String {
        if url.contains("://") || self.base_url.is_empty() {
            url.to_string()
        } else if url.starts_with('/') {
            format!("{}{}", self.base_url.trim_end_matches('/'), url)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), url)
        }
    }
}

/// Resolves the image references of one chapter.
pub struct ImageResolver<'a> {
    source: &'a dyn ContentSource,
    store: &'a mut ImageStore,
    options: &'a ImageOptions,
    chapter_id: &'a str,
    attachments: &'a [Attachment],
}

impl<'a> ImageResolver<'a> {
    pub fn new(
        source: &'a dyn ContentSource,
        store: &'a mut ImageStore,
        options: &'a ImageOptions,
        chapter_id: &'a str,
        attachments: &'a [Attachment],
    ) -> Self {
        Self {
            source,
            store,
            options,
            chapter_id,
            attachments,
        }
    }
}

impl ResolveImage for ImageResolver<'_> {
    fn resolve(&mut self, image: &ImageRef) -> Result<Option<ImageResource>> {
        if !self.options.include {
            return Ok(None);
        }

        let (url, filename) = match image {
            ImageRef::Url(url) => (self.options.absolute_url(url), filename_from_url(url)),
            ImageRef::Attachment(name) => {
                let attachment = self
                    .attachments
                    .iter()
                    .find(|a| a.name == *name)
                    .ok_or_else(|| Error::image(name.clone(), "no such attachment"))?;
                let filename = if attachment.filename.is_empty() {
                    filename_from_url(&attachment.url)
                } else {
                    attachment.filename.clone()
                };
                (self.options.absolute_url(&attachment.url), filename)
            }
        };

        let id = format!("{}_{}", self.chapter_id, filename);
        fetch_into(self.source, self.store, self.options, &url, &id).map(Some)
    }
}

/// Fetch the cover. Runs regardless of [`ImageOptions::include`].
pub fn fetch_cover(
    source: &dyn ContentSource,
    store: &mut ImageStore,
    options: &ImageOptions,
    url: &str,
) -> Result<ImageResource> {
    let url = options.absolute_url(url);
    let id = format!("cover_{}", filename_from_url(&url));
    fetch_into(source, store, options, &url, &id)
}

fn fetch_into(
    source: &dyn ContentSource,
    store: &mut ImageStore,
    options: &ImageOptions,
    url: &str,
    id: &str,
) -> Result<ImageResource> {
    if url.trim().is_empty() {
        return Err(Error::image(url, "empty URL"));
    }
    if let Some(existing) = store.by_source(url) {
        return Ok(existing.clone());
    }

    let bytes = fetch_with_retry(source, url, options.max_attempts)
        .map_err(|e| Error::image(url, e))?;
    if bytes.is_empty() {
        return Err(Error::image(url, "empty response"));
    }

    let (format, data) = if options.normalize {
        normalize(&bytes, options.quality).map_err(|e| Error::image(url, e))?
    } else {
        (detect_media_format(id, &bytes), bytes)
    };

    let (stem, _) = split_extension(id);
    let id = format!("{}.{}", path_safe(stem), format.extension());
    let resource = ImageResource::new(id, format, data);
    Ok(store.register(url, resource))
}

// Ids double as archive paths.
fn path_safe(stem: &str) -> String {
    stem.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

fn fetch_with_retry(
    source: &dyn ContentSource,
    url: &str,
    max_attempts: u32,
) -> std::result::Result<Vec<u8>, SourceError> {
    let mut attempt = 1;
    loop {
        match source.get_image_bytes(url) {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                log::debug!("retrying {url} after attempt {attempt}: {e}");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Decode and re-encode an image.
///
/// JPEG input is re-encoded as JPEG at `quality`, PNG stays PNG. Anything
/// else becomes PNG when it has transparent pixels and JPEG otherwise.
pub fn normalize(bytes: &[u8], quality: u8) -> image::ImageResult<(MediaFormat, Vec<u8>)> {
    let source_format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, source_format)?;

    match source_format {
        ImageFormat::Png => Ok((MediaFormat::Png, encode_png(&img)?)),
        ImageFormat::Jpeg => Ok((MediaFormat::Jpeg, encode_jpeg(&img, quality)?)),
        _ if has_transparency(&img) => Ok((MediaFormat::Png, encode_png(&img)?)),
        _ => Ok((MediaFormat::Jpeg, encode_jpeg(&img, quality)?)),
    }
}

fn has_transparency(img: &DynamicImage) -> bool {
    img.color().has_alpha() && img.to_rgba8().pixels().any(|p| p.0[3] < u8::MAX)
}

fn encode_png(img: &DynamicImage) -> image::ImageResult<Vec<u8>> {
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> image::ImageResult<Vec<u8>> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ColorType::Rgb8,
    )?;
    Ok(out)
}
