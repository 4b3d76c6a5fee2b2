//! The remote content source, as seen by the converter.
//!
//! HTTP, authentication and endpoint discovery live behind
//! [`ContentSource`]; this crate only needs chapter payloads and image bytes.

mod local;

pub use local::{BookManifest, LocalSource};

use serde::Deserialize;
use serde_json::Value;

use crate::book::{ChapterMeta, Ordinal};
use crate::content::ChapterContent;
use crate::error::SourceError;

/// Supplies chapter payloads and image bytes. Calls block until done.
pub trait ContentSource: Send + Sync {
    fn get_chapter(
        &self,
        series_id: &str,
        branch_id: &str,
        number: &Ordinal,
        volume: &Ordinal,
    ) -> Result<ChapterData, SourceError>;

    fn get_image_bytes(&self, url: &str) -> Result<Vec<u8>, SourceError>;
}

/// An image attached to a chapter, referenced by `name` from the tree.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Attachment {
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub extension: String,
    pub url: String,
}

/// One fetched chapter.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterData {
    pub id: String,
    pub number: Ordinal,
    pub volume: Ordinal,
    pub content: ChapterContent,
    pub attachments: Vec<Attachment>,
}

#[derive(Deserialize)]
struct RawChapter {
    #[serde(default)]
    id: Value,
    number: Ordinal,
    volume: Ordinal,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    attachments: Vec<Attachment>,
}

impl ChapterData {
    /// Interpret an upstream chapter payload.
    ///
    /// The content encoding comes from an explicit `type` field when present
    /// (`markup`/`html`, `tree`/`doc`); otherwise a string is markup and a
    /// document object or block array is a tree.
    pub fn from_json(value: Value) -> Result<Self, serde_json::Error> {
        let raw: RawChapter = serde_json::from_value(value)?;
        let content = match (raw.kind.as_deref(), raw.content) {
            (Some("markup" | "html"), Value::String(s)) | (None, Value::String(s)) => {
                ChapterContent::Markup(s)
            }
            (Some("tree" | "doc"), tree) => ChapterContent::Tree(unwrap_doc(tree)),
            (None, tree @ (Value::Array(_) | Value::Object(_))) => {
                let is_doc = tree.is_array()
                    || tree.get("type").and_then(Value::as_str) == Some("doc");
                if is_doc {
                    ChapterContent::Tree(unwrap_doc(tree))
                } else {
                    let kind = tree
                        .get("type")
                        .and_then(Value::as_str)
                        .unwrap_or("object")
                        .to_string();
                    ChapterContent::Other(kind)
                }
            }
            (Some(kind), _) => ChapterContent::Other(kind.to_string()),
            (None, Value::Null) => ChapterContent::Markup(String::new()),
            (None, _) => ChapterContent::Other("scalar".to_string()),
        };

        let id = match raw.id {
            Value::String(s) => s,
            Value::Null => format!("{}_{}", raw.volume, raw.number),
            other => other.to_string(),
        };

        Ok(ChapterData {
            id,
            number: raw.number,
            volume: raw.volume,
            content,
            attachments: raw.attachments,
        })
    }

    pub fn matches(&self, meta: &ChapterMeta) -> bool {
        self.number == meta.number && self.volume == meta.volume
    }
}

/// `{"type": "doc", "content": [...]}` -> `[...]`
fn unwrap_doc(tree: Value) -> Value {
    match tree {
        Value::Object(mut obj) if obj.get("type").and_then(Value::as_str) == Some("doc") => {
            obj.remove("content").unwrap_or(Value::Array(Vec::new()))
        }
        other => other,
    }
}
