//! Normalizer for the JSON block/inline document tree.

use serde_json::{Map, Value};

use super::{Align, ContentNode, ImageRef, Inline, ListItem, MAX_DEPTH, Mark};
use crate::error::{Error, Result};

/// Build content nodes from a document tree.
///
/// Accepts either a `{"type": "doc", "content": [...]}` root or the bare
/// block array. Every node must carry a `type`; unknown block types become
/// [`ContentNode::Unknown`].
pub fn from_block_tree(tree: &Value) -> Result<Vec<ContentNode>> {
    match tree {
        Value::Array(blocks) => parse_blocks(blocks, 0),
        Value::Object(obj) => {
            if node_type(obj)? == "doc" {
                parse_blocks(children(obj), 0)
            } else {
                Ok(vec![parse_block(obj, 0)?])
            }
        }
        Value::Null => Ok(Vec::new()),
        other => Err(Error::MalformedContent(format!(
            "document tree must be an object or array, got {}",
            kind_of(other)
        ))),
    }
}

fn parse_blocks(blocks: &[Value], depth: usize) -> Result<Vec<ContentNode>> {
    if depth > MAX_DEPTH {
        return Err(Error::MalformedContent(format!(
            "block nesting deeper than {MAX_DEPTH}"
        )));
    }
    blocks
        .iter()
        .map(|block| match block {
            Value::Object(obj) => parse_block(obj, depth),
            other => Err(Error::MalformedContent(format!(
                "block must be an object, got {}",
                kind_of(other)
            ))),
        })
        .collect()
}

fn parse_block(obj: &Map<String, Value>, depth: usize) -> Result<ContentNode> {
    let node = match node_type(obj)? {
        "paragraph" => ContentNode::Paragraph {
            align: align_attr(obj),
            content: parse_inlines(children(obj))?,
        },
        "heading" => ContentNode::Heading {
            level: attr(obj, "level")
                .and_then(Value::as_u64)
                .map(|l| l.clamp(1, 6) as u8)
                .unwrap_or(2),
            align: align_attr(obj),
            content: parse_inlines(children(obj))?,
        },
        "horizontalRule" => ContentNode::HorizontalRule,
        "bulletList" => ContentNode::BulletList(parse_items(children(obj), depth)?),
        "orderedList" => ContentNode::OrderedList {
            start: attr(obj, "start")
                .and_then(Value::as_u64)
                .and_then(|s| u32::try_from(s).ok())
                .unwrap_or(1),
            items: parse_items(children(obj), depth)?,
        },
        "listItem" => ContentNode::ListItem(ListItem {
            children: parse_blocks(children(obj), depth + 1)?,
        }),
        "blockquote" => ContentNode::Blockquote(parse_blocks(children(obj), depth + 1)?),
        "image" => match image_ref(obj) {
            Some(image) => ContentNode::Image(image),
            None => ContentNode::Unknown("image".to_string()),
        },
        "text" => ContentNode::Text(parse_text(obj)?),
        other => ContentNode::Unknown(other.to_string()),
    };
    Ok(node)
}

fn parse_items(items: &[Value], depth: usize) -> Result<Vec<ListItem>> {
    let mut out = Vec::with_capacity(items.len());
    for node in parse_blocks(items, depth + 1)? {
        match node {
            ContentNode::ListItem(item) => out.push(item),
            // Stray blocks directly inside a list get an item of their own.
            other => out.push(ListItem {
                children: vec![other],
            }),
        }
    }
    Ok(out)
}

fn parse_inlines(nodes: &[Value]) -> Result<Vec<Inline>> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        let Value::Object(obj) = node else {
            return Err(Error::MalformedContent(format!(
                "inline node must be an object, got {}",
                kind_of(node)
            )));
        };
        match node_type(obj)? {
            "text" => out.push(parse_text(obj)?),
            "hardBreak" => out.push(Inline::Break),
            _ => {
                // Unknown inline nodes keep their text, if any.
                if let Some(text) = obj.get("text").and_then(Value::as_str) {
                    out.push(Inline::text(text));
                }
            }
        }
    }
    Ok(out)
}

fn parse_text(obj: &Map<String, Value>) -> Result<Inline> {
    let text = obj.get("text").and_then(Value::as_str).unwrap_or_default();
    let mut marks = Vec::new();
    if let Some(Value::Array(raw_marks)) = obj.get("marks") {
        for mark in raw_marks {
            let Value::Object(mark) = mark else {
                return Err(Error::MalformedContent("mark must be an object".into()));
            };
            marks.push(Mark::from_name(node_type(mark)?));
        }
    }
    if marks.len() > MAX_DEPTH {
        marks.truncate(MAX_DEPTH);
    }
    Ok(Inline::marked(text, marks))
}

fn image_ref(obj: &Map<String, Value>) -> Option<ImageRef> {
    // The last entry of `attrs.images` is the one the editor displays.
    let named = attr(obj, "images")
        .and_then(Value::as_array)
        .and_then(|images| images.last())
        .and_then(|image| image.get("image"))
        .and_then(Value::as_str);
    if let Some(name) = named {
        return Some(ImageRef::Attachment(name.to_string()));
    }
    attr(obj, "src")
        .and_then(Value::as_str)
        .filter(|src| !src.is_empty())
        .map(|src| ImageRef::Url(src.to_string()))
}

fn node_type(obj: &Map<String, Value>) -> Result<&str> {
    obj.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::MalformedContent("node without a 'type' field".into()))
}

fn children(obj: &Map<String, Value>) -> &[Value] {
    obj.get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn attr<'a>(obj: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    obj.get("attrs").and_then(|attrs| attrs.get(name))
}

fn align_attr(obj: &Map<String, Value>) -> Option<Align> {
    attr(obj, "textAlign").and_then(Value::as_str).map(Align::parse)
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
