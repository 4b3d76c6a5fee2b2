//! Normalizer for HTML markup fragments.
//!
//! Chapter markup is a flat run of block elements (`<p>`, `<h2>`, `<img>`,
//! lists, quotes). It is parsed with html5ever, so stray `&`/`<`, unclosed
//! tags and the full named-entity table behave as in a browser.

use super::html::{Dom, Element, parse_body};
use super::{Align, ContentNode, ImageRef, Inline, ListItem, MAX_DEPTH, Mark};
use crate::error::{Error, Result};

impl Element {
    fn align(&self) -> Option<Align> {
        if let Some(style) = self.attr("style") {
            for decl in style.split(';') {
                if let Some((prop, value)) = decl.split_once(':')
                    && prop.trim().eq_ignore_ascii_case("text-align")
                {
                    return Some(Align::parse(value));
                }
            }
        }
        self.attr("align").map(Align::parse)
    }
}

/// Build content nodes from a markup fragment.
pub fn from_markup_fragment(raw: &str) -> Result<Vec<ContentNode>> {
    let body = parse_body(raw)?;
    convert_blocks(&body, 0)
}

// ============================================================================
// DOM -> ContentNode
// ============================================================================

fn is_inline(node: &Dom) -> bool {
    match node {
        Dom::Text(_) => true,
        Dom::Element(el) => matches!(
            el.name.as_str(),
            "b" | "strong"
                | "i"
                | "em"
                | "u"
                | "ins"
                | "s"
                | "strike"
                | "del"
                | "span"
                | "a"
                | "br"
                | "sup"
                | "sub"
                | "small"
                | "font"
                | "code"
                | "mark"
        ),
    }
}

fn convert_blocks(nodes: &[Dom], depth: usize) -> Result<Vec<ContentNode>> {
    if depth > MAX_DEPTH {
        return Err(Error::MalformedContent(format!(
            "block nesting deeper than {MAX_DEPTH}"
        )));
    }

    let mut out = Vec::new();
    let mut run: Vec<&Dom> = Vec::new();

    for node in nodes {
        if is_inline(node) {
            run.push(node);
            continue;
        }
        flush_inline_run(&mut run, &mut out)?;
        let Dom::Element(el) = node else { continue };
        convert_block(el, depth, &mut out)?;
    }
    flush_inline_run(&mut run, &mut out)?;
    Ok(out)
}

fn convert_block(el: &Element, depth: usize, out: &mut Vec<ContentNode>) -> Result<()> {
    match el.name.as_str() {
        "p" => {
            let mut images = Vec::new();
            let content = collect_paragraph(&el.children, &mut images)?;
            out.push(ContentNode::Paragraph {
                align: el.align(),
                content,
            });
            out.extend(images);
        }
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = el.name[1..].parse().unwrap_or(2);
            let mut images = Vec::new();
            let content = collect_paragraph(&el.children, &mut images)?;
            out.push(ContentNode::Heading {
                level,
                align: el.align(),
                content,
            });
            out.extend(images);
        }
        "hr" => out.push(ContentNode::HorizontalRule),
        "ul" => out.push(ContentNode::BulletList(convert_items(el, depth)?)),
        "ol" => out.push(ContentNode::OrderedList {
            start: el
                .attr("start")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(1),
            items: convert_items(el, depth)?,
        }),
        "li" => out.push(ContentNode::ListItem(ListItem {
            children: convert_blocks(&el.children, depth + 1)?,
        })),
        "blockquote" => out.push(ContentNode::Blockquote(convert_blocks(
            &el.children,
            depth + 1,
        )?)),
        "img" => out.push(image_node(el)),
        // Transparent containers.
        "div" | "section" | "article" | "figure" | "center" | "main" | "body" => {
            out.extend(convert_blocks(&el.children, depth + 1)?);
        }
        other => out.push(ContentNode::Unknown(other.to_string())),
    }
    Ok(())
}

fn convert_items(list: &Element, depth: usize) -> Result<Vec<ListItem>> {
    let mut items = Vec::new();
    for child in &list.children {
        match child {
            Dom::Element(el) if el.name == "li" => items.push(ListItem {
                children: convert_blocks(&el.children, depth + 1)?,
            }),
            Dom::Text(text) if text.trim().is_empty() => {}
            other => items.push(ListItem {
                children: convert_blocks(std::slice::from_ref(other), depth + 1)?,
            }),
        }
    }
    Ok(items)
}

// An image without a source renders as a placeholder.
fn image_node(el: &Element) -> ContentNode {
    match el.attr("src").map(str::trim) {
        Some(src) if !src.is_empty() => ContentNode::Image(ImageRef::Url(src.to_string())),
        _ => ContentNode::Unknown("img".to_string()),
    }
}

fn flush_inline_run(run: &mut Vec<&Dom>, out: &mut Vec<ContentNode>) -> Result<()> {
    if run.is_empty() {
        return Ok(());
    }
    let mut images = Vec::new();
    let mut content = Vec::new();
    let mut marks = Vec::new();
    for node in run.drain(..) {
        collect_inlines(node, &mut marks, &mut content, &mut images)?;
    }
    trim_edges(&mut content);
    if !content.is_empty() {
        out.push(ContentNode::paragraph(content));
    }
    out.extend(images);
    Ok(())
}

fn collect_paragraph(nodes: &[Dom], images: &mut Vec<ContentNode>) -> Result<Vec<Inline>> {
    let mut content = Vec::new();
    let mut marks = Vec::new();
    for node in nodes {
        collect_inlines(node, &mut marks, &mut content, images)?;
    }
    trim_edges(&mut content);
    Ok(content)
}

fn collect_inlines(
    node: &Dom,
    marks: &mut Vec<Mark>,
    out: &mut Vec<Inline>,
    images: &mut Vec<ContentNode>,
) -> Result<()> {
    match node {
        Dom::Text(text) => {
            let text = collapse_whitespace(text);
            if !text.is_empty() {
                out.push(Inline::marked(text, marks.clone()));
            }
        }
        Dom::Element(el) => {
            let mark = match el.name.as_str() {
                "br" => {
                    out.push(Inline::Break);
                    return Ok(());
                }
                "img" => {
                    images.push(image_node(el));
                    return Ok(());
                }
                "b" | "strong" => Some(Mark::Bold),
                "i" | "em" => Some(Mark::Italic),
                "u" | "ins" => Some(Mark::Underline),
                "s" | "strike" | "del" => Some(Mark::Strike),
                _ => None,
            };
            let pushed = match mark {
                Some(mark) if marks.len() < MAX_DEPTH => {
                    marks.push(mark);
                    true
                }
                _ => false,
            };
            for child in &el.children {
                collect_inlines(child, marks, out, images)?;
            }
            if pushed {
                marks.pop();
            }
        }
    }
    Ok(())
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_ascii_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn trim_edges(content: &mut Vec<Inline>) {
    if let Some(Inline::Text { text, .. }) = content.first_mut() {
        *text = text.trim_start().to_string();
    }
    if let Some(Inline::Text { text, .. }) = content.last_mut() {
        *text = text.trim_end().to_string();
    }
    content.retain(|inline| !matches!(inline, Inline::Text { text, .. } if text.is_empty()));
}
