//! Builds a small source dump on disk for the format tests.

#![allow(dead_code)]

use std::fs;
use std::io::Cursor;
use std::path::Path;

use serde_json::json;
use tempfile::TempDir;

pub fn png(r: u8, g: u8, b: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([r, g, b]));
    let mut out = Vec::new();
    img.write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
        .unwrap();
    out
}

fn write_json(path: &Path, value: &serde_json::Value) {
    fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

/// Three chapters over two volumes. Chapter 2 has an attached image,
/// chapter 3 has no payload on disk, and the cover lives in `images/`.
pub fn novel_dump() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("chapters")).unwrap();
    fs::create_dir_all(root.join("images")).unwrap();

    write_json(
        &root.join("book.json"),
        &json!({
            "series_id": "1234--novel",
            "branch_id": "7",
            "metadata": {
                "title": "Novel & Co",
                "authors": ["Writer"],
                "genres": ["Fantasy"],
                "summary": "First line.\nSecond line.",
                "cover_url": "https://cdn.test/covers/cover.png"
            },
            "chapters": [
                {"name": "Arrival", "volume": 1, "number": 1},
                {"name": "", "volume": 1, "number": "2"},
                {"name": "Lost", "volume": 2, "number": 3}
            ]
        }),
    );

    write_json(
        &root.join("chapters/1-1.json"),
        &json!({
            "id": 101,
            "volume": "1",
            "number": "1",
            "content": "<p style=\"text-align: center\">Hello <b>world</b></p><blockquote><p>Quoted</p></blockquote><p>Tom & Jerry, 5 < 6&thinsp;!</p>"
        }),
    );
    write_json(
        &root.join("chapters/1-2.json"),
        &json!({
            "id": 102,
            "volume": "1",
            "number": "2",
            "content": {
                "type": "doc",
                "content": [
                    {"type": "heading", "attrs": {"level": 3}, "content": [{"type": "text", "text": "Part"}]},
                    {"type": "image", "attrs": {"images": [{"image": "art"}]}},
                    {"type": "horizontalRule"}
                ]
            },
            "attachments": [
                {"name": "art", "filename": "art.png", "url": "/uploads/art.png"}
            ]
        }),
    );

    fs::write(root.join("images/art.png"), png(0, 128, 255)).unwrap();
    fs::write(root.join("images/cover.png"), png(255, 255, 0)).unwrap();
    dir
}
