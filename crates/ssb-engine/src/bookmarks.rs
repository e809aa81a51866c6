//! Adds the welcome bookmark to a profile's `Bookmarks` file.

use std::fs;
use std::io;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use ssb_core::BookmarkStatus;
use ssb_store::write_atomic;
use tracing::{debug, warn};

const BOOKMARK_ROOTS: &[&str] = &["bookmark_bar", "other", "synced"];

/// Ensures `<default_profile>/Bookmarks` has a bookmark for `url`.
pub fn add_welcome_bookmark(default_profile: &Path, title: &str, url: &str) -> BookmarkStatus {
    let path = default_profile.join("Bookmarks");
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => {
            warn!(path = %path.display(), "cannot read bookmarks: {err}");
            return BookmarkStatus::Unreadable;
        }
    };

    let (document, status) = match raw {
        None => (new_bookmarks(title, url), BookmarkStatus::Created),
        Some(raw) => {
            let mut document = match serde_json::from_str::<Value>(&raw)
                .map_err(anyhow::Error::from)
                .and_then(check_shape)
            {
                Ok(document) => document,
                Err(err) => {
                    warn!(path = %path.display(), "bookmarks file is unreadable: {err:#}");
                    return BookmarkStatus::Unreadable;
                }
            };
            if contains_url(&document, url) {
                debug!(url, "welcome bookmark already present");
                return BookmarkStatus::AlreadyPresent;
            }
            match append_bookmark(&mut document, title, url) {
                Ok(()) => (document, BookmarkStatus::Added),
                Err(err) => {
                    warn!(path = %path.display(), "bookmarks file is unreadable: {err:#}");
                    return BookmarkStatus::Unreadable;
                }
            }
        }
    };

    match write_bookmarks(&path, &document) {
        Ok(()) => status,
        Err(err) => {
            warn!(path = %path.display(), "failed to save bookmarks: {err:#}");
            BookmarkStatus::WriteFailed
        }
    }
}

fn check_shape(document: Value) -> Result<Value> {
    if document.get("roots").and_then(Value::as_object).is_none() {
        return Err(anyhow!("bookmarks file has no roots object"));
    }
    Ok(document)
}

fn new_bookmarks(title: &str, url: &str) -> Value {
    let folder = |id: &str, name: &str, children: Vec<Value>| {
        json!({ "children": children, "id": id, "name": name, "type": "folder" })
    };
    json!({
        "roots": {
            "bookmark_bar": folder("1", "Bookmarks bar", vec![url_node("4", title, url)]),
            "other": folder("2", "Other bookmarks", Vec::new()),
            "synced": folder("3", "Mobile bookmarks", Vec::new()),
        },
        "version": 1,
    })
}

fn url_node(id: &str, title: &str, url: &str) -> Value {
    json!({ "id": id, "name": title, "type": "url", "url": url })
}

fn contains_url(node: &Value, url: &str) -> bool {
    match node {
        Value::Object(map) => {
            let is_match = map.get("type").and_then(Value::as_str) == Some("url")
                && map.get("url").and_then(Value::as_str) == Some(url);
            is_match || map.values().any(|child| contains_url(child, url))
        }
        Value::Array(items) => items.iter().any(|child| contains_url(child, url)),
        _ => false,
    }
}

fn max_id(node: &Value) -> u64 {
    match node {
        Value::Object(map) => {
            let own = map
                .get("id")
                .and_then(Value::as_str)
                .and_then(|id| id.parse().ok())
                .unwrap_or(0);
            map.values().map(max_id).fold(own, u64::max)
        }
        Value::Array(items) => items.iter().map(max_id).fold(0, u64::max),
        _ => 0,
    }
}

fn append_bookmark(document: &mut Value, title: &str, url: &str) -> Result<()> {
    let id = (max_id(document) + 1).to_string();
    let roots = document
        .get_mut("roots")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow!("bookmarks file has no roots object"))?;
    let root_name = BOOKMARK_ROOTS
        .iter()
        .find(|name| roots.contains_key(**name))
        .ok_or_else(|| anyhow!("bookmarks file has no bookmark folders"))?;
    let children = roots
        .get_mut(*root_name)
        .and_then(Value::as_object_mut)
        .map(|folder| {
            folder
                .entry("children")
                .or_insert_with(|| Value::Array(Vec::new()))
        })
        .and_then(Value::as_array_mut)
        .ok_or_else(|| anyhow!("bookmark folder {root_name} has no children list"))?;
    children.push(url_node(&id, title, url));

    // The engine recomputes a missing checksum; a stale one discards the file.
    if let Some(map) = document.as_object_mut() {
        map.remove("checksum");
    }
    Ok(())
}

fn write_bookmarks(path: &Path, document: &Value) -> Result<()> {
    let rendered = serde_json::to_string_pretty(document).context("failed to render bookmarks")?;
    write_atomic(path, rendered.as_bytes())
}
