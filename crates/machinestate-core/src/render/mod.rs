//! Rendering snapshots: JSON documents, an HTML view and a flat text view.

pub mod html;
pub mod text;

use serde::Serialize;
use serde_json::Value as Json;
use serde_json::ser::PrettyFormatter;

use crate::model::META_KEY;

pub use html::to_html;
pub use text::to_text;

/// Indentation used when none is given.
pub const DEFAULT_INDENT: usize = 4;

/// Presentation options for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentOptions {
    /// Include `_meta` records so the document can be loaded back.
    pub meta: bool,
    /// Sort keys recursively instead of keeping collection order.
    pub sort: bool,
    /// Spaces per level; 0 renders compact single-line JSON.
    pub indent: usize,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            meta: true,
            sort: false,
            indent: DEFAULT_INDENT,
        }
    }
}

/// Recursively sorts object keys.
pub fn sort_keys(value: Json) -> Json {
    match value {
        Json::Object(map) => {
            let mut entries: Vec<(String, Json)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Json::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, sort_keys(v)))
                    .collect(),
            )
        }
        Json::Array(items) => Json::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// Serializes with `indent` spaces per level, compact for 0.
pub fn to_json_string(value: &Json, indent: usize) -> String {
    if indent == 0 {
        return value.to_string();
    }
    let indent = " ".repeat(indent);
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(indent.as_bytes()));
    // Writing a Value into a Vec cannot fail
    if value.serialize(&mut ser).is_err() {
        return value.to_string();
    }
    String::from_utf8(buf).unwrap_or_else(|_| value.to_string())
}

/// Human readable form of a document leaf.
pub(crate) fn leaf_text(value: &Json) -> String {
    match value {
        Json::Null => "unavailable".to_string(),
        Json::String(s) => s.clone(),
        Json::Array(items) => items
            .iter()
            .map(leaf_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => other.to_string(),
    }
}

/// Entries of an object without its meta-record.
pub(crate) fn visible_entries(map: &serde_json::Map<String, Json>) -> impl Iterator<Item = (&String, &Json)> {
    map.iter().filter(|(k, _)| k.as_str() != META_KEY)
}
