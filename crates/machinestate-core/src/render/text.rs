//! Flattened `path: value` lines, one per field.

use serde_json::Value as Json;

use super::{leaf_text, visible_entries};

pub fn to_text(doc: &Json) -> String {
    let mut out = String::new();
    if let Json::Object(map) = doc {
        flatten(&mut out, "", map);
    }
    out
}

fn flatten(out: &mut String, prefix: &str, map: &serde_json::Map<String, Json>) {
    for (key, value) in visible_entries(map) {
        let path = format!("{prefix}{key}");
        match value {
            Json::Object(child) => flatten(out, &format!("{path}/"), child),
            leaf => {
                out.push_str(&path);
                out.push_str(": ");
                out.push_str(&leaf_text(leaf));
                out.push('\n');
            }
        }
    }
}
