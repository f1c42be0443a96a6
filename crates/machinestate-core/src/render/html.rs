//! Self-contained HTML page with one collapsible panel per class.

use std::fmt::Write;

use serde_json::Value as Json;

use super::{leaf_text, visible_entries};

const STYLE: &str = r#"
body { font-family: sans-serif; }
.accordion { background-color: #eee; color: #444; cursor: pointer; padding: 12px;
  width: 100%; border: none; text-align: left; outline: none; font-size: 15px; }
.active, .accordion:hover { background-color: #ccc; }
.option { margin: 0 4px 8px 0; padding: 6px 12px; cursor: pointer; }
.panel { padding: 0 18px; display: none; overflow: hidden; }
.panel p { margin: 4px 0; }
"#;

const SCRIPT: &str = r#"
var acc = document.getElementsByClassName("accordion");
for (var i = 0; i < acc.length; i++) {
  acc[i].addEventListener("click", function() {
    this.classList.toggle("active");
    var next = this.nextElementSibling;
    while (next && next.classList.contains("panel")) {
      next.style.display = next.style.display === "block" ? "none" : "block";
      next = next.nextElementSibling;
    }
  });
}
function setAll(open) {
  var panels = document.getElementsByClassName("panel");
  for (var i = 0; i < panels.length; i++) {
    panels[i].style.display = open ? "block" : "none";
  }
  for (var i = 0; i < acc.length; i++) {
    if (open) { acc[i].classList.add("active"); } else { acc[i].classList.remove("active"); }
  }
}
document.getElementsByClassName("expandable")[0].addEventListener("click", function() { setAll(true); });
document.getElementsByClassName("collapsible")[0].addEventListener("click", function() { setAll(false); });
"#;

/// Escapes text for element content and attribute values.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders a document as a collapsible HTML page. Meta-records are skipped.
pub fn to_html(doc: &Json) -> String {
    let mut body = String::new();
    if let Json::Object(map) = doc {
        for (key, value) in visible_entries(map) {
            match value {
                Json::Object(_) => {
                    body.push_str("<div>\n");
                    subgroup(&mut body, key, value);
                    body.push_str("</div>\n");
                }
                leaf => push_leaf(&mut body, key, leaf),
            }
        }
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<title>MachineState</title>\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n\
         <style>{STYLE}</style>\n</head>\n<body>\n\
         <button class=\"option expandable\">Expand all</button>\n\
         <button class=\"option collapsible\">Collapse all</button>\n\
         {body}<script>{SCRIPT}</script>\n</body>\n</html>\n"
    )
}

fn subgroup(out: &mut String, key: &str, value: &Json) {
    let _ = writeln!(out, "<button class=\"accordion\">{}</button>", escape(key));
    let Json::Object(map) = value else {
        return;
    };
    for (k, v) in visible_entries(map) {
        match v {
            Json::Object(_) => {
                out.push_str("<div class=\"panel\">\n");
                subgroup(out, k, v);
                out.push_str("</div>\n");
            }
            leaf => push_leaf(out, k, leaf),
        }
    }
}

fn push_leaf(out: &mut String, key: &str, value: &Json) {
    let _ = writeln!(
        out,
        "<div class=\"panel\"><p><b>{}:</b> {}</p></div>",
        escape(key),
        escape(&leaf_text(value))
    );
}
