//! Lenient JSON extraction from model output.
//!
//! Models wrap JSON in markdown fences or surround it with prose. Parsing
//! strips fences, tries the whole text, then falls back to the first
//! `{...}` block and finally the first `[...]` block.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^```(?:json)?\s*").expect("valid regex"));
static FENCE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*```$").expect("valid regex"));
static OBJECT_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[\s\S]*\}").expect("valid regex"));
static ARRAY_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[\s\S]*\]").expect("valid regex"));

/// Remove a leading ```` ```json ```` fence and a trailing ```` ``` ````.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    let opened = FENCE_OPEN.replace(trimmed, "");
    FENCE_CLOSE.replace(&opened, "").into_owned()
}

/// Parse JSON out of free-form model text. `None` when nothing parses.
pub fn json_from_text(text: &str) -> Option<Value> {
    let raw = strip_fences(text);
    if raw.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(&raw) {
        return Some(value);
    }
    // Whichever block opens first is the outermost one.
    let mut blocks: Vec<regex::Match<'_>> = [&*OBJECT_BLOCK, &*ARRAY_BLOCK]
        .iter()
        .filter_map(|re| re.find(&raw))
        .collect();
    blocks.sort_by_key(|m| m.start());
    blocks
        .into_iter()
        .find_map(|m| serde_json::from_str(m.as_str()).ok())
}

/// Accept either structured JSON or a string that contains JSON.
pub fn normalize_content(content: Value) -> Option<Value> {
    match content {
        Value::String(text) => json_from_text(&text),
        Value::Null => None,
        other => Some(other),
    }
}
