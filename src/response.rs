//! Best-effort coercion of free-form model output into the JSON shapes the
//! client expects. Nothing in here returns an error: unparseable output is
//! wrapped as plain text instead.

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

use crate::models::api::{ Caption, GeneratedMessage };

const OPENING_FENCES: &[&str] = &["```json", "```JSON", "```"];
const CLOSING_FENCE: &str = "```";

/// The reply shape returned by `generate-reply`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ReplyResult {
    pub merged_reply: String,
    #[serde(default)]
    pub detected_messages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
}

impl ReplyResult {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self { merged_reply: text.into(), ..Default::default() }
    }
}

/// Removes one leading ```` ```json ```` (or bare ```` ``` ````) fence and one
/// trailing fence. Fences inside the body are left alone.
pub fn strip_fences(text: &str) -> String {
    let mut out = text.trim();
    if let Some(rest) = OPENING_FENCES.iter().find_map(|fence| out.strip_prefix(*fence)) {
        out = rest.trim_start();
    }
    if let Some(rest) = out.strip_suffix(CLOSING_FENCE) {
        out = rest.trim_end();
    }
    out.to_string()
}

/// Byte range of the first balanced `{...}` starting at or after `from`.
fn object_span(text: &str, from: usize) -> Option<(usize, usize)> {
    let start = from + text[from..].find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some((start, start + offset + 1));
                }
            }
            _ => {}
        }
    }
    None
}

/// Direct parse first, then the first top-level object that parses.
pub fn extract_json(text: &str) -> Option<Value> {
    let cleaned = strip_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(&cleaned) {
        return Some(value);
    }
    let mut from = 0;
    while let Some((start, end)) = object_span(&cleaned, from) {
        if let Ok(value) = serde_json::from_str::<Value>(&cleaned[start..end]) {
            return Some(value);
        }
        from = start + 1;
    }
    None
}

fn entry_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) =>
            ["text", "reply", "message", "caption"]
                .iter()
                .find_map(|key| obj.get(*key).and_then(Value::as_str))
                .map(str::to_string),
        _ => None,
    }?;
    let trimmed = text.trim();
    if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
}

/// String entries exactly as given. Anything else is dropped.
fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Legacy `replies` entries: strings or `{text|reply|message}` objects.
fn reply_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(entry_text).collect())
        .unwrap_or_default()
}

fn reply_from_object(obj: &Map<String, Value>) -> Option<ReplyResult> {
    let detected_messages = string_list(obj.get("detectedMessages"));
    let mut alternatives = string_list(obj.get("alternatives"));

    let current = obj.get("mergedReply").and_then(Value::as_str);
    let legacy = obj.get("reply").and_then(Value::as_str);
    let merged_reply = match current.or(legacy) {
        Some(text) => text.to_string(),
        None => {
            let mut replies = reply_list(obj.get("replies"));
            if replies.is_empty() {
                return None;
            }
            let first = replies.remove(0);
            replies.append(&mut alternatives);
            alternatives = replies;
            first
        }
    };

    Some(ReplyResult { merged_reply, detected_messages, alternatives })
}

pub fn normalize_reply(text: &str) -> ReplyResult {
    let cleaned = strip_fences(text);
    let parsed = match extract_json(&cleaned) {
        Some(Value::Object(obj)) => reply_from_object(&obj),
        Some(Value::Array(items)) => {
            let mut wrapped = Map::new();
            wrapped.insert("replies".into(), Value::Array(items));
            reply_from_object(&wrapped)
        }
        _ => None,
    };
    parsed.unwrap_or_else(|| ReplyResult::from_text(cleaned))
}

/// Finds the list under `key`, or accepts a bare top-level array.
fn list_under<'a>(value: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    match value {
        Value::Array(items) => Some(items),
        Value::Object(obj) => obj.get(key).and_then(Value::as_array),
        _ => None,
    }
}

pub fn normalize_captions(text: &str) -> Vec<Caption> {
    let cleaned = strip_fences(text);
    let captions: Vec<Caption> = extract_json(&cleaned)
        .as_ref()
        .and_then(|v| list_under(v, "captions"))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let caption = entry_text(item)?;
                    let category = item
                        .get("category")
                        .and_then(Value::as_str)
                        .unwrap_or("general")
                        .to_string();
                    Some(Caption { category, caption })
                })
                .collect()
        })
        .unwrap_or_default();

    if captions.is_empty() && !cleaned.is_empty() {
        return vec![Caption { category: "general".into(), caption: cleaned }];
    }
    captions
}

pub fn normalize_messages(text: &str, category: &str, limit: usize) -> Vec<GeneratedMessage> {
    let cleaned = strip_fences(text);
    let mut messages: Vec<GeneratedMessage> = extract_json(&cleaned)
        .as_ref()
        .and_then(|v| list_under(v, "messages"))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let text = entry_text(item)?;
                    let category = item
                        .get("category")
                        .and_then(Value::as_str)
                        .unwrap_or(category)
                        .to_string();
                    Some(GeneratedMessage { text, category })
                })
                .collect()
        })
        .unwrap_or_default();

    if messages.is_empty() && !cleaned.is_empty() {
        messages.push(GeneratedMessage { text: cleaned, category: category.to_string() });
    }
    messages.truncate(limit);
    messages
}
