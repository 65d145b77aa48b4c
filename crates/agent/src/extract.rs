//! Pulls a JSON object out of free-form model output.

use serde_json::{Map, Value};

/// Finds the first JSON object in `text` that the model meant as its answer.
///
/// Tried in order: a ```` ```json ```` fence, any ```` ``` ```` fence, the first
/// brace-free `{...}` span mentioning `"key"`, then the whole text.
pub fn json_object(text: &str, key: &str) -> Option<Map<String, Value>> {
    fenced(text, "```json")
        .or_else(|| fenced(text, "```"))
        .or_else(|| flat_object_with_key(text, key))
        .or_else(|| parse_object(text))
}

fn fenced(text: &str, opener: &str) -> Option<Map<String, Value>> {
    let after = text.split_once(opener)?.1;
    let body = after.split("```").next()?;
    parse_object(body)
}

fn flat_object_with_key(text: &str, key: &str) -> Option<Map<String, Value>> {
    let quoted = format!("\"{key}\"");
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let rest = &text[start + 1..];
        let Some(close) = rest.find(['{', '}']) else {
            return None;
        };
        if rest.as_bytes()[close] == b'}' {
            let candidate = &text[start..start + close + 2];
            if candidate.contains(&quoted) {
                return parse_object(candidate);
            }
        }
        search_from = start + 1;
    }
    None
}

fn parse_object(raw: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(raw.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}
