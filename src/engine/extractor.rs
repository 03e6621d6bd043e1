use serde_json::{Map, Value};

use crate::codebook::literal::normalize_quotes;

const FENCE: &str = "```";
// Bounds the brace scan on pathological outputs made of many stray '{'.
const MAX_SCAN_STARTS: usize = 64;

struct FencedBlock<'a> {
    tag: &'a str,
    content: &'a str,
}

/// First syntactically valid JSON object in `text`, or `None`.
///
/// Candidates are tried in order: fenced blocks tagged `json`, any other fenced
/// block holding a brace-delimited object, then a brace-depth scan over the raw
/// text. Every candidate gets a second chance with typographic quotes made ASCII.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    if text.trim().is_empty() {
        return None;
    }
    let blocks = fenced_blocks(text);

    for block in blocks.iter().filter(|block| block.tag.eq_ignore_ascii_case("json")) {
        if let Some(object) = parse_object(block.content) {
            return Some(object);
        }
    }
    for block in &blocks {
        if let Some(object) = scan_objects(block.content) {
            return Some(object);
        }
    }
    scan_objects(text)
}

/// Unwraps `{"respuesta": {...}}`-style envelopes. Only applies when the single
/// key is not itself a variable the section expects.
pub fn unwrap_envelope(object: Map<String, Value>, is_variable: impl Fn(&str) -> bool) -> Map<String, Value> {
    let is_envelope = object.len() == 1
        && object
            .iter()
            .next()
            .map(|(key, value)| !is_variable(key) && value.is_object())
            .unwrap_or(false);
    if !is_envelope {
        return object;
    }
    match object.into_iter().next() {
        Some((key, Value::Object(inner))) => {
            tracing::debug!(wrapper = %key, "unwrapped single-key envelope");
            inner
        }
        Some((key, value)) => Map::from_iter([(key, value)]),
        None => Map::new(),
    }
}

fn parse_object(candidate: &str) -> Option<Map<String, Value>> {
    let trimmed = candidate.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(trimmed) {
        return Some(object);
    }
    let cleaned = normalize_quotes(trimmed);
    if cleaned == trimmed {
        return None;
    }
    match serde_json::from_str::<Value>(&cleaned) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

fn fenced_blocks(text: &str) -> Vec<FencedBlock<'_>> {
    let mut blocks = vec![];
    let mut rest = text;
    while let Some(open) = rest.find(FENCE) {
        let after_open = &rest[open + FENCE.len()..];
        let (tag, body) = match after_open.find('\n') {
            Some(newline) => (after_open[..newline].trim(), &after_open[newline + 1..]),
            None => ("", after_open),
        };
        let Some(close) = body.find(FENCE) else {
            // Unterminated fence: the model stopped mid-block.
            blocks.push(FencedBlock { tag, content: body });
            break;
        };
        blocks.push(FencedBlock {
            tag,
            content: &body[..close],
        });
        rest = &body[close + FENCE.len()..];
    }
    blocks
}

fn scan_objects(text: &str) -> Option<Map<String, Value>> {
    text.char_indices()
        .filter(|(_, value)| *value == '{')
        .take(MAX_SCAN_STARTS)
        .find_map(|(start, _)| balanced_object(&text[start..]).and_then(parse_object))
}

/// Slice from the leading `{` to its matching `}`, skipping braces inside strings.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, value) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if value == '\\' {
                escaped = true;
            } else if value == '"' {
                in_string = false;
            }
            continue;
        }
        match value {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..idx + value.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_json_fence() {
        let text = "Here you go: ```json\n{\"a\": {\"codigo\":\"1\",\"evidencia\":[]}}\n```";
        let object = extract_json_object(text).expect("object");
        assert_eq!(Value::Object(object), json!({"a": {"codigo": "1", "evidencia": []}}));
    }

    #[test]
    fn no_json_returns_none() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("   \n ").is_none());
        assert!(extract_json_object("{ broken: ").is_none());
    }

    #[test]
    fn untagged_fence_with_prose_inside() {
        let text = "```\nSure! {\"tema\": \"2\"} hope it helps\n```";
        let object = extract_json_object(text).expect("object");
        assert_eq!(object["tema"], json!("2"));
    }

    #[test]
    fn brace_scan_tolerates_trailing_commentary_and_braces_in_strings() {
        let text = "Result: {\"cita\": {\"codigo\": \"2\", \"evidencia\": [\"dijo {algo}\"]}} -- done }";
        let object = extract_json_object(text).expect("object");
        assert_eq!(object["cita"]["evidencia"][0], json!("dijo {algo}"));
    }

    #[test]
    fn skips_invalid_candidates_until_a_valid_one() {
        let text = "{not json} then {\"tema\": \"3\"}";
        let object = extract_json_object(text).expect("object");
        assert_eq!(object["tema"], json!("3"));
    }

    #[test]
    fn repairs_typographic_quotes() {
        let text = "{\u{201C}tema\u{201D}: \u{201C}2\u{201D}}";
        let object = extract_json_object(text).expect("object");
        assert_eq!(object["tema"], json!("2"));
    }

    #[test]
    fn unwraps_non_variable_envelope_only() {
        let wrapped = extract_json_object("{\"respuesta\": {\"tema\": \"1\"}}").expect("object");
        let unwrapped = unwrap_envelope(wrapped, |name| name == "tema");
        assert!(unwrapped.contains_key("tema"));

        let variable = extract_json_object("{\"tema\": {\"codigo\": \"1\"}}").expect("object");
        let kept = unwrap_envelope(variable, |name| name == "tema");
        assert!(kept.contains_key("tema"));
    }
}
