use serde_json::Value;

const QUOTE_CHARS: &[char] = &['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '«', '»', '`'];
const ELLIPSIS_CHARS: &[char] = &['.', '…'];

/// Snippets claimed by the model. Accepts a list, a single string, or a string
/// holding a JSON-encoded list. Non-string items are ignored.
pub fn snippets_from_value(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(ToString::to_string)
            .collect(),
        Value::String(text) => {
            let trimmed = text.trim();
            if trimmed.starts_with('[') {
                if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(trimmed) {
                    return items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(ToString::to_string)
                        .collect();
                }
            }
            if trimmed.is_empty() {
                vec![]
            } else {
                vec![trimmed.to_string()]
            }
        }
        _ => vec![],
    }
}

/// Trims whitespace, wrapping quotes and leading/trailing ellipsis dots.
pub fn clean_snippet(raw: &str) -> String {
    let mut current = raw.trim();
    loop {
        let next = current
            .trim_matches(QUOTE_CHARS)
            .trim_matches(ELLIPSIS_CHARS)
            .trim();
        if next == current {
            return next.to_string();
        }
        current = next;
    }
}

/// Lowercased alphanumerics only; the key used for fuzzy comparison.
pub fn fuzzy_key(text: &str) -> String {
    text.chars()
        .filter(|value| value.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Literal text in `scope` matching `snippet`, exact first, then case-insensitive.
pub fn locate(scope: &str, snippet: &str) -> Option<String> {
    if snippet.is_empty() {
        return None;
    }
    if scope.contains(snippet) {
        return Some(snippet.to_string());
    }
    find_case_insensitive(scope, snippet).map(ToString::to_string)
}

/// Char-wise case-insensitive search returning the slice of `scope` itself, so
/// byte offsets never drift when lowercasing changes a character's width.
fn find_case_insensitive<'a>(scope: &'a str, needle: &str) -> Option<&'a str> {
    let needle: Vec<char> = needle.chars().collect();
    let haystack: Vec<(usize, char)> = scope.char_indices().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    for start in 0..=haystack.len() - needle.len() {
        let matched = needle
            .iter()
            .zip(&haystack[start..start + needle.len()])
            .all(|(wanted, (_, found))| chars_equal_ignore_case(*wanted, *found));
        if matched {
            let begin = haystack[start].0;
            let end = haystack
                .get(start + needle.len())
                .map(|(idx, _)| *idx)
                .unwrap_or(scope.len());
            return Some(&scope[begin..end]);
        }
    }
    None
}

fn chars_equal_ignore_case(left: char, right: char) -> bool {
    left == right || left.to_lowercase().eq(right.to_lowercase())
}

/// Accepted snippets for one variable, in first-seen order without duplicates.
///
/// `label_echo` is the resolved label; snippets that merely repeat it are dropped.
pub fn match_evidence(scope: &str, claimed: &[String], label_echo: Option<&str>) -> Vec<String> {
    let scope_key = fuzzy_key(scope);
    let label_key = label_echo.map(fuzzy_key).filter(|key| !key.is_empty());
    let mut accepted: Vec<String> = vec![];
    let mut dropped = 0usize;

    for raw in claimed {
        let snippet = clean_snippet(raw);
        let snippet_key = fuzzy_key(&snippet);
        if snippet.is_empty() || snippet_key.is_empty() {
            dropped += 1;
            continue;
        }
        if label_key.as_deref() == Some(snippet_key.as_str()) {
            dropped += 1;
            continue;
        }
        let grounded = locate(scope, &snippet).or_else(|| {
            scope_key
                .contains(&snippet_key)
                .then(|| snippet.clone())
        });
        match grounded {
            Some(text) if !accepted.contains(&text) => accepted.push(text),
            Some(_) => {}
            None => dropped += 1,
        }
    }

    if dropped > 0 {
        tracing::debug!(dropped, accepted = accepted.len(), "ungrounded evidence dropped");
    }
    accepted
}
