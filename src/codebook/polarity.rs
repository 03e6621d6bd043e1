use super::CodeMap;

/// Labels that denote absence. Compared against the whole trimmed, lowercased label.
const NEGATIVE_LABELS: &[&str] = &[
    "no",
    "no hay",
    "none",
    "falso",
    "false",
    "no aplica",
    "ninguno",
    "ninguna",
    "nan",
    "0",
];

const AFFIRMATIVE_LABELS: &[&str] = &["sí", "si", "yes", "true", "verdadero"];

const AFFIRMATIVE_LEXEMES: &[&str] = &["sí", "si", "yes", "true", "hay", "tiene", "con"];

const NEGATIVE_LEXEMES: &[&str] = &["no", "sin", "ningún", "ningun", "ninguno", "ninguna", "none", "false"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lexeme {
    Affirmative,
    Negative,
}

fn normalize_label(label: &str) -> String {
    label
        .trim()
        .trim_end_matches(|value: char| matches!(value, '.' | '!' | ','))
        .trim()
        .to_lowercase()
}

pub fn is_negative_label(label: &str) -> bool {
    let normalized = normalize_label(label);
    NEGATIVE_LABELS.contains(&normalized.as_str())
}

pub fn is_affirmative_label(label: &str) -> bool {
    let normalized = normalize_label(label);
    AFFIRMATIVE_LABELS.contains(&normalized.as_str())
}

/// Code whose label reads as negation, else `"0"`, else `"1"`, else the first key.
pub fn negative_code(map: &CodeMap) -> &str {
    if let Some((code, _)) = map.entries().find(|(_, label)| is_negative_label(label)) {
        return code;
    }
    for fallback in ["0", "1"] {
        if let Some((code, _)) = map.entries().find(|(code, _)| *code == fallback) {
            return code;
        }
    }
    map.first_code()
}

/// Code whose label reads as affirmation. Two-valued maps without an explicit
/// affirmative label use the entry that is not the negative code.
pub fn affirmative_code(map: &CodeMap) -> Option<&str> {
    if let Some((code, _)) = map.entries().find(|(_, label)| is_affirmative_label(label)) {
        return Some(code);
    }
    if map.len() == 2 {
        let negative = negative_code(map);
        return map.codes().find(|code| *code != negative);
    }
    None
}

/// Classifies free text by its leading word, so "no hay" stays negative.
pub fn leading_lexeme(raw: &str) -> Option<Lexeme> {
    let lowered = raw.trim().to_lowercase();
    let first = lowered
        .split(|value: char| !value.is_alphanumeric())
        .find(|token| !token.is_empty())?;
    if NEGATIVE_LEXEMES.contains(&first) {
        return Some(Lexeme::Negative);
    }
    if AFFIRMATIVE_LEXEMES.contains(&first) {
        return Some(Lexeme::Affirmative);
    }
    None
}
