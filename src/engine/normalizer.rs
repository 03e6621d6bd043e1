//! Table-driven resolution of a raw model code onto a codebook key.
//!
//! The first matching rule wins:
//!
//! 1. verbatim key
//! 2. case-insensitive label (2b: numeric spelling of a key such as `"02"` or `"2 - Política"`)
//! 3. integer above 2 on the binary fallback map → negative
//! 4. integer outside a small map → negative
//! 5. hallucinated text → negative
//! 6. leading affirmative/negative word
//! 7. negative
//!
//! Resolution never fails and always yields a key of the map it was given.

use serde::{Deserialize, Serialize};

use crate::codebook::polarity::{affirmative_code, is_negative_label, leading_lexeme, Lexeme};
use crate::codebook::CodeMap;

const QUOTE_CHARS: &[char] = &['"', '\'', '\u{201C}', '\u{201D}', '\u{2018}', '\u{2019}', '`'];

/// Thresholds of the "this is prose, not a code" predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HallucinationRules {
    pub max_len: usize,
    pub reject_question: bool,
    pub reject_capitalized: bool,
}

impl Default for HallucinationRules {
    fn default() -> Self {
        Self {
            max_len: 10,
            reject_question: true,
            reject_capitalized: true,
        }
    }
}

impl HallucinationRules {
    /// `numeric_codes` is whether the map being resolved against uses digit keys.
    pub fn is_hallucinated(&self, raw: &str, numeric_codes: bool) -> bool {
        let trimmed = raw.trim();
        if trimmed.chars().count() > self.max_len {
            return true;
        }
        if self.reject_question && trimmed.contains('?') {
            return true;
        }
        self.reject_capitalized
            && numeric_codes
            && trimmed.chars().next().is_some_and(char::is_uppercase)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Verbatim,
    NumericCanonical,
    LabelMatch,
    BinaryOutOfRange,
    OutOfRange,
    Hallucinated,
    AffirmativeLexeme,
    NegativeLexeme,
    Empty,
    Fallback,
    FreeText,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Verbatim => "verbatim",
            Self::NumericCanonical => "numeric_canonical",
            Self::LabelMatch => "label_match",
            Self::BinaryOutOfRange => "binary_out_of_range",
            Self::OutOfRange => "out_of_range",
            Self::Hallucinated => "hallucinated",
            Self::AffirmativeLexeme => "affirmative_lexeme",
            Self::NegativeLexeme => "negative_lexeme",
            Self::Empty => "empty",
            Self::Fallback => "fallback",
            Self::FreeText => "free_text",
        }
    }

    /// Whether the model's answer was usable as given.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Verbatim | Self::FreeText)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub code: String,
    pub resolution: Resolution,
}

impl Normalized {
    fn new(code: &str, resolution: Resolution) -> Self {
        Self {
            code: code.to_string(),
            resolution,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CodeNormalizer {
    rules: HallucinationRules,
    small_map_limit: usize,
}

impl Default for CodeNormalizer {
    fn default() -> Self {
        Self::new(HallucinationRules::default(), 5)
    }
}

impl CodeNormalizer {
    pub fn new(rules: HallucinationRules, small_map_limit: usize) -> Self {
        Self {
            rules,
            small_map_limit,
        }
    }

    pub fn normalize(&self, raw: &str, map: &CodeMap) -> Normalized {
        let cleaned = clean_code(raw);
        let negative = map.negative_code();
        if cleaned.is_empty() {
            return Normalized::new(negative, Resolution::Empty);
        }
        if map.contains(cleaned) {
            return Normalized::new(cleaned, Resolution::Verbatim);
        }
        if let Some(code) = map.code_for_label(cleaned) {
            return Normalized::new(code, Resolution::LabelMatch);
        }
        let number = leading_integer(cleaned);
        if let Some(canonical) = number.map(|value| value.to_string()) {
            if map.contains(&canonical) {
                return Normalized::new(&canonical, Resolution::NumericCanonical);
            }
        }
        if let Some(value) = number {
            if map.is_binary_fallback() && value > 2 {
                return Normalized::new(negative, Resolution::BinaryOutOfRange);
            }
            if map.len() <= self.small_map_limit {
                return Normalized::new(negative, Resolution::OutOfRange);
            }
        }
        if self.rules.is_hallucinated(cleaned, map.has_numeric_codes()) {
            return Normalized::new(negative, Resolution::Hallucinated);
        }
        match leading_lexeme(cleaned) {
            Some(Lexeme::Affirmative) => {
                if let Some(code) = affirmative_code(map) {
                    return Normalized::new(code, Resolution::AffirmativeLexeme);
                }
            }
            Some(Lexeme::Negative) => {
                return Normalized::new(negative, Resolution::NegativeLexeme)
            }
            None => {}
        }
        Normalized::new(negative, Resolution::Fallback)
    }

    /// Open-valued variables: sentinel codes resolve like any code, negations go
    /// to the negative code, anything else is kept as the answer itself.
    pub fn normalize_free_text(&self, raw: &str, map: &CodeMap) -> Normalized {
        let cleaned = clean_code(raw);
        let negative = map.negative_code();
        if cleaned.is_empty() {
            return Normalized::new(negative, Resolution::Empty);
        }
        if map.contains(cleaned) {
            return Normalized::new(cleaned, Resolution::Verbatim);
        }
        if let Some(code) = map.code_for_label(cleaned) {
            return Normalized::new(code, Resolution::LabelMatch);
        }
        if is_negative_label(cleaned) || leading_lexeme(cleaned) == Some(Lexeme::Negative) {
            return Normalized::new(negative, Resolution::NegativeLexeme);
        }
        Normalized::new(cleaned, Resolution::FreeText)
    }
}

fn clean_code(raw: &str) -> &str {
    raw.trim().trim_matches(QUOTE_CHARS).trim()
}

/// `"02"`, `"2.0"`, `"2 - Política"`, `"2: Sí"` all read as 2. A number glued to
/// letters (`"2a"`) does not.
fn leading_integer(text: &str) -> Option<i64> {
    let end = text
        .char_indices()
        .find(|(idx, value)| !(value.is_ascii_digit() || (*idx == 0 && *value == '-') || *value == '.'))
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let (number, rest) = text.split_at(end);
    let number = number.trim_end_matches('.');
    if number.is_empty() || number == "-" {
        return None;
    }
    if rest.chars().next().is_some_and(char::is_alphanumeric) {
        return None;
    }
    if let Ok(value) = number.parse::<i64>() {
        return Some(value);
    }
    let value = number.parse::<f64>().ok()?;
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binary() -> &'static CodeMap {
        CodeMap::binary_fallback()
    }

    fn topics() -> CodeMap {
        CodeMap::from_pairs(&[
            ("1", "Científica"),
            ("2", "Política"),
            ("3", "Deportiva"),
            ("4", "Economía"),
            ("5", "Cultura"),
            ("6", "Sociedad"),
            ("7", "Otros"),
        ])
        .expect("topics")
    }

    fn resolve(raw: &str, map: &CodeMap) -> (String, Resolution) {
        let normalized = CodeNormalizer::default().normalize(raw, map);
        (normalized.code, normalized.resolution)
    }

    #[test]
    fn verbatim_and_numeric_spellings() {
        assert_eq!(resolve("2", binary()), ("2".into(), Resolution::Verbatim));
        assert_eq!(resolve(" \"2\" ", binary()), ("2".into(), Resolution::Verbatim));
        assert_eq!(resolve("02", &topics()), ("2".into(), Resolution::NumericCanonical));
        assert_eq!(resolve("2.0", &topics()), ("2".into(), Resolution::NumericCanonical));
        assert_eq!(
            resolve("2 - Política", &topics()),
            ("2".into(), Resolution::NumericCanonical)
        );
    }

    #[test]
    fn label_lookup_is_case_insensitive() {
        assert_eq!(resolve("deportiva", &topics()), ("3".into(), Resolution::LabelMatch));
        assert_eq!(resolve("SÍ", binary()), ("2".into(), Resolution::LabelMatch));
    }

    #[test]
    fn labels_starting_with_digits_win_over_numeric_reading() {
        let count = CodeMap::from_pairs(&[("1", "Ninguna"), ("2", "Una"), ("3", "2 o más")]).expect("count");
        assert_eq!(resolve("2 o más", &count), ("3".into(), Resolution::LabelMatch));
        assert_eq!(resolve("2 O MÁS", &count), ("3".into(), Resolution::LabelMatch));
        assert_eq!(resolve("2 - Una", &count), ("2".into(), Resolution::NumericCanonical));
    }

    #[test]
    fn out_of_range_integers_go_negative() {
        assert_eq!(resolve("9", binary()), ("1".into(), Resolution::BinaryOutOfRange));
        assert_eq!(resolve("0", binary()), ("1".into(), Resolution::OutOfRange));
        let gender = CodeMap::from_pairs(&[("1", "No hay"), ("2", "Sí, hombre"), ("3", "Sí, mujer")])
            .expect("gender");
        assert_eq!(resolve("7", &gender), ("1".into(), Resolution::OutOfRange));
    }

    #[test]
    fn large_map_integers_fall_through_to_default() {
        assert_eq!(resolve("42", &topics()), ("1".into(), Resolution::Fallback));
    }

    #[test]
    fn prose_and_questions_are_hallucinations() {
        assert_eq!(
            resolve("La noticia trata de ciencia", &topics()),
            ("1".into(), Resolution::Hallucinated)
        );
        assert_eq!(resolve("¿2?", binary()), ("1".into(), Resolution::Hallucinated));
        assert_eq!(resolve("Quizás", binary()), ("1".into(), Resolution::Hallucinated));
    }

    #[test]
    fn leading_words_pick_polarity() {
        assert_eq!(resolve("sí hay", binary()), ("2".into(), Resolution::AffirmativeLexeme));
        assert_eq!(resolve("no", &topics()), ("1".into(), Resolution::NegativeLexeme));
        let quote = CodeMap::from_pairs(&[("0", "No"), ("1", "Directa")]).expect("quote");
        assert_eq!(resolve("tiene", &quote), ("1".into(), Resolution::AffirmativeLexeme));
        assert_eq!(resolve("sin cita", &quote), ("0".into(), Resolution::NegativeLexeme));
        assert_eq!(resolve("", &quote), ("0".into(), Resolution::Empty));
    }

    #[test]
    fn thresholds_are_configurable() {
        let lenient = CodeNormalizer::new(
            HallucinationRules {
                max_len: 40,
                reject_question: false,
                reject_capitalized: false,
            },
            5,
        );
        let normalized = lenient.normalize("Sí, aparece una cita", binary());
        assert_eq!(normalized.code, "2");
        assert_eq!(normalized.resolution, Resolution::AffirmativeLexeme);
    }

    #[test]
    fn free_text_keeps_values_and_maps_sentinels() {
        let normalizer = CodeNormalizer::default();
        let sentinel = CodeMap::from_pairs(&[("1", "No aplica")]).expect("sentinel");
        let keep = normalizer.normalize_free_text("  Ana ", &sentinel);
        assert_eq!((keep.code.as_str(), keep.resolution), ("Ana", Resolution::FreeText));
        let label = normalizer.normalize_free_text("no aplica", &sentinel);
        assert_eq!((label.code.as_str(), label.resolution), ("1", Resolution::LabelMatch));
        let negated = normalizer.normalize_free_text("Ninguno", &sentinel);
        assert_eq!(negated.code, "1");
        assert_eq!(normalizer.normalize_free_text("", &sentinel).code, "1");
    }

    #[test]
    fn leading_integer_parsing() {
        assert_eq!(leading_integer("2: Sí"), Some(2));
        assert_eq!(leading_integer("2."), Some(2));
        assert_eq!(leading_integer("-1"), Some(-1));
        assert_eq!(leading_integer("2a"), None);
        assert_eq!(leading_integer("2.5"), None);
        assert_eq!(leading_integer("abc"), None);
    }
}
