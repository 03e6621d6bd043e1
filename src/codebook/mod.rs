//! Immutable catalog of sections, variables and their code → label maps.
//!
//! The codebook is parsed once at startup (see [`loader`]) and then shared
//! read-only, usually behind an `Arc`, by every document analysis.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use serde::Serialize;

use crate::core::errors::{AppError, AppResult};

pub mod literal;
pub mod loader;
pub mod polarity;

pub use loader::{load_codebook, parse_ini_codebook, parse_json_codebook, ConfigIssue};

/// Ordered code → label mapping. Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeMap {
    entries: Vec<(String, String)>,
}

impl CodeMap {
    /// Builds a map keeping first-seen key order; a repeated key overwrites the label.
    pub fn new(pairs: Vec<(String, String)>) -> AppResult<Self> {
        let mut entries: Vec<(String, String)> = Vec::with_capacity(pairs.len());
        for (code, label) in pairs {
            let code = code.trim().to_string();
            match entries.iter_mut().find(|(existing, _)| *existing == code) {
                Some(entry) => entry.1 = label,
                None => entries.push((code, label)),
            }
        }
        if entries.is_empty() {
            return Err(AppError::ConfigMalformed("code map has no entries".to_string()));
        }
        Ok(Self { entries })
    }

    pub fn from_pairs(pairs: &[(&str, &str)]) -> AppResult<Self> {
        Self::new(
            pairs
                .iter()
                .map(|(code, label)| (code.to_string(), label.to_string()))
                .collect(),
        )
    }

    /// `{"1": "No", "2": "Sí"}`, used when a variable has no map of its own.
    pub fn binary_fallback() -> &'static CodeMap {
        static FALLBACK: OnceLock<CodeMap> = OnceLock::new();
        FALLBACK.get_or_init(|| CodeMap {
            entries: vec![
                ("1".to_string(), "No".to_string()),
                ("2".to_string(), "Sí".to_string()),
            ],
        })
    }

    pub fn is_binary_fallback(&self) -> bool {
        self == Self::binary_fallback()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(code, label)| (code.as_str(), label.as_str()))
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(code, _)| code.as_str())
    }

    pub fn first_code(&self) -> &str {
        self.entries
            .first()
            .map(|(code, _)| code.as_str())
            .unwrap_or_default()
    }

    pub fn contains(&self, code: &str) -> bool {
        self.entries.iter().any(|(existing, _)| existing == code)
    }

    pub fn label(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == code)
            .map(|(_, label)| label.as_str())
    }

    /// Reverse lookup, case-insensitive on the whole trimmed label.
    pub fn code_for_label(&self, label: &str) -> Option<&str> {
        let wanted = label.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|(_, existing)| existing.trim().to_lowercase() == wanted)
            .map(|(code, _)| code.as_str())
    }

    /// True when every code is a plain non-negative integer.
    pub fn has_numeric_codes(&self) -> bool {
        self.codes()
            .all(|code| !code.is_empty() && code.chars().all(|value| value.is_ascii_digit()))
    }

    pub fn negative_code(&self) -> &str {
        polarity::negative_code(self)
    }
}

/// Where the map returned by [`Codebook::lookup`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MapSource {
    Own,
    SectionDefault,
    BinaryFallback,
}

#[derive(Debug, Clone, Default)]
pub struct Section {
    name: String,
    variables: Vec<String>,
    code_maps: HashMap<String, CodeMap>,
    default_map: Option<CodeMap>,
    free_text: HashSet<String>,
    headline_only: HashSet<String>,
}

impl Section {
    pub fn new(name: impl Into<String>, variables: Vec<String>) -> Self {
        let mut unique = Vec::with_capacity(variables.len());
        for variable in variables {
            let variable = variable.trim().to_string();
            if !variable.is_empty() && !unique.contains(&variable) {
                unique.push(variable);
            }
        }
        Self {
            name: name.into(),
            variables: unique,
            ..Self::default()
        }
    }

    pub fn with_code_map(mut self, variable: &str, map: CodeMap) -> Self {
        self.insert_code_map(variable, map);
        self
    }

    pub fn with_default_map(mut self, map: CodeMap) -> Self {
        self.default_map = Some(map);
        self
    }

    pub fn with_free_text(mut self, variable: &str) -> Self {
        self.free_text.insert(variable.to_lowercase());
        self
    }

    pub fn with_headline_only(mut self, variable: &str) -> Self {
        self.headline_only.insert(variable.to_lowercase());
        self
    }

    pub(crate) fn insert_code_map(&mut self, variable: &str, map: CodeMap) {
        self.code_maps.insert(variable.to_lowercase(), map);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn is_free_text(&self, variable: &str) -> bool {
        self.free_text.contains(&variable.to_lowercase())
    }

    pub fn is_headline_only(&self, variable: &str) -> bool {
        self.headline_only.contains(&variable.to_lowercase())
    }

    /// Own map, else section default, else the universal binary map.
    pub fn lookup(&self, variable: &str) -> &CodeMap {
        self.lookup_with_source(variable).0
    }

    pub fn lookup_with_source(&self, variable: &str) -> (&CodeMap, MapSource) {
        if let Some(map) = self.code_maps.get(&variable.to_lowercase()) {
            return (map, MapSource::Own);
        }
        if let Some(map) = self.default_map.as_ref() {
            return (map, MapSource::SectionDefault);
        }
        (CodeMap::binary_fallback(), MapSource::BinaryFallback)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Codebook {
    sections: BTreeMap<String, Section>,
    dependencies: Option<Vec<(String, Vec<String>)>>,
}

impl Codebook {
    pub fn new(sections: impl IntoIterator<Item = Section>) -> Self {
        Self {
            sections: sections
                .into_iter()
                .map(|section| (section.name.clone(), section))
                .collect(),
            dependencies: None,
        }
    }

    pub fn with_dependencies(mut self, edges: Vec<(String, Vec<String>)>) -> Self {
        self.dependencies = Some(edges);
        self
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.get(name)
    }

    pub fn require_section(&self, name: &str) -> AppResult<&Section> {
        self.section(name)
            .ok_or_else(|| AppError::UnknownSection(name.to_string()))
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    pub fn section_names(&self) -> Vec<String> {
        self.sections.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Never fails: an unknown section resolves to the universal binary map.
    pub fn lookup(&self, section: &str, variable: &str) -> &CodeMap {
        match self.sections.get(section) {
            Some(found) => found.lookup(variable),
            None => CodeMap::binary_fallback(),
        }
    }

    /// Parent → children edges declared in the codebook source, if any.
    pub fn declared_dependencies(&self) -> Option<&[(String, Vec<String>)]> {
        self.dependencies.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gender() -> CodeMap {
        CodeMap::from_pairs(&[("1", "No hay"), ("2", "Sí, hombre"), ("3", "Sí, mujer")])
            .expect("gender map")
    }

    #[test]
    fn lookup_resolves_own_then_default_then_fallback() {
        let lenguaje = CodeMap::from_pairs(&[("1", "No"), ("2", "Sí"), ("3", "Sí; salto")])
            .expect("default map");
        let with_default = Section::new("LENGUAJE", vec!["sexismo".into(), "genero".into()])
            .with_code_map("GENERO", gender())
            .with_default_map(lenguaje.clone());
        assert_eq!(with_default.lookup_with_source("genero").1, MapSource::Own);
        assert_eq!(with_default.lookup("sexismo"), &lenguaje);

        let bare = Section::new("FUENTES", vec!["tiene_fuente".into()]);
        let (map, source) = bare.lookup_with_source("tiene_fuente");
        assert_eq!(source, MapSource::BinaryFallback);
        assert!(map.is_binary_fallback());
    }

    #[test]
    fn unknown_section_lookup_never_fails() {
        let codebook = Codebook::new(vec![]);
        assert!(codebook.lookup("NOPE", "tema").is_binary_fallback());
        assert!(matches!(
            codebook.require_section("NOPE"),
            Err(AppError::UnknownSection(_))
        ));
    }

    #[test]
    fn code_map_rejects_empty_and_merges_duplicates() {
        assert!(CodeMap::new(vec![]).is_err());
        let map = CodeMap::from_pairs(&[("1", "No"), ("2", "Sí"), ("1", "Nunca")]).expect("map");
        assert_eq!(map.len(), 2);
        assert_eq!(map.label("1"), Some("Nunca"));
        assert_eq!(map.first_code(), "1");
    }

    #[test]
    fn reverse_label_lookup_is_case_insensitive() {
        let map = gender();
        assert_eq!(map.code_for_label("sí, MUJER"), Some("3"));
        assert_eq!(map.code_for_label("mujer"), None);
        assert_eq!(map.code_for_label("  "), None);
    }

    #[test]
    fn section_deduplicates_declared_variables() {
        let section = Section::new("S", vec!["tema".into(), " tema ".into(), "".into()]);
        assert_eq!(section.variables(), &["tema".to_string()]);
    }
}
