use std::fmt;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use super::literal::{parse_literal, Literal};
use super::{CodeMap, Codebook, Section};
use crate::core::errors::{AppError, AppResult};

const VARIABLES_KEY: &str = "variables";
const FREE_TEXT_KEY: &str = "free_text";
const HEADLINE_ONLY_KEY: &str = "headline_only";
const DEFAULT_MAP_SUFFIX: &str = "_vars";
const DEPENDENCIES_SECTION: &str = "DEPENDENCIES";

/// A codebook entry that could not be used. Loading continues past it.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigIssue {
    pub section: String,
    pub key: Option<String>,
    pub message: String,
}

impl ConfigIssue {
    fn new(section: &str, key: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            section: section.to_string(),
            key: key.map(ToString::to_string),
            message: message.into(),
        }
    }

    pub fn into_error(self) -> AppError {
        AppError::ConfigMalformed(self.to_string())
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "[{}] {}: {}", self.section, key, self.message),
            None => write!(f, "[{}] {}", self.section, self.message),
        }
    }
}

enum RawValue {
    Text(String),
    Parsed(Literal),
}

struct RawSection {
    name: String,
    entries: Vec<(String, RawValue)>,
}

/// Loads a codebook file. `.json` files use the JSON layout, anything else the INI layout.
pub fn load_codebook(path: &Path) -> AppResult<(Codebook, Vec<ConfigIssue>)> {
    if !path.is_file() {
        return Err(AppError::ConfigNotFound(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let (codebook, issues) = if is_json {
        parse_json_codebook(&text)?
    } else {
        parse_ini_codebook(&text)
    };
    for issue in &issues {
        tracing::warn!(path = %path.display(), "codebook entry skipped: {issue}");
    }
    tracing::info!(
        path = %path.display(),
        sections = codebook.section_names().len(),
        issues = issues.len(),
        "codebook loaded"
    );
    Ok((codebook, issues))
}

pub fn parse_ini_codebook(text: &str) -> (Codebook, Vec<ConfigIssue>) {
    let mut issues = vec![];
    let raw_sections = split_ini(text, &mut issues);
    let (codebook, mut build_issues) = build_codebook(raw_sections);
    issues.append(&mut build_issues);
    (codebook, issues)
}

/// A JSON source that does not parse at all is fatal; bad entries inside it are not.
pub fn parse_json_codebook(text: &str) -> AppResult<(Codebook, Vec<ConfigIssue>)> {
    let root: Value = serde_json::from_str(text)
        .map_err(|err| AppError::ConfigMalformed(format!("codebook is not valid JSON: {err}")))?;
    let object = root.as_object().ok_or_else(|| {
        AppError::ConfigMalformed("codebook root must be an object of sections".to_string())
    })?;

    let mut issues = vec![];
    let mut raw_sections = vec![];
    for (name, body) in object {
        let Some(entries) = body.as_object() else {
            issues.push(ConfigIssue::new(name, None, "section must be an object"));
            continue;
        };
        raw_sections.push(RawSection {
            name: name.clone(),
            entries: entries
                .iter()
                .map(|(key, value)| (key.clone(), RawValue::Parsed(Literal::from(value))))
                .collect(),
        });
    }
    let (codebook, mut build_issues) = build_codebook(raw_sections);
    issues.append(&mut build_issues);
    Ok((codebook, issues))
}

fn split_ini(text: &str, issues: &mut Vec<ConfigIssue>) -> Vec<RawSection> {
    let mut sections: Vec<RawSection> = vec![];
    let mut current: Option<usize> = None;

    for (line_no, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let continues_value = line.starts_with(char::is_whitespace);
        if continues_value {
            if let Some(entry) = current
                .and_then(|idx| sections.get_mut(idx))
                .and_then(|section| section.entries.last_mut())
            {
                if let RawValue::Text(value) = &mut entry.1 {
                    value.push('\n');
                    value.push_str(trimmed);
                    continue;
                }
            }
        }

        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            let name = trimmed[1..trimmed.len() - 1].trim().to_string();
            current = match sections.iter().position(|section| section.name == name) {
                Some(idx) => Some(idx),
                None => {
                    sections.push(RawSection {
                        name,
                        entries: vec![],
                    });
                    Some(sections.len() - 1)
                }
            };
            continue;
        }

        let Some(split_at) = trimmed.find(['=', ':']) else {
            let section = current
                .and_then(|idx| sections.get(idx))
                .map(|section| section.name.as_str())
                .unwrap_or("<none>");
            issues.push(ConfigIssue::new(
                section,
                None,
                format!("line {} is not a key/value pair", line_no + 1),
            ));
            continue;
        };
        let key = trimmed[..split_at].trim().to_string();
        let value = trimmed[split_at + 1..].trim().to_string();

        match current.and_then(|idx| sections.get_mut(idx)) {
            Some(section) => section.entries.push((key, RawValue::Text(value))),
            None => issues.push(ConfigIssue::new(
                "<none>",
                Some(&key),
                format!("line {} appears before any section header", line_no + 1),
            )),
        }
    }
    sections
}

fn looks_like_literal(text: &str) -> bool {
    matches!(text.trim_start().chars().next(), Some('{') | Some('[') | Some('('))
}

fn build_codebook(raw_sections: Vec<RawSection>) -> (Codebook, Vec<ConfigIssue>) {
    let mut issues = vec![];
    let mut sections = vec![];
    let mut dependencies = None;

    for raw in raw_sections {
        if raw.name.eq_ignore_ascii_case(DEPENDENCIES_SECTION) {
            dependencies = Some(build_dependencies(raw, &mut issues));
            continue;
        }
        if let Some(section) = build_section(raw, &mut issues) {
            sections.push(section);
        }
    }

    let mut codebook = Codebook::new(sections);
    if let Some(edges) = dependencies {
        codebook = codebook.with_dependencies(edges);
    }
    (codebook, issues)
}

/// Resolves a raw entry to a literal. Plain-text INI values that were never meant
/// as literals yield `None` without an issue.
fn resolve_value(
    section: &str,
    key: &str,
    value: RawValue,
    issues: &mut Vec<ConfigIssue>,
    required: bool,
) -> Option<Literal> {
    match value {
        RawValue::Parsed(literal) => Some(literal),
        RawValue::Text(text) => match parse_literal(&text) {
            Ok(literal) => Some(literal),
            Err(err) => {
                if required || looks_like_literal(&text) {
                    issues.push(ConfigIssue::new(section, Some(key), err.to_string()));
                }
                None
            }
        },
    }
}

fn build_section(raw: RawSection, issues: &mut Vec<ConfigIssue>) -> Option<Section> {
    let name = raw.name;
    let mut variables: Option<Vec<String>> = None;
    let mut declared_variables_key = false;
    let mut maps: Vec<(String, CodeMap)> = vec![];
    let mut default_map: Option<CodeMap> = None;
    let mut free_text: Vec<String> = vec![];
    let mut headline_only: Vec<String> = vec![];

    for (key, value) in raw.entries {
        let lowered = key.to_lowercase();
        let is_list_key = matches!(
            lowered.as_str(),
            VARIABLES_KEY | FREE_TEXT_KEY | HEADLINE_ONLY_KEY
        );
        if lowered == VARIABLES_KEY {
            declared_variables_key = true;
        }
        let Some(literal) = resolve_value(&name, &key, value, issues, is_list_key) else {
            continue;
        };

        if is_list_key {
            match literal.as_string_list() {
                Some(list) => match lowered.as_str() {
                    VARIABLES_KEY => variables = Some(list),
                    FREE_TEXT_KEY => free_text = list,
                    _ => headline_only = list,
                },
                None => issues.push(ConfigIssue::new(&name, Some(&key), "expected a list of strings")),
            }
            continue;
        }

        if !literal.is_dict() {
            continue;
        }
        let map = literal
            .as_string_map()
            .ok_or_else(|| "code map values must be scalars".to_string())
            .and_then(|pairs| CodeMap::new(pairs).map_err(|err| err.to_string()));
        match map {
            Ok(map) if lowered.ends_with(DEFAULT_MAP_SUFFIX) => {
                if default_map.is_none() {
                    default_map = Some(map);
                }
            }
            Ok(map) => maps.push((lowered, map)),
            Err(message) => issues.push(ConfigIssue::new(&name, Some(&key), message)),
        }
    }

    let Some(variables) = variables else {
        if declared_variables_key {
            issues.push(ConfigIssue::new(
                &name,
                None,
                "section skipped: its variable list could not be read",
            ));
        } else {
            tracing::debug!(section = %name, "section has no variable list; skipped");
        }
        return None;
    };

    let mut section = Section::new(name.clone(), variables);
    for (variable, map) in maps {
        section.insert_code_map(&variable, map);
    }
    if let Some(map) = default_map {
        section = section.with_default_map(map);
    }
    for variable in free_text {
        section = section.with_free_text(&variable);
    }
    for variable in headline_only {
        section = section.with_headline_only(&variable);
    }
    Some(section)
}

fn build_dependencies(raw: RawSection, issues: &mut Vec<ConfigIssue>) -> Vec<(String, Vec<String>)> {
    let mut edges = vec![];
    for (key, value) in raw.entries {
        let Some(literal) = resolve_value(&raw.name, &key, value, issues, true) else {
            continue;
        };
        match literal.as_string_list() {
            Some(children) => edges.push((key.trim().to_lowercase(), children)),
            None => issues.push(ConfigIssue::new(
                &raw.name,
                Some(&key),
                "dependency children must be a list of variable names",
            )),
        }
    }
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codebook::MapSource;

    const SAMPLE: &str = r#"
# Codebook for general content
[CONTENIDO_GENERAL]
variables = ['tema', 'nombre_propio_titular', 'genero_nombre_propio_titular', 'menciona_ia']
free_text = ['nombre_propio_titular']
TEMA = {'1': 'Científica/Investigación', '2': 'Comunicación',
    '3': 'Deportiva'}
NOMBRE_PROPIO_TITULAR = {'1': 'No aplica'}
GENERO_NOMBRE_PROPIO_TITULAR = {'1': 'No hay', '2': 'Sí, hombre', '3': 'Sí, mujer', '4': 'Sí, mujer y hombre'}
MENCIONA_IA = {'1': 'No', '2': 'Sí'
descripcion = Variables de contenido general

[LENGUAJE]
variables: ['lenguaje_sexista', 'masculino_generico']
LENGUAJE_SEXISTA = {'1': 'No', '2': 'Sí', '3': 'Sí; además se observa un salto semántico'}
LENGUAJE_VARS = {'1': 'No', '2': 'Sí'}

[NOTAS]
autor = equipo

[DEPENDENCIES]
nombre_propio_titular = ['genero_nombre_propio_titular']
"#;

    #[test]
    fn ini_sections_variables_and_maps_load() {
        let (codebook, issues) = parse_ini_codebook(SAMPLE);
        assert_eq!(codebook.section_names(), vec!["CONTENIDO_GENERAL", "LENGUAJE"]);

        let general = codebook.section("CONTENIDO_GENERAL").expect("section");
        assert_eq!(general.variables().len(), 4);
        assert_eq!(general.lookup("tema").len(), 3, "continuation line joined");
        assert!(general.is_free_text("nombre_propio_titular"));

        let lenguaje = codebook.section("LENGUAJE").expect("section");
        assert_eq!(lenguaje.lookup_with_source("lenguaje_sexista").1, MapSource::Own);
        assert_eq!(
            lenguaje.lookup_with_source("masculino_generico").1,
            MapSource::SectionDefault
        );

        assert_eq!(issues.len(), 1, "only the broken MENCIONA_IA map: {issues:?}");
        assert_eq!(issues[0].key.as_deref(), Some("MENCIONA_IA"));
    }

    #[test]
    fn malformed_variable_map_falls_back_without_aborting_section() {
        let (codebook, _) = parse_ini_codebook(SAMPLE);
        let (map, source) = codebook
            .section("CONTENIDO_GENERAL")
            .expect("section")
            .lookup_with_source("menciona_ia");
        assert_eq!(source, MapSource::BinaryFallback);
        assert!(map.is_binary_fallback());
    }

    #[test]
    fn dependencies_section_is_captured() {
        let (codebook, _) = parse_ini_codebook(SAMPLE);
        let edges = codebook.declared_dependencies().expect("edges");
        assert_eq!(
            edges,
            &[(
                "nombre_propio_titular".to_string(),
                vec!["genero_nombre_propio_titular".to_string()]
            )]
        );
    }

    #[test]
    fn unreadable_variable_list_skips_section_with_issue() {
        let (codebook, issues) = parse_ini_codebook("[S]\nvariables = ['a', \n");
        assert!(codebook.is_empty());
        assert!(issues.iter().any(|issue| issue.key.as_deref() == Some("variables")));
        assert!(issues.iter().any(|issue| issue.message.contains("section skipped")));
    }

    #[test]
    fn json_layout_loads_same_model() {
        let (codebook, issues) = parse_json_codebook(
            r#"{"FUENTES": {"variables": ["tiene_fuente", "tipo_fuente"],
                "TIPO_FUENTE": {"1": "No hay", "2": "Experta"},
                "BROKEN": {"1": ["nested"]},
                "FUENTES_VARS": {"1": "No", "2": "Sí"}}}"#,
        )
        .expect("json codebook");
        let section = codebook.section("FUENTES").expect("section");
        assert_eq!(section.lookup("tipo_fuente").label("2"), Some("Experta"));
        assert_eq!(
            section.lookup_with_source("tiene_fuente").1,
            MapSource::SectionDefault
        );
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn invalid_json_is_fatal() {
        assert!(matches!(
            parse_json_codebook("{not json"),
            Err(AppError::ConfigMalformed(_))
        ));
    }

    #[test]
    fn missing_file_is_config_not_found() {
        let result = load_codebook(Path::new("/definitely/not/here/config.ini"));
        assert!(matches!(result, Err(AppError::ConfigNotFound(_))));
    }
}
