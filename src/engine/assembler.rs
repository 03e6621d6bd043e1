use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::dependencies::DependencyMap;
use super::evidence::{match_evidence, snippets_from_value};
use super::extractor::{extract_json_object, unwrap_envelope};
use super::normalizer::{CodeNormalizer, Normalized, Resolution};
use super::scope::scope_for;
use crate::codebook::polarity::is_negative_label;
use crate::codebook::{CodeMap, Codebook, Section};
use crate::config::EngineConfig;
use crate::core::errors::AppResult;
use crate::core::types::{AnalysisIssue, AnalysisResult, IssueKind, SourceDocument, VariableResult};

const CODE_FIELDS: &[&str] = &["codigo", "código", "code", "valor", "value"];
const EVIDENCE_FIELDS: &[&str] = &["evidencia", "evidence", "evidencias"];

/// Code text and claimed snippets of one variable as the model wrote them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAnswer {
    pub code: String,
    pub evidence: Vec<String>,
}

impl RawAnswer {
    /// `{"codigo": .., "evidencia": [..]}` or a bare scalar code.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(fields) => Self {
                code: first_field(fields, CODE_FIELDS)
                    .map(scalar_text)
                    .unwrap_or_default(),
                evidence: first_field(fields, EVIDENCE_FIELDS)
                    .map(snippets_from_value)
                    .unwrap_or_default(),
            },
            other => Self {
                code: scalar_text(other),
                evidence: vec![],
            },
        }
    }
}

fn first_field<'a>(fields: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| {
        fields.get(*name).or_else(|| {
            fields
                .iter()
                .find(|(key, _)| key.trim().eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

#[derive(Clone)]
pub struct ResultAssembler {
    codebook: Arc<Codebook>,
    dependencies: Arc<DependencyMap>,
    normalizer: CodeNormalizer,
    config: EngineConfig,
}

impl ResultAssembler {
    pub fn new(codebook: Arc<Codebook>, dependencies: Arc<DependencyMap>, config: EngineConfig) -> Self {
        Self {
            normalizer: CodeNormalizer::new(config.hallucination.clone(), config.small_map_limit),
            codebook,
            dependencies,
            config,
        }
    }

    pub fn codebook(&self) -> &Codebook {
        &self.codebook
    }

    pub fn dependencies(&self) -> &DependencyMap {
        &self.dependencies
    }

    /// Fails only for a section the codebook does not define.
    pub fn analyze(
        &self,
        section: &str,
        raw: Option<&str>,
        document: &SourceDocument,
    ) -> AppResult<AnalysisResult> {
        let section = self.codebook.require_section(section)?;
        Ok(self.assemble(section, raw, document))
    }

    /// `raw == None` means the model produced nothing; every variable then takes
    /// its negative default.
    pub fn assemble(&self, section: &Section, raw: Option<&str>, document: &SourceDocument) -> AnalysisResult {
        let mut result = AnalysisResult::new(section.name());
        let answer = self.read_answer(section, raw, &mut result);

        let mut consumed: HashSet<String> = HashSet::new();
        for variable in section.variables() {
            let found = answer.as_ref().and_then(|object| find_key(object, variable));
            let value = match found {
                Some((key, value)) => {
                    consumed.insert(key.to_string());
                    self.resolve_variable(section, variable, &RawAnswer::from_value(value), document, &mut result)
                }
                None => {
                    if answer.is_some() {
                        result.errors.push(AnalysisIssue::for_variable(
                            IssueKind::MissingVariable,
                            variable,
                            "variable absent from model answer; negative code assumed",
                        ));
                    }
                    negative_result(section.lookup(variable))
                }
            };
            result.variables.insert(variable.clone(), value);
        }

        if let Some(object) = answer.as_ref() {
            for key in object.keys().filter(|key| !consumed.contains(*key)) {
                result.errors.push(AnalysisIssue::for_variable(
                    IssueKind::UnexpectedKey,
                    key,
                    "key is not a variable of this section",
                ));
            }
        }

        let forced = self.dependencies.resolve(section, &mut result);
        tracing::debug!(
            section = %section.name(),
            variables = result.variables.len(),
            issues = result.errors.len(),
            forced,
            "section assembled"
        );
        result
    }

    /// Defaults for a model call that failed, keeping the failure reason.
    pub fn assemble_unavailable(&self, section: &Section, document: &SourceDocument, reason: &str) -> AnalysisResult {
        let mut result = self.assemble(section, None, document);
        if let Some(issue) = result
            .errors
            .iter_mut()
            .find(|issue| issue.kind == IssueKind::ModelUnavailable)
        {
            issue.message = format!("{reason}; all variables defaulted");
        }
        result
    }

    fn read_answer(
        &self,
        section: &Section,
        raw: Option<&str>,
        result: &mut AnalysisResult,
    ) -> Option<Map<String, Value>> {
        let Some(text) = raw else {
            result.errors.push(AnalysisIssue::new(
                IssueKind::ModelUnavailable,
                "no model answer; all variables defaulted",
            ));
            return None;
        };
        match extract_json_object(text) {
            Some(object) => Some(unwrap_envelope(object, |key| find_variable(section, key).is_some())),
            None if text.contains('{') => {
                result.errors.push(AnalysisIssue::new(
                    IssueKind::InvalidJson,
                    "model answer contains no parseable JSON object; all variables defaulted",
                ));
                None
            }
            None => {
                result.errors.push(AnalysisIssue::new(
                    IssueKind::ExtractionFailed,
                    "model answer contains no JSON object; all variables defaulted",
                ));
                None
            }
        }
    }

    fn resolve_variable(
        &self,
        section: &Section,
        variable: &str,
        raw: &RawAnswer,
        document: &SourceDocument,
        result: &mut AnalysisResult,
    ) -> VariableResult {
        let (map, source) = section.lookup_with_source(variable);
        let free_text = section.is_free_text(variable);
        let Normalized { code, resolution } = if free_text {
            self.normalizer.normalize_free_text(&raw.code, map)
        } else {
            self.normalizer.normalize(&raw.code, map)
        };
        if !resolution.is_accepted() {
            result.errors.push(AnalysisIssue::for_variable(
                IssueKind::InvalidCode,
                variable,
                format!("code '{}' resolved to '{}' ({})", raw.code.trim(), code, resolution.as_str()),
            ));
        }

        let label = if resolution == Resolution::FreeText {
            code.clone()
        } else {
            map.label(&code).unwrap_or_default().to_string()
        };
        tracing::debug!(
            %variable,
            raw = %raw.code,
            %code,
            resolution = resolution.as_str(),
            map = ?source,
            "variable resolved"
        );

        if is_negative_label(&label) {
            return VariableResult {
                code,
                label,
                evidence: vec![],
            };
        }

        let scope = scope_for(section, variable).text(document);
        let echo = (resolution != Resolution::FreeText).then_some(label.as_str());
        let evidence = match_evidence(&scope, &raw.evidence, echo);

        if self.config.strict_evidence
            && !free_text
            && evidence.is_empty()
            && map.len() <= self.config.small_map_limit
        {
            result.errors.push(AnalysisIssue::for_variable(
                IssueKind::InvalidCode,
                variable,
                format!("code '{code}' has no grounded evidence; negative code assumed"),
            ));
            return negative_result(map);
        }

        VariableResult {
            code,
            label,
            evidence,
        }
    }
}

fn negative_result(map: &CodeMap) -> VariableResult {
    let code = map.negative_code();
    VariableResult {
        code: code.to_string(),
        label: map.label(code).unwrap_or_default().to_string(),
        evidence: vec![],
    }
}

fn find_variable<'a>(section: &'a Section, key: &str) -> Option<&'a String> {
    let wanted = key.trim();
    section
        .variables()
        .iter()
        .find(|variable| variable.as_str() == wanted)
        .or_else(|| {
            section
                .variables()
                .iter()
                .find(|variable| variable.eq_ignore_ascii_case(wanted))
        })
}

/// Exact key first, then a trimmed case-insensitive match.
fn find_key<'a>(object: &'a Map<String, Value>, variable: &str) -> Option<(&'a str, &'a Value)> {
    if let Some((key, value)) = object.get_key_value(variable) {
        return Some((key.as_str(), value));
    }
    object
        .iter()
        .find(|(key, _)| key.trim().eq_ignore_ascii_case(variable))
        .map(|(key, value)| (key.as_str(), value))
}
