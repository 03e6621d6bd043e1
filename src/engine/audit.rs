use serde::Serialize;

use super::dependencies::DependencyMap;
use super::evidence::{fuzzy_key, locate};
use super::scope::scope_for;
use crate::codebook::polarity::is_negative_label;
use crate::codebook::Section;
use crate::core::types::{AnalysisResult, SourceDocument};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub variable: String,
    pub rule: &'static str,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub variables_checked: usize,
    pub evidence_checked: usize,
    pub violations: Vec<Violation>,
}

impl AuditReport {
    pub fn is_coherent(&self) -> bool {
        self.violations.is_empty()
    }

    fn flag(&mut self, variable: &str, rule: &'static str, detail: String) {
        self.violations.push(Violation {
            variable: variable.to_string(),
            rule,
            detail,
        });
    }
}

pub fn audit_result(
    section: &Section,
    dependencies: &DependencyMap,
    document: &SourceDocument,
    result: &AnalysisResult,
) -> AuditReport {
    let mut report = AuditReport::default();

    for variable in section.variables() {
        let Some(value) = result.get(variable) else {
            report.flag(variable, "present", "declared variable missing from result".to_string());
            continue;
        };
        report.variables_checked += 1;

        let map = section.lookup(variable);
        match map.label(&value.code) {
            Some(label) if label != value.label => report.flag(
                variable,
                "label",
                format!("label '{}' does not match code '{}' ('{label}')", value.label, value.code),
            ),
            Some(_) => {}
            None if section.is_free_text(variable) => {
                if value.label != value.code {
                    report.flag(variable, "label", "free-text label differs from its value".to_string());
                }
            }
            None => report.flag(
                variable,
                "membership",
                format!("code '{}' is not in the codebook", value.code),
            ),
        }

        if is_negative_label(&value.label) && !value.evidence.is_empty() {
            report.flag(variable, "negative_evidence", "negative answer carries evidence".to_string());
        }

        let scope = scope_for(section, variable).text(document);
        let scope_key = fuzzy_key(&scope);
        for snippet in &value.evidence {
            report.evidence_checked += 1;
            let grounded = locate(&scope, snippet).is_some() || {
                let key = fuzzy_key(snippet);
                !key.is_empty() && scope_key.contains(&key)
            };
            if !grounded {
                report.flag(variable, "grounding", format!("'{snippet}' not found in scope"));
            }
        }
    }

    for (parent, children) in dependencies.edges() {
        let parent_negative = result
            .get(parent)
            .map(|value| is_negative_label(&value.label))
            .unwrap_or(false);
        if !parent_negative {
            continue;
        }
        for child in children {
            let Some(value) = result.get(child) else {
                continue;
            };
            let negative = section.lookup(child).negative_code();
            if value.code != negative {
                report.flag(
                    child,
                    "dependency",
                    format!("parent '{parent}' is negative but code is '{}'", value.code),
                );
            }
        }
    }

    report
}
