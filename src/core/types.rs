use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Article handed to the engine by the fetching collaborator. Read-only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    #[serde(default, alias = "titular")]
    pub title: String,
    #[serde(default, alias = "texto")]
    pub body: String,
}

impl SourceDocument {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }

    /// Headline and body joined the way evidence scopes see them.
    pub fn full_text(&self) -> String {
        format!("{}\n{}", self.title, self.body)
    }

    /// Stable hex SHA-256 of the article, used as its default id.
    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.full_text().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// One line of batch input: an article with an optional caller-chosen id.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub document: SourceDocument,
}

impl BatchDocument {
    pub fn new(id: Option<String>, document: SourceDocument) -> Self {
        Self { id, document }
    }

    /// Caller id when given, else the article checksum.
    pub fn document_id(&self) -> String {
        match self.id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self.document.checksum(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VariableResult {
    pub code: String,
    pub label: String,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    ExtractionFailed,
    InvalidJson,
    MissingVariable,
    UnexpectedKey,
    InvalidCode,
    ModelUnavailable,
}

impl IssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtractionFailed => "extraction_failed",
            Self::InvalidJson => "invalid_json",
            Self::MissingVariable => "missing_variable",
            Self::UnexpectedKey => "unexpected_key",
            Self::InvalidCode => "invalid_code",
            Self::ModelUnavailable => "model_unavailable",
        }
    }
}

/// Recoverable problem met while assembling one document's result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisIssue {
    pub kind: IssueKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
    pub message: String,
}

impl AnalysisIssue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            variable: None,
            message: message.into(),
        }
    }

    pub fn for_variable(kind: IssueKind, variable: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            variable: Some(variable.to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for AnalysisIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variable {
            Some(variable) => write!(f, "{} [{}]: {}", self.kind.as_str(), variable, self.message),
            None => write!(f, "{}: {}", self.kind.as_str(), self.message),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub section: String,
    pub variables: BTreeMap<String, VariableResult>,
    pub errors: Vec<AnalysisIssue>,
}

impl AnalysisResult {
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            variables: BTreeMap::new(),
            errors: vec![],
        }
    }

    pub fn get(&self, variable: &str) -> Option<&VariableResult> {
        self.variables.get(variable)
    }

    pub fn code_of(&self, variable: &str) -> Option<&str> {
        self.variables.get(variable).map(|value| value.code.as_str())
    }

    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.errors.iter().any(|issue| issue.kind == kind)
    }
}

/// One section's result for one document, as produced by the batch executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    pub document_id: String,
    pub section: String,
    pub result: AnalysisResult,
    pub latency_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun {
    pub id: String,
    pub model: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub document_count: i64,
    pub error_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRunResponse {
    pub run: AnalysisRun,
    pub analyses: Vec<DocumentAnalysis>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub run_id: String,
    pub document_count: usize,
    pub section_count: usize,
    pub error_count: usize,
    pub total_latency_ms: i64,
}
