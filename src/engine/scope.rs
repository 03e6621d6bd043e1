use std::borrow::Cow;

use crate::codebook::Section;
use crate::core::types::SourceDocument;

const HEADLINE_HINTS: &[&str] = &["titular", "headline"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvidenceScope {
    Headline,
    FullText,
}

impl EvidenceScope {
    pub fn text<'a>(&self, document: &'a SourceDocument) -> Cow<'a, str> {
        match self {
            Self::Headline => Cow::Borrowed(document.title.as_str()),
            Self::FullText => Cow::Owned(document.full_text()),
        }
    }
}

pub fn is_headline_variable(variable: &str) -> bool {
    let normalized = variable.to_ascii_lowercase();
    HEADLINE_HINTS.iter().any(|hint| normalized.contains(hint))
}

pub fn scope_for(section: &Section, variable: &str) -> EvidenceScope {
    if section.is_headline_only(variable) || is_headline_variable(variable) {
        EvidenceScope::Headline
    } else {
        EvidenceScope::FullText
    }
}
