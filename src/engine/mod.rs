//! Validation and coherence of untrusted model answers.
//!
//! Flow per document and section: [`extractor`] → per variable [`normalizer`] and
//! [`evidence`] → [`dependencies`], composed by [`assembler::ResultAssembler`].

pub mod assembler;
pub mod audit;
pub mod dependencies;
pub mod evidence;
pub mod extractor;
pub mod normalizer;
pub mod prompts;
pub mod scope;

pub use assembler::{RawAnswer, ResultAssembler};
pub use dependencies::DependencyMap;
pub use extractor::extract_json_object;
pub use normalizer::{CodeNormalizer, HallucinationRules, Resolution};
