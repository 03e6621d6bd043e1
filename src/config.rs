use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::normalizer::HallucinationRules;

pub const DEFAULT_MODEL: &str = "gemma3:4b";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_CONCURRENCY: usize = 4;
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
const MAX_CONCURRENCY: usize = 64;

pub(crate) fn env_flag(key: &str) -> bool {
    matches!(
        std::env::var(key)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_concurrency(raw: Option<&str>, default_value: usize) -> usize {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default_value)
        .clamp(1, MAX_CONCURRENCY)
}

fn parse_timeout(raw: Option<&str>, default_value: Duration) -> Duration {
    raw.map(str::trim)
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(default_value)
}

/// Knobs of the per-document engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub hallucination: HallucinationRules,
    /// Downgrade unsupported non-negative answers on small maps.
    pub strict_evidence: bool,
    pub small_map_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hallucination: HallucinationRules::default(),
            strict_evidence: false,
            small_map_limit: 5,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            strict_evidence: env_flag("NEWSCODE_STRICT_EVIDENCE"),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub concurrency: usize,
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            concurrency: parse_concurrency(
                std::env::var("NEWSCODE_CONCURRENCY").ok().as_deref(),
                defaults.concurrency,
            ),
            timeout: parse_timeout(
                std::env::var("NEWSCODE_TIMEOUT_SECS").ok().as_deref(),
                defaults.timeout,
            ),
        }
    }

    /// Command-line values win over the environment.
    pub fn with_overrides(mut self, concurrency: Option<usize>, timeout_secs: Option<u64>) -> Self {
        if let Some(value) = concurrency {
            self.concurrency = value.clamp(1, MAX_CONCURRENCY);
        }
        if let Some(secs) = timeout_secs.filter(|secs| *secs > 0) {
            self.timeout = Duration::from_secs(secs);
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            temperature: 0.0,
        }
    }
}

impl ModelSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            model: env_string("NEWSCODE_MODEL").unwrap_or(defaults.model),
            base_url: env_string("NEWSCODE_OLLAMA_URL").unwrap_or(defaults.base_url),
            temperature: defaults.temperature,
        }
    }

    pub fn with_overrides(mut self, model: Option<String>, base_url: Option<String>) -> Self {
        if let Some(model) = model {
            self.model = model;
        }
        if let Some(base_url) = base_url {
            self.base_url = base_url;
        }
        self
    }
}
