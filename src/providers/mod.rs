use async_trait::async_trait;

use crate::core::errors::AppResult;

pub mod ollama;

/// Text-completion boundary. Implementations return the model's raw answer;
/// nothing about its shape is trusted.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, prompt: &str) -> AppResult<String>;
}
