use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;

use super::ModelClient;
use crate::config::ModelSettings;
use crate::core::errors::{AppError, AppResult};

#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    model: String,
    endpoint: String,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

fn generate_endpoint(base_url: &str) -> String {
    format!("{}/api/generate", base_url.trim_end_matches('/'))
}

impl OllamaClient {
    /// `request_timeout` bounds the HTTP exchange; the batch executor applies its own.
    pub fn new(settings: &ModelSettings, request_timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| AppError::Network(err.to_string()))?;
        Ok(Self {
            http,
            model: settings.model.clone(),
            endpoint: generate_endpoint(&settings.base_url),
            temperature: settings.temperature,
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
            options: GenerateOptions {
                temperature: self.temperature,
            },
        }
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> AppResult<String> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::ProviderTimeout
                } else {
                    AppError::Network(err.to_string())
                }
            })?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(AppError::ProviderAuth),
            StatusCode::TOO_MANY_REQUESTS => return Err(AppError::ProviderRateLimited),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(AppError::ProviderInvalidResponse(format!(
                    "status {status} body {body}"
                )));
            }
            _ => {}
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| AppError::ProviderInvalidResponse(err.to_string()))?;
        response_text(&body)
    }
}

fn response_text(body: &Value) -> AppResult<String> {
    if let Some(error) = body.get("error").and_then(Value::as_str) {
        return Err(AppError::ProviderInvalidResponse(error.to_string()));
    }
    body.get("response")
        .and_then(Value::as_str)
        .map(ToString::to_string)
        .ok_or_else(|| AppError::ProviderInvalidResponse("missing response field".to_string()))
}
