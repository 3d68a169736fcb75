use crate::config::LlmConfig;
use crate::llm::{LlmError, TextModel};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize, Debug)]
struct OllamaRequest {
    model: String,
    prompt: String,
    options: OllamaOptions,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

/// Ollama takes a single prompt, so message parts become paragraphs.
fn join_parts(parts: &[String]) -> String {
    parts.join("\n\n")
}

pub(crate) fn interpret_response(status: StatusCode, body: &str) -> Result<String, LlmError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::QuotaExhausted(body.to_string()));
    }
    if !status.is_success() {
        return Err(LlmError::ResponseError(format!(
            "Ollama API responded with status code: {} - Response body: {}",
            status, body
        )));
    }

    serde_json::from_str::<OllamaResponse>(body)
        .map(|r| r.response)
        .map_err(|e| {
            LlmError::ResponseError(format!(
                "Failed to parse Ollama response: {} - Response was: {}",
                e, body
            ))
        })
}

#[async_trait]
impl TextModel for OllamaProvider {
    async fn generate(&self, parts: &[String]) -> Result<String, LlmError> {
        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: join_parts(parts),
            options: OllamaOptions {
                temperature: self.temperature,
            },
            stream: false,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", body);
        interpret_response(status, &body).inspect_err(|e| error!("Ollama call failed: {}", e))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
