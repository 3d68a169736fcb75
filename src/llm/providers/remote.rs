use crate::config::LlmConfig;
use crate::llm::{LlmError, TextModel};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Any OpenAI-compatible chat completions endpoint.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::ConfigError("API URL is required for remote LLM provider".to_string())
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError("API key is required for remote LLM provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

pub(crate) fn interpret_response(status: StatusCode, body: &str) -> Result<String, LlmError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(LlmError::QuotaExhausted(body.to_string()));
    }
    if !status.is_success() {
        return Err(LlmError::ResponseError(format!(
            "API responded with status code: {} - {}",
            status, body
        )));
    }

    let prompt_response: PromptResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::ResponseError(e.to_string()))?;

    let choice = prompt_response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))?;

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(LlmError::Blocked("content_filter".to_string()));
    }

    Ok(choice.message.content.unwrap_or_default())
}

#[async_trait]
impl TextModel for RemoteLlmProvider {
    async fn generate(&self, parts: &[String]) -> Result<String, LlmError> {
        let request = PromptRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: parts
                    .iter()
                    .map(|text| ContentPart {
                        kind: "text",
                        text: text.clone(),
                    })
                    .collect(),
            }],
            temperature: self.temperature,
            max_tokens: 2000,
        };

        info!("Sending request to remote LLM with model: {}", self.model);

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from remote LLM ({}): {}", status, body);
        interpret_response(status, &body).inspect_err(|e| error!("Remote LLM call failed: {}", e))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
