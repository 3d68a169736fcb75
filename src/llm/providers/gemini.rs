use crate::config::LlmConfig;
use crate::llm::{LlmError, TextModel};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Finish reasons that mean the answer was withheld on policy grounds.
const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "PROHIBITED_CONTENT", "BLOCKLIST", "SPII"];

pub struct GeminiProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize, Debug)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize, Debug)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl GeminiProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError(
                "API key is required for the Gemini provider (llm.api_key or GOOGLE_API_KEY)"
                    .to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url: config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    fn endpoint(&self) -> String {
        let model = self.model.strip_prefix("models/").unwrap_or(&self.model);
        format!(
            "{}/models/{}:generateContent",
            self.api_url.trim_end_matches('/'),
            model
        )
    }
}

/// Maps a `generateContent` HTTP reply onto text or an `LlmError`.
pub(crate) fn interpret_response(status: StatusCode, body: &str) -> Result<String, LlmError> {
    if !status.is_success() {
        let (detail, api_status) = match serde_json::from_str::<ErrorEnvelope>(body) {
            Ok(envelope) => (envelope.error.message, envelope.error.status),
            Err(_) => (body.to_string(), String::new()),
        };

        if status == StatusCode::TOO_MANY_REQUESTS || api_status == "RESOURCE_EXHAUSTED" {
            return Err(LlmError::QuotaExhausted(detail));
        }
        return Err(LlmError::ResponseError(format!(
            "Gemini API responded with status code: {} - {}",
            status, detail
        )));
    }

    let response: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::ResponseError(format!("Failed to parse Gemini response: {}", e)))?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(LlmError::Blocked(reason));
    }

    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ResponseError("No candidates in response".to_string()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        if BLOCKING_FINISH_REASONS.contains(&reason) {
            return Err(LlmError::Blocked(reason.to_string()));
        }
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    Ok(text)
}

#[async_trait]
impl TextModel for GeminiProvider {
    async fn generate(&self, parts: &[String]) -> Result<String, LlmError> {
        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts: parts.iter().map(|p| Part { text: p.as_str() }).collect(),
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        };

        info!("Sending request to Gemini with model: {}", self.model);
        debug!("API URL: {}", self.endpoint());

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| LlmError::ResponseError(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Gemini ({}): {}", status, body);
        interpret_response(status, &body).inspect_err(|e| error!("Gemini call failed: {}", e))
    }

    fn name(&self) -> &str {
        &self.model
    }
}
