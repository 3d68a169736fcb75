pub mod analyst;
pub mod extract;
pub mod prompts;
pub mod providers;
pub mod retry;
pub mod translator;

use crate::config::LlmConfig;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    /// The provider refused the prompt or the answer on safety grounds.
    #[error("LLM request blocked: {0}")]
    Blocked(String),
    #[error("LLM quota exhausted: {0}")]
    QuotaExhausted(String),
    #[error("LLM connection error: {0}")]
    ConnectionError(String),
    #[error("LLM response error: {0}")]
    ResponseError(String),
    #[error("LLM configuration error: {0}")]
    ConfigError(String),
}

impl LlmError {
    /// Only rate limiting is worth waiting out.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::QuotaExhausted(_))
    }
}

/// A generative model reachable over the network.
///
/// `parts` are sent as sequential parts of a single user turn: for SQL
/// translation that is the grounding text followed by the utterance, for
/// analysis a single rendered prompt.
#[async_trait]
pub trait TextModel: Send + Sync {
    async fn generate(&self, parts: &[String]) -> Result<String, LlmError>;

    fn name(&self) -> &str;
}

pub struct LlmManager {
    model: Arc<dyn TextModel>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let model: Arc<dyn TextModel> = match config.backend.as_str() {
            "gemini" => Arc::new(providers::gemini::GeminiProvider::new(config)?),
            "remote" => Arc::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Arc::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::ConfigError(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )))
            }
        };

        Ok(Self { model })
    }

    pub fn model(&self) -> Arc<dyn TextModel> {
        Arc::clone(&self.model)
    }
}
