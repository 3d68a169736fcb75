use std::sync::Arc;
use tracing::{debug, info};

use crate::llm::extract::strip_code_fences;
use crate::llm::retry::{ModelFailure, RetryPolicy};
use crate::llm::TextModel;
use crate::schema::grounding::build_grounding_text;

/// Turns a natural-language utterance into a single SQL statement.
pub struct Translator {
    model: Arc<dyn TextModel>,
    policy: RetryPolicy,
    grounding: String,
}

impl Translator {
    pub fn new(model: Arc<dyn TextModel>, policy: RetryPolicy) -> Self {
        Self::with_grounding(model, policy, build_grounding_text())
    }

    pub fn with_grounding(model: Arc<dyn TextModel>, policy: RetryPolicy, grounding: String) -> Self {
        Self {
            model,
            policy,
            grounding,
        }
    }

    pub fn grounding(&self) -> &str {
        &self.grounding
    }

    /// Callers reject blank utterances before getting here.
    ///
    /// An empty string after fence stripping is returned as-is; it is the
    /// caller's job to treat it as unusable.
    pub async fn translate(&self, utterance: &str) -> Result<String, ModelFailure> {
        info!("Translating utterance with {}", self.model.name());
        debug!("Utterance: {}", utterance);

        let parts = vec![self.grounding.clone(), utterance.to_string()];
        let reply = self
            .policy
            .run("SQL generation", || self.model.generate(&parts))
            .await?;

        debug!("Raw model reply: {}", reply);
        let sql = strip_code_fences(&reply);
        info!("Generated SQL: {}", sql);
        Ok(sql)
    }
}
