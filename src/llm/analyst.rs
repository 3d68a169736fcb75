use minijinja::value::Value;
use minijinja::Environment;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::executor::Record;
use crate::llm::prompts::{INVENTORY_INSIGHTS_TEMPLATE, PATIENT_SUMMARY_TEMPLATE, REPORT_TEMPLATE};
use crate::llm::retry::{ModelFailure, RetryPolicy};
use crate::llm::TextModel;

/// Decides which slots a template is rendered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    /// Open-ended report: `original_request` and `raw_data`.
    Report,
    /// `patient_data`
    PatientSummary,
    /// `inventory_data`
    InventoryInsights,
}

impl TemplateKind {
    pub fn default_template(&self) -> &'static str {
        match self {
            TemplateKind::Report => REPORT_TEMPLATE,
            TemplateKind::PatientSummary => PATIENT_SUMMARY_TEMPLATE,
            TemplateKind::InventoryInsights => INVENTORY_INSIGHTS_TEMPLATE,
        }
    }

    fn context(&self, data: String, original_request: &str) -> HashMap<&'static str, Value> {
        let mut context = HashMap::new();
        match self {
            TemplateKind::Report => {
                context.insert("original_request", Value::from(original_request));
                context.insert("raw_data", Value::from(data));
            }
            TemplateKind::PatientSummary => {
                context.insert("patient_data", Value::from(data));
            }
            TemplateKind::InventoryInsights => {
                context.insert("inventory_data", Value::from(data));
            }
        }
        context
    }
}

/// One `key: value` line per record, comma-joined, records newline-joined.
pub fn format_records(data: &[Record]) -> String {
    data.iter()
        .map(|record| {
            record
                .fields()
                .map(|(key, value)| format!("{}: {}", key, value))
                .collect::<Vec<_>>()
                .join(", ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_prompt(
    template: &str,
    kind: TemplateKind,
    data: &[Record],
    original_request: &str,
) -> Result<String, minijinja::Error> {
    let env = Environment::new();
    env.render_str(template, kind.context(format_records(data), original_request))
}

/// Turns executed results into prose with a second model call.
pub struct Analyst {
    model: Arc<dyn TextModel>,
    policy: RetryPolicy,
}

impl Analyst {
    pub fn new(model: Arc<dyn TextModel>, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    pub async fn analyze(
        &self,
        data: &[Record],
        template: &str,
        kind: TemplateKind,
        original_request: &str,
    ) -> Result<String, ModelFailure> {
        let prompt = render_prompt(template, kind, data, original_request).map_err(|e| {
            error!("Failed to render {:?} template: {}", kind, e);
            ModelFailure::ApiError(format!("Template error: {}", e))
        })?;

        info!("Requesting {:?} analysis over {} records", kind, data.len());
        debug!("Analysis prompt: {}", prompt);

        let parts = vec![prompt];
        let reply = self
            .policy
            .run("Analysis", || self.model.generate(&parts))
            .await?;

        Ok(reply.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::executor::Scalar;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::LlmError;
    use std::time::Duration;

    fn patient_rows() -> Vec<Record> {
        vec![
            Record::new(vec![
                ("PATIENT_NAME".into(), Scalar::Text("Alice Smith".into())),
                ("DIAGNOSIS".into(), Scalar::Text("Asthma".into())),
                ("DRUG_NAME".into(), Scalar::Text("Ventolin".into())),
            ]),
            Record::new(vec![
                ("PATIENT_NAME".into(), Scalar::Text("Alice Smith".into())),
                ("DIAGNOSIS".into(), Scalar::Text("Checkup".into())),
                ("DRUG_NAME".into(), Scalar::Null),
            ]),
        ]
    }

    #[test]
    fn records_are_flattened_in_column_order() {
        assert_eq!(
            format_records(&patient_rows()),
            "PATIENT_NAME: Alice Smith, DIAGNOSIS: Asthma, DRUG_NAME: Ventolin\n\
             PATIENT_NAME: Alice Smith, DIAGNOSIS: Checkup, DRUG_NAME: NULL"
        );
        assert_eq!(format_records(&[]), "");
    }

    #[test]
    fn report_kind_fills_request_and_raw_data() {
        let prompt = render_prompt(
            REPORT_TEMPLATE,
            TemplateKind::Report,
            &patient_rows()[..1],
            "Which patients have asthma?",
        )
        .unwrap();
        assert!(prompt.contains("User's Original Request: \"Which patients have asthma?\""));
        assert!(prompt.contains("PATIENT_NAME: Alice Smith, DIAGNOSIS: Asthma"));
    }

    #[test]
    fn domain_kinds_fill_their_own_slot() {
        let patient =
            render_prompt("P[{{ patient_data }}]", TemplateKind::PatientSummary, &patient_rows()[..1], "")
                .unwrap();
        assert!(patient.starts_with("P[PATIENT_NAME: Alice Smith"));

        let inventory = render_prompt(
            INVENTORY_INSIGHTS_TEMPLATE,
            TemplateKind::InventoryInsights,
            &patient_rows()[..1],
            "ignored",
        )
        .unwrap();
        assert!(inventory.contains("DRUG_NAME: Ventolin"));
        assert!(!inventory.contains("ignored"));
    }

    #[tokio::test]
    async fn returns_trimmed_prose_and_leaves_input_alone() {
        let model = ScriptedModel::replying("\n  Alice was treated for asthma.  \n");
        let analyst = Analyst::new(model.clone(), RetryPolicy::default());
        let data = patient_rows();
        let before = data.clone();

        let prose = analyst
            .analyze(&data, PATIENT_SUMMARY_TEMPLATE, TemplateKind::PatientSummary, "")
            .await
            .unwrap();

        assert_eq!(prose, "Alice was treated for asthma.");
        assert_eq!(data, before);
        let prompts = model.prompts();
        assert_eq!(prompts[0].len(), 1);
        assert!(prompts[0][0].contains("Patient Data:\nPATIENT_NAME: Alice Smith"));
    }

    #[tokio::test]
    async fn broken_template_is_an_api_error_without_a_model_call() {
        let model = ScriptedModel::replying("unused");
        let analyst = Analyst::new(model.clone(), RetryPolicy::default());

        let result = analyst
            .analyze(&patient_rows(), "{{ raw_data ", TemplateKind::Report, "x")
            .await;

        assert_eq!(result.unwrap_err().reason(), "api_error");
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shares_the_translation_failure_taxonomy() {
        let model = ScriptedModel::new(vec![Err(LlmError::Blocked("SAFETY".into()))]);
        let analyst = Analyst::new(model.clone(), RetryPolicy::new(3, Duration::from_secs(5)));
        let result = analyst
            .analyze(&patient_rows(), REPORT_TEMPLATE, TemplateKind::Report, "x")
            .await;
        assert_eq!(result, Err(ModelFailure::Blocked));
        assert_eq!(model.calls(), 1);

        let model = ScriptedModel::new(vec![
            Err(LlmError::QuotaExhausted("429".into())),
            Err(LlmError::QuotaExhausted("429".into())),
            Err(LlmError::QuotaExhausted("429".into())),
        ]);
        let analyst = Analyst::new(model.clone(), RetryPolicy::new(3, Duration::from_secs(5)));
        let result = analyst
            .analyze(&patient_rows(), REPORT_TEMPLATE, TemplateKind::Report, "x")
            .await;
        assert_eq!(result, Err(ModelFailure::QuotaExceeded));
        assert_eq!(model.calls(), 3);
    }
}
