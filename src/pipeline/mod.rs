//! Translate, execute, and optionally analyse: one utterance at a time.

pub mod insights;
pub mod session;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::db::executor::{
    ExecutionError, ExecutionOutput, ExecutionResult, QueryExecutor, Record, RowSet, StoreError,
};
use crate::llm::analyst::{Analyst, TemplateKind};
use crate::llm::prompts::REPORT_TEMPLATE;
use crate::llm::retry::{ModelFailure, RetryPolicy};
use crate::llm::translator::Translator;
use crate::llm::{LlmError, LlmManager};
use session::{AnalysisStatus, InteractionLogEntry, Session};

/// Terminal failure of a flow, labelled with the stage that failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Could not generate SQL: {0}")]
    Translation(ModelFailure),
    #[error("Could not generate SQL: the model returned an empty statement")]
    EmptyTranslation,
    #[error("The database rejected this statement: {}", .0.message)]
    Execution(ExecutionError),
    #[error("Could not analyse the results: {0}")]
    Analysis(ModelFailure),
}

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Failed to initialise LLM backend: {0}")]
    Llm(#[from] LlmError),
    #[error("Failed to open database: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Produced { text: String },
    /// Nothing to analyse, so the model was not called.
    NoData,
    Failed { reason: String, message: String },
}

impl AnalysisOutcome {
    fn from_result(result: Result<String, ModelFailure>) -> Self {
        match result {
            Ok(text) => AnalysisOutcome::Produced { text },
            Err(failure) => AnalysisOutcome::Failed {
                reason: failure.reason().to_string(),
                message: PipelineError::Analysis(failure).to_string(),
            },
        }
    }

    fn status(&self) -> AnalysisStatus {
        match self {
            AnalysisOutcome::Produced { .. } => AnalysisStatus::Produced,
            AnalysisOutcome::NoData => AnalysisStatus::NoData,
            AnalysisOutcome::Failed { reason, .. } => AnalysisStatus::Failed {
                reason: reason.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineReport {
    pub sql: String,
    pub output: ExecutionOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisOutcome>,
}

/// Result of a canned lookup followed by an analysis call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InsightReport {
    pub data: RowSet,
    pub analysis: AnalysisOutcome,
}

pub struct Pipeline {
    translator: Translator,
    executor: QueryExecutor,
    analyst: Analyst,
}

impl Pipeline {
    pub fn new(translator: Translator, executor: QueryExecutor, analyst: Analyst) -> Self {
        Self {
            translator,
            executor,
            analyst,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, SetupError> {
        let manager = LlmManager::new(&config.llm)?;
        let policy = RetryPolicy::from(&config.retry);
        let executor = QueryExecutor::new(&config.database.path, config.executor.policy)?;

        Ok(Self::new(
            Translator::new(manager.model(), policy),
            executor,
            Analyst::new(manager.model(), policy),
        ))
    }

    pub fn executor(&self) -> &QueryExecutor {
        &self.executor
    }

    pub async fn translate(&self, utterance: &str) -> Result<String, ModelFailure> {
        self.translator.translate(utterance).await
    }

    /// Runs `sql` on the blocking pool; DuckDB calls must not stall the runtime.
    pub async fn execute(&self, sql: &str) -> ExecutionResult {
        let executor = self.executor.clone();
        let statement = sql.to_string();
        tokio::task::spawn_blocking(move || executor.execute(&statement))
            .await
            .unwrap_or_else(|e| {
                Err(ExecutionError {
                    message: format!("Execution task failed: {}", e),
                    sql: sql.to_string(),
                })
            })
    }

    pub async fn analyze(
        &self,
        data: &[Record],
        template: &str,
        kind: TemplateKind,
        original_request: &str,
    ) -> Result<String, ModelFailure> {
        self.analyst.analyze(data, template, kind, original_request).await
    }

    /// The interactive flow. Exactly one entry lands in the session log
    /// whichever stage the utterance reaches.
    pub async fn ask(
        &self,
        session: &Session,
        utterance: &str,
        analyze: bool,
    ) -> Result<PipelineReport, PipelineError> {
        let result = self.run(utterance, analyze).await;
        session.record(result.entry).await;
        result.outcome
    }

    /// Translate, execute and write up the rows as a report. Logged like
    /// any other utterance.
    pub async fn custom_report(
        &self,
        session: &Session,
        request: &str,
    ) -> Result<PipelineReport, PipelineError> {
        self.ask(session, request, true).await
    }

    async fn run(&self, utterance: &str, analyze: bool) -> FlowResult {
        info!("Running pipeline (analysis requested: {})", analyze);

        let sql = match self.translate(utterance).await {
            Ok(sql) if sql.is_empty() => {
                warn!("Model returned an empty statement");
                return FlowResult {
                    entry: InteractionLogEntry::translation_failed_with(
                        utterance,
                        PipelineError::EmptyTranslation.to_string(),
                    ),
                    outcome: Err(PipelineError::EmptyTranslation),
                };
            }
            Ok(sql) => sql,
            Err(failure) => {
                return FlowResult {
                    entry: InteractionLogEntry::translation_failed(utterance, &failure),
                    outcome: Err(PipelineError::Translation(failure)),
                };
            }
        };

        let output = match self.execute(&sql).await {
            Ok(output) => output,
            Err(error) => {
                return FlowResult {
                    entry: InteractionLogEntry::execution_failed(utterance, &sql, &error),
                    outcome: Err(PipelineError::Execution(error)),
                };
            }
        };

        let mut entry = InteractionLogEntry::executed(utterance, &sql, &output);
        let analysis = if analyze {
            let outcome = match &output {
                ExecutionOutput::Rows(rows) if !rows.is_empty() => AnalysisOutcome::from_result(
                    self.analyze(&rows.rows, REPORT_TEMPLATE, TemplateKind::Report, utterance)
                        .await,
                ),
                _ => AnalysisOutcome::NoData,
            };
            entry = entry.with_analysis(outcome.status());
            Some(outcome)
        } else {
            None
        };

        FlowResult {
            entry,
            outcome: Ok(PipelineReport {
                sql,
                output,
                analysis,
            }),
        }
    }

    pub async fn patient_summary(&self, patient_id: i64) -> Result<InsightReport, PipelineError> {
        let executor = self.executor.clone();
        let data = self
            .blocking_read(move || insights::patient_history(&executor, patient_id))
            .await?;
        let request = format!("Summarize the health history for Patient ID {}", patient_id);
        self.analyze_insight(data, TemplateKind::PatientSummary, &request).await
    }

    pub async fn inventory_insights(&self, today: NaiveDate) -> Result<InsightReport, PipelineError> {
        let executor = self.executor.clone();
        let data = self
            .blocking_read(move || insights::inventory_attention(&executor, today))
            .await?;
        self.analyze_insight(
            data,
            TemplateKind::InventoryInsights,
            "Analyze pharmacy inventory for urgent attention items",
        )
        .await
    }

    pub async fn search_drugs(&self, term: &str) -> Result<Vec<String>, PipelineError> {
        let executor = self.executor.clone();
        let term = term.to_string();
        self.blocking_read(move || insights::search_drugs(&executor, &term))
            .await
    }

    /// Full inventory rows for a drug picked from the search suggestions.
    pub async fn drug_details(&self, name: &str) -> Result<RowSet, PipelineError> {
        let executor = self.executor.clone();
        let name = name.to_string();
        self.blocking_read(move || insights::drug_details(&executor, &name))
            .await
    }

    async fn analyze_insight(
        &self,
        data: RowSet,
        kind: TemplateKind,
        request: &str,
    ) -> Result<InsightReport, PipelineError> {
        if data.is_empty() {
            info!("No rows for {:?}, skipping analysis", kind);
            return Ok(InsightReport {
                data,
                analysis: AnalysisOutcome::NoData,
            });
        }

        let analysis = AnalysisOutcome::from_result(
            self.analyze(&data.rows, kind.default_template(), kind, request)
                .await,
        );
        Ok(InsightReport { data, analysis })
    }

    async fn blocking_read<T, F>(&self, f: F) -> Result<T, PipelineError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, ExecutionError> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .unwrap_or_else(|e| {
                Err(ExecutionError {
                    message: format!("Execution task failed: {}", e),
                    sql: String::new(),
                })
            })
            .map_err(PipelineError::Execution)
    }
}

struct FlowResult {
    entry: InteractionLogEntry,
    outcome: Result<PipelineReport, PipelineError>,
}
