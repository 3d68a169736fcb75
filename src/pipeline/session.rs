use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db::executor::{ExecutionError, ExecutionOutput};
use crate::llm::retry::ModelFailure;

pub const NO_SQL: &str = "N/A";
pub const DATA_RETRIEVED: &str = "Data Retrieved";
pub const NO_RESULTS: &str = "No results found";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    ExecutionError,
    TranslationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnalysisStatus {
    Produced,
    NoData,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InteractionLogEntry {
    pub utterance: String,
    pub generated_sql: String,
    pub result_summary: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisStatus>,
    pub timestamp: DateTime<Utc>,
}

impl InteractionLogEntry {
    pub fn translation_failed(utterance: &str, failure: &ModelFailure) -> Self {
        Self::translation_failed_with(utterance, failure.to_string())
    }

    pub fn translation_failed_with(utterance: &str, message: String) -> Self {
        Self::new(utterance, NO_SQL, message, Outcome::TranslationError)
    }

    pub fn execution_failed(utterance: &str, sql: &str, error: &ExecutionError) -> Self {
        Self::new(utterance, sql, error.to_string(), Outcome::ExecutionError)
    }

    /// Row results collapse to a marker; status messages are kept verbatim.
    pub fn executed(utterance: &str, sql: &str, output: &ExecutionOutput) -> Self {
        let summary = match output {
            ExecutionOutput::Rows(rows) if rows.is_empty() => NO_RESULTS.to_string(),
            ExecutionOutput::Rows(_) => DATA_RETRIEVED.to_string(),
            ExecutionOutput::Status { message } => message.clone(),
        };
        Self::new(utterance, sql, summary, Outcome::Success)
    }

    pub fn with_analysis(mut self, status: AnalysisStatus) -> Self {
        self.analysis = Some(status);
        self
    }

    fn new(utterance: &str, sql: &str, result_summary: String, outcome: Outcome) -> Self {
        Self {
            utterance: utterance.to_string(),
            generated_sql: sql.to_string(),
            result_summary,
            outcome,
            analysis: None,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only, in memory, gone with the session.
#[derive(Debug, Default, Clone, Serialize)]
pub struct InteractionLog {
    entries: Vec<InteractionLogEntry>,
}

impl InteractionLog {
    pub fn push(&mut self, entry: InteractionLogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[InteractionLogEntry] {
        &self.entries
    }
}

/// One user's sitting. Sessions share nothing but the store.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    log: Mutex<InteractionLog>,
    last_active: StdMutex<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            log: Mutex::new(InteractionLog::default()),
            last_active: StdMutex::new(Utc::now()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn touch(&self) {
        *self.last_active.lock().unwrap_or_else(|p| p.into_inner()) = Utc::now();
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        *self.last_active.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub async fn record(&self, entry: InteractionLogEntry) {
        self.touch();
        self.log.lock().await.push(entry);
    }

    pub async fn history(&self) -> Vec<InteractionLogEntry> {
        self.log.lock().await.entries().to_vec()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
