use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::executor::{ExecutionOutput, ExecutionPolicy, Record, RowSet, Scalar};
use crate::llm::analyst::TemplateKind;
use crate::llm::retry::ModelFailure;
use crate::pipeline::session::{InteractionLogEntry, Session};
use crate::pipeline::{InsightReport, PipelineError, PipelineReport};
use crate::web::state::AppState;

type ApiError = (StatusCode, String);

// Request and response types

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub utterance: String,
    #[serde(default)]
    pub analyze: bool,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub request: String,
}

#[derive(Debug, Deserialize)]
pub struct TranslateRequest {
    pub utterance: String,
}

#[derive(Debug, Serialize)]
pub struct TranslateResponse {
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub data: Vec<serde_json::Map<String, serde_json::Value>>,
    pub kind: TemplateKind,
    pub template: Option<String>,
    #[serde(default)]
    pub original_request: String,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeResponse {
    pub analysis: String,
}

#[derive(Debug, Deserialize)]
pub struct InventoryQuery {
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub session_count: usize,
    pub llm_backend: String,
    pub executor_policy: ExecutionPolicy,
}

fn pipeline_error(e: PipelineError) -> ApiError {
    let status = match &e {
        PipelineError::Translation(ModelFailure::QuotaExceeded)
        | PipelineError::Analysis(ModelFailure::QuotaExceeded) => StatusCode::TOO_MANY_REQUESTS,
        PipelineError::Translation(ModelFailure::Blocked)
        | PipelineError::Analysis(ModelFailure::Blocked) => StatusCode::UNPROCESSABLE_ENTITY,
        PipelineError::Translation(_) | PipelineError::EmptyTranslation | PipelineError::Analysis(_) => {
            StatusCode::BAD_GATEWAY
        }
        PipelineError::Execution(_) => StatusCode::BAD_REQUEST,
    };
    warn!("Request failed: {}", e);
    (status, e.to_string())
}

fn require_text(value: &str, what: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, format!("Please enter a {}.", what)));
    }
    Ok(())
}

async fn find_session(state: &AppState, id: &Uuid) -> Result<Arc<Session>, ApiError> {
    state
        .session(id)
        .await
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Session {} not found", id)))
}

// Sessions

pub async fn create_session(
    state: State<Arc<AppState>>,
) -> (StatusCode, Json<SessionCreated>) {
    let session = state.open_session().await;
    (
        StatusCode::CREATED,
        Json(SessionCreated {
            session_id: session.id(),
        }),
    )
}

pub async fn delete_session(
    state: State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.close_session(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err((StatusCode::NOT_FOUND, format!("Session {} not found", id)))
    }
}

pub async fn session_history(
    state: State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<InteractionLogEntry>>, ApiError> {
    let session = find_session(&state, &id).await?;
    Ok(Json(session.history().await))
}

pub async fn ask(
    state: State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<PipelineReport>, ApiError> {
    require_text(&payload.utterance, "query or command")?;
    let session = find_session(&state, &id).await?;

    let start_time = Instant::now();
    let report = state
        .pipeline
        .ask(&session, payload.utterance.trim(), payload.analyze)
        .await
        .map_err(pipeline_error)?;

    info!(
        "Session {} question answered in {} ms",
        id,
        start_time.elapsed().as_millis()
    );
    Ok(Json(report))
}

pub async fn custom_report(
    state: State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReportRequest>,
) -> Result<Json<PipelineReport>, ApiError> {
    require_text(&payload.request, "report description")?;
    let session = find_session(&state, &id).await?;

    state
        .pipeline
        .custom_report(&session, payload.request.trim())
        .await
        .map(Json)
        .map_err(pipeline_error)
}

// Individual stages

pub async fn translate(
    state: State<Arc<AppState>>,
    Json(payload): Json<TranslateRequest>,
) -> Result<Json<TranslateResponse>, ApiError> {
    require_text(&payload.utterance, "query or command")?;

    let sql = state
        .pipeline
        .translate(payload.utterance.trim())
        .await
        .map_err(|f| pipeline_error(PipelineError::Translation(f)))?;

    Ok(Json(TranslateResponse { sql }))
}

pub async fn execute_query(
    state: State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<Json<ExecutionOutput>, ApiError> {
    require_text(&payload.sql, "SQL statement")?;

    let start_time = Instant::now();
    let output = state
        .pipeline
        .execute(&payload.sql)
        .await
        .map_err(|e| pipeline_error(PipelineError::Execution(e)))?;

    info!("Statement executed in {} ms", start_time.elapsed().as_millis());
    Ok(Json(output))
}

pub async fn export_csv(
    state: State<Arc<AppState>>,
    Json(payload): Json<ExecuteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    require_text(&payload.sql, "SQL statement")?;

    let rows = match state.pipeline.execute(&payload.sql).await {
        Ok(ExecutionOutput::Rows(rows)) => rows,
        Ok(ExecutionOutput::Status { .. }) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "Only SELECT results can be exported as CSV".to_string(),
            ));
        }
        Err(e) => return Err(pipeline_error(PipelineError::Execution(e))),
    };

    let csv = rows.to_csv().map_err(|e| {
        error!("Failed to write CSV: {}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to write CSV: {}", e))
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"results.csv\""),
        ],
        csv,
    ))
}

pub async fn analyze(
    state: State<Arc<AppState>>,
    Json(payload): Json<AnalyzeRequest>,
) -> Result<Json<AnalyzeResponse>, ApiError> {
    // Maps keep document order, so fields arrive in the caller's column order
    let records: Vec<Record> = payload
        .data
        .iter()
        .map(|row| {
            Record::new(
                row.iter()
                    .map(|(key, value)| (key.clone(), Scalar::from(value)))
                    .collect(),
            )
        })
        .collect();

    let template = payload
        .template
        .as_deref()
        .unwrap_or_else(|| payload.kind.default_template());

    let analysis = state
        .pipeline
        .analyze(&records, template, payload.kind, &payload.original_request)
        .await
        .map_err(|f| pipeline_error(PipelineError::Analysis(f)))?;

    Ok(Json(AnalyzeResponse { analysis }))
}

// Canned insight flows

pub async fn patient_summary(
    state: State<Arc<AppState>>,
    Path(patient_id): Path<i64>,
) -> Result<Json<InsightReport>, ApiError> {
    state
        .pipeline
        .patient_summary(patient_id)
        .await
        .map(Json)
        .map_err(pipeline_error)
}

pub async fn inventory_insights(
    state: State<Arc<AppState>>,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<InsightReport>, ApiError> {
    let today = query
        .today
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    state
        .pipeline
        .inventory_insights(today)
        .await
        .map(Json)
        .map_err(pipeline_error)
}

pub async fn search_drugs(
    state: State<Arc<AppState>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let term = query.q.trim();
    if term.is_empty() {
        return Ok(Json(Vec::new()));
    }

    state
        .pipeline
        .search_drugs(term)
        .await
        .map(Json)
        .map_err(pipeline_error)
}

pub async fn drug_details(
    state: State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RowSet>, ApiError> {
    let details = state
        .pipeline
        .drug_details(name.trim())
        .await
        .map_err(pipeline_error)?;

    if details.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Could not retrieve full details for {}", name),
        ));
    }
    Ok(Json(details))
}

// System status
pub async fn system_status(state: State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        session_count: state.sessions.read().await.len(),
        llm_backend: state.config.llm.backend.clone(),
        executor_policy: state.pipeline.executor().policy(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::db::executor::tests::seeded_store;
    use crate::llm::analyst::Analyst;
    use crate::llm::retry::RetryPolicy;
    use crate::llm::testing::ScriptedModel;
    use crate::llm::translator::Translator;
    use crate::llm::LlmError;
    use crate::pipeline::Pipeline;
    use crate::web::app;
    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    struct Harness {
        _dir: TempDir,
        model: Arc<ScriptedModel>,
        state: Arc<AppState>,
    }

    impl Harness {
        fn new(replies: Vec<Result<String, LlmError>>) -> Self {
            let (dir, executor) = seeded_store(ExecutionPolicy::Permissive);
            let model = ScriptedModel::new(replies);
            let retry = RetryPolicy::new(3, Duration::from_millis(1));
            let pipeline = Pipeline::new(
                Translator::new(model.clone(), retry),
                executor,
                Analyst::new(model.clone(), retry),
            );
            Self {
                _dir: dir,
                model,
                state: Arc::new(AppState::new(AppConfig::default(), pipeline)),
            }
        }

        fn router(&self) -> Router {
            app(Arc::clone(&self.state))
        }
    }

    async fn send(router: Router, method: &str, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    async fn new_session(h: &Harness) -> String {
        let (status, body) = send(h.router(), "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::CREATED);
        json(&body)["session_id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn ask_runs_the_flow_and_records_history() {
        let h = Harness::new(vec![Ok(
            "```sql\nSELECT DRUG_NAME FROM PHARMACY_INVENTORY WHERE STOCK_QUANTITY < 50;\n```".into(),
        )]);
        let id = new_session(&h).await;

        let (status, body) = send(
            h.router(),
            "POST",
            &format!("/api/sessions/{}/ask", id),
            Some(serde_json::json!({"utterance": "Show all drugs with less than 50 packs in stock."})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let report = json(&body);
        assert_eq!(report["output"]["type"], "rows");
        assert_eq!(report["output"]["rows"][0]["DRUG_NAME"], "Ventolin");

        let (status, body) = send(h.router(), "GET", &format!("/api/sessions/{}/history", id), None).await;
        assert_eq!(status, StatusCode::OK);
        let history = json(&body);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["result_summary"], "Data Retrieved");
        assert_eq!(history[0]["outcome"], "success");
    }

    #[tokio::test]
    async fn blank_utterance_is_rejected_before_the_model() {
        let h = Harness::new(vec![]);
        let id = new_session(&h).await;

        let (status, _) = send(
            h.router(),
            "POST",
            &format!("/api/sessions/{}/ask", id),
            Some(serde_json::json!({"utterance": "   "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(h.router(), "POST", "/api/translate", Some(serde_json::json!({"utterance": ""}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(h.model.calls(), 0);
    }

    #[tokio::test]
    async fn closed_sessions_are_gone() {
        let h = Harness::new(vec![]);
        let id = new_session(&h).await;

        let (status, _) = send(h.router(), "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(h.router(), "GET", &format!("/api/sessions/{}/history", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(h.router(), "DELETE", &format!("/api/sessions/{}", id), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn failures_carry_stage_labels() {
        let h = Harness::new(vec![Err(LlmError::Blocked("SAFETY".into()))]);

        let (status, body) = send(
            h.router(),
            "POST",
            "/api/translate",
            Some(serde_json::json!({"utterance": "something unsafe"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(String::from_utf8_lossy(&body).starts_with("Could not generate SQL"));

        let (status, body) = send(
            h.router(),
            "POST",
            "/api/execute",
            Some(serde_json::json!({"sql": "SELECT NOPE FROM PHARMACY_INVENTORY"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(String::from_utf8_lossy(&body).starts_with("The database rejected this statement:"));
    }

    #[tokio::test]
    async fn execute_returns_status_for_writes() {
        let h = Harness::new(vec![]);
        let (status, body) = send(
            h.router(),
            "POST",
            "/api/execute",
            Some(serde_json::json!({"sql": "DELETE FROM PHARMACY_INVENTORY WHERE DRUG_ID = 999999;"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let output = json(&body);
        assert_eq!(output["type"], "status");
        assert_eq!(output["message"], "Query executed successfully. Rows affected: 0");
    }

    #[tokio::test]
    async fn csv_export_streams_rows() {
        let h = Harness::new(vec![]);
        let (status, body) = send(
            h.router(),
            "POST",
            "/api/execute/csv",
            Some(serde_json::json!({"sql": "SELECT DRUG_NAME, STOCK_QUANTITY FROM PHARMACY_INVENTORY ORDER BY DRUG_ID"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            String::from_utf8(body).unwrap(),
            "DRUG_NAME,STOCK_QUANTITY\nVentolin,30\nAmoxil,80\n"
        );
    }

    #[tokio::test]
    async fn analyze_uses_the_default_template_for_the_kind() {
        let h = Harness::new(vec![Ok("Stock looks fine.".into())]);
        let (status, body) = send(
            h.router(),
            "POST",
            "/api/analyze",
            Some(serde_json::json!({
                "data": [{"DRUG_NAME": "Ventolin", "STOCK_QUANTITY": 30}],
                "kind": "inventory_insights"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["analysis"], "Stock looks fine.");
        assert!(h.model.prompts()[0][0].contains("DRUG_NAME: Ventolin, STOCK_QUANTITY: 30"));
    }

    #[tokio::test]
    async fn analyze_keeps_the_callers_column_order() {
        let h = Harness::new(vec![Ok("Reorder soon.".into())]);
        let body = r#"{"data":[{"STOCK_QUANTITY":30,"EXPIRY_DATE":"2025-10-01","DRUG_NAME":"Ventolin"}],"kind":"inventory_insights"}"#;
        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();

        let response = h.router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(h.model.prompts()[0][0]
            .contains("STOCK_QUANTITY: 30, EXPIRY_DATE: 2025-10-01, DRUG_NAME: Ventolin"));
    }

    #[tokio::test]
    async fn search_and_insights_endpoints() {
        let h = Harness::new(vec![Ok("Reorder Ventolin.".into())]);

        let (status, body) = send(h.router(), "GET", "/api/drugs/search?q=Amox", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body), serde_json::json!(["Amoxicillin", "Amoxil"]));

        let (_, body) = send(h.router(), "GET", "/api/drugs/search?q=", None).await;
        assert_eq!(json(&body), serde_json::json!([]));

        let (status, body) = send(h.router(), "GET", "/api/drugs/Amoxicillin", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["rows"][0]["DRUG_NAME"], "Amoxil");
        let (status, _) = send(h.router(), "GET", "/api/drugs/Aspirin", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(h.router(), "GET", "/api/insights/inventory?today=2025-01-01", None).await;
        assert_eq!(status, StatusCode::OK);
        let report = json(&body);
        assert_eq!(report["data"]["rows"].as_array().unwrap().len(), 1);
        assert_eq!(report["analysis"]["status"], "produced");

        let (status, body) = send(h.router(), "GET", "/api/insights/patient/7", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["analysis"]["status"], "no_data");
    }

    #[tokio::test]
    async fn status_reports_sessions() {
        let h = Harness::new(vec![]);
        new_session(&h).await;
        let (status, body) = send(h.router(), "GET", "/api/status", None).await;
        assert_eq!(status, StatusCode::OK);
        let status_body = json(&body);
        assert_eq!(status_body["session_count"], 1);
        assert_eq!(status_body["llm_backend"], "gemini");
        assert_eq!(status_body["executor_policy"], "permissive");
    }
}
