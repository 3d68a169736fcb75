use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

// API Routes - REST API for programmatic access
pub fn api_routes() -> Router<Arc<AppState>> {
    Router::new().nest(
        "/api",
        Router::new()
            // Sessions and the interactive flow
            .route("/sessions", post(handlers::api::create_session))
            .route("/sessions/{id}", delete(handlers::api::delete_session))
            .route("/sessions/{id}/history", get(handlers::api::session_history))
            .route("/sessions/{id}/ask", post(handlers::api::ask))
            .route("/sessions/{id}/report", post(handlers::api::custom_report))

            // Individual stages
            .route("/translate", post(handlers::api::translate))
            .route("/execute", post(handlers::api::execute_query))
            .route("/execute/csv", post(handlers::api::export_csv))
            .route("/analyze", post(handlers::api::analyze))

            // Canned insight flows
            .route("/insights/patient/{id}", get(handlers::api::patient_summary))
            .route("/insights/inventory", get(handlers::api::inventory_insights))
            .route("/drugs/search", get(handlers::api::search_drugs))
            .route("/drugs/{name}", get(handlers::api::drug_details))

            // System status
            .route("/status", get(handlers::api::system_status)),
    )
}
