use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Serialize;

use crate::dispatch::Decision;
use crate::errors::AppError;
use crate::models::approval::{Approval, NewApproval};
use crate::AppState;

// ── Response DTOs ────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub message: &'static str,
    pub execution_id: String,
    pub approval_url: String,
    pub dashboard_url: String,
    pub timestamp: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub success: bool,
    pub message: String,
    pub approval: Approval,
    pub remote_status: u16,
    pub remote_response_body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Serialize)]
pub struct ClearResponse {
    pub success: bool,
    pub cleared: usize,
}

/// Dashboard link for one approval.
pub fn approval_url(base_url: &str, id: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(id.as_bytes()).collect();
    format!("{}/approve.html?id={}", base_url, encoded)
}

// ── Handlers ─────────────────────────────────────────────────

/// POST /webhook/register — register a pending approval (API key required)
pub async fn register_approval(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewApproval>, JsonRejection>,
) -> Result<Json<RegisterResponse>, AppError> {
    let Json(req) = payload?;

    let approval = state.store.register(req).map_err(|e| {
        tracing::warn!(error = %e, code = e.code(), "register: rejected");
        e
    })?;

    tracing::info!(
        approval_id = %approval.id,
        resume_url = %approval.resume_url,
        workflow = %approval.workflow_name,
        elements = approval.elements.len(),
        "new approval request registered"
    );

    let base = state.config.base_url();
    Ok(Json(RegisterResponse {
        success: true,
        message: "Approval request registered successfully",
        approval_url: approval_url(&base, &approval.id),
        execution_id: approval.id,
        dashboard_url: base,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /api/approvals — pending approvals, newest first
pub async fn list_approvals(State(state): State<Arc<AppState>>) -> Json<Vec<Approval>> {
    Json(state.store.list_pending())
}

/// GET /api/approvals/:id — one approval, whatever its status
pub async fn get_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Approval>, AppError> {
    state.store.get(&id).map(Json)
}

/// POST /api/approve/:id — submit the human's decision
pub async fn decide_approval(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<Decision>, JsonRejection>,
) -> Result<Json<DecisionResponse>, AppError> {
    let Json(decision) = payload?;

    let outcome = state
        .dispatcher
        .decide(&state.store, &id, decision)
        .await
        .map_err(|e| {
            tracing::warn!(approval_id = %id, error = %e, code = e.code(), "decision failed");
            e
        })?;

    let verb = outcome.approval.status.as_str();
    Ok(Json(DecisionResponse {
        success: true,
        message: format!("Workflow {} successfully", verb),
        approval: outcome.approval,
        remote_status: outcome.remote_status,
        remote_response_body: outcome.remote_body,
        warning: outcome.warning,
    }))
}

/// DELETE /api/approvals/clear — drop every approval and sandbox capture
pub async fn clear_approvals(State(state): State<Arc<AppState>>) -> Json<ClearResponse> {
    let cleared = state.store.clear_all();
    let captures = state.captures.clear();
    tracing::info!(cleared, captures, "approvals cleared");
    Json(ClearResponse {
        success: true,
        cleared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_approval_url_encodes_id() {
        assert_eq!(
            approval_url("https://relay.example.com", "exec 1/2"),
            "https://relay.example.com/approve.html?id=exec+1%2F2"
        );
        assert_eq!(
            approval_url("http://localhost:3000", "abc-123"),
            "http://localhost:3000/approve.html?id=abc-123"
        );
    }
}
