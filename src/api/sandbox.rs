use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::AppError;
use crate::models::approval::NewApproval;
use crate::sandbox::{self, TestCapture, SANDBOX_WORKFLOW_NAME};
use crate::AppState;

use super::handlers::approval_url;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestRequest {
    pub elements: Option<Value>,
    pub workflow_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestResponse {
    pub success: bool,
    pub test_id: String,
    pub approval_url: String,
    pub resume_url: String,
    pub status_url: String,
    pub curl_command: String,
    pub message: &'static str,
}

/// POST /test/create — register a sandbox approval whose callback is this server
pub async fn create_test_approval(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTestRequest>, JsonRejection>,
) -> Result<Json<CreateTestResponse>, AppError> {
    let Json(req) = payload?;

    let test_id = sandbox::new_test_id();
    let base = state.config.base_url();
    let resume_url = format!("{}/test/webhook/{}", base, test_id);
    let workflow_name = req
        .workflow_name
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| SANDBOX_WORKFLOW_NAME.to_string());
    let elements = req.elements.unwrap_or_else(|| json!([]));

    state.store.register(NewApproval {
        execution_id: Some(test_id.clone()),
        resume_url: Some(resume_url.clone()),
        workflow_name: Some(workflow_name.clone()),
        data: Some(json!({ "elements": elements })),
    })?;
    state.captures.issue(&test_id);

    tracing::info!(test_id = %test_id, resume_url = %resume_url, "sandbox approval created");

    let body = sandbox::registration_body(&test_id, &resume_url, &workflow_name, &elements);
    Ok(Json(CreateTestResponse {
        success: true,
        approval_url: approval_url(&base, &test_id),
        status_url: resume_url.clone(),
        curl_command: sandbox::curl_command(&base, &body),
        resume_url,
        test_id,
        message: "Test approval created. Visit the dashboard to approve/reject, \
                  then check statusUrl for the webhook response.",
    }))
}

/// POST /test/webhook/:id — sandbox callback receiver, answers like a workflow engine.
/// Only ids issued by `/test/create` are accepted.
pub async fn receive_test_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload?;

    let headers: BTreeMap<String, String> = headers
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
        .collect();

    if state.captures.record(&id, body.clone(), headers).is_none() {
        tracing::warn!(test_id = %id, "sandbox webhook for unknown test id ignored");
        return Err(AppError::UnknownTestId(id));
    }
    tracing::info!(test_id = %id, "sandbox webhook received");

    Ok(Json(json!({
        "success": true,
        "message": "Test webhook received",
        "executionId": body.get("executionId").cloned().unwrap_or(Value::Null),
        "received": body,
    })))
}

/// GET /test/webhook/:id — what the sandbox receiver captured
pub async fn get_test_webhook(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TestCapture>, AppError> {
    state
        .captures
        .get(&id)
        .map(Json)
        .ok_or(AppError::NoTestResponse(id))
}
