use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::models::approval::ApprovalStatus;
use crate::models::element::DecisionMode;
use crate::validation::ValidationError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("both executionId and resumeUrl are required fields")]
    MissingFields {
        execution_id: bool,
        resume_url: bool,
    },

    #[error("resumeUrl must be a valid absolute http(s) URL")]
    InvalidResumeUrl { received: String },

    #[error("an approval with id '{0}' is already registered")]
    DuplicateId(String),

    #[error("invalid request body: {0}")]
    InvalidJson(String),

    #[error("API key required. Provide an X-API-Key or Authorization header")]
    Unauthorized,

    #[error("invalid API key")]
    Forbidden,

    #[error("no approval found with ID: {0}")]
    NotFound(String),

    #[error("no webhook has been received for test ID: {0}")]
    NoTestResponse(String),

    #[error("no sandbox approval was created with test ID: {0}")]
    UnknownTestId(String),

    #[error("this approval was already {status}")]
    AlreadyProcessed {
        status: ApprovalStatus,
        processed_at: Option<DateTime<Utc>>,
    },

    #[error("a decision for approval '{0}' is already being delivered")]
    DecisionInProgress(String),

    #[error("{mode} approval requires \"{field}\" field ({expected})")]
    MissingDecisionField {
        mode: &'static str,
        field: &'static str,
        expected: &'static str,
    },

    #[error("{message}")]
    DeliveryUnreachable { code: &'static str, message: String },

    #[error("resume URL not found: the workflow execution no longer exists")]
    ExecutionGone { body: String },

    #[error("webhook responded with status {status}")]
    DeliveryRejected { status: u16, body: String },

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn missing_decision_field(mode: DecisionMode) -> Self {
        match mode {
            DecisionMode::Boolean => AppError::MissingDecisionField {
                mode: "boolean",
                field: "approved",
                expected: "boolean",
            },
            DecisionMode::Buttons => AppError::MissingDecisionField {
                mode: "buttons",
                field: "response",
                expected: "string",
            },
            DecisionMode::Form => AppError::MissingDecisionField {
                mode: "form",
                field: "formData",
                expected: "object",
            },
        }
    }

    /// Machine-readable kind, rendered as the `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(e) => e.code(),
            AppError::MissingFields { .. } => "missing_fields",
            AppError::InvalidResumeUrl { .. } => "invalid_resume_url",
            AppError::DuplicateId(_) => "duplicate_id",
            AppError::InvalidJson(_) => "invalid_json",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::NoTestResponse(_) => "no_test_response",
            AppError::UnknownTestId(_) => "unknown_test_id",
            AppError::AlreadyProcessed { .. } => "already_processed",
            AppError::DecisionInProgress(_) => "decision_in_progress",
            AppError::MissingDecisionField { .. } => "missing_decision_field",
            AppError::DeliveryUnreachable { .. } => "delivery_unreachable",
            AppError::ExecutionGone { .. } => "execution_gone",
            AppError::DeliveryRejected { .. } => "delivery_rejected",
            AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_)
            | AppError::MissingFields { .. }
            | AppError::InvalidResumeUrl { .. }
            | AppError::InvalidJson(_)
            | AppError::AlreadyProcessed { .. }
            | AppError::MissingDecisionField { .. } => StatusCode::BAD_REQUEST,
            AppError::DuplicateId(_) | AppError::DecisionInProgress(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) | AppError::NoTestResponse(_) | AppError::UnknownTestId(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::DeliveryUnreachable { .. }
            | AppError::ExecutionGone { .. }
            | AppError::DeliveryRejected { .. }
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn context(&self) -> Value {
        match self {
            AppError::Validation(e) => e.context(),
            AppError::MissingFields {
                execution_id,
                resume_url,
            } => {
                let state = |present: bool| if present { "provided" } else { "missing" };
                json!({
                    "required": ["executionId", "resumeUrl"],
                    "received": {
                        "executionId": state(*execution_id),
                        "resumeUrl": state(*resume_url),
                    },
                })
            }
            AppError::InvalidResumeUrl { received } => json!({
                "example": "https://your-n8n-instance.com/webhook/...",
                "received": received,
            }),
            AppError::NotFound(_) => json!({
                "suggestion": "The approval may have expired or already been processed",
            }),
            AppError::AlreadyProcessed {
                status,
                processed_at,
            } => json!({ "status": status, "processedAt": processed_at }),
            AppError::MissingDecisionField {
                field, expected, ..
            } => json!({ "expected": { field.to_string(): expected } }),
            AppError::DeliveryUnreachable { code, .. } => json!({
                "code": code,
                "suggestion": match *code {
                    "ECONNREFUSED" => "Ensure the workflow engine is running and the resumeUrl is accessible",
                    "ETIMEDOUT" => "Check network connectivity and workflow engine availability",
                    _ => "Verify the resumeUrl is correct and accessible",
                },
            }),
            AppError::ExecutionGone { body } => json!({
                "remoteStatus": 404,
                "remoteBody": body,
                "suggestion": "The execution may have been stopped, the resumeUrl may be wrong, \
                               or the workflow engine restarted and lost its state",
            }),
            AppError::DeliveryRejected { status, body } => json!({
                "remoteStatus": status,
                "remoteBody": body,
            }),
            _ => json!({}),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Internal(e) => {
                tracing::error!("Internal error: {:#}", e);
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "error": self.code(),
            "message": message,
        });
        if let (Some(obj), Value::Object(ctx)) = (body.as_object_mut(), self.context()) {
            obj.extend(ctx);
        }

        (status, Json(body)).into_response()
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::InvalidJson(rejection.body_text())
    }
}
