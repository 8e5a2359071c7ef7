use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::approval::{Approval, ApprovalStatus};
use crate::models::element::DecisionMode;
use crate::store::ApprovalStore;

/// Label sent as `approvedBy` in every outcome payload.
pub const APPROVED_BY: &str = "Manual Approval System";

// ── Decision & Outcome ───────────────────────────────────────

/// The human's answer, as submitted by the dashboard.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub approved: Option<bool>,
    pub response: Option<String>,
    pub form_data: Option<serde_json::Map<String, Value>>,
}

impl Decision {
    /// Fail unless the field matching `mode` was supplied.
    pub fn check_mode(&self, mode: DecisionMode) -> Result<(), AppError> {
        let present = match mode {
            DecisionMode::Boolean => self.approved.is_some(),
            DecisionMode::Buttons => self.response.as_deref().is_some_and(|r| !r.is_empty()),
            DecisionMode::Form => self.form_data.is_some(),
        };
        if present {
            Ok(())
        } else {
            Err(AppError::missing_decision_field(mode))
        }
    }

    /// An explicit `approved` flag wins; otherwise any submitted answer
    /// (button choice or form data) counts as approval.
    pub fn terminal_status(&self) -> ApprovalStatus {
        let approved = self
            .approved
            .unwrap_or(self.response.is_some() || self.form_data.is_some());
        if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        }
    }
}

/// JSON body POSTed to the approval's `resumeUrl`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomePayload {
    pub timestamp: String,
    pub approved_by: &'static str,
    pub execution_id: String,
    pub workflow_name: String,
    pub original_data: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form_data: Option<serde_json::Map<String, Value>>,
}

impl OutcomePayload {
    pub fn new(approval: &Approval, decision: &Decision) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            approved_by: APPROVED_BY,
            execution_id: approval.id.clone(),
            workflow_name: approval.workflow_name.clone(),
            original_data: approval.data.clone(),
            approved: decision.approved,
            response: decision.response.clone(),
            form_data: decision.form_data.clone(),
        }
    }
}

/// Result of a decision whose outcome reached the callback.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub approval: Approval,
    pub remote_status: u16,
    pub remote_body: String,
    /// Set when the callback answered 409: the execution had already
    /// finished, but the decision is still recorded locally.
    pub warning: Option<String>,
}

struct Delivery {
    status: u16,
    body: String,
    warning: Option<String>,
}

// ── Dispatcher ───────────────────────────────────────────────

/// Delivers decisions to workflow callbacks.
///
/// One POST per decision, no retries. The approval is claimed before the
/// call goes out, so two concurrent decisions on the same id cannot both
/// deliver. Once started, a decision runs to completion on its own task:
/// dropping the caller's future does not cancel it.
#[derive(Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
}

impl Dispatcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .user_agent(concat!("hitl-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Validate `decision` against the approval, deliver it, and record
    /// the terminal status.
    ///
    /// On any error other than a 409 from the callback the approval stays
    /// `pending`.
    pub async fn decide(
        &self,
        store: &Arc<ApprovalStore>,
        id: &str,
        decision: Decision,
    ) -> Result<DispatchOutcome, AppError> {
        let dispatcher = self.clone();
        let store = Arc::clone(store);
        let id = id.to_string();

        tokio::spawn(async move { dispatcher.run(&store, &id, decision).await })
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("decision task failed: {}", e)))?
    }

    async fn run(
        &self,
        store: &ApprovalStore,
        id: &str,
        decision: Decision,
    ) -> Result<DispatchOutcome, AppError> {
        let claim = store.claim(id)?;

        if let Some(mode) = DecisionMode::of(&claim.approval().elements) {
            if let Err(e) = decision.check_mode(mode) {
                warn!(approval_id = id, mode = ?mode, "decision missing required field");
                return Err(e);
            }
        }

        let payload = OutcomePayload::new(claim.approval(), &decision);
        let resume_url = claim.approval().resume_url.clone();
        let delivery = self.deliver(id, &resume_url, &payload).await?;

        let status = decision.terminal_status();
        let approval = claim.finalize(status);
        info!(approval_id = id, status = %status, "approval processed");

        Ok(DispatchOutcome {
            approval,
            remote_status: delivery.status,
            remote_body: delivery.body,
            warning: delivery.warning,
        })
    }

    async fn deliver(
        &self,
        approval_id: &str,
        url: &str,
        payload: &OutcomePayload,
    ) -> Result<Delivery, AppError> {
        let delivery_id = uuid::Uuid::new_v4().to_string();
        info!(approval_id, url, delivery_id = %delivery_id, "calling resume URL");
        debug!(
            approval_id,
            payload = %serde_json::to_string(payload).unwrap_or_default(),
            "outcome payload"
        );

        let resp = self
            .client
            .post(url)
            .header("x-relay-delivery-id", &delivery_id)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                let err = unreachable_error(&e);
                warn!(approval_id, url, error = %e, "resume URL unreachable");
                err
            })?;

        let status = resp.status();
        let body = match resp.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(
                    approval_id,
                    delivery_id = %delivery_id,
                    error = %e,
                    "failed to read resume URL response body"
                );
                String::new()
            }
        };
        info!(
            approval_id,
            delivery_id = %delivery_id,
            status = %status,
            body = %body,
            "resume URL responded"
        );

        match status.as_u16() {
            409 => {
                warn!(
                    approval_id,
                    "workflow execution already finished or timed out before the decision"
                );
                Ok(Delivery {
                    status: 409,
                    body,
                    warning: Some(
                        "Workflow execution already finished or timed out; \
                         the decision was recorded but the workflow did not resume"
                            .to_string(),
                    ),
                })
            }
            404 => {
                warn!(approval_id, url, "resume URL not found (404)");
                Err(AppError::ExecutionGone { body })
            }
            code if status.is_success() => Ok(Delivery {
                status: code,
                body,
                warning: None,
            }),
            code => {
                warn!(approval_id, status = code, "resume URL rejected the decision");
                Err(AppError::DeliveryRejected { status: code, body })
            }
        }
    }
}

fn unreachable_error(err: &reqwest::Error) -> AppError {
    let code = transport_code(err);
    let message = match code {
        "ECONNREFUSED" => "Cannot connect to the workflow resume URL".to_string(),
        "ETIMEDOUT" => "Connection to the workflow resume URL timed out".to_string(),
        "ENOTFOUND" => "Could not resolve the workflow resume URL host".to_string(),
        _ => format!("Network error when calling the workflow resume URL: {}", err),
    };
    AppError::DeliveryUnreachable { code, message }
}

/// Map a transport failure to a conventional socket error code.
fn transport_code(err: &reqwest::Error) -> &'static str {
    if err.is_timeout() {
        return "ETIMEDOUT";
    }

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            match io.kind() {
                std::io::ErrorKind::ConnectionRefused => return "ECONNREFUSED",
                std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::ConnectionAborted => {
                    return "ECONNRESET"
                }
                std::io::ErrorKind::TimedOut => return "ETIMEDOUT",
                _ => {}
            }
        }
        let text = cause.to_string();
        if text.contains("dns error") || text.contains("failed to lookup address") {
            return "ENOTFOUND";
        }
        source = cause.source();
    }

    "ENETWORK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_check_mode() {
        let empty = Decision::default();
        assert!(empty.check_mode(DecisionMode::Boolean).is_err());
        assert!(empty.check_mode(DecisionMode::Buttons).is_err());
        assert!(empty.check_mode(DecisionMode::Form).is_err());

        let d = Decision {
            approved: Some(false),
            ..Default::default()
        };
        assert!(d.check_mode(DecisionMode::Boolean).is_ok());

        let d = Decision {
            response: Some(String::new()),
            ..Default::default()
        };
        assert!(d.check_mode(DecisionMode::Buttons).is_err());
    }

    #[test]
    fn test_terminal_status() {
        let d = Decision {
            approved: Some(false),
            response: Some("A".into()),
            ..Default::default()
        };
        assert_eq!(d.terminal_status(), ApprovalStatus::Rejected);

        let d = Decision {
            response: Some("A".into()),
            ..Default::default()
        };
        assert_eq!(d.terminal_status(), ApprovalStatus::Approved);

        assert_eq!(Decision::default().terminal_status(), ApprovalStatus::Rejected);
    }

    #[test]
    fn test_payload_omits_unsupplied_fields() {
        let approval = Approval {
            id: "exec-9".into(),
            resume_url: "https://n8n.example.com/webhook-waiting/9".into(),
            workflow_name: "Invoices".into(),
            data: json!({"elements": [{"type": "boolean"}]}),
            timestamp: chrono::Utc::now(),
            status: ApprovalStatus::Pending,
            processed_at: None,
            elements: vec![],
            seq: 0,
            claimed: false,
        };
        let decision = Decision {
            approved: Some(true),
            ..Default::default()
        };

        let v = serde_json::to_value(OutcomePayload::new(&approval, &decision)).unwrap();
        assert_eq!(v["approvedBy"], APPROVED_BY);
        assert_eq!(v["executionId"], "exec-9");
        assert_eq!(v["workflowName"], "Invoices");
        assert_eq!(v["originalData"]["elements"][0]["type"], "boolean");
        assert_eq!(v["approved"], true);
        assert!(v.get("response").is_none());
        assert!(v.get("formData").is_none());
    }

    #[test]
    fn test_decision_deserializes_camel_case() {
        let d: Decision =
            serde_json::from_value(json!({"formData": {"qty": 3}, "approved": null})).unwrap();
        assert!(d.approved.is_none());
        assert_eq!(d.form_data.unwrap()["qty"], 3);
    }
}
