use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::element::Element;

/// A pending human decision tied to one external workflow execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Approval {
    pub id: String,
    pub resume_url: String,
    pub workflow_name: String,
    /// The caller's `data` object, kept verbatim so the UI and the outcome
    /// payload see exactly what was registered.
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    pub status: ApprovalStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,

    /// Typed view of `data.elements`, produced by validation.
    #[serde(skip)]
    pub elements: Vec<Element>,
    /// Insertion order; breaks timestamp ties when listing.
    #[serde(skip)]
    pub(crate) seq: u64,
    /// Set while a decision holds the claim on this record.
    #[serde(skip)]
    pub(crate) claimed: bool,
}

impl Approval {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to [`crate::store::ApprovalStore::register`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewApproval {
    #[serde(default, deserialize_with = "string_or_number")]
    pub execution_id: Option<String>,
    pub resume_url: Option<String>,
    pub workflow_name: Option<String>,
    pub data: Option<serde_json::Value>,
}

pub const DEFAULT_WORKFLOW_NAME: &str = "Unknown Workflow";

/// Workflow engines often send numeric execution ids.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "executionId must be a string or number, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_approval_serializes_camel_case_without_internal_fields() {
        let approval = Approval {
            id: "exec-1".into(),
            resume_url: "https://n8n.example.com/webhook-waiting/1".into(),
            workflow_name: DEFAULT_WORKFLOW_NAME.into(),
            data: json!({}),
            timestamp: Utc::now(),
            status: ApprovalStatus::Pending,
            processed_at: None,
            elements: vec![],
            seq: 7,
            claimed: true,
        };

        let v = serde_json::to_value(&approval).unwrap();
        assert_eq!(v["resumeUrl"], "https://n8n.example.com/webhook-waiting/1");
        assert_eq!(v["workflowName"], "Unknown Workflow");
        assert_eq!(v["status"], "pending");
        assert!(v.get("processedAt").is_none());
        assert!(v.get("seq").is_none());
        assert!(v.get("claimed").is_none());
        assert!(v.get("elements").is_none());
    }

    #[test]
    fn test_new_approval_accepts_missing_optionals() {
        let req: NewApproval =
            serde_json::from_value(json!({"executionId": "e1", "resumeUrl": "http://x/y"})).unwrap();
        assert_eq!(req.execution_id.as_deref(), Some("e1"));
        assert!(req.workflow_name.is_none());
        assert!(req.data.is_none());
    }

    #[test]
    fn test_numeric_execution_id_is_stringified() {
        let req: NewApproval =
            serde_json::from_value(json!({"executionId": 4512, "resumeUrl": "http://x/y"})).unwrap();
        assert_eq!(req.execution_id.as_deref(), Some("4512"));

        assert!(serde_json::from_value::<NewApproval>(json!({"executionId": [1]})).is_err());
    }
}
