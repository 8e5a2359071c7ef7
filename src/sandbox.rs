//! Test sandbox — exercises the real decision flow without a live workflow
//! engine. Sandbox approvals point their `resumeUrl` back at this server's
//! own callback receiver, which records each delivery in a [`CaptureRegistry`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};

pub const SANDBOX_WORKFLOW_NAME: &str = "Test Sandbox Workflow";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// A callback delivery received by the sandbox receiver.
#[derive(Debug, Clone, Serialize)]
pub struct TestCapture {
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub headers: BTreeMap<String, String>,
}

/// Captured sandbox deliveries, keyed by test id. Only ids handed out by
/// [`CaptureRegistry::issue`] accept deliveries; later deliveries for the
/// same id replace earlier ones.
#[derive(Default)]
pub struct CaptureRegistry {
    captures: DashMap<String, Option<TestCapture>>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a slot for a freshly created sandbox approval.
    pub fn issue(&self, id: &str) {
        self.captures.entry(id.to_string()).or_insert(None);
    }

    /// Store a delivery for an issued id. Returns `None` for ids this relay
    /// never issued, leaving the registry untouched.
    pub fn record(
        &self,
        id: &str,
        data: Value,
        headers: BTreeMap<String, String>,
    ) -> Option<TestCapture> {
        let mut slot = self.captures.get_mut(id)?;
        let capture = TestCapture {
            timestamp: Utc::now(),
            data,
            headers,
        };
        *slot = Some(capture.clone());
        Some(capture)
    }

    pub fn get(&self, id: &str) -> Option<TestCapture> {
        self.captures.get(id).and_then(|c| c.value().clone())
    }

    /// Drop every issued id and capture, returning how many ids were open.
    pub fn clear(&self) -> usize {
        let mut removed = 0;
        self.captures.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }
}

/// `test-<unix millis>-<9 base36 chars>`
pub fn new_test_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("test-{}-{}", Utc::now().timestamp_millis(), suffix)
}

/// A ready-to-paste registration command for the same test approval.
/// The API key is left as a placeholder so the response never leaks it.
pub fn curl_command(base_url: &str, body: &Value) -> String {
    let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
    format!(
        "curl -X POST {}/webhook/register \\\n  -H \"Content-Type: application/json\" \\\n  -H \"X-API-Key: $API_KEY\" \\\n  -d '{}'",
        base_url, pretty
    )
}

/// Registration body mirroring what a workflow engine would send.
pub fn registration_body(id: &str, resume_url: &str, workflow_name: &str, elements: &Value) -> Value {
    json!({
        "executionId": id,
        "resumeUrl": resume_url,
        "workflowName": workflow_name,
        "data": { "elements": elements },
    })
}
