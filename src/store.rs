//! Approval Store — in-memory registry of approval records.
//!
//! Records live for the process lifetime. All mutations go through the
//! `DashMap` entry locks, so each record has a single writer at a time while
//! listing and lookups proceed concurrently.
//!
//! Deciding an approval is a three-step protocol:
//! - `claim` flips the record's claim flag while it is still pending
//! - the caller delivers the outcome
//! - `Claim::finalize` moves it to a terminal status, or dropping the
//!   [`Claim`] releases it so the human can try again
//!
//! Release and finalize match on the record's insertion `seq` as well as its
//! id, so a claim outliving `clear_all` never touches a newer record.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;

use crate::errors::AppError;
use crate::models::approval::{Approval, ApprovalStatus, NewApproval, DEFAULT_WORKFLOW_NAME};
use crate::validation;

#[derive(Default)]
pub struct ApprovalStore {
    approvals: DashMap<String, Approval>,
    next_seq: AtomicU64,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and insert a new pending approval.
    ///
    /// Checks run in order: required fields, element schema, resume URL,
    /// then id uniqueness.
    pub fn register(&self, req: NewApproval) -> Result<Approval, AppError> {
        let id = req.execution_id.filter(|s| !s.is_empty());
        let resume_url = req.resume_url.filter(|s| !s.is_empty());
        let (id, resume_url) = match (id, resume_url) {
            (Some(id), Some(url)) => (id, url),
            (id, url) => {
                return Err(AppError::MissingFields {
                    execution_id: id.is_some(),
                    resume_url: url.is_some(),
                })
            }
        };

        let elements = validation::validate_data(req.data.as_ref())?;
        parse_resume_url(&resume_url)?;

        match self.approvals.entry(id.clone()) {
            Entry::Occupied(_) => Err(AppError::DuplicateId(id)),
            Entry::Vacant(slot) => {
                let approval = Approval {
                    id,
                    resume_url,
                    workflow_name: req
                        .workflow_name
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| DEFAULT_WORKFLOW_NAME.to_string()),
                    data: req.data.filter(|d| !d.is_null()).unwrap_or_else(|| json!({})),
                    timestamp: Utc::now(),
                    status: ApprovalStatus::Pending,
                    processed_at: None,
                    elements,
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    claimed: false,
                };
                slot.insert(approval.clone());
                Ok(approval)
            }
        }
    }

    /// All pending approvals, newest first.
    pub fn list_pending(&self) -> Vec<Approval> {
        let mut pending: Vec<Approval> = self
            .approvals
            .iter()
            .filter(|a| a.is_pending())
            .map(|a| a.value().clone())
            .collect();
        pending.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.seq.cmp(&a.seq)));
        pending
    }

    pub fn get(&self, id: &str) -> Result<Approval, AppError> {
        self.approvals
            .get(id)
            .map(|a| a.value().clone())
            .ok_or_else(|| AppError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.approvals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.approvals.is_empty()
    }

    /// Remove every approval, returning how many were removed.
    pub fn clear_all(&self) -> usize {
        let mut removed = 0;
        self.approvals.retain(|_, _| {
            removed += 1;
            false
        });
        removed
    }

    /// Take exclusive decision rights over a pending approval.
    pub fn claim(&self, id: &str) -> Result<Claim<'_>, AppError> {
        let mut entry = self
            .approvals
            .get_mut(id)
            .ok_or_else(|| AppError::NotFound(id.to_string()))?;

        if !entry.is_pending() {
            return Err(AppError::AlreadyProcessed {
                status: entry.status,
                processed_at: entry.processed_at,
            });
        }
        if entry.claimed {
            return Err(AppError::DecisionInProgress(id.to_string()));
        }

        entry.claimed = true;
        let snapshot = entry.value().clone();
        tracing::debug!(approval_id = id, "approval claimed");

        Ok(Claim {
            store: self,
            approval: snapshot,
            armed: true,
        })
    }

    /// Claims only ever touch the record they were taken on. A record that was
    /// cleared and re-registered under the same id has a different `seq`.
    fn release(&self, id: &str, seq: u64) {
        if let Some(mut entry) = self.approvals.get_mut(id) {
            if entry.seq == seq && entry.is_pending() {
                entry.claimed = false;
                tracing::debug!(approval_id = id, "approval claim released");
            }
        }
    }

    fn finalize(&self, id: &str, seq: u64, status: ApprovalStatus) -> Option<Approval> {
        let mut entry = self.approvals.get_mut(id)?;
        if entry.seq != seq {
            return None;
        }
        if !entry.is_pending() {
            return Some(entry.value().clone());
        }
        entry.status = status;
        entry.processed_at = Some(Utc::now());
        entry.claimed = false;
        Some(entry.value().clone())
    }
}

/// Exclusive right to decide one approval.
///
/// Dropping an unfinalized claim returns the approval to the pool. Callers
/// that must not be interrupted mid-delivery run the claim on a spawned task.
pub struct Claim<'a> {
    store: &'a ApprovalStore,
    approval: Approval,
    armed: bool,
}

impl Claim<'_> {
    /// The approval as it was when claimed.
    pub fn approval(&self) -> &Approval {
        &self.approval
    }

    /// Move the approval to its terminal status and stamp `processedAt`.
    pub fn finalize(mut self, status: ApprovalStatus) -> Approval {
        self.armed = false;
        match self.store.finalize(&self.approval.id, self.approval.seq, status) {
            Some(updated) => updated,
            None => {
                // Cleared (and possibly re-registered) while the delivery was in flight.
                tracing::warn!(
                    approval_id = %self.approval.id,
                    "approval removed before it could be finalized"
                );
                let mut detached = self.approval.clone();
                detached.status = status;
                detached.processed_at = Some(Utc::now());
                detached.claimed = false;
                detached
            }
        }
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.release(&self.approval.id, self.approval.seq);
        }
    }
}

fn parse_resume_url(raw: &str) -> Result<url::Url, AppError> {
    let invalid = || AppError::InvalidResumeUrl {
        received: raw.to_string(),
    };
    let url = url::Url::parse(raw).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(invalid());
    }
    Ok(url)
}
