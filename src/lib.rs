//! hitl-relay — human-in-the-loop approval relay.
//!
//! A workflow engine registers a pending decision with a callback URL, a
//! human answers it through the dashboard, and the relay posts the answer
//! back to the callback to resume the workflow.

use std::sync::Arc;

pub mod api;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod models;
pub mod sandbox;
pub mod store;
pub mod validation;

/// Shared application state passed to handlers and middleware.
pub struct AppState {
    pub store: Arc<store::ApprovalStore>,
    pub captures: sandbox::CaptureRegistry,
    pub dispatcher: dispatch::Dispatcher,
    pub config: config::Config,
}

impl AppState {
    pub fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self {
            store: Arc::new(store::ApprovalStore::new()),
            captures: sandbox::CaptureRegistry::new(),
            dispatcher: dispatch::Dispatcher::new(config.delivery_timeout)?,
            config,
        }))
    }
}
