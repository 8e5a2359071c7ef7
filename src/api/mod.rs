use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Router,
};

use crate::AppState;

pub mod auth;
pub mod handlers;
pub mod sandbox;

/// Build the relay router.
///
/// Only registration sits behind the shared-secret gate; the dashboard and
/// sandbox routes are open.
pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/webhook/register", post(handlers::register_approval))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ));

    Router::new()
        .merge(protected)
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/approvals", get(handlers::list_approvals))
        .route("/api/approvals/clear", delete(handlers::clear_approvals))
        .route("/api/approvals/:id", get(handlers::get_approval))
        .route("/api/approve/:id", post(handlers::decide_approval))
        .route("/test/create", post(sandbox::create_test_approval))
        .route(
            "/test/webhook/:id",
            get(sandbox::get_test_webhook).post(sandbox::receive_test_webhook),
        )
        .fallback(fallback_404)
        .with_state(state)
}

async fn fallback_404() -> StatusCode {
    StatusCode::NOT_FOUND
}
