use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use crate::admin;
use crate::state::ApiState;
use crate::webhook;

/// Builds the full router. CORS is wide open by design — this surface is
/// consumed by internal operator tooling, not browser clients with a
/// credentialed origin to protect.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/webhooks/stripe", post(webhook::stripe_webhook))
        .route("/v1/admin/capacity/:expertise_id/:zone", get(admin::get_capacity))
        .route("/v1/admin/corrections/:id", get(admin::get_correction))
        .route("/v1/admin/disputes/:id", get(admin::get_dispute))
        .route("/v1/admin/tasks/:id", get(admin::get_task))
        .layer(tower::ServiceBuilder::new().layer(cors))
        .with_state(state)
}
