//! Health check endpoint.

use actix_web::{HttpResponse, web};
use marker_shared::dto::HealthResponse;

use crate::state::AppState;

/// Health check endpoint - returns server status.
///
/// An unreachable counter store reports `degraded`, not a failure: requests
/// are still served, only quota enforcement is suspended.
///
/// GET /health
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let store_up = state.store.ping().await;

    let response = HealthResponse {
        status: if store_up { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        store: if store_up { "connected" } else { "unavailable" }.to_string(),
    };

    HttpResponse::Ok().json(response)
}
