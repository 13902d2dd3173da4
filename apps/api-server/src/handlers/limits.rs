//! Rate limit introspection.

use actix_web::{HttpResponse, web};
use marker_shared::ApiResponse;
use marker_shared::dto::{LimitTier, LimitsResponse};

use crate::middleware::auth::Identity;
use crate::state::AppState;

/// Tiers that apply to the caller's credential.
///
/// GET /limits
pub async fn list_limits(state: web::Data<AppState>, identity: Identity) -> HttpResponse {
    let tiers = state
        .limits
        .for_auth_class(identity.auth_class)
        .into_iter()
        .map(|(operation, policy)| LimitTier {
            operation: operation.as_str().to_string(),
            requests_per_minute: policy.requests_per_minute,
            requests_per_day: policy.requests_per_day,
        })
        .collect();

    HttpResponse::Ok().json(ApiResponse::ok(LimitsResponse {
        auth_class: identity.auth_class.as_str().to_string(),
        tiers,
    }))
}
