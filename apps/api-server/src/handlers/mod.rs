//! HTTP handlers and route configuration.

mod health;
mod limits;

use actix_web::web;

use crate::middleware::error::{AppError, AppResult};
use crate::middleware::rate_limit::RateLimitMiddleware;
use crate::state::AppState;

/// Configure all application routes.
pub fn configure_routes(cfg: &mut web::ServiceConfig, state: &AppState) {
    cfg
        // Public routes
        .route("/health", web::get().to(health::health_check))
        // Authenticated, rate-limited routes
        .service(
            web::scope("")
                .wrap(RateLimitMiddleware::new(
                    state.limiter.clone(),
                    state.tokens.clone(),
                ))
                .route("/limits", web::get().to(limits::list_limits))
                .default_service(web::to(not_found)),
        );
}

async fn not_found(req: actix_web::HttpRequest) -> AppResult<actix_web::HttpResponse> {
    Err(AppError::NotFound(format!("No route for {}", req.path())))
}
