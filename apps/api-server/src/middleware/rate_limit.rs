//! Rate limiting middleware.
//!
//! Resolves the caller, classifies the request, asks the limiter for a
//! decision and maps it onto `X-RateLimit-*` headers or a 429 response.

use actix_web::{
    Error, HttpMessage,
    body::EitherBody,
    dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
    http::header::{HeaderName, HeaderValue},
};
use futures::future::LocalBoxFuture;
use std::future::{Ready, ready};
use std::rc::Rc;
use std::sync::Arc;

use marker_core::domain::{AuthClass, OperationClass, QuotaDecision, classify};
use marker_core::ports::{RateLimiter, TokenService};

use super::auth::authenticate;
use super::error::AppError;

/// Header pairs describing the reported window.
pub fn rate_limit_headers(decision: &QuotaDecision) -> [(&'static str, String); 3] {
    [
        ("X-RateLimit-Limit", decision.limit.to_string()),
        ("X-RateLimit-Remaining", decision.remaining.to_string()),
        ("X-RateLimit-Reset", decision.reset_epoch_seconds.to_string()),
    ]
}

/// Rate limiting middleware factory.
pub struct RateLimitMiddleware {
    limiter: Arc<dyn RateLimiter>,
    tokens: Arc<dyn TokenService>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<dyn RateLimiter>, tokens: Arc<dyn TokenService>) -> Self {
        Self { limiter, tokens }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimitMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Transform = RateLimitMiddlewareService<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddlewareService {
            service: Rc::new(service),
            limiter: self.limiter.clone(),
            tokens: self.tokens.clone(),
        }))
    }
}

pub struct RateLimitMiddlewareService<S> {
    service: Rc<S>,
    limiter: Arc<dyn RateLimiter>,
    tokens: Arc<dyn TokenService>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        let limiter = self.limiter.clone();
        let tokens = self.tokens.clone();

        Box::pin(async move {
            let identity = match authenticate(req.request(), tokens.as_ref()) {
                Ok(identity) => identity,
                Err(e) => return Ok(req.error_response(e).map_into_right_body()),
            };

            let operation = classify(req.method().as_str(), req.path());

            // Personal tokens never reach sensitive endpoints; no tier exists for them.
            if identity.auth_class == AuthClass::PersonalToken
                && operation == OperationClass::Sensitive
            {
                tracing::info!(
                    subject_id = identity.subject_id,
                    path = %req.path(),
                    "Personal token rejected on sensitive endpoint"
                );
                let err = AppError::Forbidden(
                    "This endpoint requires an interactive session. Personal access tokens are not accepted."
                        .to_string(),
                );
                return Ok(req.error_response(err).map_into_right_body());
            }

            let decision = limiter
                .check(identity.subject_id, identity.auth_class, operation)
                .await;

            if !decision.allowed {
                return Ok(req
                    .error_response(AppError::RateLimited(decision))
                    .map_into_right_body());
            }

            req.extensions_mut().insert(identity);
            req.extensions_mut().insert(decision);

            let mut res = service.call(req).await?;
            for (name, value) in rate_limit_headers(&decision) {
                if let (Ok(name), Ok(value)) = (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(&value),
                ) {
                    res.headers_mut().insert(name, value);
                }
            }

            Ok(res.map_into_left_body())
        })
    }
}
