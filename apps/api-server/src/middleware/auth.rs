//! Authentication extractors.

use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload, http::header, web};
use std::future::{Ready, ready};

use marker_core::domain::AuthClass;
use marker_core::ports::{AuthError, TokenClaims, TokenService};
use marker_shared::ErrorResponse;

use crate::state::AppState;

/// Authenticated caller identity.
///
/// Use this in handlers to require authentication:
/// ```ignore
/// async fn protected_route(identity: Identity) -> impl Responder {
///     format!("Hello, subject {}!", identity.subject_id)
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub subject_id: i64,
    pub auth_class: AuthClass,
}

impl From<TokenClaims> for Identity {
    fn from(claims: TokenClaims) -> Self {
        Self {
            subject_id: claims.subject_id,
            auth_class: claims.auth_class,
        }
    }
}

/// Error type for authentication failures.
#[derive(Debug)]
pub struct AuthenticationError(pub AuthError);

impl std::fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl actix_web::ResponseError for AuthenticationError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        actix_web::http::StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> actix_web::HttpResponse {
        let error = match &self.0 {
            AuthError::TokenExpired => ErrorResponse::new(401, "Token Expired")
                .with_detail("Your authentication token has expired. Please login again."),
            AuthError::InvalidToken(msg) => {
                ErrorResponse::new(401, "Invalid Token").with_detail(msg.clone())
            }
            AuthError::MissingAuth => ErrorResponse::new(401, "Authentication Required")
                .with_detail("Please provide a valid Bearer token in the Authorization header."),
        };

        actix_web::HttpResponse::build(self.status_code()).json(error)
    }
}

/// Resolve the caller from the `Authorization: Bearer <token>` header.
pub fn authenticate(
    req: &HttpRequest,
    tokens: &dyn TokenService,
) -> Result<Identity, AuthenticationError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthenticationError(AuthError::MissingAuth))?;

    let auth_str = auth_header.to_str().map_err(|_| {
        AuthenticationError(AuthError::InvalidToken(
            "Invalid authorization header".to_string(),
        ))
    })?;

    let token = auth_str.strip_prefix("Bearer ").ok_or_else(|| {
        AuthenticationError(AuthError::InvalidToken(
            "Expected Bearer token".to_string(),
        ))
    })?;

    tokens
        .validate_token(token)
        .map(Identity::from)
        .map_err(AuthenticationError)
}

impl FromRequest for Identity {
    type Error = AuthenticationError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        // Already resolved by the rate limit middleware
        if let Some(identity) = req.extensions().get::<Identity>() {
            return ready(Ok(*identity));
        }

        let state = match req.app_data::<web::Data<AppState>>() {
            Some(state) => state,
            None => {
                tracing::error!("AppState not found in app data");
                return ready(Err(AuthenticationError(AuthError::InvalidToken(
                    "Server configuration error".to_string(),
                ))));
            }
        };

        ready(authenticate(req, state.tokens.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{ResponseError, http::StatusCode, test::TestRequest};
    use marker_infra::{JwtConfig, JwtTokenService};

    fn tokens() -> JwtTokenService {
        JwtTokenService::new(JwtConfig {
            secret: "test-secret".to_string(),
            expiration_hours: 1,
            issuer: "test".to_string(),
        })
    }

    #[test]
    fn test_authenticate_resolves_identity() {
        let tokens = tokens();
        let token = tokens
            .generate_token(9, AuthClass::InteractiveSession)
            .unwrap();
        let req = TestRequest::default()
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_http_request();

        let identity = authenticate(&req, &tokens).unwrap();
        assert_eq!(identity.subject_id, 9);
        assert_eq!(identity.auth_class, AuthClass::InteractiveSession);
    }

    #[test]
    fn test_every_auth_failure_is_unauthorized() {
        let tokens = tokens();
        let requests = [
            TestRequest::default().to_http_request(),
            TestRequest::default()
                .insert_header(("Authorization", "Basic abc"))
                .to_http_request(),
            TestRequest::default()
                .insert_header(("Authorization", "Bearer not-a-jwt"))
                .to_http_request(),
        ];

        for req in requests {
            let err = authenticate(&req, &tokens).unwrap_err();
            assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
            assert_eq!(err.error_response().status(), StatusCode::UNAUTHORIZED);
        }
    }
}
