//! Bearer-token identity extractor.

use std::sync::Arc;

use axum::extract::{FromRef, FromRequestParts};
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::{Authorization, HeaderMapExt};
use http::StatusCode;
use http::request::Parts;
use uuid::Uuid;

use studymate_domain::user::UserRole;

use crate::token::validate_access_token;

/// HMAC secret used to validate access tokens. Router state must expose it via `FromRef`.
#[derive(Clone)]
pub struct JwtSecret(pub Arc<str>);

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("JwtSecret(***)")
    }
}

/// Authenticated caller, taken from `Authorization: Bearer <access token>`.
///
/// Returns 401 if the header is absent, the token is invalid or expired, or the token is a
/// refresh token. Role enforcement (403) is done by handlers after extraction.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
    JwtSecret: FromRef<S>,
{
    type Rejection = StatusCode;

    // Extract synchronously and return a 'static future; `async fn` here trips E0195.
    fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let secret = JwtSecret::from_ref(state);
        let info = parts
            .headers
            .typed_get::<Authorization<Bearer>>()
            .ok_or(StatusCode::UNAUTHORIZED)
            .and_then(|auth| {
                validate_access_token(auth.token(), &secret.0)
                    .map_err(|_| StatusCode::UNAUTHORIZED)
            });

        async move {
            let info = info?;
            Ok(Self {
                user_id: info.user_id,
                role: info.role,
            })
        }
    }
}
