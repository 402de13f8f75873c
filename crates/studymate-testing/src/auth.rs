//! Mock auth helpers for integration tests.
//!
//! Signs real access tokens with a test secret so requests pass through the
//! `Identity` extractor exactly as they would in production.

use axum::http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use uuid::Uuid;

use studymate_auth_types::token::{TokenType, issue_token};
use studymate_domain::user::UserRole;

/// Secret shared by `MockAuth` and the test router state.
pub const TEST_JWT_SECRET: &str = "studymate-test-secret";

/// Configurable identity attached to test requests.
pub struct MockAuth {
    pub user_id: Uuid,
    pub role: UserRole,
}

impl MockAuth {
    pub fn new(user_id: Uuid, role: UserRole) -> Self {
        Self { user_id, role }
    }

    pub fn admin() -> Self {
        Self::new(Uuid::now_v7(), UserRole::Admin)
    }

    pub fn student() -> Self {
        Self::new(Uuid::now_v7(), UserRole::Student)
    }

    /// A signed access token for this identity.
    pub fn access_token(&self) -> String {
        let (token, _) =
            issue_token(self.user_id, self.role, TokenType::Access, TEST_JWT_SECRET).unwrap();
        token
    }

    /// `Authorization: Bearer …` value.
    pub fn bearer(&self) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", self.access_token())).unwrap()
    }

    pub fn headers(&self) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(AUTHORIZATION, self.bearer());
        map
    }
}
