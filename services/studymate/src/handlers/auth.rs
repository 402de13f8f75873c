use axum::{Json, extract::State, http::StatusCode};
use serde::{Deserialize, Serialize};

use studymate_domain::user::UserRole;

use crate::error::StudyMateError;
use crate::handlers::user::UserResponse;
use crate::state::AppState;
use crate::usecase::user::{
    CreateUserInput, CreateUserUseCase, LoginInput, LoginUseCase, RefreshTokenUseCase,
};

// ── POST /api/auth/register ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), StudyMateError> {
    let usecase = CreateUserUseCase {
        users: state.user_repo(),
        sync: state.sync.clone(),
    };
    let user = usecase
        .execute(CreateUserInput {
            username: body.username,
            email: body.email,
            password: body.password,
            first_name: body.first_name,
            last_name: body.last_name,
            role: UserRole::Student,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

// ── POST /api/token ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub access_exp: u64,
    pub user_id: String,
    pub username: String,
    pub role: UserRole,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StudyMateError> {
    let usecase = LoginUseCase {
        users: state.user_repo(),
        jwt_secret: state.jwt_secret.0.clone(),
    };
    let output = usecase
        .execute(LoginInput {
            login: body.username,
            password: body.password,
        })
        .await?;
    Ok(Json(LoginResponse {
        access: output.access_token,
        refresh: output.refresh_token,
        access_exp: output.access_token_exp,
        user_id: output.user.id.to_string(),
        username: output.user.username,
        role: output.user.role,
    }))
}

// ── POST /api/token/refresh ──────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Serialize)]
pub struct RefreshResponse {
    pub access: String,
    pub access_exp: u64,
}

pub async fn refresh_token(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, StudyMateError> {
    let usecase = RefreshTokenUseCase {
        users: state.user_repo(),
        jwt_secret: state.jwt_secret.0.clone(),
    };
    let output = usecase.execute(&body.refresh).await?;
    Ok(Json(RefreshResponse {
        access: output.access_token,
        access_exp: output.access_token_exp,
    }))
}
