use axum::{
    Json,
    extract::{Path, RawQuery, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use studymate_auth_types::identity::Identity;
use studymate_domain::pagination::PageRequest;
use studymate_domain::user::UserRole;

use crate::domain::types::{ProfileUpdate, User};
use crate::error::StudyMateError;
use crate::handlers::{parse_query, require_admin};
use crate::state::AppState;
use crate::usecase::user::{
    CreateUserInput, CreateUserUseCase, DeleteStudentUseCase, GetUserUseCase,
    ListStudentsUseCase, UpdateProfileUseCase,
};

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            username: user.username,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            role: user.role,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

// ── GET /api/users/me ────────────────────────────────────────────────────────

pub async fn get_me(
    identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<UserResponse>, StudyMateError> {
    let usecase = GetUserUseCase {
        users: state.user_repo(),
    };
    let user = usecase.execute(identity.user_id).await?;
    Ok(Json(UserResponse::from(user)))
}

// ── PATCH /api/users/me ──────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

pub async fn update_me(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<UserResponse>, StudyMateError> {
    let usecase = UpdateProfileUseCase {
        users: state.user_repo(),
        sync: state.sync.clone(),
    };
    let user = usecase
        .execute(
            identity.user_id,
            ProfileUpdate {
                first_name: body.first_name,
                last_name: body.last_name,
                email: body.email,
            },
        )
        .await?;
    Ok(Json(UserResponse::from(user)))
}

// ── GET /api/admin/students ──────────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct StudentListQuery {
    pub search: Option<String>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

pub async fn list_students(
    identity: Identity,
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Vec<UserResponse>>, StudyMateError> {
    require_admin(&identity)?;
    let query: StudentListQuery = parse_query(raw_query)?;
    let usecase = ListStudentsUseCase {
        users: state.user_repo(),
    };
    let students = usecase
        .execute(query.search, PageRequest::new(query.per_page, query.page))
        .await?;
    Ok(Json(students.into_iter().map(UserResponse::from).collect()))
}

// ── POST /api/admin/students ─────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateStudentRequest {
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

pub async fn create_student(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<CreateStudentRequest>,
) -> Result<(StatusCode, Json<UserResponse>), StudyMateError> {
    require_admin(&identity)?;
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

// ── DELETE /api/admin/students/{id} ──────────────────────────────────────────

pub async fn delete_student(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StudyMateError> {
    require_admin(&identity)?;
    let usecase = DeleteStudentUseCase {
        users: state.user_repo(),
        materials: state.material_repo(),
        sync: state.sync.clone(),
    };
    usecase.execute(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
