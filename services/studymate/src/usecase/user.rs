use std::sync::Arc;

use anyhow::Context as _;
use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use studymate_auth_types::token::{TokenType, issue_token, validate_refresh_token};
use studymate_domain::pagination::PageRequest;
use studymate_domain::user::UserRole;

use crate::domain::projection::{EntityKind, SyncOp};
use crate::domain::repository::{MaterialRepository, Projector, UserRepository};
use crate::domain::types::{
    MaterialScope, ProfileUpdate, User, validate_email, validate_password, validate_username,
};
use crate::error::StudyMateError;

// ── Password hashing ─────────────────────────────────────────────────────────

/// Argon2id PHC string with a random salt. CPU-bound; runs on the blocking pool.
pub async fn hash_password(password: String) -> Result<String, StudyMateError> {
    let hash = tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| anyhow::anyhow!("hash password: {e}"))
    })
    .await
    .context("join password hasher")??;
    Ok(hash)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, StudyMateError> {
    let ok = tokio::task::spawn_blocking(move || {
        PasswordHash::new(&hash)
            .map(|parsed| {
                Argon2::default()
                    .verify_password(password.as_bytes(), &parsed)
                    .is_ok()
            })
            .unwrap_or(false)
    })
    .await
    .context("join password verifier")?;
    Ok(ok)
}

// ── CreateUser (register / admin-provisioned student / admin) ────────────────

pub struct CreateUserInput {
    pub username: String,
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub role: UserRole,
}

pub struct CreateUserUseCase<R: UserRepository, P: Projector> {
    pub users: R,
    pub sync: P,
}

impl<R: UserRepository, P: Projector> CreateUserUseCase<R, P> {
    pub async fn execute(&self, input: CreateUserInput) -> Result<User, StudyMateError> {
        create_user(&self.users, &self.sync, input).await
    }
}

async fn create_user<R: UserRepository, P: Projector>(
    users: &R,
    sync: &P,
    input: CreateUserInput,
) -> Result<User, StudyMateError> {
    let username = input.username.trim().to_owned();
    let email = input.email.trim().to_owned();
    if username.is_empty() || email.is_empty() || input.password.is_empty() {
        return Err(StudyMateError::validation(
            "username, email and password are required",
        ));
    }
    if !validate_username(&username) {
        return Err(StudyMateError::validation(
            "username may contain only letters, digits and @/./+/-/_ (max 150)",
        ));
    }
    if !validate_email(&email) {
        return Err(StudyMateError::validation("invalid email format"));
    }
    if !validate_password(&input.password) {
        return Err(StudyMateError::validation(
            "password must be at least 6 characters long",
        ));
    }
    if users.find_by_username(&username).await?.is_some() {
        return Err(StudyMateError::UsernameTaken);
    }
    if users.find_by_email(&email).await?.is_some() {
        return Err(StudyMateError::EmailTaken);
    }

    let now = Utc::now();
    let user = User {
        id: Uuid::now_v7(),
        username,
        email,
        first_name: input.first_name.trim().to_owned(),
        last_name: input.last_name.trim().to_owned(),
        password_hash: hash_password(input.password).await?,
        role: input.role,
        created_at: now,
        updated_at: now,
    };
    users.create(&user).await?;
    info!(user_id = %user.id, role = %user.role, "user created");

    sync.project(EntityKind::User, user.id, SyncOp::Upsert)
        .await;
    Ok(user)
}

// ── Login ────────────────────────────────────────────────────────────────────

pub struct LoginInput {
    /// Username, or email as a fallback.
    pub login: String,
    pub password: String,
}

#[derive(Debug)]
pub struct LoginOutput {
    pub user: User,
    pub access_token: String,
    pub access_token_exp: u64,
    pub refresh_token: String,
}

pub struct LoginUseCase<R: UserRepository> {
    pub users: R,
    pub jwt_secret: Arc<str>,
}

impl<R: UserRepository> LoginUseCase<R> {
    pub async fn execute(&self, input: LoginInput) -> Result<LoginOutput, StudyMateError> {
        let login = input.login.trim();
        if login.is_empty() || input.password.is_empty() {
            return Err(StudyMateError::validation(
                "username and password are required",
            ));
        }
        let user = match self.users.find_by_username(login).await? {
            Some(user) => Some(user),
            None => self.users.find_by_email(login).await?,
        }
        .ok_or(StudyMateError::InvalidCredentials)?;

        if !verify_password(input.password, user.password_hash.clone()).await? {
            return Err(StudyMateError::InvalidCredentials);
        }

        let (access_token, access_token_exp) =
            issue_token(user.id, user.role, TokenType::Access, &self.jwt_secret)
                .context("issue access token")?;
        let (refresh_token, _) =
            issue_token(user.id, user.role, TokenType::Refresh, &self.jwt_secret)
                .context("issue refresh token")?;

        Ok(LoginOutput {
            user,
            access_token,
            access_token_exp,
            refresh_token,
        })
    }
}

// ── RefreshToken ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct RefreshTokenOutput {
    pub access_token: String,
    pub access_token_exp: u64,
}

pub struct RefreshTokenUseCase<R: UserRepository> {
    pub users: R,
    pub jwt_secret: Arc<str>,
}

impl<R: UserRepository> RefreshTokenUseCase<R> {
    pub async fn execute(&self, refresh_token: &str) -> Result<RefreshTokenOutput, StudyMateError> {
        let info = validate_refresh_token(refresh_token, &self.jwt_secret)
            .map_err(|_| StudyMateError::InvalidToken)?;

        // Deleted users cannot refresh.
        let user = self
            .users
            .find_by_id(info.user_id)
            .await?
            .ok_or(StudyMateError::InvalidToken)?;

        let (access_token, access_token_exp) =
            issue_token(user.id, user.role, TokenType::Access, &self.jwt_secret)
                .context("issue access token")?;
        Ok(RefreshTokenOutput {
            access_token,
            access_token_exp,
        })
    }
}

// ── GetUser ──────────────────────────────────────────────────────────────────

pub struct GetUserUseCase<R: UserRepository> {
    pub users: R,
}

impl<R: UserRepository> GetUserUseCase<R> {
    pub async fn execute(&self, user_id: Uuid) -> Result<User, StudyMateError> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(StudyMateError::UserNotFound)
    }
}

// ── UpdateProfile ────────────────────────────────────────────────────────────

pub struct UpdateProfileUseCase<R: UserRepository, P: Projector> {
    pub users: R,
    pub sync: P,
}

impl<R: UserRepository, P: Projector> UpdateProfileUseCase<R, P> {
    pub async fn execute(
        &self,
        user_id: Uuid,
        mut update: ProfileUpdate,
    ) -> Result<User, StudyMateError> {
        if update.is_empty() {
            return Err(StudyMateError::validation("nothing to update"));
        }
        if let Some(email) = update.email.as_mut() {
            *email = email.trim().to_owned();
            if !validate_email(email) {
                return Err(StudyMateError::validation("invalid email format"));
            }
            if let Some(owner) = self.users.find_by_email(email).await? {
                if owner.id != user_id {
                    return Err(StudyMateError::EmailTaken);
                }
            }
        }

        let user = self
            .users
            .update_profile(user_id, &update)
            .await?
            .ok_or(StudyMateError::UserNotFound)?;

        self.sync
            .project(EntityKind::User, user.id, SyncOp::Upsert)
            .await;
        Ok(user)
    }
}

// ── ListStudents ─────────────────────────────────────────────────────────────

pub struct ListStudentsUseCase<R: UserRepository> {
    pub users: R,
}

impl<R: UserRepository> ListStudentsUseCase<R> {
    pub async fn execute(
        &self,
        search: Option<String>,
        page: PageRequest,
    ) -> Result<Vec<User>, StudyMateError> {
        let search = search.map(|s| s.trim().to_owned()).filter(|s| !s.is_empty());
        self.users.list_students(search.as_deref(), page).await
    }
}

// ── DeleteStudent ────────────────────────────────────────────────────────────

pub struct DeleteStudentUseCase<R: UserRepository, M: MaterialRepository, P: Projector> {
    pub users: R,
    pub materials: M,
    pub sync: P,
}

impl<R: UserRepository, M: MaterialRepository, P: Projector> DeleteStudentUseCase<R, M, P> {
    /// Materials the student uploaded survive with no uploader and are re-projected.
    pub async fn execute(&self, user_id: Uuid) -> Result<(), StudyMateError> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .filter(|u| u.role == UserRole::Student)
            .ok_or(StudyMateError::UserNotFound)?;

        let uploaded = self
            .materials
            .list_in_scope(MaterialScope::Uploader(user.id))
            .await?;

        if !self.users.delete(user.id).await? {
            return Err(StudyMateError::UserNotFound);
        }
        info!(user_id = %user.id, "student deleted");

        self.sync
            .project(EntityKind::User, user.id, SyncOp::Delete)
            .await;
        for material in uploaded {
            self.sync
                .project(EntityKind::Material, material.id, SyncOp::Upsert)
                .await;
        }
        Ok(())
    }
}

// ── ProvisionAdmin (CLI) ─────────────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
pub enum ProvisionOutcome {
    Created(Uuid),
    AlreadyExists,
}

pub struct ProvisionAdminUseCase<R: UserRepository, P: Projector> {
    pub users: R,
    pub sync: P,
}

impl<R: UserRepository, P: Projector> ProvisionAdminUseCase<R, P> {
    /// Idempotent: an existing username is left untouched; a taken email is refused.
    pub async fn execute(&self, input: CreateUserInput) -> Result<ProvisionOutcome, StudyMateError> {
        if self.users.find_by_username(input.username.trim()).await?.is_some() {
            return Ok(ProvisionOutcome::AlreadyExists);
        }
        let input = CreateUserInput {
            role: UserRole::Admin,
            ..input
        };
        let user = create_user(&self.users, &self.sync, input).await?;
        Ok(ProvisionOutcome::Created(user.id))
    }
}
