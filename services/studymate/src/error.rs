use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use studymate_core::retry::Transient;

/// StudyMate service error variants.
#[derive(Debug, thiserror::Error)]
pub enum StudyMateError {
    #[error("{0}")]
    Validation(String),
    #[error("username already taken")]
    UsernameTaken,
    #[error("email already registered")]
    EmailTaken,
    #[error("department already exists")]
    DepartmentExists,
    #[error("year already exists")]
    YearExists,
    #[error("semester already exists")]
    SemesterExists,
    #[error("user not found")]
    UserNotFound,
    #[error("department not found")]
    DepartmentNotFound,
    #[error("year not found")]
    YearNotFound,
    #[error("semester not found")]
    SemesterNotFound,
    #[error("subject not found")]
    SubjectNotFound,
    #[error("material not found")]
    MaterialNotFound,
    #[error("file not found")]
    FileNotFound,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token")]
    InvalidToken,
    #[error("forbidden")]
    Forbidden,
    #[error("upload failed: {0:#}")]
    UploadFailed(anyhow::Error),
    #[error("mirror store unavailable: {0:#}")]
    SyncDegraded(anyhow::Error),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl StudyMateError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::UsernameTaken => "USERNAME_TAKEN",
            Self::EmailTaken => "EMAIL_TAKEN",
            Self::DepartmentExists => "DEPARTMENT_EXISTS",
            Self::YearExists => "YEAR_EXISTS",
            Self::SemesterExists => "SEMESTER_EXISTS",
            Self::UserNotFound => "USER_NOT_FOUND",
            Self::DepartmentNotFound => "DEPARTMENT_NOT_FOUND",
            Self::YearNotFound => "YEAR_NOT_FOUND",
            Self::SemesterNotFound => "SEMESTER_NOT_FOUND",
            Self::SubjectNotFound => "SUBJECT_NOT_FOUND",
            Self::MaterialNotFound => "MATERIAL_NOT_FOUND",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::Forbidden => "FORBIDDEN",
            Self::UploadFailed(_) => "UPLOAD_FAILED",
            Self::SyncDegraded(_) => "SYNC_DEGRADED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl IntoResponse for StudyMateError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::UsernameTaken
            | Self::EmailTaken
            | Self::DepartmentExists
            | Self::YearExists
            | Self::SemesterExists => StatusCode::CONFLICT,
            Self::UserNotFound
            | Self::DepartmentNotFound
            | Self::YearNotFound
            | Self::SemesterNotFound
            | Self::SubjectNotFound
            | Self::MaterialNotFound
            | Self::FileNotFound => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::InvalidToken => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::UploadFailed(_) => StatusCode::BAD_GATEWAY,
            Self::SyncDegraded(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        // 4xx are already visible through TraceLayer; 5xx need the cause chain.
        if let Self::Internal(e) | Self::UploadFailed(e) | Self::SyncDegraded(e) = &self {
            tracing::error!(error = %format!("{e:#}"), kind = self.kind(), "request failed");
        }
        let body = serde_json::json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });
        (status, axum::Json(body)).into_response()
    }
}

/// Failure of an external collaborator (mirror store, object storage).
#[derive(Debug, thiserror::Error)]
pub enum ExternalError {
    /// Network-level or overload failure; worth retrying.
    #[error("transient: {0:#}")]
    Transient(anyhow::Error),
    /// Auth failure, quota, malformed payload. Retrying cannot help.
    #[error("{0:#}")]
    Permanent(anyhow::Error),
}

impl Transient for ExternalError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}
