use axum::{
    Json,
    extract::{Path, RawQuery, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use studymate_auth_types::identity::Identity;

use crate::domain::types::{
    Department, SemesterDetail, SemesterFilter, SubjectDetail, SubjectFilter, Year,
};
use crate::error::StudyMateError;
use crate::handlers::{parse_query, require_admin};
use crate::state::AppState;
use crate::usecase::academic::{
    CreateDepartmentInput, CreateDepartmentUseCase, CreateSemesterInput, CreateSemesterUseCase,
    CreateSubjectInput, CreateSubjectUseCase, CreateYearInput, CreateYearUseCase,
    DeleteDepartmentUseCase, DeleteSemesterUseCase, DeleteSubjectUseCase, DeleteYearUseCase,
    GetDepartmentUseCase, GetSemesterUseCase, GetSubjectUseCase, GetYearUseCase,
    ListDepartmentsUseCase, ListSemestersUseCase, ListSubjectsUseCase, ListYearsUseCase,
};

// ── Response types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct DepartmentResponse {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Department> for DepartmentResponse {
    fn from(d: Department) -> Self {
        Self {
            id: d.id,
            name: d.name,
            code: d.code,
            created_at: d.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct YearResponse {
    pub id: Uuid,
    pub name: String,
    pub number: i32,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<Year> for YearResponse {
    fn from(y: Year) -> Self {
        Self {
            id: y.id,
            name: y.name,
            number: y.number,
            created_at: y.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct SemesterResponse {
    pub id: Uuid,
    pub name: String,
    pub number: i32,
    pub department: Option<Uuid>,
    pub department_name: Option<String>,
    pub year: Uuid,
    pub year_name: String,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<SemesterDetail> for SemesterResponse {
    fn from(detail: SemesterDetail) -> Self {
        let s = detail.semester;
        Self {
            id: s.id,
            name: s.name,
            number: s.number,
            department: s.department_id,
            department_name: detail.department_name,
            year: s.year_id,
            year_name: detail.year_name,
            created_at: s.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct SubjectResponse {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub semester: Uuid,
    pub semester_name: String,
    pub semester_number: i32,
    pub year_name: String,
    pub department_name: Option<String>,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<SubjectDetail> for SubjectResponse {
    fn from(detail: SubjectDetail) -> Self {
        let s = detail.subject;
        Self {
            id: s.id,
            name: s.name,
            code: s.code,
            semester: s.semester_id,
            semester_name: detail.semester_name,
            semester_number: detail.semester_number,
            year_name: detail.year_name,
            department_name: detail.department_name,
            created_at: s.created_at,
        }
    }
}

// ── Departments ──────────────────────────────────────────────────────────────

pub async fn list_departments(
    _identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<Vec<DepartmentResponse>>, StudyMateError> {
    let usecase = ListDepartmentsUseCase {
        repo: state.department_repo(),
    };
    let departments = usecase.execute().await?;
    Ok(Json(departments.into_iter().map(Into::into).collect()))
}

pub async fn get_department(
    _identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<DepartmentResponse>, StudyMateError> {
    let usecase = GetDepartmentUseCase {
        repo: state.department_repo(),
    };
    Ok(Json(usecase.execute(id).await?.into()))
}

#[derive(Deserialize)]
pub struct CreateDepartmentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: String,
}

pub async fn create_department(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<CreateDepartmentRequest>,
) -> Result<(StatusCode, Json<DepartmentResponse>), StudyMateError> {
    require_admin(&identity)?;
    let usecase = CreateDepartmentUseCase {
        repo: state.department_repo(),
    };
    let department = usecase
        .execute(CreateDepartmentInput {
            name: body.name,
            code: body.code,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(department.into())))
}

pub async fn delete_department(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StudyMateError> {
    require_admin(&identity)?;
    let usecase = DeleteDepartmentUseCase {
        repo: state.department_repo(),
        cleanup: state.cascade_cleanup(),
    };
    usecase.execute(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Years ────────────────────────────────────────────────────────────────────

pub async fn list_years(
    _identity: Identity,
    State(state): State<AppState>,
) -> Result<Json<Vec<YearResponse>>, StudyMateError> {
    let usecase = ListYearsUseCase {
        repo: state.year_repo(),
    };
    let years = usecase.execute().await?;
    Ok(Json(years.into_iter().map(Into::into).collect()))
}

pub async fn get_year(
    _identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<YearResponse>, StudyMateError> {
    let usecase = GetYearUseCase {
        repo: state.year_repo(),
    };
    Ok(Json(usecase.execute(id).await?.into()))
}

#[derive(Deserialize)]
pub struct CreateYearRequest {
    #[serde(default)]
    pub name: String,
    pub number: i32,
}

pub async fn create_year(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<CreateYearRequest>,
) -> Result<(StatusCode, Json<YearResponse>), StudyMateError> {
    require_admin(&identity)?;
    let usecase = CreateYearUseCase {
        repo: state.year_repo(),
    };
    let year = usecase
        .execute(CreateYearInput {
            name: body.name,
            number: body.number,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(year.into())))
}

pub async fn delete_year(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StudyMateError> {
    require_admin(&identity)?;
    let usecase = DeleteYearUseCase {
        repo: state.year_repo(),
        cleanup: state.cascade_cleanup(),
    };
    usecase.execute(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Semesters ────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct SemesterListQuery {
    pub department: Option<Uuid>,
    pub year: Option<Uuid>,
}

pub async fn list_semesters(
    _identity: Identity,
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Vec<SemesterResponse>>, StudyMateError> {
    let query: SemesterListQuery = parse_query(raw_query)?;
    let usecase = ListSemestersUseCase {
        repo: state.semester_repo(),
    };
    let semesters = usecase
        .execute(SemesterFilter {
            department_id: query.department,
            year_id: query.year,
        })
        .await?;
    Ok(Json(semesters.into_iter().map(Into::into).collect()))
}

pub async fn get_semester(
    _identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SemesterResponse>, StudyMateError> {
    let usecase = GetSemesterUseCase {
        repo: state.semester_repo(),
    };
    Ok(Json(usecase.execute(id).await?.into()))
}

#[derive(Deserialize)]
pub struct CreateSemesterRequest {
    pub department: Option<Uuid>,
    pub year: Uuid,
    pub number: i32,
    pub name: Option<String>,
}

pub async fn create_semester(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<CreateSemesterRequest>,
) -> Result<(StatusCode, Json<SemesterResponse>), StudyMateError> {
    require_admin(&identity)?;
    let usecase = CreateSemesterUseCase {
        repo: state.semester_repo(),
        departments: state.department_repo(),
        years: state.year_repo(),
    };
    let semester = usecase
        .execute(CreateSemesterInput {
            department_id: body.department,
            year_id: body.year,
            number: body.number,
            name: body.name,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(semester.into())))
}

pub async fn delete_semester(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StudyMateError> {
    require_admin(&identity)?;
    let usecase = DeleteSemesterUseCase {
        repo: state.semester_repo(),
        cleanup: state.cascade_cleanup(),
    };
    usecase.execute(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Subjects ─────────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
pub struct SubjectListQuery {
    pub semester: Option<Uuid>,
    pub department: Option<Uuid>,
    pub year: Option<Uuid>,
    pub search: Option<String>,
}

pub async fn list_subjects(
    _identity: Identity,
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Vec<SubjectResponse>>, StudyMateError> {
    let query: SubjectListQuery = parse_query(raw_query)?;
    let usecase = ListSubjectsUseCase {
        repo: state.subject_repo(),
    };
    let subjects = usecase
        .execute(SubjectFilter {
            semester_id: query.semester,
            department_id: query.department,
            year_id: query.year,
            search: query.search,
        })
        .await?;
    Ok(Json(subjects.into_iter().map(Into::into).collect()))
}

pub async fn get_subject(
    _identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SubjectResponse>, StudyMateError> {
    let usecase = GetSubjectUseCase {
        repo: state.subject_repo(),
    };
    Ok(Json(usecase.execute(id).await?.into()))
}

#[derive(Deserialize)]
pub struct CreateSubjectRequest {
    pub semester: Uuid,
    #[serde(default)]
    pub name: String,
    pub code: Option<String>,
}

pub async fn create_subject(
    identity: Identity,
    State(state): State<AppState>,
    Json(body): Json<CreateSubjectRequest>,
) -> Result<(StatusCode, Json<SubjectResponse>), StudyMateError> {
    require_admin(&identity)?;
    let usecase = CreateSubjectUseCase {
        repo: state.subject_repo(),
        semesters: state.semester_repo(),
    };
    let subject = usecase
        .execute(CreateSubjectInput {
            semester_id: body.semester,
            name: body.name,
            code: body.code,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(subject.into())))
}

pub async fn delete_subject(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StudyMateError> {
    require_admin(&identity)?;
    let usecase = DeleteSubjectUseCase {
        repo: state.subject_repo(),
        cleanup: state.cascade_cleanup(),
    };
    usecase.execute(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
