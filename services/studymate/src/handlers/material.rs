use std::path::{Component, Path as FsPath, PathBuf};

use axum::{
    Json,
    extract::{Multipart, Path, RawQuery, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use studymate_auth_types::identity::Identity;
use studymate_domain::material::MaterialKind;
use studymate_domain::pagination::PageRequest;

use crate::domain::types::{
    DownloadTarget, FileUpload, MAX_UPLOAD_BYTES, MaterialDetail, MaterialFilter, MaterialUpdate,
};
use crate::error::StudyMateError;
use crate::handlers::{parse_query, require_admin, run_detached};
use crate::state::AppState;
use crate::usecase::material::{
    GetMaterialUseCase, ListMaterialsUseCase, ResolveDownloadUseCase, UpdateMaterialUseCase,
};
use crate::usecase::upload::NewMaterial;

#[derive(Serialize)]
pub struct MaterialResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub material_type: MaterialKind,
    pub file_url: Option<String>,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub file_format: Option<String>,
    pub subject: Uuid,
    pub subject_name: String,
    pub semester: Uuid,
    pub semester_name: String,
    pub year: Uuid,
    pub year_name: String,
    pub department: Option<Uuid>,
    pub department_name: Option<String>,
    pub uploaded_by: Option<Uuid>,
    pub uploaded_by_username: Option<String>,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(serialize_with = "studymate_core::serde::to_rfc3339_ms")]
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<MaterialDetail> for MaterialResponse {
    fn from(detail: MaterialDetail) -> Self {
        let file_url = detail.material.file_url();
        let MaterialDetail {
            material,
            hierarchy,
            uploaded_by_username,
        } = detail;
        let blob = material.blob;
        Self {
            id: material.id,
            title: material.title,
            description: material.description,
            material_type: material.kind,
            file_url,
            original_filename: blob.as_ref().map(|b| b.original_filename.clone()),
            file_size: blob.as_ref().map(|b| b.byte_size),
            file_format: blob.map(|b| b.format),
            subject: hierarchy.subject_id,
            subject_name: hierarchy.subject_name,
            semester: hierarchy.semester_id,
            semester_name: hierarchy.semester_name,
            year: hierarchy.year_id,
            year_name: hierarchy.year_name,
            department: hierarchy.department_id,
            department_name: hierarchy.department_name,
            uploaded_by: material.uploaded_by,
            uploaded_by_username,
            created_at: material.created_at,
            updated_at: material.updated_at,
        }
    }
}

// ── GET /api/student/materials ───────────────────────────────────────────────

#[derive(Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct MaterialListQuery {
    pub subject: Option<Uuid>,
    pub semester: Option<Uuid>,
    pub year: Option<Uuid>,
    pub department: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: Option<MaterialKind>,
    pub search: Option<String>,
    pub per_page: Option<u32>,
    pub page: Option<u32>,
}

pub async fn list_materials(
    _identity: Identity,
    State(state): State<AppState>,
    RawQuery(raw_query): RawQuery,
) -> Result<Json<Vec<MaterialResponse>>, StudyMateError> {
    let query: MaterialListQuery = parse_query(raw_query)?;
    let usecase = ListMaterialsUseCase {
        repo: state.material_repo(),
    };
    let materials = usecase
        .execute(
            MaterialFilter {
                subject_id: query.subject,
                semester_id: query.semester,
                year_id: query.year,
                department_id: query.department,
                kind: query.kind,
                search: query.search,
            },
            PageRequest::new(query.per_page, query.page),
        )
        .await?;
    Ok(Json(materials.into_iter().map(Into::into).collect()))
}

// ── GET /api/student/materials/{id} ──────────────────────────────────────────

pub async fn get_material(
    _identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MaterialResponse>, StudyMateError> {
    let usecase = GetMaterialUseCase {
        repo: state.material_repo(),
    };
    Ok(Json(usecase.execute(id).await?.into()))
}

// ── POST /api/admin/materials ────────────────────────────────────────────────

/// Fields of a multipart material form. Unknown fields are ignored.
#[derive(Default)]
struct MaterialForm {
    file: Option<(String, Bytes)>,
    subject: Option<String>,
    title: Option<String>,
    description: Option<String>,
    material_type: Option<String>,
}

impl MaterialForm {
    async fn read(mut multipart: Multipart) -> Result<Self, StudyMateError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };
            match name.as_str() {
                "file" => {
                    let filename = field.file_name().unwrap_or_default().to_owned();
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    form.file = Some((filename, bytes));
                }
                "subject" => form.subject = Some(field.text().await.map_err(multipart_error)?),
                "title" => form.title = Some(field.text().await.map_err(multipart_error)?),
                "description" => {
                    form.description = Some(field.text().await.map_err(multipart_error)?)
                }
                "material_type" => {
                    form.material_type = Some(field.text().await.map_err(multipart_error)?)
                }
                _ => {}
            }
        }
        Ok(form)
    }

    fn file_upload(&mut self) -> Result<FileUpload, StudyMateError> {
        let (filename, bytes) = self
            .file
            .take()
            .ok_or_else(|| StudyMateError::validation("file is required"))?;
        let declared_size = bytes.len() as u64;
        Ok(FileUpload::new(bytes, filename, declared_size))
    }
}

fn multipart_error(err: MultipartError) -> StudyMateError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StudyMateError::validation(format!(
            "file exceeds the {} MiB limit",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        ))
    } else {
        StudyMateError::validation(format!("invalid multipart body: {}", err.body_text()))
    }
}

fn parse_kind(raw: Option<String>) -> Result<MaterialKind, StudyMateError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(MaterialKind::default()),
        Some(value) => value
            .parse()
            .map_err(|e: studymate_domain::material::UnknownMaterialKind| {
                StudyMateError::validation(e.to_string())
            }),
    }
}

pub async fn create_material(
    identity: Identity,
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<MaterialResponse>), StudyMateError> {
    require_admin(&identity)?;
    let mut form = MaterialForm::read(multipart).await?;

    let subject_id = form
        .subject
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| StudyMateError::validation("subject is required"))?
        .parse::<Uuid>()
        .map_err(|_| StudyMateError::validation("subject must be a UUID"))?;
    let input = NewMaterial {
        subject_id,
        title: form.title.take().unwrap_or_default(),
        description: form.description.take().unwrap_or_default(),
        kind: parse_kind(form.material_type.take())?,
        uploaded_by: Some(identity.user_id),
    };
    let file = form.file_upload()?;

    let lifecycle = state.upload_lifecycle();
    let detail = run_detached(async move { lifecycle.attach_file(input, file).await }).await?;
    Ok((StatusCode::CREATED, Json(detail.into())))
}

// ── PATCH /api/admin/materials/{id} ──────────────────────────────────────────

#[derive(Deserialize)]
pub struct UpdateMaterialRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub material_type: Option<MaterialKind>,
}

pub async fn update_material(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateMaterialRequest>,
) -> Result<Json<MaterialResponse>, StudyMateError> {
    require_admin(&identity)?;
    let usecase = UpdateMaterialUseCase {
        repo: state.material_repo(),
        sync: state.sync.clone(),
    };
    let detail = usecase
        .execute(
            id,
            MaterialUpdate {
                title: body.title,
                description: body.description,
                kind: body.material_type,
            },
        )
        .await?;
    Ok(Json(detail.into()))
}

// ── PUT /api/admin/materials/{id}/file ───────────────────────────────────────

pub async fn replace_material_file(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    multipart: Multipart,
) -> Result<Json<MaterialResponse>, StudyMateError> {
    require_admin(&identity)?;
    let file = MaterialForm::read(multipart).await?.file_upload()?;

    let lifecycle = state.upload_lifecycle();
    let detail = run_detached(async move { lifecycle.replace_file(id, file).await }).await?;
    Ok(Json(detail.into()))
}

// ── DELETE /api/admin/materials/{id} ─────────────────────────────────────────

pub async fn delete_material(
    identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, StudyMateError> {
    require_admin(&identity)?;
    let lifecycle = state.upload_lifecycle();
    run_detached(async move { lifecycle.detach_file(id).await }).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── GET /api/student/materials/{id}/download ─────────────────────────────────

pub async fn download_material(
    _identity: Identity,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, StudyMateError> {
    let usecase = ResolveDownloadUseCase {
        repo: state.material_repo(),
    };
    match usecase.execute(id).await? {
        DownloadTarget::Redirect(url) => Ok(Redirect::to(&url).into_response()),
        DownloadTarget::LegacyFile(relative) => {
            let path = legacy_file_path(&state.media_root, &relative)?;
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(material_id = %id, path = %path.display(), "legacy file missing");
                    return Err(StudyMateError::FileNotFound);
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context("read legacy material file")
                        .into());
                }
            };
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("download");
            let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));
            Ok((
                [
                    (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                bytes,
            )
                .into_response())
        }
    }
}

/// Resolve a stored relative path under `media_root`. Anything but plain path
/// segments is rejected so a stored value cannot escape the media directory.
fn legacy_file_path(media_root: &FsPath, relative: &str) -> Result<PathBuf, StudyMateError> {
    let relative = FsPath::new(relative.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || !relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
    {
        return Err(StudyMateError::FileNotFound);
    }
    Ok(media_root.join(relative))
}
