use std::io::{Cursor, Seek, SeekFrom};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use studymate_domain::material::MaterialKind;
use studymate_domain::user::UserRole;

use crate::error::StudyMateError;

/// Hard upper bound for an uploaded material file (10 MiB).
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Account. `password_hash` is an Argon2 PHC string and never leaves the entity store.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.first_name.is_none() && self.last_name.is_none() && self.email.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Department {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Year {
    pub id: Uuid,
    pub name: String,
    pub number: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Semester {
    pub id: Uuid,
    pub department_id: Option<Uuid>,
    pub year_id: Uuid,
    pub name: String,
    pub number: i32,
    pub created_at: DateTime<Utc>,
}

/// Semester with its parents' names.
#[derive(Debug, Clone)]
pub struct SemesterDetail {
    pub semester: Semester,
    pub department_name: Option<String>,
    pub year_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct SemesterFilter {
    pub department_id: Option<Uuid>,
    pub year_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Subject {
    pub id: Uuid,
    pub semester_id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Subject with its parents' names.
#[derive(Debug, Clone)]
pub struct SubjectDetail {
    pub subject: Subject,
    pub semester_name: String,
    pub semester_number: i32,
    pub year_name: String,
    pub department_name: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    pub semester_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub year_id: Option<Uuid>,
    pub search: Option<String>,
}

/// Reference to an uploaded object in object storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobRef {
    pub object_id: String,
    pub url: String,
    pub secure_url: String,
    pub original_filename: String,
    pub byte_size: i64,
    pub format: String,
}

/// A study material. `blob` is all-or-nothing: a row with only some blob columns set
/// reads back as `None`.
#[derive(Debug, Clone)]
pub struct StudyMaterial {
    pub id: Uuid,
    pub subject_id: Uuid,
    pub title: String,
    pub description: String,
    pub kind: MaterialKind,
    pub uploaded_by: Option<Uuid>,
    pub blob: Option<BlobRef>,
    pub legacy_file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a download request should be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    Redirect(String),
    LegacyFile(String),
}

impl StudyMaterial {
    /// Secure URL, then plain URL, then the legacy local file.
    pub fn download_target(&self) -> Option<DownloadTarget> {
        let blob_url = self.blob.as_ref().and_then(|blob| {
            [&blob.secure_url, &blob.url]
                .into_iter()
                .find(|url| !url.is_empty())
                .cloned()
        });
        if let Some(url) = blob_url {
            return Some(DownloadTarget::Redirect(url));
        }
        self.legacy_file_path
            .as_ref()
            .filter(|path| !path.is_empty())
            .map(|path| DownloadTarget::LegacyFile(path.clone()))
    }

    /// Public URL for API responses. Legacy files are served under `/media/`.
    pub fn file_url(&self) -> Option<String> {
        self.download_target().map(|target| match target {
            DownloadTarget::Redirect(url) => url,
            DownloadTarget::LegacyFile(path) => format!("/media/{}", path.trim_start_matches('/')),
        })
    }
}

/// Subject → semester → year / department chain of a material.
#[derive(Debug, Clone)]
pub struct MaterialHierarchy {
    pub subject_id: Uuid,
    pub subject_name: String,
    pub semester_id: Uuid,
    pub semester_name: String,
    pub semester_number: i32,
    pub year_id: Uuid,
    pub year_name: String,
    pub department_id: Option<Uuid>,
    pub department_name: Option<String>,
}

impl MaterialHierarchy {
    /// Storage folder for organizing uploads: `studymate/materials/{dept}/{year}/semester_{n}/{subject}`.
    ///
    /// Not unique per material; object names are made unique by the storage provider.
    pub fn storage_folder(&self) -> String {
        let department = self
            .department_name
            .as_deref()
            .map(folder_segment)
            .unwrap_or_else(|| "general".to_owned());
        format!(
            "studymate/materials/{}/{}/semester_{}/{}",
            department,
            folder_segment(&self.year_name),
            self.semester_number,
            folder_segment(&self.subject_name),
        )
    }
}

fn folder_segment(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_whitespace() || c == '/' { '_' } else { c })
        .collect()
}

/// Material joined with its hierarchy and uploader name.
#[derive(Debug, Clone)]
pub struct MaterialDetail {
    pub material: StudyMaterial,
    pub hierarchy: MaterialHierarchy,
    pub uploaded_by_username: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialFilter {
    pub subject_id: Option<Uuid>,
    pub semester_id: Option<Uuid>,
    pub year_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub kind: Option<MaterialKind>,
    /// Case-insensitive substring over title, description and subject name.
    pub search: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MaterialUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: Option<MaterialKind>,
}

impl MaterialUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.kind.is_none()
    }
}

/// Set of materials that disappear together with a parent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialScope {
    Department(Uuid),
    Year(Uuid),
    Semester(Uuid),
    Subject(Uuid),
    Uploader(Uuid),
}

/// An uploaded file held in memory until it is sent to object storage.
///
/// The cursor is rewound before every size check and every upload attempt, so a reader
/// that advanced it earlier cannot truncate what gets validated or sent.
#[derive(Debug)]
pub struct FileUpload {
    cursor: Cursor<Bytes>,
    filename: String,
    declared_size: u64,
}

impl FileUpload {
    pub fn new(bytes: Bytes, filename: impl Into<String>, declared_size: u64) -> Self {
        Self {
            cursor: Cursor::new(bytes),
            filename: filename.into(),
            declared_size,
        }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn declared_size(&self) -> u64 {
        self.declared_size
    }

    /// Mutable access to the underlying reader.
    pub fn reader(&mut self) -> &mut Cursor<Bytes> {
        &mut self.cursor
    }

    fn rewind(&mut self) {
        // Seeking a Cursor to an absolute position cannot fail.
        let _ = self.cursor.seek(SeekFrom::Start(0));
    }

    /// Bytes from the start of the payload.
    pub fn payload(&mut self) -> Bytes {
        self.rewind();
        let start = usize::try_from(self.cursor.position()).unwrap_or_default();
        self.cursor.get_ref().slice(start..)
    }

    /// Reject empty, oversized or size-mismatched payloads.
    pub fn validate(&mut self) -> Result<(), StudyMateError> {
        if self.filename.trim().is_empty() {
            return Err(StudyMateError::validation("file name is required"));
        }
        if self.declared_size == 0 {
            return Err(StudyMateError::validation("file is empty"));
        }
        if self.declared_size > MAX_UPLOAD_BYTES {
            return Err(StudyMateError::validation(format!(
                "file exceeds the {} MiB limit",
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }
        let actual = self.payload().len() as u64;
        if actual != self.declared_size {
            return Err(StudyMateError::validation(format!(
                "declared size {} does not match payload size {}",
                self.declared_size, actual
            )));
        }
        Ok(())
    }
}

/// `local@domain.tld` shape check.
pub fn validate_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !local.is_empty()
        && !host.is_empty()
        && !tld.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
}

/// 1–150 characters of letters, digits and `@ . + - _`.
pub fn validate_username(username: &str) -> bool {
    let len = username.chars().count();
    (1..=150).contains(&len)
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}
