#![allow(async_fn_in_trait)]

use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use studymate_domain::pagination::PageRequest;

use crate::domain::projection::{
    EntityKind, MirrorDocument, MirrorWrite, OutboxEntry, SyncOp, SyncOutcome,
};
use crate::domain::types::{
    BlobRef, Department, MaterialDetail, MaterialFilter, MaterialHierarchy, MaterialScope,
    MaterialUpdate, ProfileUpdate, Semester, SemesterDetail, SemesterFilter, StudyMaterial,
    Subject, SubjectDetail, SubjectFilter, User, Year,
};
use crate::error::{ExternalError, StudyMateError};

// ── Entity store ─────────────────────────────────────────────────────────────

pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StudyMateError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StudyMateError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StudyMateError>;

    /// Insert a user. Unique violations map to `UsernameTaken` / `EmailTaken`.
    async fn create(&self, user: &User) -> Result<(), StudyMateError>;

    /// Apply a profile update and bump `updated_at`. `None` if the user does not exist.
    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, StudyMateError>;

    /// Students, newest first, optionally filtered by a substring of username, email or name.
    async fn list_students(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<User>, StudyMateError>;

    /// Returns `true` if deleted, `false` if not found.
    async fn delete(&self, id: Uuid) -> Result<bool, StudyMateError>;
}

pub trait DepartmentRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Department>, StudyMateError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Department>, StudyMateError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Department>, StudyMateError>;

    /// Unique violation on name maps to `DepartmentExists`.
    async fn create(&self, department: &Department) -> Result<(), StudyMateError>;

    /// Delete the row with everything beneath it and return the materials the cascade
    /// removed. `None` if the row does not exist.
    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError>;
}

pub trait YearRepository: Send + Sync {
    async fn list(&self) -> Result<Vec<Year>, StudyMateError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Year>, StudyMateError>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Year>, StudyMateError>;

    /// Unique violation on name maps to `YearExists`.
    async fn create(&self, year: &Year) -> Result<(), StudyMateError>;

    /// Delete the row with everything beneath it and return the materials the cascade
    /// removed. `None` if the row does not exist.
    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError>;
}

pub trait SemesterRepository: Send + Sync {
    async fn list(&self, filter: &SemesterFilter) -> Result<Vec<SemesterDetail>, StudyMateError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SemesterDetail>, StudyMateError>;

    async fn find_by_key(
        &self,
        department_id: Option<Uuid>,
        year_id: Uuid,
        number: i32,
    ) -> Result<Option<Semester>, StudyMateError>;

    /// Violation of (department, year, number) uniqueness maps to `SemesterExists`.
    async fn create(&self, semester: &Semester) -> Result<(), StudyMateError>;

    /// Delete the row with everything beneath it and return the materials the cascade
    /// removed. `None` if the row does not exist.
    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError>;
}

pub trait SubjectRepository: Send + Sync {
    async fn list(&self, filter: &SubjectFilter) -> Result<Vec<SubjectDetail>, StudyMateError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubjectDetail>, StudyMateError>;

    async fn find_by_name(
        &self,
        semester_id: Uuid,
        name: &str,
    ) -> Result<Option<Subject>, StudyMateError>;

    async fn create(&self, subject: &Subject) -> Result<(), StudyMateError>;

    /// Delete the row with everything beneath it and return the materials the cascade
    /// removed. `None` if the row does not exist.
    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError>;
}

pub trait MaterialRepository: Send + Sync {
    /// Newest first.
    async fn list(
        &self,
        filter: &MaterialFilter,
        page: PageRequest,
    ) -> Result<Vec<MaterialDetail>, StudyMateError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StudyMaterial>, StudyMateError>;

    async fn find_detail(&self, id: Uuid) -> Result<Option<MaterialDetail>, StudyMateError>;

    /// Hierarchy a new material under `subject_id` would belong to.
    async fn hierarchy_of_subject(
        &self,
        subject_id: Uuid,
    ) -> Result<Option<MaterialHierarchy>, StudyMateError>;

    /// Insert a material without blob columns.
    async fn create(&self, material: &StudyMaterial) -> Result<(), StudyMateError>;

    /// Write every blob column in one update. `false` if the record no longer exists.
    async fn attach_blob(&self, id: Uuid, blob: &BlobRef) -> Result<bool, StudyMateError>;

    async fn update_meta(
        &self,
        id: Uuid,
        update: &MaterialUpdate,
    ) -> Result<Option<StudyMaterial>, StudyMateError>;

    async fn delete(&self, id: Uuid) -> Result<bool, StudyMateError>;

    /// Materials that belong to (or were uploaded by) the given parent.
    async fn list_in_scope(
        &self,
        scope: MaterialScope,
    ) -> Result<Vec<StudyMaterial>, StudyMateError>;
}

// ── Sync ─────────────────────────────────────────────────────────────────────

/// Read side of the entity store used to build mirror documents.
pub trait ProjectionSource: Send + Sync {
    /// Current mirror document for the record, `None` if it no longer exists.
    async fn load(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<Option<MirrorDocument>, StudyMateError>;

    /// Every authoritative id of the kind.
    async fn ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, StudyMateError>;
}

/// Secondary document store holding mirror copies.
pub trait MirrorStore: Send + Sync {
    /// Replace-or-insert keyed by `source_id`, refusing to lower the stored version.
    async fn upsert(&self, doc: &MirrorDocument) -> Result<MirrorWrite, ExternalError>;

    /// Replace-or-insert keyed by `source_id` whatever version is stored.
    async fn replace(&self, doc: &MirrorDocument) -> Result<(), ExternalError>;

    /// Returns `true` if a document was removed. Absence is not an error.
    async fn remove(&self, kind: EntityKind, id: Uuid) -> Result<bool, ExternalError>;

    async fn source_ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, ExternalError>;
}

/// Durable queue of projections that could not be applied.
pub trait SyncOutbox: Send + Sync {
    /// Insert or reset the single pending row for `(kind, id)`.
    async fn enqueue(
        &self,
        kind: EntityKind,
        id: Uuid,
        op: SyncOp,
        error: &str,
    ) -> Result<(), StudyMateError>;

    /// Pending rows whose `next_attempt_at` is not after `now`, oldest first.
    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OutboxEntry>, StudyMateError>;

    async fn complete(&self, id: Uuid) -> Result<(), StudyMateError>;

    /// Record a failed attempt. `next_attempt_at = None` marks the row failed for good.
    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), StudyMateError>;
}

/// Something that can project entity changes into the mirror.
pub trait Projector: Send + Sync {
    async fn project(&self, kind: EntityKind, id: Uuid, op: SyncOp) -> SyncOutcome;
}

impl<T: Projector> Projector for Arc<T> {
    async fn project(&self, kind: EntityKind, id: Uuid, op: SyncOp) -> SyncOutcome {
        (**self).project(kind, id, op).await
    }
}

// ── Object storage ───────────────────────────────────────────────────────────

pub trait ObjectStorage: Send + Sync {
    /// Upload under `folder`; the provider guarantees a unique object name.
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        folder: &str,
    ) -> Result<BlobRef, ExternalError>;

    /// Deleting a missing object succeeds.
    async fn delete(&self, object_id: &str) -> Result<(), ExternalError>;
}
