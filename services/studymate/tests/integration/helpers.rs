use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use anyhow::anyhow;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use studymate::domain::projection::{
    EntityKind, MirrorDocument, MirrorWrite, OutboxEntry, SyncOp, SyncOutcome, material_document,
    user_document,
};
use studymate::domain::repository::{
    DepartmentRepository, MaterialRepository, MirrorStore, ObjectStorage, ProjectionSource,
    Projector, SemesterRepository, SubjectRepository, SyncOutbox, UserRepository, YearRepository,
};
use studymate::domain::types::{
    BlobRef, Department, FileUpload, MaterialDetail, MaterialFilter, MaterialHierarchy,
    MaterialScope, MaterialUpdate, ProfileUpdate, Semester, SemesterDetail, SemesterFilter,
    StudyMaterial, Subject, SubjectDetail, SubjectFilter, User, Year,
};
use studymate::error::{ExternalError, StudyMateError};
use studymate::usecase::academic::CascadeCleanup;
use studymate::usecase::sync::SyncCoordinator;
use studymate::usecase::upload::{NewMaterial, UploadLifecycle};
use studymate_core::retry::RetryPolicy;
use studymate_domain::material::MaterialKind;
use studymate_domain::pagination::PageRequest;
use studymate_domain::user::UserRole;

pub type EventLog = Arc<Mutex<Vec<&'static str>>>;

pub type TestCoordinator = SyncCoordinator<MemoryStore, MockMirror, MockOutbox>;

/// Retries without real waiting.
pub const FAST_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    base_delay: StdDuration::from_millis(1),
    max_delay: StdDuration::from_millis(1),
};

/// Strictly increasing timestamp so every write produces a newer mirror version.
fn next_stamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + Duration::microseconds(1))
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

// ── MemoryStore ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Tables {
    pub users: Vec<User>,
    pub departments: Vec<Department>,
    pub years: Vec<Year>,
    pub semesters: Vec<Semester>,
    pub subjects: Vec<Subject>,
    pub materials: Vec<StudyMaterial>,
}

impl Tables {
    fn semester_detail(&self, semester: &Semester) -> SemesterDetail {
        SemesterDetail {
            semester: semester.clone(),
            department_name: semester
                .department_id
                .and_then(|id| self.departments.iter().find(|d| d.id == id))
                .map(|d| d.name.clone()),
            year_name: self
                .years
                .iter()
                .find(|y| y.id == semester.year_id)
                .map(|y| y.name.clone())
                .unwrap_or_default(),
        }
    }

    fn hierarchy(&self, subject_id: Uuid) -> Option<MaterialHierarchy> {
        let subject = self.subjects.iter().find(|s| s.id == subject_id)?;
        let semester = self.semesters.iter().find(|s| s.id == subject.semester_id)?;
        let detail = self.semester_detail(semester);
        Some(MaterialHierarchy {
            subject_id,
            subject_name: subject.name.clone(),
            semester_id: semester.id,
            semester_name: semester.name.clone(),
            semester_number: semester.number,
            year_id: semester.year_id,
            year_name: detail.year_name,
            department_id: semester.department_id,
            department_name: detail.department_name,
        })
    }

    fn subject_detail(&self, subject: &Subject) -> Option<SubjectDetail> {
        let h = self.hierarchy(subject.id)?;
        Some(SubjectDetail {
            subject: subject.clone(),
            semester_name: h.semester_name,
            semester_number: h.semester_number,
            year_name: h.year_name,
            department_name: h.department_name,
        })
    }

    fn material_detail(&self, material: &StudyMaterial) -> Option<MaterialDetail> {
        let hierarchy = self.hierarchy(material.subject_id)?;
        let uploaded_by_username = material
            .uploaded_by
            .and_then(|id| self.users.iter().find(|u| u.id == id))
            .map(|u| u.username.clone());
        Some(MaterialDetail {
            material: material.clone(),
            hierarchy,
            uploaded_by_username,
        })
    }

    fn in_scope(&self, material: &StudyMaterial, scope: MaterialScope) -> bool {
        let Some(h) = self.hierarchy(material.subject_id) else {
            return false;
        };
        match scope {
            MaterialScope::Department(id) => h.department_id == Some(id),
            MaterialScope::Year(id) => h.year_id == id,
            MaterialScope::Semester(id) => h.semester_id == id,
            MaterialScope::Subject(id) => h.subject_id == id,
            MaterialScope::Uploader(id) => material.uploaded_by == Some(id),
        }
    }

    fn scoped(&self, scope: MaterialScope) -> Vec<StudyMaterial> {
        self.materials
            .iter()
            .filter(|m| self.in_scope(m, scope))
            .cloned()
            .collect()
    }

    fn drop_subjects(&mut self, keep: impl Fn(&Subject) -> bool) {
        let removed: Vec<Uuid> = self
            .subjects
            .iter()
            .filter(|s| !keep(s))
            .map(|s| s.id)
            .collect();
        self.subjects.retain(|s| !removed.contains(&s.id));
        self.materials.retain(|m| !removed.contains(&m.subject_id));
    }

    fn drop_semesters(&mut self, keep: impl Fn(&Semester) -> bool) {
        let removed: Vec<Uuid> = self
            .semesters
            .iter()
            .filter(|s| !keep(s))
            .map(|s| s.id)
            .collect();
        self.semesters.retain(|s| !removed.contains(&s.id));
        self.drop_subjects(|s| !removed.contains(&s.semester_id));
    }
}

/// In-memory entity store with the same cascade rules as the relational schema.
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub tables: Arc<Mutex<Tables>>,
    pub log: EventLog,
    /// When set, `attach_blob` fails.
    pub fail_attach: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn insert_user(&self, user: User) {
        self.tables.lock().unwrap().users.push(user);
    }

    pub fn insert_material(&self, material: StudyMaterial) {
        self.tables.lock().unwrap().materials.push(material);
    }

    pub fn users(&self) -> Vec<User> {
        self.tables.lock().unwrap().users.clone()
    }

    pub fn materials(&self) -> Vec<StudyMaterial> {
        self.tables.lock().unwrap().materials.clone()
    }

    pub fn material(&self, id: Uuid) -> Option<StudyMaterial> {
        self.materials().into_iter().find(|m| m.id == id)
    }

    pub fn subject_count(&self) -> usize {
        self.tables.lock().unwrap().subjects.len()
    }

    pub fn semester_count(&self) -> usize {
        self.tables.lock().unwrap().semesters.len()
    }

    /// Direct write, as a concurrent request would do it.
    pub fn set_material_title(&self, id: Uuid, title: &str) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(m) = tables.materials.iter_mut().find(|m| m.id == id) {
            m.title = title.to_owned();
            m.updated_at = next_stamp(m.updated_at);
        }
    }
}

impl UserRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StudyMateError> {
        Ok(self.users().into_iter().find(|u| u.id == id))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StudyMateError> {
        Ok(self.users().into_iter().find(|u| u.username == username))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StudyMateError> {
        Ok(self.users().into_iter().find(|u| u.email == email))
    }

    async fn create(&self, user: &User) -> Result<(), StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StudyMateError::UsernameTaken);
        }
        if tables.users.iter().any(|u| u.email == user.email) {
            return Err(StudyMateError::EmailTaken);
        }
        tables.users.push(user.clone());
        Ok(())
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(user) = tables.users.iter_mut().find(|u| u.id == id) else {
            return Ok(None);
        };
        if let Some(first_name) = &update.first_name {
            user.first_name = first_name.clone();
        }
        if let Some(last_name) = &update.last_name {
            user.last_name = last_name.clone();
        }
        if let Some(email) = &update.email {
            user.email = email.clone();
        }
        user.updated_at = next_stamp(user.updated_at);
        Ok(Some(user.clone()))
    }

    async fn list_students(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<User>, StudyMateError> {
        let needle = search.map(str::to_lowercase);
        let mut students: Vec<User> = self
            .users()
            .into_iter()
            .filter(|u| u.role == UserRole::Student)
            .filter(|u| {
                needle.as_deref().is_none_or(|n| {
                    [&u.username, &u.email, &u.first_name, &u.last_name]
                        .into_iter()
                        .any(|field| contains_ci(field, n))
                })
            })
            .collect();
        students.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(students
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }
        for material in tables.materials.iter_mut() {
            if material.uploaded_by == Some(id) {
                material.uploaded_by = None;
            }
        }
        Ok(true)
    }
}

impl DepartmentRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<Department>, StudyMateError> {
        let mut departments = self.tables.lock().unwrap().departments.clone();
        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Department>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.departments.iter().find(|d| d.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Department>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.departments.iter().find(|d| d.name == name).cloned())
    }

    async fn create(&self, department: &Department) -> Result<(), StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.departments.iter().any(|d| d.name == department.name) {
            return Err(StudyMateError::DepartmentExists);
        }
        tables.departments.push(department.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.departments.iter().any(|d| d.id == id) {
            return Ok(None);
        }
        let removed = tables.scoped(MaterialScope::Department(id));
        tables.departments.retain(|d| d.id != id);
        tables.drop_semesters(|s| s.department_id != Some(id));
        Ok(Some(removed))
    }
}

impl YearRepository for MemoryStore {
    async fn list(&self) -> Result<Vec<Year>, StudyMateError> {
        let mut years = self.tables.lock().unwrap().years.clone();
        years.sort_by_key(|y| y.number);
        Ok(years)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Year>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.years.iter().find(|y| y.id == id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Year>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.years.iter().find(|y| y.name == name).cloned())
    }

    async fn create(&self, year: &Year) -> Result<(), StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.years.iter().any(|y| y.name == year.name) {
            return Err(StudyMateError::YearExists);
        }
        tables.years.push(year.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.years.iter().any(|y| y.id == id) {
            return Ok(None);
        }
        let removed = tables.scoped(MaterialScope::Year(id));
        tables.years.retain(|y| y.id != id);
        tables.drop_semesters(|s| s.year_id != id);
        Ok(Some(removed))
    }
}

impl SemesterRepository for MemoryStore {
    async fn list(&self, filter: &SemesterFilter) -> Result<Vec<SemesterDetail>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .semesters
            .iter()
            .filter(|s| filter.department_id.is_none_or(|d| s.department_id == Some(d)))
            .filter(|s| filter.year_id.is_none_or(|y| s.year_id == y))
            .map(|s| tables.semester_detail(s))
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SemesterDetail>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .semesters
            .iter()
            .find(|s| s.id == id)
            .map(|s| tables.semester_detail(s)))
    }

    async fn find_by_key(
        &self,
        department_id: Option<Uuid>,
        year_id: Uuid,
        number: i32,
    ) -> Result<Option<Semester>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .semesters
            .iter()
            .find(|s| s.department_id == department_id && s.year_id == year_id && s.number == number)
            .cloned())
    }

    async fn create(&self, semester: &Semester) -> Result<(), StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.semesters.iter().any(|s| {
            s.department_id == semester.department_id
                && s.year_id == semester.year_id
                && s.number == semester.number
        }) {
            return Err(StudyMateError::SemesterExists);
        }
        tables.semesters.push(semester.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.semesters.iter().any(|s| s.id == id) {
            return Ok(None);
        }
        let removed = tables.scoped(MaterialScope::Semester(id));
        tables.drop_semesters(|s| s.id != id);
        Ok(Some(removed))
    }
}

impl SubjectRepository for MemoryStore {
    async fn list(&self, filter: &SubjectFilter) -> Result<Vec<SubjectDetail>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        let needle = filter.search.as_deref().map(str::to_lowercase);
        Ok(tables
            .subjects
            .iter()
            .filter(|s| filter.semester_id.is_none_or(|id| s.semester_id == id))
            .filter(|s| {
                needle.as_deref().is_none_or(|n| {
                    contains_ci(&s.name, n) || s.code.as_deref().is_some_and(|c| contains_ci(c, n))
                })
            })
            .filter_map(|s| {
                let h = tables.hierarchy(s.id)?;
                let keep = filter.department_id.is_none_or(|d| h.department_id == Some(d))
                    && filter.year_id.is_none_or(|y| h.year_id == y);
                keep.then(|| tables.subject_detail(s)).flatten()
            })
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubjectDetail>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .subjects
            .iter()
            .find(|s| s.id == id)
            .and_then(|s| tables.subject_detail(s)))
    }

    async fn find_by_name(
        &self,
        semester_id: Uuid,
        name: &str,
    ) -> Result<Option<Subject>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .subjects
            .iter()
            .find(|s| s.semester_id == semester_id && s.name == name)
            .cloned())
    }

    async fn create(&self, subject: &Subject) -> Result<(), StudyMateError> {
        self.tables.lock().unwrap().subjects.push(subject.clone());
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        if !tables.subjects.iter().any(|s| s.id == id) {
            return Ok(None);
        }
        let removed = tables.scoped(MaterialScope::Subject(id));
        tables.drop_subjects(|s| s.id != id);
        Ok(Some(removed))
    }
}

impl MaterialRepository for MemoryStore {
    async fn list(
        &self,
        filter: &MaterialFilter,
        page: PageRequest,
    ) -> Result<Vec<MaterialDetail>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        let needle = filter.search.as_deref().map(str::to_lowercase);
        let mut details: Vec<MaterialDetail> = tables
            .materials
            .iter()
            .filter_map(|m| tables.material_detail(m))
            .filter(|d| {
                let h = &d.hierarchy;
                filter.subject_id.is_none_or(|id| h.subject_id == id)
                    && filter.semester_id.is_none_or(|id| h.semester_id == id)
                    && filter.year_id.is_none_or(|id| h.year_id == id)
                    && filter.department_id.is_none_or(|id| h.department_id == Some(id))
                    && filter.kind.is_none_or(|kind| d.material.kind == kind)
                    && needle.as_deref().is_none_or(|n| {
                        contains_ci(&d.material.title, n)
                            || contains_ci(&d.material.description, n)
                            || contains_ci(&h.subject_name, n)
                    })
            })
            .collect();
        details.sort_by(|a, b| b.material.created_at.cmp(&a.material.created_at));
        Ok(details
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StudyMaterial>, StudyMateError> {
        Ok(self.material(id))
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<MaterialDetail>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .materials
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| tables.material_detail(m)))
    }

    async fn hierarchy_of_subject(
        &self,
        subject_id: Uuid,
    ) -> Result<Option<MaterialHierarchy>, StudyMateError> {
        Ok(self.tables.lock().unwrap().hierarchy(subject_id))
    }

    async fn create(&self, material: &StudyMaterial) -> Result<(), StudyMateError> {
        self.insert_material(material.clone());
        Ok(())
    }

    async fn attach_blob(&self, id: Uuid, blob: &BlobRef) -> Result<bool, StudyMateError> {
        if self.fail_attach.load(Ordering::SeqCst) {
            return Err(StudyMateError::Internal(anyhow!("connection to entity store lost")));
        }
        let mut tables = self.tables.lock().unwrap();
        let Some(material) = tables.materials.iter_mut().find(|m| m.id == id) else {
            return Ok(false);
        };
        material.blob = Some(blob.clone());
        material.updated_at = next_stamp(material.updated_at);
        Ok(true)
    }

    async fn update_meta(
        &self,
        id: Uuid,
        update: &MaterialUpdate,
    ) -> Result<Option<StudyMaterial>, StudyMateError> {
        let mut tables = self.tables.lock().unwrap();
        let Some(material) = tables.materials.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if let Some(title) = &update.title {
            material.title = title.clone();
        }
        if let Some(description) = &update.description {
            material.description = description.clone();
        }
        if let Some(kind) = update.kind {
            material.kind = kind;
        }
        material.updated_at = next_stamp(material.updated_at);
        Ok(Some(material.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StudyMateError> {
        self.log.lock().unwrap().push("record.delete");
        let mut tables = self.tables.lock().unwrap();
        let before = tables.materials.len();
        tables.materials.retain(|m| m.id != id);
        Ok(tables.materials.len() != before)
    }

    async fn list_in_scope(
        &self,
        scope: MaterialScope,
    ) -> Result<Vec<StudyMaterial>, StudyMateError> {
        Ok(self.tables.lock().unwrap().scoped(scope))
    }
}

impl ProjectionSource for MemoryStore {
    async fn load(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<Option<MirrorDocument>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(match kind {
            EntityKind::User => tables.users.iter().find(|u| u.id == id).map(user_document),
            EntityKind::Material => tables
                .materials
                .iter()
                .find(|m| m.id == id)
                .and_then(|m| tables.material_detail(m))
                .map(|detail| material_document(&detail)),
        })
    }

    async fn ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, StudyMateError> {
        let tables = self.tables.lock().unwrap();
        Ok(match kind {
            EntityKind::User => tables.users.iter().map(|u| u.id).collect(),
            EntityKind::Material => tables.materials.iter().map(|m| m.id).collect(),
        })
    }
}

// ── MockMirror ───────────────────────────────────────────────────────────────

/// Version-guarded document map. Equal versions overwrite, lower versions are stale.
#[derive(Clone, Default)]
pub struct MockMirror {
    pub docs: Arc<Mutex<HashMap<(EntityKind, Uuid), MirrorDocument>>>,
    pub unavailable: Arc<AtomicBool>,
    pub log: EventLog,
}

impl MockMirror {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn get(&self, kind: EntityKind, id: Uuid) -> Option<MirrorDocument> {
        self.docs.lock().unwrap().get(&(kind, id)).cloned()
    }

    pub fn insert(&self, doc: MirrorDocument) {
        self.docs
            .lock()
            .unwrap()
            .insert((doc.kind, doc.source_id), doc);
    }

    pub fn count(&self, kind: EntityKind) -> usize {
        self.docs
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    fn reachable(&self) -> Result<(), ExternalError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ExternalError::Transient(anyhow!("mirror unreachable")));
        }
        Ok(())
    }
}

impl MirrorStore for MockMirror {
    async fn upsert(&self, doc: &MirrorDocument) -> Result<MirrorWrite, ExternalError> {
        self.reachable()?;
        let mut docs = self.docs.lock().unwrap();
        let key = (doc.kind, doc.source_id);
        if docs.get(&key).is_some_and(|stored| stored.version > doc.version) {
            return Ok(MirrorWrite::Stale);
        }
        docs.insert(key, doc.clone());
        Ok(MirrorWrite::Written)
    }

    async fn replace(&self, doc: &MirrorDocument) -> Result<(), ExternalError> {
        self.reachable()?;
        self.docs
            .lock()
            .unwrap()
            .insert((doc.kind, doc.source_id), doc.clone());
        Ok(())
    }

    async fn remove(&self, kind: EntityKind, id: Uuid) -> Result<bool, ExternalError> {
        self.reachable()?;
        self.log.lock().unwrap().push("mirror.remove");
        Ok(self.docs.lock().unwrap().remove(&(kind, id)).is_some())
    }

    async fn source_ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, ExternalError> {
        self.reachable()?;
        Ok(self
            .docs
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| *id)
            .collect())
    }
}

// ── MockStorage ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockStorage {
    /// Stored object ids and their sizes.
    pub objects: Arc<Mutex<HashMap<String, usize>>>,
    pub uploads: Arc<AtomicUsize>,
    pub deleted: Arc<Mutex<Vec<String>>>,
    /// Upcoming uploads that fail with a retryable error.
    pub transient_failures: Arc<AtomicU32>,
    /// Every upload fails with a non-retryable error.
    pub reject_uploads: Arc<AtomicBool>,
    pub log: EventLog,
}

impl MockStorage {
    pub fn with_log(log: EventLog) -> Self {
        Self {
            log,
            ..Self::default()
        }
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn has_object(&self, object_id: &str) -> bool {
        self.objects.lock().unwrap().contains_key(object_id)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }
}

impl ObjectStorage for MockStorage {
    async fn upload(
        &self,
        bytes: Bytes,
        filename: &str,
        folder: &str,
    ) -> Result<BlobRef, ExternalError> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Err(ExternalError::Permanent(anyhow!("invalid api key")));
        }
        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
        {
            return Err(ExternalError::Transient(anyhow!("connection reset")));
        }

        let (stem, format) = filename.rsplit_once('.').unwrap_or((filename, ""));
        let object_id = format!("{folder}/{stem}_{n}");
        self.objects
            .lock()
            .unwrap()
            .insert(object_id.clone(), bytes.len());
        Ok(BlobRef {
            url: format!("http://cdn.test/{object_id}"),
            secure_url: format!("https://cdn.test/{object_id}"),
            object_id,
            original_filename: stem.to_owned(),
            byte_size: bytes.len() as i64,
            format: format.to_owned(),
        })
    }

    async fn delete(&self, object_id: &str) -> Result<(), ExternalError> {
        self.log.lock().unwrap().push("blob.delete");
        self.deleted.lock().unwrap().push(object_id.to_owned());
        self.objects.lock().unwrap().remove(object_id);
        Ok(())
    }
}

// ── MockOutbox ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub entry: OutboxEntry,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub processed: bool,
    pub failed: bool,
}

#[derive(Clone, Default)]
pub struct MockOutbox {
    pub rows: Arc<Mutex<Vec<OutboxRow>>>,
}

impl MockOutbox {
    pub fn pending(&self) -> Vec<OutboxRow> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| !r.processed && !r.failed)
            .cloned()
            .collect()
    }

    pub fn rows(&self) -> Vec<OutboxRow> {
        self.rows.lock().unwrap().clone()
    }

    /// Pull every pending row's next attempt into the past.
    pub fn make_due(&self) {
        for row in self.rows.lock().unwrap().iter_mut() {
            row.next_attempt_at = Utc::now() - Duration::seconds(1);
        }
    }

    pub fn set_attempts(&self, attempts: i32) {
        for row in self.rows.lock().unwrap().iter_mut() {
            row.entry.attempts = attempts;
        }
    }
}

impl SyncOutbox for MockOutbox {
    async fn enqueue(
        &self,
        kind: EntityKind,
        id: Uuid,
        op: SyncOp,
        error: &str,
    ) -> Result<(), StudyMateError> {
        let mut rows = self.rows.lock().unwrap();
        let now = Utc::now();
        match rows
            .iter_mut()
            .find(|r| r.entry.kind == kind && r.entry.entity_id == id)
        {
            Some(row) => {
                row.entry.op = op;
                row.entry.attempts = 0;
                row.last_error = Some(error.to_owned());
                row.next_attempt_at = now;
                row.processed = false;
                row.failed = false;
            }
            None => rows.push(OutboxRow {
                entry: OutboxEntry {
                    id: Uuid::now_v7(),
                    kind,
                    entity_id: id,
                    op,
                    attempts: 0,
                },
                last_error: Some(error.to_owned()),
                next_attempt_at: now,
                processed: false,
                failed: false,
            }),
        }
        Ok(())
    }

    async fn due(&self, now: DateTime<Utc>, limit: u64) -> Result<Vec<OutboxEntry>, StudyMateError> {
        let mut due: Vec<OutboxRow> = self
            .pending()
            .into_iter()
            .filter(|r| r.next_attempt_at <= now)
            .collect();
        due.sort_by_key(|r| r.next_attempt_at);
        Ok(due
            .into_iter()
            .take(limit as usize)
            .map(|r| r.entry)
            .collect())
    }

    async fn complete(&self, id: Uuid) -> Result<(), StudyMateError> {
        if let Some(row) = self.rows.lock().unwrap().iter_mut().find(|r| r.entry.id == id) {
            row.processed = true;
            row.last_error = None;
        }
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), StudyMateError> {
        if let Some(row) = self.rows.lock().unwrap().iter_mut().find(|r| r.entry.id == id) {
            row.entry.attempts = attempts;
            row.last_error = Some(error.to_owned());
            match next_attempt_at {
                Some(at) => row.next_attempt_at = at,
                None => row.failed = true,
            }
        }
        Ok(())
    }
}

// ── RecordingProjector ───────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingProjector {
    pub calls: Arc<Mutex<Vec<(EntityKind, Uuid, SyncOp)>>>,
}

impl RecordingProjector {
    pub fn calls(&self) -> Vec<(EntityKind, Uuid, SyncOp)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Projector for RecordingProjector {
    async fn project(&self, kind: EntityKind, id: Uuid, op: SyncOp) -> SyncOutcome {
        self.calls.lock().unwrap().push((kind, id, op));
        SyncOutcome::Applied
    }
}

// ── Wiring ───────────────────────────────────────────────────────────────────

pub fn coordinator(
    store: &MemoryStore,
    mirror: &MockMirror,
    outbox: &MockOutbox,
) -> Arc<TestCoordinator> {
    Arc::new(SyncCoordinator::new(
        store.clone(),
        mirror.clone(),
        outbox.clone(),
        RetryPolicy::once(),
    ))
}

pub fn lifecycle<P: Projector>(
    store: &MemoryStore,
    storage: &MockStorage,
    sync: P,
) -> UploadLifecycle<MemoryStore, MockStorage, P> {
    UploadLifecycle {
        materials: store.clone(),
        storage: storage.clone(),
        sync,
        retry: FAST_RETRY,
    }
}

pub fn cleanup<P: Projector>(storage: &MockStorage, sync: P) -> CascadeCleanup<MockStorage, P> {
    CascadeCleanup {
        storage: storage.clone(),
        sync,
        retry: FAST_RETRY,
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

pub struct Hierarchy {
    pub department_id: Uuid,
    pub year_id: Uuid,
    pub semester_id: Uuid,
    pub subject_id: Uuid,
}

/// `{department} / Year 2 / Semester 3 / Operating Systems`.
pub fn seed_hierarchy(store: &MemoryStore, department: &str) -> Hierarchy {
    let now = Utc::now();
    let ids = Hierarchy {
        department_id: Uuid::now_v7(),
        year_id: Uuid::now_v7(),
        semester_id: Uuid::now_v7(),
        subject_id: Uuid::now_v7(),
    };
    let mut tables = store.tables.lock().unwrap();
    tables.departments.push(Department {
        id: ids.department_id,
        name: department.to_owned(),
        code: department.to_uppercase(),
        created_at: now,
    });
    tables.years.push(Year {
        id: ids.year_id,
        name: "Year 2".to_owned(),
        number: 2,
        created_at: now,
    });
    tables.semesters.push(Semester {
        id: ids.semester_id,
        department_id: Some(ids.department_id),
        year_id: ids.year_id,
        name: "Semester 3".to_owned(),
        number: 3,
        created_at: now,
    });
    tables.subjects.push(Subject {
        id: ids.subject_id,
        semester_id: ids.semester_id,
        name: "Operating Systems".to_owned(),
        code: Some("CS301".to_owned()),
        created_at: now,
    });
    ids
}

pub fn test_user(username: &str, role: UserRole) -> User {
    let now = Utc::now();
    User {
        id: Uuid::now_v7(),
        username: username.to_owned(),
        email: format!("{username}@example.com"),
        first_name: "Test".to_owned(),
        last_name: "User".to_owned(),
        password_hash: "$argon2id$not-a-real-hash".to_owned(),
        role,
        created_at: now,
        updated_at: now,
    }
}

pub fn test_blob(object_id: &str) -> BlobRef {
    BlobRef {
        object_id: object_id.to_owned(),
        url: format!("http://cdn.test/{object_id}"),
        secure_url: format!("https://cdn.test/{object_id}"),
        original_filename: "notes".to_owned(),
        byte_size: 1024,
        format: "pdf".to_owned(),
    }
}

pub fn test_material(
    subject_id: Uuid,
    uploaded_by: Option<Uuid>,
    blob: Option<BlobRef>,
) -> StudyMaterial {
    let now = Utc::now();
    StudyMaterial {
        id: Uuid::now_v7(),
        subject_id,
        title: "Unit 1 Notes".to_owned(),
        description: "Process scheduling".to_owned(),
        kind: MaterialKind::Note,
        uploaded_by,
        blob,
        legacy_file_path: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn new_material(subject_id: Uuid, title: &str) -> NewMaterial {
    NewMaterial {
        subject_id,
        title: title.to_owned(),
        description: String::new(),
        kind: MaterialKind::Note,
        uploaded_by: None,
    }
}

pub fn pdf(bytes: &'static [u8]) -> FileUpload {
    FileUpload::new(Bytes::from_static(bytes), "notes.pdf", bytes.len() as u64)
}
