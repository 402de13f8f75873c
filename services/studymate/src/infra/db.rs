use std::collections::HashMap;

use anyhow::Context as _;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, DbErr,
    EntityTrait, IntoActiveModel as _, JoinType, QueryFilter, QueryOrder, QuerySelect,
    RelationTrait, SqlErr, TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use uuid::Uuid;

use studymate_core::sea_ext::contains_ci;
use studymate_domain::material::MaterialKind;
use studymate_domain::pagination::PageRequest;
use studymate_domain::user::UserRole;
use studymate_schema::{
    departments, semesters, study_materials, subjects, sync_outbox, users, years,
};

use crate::domain::projection::{
    EntityKind, MirrorDocument, OutboxEntry, SyncOp, material_document, outbox_key, user_document,
};
use crate::domain::repository::{
    DepartmentRepository, MaterialRepository, ProjectionSource, SemesterRepository,
    SubjectRepository, SyncOutbox, UserRepository, YearRepository,
};
use crate::domain::types::{
    BlobRef, Department, MaterialDetail, MaterialFilter, MaterialHierarchy, MaterialScope,
    MaterialUpdate, ProfileUpdate, Semester, SemesterDetail, SemesterFilter, StudyMaterial,
    Subject, SubjectDetail, SubjectFilter, User, Year,
};
use crate::error::StudyMateError;

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Map a unique violation to `conflict`, anything else to `Internal`.
fn conflict_or_internal(
    err: DbErr,
    conflict: StudyMateError,
    what: &'static str,
) -> StudyMateError {
    if is_unique_violation(&err) {
        conflict
    } else {
        anyhow::Error::new(err).context(what).into()
    }
}

// ── Cascade delete ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
enum CascadeRoot {
    Department(Uuid),
    Year(Uuid),
    Semester(Uuid),
    Subject(Uuid),
}

/// Delete an academic row and return the materials its cascade removed.
///
/// The row and every semester and subject beneath it are locked before the materials are
/// read. An insert under any of them waits for this transaction and then fails its
/// foreign key check, so no material leaves the cascade unreported.
async fn delete_cascading(
    db: &DatabaseConnection,
    root: CascadeRoot,
) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
    let txn = db.begin().await.context("begin cascade delete")?;

    let locked = match root {
        CascadeRoot::Department(id) => departments::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map(|row| row.is_some()),
        CascadeRoot::Year(id) => years::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map(|row| row.is_some()),
        CascadeRoot::Semester(id) => semesters::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map(|row| row.is_some()),
        CascadeRoot::Subject(id) => subjects::Entity::find_by_id(id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map(|row| row.is_some()),
    }
    .context("lock cascade root")?;
    if !locked {
        return Ok(None);
    }

    let semester_ids: Vec<Uuid> = match root {
        CascadeRoot::Department(id) | CascadeRoot::Year(id) => {
            let column = match root {
                CascadeRoot::Department(_) => semesters::Column::DepartmentId,
                _ => semesters::Column::YearId,
            };
            semesters::Entity::find()
                .filter(column.eq(id))
                .lock_exclusive()
                .all(&txn)
                .await
                .context("lock semesters")?
                .into_iter()
                .map(|s| s.id)
                .collect()
        }
        CascadeRoot::Semester(id) => vec![id],
        CascadeRoot::Subject(_) => Vec::new(),
    };
    let subject_ids: Vec<Uuid> = match root {
        CascadeRoot::Subject(id) => vec![id],
        _ => subjects::Entity::find()
            .filter(subjects::Column::SemesterId.is_in(semester_ids))
            .lock_exclusive()
            .all(&txn)
            .await
            .context("lock subjects")?
            .into_iter()
            .map(|s| s.id)
            .collect(),
    };
    let removed = study_materials::Entity::find()
        .filter(study_materials::Column::SubjectId.is_in(subject_ids))
        .all(&txn)
        .await
        .context("list materials in cascade")?
        .into_iter()
        .map(material_from_model)
        .collect::<Result<Vec<_>, _>>()?;

    match root {
        CascadeRoot::Department(id) => departments::Entity::delete_by_id(id).exec(&txn).await,
        CascadeRoot::Year(id) => years::Entity::delete_by_id(id).exec(&txn).await,
        CascadeRoot::Semester(id) => semesters::Entity::delete_by_id(id).exec(&txn).await,
        CascadeRoot::Subject(id) => subjects::Entity::delete_by_id(id).exec(&txn).await,
    }
    .context("cascade delete")?;
    txn.commit().await.context("commit cascade delete")?;
    Ok(Some(removed))
}

// ── User repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbUserRepository {
    pub db: DatabaseConnection,
}

impl UserRepository for DbUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StudyMateError> {
        let model = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find user by id")?;
        model.map(user_from_model).transpose()
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StudyMateError> {
        let model = users::Entity::find()
            .filter(users::Column::Username.eq(username))
            .one(&self.db)
            .await
            .context("find user by username")?;
        model.map(user_from_model).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StudyMateError> {
        let model = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(&self.db)
            .await
            .context("find user by email")?;
        model.map(user_from_model).transpose()
    }

    async fn create(&self, user: &User) -> Result<(), StudyMateError> {
        let result = users::ActiveModel {
            id: Set(user.id),
            username: Set(user.username.clone()),
            email: Set(user.email.clone()),
            password_hash: Set(user.password_hash.clone()),
            first_name: Set(user.first_name.clone()),
            last_name: Set(user.last_name.clone()),
            role: Set(user.role.as_str().to_owned()),
            created_at: Set(user.created_at),
            updated_at: Set(user.updated_at),
        }
        .insert(&self.db)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => {
                // Postgres names the constraint after the column (`users_email_key`).
                if e.to_string().contains("email") {
                    Err(StudyMateError::EmailTaken)
                } else {
                    Err(StudyMateError::UsernameTaken)
                }
            }
            Err(e) => Err(anyhow::Error::new(e).context("create user").into()),
        }
    }

    async fn update_profile(
        &self,
        id: Uuid,
        update: &ProfileUpdate,
    ) -> Result<Option<User>, StudyMateError> {
        let Some(model) = users::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find user for update")?
        else {
            return Ok(None);
        };

        let mut am = model.into_active_model();
        if let Some(first_name) = &update.first_name {
            am.first_name = Set(first_name.trim().to_owned());
        }
        if let Some(last_name) = &update.last_name {
            am.last_name = Set(last_name.trim().to_owned());
        }
        if let Some(email) = &update.email {
            am.email = Set(email.clone());
        }
        am.updated_at = Set(Utc::now());

        let model = am
            .update(&self.db)
            .await
            .map_err(|e| conflict_or_internal(e, StudyMateError::EmailTaken, "update profile"))?;
        user_from_model(model).map(Some)
    }

    async fn list_students(
        &self,
        search: Option<&str>,
        page: PageRequest,
    ) -> Result<Vec<User>, StudyMateError> {
        let mut query = users::Entity::find()
            .filter(users::Column::Role.eq(UserRole::Student.as_str()));
        if let Some(needle) = search {
            query = query.filter(
                Condition::any()
                    .add(contains_ci(users::Column::Username, needle))
                    .add(contains_ci(users::Column::Email, needle))
                    .add(contains_ci(users::Column::FirstName, needle))
                    .add(contains_ci(users::Column::LastName, needle)),
            );
        }
        let models = query
            .order_by_desc(users::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .context("list students")?;
        models.into_iter().map(user_from_model).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StudyMateError> {
        let result = users::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .context("delete user")?;
        Ok(result.rows_affected > 0)
    }
}

fn user_from_model(model: users::Model) -> Result<User, StudyMateError> {
    let role = model.role.parse::<UserRole>().context("parse user role")?;
    Ok(User {
        id: model.id,
        username: model.username,
        email: model.email,
        first_name: model.first_name,
        last_name: model.last_name,
        password_hash: model.password_hash,
        role,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Department repository ────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbDepartmentRepository {
    pub db: DatabaseConnection,
}

impl DepartmentRepository for DbDepartmentRepository {
    async fn list(&self) -> Result<Vec<Department>, StudyMateError> {
        let models = departments::Entity::find()
            .order_by_asc(departments::Column::Name)
            .all(&self.db)
            .await
            .context("list departments")?;
        Ok(models.into_iter().map(department_from_model).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Department>, StudyMateError> {
        let model = departments::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find department by id")?;
        Ok(model.map(department_from_model))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Department>, StudyMateError> {
        let model = departments::Entity::find()
            .filter(departments::Column::Name.eq(name))
            .one(&self.db)
            .await
            .context("find department by name")?;
        Ok(model.map(department_from_model))
    }

    async fn create(&self, department: &Department) -> Result<(), StudyMateError> {
        departments::ActiveModel {
            id: Set(department.id),
            name: Set(department.name.clone()),
            code: Set(department.code.clone()),
            created_at: Set(department.created_at),
        }
        .insert(&self.db)
        .await
        .map_err(|e| {
            conflict_or_internal(e, StudyMateError::DepartmentExists, "create department")
        })?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        delete_cascading(&self.db, CascadeRoot::Department(id)).await
    }
}

fn department_from_model(model: departments::Model) -> Department {
    Department {
        id: model.id,
        name: model.name,
        code: model.code,
        created_at: model.created_at,
    }
}

// ── Year repository ──────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbYearRepository {
    pub db: DatabaseConnection,
}

impl YearRepository for DbYearRepository {
    async fn list(&self) -> Result<Vec<Year>, StudyMateError> {
        let models = years::Entity::find()
            .order_by_asc(years::Column::Number)
            .all(&self.db)
            .await
            .context("list years")?;
        Ok(models.into_iter().map(year_from_model).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Year>, StudyMateError> {
        let model = years::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find year by id")?;
        Ok(model.map(year_from_model))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Year>, StudyMateError> {
        let model = years::Entity::find()
            .filter(years::Column::Name.eq(name))
            .one(&self.db)
            .await
            .context("find year by name")?;
        Ok(model.map(year_from_model))
    }

    async fn create(&self, year: &Year) -> Result<(), StudyMateError> {
        years::ActiveModel {
            id: Set(year.id),
            name: Set(year.name.clone()),
            number: Set(year.number),
            created_at: Set(year.created_at),
        }
        .insert(&self.db)
        .await
        .map_err(|e| conflict_or_internal(e, StudyMateError::YearExists, "create year"))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        delete_cascading(&self.db, CascadeRoot::Year(id)).await
    }
}

fn year_from_model(model: years::Model) -> Year {
    Year {
        id: model.id,
        name: model.name,
        number: model.number,
        created_at: model.created_at,
    }
}

// ── Semester repository ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSemesterRepository {
    pub db: DatabaseConnection,
}

impl DbSemesterRepository {
    async fn details(
        &self,
        models: Vec<semesters::Model>,
    ) -> Result<Vec<SemesterDetail>, StudyMateError> {
        let year_names = year_names(&self.db, models.iter().map(|m| m.year_id)).await?;
        let department_names =
            department_names(&self.db, models.iter().filter_map(|m| m.department_id)).await?;

        Ok(models
            .into_iter()
            .map(|model| SemesterDetail {
                department_name: model
                    .department_id
                    .and_then(|id| department_names.get(&id).cloned()),
                year_name: year_names.get(&model.year_id).cloned().unwrap_or_default(),
                semester: semester_from_model(model),
            })
            .collect())
    }
}

impl SemesterRepository for DbSemesterRepository {
    async fn list(&self, filter: &SemesterFilter) -> Result<Vec<SemesterDetail>, StudyMateError> {
        let mut query = semesters::Entity::find();
        if let Some(department_id) = filter.department_id {
            query = query.filter(semesters::Column::DepartmentId.eq(department_id));
        }
        if let Some(year_id) = filter.year_id {
            query = query.filter(semesters::Column::YearId.eq(year_id));
        }
        let models = query
            .order_by_asc(semesters::Column::Number)
            .all(&self.db)
            .await
            .context("list semesters")?;
        self.details(models).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SemesterDetail>, StudyMateError> {
        let model = semesters::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find semester by id")?;
        let Some(model) = model else {
            return Ok(None);
        };
        Ok(self.details(vec![model]).await?.pop())
    }

    async fn find_by_key(
        &self,
        department_id: Option<Uuid>,
        year_id: Uuid,
        number: i32,
    ) -> Result<Option<Semester>, StudyMateError> {
        let department = match department_id {
            Some(id) => semesters::Column::DepartmentId.eq(id),
            None => semesters::Column::DepartmentId.is_null(),
        };
        let model = semesters::Entity::find()
            .filter(department)
            .filter(semesters::Column::YearId.eq(year_id))
            .filter(semesters::Column::Number.eq(number))
            .one(&self.db)
            .await
            .context("find semester by key")?;
        Ok(model.map(semester_from_model))
    }

    async fn create(&self, semester: &Semester) -> Result<(), StudyMateError> {
        semesters::ActiveModel {
            id: Set(semester.id),
            department_id: Set(semester.department_id),
            year_id: Set(semester.year_id),
            name: Set(semester.name.clone()),
            number: Set(semester.number),
            created_at: Set(semester.created_at),
        }
        .insert(&self.db)
        .await
        .map_err(|e| conflict_or_internal(e, StudyMateError::SemesterExists, "create semester"))?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        delete_cascading(&self.db, CascadeRoot::Semester(id)).await
    }
}

fn semester_from_model(model: semesters::Model) -> Semester {
    Semester {
        id: model.id,
        department_id: model.department_id,
        year_id: model.year_id,
        name: model.name,
        number: model.number,
        created_at: model.created_at,
    }
}

// ── Subject repository ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSubjectRepository {
    pub db: DatabaseConnection,
}

impl DbSubjectRepository {
    async fn details(
        &self,
        models: Vec<subjects::Model>,
    ) -> Result<Vec<SubjectDetail>, StudyMateError> {
        let hierarchies =
            load_hierarchies(&self.db, models.iter().map(|m| m.id).collect()).await?;
        Ok(models
            .into_iter()
            .filter_map(|model| {
                let h = hierarchies.get(&model.id)?;
                Some(SubjectDetail {
                    semester_name: h.semester_name.clone(),
                    semester_number: h.semester_number,
                    year_name: h.year_name.clone(),
                    department_name: h.department_name.clone(),
                    subject: subject_from_model(model),
                })
            })
            .collect())
    }
}

impl SubjectRepository for DbSubjectRepository {
    async fn list(&self, filter: &SubjectFilter) -> Result<Vec<SubjectDetail>, StudyMateError> {
        let mut query = subjects::Entity::find()
            .join(JoinType::InnerJoin, subjects::Relation::Semester.def());
        if let Some(semester_id) = filter.semester_id {
            query = query.filter(subjects::Column::SemesterId.eq(semester_id));
        }
        if let Some(department_id) = filter.department_id {
            query = query.filter(semesters::Column::DepartmentId.eq(department_id));
        }
        if let Some(year_id) = filter.year_id {
            query = query.filter(semesters::Column::YearId.eq(year_id));
        }
        if let Some(needle) = filter.search.as_deref() {
            query = query.filter(
                Condition::any()
                    .add(contains_ci((subjects::Entity, subjects::Column::Name), needle))
                    .add(contains_ci((subjects::Entity, subjects::Column::Code), needle)),
            );
        }
        let models = query
            .order_by_asc(semesters::Column::Number)
            .order_by_asc(subjects::Column::Name)
            .all(&self.db)
            .await
            .context("list subjects")?;
        self.details(models).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SubjectDetail>, StudyMateError> {
        let model = subjects::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find subject by id")?;
        let Some(model) = model else {
            return Ok(None);
        };
        Ok(self.details(vec![model]).await?.pop())
    }

    async fn find_by_name(
        &self,
        semester_id: Uuid,
        name: &str,
    ) -> Result<Option<Subject>, StudyMateError> {
        let model = subjects::Entity::find()
            .filter(subjects::Column::SemesterId.eq(semester_id))
            .filter(subjects::Column::Name.eq(name))
            .one(&self.db)
            .await
            .context("find subject by name")?;
        Ok(model.map(subject_from_model))
    }

    async fn create(&self, subject: &Subject) -> Result<(), StudyMateError> {
        subjects::ActiveModel {
            id: Set(subject.id),
            semester_id: Set(subject.semester_id),
            name: Set(subject.name.clone()),
            code: Set(subject.code.clone()),
            created_at: Set(subject.created_at),
        }
        .insert(&self.db)
        .await
        .context("create subject")?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        delete_cascading(&self.db, CascadeRoot::Subject(id)).await
    }
}

fn subject_from_model(model: subjects::Model) -> Subject {
    Subject {
        id: model.id,
        semester_id: model.semester_id,
        name: model.name,
        code: model.code,
        created_at: model.created_at,
    }
}

// ── Material repository ──────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbMaterialRepository {
    pub db: DatabaseConnection,
}

impl DbMaterialRepository {
    /// Materials joined with subject and semester so hierarchy columns can be filtered.
    fn joined() -> sea_orm::Select<study_materials::Entity> {
        study_materials::Entity::find()
            .join(JoinType::InnerJoin, study_materials::Relation::Subject.def())
            .join(JoinType::InnerJoin, subjects::Relation::Semester.def())
    }

    async fn details(
        &self,
        models: Vec<study_materials::Model>,
    ) -> Result<Vec<MaterialDetail>, StudyMateError> {
        let hierarchies =
            load_hierarchies(&self.db, models.iter().map(|m| m.subject_id).collect()).await?;
        let uploaders: Vec<Uuid> = models.iter().filter_map(|m| m.uploaded_by).collect();
        let usernames: HashMap<Uuid, String> = if uploaders.is_empty() {
            HashMap::new()
        } else {
            users::Entity::find()
                .select_only()
                .column(users::Column::Id)
                .column(users::Column::Username)
                .filter(users::Column::Id.is_in(uploaders))
                .into_tuple::<(Uuid, String)>()
                .all(&self.db)
                .await
                .context("load uploader names")?
                .into_iter()
                .collect()
        };

        let mut details = Vec::with_capacity(models.len());
        for model in models {
            let Some(hierarchy) = hierarchies.get(&model.subject_id).cloned() else {
                continue;
            };
            let uploaded_by_username = model.uploaded_by.and_then(|id| usernames.get(&id).cloned());
            details.push(MaterialDetail {
                material: material_from_model(model)?,
                hierarchy,
                uploaded_by_username,
            });
        }
        Ok(details)
    }
}

impl MaterialRepository for DbMaterialRepository {
    async fn list(
        &self,
        filter: &MaterialFilter,
        page: PageRequest,
    ) -> Result<Vec<MaterialDetail>, StudyMateError> {
        let mut query = Self::joined();
        if let Some(subject_id) = filter.subject_id {
            query = query.filter(study_materials::Column::SubjectId.eq(subject_id));
        }
        if let Some(semester_id) = filter.semester_id {
            query = query.filter(subjects::Column::SemesterId.eq(semester_id));
        }
        if let Some(year_id) = filter.year_id {
            query = query.filter(semesters::Column::YearId.eq(year_id));
        }
        if let Some(department_id) = filter.department_id {
            query = query.filter(semesters::Column::DepartmentId.eq(department_id));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(study_materials::Column::MaterialType.eq(kind.as_str()));
        }
        if let Some(needle) = filter.search.as_deref() {
            query = query.filter(
                Condition::any()
                    .add(contains_ci(
                        (study_materials::Entity, study_materials::Column::Title),
                        needle,
                    ))
                    .add(contains_ci(
                        (study_materials::Entity, study_materials::Column::Description),
                        needle,
                    ))
                    .add(contains_ci((subjects::Entity, subjects::Column::Name), needle)),
            );
        }
        let models = query
            .order_by_desc(study_materials::Column::CreatedAt)
            .offset(page.offset())
            .limit(page.limit())
            .all(&self.db)
            .await
            .context("list materials")?;
        self.details(models).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<StudyMaterial>, StudyMateError> {
        let model = study_materials::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find material by id")?;
        model.map(material_from_model).transpose()
    }

    async fn find_detail(&self, id: Uuid) -> Result<Option<MaterialDetail>, StudyMateError> {
        let model = study_materials::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find material detail")?;
        let Some(model) = model else {
            return Ok(None);
        };
        Ok(self.details(vec![model]).await?.pop())
    }

    async fn hierarchy_of_subject(
        &self,
        subject_id: Uuid,
    ) -> Result<Option<MaterialHierarchy>, StudyMateError> {
        let mut hierarchies = load_hierarchies(&self.db, vec![subject_id]).await?;
        Ok(hierarchies.remove(&subject_id))
    }

    async fn create(&self, material: &StudyMaterial) -> Result<(), StudyMateError> {
        study_materials::ActiveModel {
            id: Set(material.id),
            subject_id: Set(material.subject_id),
            title: Set(material.title.clone()),
            description: Set(material.description.clone()),
            material_type: Set(material.kind.as_str().to_owned()),
            uploaded_by: Set(material.uploaded_by),
            object_id: Set(None),
            url: Set(None),
            secure_url: Set(None),
            original_filename: Set(None),
            byte_size: Set(None),
            format: Set(None),
            legacy_file_path: Set(material.legacy_file_path.clone()),
            created_at: Set(material.created_at),
            updated_at: Set(material.updated_at),
        }
        .insert(&self.db)
        .await
        .context("create material")?;
        Ok(())
    }

    async fn attach_blob(&self, id: Uuid, blob: &BlobRef) -> Result<bool, StudyMateError> {
        let result = study_materials::Entity::update_many()
            .col_expr(study_materials::Column::ObjectId, Expr::value(blob.object_id.clone()))
            .col_expr(study_materials::Column::Url, Expr::value(blob.url.clone()))
            .col_expr(study_materials::Column::SecureUrl, Expr::value(blob.secure_url.clone()))
            .col_expr(
                study_materials::Column::OriginalFilename,
                Expr::value(blob.original_filename.clone()),
            )
            .col_expr(study_materials::Column::ByteSize, Expr::value(blob.byte_size))
            .col_expr(study_materials::Column::Format, Expr::value(blob.format.clone()))
            .col_expr(study_materials::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(study_materials::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("attach blob to material")?;
        Ok(result.rows_affected > 0)
    }

    async fn update_meta(
        &self,
        id: Uuid,
        update: &MaterialUpdate,
    ) -> Result<Option<StudyMaterial>, StudyMateError> {
        let Some(model) = study_materials::Entity::find_by_id(id)
            .one(&self.db)
            .await
            .context("find material for update")?
        else {
            return Ok(None);
        };

        let mut am = model.into_active_model();
        if let Some(title) = &update.title {
            am.title = Set(title.clone());
        }
        if let Some(description) = &update.description {
            am.description = Set(description.clone());
        }
        if let Some(kind) = update.kind {
            am.material_type = Set(kind.as_str().to_owned());
        }
        am.updated_at = Set(Utc::now());

        let model = am.update(&self.db).await.context("update material")?;
        material_from_model(model).map(Some)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StudyMateError> {
        let result = study_materials::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .context("delete material")?;
        Ok(result.rows_affected > 0)
    }

    async fn list_in_scope(
        &self,
        scope: MaterialScope,
    ) -> Result<Vec<StudyMaterial>, StudyMateError> {
        let query = match scope {
            MaterialScope::Department(id) => {
                Self::joined().filter(semesters::Column::DepartmentId.eq(id))
            }
            MaterialScope::Year(id) => Self::joined().filter(semesters::Column::YearId.eq(id)),
            MaterialScope::Semester(id) => {
                Self::joined().filter(subjects::Column::SemesterId.eq(id))
            }
            MaterialScope::Subject(id) => study_materials::Entity::find()
                .filter(study_materials::Column::SubjectId.eq(id)),
            MaterialScope::Uploader(id) => study_materials::Entity::find()
                .filter(study_materials::Column::UploadedBy.eq(id)),
        };
        let models = query
            .all(&self.db)
            .await
            .context("list materials in scope")?;
        models.into_iter().map(material_from_model).collect()
    }
}

fn material_from_model(model: study_materials::Model) -> Result<StudyMaterial, StudyMateError> {
    let kind = model
        .material_type
        .parse::<MaterialKind>()
        .context("parse material type")?;
    // A partially written blob reads back as no blob at all.
    let blob = match (
        model.object_id,
        model.url,
        model.secure_url,
        model.original_filename,
        model.byte_size,
        model.format,
    ) {
        (
            Some(object_id),
            Some(url),
            Some(secure_url),
            Some(original_filename),
            Some(byte_size),
            Some(format),
        ) => Some(BlobRef {
            object_id,
            url,
            secure_url,
            original_filename,
            byte_size,
            format,
        }),
        _ => None,
    };
    Ok(StudyMaterial {
        id: model.id,
        subject_id: model.subject_id,
        title: model.title,
        description: model.description,
        kind,
        uploaded_by: model.uploaded_by,
        blob,
        legacy_file_path: model.legacy_file_path,
        created_at: model.created_at,
        updated_at: model.updated_at,
    })
}

// ── Hierarchy loading ────────────────────────────────────────────────────────

async fn year_names(
    db: &DatabaseConnection,
    ids: impl Iterator<Item = Uuid>,
) -> Result<HashMap<Uuid, String>, StudyMateError> {
    let ids: Vec<Uuid> = ids.collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = years::Entity::find()
        .select_only()
        .column(years::Column::Id)
        .column(years::Column::Name)
        .filter(years::Column::Id.is_in(ids))
        .into_tuple::<(Uuid, String)>()
        .all(db)
        .await
        .context("load year names")?;
    Ok(rows.into_iter().collect())
}

async fn department_names(
    db: &DatabaseConnection,
    ids: impl Iterator<Item = Uuid>,
) -> Result<HashMap<Uuid, String>, StudyMateError> {
    let ids: Vec<Uuid> = ids.collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = departments::Entity::find()
        .select_only()
        .column(departments::Column::Id)
        .column(departments::Column::Name)
        .filter(departments::Column::Id.is_in(ids))
        .into_tuple::<(Uuid, String)>()
        .all(db)
        .await
        .context("load department names")?;
    Ok(rows.into_iter().collect())
}

/// Resolve subject → semester → year / department for every subject id, four queries total.
async fn load_hierarchies(
    db: &DatabaseConnection,
    mut subject_ids: Vec<Uuid>,
) -> Result<HashMap<Uuid, MaterialHierarchy>, StudyMateError> {
    subject_ids.sort_unstable();
    subject_ids.dedup();
    if subject_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let subject_models = subjects::Entity::find()
        .filter(subjects::Column::Id.is_in(subject_ids))
        .all(db)
        .await
        .context("load subjects")?;
    let mut semester_ids: Vec<Uuid> = subject_models.iter().map(|s| s.semester_id).collect();
    semester_ids.sort_unstable();
    semester_ids.dedup();
    let semester_models: HashMap<Uuid, semesters::Model> = semesters::Entity::find()
        .filter(semesters::Column::Id.is_in(semester_ids))
        .all(db)
        .await
        .context("load semesters")?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let year_names = year_names(db, semester_models.values().map(|s| s.year_id)).await?;
    let department_names =
        department_names(db, semester_models.values().filter_map(|s| s.department_id)).await?;

    Ok(subject_models
        .into_iter()
        .filter_map(|subject| {
            let semester = semester_models.get(&subject.semester_id)?;
            let hierarchy = MaterialHierarchy {
                subject_id: subject.id,
                subject_name: subject.name,
                semester_id: semester.id,
                semester_name: semester.name.clone(),
                semester_number: semester.number,
                year_id: semester.year_id,
                year_name: year_names.get(&semester.year_id).cloned()?,
                department_id: semester.department_id,
                department_name: semester
                    .department_id
                    .and_then(|id| department_names.get(&id).cloned()),
            };
            Some((subject.id, hierarchy))
        })
        .collect())
}

// ── Projection source ────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbProjectionSource {
    pub db: DatabaseConnection,
}

impl ProjectionSource for DbProjectionSource {
    async fn load(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<Option<MirrorDocument>, StudyMateError> {
        match kind {
            EntityKind::User => {
                let users = DbUserRepository {
                    db: self.db.clone(),
                };
                Ok(users.find_by_id(id).await?.as_ref().map(user_document))
            }
            EntityKind::Material => {
                let materials = DbMaterialRepository {
                    db: self.db.clone(),
                };
                Ok(materials.find_detail(id).await?.as_ref().map(material_document))
            }
        }
    }

    async fn ids(&self, kind: EntityKind) -> Result<Vec<Uuid>, StudyMateError> {
        let ids = match kind {
            EntityKind::User => users::Entity::find()
                .select_only()
                .column(users::Column::Id)
                .into_tuple::<Uuid>()
                .all(&self.db)
                .await
                .context("list user ids")?,
            EntityKind::Material => study_materials::Entity::find()
                .select_only()
                .column(study_materials::Column::Id)
                .into_tuple::<Uuid>()
                .all(&self.db)
                .await
                .context("list material ids")?,
        };
        Ok(ids)
    }
}

// ── Sync outbox ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DbSyncOutbox {
    pub db: DatabaseConnection,
}

impl SyncOutbox for DbSyncOutbox {
    async fn enqueue(
        &self,
        kind: EntityKind,
        id: Uuid,
        op: SyncOp,
        error: &str,
    ) -> Result<(), StudyMateError> {
        let now = Utc::now();
        let row = sync_outbox::ActiveModel {
            id: Set(Uuid::now_v7()),
            entity_kind: Set(kind.as_str().to_owned()),
            entity_id: Set(id),
            op: Set(op.as_str().to_owned()),
            idempotency_key: Set(outbox_key(kind, id)),
            attempts: Set(0),
            last_error: Set(Some(error.to_owned())),
            created_at: Set(now),
            next_attempt_at: Set(now),
            processed_at: Set(None),
            failed_at: Set(None),
        };
        sync_outbox::Entity::insert(row)
            .on_conflict(
                OnConflict::column(sync_outbox::Column::IdempotencyKey)
                    .update_columns([
                        sync_outbox::Column::Op,
                        sync_outbox::Column::Attempts,
                        sync_outbox::Column::LastError,
                        sync_outbox::Column::NextAttemptAt,
                        sync_outbox::Column::ProcessedAt,
                        sync_outbox::Column::FailedAt,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .context("enqueue sync outbox row")?;
        Ok(())
    }

    async fn due(
        &self,
        now: DateTime<Utc>,
        limit: u64,
    ) -> Result<Vec<OutboxEntry>, StudyMateError> {
        let models = sync_outbox::Entity::find()
            .filter(sync_outbox::Column::ProcessedAt.is_null())
            .filter(sync_outbox::Column::FailedAt.is_null())
            .filter(sync_outbox::Column::NextAttemptAt.lte(now))
            .order_by_asc(sync_outbox::Column::NextAttemptAt)
            .limit(limit)
            .all(&self.db)
            .await
            .context("list due outbox rows")?;
        models
            .into_iter()
            .map(|model| -> Result<OutboxEntry, StudyMateError> {
                Ok(OutboxEntry {
                    id: model.id,
                    kind: model.entity_kind.parse()?,
                    entity_id: model.entity_id,
                    op: model.op.parse()?,
                    attempts: model.attempts,
                })
            })
            .collect()
    }

    async fn complete(&self, id: Uuid) -> Result<(), StudyMateError> {
        sync_outbox::Entity::update_many()
            .col_expr(sync_outbox::Column::ProcessedAt, Expr::value(Utc::now()))
            .col_expr(sync_outbox::Column::LastError, Expr::value(Option::<String>::None))
            .filter(sync_outbox::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("complete outbox row")?;
        Ok(())
    }

    async fn reschedule(
        &self,
        id: Uuid,
        attempts: i32,
        error: &str,
        next_attempt_at: Option<DateTime<Utc>>,
    ) -> Result<(), StudyMateError> {
        let mut update = sync_outbox::Entity::update_many()
            .col_expr(sync_outbox::Column::Attempts, Expr::value(attempts))
            .col_expr(sync_outbox::Column::LastError, Expr::value(error.to_owned()));
        update = match next_attempt_at {
            Some(at) => update.col_expr(sync_outbox::Column::NextAttemptAt, Expr::value(at)),
            None => update.col_expr(sync_outbox::Column::FailedAt, Expr::value(Utc::now())),
        };
        update
            .filter(sync_outbox::Column::Id.eq(id))
            .exec(&self.db)
            .await
            .context("reschedule outbox row")?;
        Ok(())
    }
}
