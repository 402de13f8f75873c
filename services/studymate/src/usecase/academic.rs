use std::future::Future;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use studymate_core::retry::RetryPolicy;

use crate::domain::repository::{
    DepartmentRepository, ObjectStorage, Projector, SemesterRepository, SubjectRepository,
    YearRepository,
};
use crate::domain::types::{
    Department, MaterialScope, Semester, SemesterDetail, SemesterFilter, StudyMaterial, Subject,
    SubjectDetail, SubjectFilter, Year,
};
use crate::error::StudyMateError;
use crate::usecase::upload::purge_removed_materials;

/// Collaborators needed to clean up the materials a cascade delete takes with it.
pub struct CascadeCleanup<S: ObjectStorage, P: Projector> {
    pub storage: S,
    pub sync: P,
    pub retry: RetryPolicy,
}

impl<S: ObjectStorage, P: Projector> CascadeCleanup<S, P> {
    /// Run `delete`, then remove the blobs and mirror copies of the materials it reports.
    /// Returns `false` without side effects if nothing was deleted.
    async fn run<F, Fut>(&self, scope: MaterialScope, delete: F) -> Result<bool, StudyMateError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Vec<StudyMaterial>>, StudyMateError>>,
    {
        let Some(removed) = delete().await? else {
            return Ok(false);
        };
        info!(?scope, materials = removed.len(), "cascade delete");
        purge_removed_materials(&self.storage, &self.sync, &self.retry, removed).await;
        Ok(true)
    }
}

fn required(value: &str, what: &str) -> Result<String, StudyMateError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StudyMateError::validation(format!("{what} is required")));
    }
    Ok(trimmed.to_owned())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

// ── Departments ──────────────────────────────────────────────────────────────

pub struct ListDepartmentsUseCase<R: DepartmentRepository> {
    pub repo: R,
}

impl<R: DepartmentRepository> ListDepartmentsUseCase<R> {
    pub async fn execute(&self) -> Result<Vec<Department>, StudyMateError> {
        self.repo.list().await
    }
}

pub struct GetDepartmentUseCase<R: DepartmentRepository> {
    pub repo: R,
}

impl<R: DepartmentRepository> GetDepartmentUseCase<R> {
    pub async fn execute(&self, id: Uuid) -> Result<Department, StudyMateError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(StudyMateError::DepartmentNotFound)
    }
}

pub struct CreateDepartmentInput {
    pub name: String,
    pub code: String,
}

pub struct CreateDepartmentUseCase<R: DepartmentRepository> {
    pub repo: R,
}

impl<R: DepartmentRepository> CreateDepartmentUseCase<R> {
    pub async fn execute(&self, input: CreateDepartmentInput) -> Result<Department, StudyMateError> {
        let name = required(&input.name, "name")?;
        let code = required(&input.code, "code")?;
        if self.repo.find_by_name(&name).await?.is_some() {
            return Err(StudyMateError::DepartmentExists);
        }
        let department = Department {
            id: Uuid::now_v7(),
            name,
            code,
            created_at: Utc::now(),
        };
        self.repo.create(&department).await?;
        Ok(department)
    }
}

pub struct DeleteDepartmentUseCase<R, S, P>
where
    R: DepartmentRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub repo: R,
    pub cleanup: CascadeCleanup<S, P>,
}

impl<R, S, P> DeleteDepartmentUseCase<R, S, P>
where
    R: DepartmentRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub async fn execute(&self, id: Uuid) -> Result<(), StudyMateError> {
        let deleted = self
            .cleanup
            .run(MaterialScope::Department(id), || self.repo.delete(id))
            .await?;
        if !deleted {
            return Err(StudyMateError::DepartmentNotFound);
        }
        Ok(())
    }
}

// ── Years ────────────────────────────────────────────────────────────────────

pub struct ListYearsUseCase<R: YearRepository> {
    pub repo: R,
}

impl<R: YearRepository> ListYearsUseCase<R> {
    pub async fn execute(&self) -> Result<Vec<Year>, StudyMateError> {
        self.repo.list().await
    }
}

pub struct GetYearUseCase<R: YearRepository> {
    pub repo: R,
}

impl<R: YearRepository> GetYearUseCase<R> {
    pub async fn execute(&self, id: Uuid) -> Result<Year, StudyMateError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(StudyMateError::YearNotFound)
    }
}

pub struct CreateYearInput {
    pub name: String,
    pub number: i32,
}

pub struct CreateYearUseCase<R: YearRepository> {
    pub repo: R,
}

impl<R: YearRepository> CreateYearUseCase<R> {
    pub async fn execute(&self, input: CreateYearInput) -> Result<Year, StudyMateError> {
        let name = required(&input.name, "name")?;
        if input.number < 1 {
            return Err(StudyMateError::validation("number must be positive"));
        }
        if self.repo.find_by_name(&name).await?.is_some() {
            return Err(StudyMateError::YearExists);
        }
        let year = Year {
            id: Uuid::now_v7(),
            name,
            number: input.number,
            created_at: Utc::now(),
        };
        self.repo.create(&year).await?;
        Ok(year)
    }
}

pub struct DeleteYearUseCase<R, S, P>
where
    R: YearRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub repo: R,
    pub cleanup: CascadeCleanup<S, P>,
}

impl<R, S, P> DeleteYearUseCase<R, S, P>
where
    R: YearRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub async fn execute(&self, id: Uuid) -> Result<(), StudyMateError> {
        let deleted = self
            .cleanup
            .run(MaterialScope::Year(id), || self.repo.delete(id))
            .await?;
        if !deleted {
            return Err(StudyMateError::YearNotFound);
        }
        Ok(())
    }
}

// ── Semesters ────────────────────────────────────────────────────────────────

pub struct ListSemestersUseCase<R: SemesterRepository> {
    pub repo: R,
}

impl<R: SemesterRepository> ListSemestersUseCase<R> {
    pub async fn execute(
        &self,
        filter: SemesterFilter,
    ) -> Result<Vec<SemesterDetail>, StudyMateError> {
        self.repo.list(&filter).await
    }
}

pub struct GetSemesterUseCase<R: SemesterRepository> {
    pub repo: R,
}

impl<R: SemesterRepository> GetSemesterUseCase<R> {
    pub async fn execute(&self, id: Uuid) -> Result<SemesterDetail, StudyMateError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(StudyMateError::SemesterNotFound)
    }
}

pub struct CreateSemesterInput {
    pub department_id: Option<Uuid>,
    pub year_id: Uuid,
    pub number: i32,
    /// Defaults to `Semester {number}`.
    pub name: Option<String>,
}

pub struct CreateSemesterUseCase<S: SemesterRepository, D: DepartmentRepository, Y: YearRepository>
{
    pub repo: S,
    pub departments: D,
    pub years: Y,
}

impl<S: SemesterRepository, D: DepartmentRepository, Y: YearRepository>
    CreateSemesterUseCase<S, D, Y>
{
    pub async fn execute(
        &self,
        input: CreateSemesterInput,
    ) -> Result<SemesterDetail, StudyMateError> {
        if input.number < 1 {
            return Err(StudyMateError::validation("number must be positive"));
        }
        let year = self
            .years
            .find_by_id(input.year_id)
            .await?
            .ok_or(StudyMateError::YearNotFound)?;
        let department = match input.department_id {
            Some(id) => Some(
                self.departments
                    .find_by_id(id)
                    .await?
                    .ok_or(StudyMateError::DepartmentNotFound)?,
            ),
            None => None,
        };
        if self
            .repo
            .find_by_key(input.department_id, input.year_id, input.number)
            .await?
            .is_some()
        {
            return Err(StudyMateError::SemesterExists);
        }

        let semester = Semester {
            id: Uuid::now_v7(),
            department_id: input.department_id,
            year_id: year.id,
            name: non_empty(input.name).unwrap_or_else(|| format!("Semester {}", input.number)),
            number: input.number,
            created_at: Utc::now(),
        };
        self.repo.create(&semester).await?;
        Ok(SemesterDetail {
            semester,
            department_name: department.map(|d| d.name),
            year_name: year.name,
        })
    }
}

pub struct DeleteSemesterUseCase<R, S, P>
where
    R: SemesterRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub repo: R,
    pub cleanup: CascadeCleanup<S, P>,
}

impl<R, S, P> DeleteSemesterUseCase<R, S, P>
where
    R: SemesterRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub async fn execute(&self, id: Uuid) -> Result<(), StudyMateError> {
        let deleted = self
            .cleanup
            .run(MaterialScope::Semester(id), || self.repo.delete(id))
            .await?;
        if !deleted {
            return Err(StudyMateError::SemesterNotFound);
        }
        Ok(())
    }
}

// ── Subjects ─────────────────────────────────────────────────────────────────

pub struct ListSubjectsUseCase<R: SubjectRepository> {
    pub repo: R,
}

impl<R: SubjectRepository> ListSubjectsUseCase<R> {
    pub async fn execute(
        &self,
        mut filter: SubjectFilter,
    ) -> Result<Vec<SubjectDetail>, StudyMateError> {
        filter.search = non_empty(filter.search);
        self.repo.list(&filter).await
    }
}

pub struct GetSubjectUseCase<R: SubjectRepository> {
    pub repo: R,
}

impl<R: SubjectRepository> GetSubjectUseCase<R> {
    pub async fn execute(&self, id: Uuid) -> Result<SubjectDetail, StudyMateError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(StudyMateError::SubjectNotFound)
    }
}

pub struct CreateSubjectInput {
    pub semester_id: Uuid,
    pub name: String,
    pub code: Option<String>,
}

pub struct CreateSubjectUseCase<R: SubjectRepository, S: SemesterRepository> {
    pub repo: R,
    pub semesters: S,
}

impl<R: SubjectRepository, S: SemesterRepository> CreateSubjectUseCase<R, S> {
    pub async fn execute(&self, input: CreateSubjectInput) -> Result<SubjectDetail, StudyMateError> {
        let name = required(&input.name, "name")?;
        let parent = self
            .semesters
            .find_by_id(input.semester_id)
            .await?
            .ok_or(StudyMateError::SemesterNotFound)?;

        let subject = Subject {
            id: Uuid::now_v7(),
            semester_id: parent.semester.id,
            name,
            code: non_empty(input.code),
            created_at: Utc::now(),
        };
        self.repo.create(&subject).await?;
        Ok(SubjectDetail {
            subject,
            semester_name: parent.semester.name,
            semester_number: parent.semester.number,
            year_name: parent.year_name,
            department_name: parent.department_name,
        })
    }
}

pub struct DeleteSubjectUseCase<R, S, P>
where
    R: SubjectRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub repo: R,
    pub cleanup: CascadeCleanup<S, P>,
}

impl<R, S, P> DeleteSubjectUseCase<R, S, P>
where
    R: SubjectRepository,
    S: ObjectStorage,
    P: Projector,
{
    pub async fn execute(&self, id: Uuid) -> Result<(), StudyMateError> {
        let deleted = self
            .cleanup
            .run(MaterialScope::Subject(id), || self.repo.delete(id))
            .await?;
        if !deleted {
            return Err(StudyMateError::SubjectNotFound);
        }
        Ok(())
    }
}
