use uuid::Uuid;

use studymate_domain::pagination::PageRequest;

use crate::domain::projection::{EntityKind, SyncOp};
use crate::domain::repository::{MaterialRepository, Projector};
use crate::domain::types::{DownloadTarget, MaterialDetail, MaterialFilter, MaterialUpdate};
use crate::error::StudyMateError;

// ── ListMaterials ────────────────────────────────────────────────────────────

pub struct ListMaterialsUseCase<R: MaterialRepository> {
    pub repo: R,
}

impl<R: MaterialRepository> ListMaterialsUseCase<R> {
    pub async fn execute(
        &self,
        mut filter: MaterialFilter,
        page: PageRequest,
    ) -> Result<Vec<MaterialDetail>, StudyMateError> {
        filter.search = filter
            .search
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty());
        self.repo.list(&filter, page).await
    }
}

// ── GetMaterial ──────────────────────────────────────────────────────────────

pub struct GetMaterialUseCase<R: MaterialRepository> {
    pub repo: R,
}

impl<R: MaterialRepository> GetMaterialUseCase<R> {
    pub async fn execute(&self, id: Uuid) -> Result<MaterialDetail, StudyMateError> {
        self.repo
            .find_detail(id)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)
    }
}

// ── UpdateMaterial ───────────────────────────────────────────────────────────

pub struct UpdateMaterialUseCase<R: MaterialRepository, P: Projector> {
    pub repo: R,
    pub sync: P,
}

impl<R: MaterialRepository, P: Projector> UpdateMaterialUseCase<R, P> {
    pub async fn execute(
        &self,
        id: Uuid,
        mut update: MaterialUpdate,
    ) -> Result<MaterialDetail, StudyMateError> {
        if update.is_empty() {
            return Err(StudyMateError::validation("nothing to update"));
        }
        if let Some(title) = update.title.as_mut() {
            *title = title.trim().to_owned();
            if title.is_empty() {
                return Err(StudyMateError::validation("title must not be empty"));
            }
        }

        self.repo
            .update_meta(id, &update)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)?;

        self.sync
            .project(EntityKind::Material, id, SyncOp::Upsert)
            .await;

        self.repo
            .find_detail(id)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)
    }
}

// ── ResolveDownload ──────────────────────────────────────────────────────────

pub struct ResolveDownloadUseCase<R: MaterialRepository> {
    pub repo: R,
}

impl<R: MaterialRepository> ResolveDownloadUseCase<R> {
    pub async fn execute(&self, id: Uuid) -> Result<DownloadTarget, StudyMateError> {
        let material = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)?;
        material
            .download_target()
            .ok_or(StudyMateError::FileNotFound)
    }
}
