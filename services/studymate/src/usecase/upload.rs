use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use studymate_core::retry::{RetryPolicy, retry};
use studymate_domain::material::MaterialKind;

use crate::domain::projection::{EntityKind, SyncOp};
use crate::domain::repository::{MaterialRepository, ObjectStorage, Projector};
use crate::domain::types::{BlobRef, FileUpload, MaterialDetail, StudyMaterial};
use crate::error::{ExternalError, StudyMateError};

pub struct NewMaterial {
    pub subject_id: Uuid,
    pub title: String,
    pub description: String,
    pub kind: MaterialKind,
    pub uploaded_by: Option<Uuid>,
}

/// Orchestrates record creation, blob upload, blob patch and mirror projection, with a
/// compensating action for every failure point.
///
/// A record with blob columns is only ever written after its object exists in storage.
pub struct UploadLifecycle<R: MaterialRepository, S: ObjectStorage, P: Projector> {
    pub materials: R,
    pub storage: S,
    pub sync: P,
    pub retry: RetryPolicy,
}

impl<R: MaterialRepository, S: ObjectStorage, P: Projector> UploadLifecycle<R, S, P> {
    /// Create a material and attach its file.
    ///
    /// Payload validation happens before any record or network call. A failed upload
    /// deletes the record again and returns `UploadFailed`.
    pub async fn attach_file(
        &self,
        input: NewMaterial,
        mut file: FileUpload,
    ) -> Result<MaterialDetail, StudyMateError> {
        let title = input.title.trim().to_owned();
        if title.is_empty() {
            return Err(StudyMateError::validation("title is required"));
        }
        file.validate()?;

        let hierarchy = self
            .materials
            .hierarchy_of_subject(input.subject_id)
            .await?
            .ok_or(StudyMateError::SubjectNotFound)?;

        let now = Utc::now();
        let material = StudyMaterial {
            id: Uuid::now_v7(),
            subject_id: input.subject_id,
            title,
            description: input.description,
            kind: input.kind,
            uploaded_by: input.uploaded_by,
            blob: None,
            legacy_file_path: None,
            created_at: now,
            updated_at: now,
        };
        self.materials.create(&material).await?;

        let blob = match self.upload(&mut file, &hierarchy.storage_folder()).await {
            Ok(blob) => blob,
            Err(e) => {
                warn!(material_id = %material.id, error = %e, "upload failed; removing record");
                self.discard_record(material.id).await;
                return Err(StudyMateError::UploadFailed(e.into()));
            }
        };

        match self.materials.attach_blob(material.id, &blob).await {
            Ok(true) => {}
            Ok(false) => {
                self.discard_blob(&blob.object_id).await;
                return Err(StudyMateError::MaterialNotFound);
            }
            Err(e) => {
                self.discard_blob(&blob.object_id).await;
                self.discard_record(material.id).await;
                return Err(e);
            }
        }
        info!(material_id = %material.id, object_id = %blob.object_id, "material uploaded");

        // Mirror failure leaves the record valid; the coordinator queues a retry.
        self.sync
            .project(EntityKind::Material, material.id, SyncOp::Upsert)
            .await;

        self.materials
            .find_detail(material.id)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)
    }

    /// Swap the file of an existing material. The old object is deleted only after the
    /// record points at the new one.
    pub async fn replace_file(
        &self,
        material_id: Uuid,
        mut file: FileUpload,
    ) -> Result<MaterialDetail, StudyMateError> {
        file.validate()?;

        let material = self
            .materials
            .find_by_id(material_id)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)?;
        let hierarchy = self
            .materials
            .hierarchy_of_subject(material.subject_id)
            .await?
            .ok_or(StudyMateError::SubjectNotFound)?;

        let blob = self
            .upload(&mut file, &hierarchy.storage_folder())
            .await
            .map_err(|e| StudyMateError::UploadFailed(e.into()))?;

        match self.materials.attach_blob(material_id, &blob).await {
            Ok(true) => {}
            Ok(false) => {
                self.discard_blob(&blob.object_id).await;
                return Err(StudyMateError::MaterialNotFound);
            }
            Err(e) => {
                self.discard_blob(&blob.object_id).await;
                return Err(e);
            }
        }

        if let Some(old) = material.blob.filter(|old| old.object_id != blob.object_id) {
            self.discard_blob(&old.object_id).await;
        }
        info!(material_id = %material_id, object_id = %blob.object_id, "material file replaced");

        self.sync
            .project(EntityKind::Material, material_id, SyncOp::Upsert)
            .await;

        self.materials
            .find_detail(material_id)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)
    }

    /// Delete blob, then mirror copy, then the record. The record goes last so an
    /// interrupted delete can always be retried from it. The mirror copy is removed once
    /// more after the record is gone.
    pub async fn detach_file(&self, material_id: Uuid) -> Result<(), StudyMateError> {
        let material = self
            .materials
            .find_by_id(material_id)
            .await?
            .ok_or(StudyMateError::MaterialNotFound)?;

        if let Some(blob) = &material.blob {
            let storage = &self.storage;
            if let Err(e) = retry(&self.retry, "object storage delete", || {
                storage.delete(&blob.object_id)
            })
            .await
            {
                warn!(
                    material_id = %material_id,
                    object_id = %blob.object_id,
                    error = %e,
                    "blob delete failed; object orphaned"
                );
            }
        }

        self.sync
            .project(EntityKind::Material, material_id, SyncOp::Delete)
            .await;

        if !self.materials.delete(material_id).await? {
            return Err(StudyMateError::MaterialNotFound);
        }
        // A projection that ran between the two steps may have rebuilt the copy from the
        // row that was still there.
        self.sync
            .project(EntityKind::Material, material_id, SyncOp::Delete)
            .await;
        info!(material_id = %material_id, "material deleted");
        Ok(())
    }

    async fn upload(&self, file: &mut FileUpload, folder: &str) -> Result<BlobRef, ExternalError> {
        let storage = &self.storage;
        retry(&self.retry, "object storage upload", || {
            let bytes = file.payload();
            let filename = file.filename().to_owned();
            async move { storage.upload(bytes, &filename, folder).await }
        })
        .await
    }

    async fn discard_record(&self, id: Uuid) {
        if let Err(e) = self.materials.delete(id).await {
            error!(
                material_id = %id,
                error = %e,
                "compensation failed; record without file left behind"
            );
        }
    }

    async fn discard_blob(&self, object_id: &str) {
        let storage = &self.storage;
        let result = retry(&self.retry, "object storage delete", || {
            storage.delete(object_id)
        })
        .await;
        if let Err(e) = result {
            error!(object_id, error = %e, "compensation failed; object orphaned");
        }
    }
}

/// Clean up after a cascade delete removed `materials` from the entity store: delete
/// their objects (best effort) and their mirror copies.
pub async fn purge_removed_materials<S: ObjectStorage, P: Projector>(
    storage: &S,
    sync: &P,
    policy: &RetryPolicy,
    materials: Vec<StudyMaterial>,
) {
    for material in materials {
        if let Some(blob) = &material.blob {
            let result = retry(policy, "object storage delete", || {
                storage.delete(&blob.object_id)
            })
            .await;
            if let Err(e) = result {
                warn!(
                    material_id = %material.id,
                    object_id = %blob.object_id,
                    error = %e,
                    "blob delete failed; object orphaned"
                );
            }
        }
        sync.project(EntityKind::Material, material.id, SyncOp::Delete)
            .await;
    }
}
