use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::FromRef;
use sea_orm::DatabaseConnection;

use studymate_auth_types::identity::JwtSecret;
use studymate_core::retry::RetryPolicy;

use crate::infra::db::{
    DbDepartmentRepository, DbMaterialRepository, DbProjectionSource, DbSemesterRepository,
    DbSubjectRepository, DbSyncOutbox, DbUserRepository, DbYearRepository,
};
use crate::infra::mirror::MongoMirrorStore;
use crate::infra::storage::CloudinaryClient;
use crate::usecase::academic::CascadeCleanup;
use crate::usecase::sync::SyncCoordinator;
use crate::usecase::upload::UploadLifecycle;

pub type AppSyncCoordinator = SyncCoordinator<DbProjectionSource, MongoMirrorStore, DbSyncOutbox>;

/// Shared application state passed to every handler via axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub mirror: MongoMirrorStore,
    pub storage: CloudinaryClient,
    pub sync: Arc<AppSyncCoordinator>,
    pub jwt_secret: JwtSecret,
    pub media_root: PathBuf,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        mirror: MongoMirrorStore,
        storage: CloudinaryClient,
        jwt_secret: &str,
        media_root: PathBuf,
    ) -> Self {
        let sync = SyncCoordinator::new(
            DbProjectionSource { db: db.clone() },
            mirror.clone(),
            DbSyncOutbox { db: db.clone() },
            RetryPolicy::default(),
        );
        Self {
            db,
            mirror,
            storage,
            sync: Arc::new(sync),
            jwt_secret: JwtSecret(Arc::from(jwt_secret)),
            media_root,
        }
    }

    pub fn user_repo(&self) -> DbUserRepository {
        DbUserRepository {
            db: self.db.clone(),
        }
    }

    pub fn department_repo(&self) -> DbDepartmentRepository {
        DbDepartmentRepository {
            db: self.db.clone(),
        }
    }

    pub fn year_repo(&self) -> DbYearRepository {
        DbYearRepository {
            db: self.db.clone(),
        }
    }

    pub fn semester_repo(&self) -> DbSemesterRepository {
        DbSemesterRepository {
            db: self.db.clone(),
        }
    }

    pub fn subject_repo(&self) -> DbSubjectRepository {
        DbSubjectRepository {
            db: self.db.clone(),
        }
    }

    pub fn material_repo(&self) -> DbMaterialRepository {
        DbMaterialRepository {
            db: self.db.clone(),
        }
    }

    pub fn upload_lifecycle(
        &self,
    ) -> UploadLifecycle<DbMaterialRepository, CloudinaryClient, Arc<AppSyncCoordinator>> {
        UploadLifecycle {
            materials: self.material_repo(),
            storage: self.storage.clone(),
            sync: Arc::clone(&self.sync),
            retry: RetryPolicy::default(),
        }
    }

    pub fn cascade_cleanup(
        &self,
    ) -> CascadeCleanup<CloudinaryClient, Arc<AppSyncCoordinator>> {
        CascadeCleanup {
            storage: self.storage.clone(),
            sync: Arc::clone(&self.sync),
            retry: RetryPolicy::default(),
        }
    }
}

impl FromRef<AppState> for JwtSecret {
    fn from_ref(state: &AppState) -> Self {
        state.jwt_secret.clone()
    }
}
