use uuid::Uuid;

use studymate::domain::projection::{EntityKind, SyncOp};
use studymate::domain::repository::DepartmentRepository;
use studymate::domain::types::{Department, StudyMaterial};
use studymate::error::StudyMateError;
use studymate::usecase::academic::{
    CreateDepartmentInput, CreateDepartmentUseCase, CreateSemesterInput, CreateSemesterUseCase,
    CreateSubjectInput, CreateSubjectUseCase, CreateYearInput, CreateYearUseCase,
    DeleteDepartmentUseCase, DeleteSubjectUseCase, DeleteYearUseCase,
};
use studymate::usecase::seed::{SeedAcademicStructureUseCase, SeedReport};

use crate::helpers::{
    MemoryStore, MockMirror, MockOutbox, MockStorage, RecordingProjector, cleanup, coordinator,
    lifecycle, new_material, pdf, seed_hierarchy, test_blob, test_material,
};

fn semester_usecase(
    store: &MemoryStore,
) -> CreateSemesterUseCase<MemoryStore, MemoryStore, MemoryStore> {
    CreateSemesterUseCase {
        repo: store.clone(),
        departments: store.clone(),
        years: store.clone(),
    }
}

/// Inserts a material under the department right before the delete runs, like an upload
/// committing while the admin's delete request is in flight.
#[derive(Clone)]
struct UploadLandsFirst {
    store: MemoryStore,
    late: StudyMaterial,
}

impl DepartmentRepository for UploadLandsFirst {
    async fn list(&self) -> Result<Vec<Department>, StudyMateError> {
        DepartmentRepository::list(&self.store).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Department>, StudyMateError> {
        DepartmentRepository::find_by_id(&self.store, id).await
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Department>, StudyMateError> {
        DepartmentRepository::find_by_name(&self.store, name).await
    }

    async fn create(&self, department: &Department) -> Result<(), StudyMateError> {
        DepartmentRepository::create(&self.store, department).await
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Vec<StudyMaterial>>, StudyMateError> {
        self.store.insert_material(self.late.clone());
        DepartmentRepository::delete(&self.store, id).await
    }
}

// ── create ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_create_department_once() {
    let store = MemoryStore::new();
    let usecase = CreateDepartmentUseCase {
        repo: store.clone(),
    };

    let department = usecase
        .execute(CreateDepartmentInput {
            name: " Physics ".to_owned(),
            code: "PHY".to_owned(),
        })
        .await
        .unwrap();
    assert_eq!(department.name, "Physics");

    let result = usecase
        .execute(CreateDepartmentInput {
            name: "Physics".to_owned(),
            code: "PHY2".to_owned(),
        })
        .await;
    assert!(matches!(result, Err(StudyMateError::DepartmentExists)));

    let result = usecase
        .execute(CreateDepartmentInput {
            name: "Chemistry".to_owned(),
            code: "  ".to_owned(),
        })
        .await;
    assert!(matches!(result, Err(StudyMateError::Validation(_))));
}

#[tokio::test]
async fn should_reject_non_positive_year_number() {
    let store = MemoryStore::new();
    let usecase = CreateYearUseCase {
        repo: store.clone(),
    };

    let result = usecase
        .execute(CreateYearInput {
            name: "Year 0".to_owned(),
            number: 0,
        })
        .await;

    assert!(matches!(result, Err(StudyMateError::Validation(_))));
}

#[tokio::test]
async fn should_create_semester_with_default_name() {
    let store = MemoryStore::new();
    let ids = seed_hierarchy(&store, "CSE");

    let detail = semester_usecase(&store)
        .execute(CreateSemesterInput {
            department_id: Some(ids.department_id),
            year_id: ids.year_id,
            number: 4,
            name: None,
        })
        .await
        .unwrap();

    assert_eq!(detail.semester.name, "Semester 4");
    assert_eq!(detail.department_name.as_deref(), Some("CSE"));
    assert_eq!(detail.year_name, "Year 2");
}

#[tokio::test]
async fn should_reject_duplicate_semester_and_unknown_year() {
    let store = MemoryStore::new();
    let ids = seed_hierarchy(&store, "CSE");
    let usecase = semester_usecase(&store);

    let result = usecase
        .execute(CreateSemesterInput {
            department_id: Some(ids.department_id),
            year_id: ids.year_id,
            number: 3,
            name: Some("Third".to_owned()),
        })
        .await;
    assert!(matches!(result, Err(StudyMateError::SemesterExists)));

    let result = usecase
        .execute(CreateSemesterInput {
            department_id: Some(ids.department_id),
            year_id: Uuid::now_v7(),
            number: 1,
            name: None,
        })
        .await;
    assert!(matches!(result, Err(StudyMateError::YearNotFound)));
    assert_eq!(store.semester_count(), 1);
}

#[tokio::test]
async fn should_create_subject_under_existing_semester_only() {
    let store = MemoryStore::new();
    let ids = seed_hierarchy(&store, "CSE");
    let usecase = CreateSubjectUseCase {
        repo: store.clone(),
        semesters: store.clone(),
    };

    let detail = usecase
        .execute(CreateSubjectInput {
            semester_id: ids.semester_id,
            name: "Computer Networks".to_owned(),
            code: Some(" ".to_owned()),
        })
        .await
        .unwrap();
    assert_eq!(detail.semester_number, 3);
    assert_eq!(detail.subject.code, None);

    let result = usecase
        .execute(CreateSubjectInput {
            semester_id: Uuid::now_v7(),
            name: "Compilers".to_owned(),
            code: None,
        })
        .await;
    assert!(matches!(result, Err(StudyMateError::SemesterNotFound)));
    assert_eq!(store.subject_count(), 2);
}

// ── cascade delete ───────────────────────────────────────────────────────────

#[tokio::test]
async fn should_cascade_department_delete_to_blobs_and_mirror() {
    let store = MemoryStore::new();
    let cse = seed_hierarchy(&store, "CSE");
    let physics = seed_hierarchy(&store, "Physics");
    let storage = MockStorage::default();
    let (mirror, outbox) = (MockMirror::default(), MockOutbox::default());
    let sync = coordinator(&store, &mirror, &outbox);
    let uploads = lifecycle(&store, &storage, sync.clone());
    let doomed = uploads
        .attach_file(new_material(cse.subject_id, "Unit 1"), pdf(b"%PDF cse"))
        .await
        .unwrap();
    let kept = uploads
        .attach_file(new_material(physics.subject_id, "Optics"), pdf(b"%PDF physics"))
        .await
        .unwrap();
    let usecase = DeleteDepartmentUseCase {
        repo: store.clone(),
        cleanup: cleanup(&storage, sync),
    };

    usecase.execute(cse.department_id).await.unwrap();

    assert!(store.material(doomed.material.id).is_none());
    assert!(store.material(kept.material.id).is_some());
    assert_eq!(store.semester_count(), 1);
    assert_eq!(store.subject_count(), 1);
    assert_eq!(
        storage.deleted(),
        vec![doomed.material.blob.unwrap().object_id]
    );
    assert!(mirror.get(EntityKind::Material, doomed.material.id).is_none());
    assert!(mirror.get(EntityKind::Material, kept.material.id).is_some());
    assert!(outbox.rows().is_empty());
}

#[tokio::test]
async fn should_cascade_year_delete_through_semesters() {
    let store = MemoryStore::new();
    let ids = seed_hierarchy(&store, "CSE");
    let storage = MockStorage::default();
    let projector = RecordingProjector::default();
    lifecycle(&store, &storage, projector.clone())
        .attach_file(new_material(ids.subject_id, "Unit 1"), pdf(b"%PDF"))
        .await
        .unwrap();
    let usecase = DeleteYearUseCase {
        repo: store.clone(),
        cleanup: cleanup(&storage, projector),
    };

    usecase.execute(ids.year_id).await.unwrap();

    assert_eq!(store.semester_count(), 0);
    assert_eq!(store.subject_count(), 0);
    assert!(store.materials().is_empty());
    assert_eq!(storage.object_count(), 0);
}

#[tokio::test]
async fn should_clean_up_material_inserted_just_before_cascade() {
    let store = MemoryStore::new();
    let ids = seed_hierarchy(&store, "CSE");
    let storage = MockStorage::default();
    let projector = RecordingProjector::default();
    let late = test_material(ids.subject_id, None, Some(test_blob("obj/late")));
    let late_id = late.id;
    let usecase = DeleteDepartmentUseCase {
        repo: UploadLandsFirst {
            store: store.clone(),
            late,
        },
        cleanup: cleanup(&storage, projector.clone()),
    };

    usecase.execute(ids.department_id).await.unwrap();

    assert!(store.material(late_id).is_none());
    assert_eq!(storage.deleted(), vec!["obj/late".to_owned()]);
    assert_eq!(
        projector.calls(),
        vec![(EntityKind::Material, late_id, SyncOp::Delete)]
    );
}

#[tokio::test]
async fn should_report_missing_parents_without_side_effects() {
    let store = MemoryStore::new();
    let ids = seed_hierarchy(&store, "CSE");
    let storage = MockStorage::default();
    let projector = RecordingProjector::default();

    let result = DeleteDepartmentUseCase {
        repo: store.clone(),
        cleanup: cleanup(&storage, projector.clone()),
    }
    .execute(Uuid::now_v7())
    .await;
    assert!(matches!(result, Err(StudyMateError::DepartmentNotFound)));

    let result = DeleteSubjectUseCase {
        repo: store.clone(),
        cleanup: cleanup(&storage, projector.clone()),
    }
    .execute(Uuid::now_v7())
    .await;
    assert!(matches!(result, Err(StudyMateError::SubjectNotFound)));

    assert_eq!(store.subject_count(), 1);
    assert!(store.tables.lock().unwrap().departments.iter().any(|d| d.id == ids.department_id));
    assert!(projector.calls().is_empty());
    assert!(storage.deleted().is_empty());
}

// ── seed ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_seed_curriculum_idempotently() {
    let store = MemoryStore::new();
    let usecase = SeedAcademicStructureUseCase {
        departments: store.clone(),
        years: store.clone(),
        semesters: store.clone(),
        subjects: store.clone(),
    };

    let first = usecase.execute().await.unwrap();
    let second = usecase.execute().await.unwrap();

    assert_eq!(
        first,
        SeedReport {
            departments: 1,
            years: 3,
            semesters: 6,
            subjects: 35
        }
    );
    assert_eq!(second, SeedReport::default());
    assert_eq!(store.semester_count(), 6);
    assert_eq!(store.subject_count(), 35);
}
