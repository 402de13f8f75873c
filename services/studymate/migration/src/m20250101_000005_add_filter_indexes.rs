use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const INDEXES: [(&str, &str, &str); 6] = [
    ("idx_semesters_department_id", "semesters", "department_id"),
    ("idx_semesters_year_id", "semesters", "year_id"),
    ("idx_subjects_semester_id", "subjects", "semester_id"),
    ("idx_study_materials_subject_id", "study_materials", "subject_id"),
    ("idx_study_materials_uploaded_by", "study_materials", "uploaded_by"),
    ("idx_study_materials_created_at", "study_materials", "created_at"),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, table, column) in INDEXES {
            manager
                .create_index(
                    Index::create()
                        .table(Alias::new(table))
                        .col(Alias::new(column))
                        .name(name)
                        .to_owned(),
                )
                .await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for (name, _, _) in INDEXES.iter().rev() {
            manager
                .drop_index(Index::drop().name(*name).to_owned())
                .await?;
        }
        Ok(())
    }
}
