use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StudyMaterials::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StudyMaterials::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StudyMaterials::SubjectId).uuid().not_null())
                    .col(
                        ColumnDef::new(StudyMaterials::Title)
                            .string_len(200)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StudyMaterials::Description)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(StudyMaterials::MaterialType)
                            .string_len(20)
                            .not_null()
                            .default("note"),
                    )
                    .col(ColumnDef::new(StudyMaterials::UploadedBy).uuid())
                    .col(ColumnDef::new(StudyMaterials::ObjectId).string_len(255))
                    .col(ColumnDef::new(StudyMaterials::Url).text())
                    .col(ColumnDef::new(StudyMaterials::SecureUrl).text())
                    .col(ColumnDef::new(StudyMaterials::OriginalFilename).string_len(255))
                    .col(ColumnDef::new(StudyMaterials::ByteSize).big_integer())
                    .col(ColumnDef::new(StudyMaterials::Format).string_len(50))
                    .col(ColumnDef::new(StudyMaterials::LegacyFilePath).string_len(255))
                    .col(
                        ColumnDef::new(StudyMaterials::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(StudyMaterials::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(StudyMaterials::Table, StudyMaterials::SubjectId)
                            .to(Subjects::Table, Subjects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(StudyMaterials::Table, StudyMaterials::UploadedBy)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    // All blob columns set or none.
                    .check(
                        Expr::cust(
                            "(object_id IS NULL AND url IS NULL AND secure_url IS NULL) \
                             OR (object_id IS NOT NULL AND url IS NOT NULL AND secure_url IS NOT NULL)",
                        ),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StudyMaterials::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum StudyMaterials {
    Table,
    Id,
    SubjectId,
    Title,
    Description,
    MaterialType,
    UploadedBy,
    ObjectId,
    Url,
    SecureUrl,
    OriginalFilename,
    ByteSize,
    Format,
    LegacyFilePath,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Subjects {
    Table,
    Id,
}

#[derive(Iden)]
enum Users {
    Table,
    Id,
}
