use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Departments::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Departments::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Departments::Name)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Departments::Code).string_len(20).not_null())
                    .col(
                        ColumnDef::new(Departments::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Years::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Years::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Years::Name)
                            .string_len(50)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Years::Number).integer().not_null())
                    .col(
                        ColumnDef::new(Years::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Semesters::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Semesters::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Semesters::DepartmentId).uuid())
                    .col(ColumnDef::new(Semesters::YearId).uuid().not_null())
                    .col(ColumnDef::new(Semesters::Name).string_len(50).not_null())
                    .col(ColumnDef::new(Semesters::Number).integer().not_null())
                    .col(
                        ColumnDef::new(Semesters::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Semesters::Table, Semesters::DepartmentId)
                            .to(Departments::Table, Departments::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Semesters::Table, Semesters::YearId)
                            .to(Years::Table, Years::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // A semester without a department still collides with another department-less one.
        manager
            .create_index(
                Index::create()
                    .table(Semesters::Table)
                    .col(Semesters::DepartmentId)
                    .col(Semesters::YearId)
                    .col(Semesters::Number)
                    .name("uq_semesters_department_year_number")
                    .unique()
                    .nulls_not_distinct()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subjects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Subjects::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Subjects::SemesterId).uuid().not_null())
                    .col(ColumnDef::new(Subjects::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Subjects::Code).string_len(20))
                    .col(
                        ColumnDef::new(Subjects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .from(Subjects::Table, Subjects::SemesterId)
                            .to(Semesters::Table, Semesters::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Subjects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Semesters::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Years::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Departments::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum Departments {
    Table,
    Id,
    Name,
    Code,
    CreatedAt,
}

#[derive(Iden)]
enum Years {
    Table,
    Id,
    Name,
    Number,
    CreatedAt,
}

#[derive(Iden)]
enum Semesters {
    Table,
    Id,
    DepartmentId,
    YearId,
    Name,
    Number,
    CreatedAt,
}

#[derive(Iden)]
enum Subjects {
    Table,
    Id,
    SemesterId,
    Name,
    Code,
    CreatedAt,
}
