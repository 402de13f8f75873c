use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SyncOutbox::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SyncOutbox::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SyncOutbox::EntityKind).string_len(20).not_null())
                    .col(ColumnDef::new(SyncOutbox::EntityId).uuid().not_null())
                    .col(ColumnDef::new(SyncOutbox::Op).string_len(10).not_null())
                    .col(
                        ColumnDef::new(SyncOutbox::IdempotencyKey)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(SyncOutbox::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(SyncOutbox::LastError).text())
                    .col(
                        ColumnDef::new(SyncOutbox::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SyncOutbox::NextAttemptAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SyncOutbox::ProcessedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(SyncOutbox::FailedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Drainer poll: pending rows by next_attempt_at.
        manager
            .create_index(
                Index::create()
                    .table(SyncOutbox::Table)
                    .col(SyncOutbox::NextAttemptAt)
                    .name("idx_sync_outbox_next_attempt_at")
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SyncOutbox::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SyncOutbox {
    Table,
    Id,
    EntityKind,
    EntityId,
    Op,
    IdempotencyKey,
    Attempts,
    LastError,
    CreatedAt,
    NextAttemptAt,
    ProcessedAt,
    FailedAt,
}
