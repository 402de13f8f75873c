use sea_orm_migration::prelude::*;

mod m20250101_000001_create_users;
mod m20250101_000002_create_academic_structure;
mod m20250101_000003_create_study_materials;
mod m20250101_000004_create_sync_outbox;
mod m20250101_000005_add_filter_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_users::Migration),
            Box::new(m20250101_000002_create_academic_structure::Migration),
            Box::new(m20250101_000003_create_study_materials::Migration),
            Box::new(m20250101_000004_create_sync_outbox::Migration),
            Box::new(m20250101_000005_add_filter_indexes::Migration),
        ]
    }
}
