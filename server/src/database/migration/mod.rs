//! Database migrations.

pub use sea_orm_migration::*;

mod m20250712_000001_create_host_table;
mod m20250712_000002_create_device_table;
mod m20250712_000003_create_file_table;
mod m20250712_000004_create_tempfile_table;
mod m20250712_000005_create_file_on_table;
mod m20250718_000001_add_reconcile_timestamps;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250712_000001_create_host_table::Migration),
            Box::new(m20250712_000002_create_device_table::Migration),
            Box::new(m20250712_000003_create_file_table::Migration),
            Box::new(m20250712_000004_create_tempfile_table::Migration),
            Box::new(m20250712_000005_create_file_on_table::Migration),
            Box::new(m20250718_000001_add_reconcile_timestamps::Migration),
        ]
    }
}
