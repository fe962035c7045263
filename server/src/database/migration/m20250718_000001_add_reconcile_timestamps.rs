use sea_orm_migration::prelude::*;

use crate::database::entity::device::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250718_000001_add_reconcile_timestamps"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // One column per reconciliation loop; SQLite wants them added
        // one at a time.
        for column in [
            Column::LastDrainAt,
            Column::LastDiskCleanAt,
            Column::LastDeviceCleanAt,
        ] {
            manager
                .alter_table(
                    Table::alter()
                        .table(Entity)
                        .add_column(ColumnDef::new(column).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;
        }

        Ok(())
    }
}
