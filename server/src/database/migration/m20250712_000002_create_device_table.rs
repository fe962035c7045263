use sea_orm_migration::prelude::*;

use crate::database::entity::device::*;
use crate::database::entity::host;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250712_000002_create_device_table"
    }
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Entity)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Column::Devid)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Column::Hostid).integer().not_null())
                    .col(
                        ColumnDef::new(Column::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Column::TotalBytes).big_integer())
                    .col(ColumnDef::new(Column::UsedBytes).big_integer())
                    .col(ColumnDef::new(Column::IoUtilization).small_integer())
                    .foreign_key(
                        ForeignKeyCreateStatement::new()
                            .name("fk_device_host")
                            .from_tbl(Entity)
                            .from_col(Column::Hostid)
                            .to_tbl(host::Entity)
                            .to_col(host::Column::Hostid),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-device-hostid")
                    .table(Entity)
                    .col(Column::Hostid)
                    .to_owned(),
            )
            .await
    }
}
