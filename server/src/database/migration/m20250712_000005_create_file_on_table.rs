use sea_orm_migration::prelude::*;

use crate::database::entity::device;
use crate::database::entity::file;
use crate::database::entity::file_on::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250712_000005_create_file_on_table"
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
                    .col(ColumnDef::new(Column::Fid).big_integer().not_null())
                    .col(ColumnDef::new(Column::Devid).integer().not_null())
                    .primary_key(
                        Index::create()
                            .name("pk-file-on")
                            .col(Column::Fid)
                            .col(Column::Devid),
                    )
                    .foreign_key(
                        ForeignKeyCreateStatement::new()
                            .name("fk_file_on_file")
                            .from_tbl(Entity)
                            .from_col(Column::Fid)
                            .to_tbl(file::Entity)
                            .to_col(file::Column::Fid)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKeyCreateStatement::new()
                            .name("fk_file_on_device")
                            .from_tbl(Entity)
                            .from_col(Column::Devid)
                            .to_tbl(device::Entity)
                            .to_col(device::Column::Devid),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-file-on-devid")
                    .table(Entity)
                    .col(Column::Devid)
                    .to_owned(),
            )
            .await
    }
}
