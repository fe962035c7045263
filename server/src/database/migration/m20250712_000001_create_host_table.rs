use sea_orm_migration::prelude::*;

use crate::database::entity::host::*;

pub struct Migration;

impl MigrationName for Migration {
    fn name(&self) -> &str {
        "m20250712_000001_create_host_table"
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
                        ColumnDef::new(Column::Hostid)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Column::Hostname).string().not_null())
                    .col(ColumnDef::new(Column::HttpPort).integer().not_null())
                    .col(ColumnDef::new(Column::HttpGetPort).integer())
                    .to_owned(),
            )
            .await
    }
}
