//! An object-to-device association.

use sea_orm::entity::prelude::*;

pub type FileOnModel = Model;

/// Records that a fid's bytes exist on a device.
///
/// Multiple rows per fid are possible while a migration is in flight.
/// The row-to-chunk-file invariant is only eventually true; the
/// reconciler repairs divergence in both directions.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "file_on")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub fid: i64,

    #[sea_orm(primary_key, auto_increment = false)]
    pub devid: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::file::Entity",
        from = "Column::Fid",
        to = "super::file::Column::Fid"
    )]
    File,

    #[sea_orm(
        belongs_to = "super::device::Entity",
        from = "Column::Devid",
        to = "super::device::Column::Devid"
    )]
    Device,
}

impl Related<super::file::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::File.def()
    }
}

impl Related<super::device::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
