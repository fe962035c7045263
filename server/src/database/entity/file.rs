//! A committed object.

use sea_orm::entity::prelude::*;

pub type FileModel = Model;

/// A stored object.
///
/// Created only by a successful create-close transaction, never updated,
/// and deleted by the delete operation. The fid is allocated by the
/// matching `tempfile` reservation.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "file")]
pub struct Model {
    /// Numeric ID of the object's content.
    #[sea_orm(primary_key, auto_increment = false)]
    pub fid: i64,

    /// Caller-chosen unique name.
    #[sea_orm(unique)]
    pub key: String,

    /// Object length in bytes.
    pub length: i64,

    /// Timestamp when the object was committed.
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::file_on::Entity")]
    FileOn,
}

impl Related<super::file_on::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileOn.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
