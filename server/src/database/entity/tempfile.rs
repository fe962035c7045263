//! A placement reservation.

use sea_orm::entity::prelude::*;

pub type TempfileModel = Model;

/// A reservation made by create-open before any bytes exist.
///
/// The auto-incremented fid doubles as the cluster-wide fid allocator.
/// Exactly one row exists per in-flight upload; the matching create-close
/// deletes it, and the reconciler purges rows whose uploader never
/// finished.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tempfile")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub fid: i64,

    /// Device chosen for the upload.
    pub devid: i32,

    /// Timestamp when the reservation was made.
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
