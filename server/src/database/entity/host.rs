//! A storage host.

use sea_orm::entity::prelude::*;

pub type HostModel = Model;

/// A machine serving one or more devices.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "host")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub hostid: i32,

    /// Address clients reach this host at.
    pub hostname: String,

    /// Port of the chunk transfer endpoint.
    pub http_port: i32,

    /// Optional dedicated read port.
    pub http_get_port: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::device::Entity")]
    Device,
}

impl Related<super::device::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Device.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
