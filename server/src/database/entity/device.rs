//! A storage device.

use std::str::FromStr;

use sea_orm::entity::prelude::*;

pub type DeviceModel = Model;

/// The state of a device.
#[derive(EnumIter, DeriveActiveEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum DeviceStatus {
    /// Accepts reads and writes.
    #[sea_orm(string_value = "alive")]
    Alive,

    /// Being evacuated; still readable, no longer written to.
    #[sea_orm(string_value = "drain")]
    Drain,

    /// Readable but not writable.
    #[sea_orm(string_value = "readonly")]
    ReadOnly,

    /// Unreachable; neither readable nor writable.
    #[sea_orm(string_value = "dead")]
    Dead,

    /// Provisioned but holding no data yet.
    #[sea_orm(string_value = "empty")]
    Empty,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alive => "alive",
            Self::Drain => "drain",
            Self::ReadOnly => "readonly",
            Self::Dead => "dead",
            Self::Empty => "empty",
        }
    }

    /// Whether reads may be served from the device.
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::Alive | Self::ReadOnly | Self::Drain | Self::Empty)
    }

    /// Whether new writes may be placed on the device.
    pub fn is_writable(&self) -> bool {
        matches!(self, Self::Alive)
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alive" => Ok(Self::Alive),
            "drain" => Ok(Self::Drain),
            "readonly" => Ok(Self::ReadOnly),
            "dead" => Ok(Self::Dead),
            "empty" => Ok(Self::Empty),
            _ => Err(format!("unknown device status \"{}\"", s)),
        }
    }
}

/// A storage device.
#[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "device")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub devid: i32,

    /// Host serving this device.
    #[sea_orm(indexed)]
    pub hostid: i32,

    pub status: DeviceStatus,

    /// Capacity in bytes; unset until first sampled.
    pub total_bytes: Option<i64>,

    /// Used bytes; unset until first sampled.
    pub used_bytes: Option<i64>,

    /// Opaque disk utilization percentage, sampled externally.
    pub io_utilization: Option<i16>,

    /// Reconciler gates: when each loop last completed a pass over this
    /// device. Claimed with a conditional update at pass start.
    pub last_drain_at: Option<ChronoDateTimeUtc>,
    pub last_disk_clean_at: Option<ChronoDateTimeUtc>,
    pub last_device_clean_at: Option<ChronoDateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::host::Entity",
        from = "Column::Hostid",
        to = "super::host::Column::Hostid"
    )]
    Host,

    #[sea_orm(has_many = "super::file_on::Entity")]
    FileOn,
}

impl Related<super::host::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Host.def()
    }
}

impl Related<super::file_on::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FileOn.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
