//! Tracker API types.
//!
//! Requests are form-encoded; responses are JSON. These types are shared
//! between the tracker's handlers and the client library.

use serde::{Deserialize, Serialize};

/// Response to `create-open`: a placement for a new upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOpenResponse {
    /// URL of the chunk file on the chosen storage node.
    pub path: String,

    /// The reserved fid.
    pub fid: i64,

    /// The chosen device.
    pub devid: i32,
}

/// Response to `get-paths`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetPathsResponse {
    /// Every reachable URL for the object, best placement first.
    pub paths: Vec<String>,
}

/// One device in the `get-devices` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub devid: i32,
    pub hostid: i32,
    pub status: String,
    pub total_bytes: Option<i64>,
    pub used_bytes: Option<i64>,
    pub io_utilization: Option<i16>,
}

/// Response to `get-devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetDevicesResponse {
    pub devices: Vec<DeviceInfo>,
}

/// One host in the `get-hosts` listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostInfo {
    pub hostid: i32,
    pub hostname: String,
    pub http_port: u16,
    pub http_get_port: Option<u16>,
}

/// Response to `get-hosts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetHostsResponse {
    pub hosts: Vec<HostInfo>,
}
