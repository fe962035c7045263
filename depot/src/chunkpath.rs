//! Chunk file layout.
//!
//! A stored object's bytes live in a single chunk file named after its
//! fid. The fid is rendered as zero-padded decimal and its leading digits
//! become a three-level directory prefix, bounding the size of any one
//! directory:
//!
//! ```text
//! dev7/0/000/012/0000012345.fid
//! ```
//!
//! While an upload is incomplete the chunk file has a companion
//! `.offset` sidecar holding the durable byte count, and optionally a
//! `.info` sidecar holding in-progress digest state.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DepotError, DepotResult};

/// Extension of chunk files.
pub const CHUNK_EXT: &str = "fid";

/// Extension of the offset marker sidecar.
pub const OFFSET_EXT: &str = "offset";

/// Extension of the digest state sidecar.
pub const INFO_EXT: &str = "info";

/// Numeric identifier of a stored object's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fid(i64);

impl Fid {
    pub fn new(fid: i64) -> Self {
        Self(fid)
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// The chunk file name, e.g. `0000012345.fid`.
    pub fn file_name(self) -> String {
        format!("{:010}.{}", self.0, CHUNK_EXT)
    }

    /// The chunk file path relative to its device root.
    pub fn rel_path(self) -> String {
        let digits = format!("{:010}", self.0);

        format!(
            "{}/{}/{}/{}.{}",
            &digits[0..1],
            &digits[1..4],
            &digits[4..7],
            digits,
            CHUNK_EXT,
        )
    }

    /// The chunk file path including the device mount component.
    pub fn dev_path(self, devid: i32) -> String {
        format!("dev{}/{}", devid, self.rel_path())
    }

    /// Parses a chunk file name back into a fid.
    pub fn from_file_name(name: &str) -> DepotResult<Self> {
        let invalid = |reason| DepotError::InvalidChunkPath {
            path: name.to_owned(),
            reason,
        };

        let stem = name
            .strip_suffix(&format!(".{}", CHUNK_EXT))
            .ok_or_else(|| invalid("not a chunk file"))?;

        let fid: i64 = stem
            .parse()
            .map_err(|_| invalid("file name is not a fid"))?;

        if fid < 0 || stem != format!("{:010}", fid) {
            return Err(invalid("file name is not a zero-padded fid"));
        }

        Ok(Self(fid))
    }

    /// Parses a device-relative chunk path, rejecting anything that is not
    /// exactly the canonical layout for its fid.
    pub fn from_rel_path(path: &str) -> DepotResult<Self> {
        let invalid = |reason| DepotError::InvalidChunkPath {
            path: path.to_owned(),
            reason,
        };

        let name = path
            .rsplit('/')
            .next()
            .ok_or_else(|| invalid("empty path"))?;

        let fid = Self::from_file_name(name)?;
        if path != fid.rel_path() {
            return Err(invalid("does not match the canonical layout"));
        }

        Ok(fid)
    }
}

impl fmt::Display for Fid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        assert_eq!("0/000/000/0000000001.fid", Fid::new(1).rel_path());
        assert_eq!("0/000/012/0000012345.fid", Fid::new(12345).rel_path());
        assert_eq!("4/294/967/4294967295.fid", Fid::new(4294967295).rel_path());
        assert_eq!("dev7/0/000/012/0000012345.fid", Fid::new(12345).dev_path(7));
    }

    #[test]
    fn test_parse_roundtrip() {
        for fid in [0, 1, 999, 12345, 4294967295, 9999999999] {
            let fid = Fid::new(fid);
            assert_eq!(fid, Fid::from_file_name(&fid.file_name()).unwrap());
            assert_eq!(fid, Fid::from_rel_path(&fid.rel_path()).unwrap());
        }
    }

    #[test]
    fn test_parse_rejects() {
        Fid::from_file_name("0000012345.offset").unwrap_err();
        Fid::from_file_name("12345.fid").unwrap_err();
        Fid::from_file_name("-000000001.fid").unwrap_err();
        Fid::from_file_name("birthday.fid").unwrap_err();

        // Traversal or wrong fan-out never parses.
        Fid::from_rel_path("0/000/999/0000012345.fid").unwrap_err();
        Fid::from_rel_path("../000/012/0000012345.fid").unwrap_err();
        Fid::from_rel_path("0000012345.fid").unwrap_err();
    }
}
