//! Object keys.
//!
//! Keys are caller-chosen names for stored objects. They can be up to 250
//! characters long and can contain any printable ASCII character except
//! whitespace, so path-like keys (`backups/2024/db.tar`) work as expected.

use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Serialize};

use crate::error::{DepotError, DepotResult};

/// The maximum allowable length of an object key.
pub const MAX_KEY_LENGTH: usize = 250;

lazy_static! {
    static ref KEY_REGEX: Regex = Regex::new(r"^[[:graph:]]{1,250}$").unwrap();
}

/// The name of a stored object.
#[derive(Serialize, Deserialize, Clone, Debug, Hash, Eq, PartialEq)]
#[serde(transparent)]
pub struct Key(#[serde(deserialize_with = "Key::deserialize")] String);

impl Key {
    /// Creates a key from a String.
    pub fn new(key: String) -> DepotResult<Self> {
        validate_key(&key)?;
        Ok(Self(key))
    }

    /// Returns the string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Deserializes a potentially-invalid key.
    fn deserialize<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        use de::Error;
        String::deserialize(deserializer).and_then(|s| {
            validate_key(&s).map_err(|e| Error::custom(e.to_string()))?;
            Ok(s)
        })
    }
}

impl FromStr for Key {
    type Err = DepotError;

    fn from_str(key: &str) -> DepotResult<Self> {
        Self::new(key.to_owned())
    }
}

fn validate_key(key: &str) -> DepotResult<()> {
    if KEY_REGEX.is_match(key) {
        Ok(())
    } else {
        let reason = if key.is_empty() {
            "must not be empty"
        } else if key.len() > MAX_KEY_LENGTH {
            "too long"
        } else {
            "must be printable ASCII without whitespace"
        };

        Err(DepotError::InvalidKey {
            key: key.to_owned(),
            reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key() {
        let keys = vec!["simple", "backups/2024/db.tar", "a", "dotted.name-1_2+3"];

        for key in keys {
            assert_eq!(key, Key::new(key.to_string()).unwrap().as_str());

            assert_eq!(
                key,
                serde_json::from_str::<Key>(&format!("\"{}\"", key))
                    .unwrap()
                    .as_str(),
            );
        }

        let too_long = "x".repeat(251);
        let bad_keys = vec!["", "has space", "has\ttab", "newline\n", too_long.as_str()];

        for key in bad_keys {
            Key::new(key.to_string()).unwrap_err();
            serde_json::from_str::<Key>(&serde_json::to_string(key).unwrap()).unwrap_err();
        }
    }
}
