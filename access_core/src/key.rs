//! Access keys: random bearer credentials identifying one permission grant.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Length of an access key in bytes.
pub const ACCESS_KEY_LEN: usize = 32;

/// An unguessable random token that both identifies and authenticates a
/// permission grant.
///
/// Keys serialize as lowercase hex strings. `Display` and `Debug` print
/// only an abbreviated prefix so a full credential never ends up in logs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccessKey([u8; ACCESS_KEY_LEN]);

/// Failure to decode an access key from its hex wire form.
#[derive(Debug, Error)]
pub enum KeyParseError {
    #[error("access key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("access key must be {ACCESS_KEY_LEN} bytes, got {0}")]
    Length(usize),
}

impl AccessKey {
    /// Generate a fresh key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; ACCESS_KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        AccessKey(bytes)
    }

    /// Wrap an existing key value, e.g. one presented by a caller.
    pub fn from_bytes(bytes: [u8; ACCESS_KEY_LEN]) -> Self {
        AccessKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; ACCESS_KEY_LEN] {
        &self.0
    }

    /// The lowercase hex form used on the wire and shown once to admins.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Decode a key from its hex form.
    pub fn from_hex(s: &str) -> Result<Self, KeyParseError> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; ACCESS_KEY_LEN] = bytes
            .try_into()
            .map_err(|v: Vec<u8>| KeyParseError::Length(v.len()))?;
        Ok(AccessKey(bytes))
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}…", &self.to_hex()[..8])
    }
}

impl fmt::Debug for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessKey({self})")
    }
}

impl Serialize for AccessKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for AccessKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        AccessKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
