//! The fixed enumeration of basic API permissions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One kind of operation a caller can be granted.
///
/// The integer codes are part of the persisted format and must never
/// change; persisted data references permissions by code, not by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Permission {
    /// Hand URLs to the client for download and processing.
    AddUrls,
    /// Import files directly.
    AddFiles,
    /// Add tags to existing files.
    AddTags,
    /// Run file searches and fetch the results.
    SearchFiles,
}

/// A persisted permission code that does not map to any known kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown permission code: {0}")]
pub struct UnknownPermissionCode(pub u8);

impl Permission {
    /// Every permission kind, in code order.
    pub const ALL: [Permission; 4] = [
        Permission::AddUrls,
        Permission::AddFiles,
        Permission::AddTags,
        Permission::SearchFiles,
    ];

    /// The stable integer code used in persisted data.
    pub fn code(self) -> u8 {
        match self {
            Permission::AddUrls => 0,
            Permission::AddFiles => 1,
            Permission::AddTags => 2,
            Permission::SearchFiles => 3,
        }
    }

    /// Human-readable description, used in denial messages and summaries.
    pub fn description(self) -> &'static str {
        match self {
            Permission::AddUrls => "add urls for processing",
            Permission::AddFiles => "import files",
            Permission::AddTags => "add tags to files",
            Permission::SearchFiles => "search for files",
        }
    }
}

impl From<Permission> for u8 {
    fn from(permission: Permission) -> u8 {
        permission.code()
    }
}

impl TryFrom<u8> for Permission {
    type Error = UnknownPermissionCode;

    fn try_from(code: u8) -> Result<Self, UnknownPermissionCode> {
        match code {
            0 => Ok(Permission::AddUrls),
            1 => Ok(Permission::AddFiles),
            2 => Ok(Permission::AddTags),
            3 => Ok(Permission::SearchFiles),
            other => Err(UnknownPermissionCode(other)),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
