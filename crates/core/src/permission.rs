//! Runtime permission model.
//!
//! The controller checks the [`PermissionStore`] before starting a
//! download; when the permission is missing it asks a prompt and receives
//! a [`PermissionResult`] tagged with the request code it used.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Request code attached to the storage permission prompt.
pub const PERMISSION_REQUEST_CODE: i32 = 100;

/// A permission the application can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Write access to public external storage (the Downloads folder).
    WriteStorage,
}

impl Permission {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WriteStorage => "write_storage",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer for a single permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl FromStr for PermissionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "granted" | "grant" | "y" | "yes" => Ok(Self::Granted),
            "denied" | "deny" | "n" | "no" => Ok(Self::Denied),
            other => Err(CoreError::Validation(format!(
                "Unknown permission answer: '{other}'"
            ))),
        }
    }
}

/// Outcome of a prompt, delivered back to the requester.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionResult {
    pub request_code: i32,
    pub permissions: Vec<Permission>,
    /// One entry per permission, in the same order. Empty when the prompt
    /// was dismissed.
    pub grants: Vec<PermissionStatus>,
}

impl PermissionResult {
    /// `true` only when the result answers `request_code` and its first
    /// grant is [`PermissionStatus::Granted`].
    pub fn is_granted_for(&self, request_code: i32) -> bool {
        self.request_code == request_code
            && self.grants.first() == Some(&PermissionStatus::Granted)
    }
}

/// Permissions granted so far. Denials are not remembered.
#[derive(Debug, Clone, Default)]
pub struct PermissionStore {
    granted: HashSet<Permission>,
}

impl PermissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that starts with `permissions` already granted.
    pub fn with_granted(permissions: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            granted: permissions.into_iter().collect(),
        }
    }

    pub fn is_granted(&self, permission: Permission) -> bool {
        self.granted.contains(&permission)
    }

    pub fn grant(&mut self, permission: Permission) {
        self.granted.insert(permission);
    }
}
