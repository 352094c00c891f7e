//! Server categories.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a server was reached: directly (institute access, custom) or
/// through an organization's home pointer (secure internet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerType {
    #[serde(alias = "institute")]
    InstituteAccess,
    SecureInternet,
    Custom,
}

impl ServerType {
    /// All server types in slot order.
    pub fn all() -> &'static [ServerType] {
        &[
            ServerType::InstituteAccess,
            ServerType::SecureInternet,
            ServerType::Custom,
        ]
    }

    /// Integer code handed to hosts.
    pub fn code(&self) -> i32 {
        match self {
            ServerType::InstituteAccess => 1,
            ServerType::SecureInternet => 2,
            ServerType::Custom => 3,
        }
    }

    /// Parse a host-supplied integer code.
    pub fn from_code(code: i32) -> Result<Self, ModelError> {
        match code {
            1 => Ok(ServerType::InstituteAccess),
            2 => Ok(ServerType::SecureInternet),
            3 => Ok(ServerType::Custom),
            other => Err(ModelError::UnknownServerType(other)),
        }
    }

    /// Wire name, matching the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerType::InstituteAccess => "institute_access",
            ServerType::SecureInternet => "secure_internet",
            ServerType::Custom => "custom",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ServerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "institute" | "institute_access" => Ok(ServerType::InstituteAccess),
            "secure_internet" => Ok(ServerType::SecureInternet),
            "custom" => Ok(ServerType::Custom),
            _ => Err(format!("unknown server type: {s}")),
        }
    }
}
