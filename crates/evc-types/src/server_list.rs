//! Versioned server catalog
//!
//! Servers live in mutually exclusive slots by type: any number of
//! custom and institute access servers, and at most one secure internet
//! server.

use crate::error::ModelError;
use crate::server::Server;
use crate::server_type::ServerType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// All servers known to the engine
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerList {
    /// Catalog version, used for rollback protection
    pub version: u64,
    #[serde(default)]
    custom: Vec<Server>,
    #[serde(default)]
    institute: Vec<Server>,
    #[serde(default)]
    secure_internet: Option<Server>,
}

impl ServerList {
    /// Empty catalog with the given version
    pub fn new(version: u64) -> Self {
        Self {
            version,
            ..Default::default()
        }
    }

    /// Empty catalog (version 0), the state before the first refresh
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add a server to the slot matching its type.
    ///
    /// A secure internet server replaces any previous one.
    pub fn with_server(mut self, server: Server) -> Self {
        match server.server_type {
            ServerType::Custom => self.custom.push(server),
            ServerType::InstituteAccess => self.institute.push(server),
            ServerType::SecureInternet => self.secure_internet = Some(server),
        }
        self
    }

    /// Look up a server by type and identifier
    pub fn get(&self, server_type: ServerType, identifier: &str) -> Option<&Server> {
        match server_type {
            ServerType::Custom => self.custom.iter().find(|s| s.identifier == identifier),
            ServerType::InstituteAccess => {
                self.institute.iter().find(|s| s.identifier == identifier)
            }
            ServerType::SecureInternet => self
                .secure_internet
                .as_ref()
                .filter(|s| s.identifier == identifier),
        }
    }

    /// Mutable lookup, for publishing a modified copy of a snapshot
    pub fn get_mut(&mut self, server_type: ServerType, identifier: &str) -> Option<&mut Server> {
        match server_type {
            ServerType::Custom => self.custom.iter_mut().find(|s| s.identifier == identifier),
            ServerType::InstituteAccess => self
                .institute
                .iter_mut()
                .find(|s| s.identifier == identifier),
            ServerType::SecureInternet => self
                .secure_internet
                .as_mut()
                .filter(|s| s.identifier == identifier),
        }
    }

    /// Servers of one type, in catalog order
    pub fn servers(&self, server_type: ServerType) -> &[Server] {
        match server_type {
            ServerType::Custom => &self.custom,
            ServerType::InstituteAccess => &self.institute,
            ServerType::SecureInternet => self.secure_internet.as_slice(),
        }
    }

    pub fn custom_servers(&self) -> &[Server] {
        &self.custom
    }

    pub fn institute_servers(&self) -> &[Server] {
        &self.institute
    }

    pub fn secure_internet_server(&self) -> Option<&Server> {
        self.secure_internet.as_ref()
    }

    pub fn secure_internet_server_mut(&mut self) -> Option<&mut Server> {
        self.secure_internet.as_mut()
    }

    /// Every server: custom, then institute, then secure internet
    pub fn iter(&self) -> impl Iterator<Item = &Server> {
        self.custom
            .iter()
            .chain(self.institute.iter())
            .chain(self.secure_internet.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Server> {
        self.custom
            .iter_mut()
            .chain(self.institute.iter_mut())
            .chain(self.secure_internet.iter_mut())
    }

    pub fn len(&self) -> usize {
        self.custom.len() + self.institute.len() + usize::from(self.secure_internet.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check every server and identifier uniqueness within each slot
    pub fn validate(&self) -> Result<(), ModelError> {
        Self::validate_slot(&self.custom, ServerType::Custom)?;
        Self::validate_slot(&self.institute, ServerType::InstituteAccess)?;
        Self::validate_slot(self.secure_internet.as_slice(), ServerType::SecureInternet)
    }

    fn validate_slot(servers: &[Server], expected: ServerType) -> Result<(), ModelError> {
        let mut seen = HashSet::with_capacity(servers.len());
        for server in servers {
            if server.server_type != expected {
                return Err(ModelError::WrongSlot {
                    identifier: server.identifier.clone(),
                    expected,
                    actual: server.server_type,
                });
            }
            server.validate()?;
            if !seen.insert(server.identifier.as_str()) {
                return Err(ModelError::DuplicateServer {
                    server_type: expected,
                    identifier: server.identifier.clone(),
                });
            }
        }
        Ok(())
    }
}
