//! Server Selector
//!
//! Turns "connect to X" into a concrete server and profile.
//!
//! # Profile choice
//!
//! 1. A valid `current` selection wins
//! 2. Otherwise the first profile with `default_gateway` set, in catalog
//!    order (several candidates produce a `MultipleDefaultProfiles` warning)
//! 3. Otherwise the first profile
//!
//! The choice is written back into the catalog entry so later lookups
//! agree with it.

use crate::catalog::CatalogStore;
use evc_types::{Organization, Server, ServerProfile, ServerType};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

const RETURN_TO_PLACEHOLDER: &str = "@RETURN_TO@";
const ORG_ID_PLACEHOLDER: &str = "@ORG_ID@";

/// Selection errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectError {
    #[error("Server not found: {server_type} '{identifier}'")]
    ServerNotFound {
        server_type: ServerType,
        identifier: String,
    },

    #[error("Organization not found: '{0}'")]
    OrganizationNotFound(String),

    #[error("Organization '{0}' has no secure internet home")]
    NoSecureInternetHome(String),

    #[error("Profile '{profile}' not found on '{server}'")]
    ProfileNotFound { server: String, profile: String },

    #[error("Location '{code}' not offered by '{server}'")]
    LocationNotFound { server: String, code: String },
}

/// Non-fatal findings attached to a resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionWarning {
    /// More than one profile is marked as default gateway
    MultipleDefaultProfiles {
        server: String,
        chosen: String,
        candidates: Vec<String>,
    },
}

impl fmt::Display for SelectionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionWarning::MultipleDefaultProfiles {
                server,
                chosen,
                candidates,
            } => write!(
                f,
                "{} has {} default gateway profiles ({}), using '{}'",
                server,
                candidates.len(),
                candidates.join(", "),
                chosen
            ),
        }
    }
}

/// Outcome of a resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedServer {
    /// Copy of the catalog entry, with the selection applied
    pub server: Server,
    /// Selected profile; `None` for servers without profiles
    pub profile: Option<ServerProfile>,
    /// Index of `profile`, -1 when none
    pub profile_index: i64,
    /// `expire_time` has passed (advisory)
    pub expired: bool,
    pub warnings: Vec<SelectionWarning>,
    /// Organization the server was reached through, if any
    pub organization: Option<Organization>,
}

impl ResolvedServer {
    fn new(server: Server, warnings: Vec<SelectionWarning>, now_secs: u64) -> Self {
        let expired = server.is_expired_at(now_secs);
        if expired {
            info!("Server {} has expired, a new authorization is advised", server.identifier);
        }
        Self {
            profile: server.profiles.current_profile().cloned(),
            profile_index: server.profiles.current_index(),
            expired,
            warnings,
            organization: None,
            server,
        }
    }

    pub fn server_type(&self) -> ServerType {
        self.server.server_type
    }

    pub fn identifier(&self) -> &str {
        &self.server.identifier
    }

    pub fn profile_id(&self) -> Option<&str> {
        self.profile.as_ref().map(|p| p.id.as_str())
    }

    /// Authorization URL, skipping the identity provider picker when the
    /// secure internet home publishes a template for it.
    ///
    /// Falls back to `return_to` when there is nothing usable to fill.
    pub fn authorization_url(&self, return_to: &str) -> String {
        let template = self
            .server
            .secure_internet
            .as_ref()
            .and_then(|info| info.authentication_url_template.as_deref());
        match (template, &self.organization) {
            (Some(template), Some(org)) => fill_wayf_template(template, return_to, org.org_id()),
            _ => return_to.to_string(),
        }
    }
}

/// Query component escaping: unreserved bytes pass, space becomes '+'
fn query_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte))
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", byte)),
        }
    }
    out
}

/// Fill `@RETURN_TO@` and `@ORG_ID@` in an authentication URL template
pub fn fill_wayf_template(template: &str, return_to: &str, org_id: &str) -> String {
    if template.is_empty()
        || !template.contains(RETURN_TO_PLACEHOLDER)
        || !template.contains(ORG_ID_PLACEHOLDER)
    {
        return return_to.to_string();
    }

    let filled = template.replacen(RETURN_TO_PLACEHOLDER, &query_escape(return_to), 1);
    // "@RETURN_TO@ORG_ID@" shares its '@' between both placeholders
    if !filled.contains(ORG_ID_PLACEHOLDER) {
        return return_to.to_string();
    }
    filled.replacen(ORG_ID_PLACEHOLDER, &query_escape(org_id), 1)
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Apply the profile choice rules to a catalog entry
fn choose_profile(server: &mut Server) -> Vec<SelectionWarning> {
    let mut warnings = Vec::new();
    if server.profiles.is_empty() || server.profiles.current().is_some() {
        return warnings;
    }

    let defaults = server.profiles.default_gateway_indices();
    let index = defaults.first().copied().unwrap_or(0);
    server.profiles.set_current(index);

    if defaults.len() > 1 {
        let warning = SelectionWarning::MultipleDefaultProfiles {
            server: server.identifier.clone(),
            chosen: server.profiles.current_profile().map(|p| p.id.clone()).unwrap_or_default(),
            candidates: defaults
                .iter()
                .filter_map(|&i| server.profiles.get(i))
                .map(|p| p.id.clone())
                .collect(),
        };
        warn!("{}", warning);
        warnings.push(warning);
    }

    debug!(
        "Selected profile index {} for {}",
        server.profiles.current_index(),
        server.identifier
    );
    warnings
}

/// Resolves servers against the catalog
pub struct ServerSelector<'a> {
    catalog: &'a CatalogStore,
}

impl<'a> ServerSelector<'a> {
    pub fn new(catalog: &'a CatalogStore) -> Self {
        Self { catalog }
    }

    /// Resolve a server by type and identifier
    pub fn resolve(&self, server_type: ServerType, identifier: &str) -> Result<ResolvedServer, SelectError> {
        self.resolve_at(server_type, identifier, now_secs())
    }

    /// Resolve with an explicit clock (unix seconds)
    pub fn resolve_at(
        &self,
        server_type: ServerType,
        identifier: &str,
        now_secs: u64,
    ) -> Result<ResolvedServer, SelectError> {
        let not_found = || SelectError::ServerNotFound {
            server_type,
            identifier: identifier.to_string(),
        };

        let snapshot = self.catalog.current_servers();
        let server = snapshot.get(server_type, identifier).ok_or_else(not_found)?;
        if server.profiles.is_empty() || server.profiles.current().is_some() {
            return Ok(ResolvedServer::new(server.clone(), Vec::new(), now_secs));
        }

        // Persist the choice; runs against whatever snapshot is current now
        let (server, warnings) = self
            .catalog
            .update_server(server_type, identifier, |server| {
                let warnings = choose_profile(server);
                (server.clone(), warnings)
            })
            .ok_or_else(not_found)?;
        Ok(ResolvedServer::new(server, warnings, now_secs))
    }

    /// Resolve an organization to its secure internet home
    pub fn resolve_organization(&self, org_id: &str) -> Result<ResolvedServer, SelectError> {
        self.resolve_organization_at(org_id, now_secs())
    }

    pub fn resolve_organization_at(&self, org_id: &str, now_secs: u64) -> Result<ResolvedServer, SelectError> {
        let organizations = self.catalog.current_organizations();
        let Some(org) = organizations.find(org_id) else {
            warn!("Organization {} not in catalog v{}", org_id, organizations.version);
            self.catalog.mark_organizations_expired();
            return Err(SelectError::OrganizationNotFound(org_id.to_string()));
        };
        let home = org
            .secure_internet_home()
            .ok_or_else(|| SelectError::NoSecureInternetHome(org_id.to_string()))?;

        let mut resolved = self.resolve_at(ServerType::SecureInternet, home, now_secs)?;
        resolved.organization = Some(org.clone());
        Ok(resolved)
    }

    /// Like `select_profile`, but leaves the catalog untouched
    pub fn preview_profile(
        &self,
        server_type: ServerType,
        identifier: &str,
        profile_id: &str,
    ) -> Result<ResolvedServer, SelectError> {
        let snapshot = self.catalog.current_servers();
        let mut server = snapshot
            .get(server_type, identifier)
            .cloned()
            .ok_or_else(|| SelectError::ServerNotFound {
                server_type,
                identifier: identifier.to_string(),
            })?;
        if !server.profiles.select(profile_id) {
            return Err(SelectError::ProfileNotFound {
                server: identifier.to_string(),
                profile: profile_id.to_string(),
            });
        }
        Ok(ResolvedServer::new(server, Vec::new(), now_secs()))
    }

    /// Make `profile_id` the selected profile of a server
    pub fn select_profile(
        &self,
        server_type: ServerType,
        identifier: &str,
        profile_id: &str,
    ) -> Result<ResolvedServer, SelectError> {
        let not_found = || SelectError::ServerNotFound {
            server_type,
            identifier: identifier.to_string(),
        };
        let profile_missing = || SelectError::ProfileNotFound {
            server: identifier.to_string(),
            profile: profile_id.to_string(),
        };

        let snapshot = self.catalog.current_servers();
        let server = snapshot.get(server_type, identifier).ok_or_else(not_found)?;
        if server.profiles.position(profile_id).is_none() {
            return Err(profile_missing());
        }

        let server = self
            .catalog
            .update_server(server_type, identifier, |server| {
                server.profiles.select(profile_id).then(|| server.clone())
            })
            .ok_or_else(not_found)?
            .ok_or_else(profile_missing)?;

        info!("Profile {} selected for {}", profile_id, identifier);
        Ok(ResolvedServer::new(server, Vec::new(), now_secs()))
    }

    /// Switch the secure internet server to another country
    pub fn set_secure_location(&self, country_code: &str) -> Result<ResolvedServer, SelectError> {
        let code = country_code.to_ascii_lowercase();
        let snapshot = self.catalog.current_servers();
        let server = snapshot
            .secure_internet_server()
            .ok_or_else(|| SelectError::ServerNotFound {
                server_type: ServerType::SecureInternet,
                identifier: String::new(),
            })?;
        if !server.locations.contains(&code) {
            return Err(SelectError::LocationNotFound {
                server: server.identifier.clone(),
                code,
            });
        }

        let identifier = server.identifier.clone();
        let server = self
            .catalog
            .update_server(ServerType::SecureInternet, &identifier, |server| {
                server.country_code = code.clone();
                server.clone()
            })
            .ok_or_else(|| SelectError::ServerNotFound {
                server_type: ServerType::SecureInternet,
                identifier: identifier.clone(),
            })?;

        info!("Secure internet location set to {}", code);
        Ok(ResolvedServer::new(server, Vec::new(), now_secs()))
    }
}
