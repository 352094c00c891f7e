//! Catalog Store
//!
//! Holds the current organization and server lists as immutable
//! snapshots behind `Arc`.
//!
//! # Publishing
//!
//! ```text
//! candidate ──validate──▶ writer lock ──version > current?──▶ swap Arc
//!                │                             │
//!          InvalidCatalog                 StaleVersion
//! ```
//!
//! Readers clone the `Arc` and keep a stable view for as long as they
//! hold it; a concurrent refresh publishes a new snapshot rather than
//! touching the old one. The writer lock only serializes publishers.

use evc_types::{ModelError, OrganizationList, ServerList, ServerType};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Which list a catalog operation concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    Organizations,
    Servers,
}

impl fmt::Display for CatalogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogKind::Organizations => write!(f, "organization list"),
            CatalogKind::Servers => write!(f, "server list"),
        }
    }
}

/// Catalog errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Stale {kind}: version {candidate} is not newer than {current}")]
    StaleVersion {
        kind: CatalogKind,
        current: u64,
        candidate: u64,
    },

    #[error("Invalid {kind}: {source}")]
    InvalidCatalog {
        kind: CatalogKind,
        #[source]
        source: ModelError,
    },
}

/// Commit bookkeeping, guarded by the writer lock
#[derive(Debug, Default)]
struct RefreshTimes {
    organizations: Option<SystemTime>,
    servers: Option<SystemTime>,
    organizations_expired: bool,
}

/// Copy-on-write store for the discovery catalog
pub struct CatalogStore {
    organizations: RwLock<Arc<OrganizationList>>,
    servers: RwLock<Arc<ServerList>>,
    /// Serializes publishers; readers never take it
    writer: Mutex<RefreshTimes>,
}

impl CatalogStore {
    /// Create an empty store (both lists at version 0)
    pub fn new() -> Self {
        Self {
            organizations: RwLock::new(Arc::new(OrganizationList::empty())),
            servers: RwLock::new(Arc::new(ServerList::empty())),
            writer: Mutex::new(RefreshTimes::default()),
        }
    }

    /// Current organization snapshot
    pub fn current_organizations(&self) -> Arc<OrganizationList> {
        Arc::clone(&self.organizations.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Current server snapshot
    pub fn current_servers(&self) -> Arc<ServerList> {
        Arc::clone(&self.servers.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Validate and publish a new organization list.
    ///
    /// Returns the committed version.
    pub fn replace_organizations(&self, candidate: OrganizationList) -> Result<u64, CatalogError> {
        candidate
            .validate()
            .map_err(|source| CatalogError::InvalidCatalog {
                kind: CatalogKind::Organizations,
                source,
            })?;

        let mut times = self.lock_writer();
        let current = self.current_organizations().version;
        if candidate.version <= current {
            warn!(
                "Rejecting stale organization list (v{} <= v{})",
                candidate.version, current
            );
            return Err(CatalogError::StaleVersion {
                kind: CatalogKind::Organizations,
                current,
                candidate: candidate.version,
            });
        }

        let version = candidate.version;
        let count = candidate.len();
        *self.organizations.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(candidate);
        times.organizations = Some(SystemTime::now());
        times.organizations_expired = false;

        info!("Published organization list v{} ({} organizations)", version, count);
        Ok(version)
    }

    /// Validate and publish a new server list.
    ///
    /// Profile and location choices made on the previous snapshot carry
    /// over to matching entries that do not carry their own selection.
    pub fn replace_servers(&self, mut candidate: ServerList) -> Result<u64, CatalogError> {
        candidate
            .validate()
            .map_err(|source| CatalogError::InvalidCatalog {
                kind: CatalogKind::Servers,
                source,
            })?;

        let mut times = self.lock_writer();
        let previous = self.current_servers();
        if candidate.version <= previous.version {
            warn!(
                "Rejecting stale server list (v{} <= v{})",
                candidate.version, previous.version
            );
            return Err(CatalogError::StaleVersion {
                kind: CatalogKind::Servers,
                current: previous.version,
                candidate: candidate.version,
            });
        }

        carry_over_selections(&previous, &mut candidate);

        let version = candidate.version;
        let count = candidate.len();
        *self.servers.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(candidate);
        times.servers = Some(SystemTime::now());

        info!("Published server list v{} ({} servers)", version, count);
        Ok(version)
    }

    /// Publish a copy of the current server list with one entry changed.
    ///
    /// The version is kept: this is a selection, not a refresh. Returns
    /// `None` when the server is not in the current snapshot, otherwise
    /// whatever `edit` returned.
    pub(crate) fn update_server<T>(
        &self,
        server_type: ServerType,
        identifier: &str,
        edit: impl FnOnce(&mut evc_types::Server) -> T,
    ) -> Option<T> {
        let _times = self.lock_writer();
        let mut next = ServerList::clone(&self.current_servers());
        let server = next.get_mut(server_type, identifier)?;
        let result = edit(server);

        *self.servers.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        debug!("Republished server list after editing {} {}", server_type, identifier);
        Some(result)
    }

    /// Should the server list be fetched again?
    ///
    /// True when it was never published or is older than `max_age`.
    pub fn needs_server_refresh(&self, now: SystemTime, max_age: Duration) -> bool {
        match self.lock_writer().servers {
            None => true,
            Some(at) => now.duration_since(at).map(|age| age >= max_age).unwrap_or(false),
        }
    }

    /// Should the organization list be fetched again?
    ///
    /// Organizations are only refetched on demand: before the first
    /// publish, or after a lookup found the list out of date.
    pub fn needs_organization_refresh(&self) -> bool {
        let times = self.lock_writer();
        times.organizations.is_none() || times.organizations_expired
    }

    /// Flag the organization list as out of date
    pub fn mark_organizations_expired(&self) {
        self.lock_writer().organizations_expired = true;
    }

    fn lock_writer(&self) -> MutexGuard<'_, RefreshTimes> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new()
    }
}

fn carry_over_selections(previous: &ServerList, candidate: &mut ServerList) {
    for server in candidate.iter_mut() {
        let Some(old) = previous.get(server.server_type, &server.identifier) else {
            continue;
        };

        if server.profiles.current().is_none() {
            if let Some(chosen) = old.profiles.current_profile() {
                if server.profiles.select(&chosen.id) {
                    debug!("Kept profile {} for {}", chosen.id, server.identifier);
                }
            }
        }

        if server.server_type == ServerType::SecureInternet
            && !old.country_code.is_empty()
            && old.country_code != server.country_code
            && server.locations.contains(&old.country_code)
        {
            debug!("Kept location {} for {}", old.country_code, server.identifier);
            server.country_code = old.country_code.clone();
        }
    }
}
