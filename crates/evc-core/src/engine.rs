//! Engine facade
//!
//! Ties the catalog, selector, state machine and host gateway together
//! behind the query and command surface handed to hosts.
//!
//! # Usage
//!
//! ```rust,ignore
//! let engine = Engine::init(EngineConfig::default(), HostCallbacks::from_host(host))?;
//! engine.replace_servers(server_list)?;
//!
//! let attempt = engine.connect(ServerType::InstituteAccess, "https://vpn.example.org/", None)?;
//! // ... bring the tunnel up with attempt.server / attempt.token ...
//! engine.connection_established()?;
//!
//! engine.disconnect()?;
//! engine.teardown_complete()?;
//! ```

use crate::catalog::{CatalogError, CatalogStore};
use crate::config::{ConfigError, EngineConfig};
use crate::host::{Callback, HostCallbacks, HostError, HostGateway};
use crate::machine::{ConnectionStateMachine, StateError};
use crate::proxy::{ProxyDescriptor, ProxyError, ProxyHandoff};
use crate::registry;
use crate::search;
use crate::selector::{ResolvedServer, SelectError, ServerSelector};
use crate::token::TokenBlob;
use crate::traffic::{DropMonitor, MonitorError, TrafficMeter};
use evc_types::{ConnectionState, Organization, OrganizationList, Server, ServerList, ServerType};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Selection error: {0}")]
    Select(#[from] SelectError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Host error: {0}")]
    Host(#[from] HostError),

    #[error("Proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),
}

impl EngineError {
    /// True when the host integration is broken (missing callback)
    pub fn is_fatal(&self) -> bool {
        match self {
            EngineError::Host(e) => e.is_fatal(),
            EngineError::State(e) => e.is_fatal(),
            EngineError::Monitor(MonitorError::Host(e)) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Everything the host needs to bring a tunnel up
#[derive(Debug, Clone)]
pub struct ConnectAttempt {
    pub server: ResolvedServer,
    /// Stored token, `None` when the host has none yet
    pub token: Option<TokenBlob>,
    /// Attempt number, for correlating proxy hand-off
    pub attempt: u64,
}

/// VPN client engine
pub struct Engine {
    config: EngineConfig,
    catalog: Arc<CatalogStore>,
    gateway: Arc<HostGateway>,
    machine: Mutex<ConnectionStateMachine>,
    meter: Mutex<TrafficMeter>,
    proxy: Mutex<ProxyHandoff>,
    /// Holds the process-wide registration
    registered: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Engine {
    /// Register `callbacks` process-wide and create the engine
    pub fn init(config: EngineConfig, callbacks: HostCallbacks) -> Result<Self, EngineError> {
        config.validate()?;
        let gateway = registry::register(callbacks)?;
        info!("Engine initialized");
        Ok(Self::build(config, gateway, true))
    }

    /// Create an engine over an existing gateway, without registering
    pub fn with_gateway(config: EngineConfig, gateway: Arc<HostGateway>) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self::build(config, gateway, false))
    }

    fn build(config: EngineConfig, gateway: Arc<HostGateway>, registered: bool) -> Self {
        Self {
            config,
            catalog: Arc::new(CatalogStore::new()),
            machine: Mutex::new(ConnectionStateMachine::new(Arc::clone(&gateway))),
            gateway,
            meter: Mutex::new(TrafficMeter::new()),
            proxy: Mutex::new(ProxyHandoff::new()),
            registered,
        }
    }

    /// Force-reset the connection and release the registration
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        self.force_reset()?;
        if self.registered {
            self.registered = false;
            registry::deregister()?;
        }
        info!("Engine shut down");
        Ok(())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalog(&self) -> Arc<CatalogStore> {
        Arc::clone(&self.catalog)
    }

    pub fn gateway(&self) -> Arc<HostGateway> {
        Arc::clone(&self.gateway)
    }

    // ----- Query surface -----

    pub fn current_organizations(&self) -> Arc<OrganizationList> {
        self.catalog.current_organizations()
    }

    pub fn current_servers(&self) -> Arc<ServerList> {
        self.catalog.current_servers()
    }

    /// Organizations matching `query`, best match first
    pub fn search_organizations(&self, query: &str) -> Vec<Organization> {
        let snapshot = self.catalog.current_organizations();
        search::search_organizations(&snapshot, query)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Servers matching `query`, best match first
    pub fn search_servers(&self, query: &str) -> Vec<Server> {
        let snapshot = self.catalog.current_servers();
        search::search_servers(&snapshot, query)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn resolve(&self, server_type: ServerType, identifier: &str) -> Result<ResolvedServer, EngineError> {
        Ok(ServerSelector::new(&self.catalog).resolve(server_type, identifier)?)
    }

    pub fn resolve_organization(&self, org_id: &str) -> Result<ResolvedServer, EngineError> {
        Ok(ServerSelector::new(&self.catalog).resolve_organization(org_id)?)
    }

    pub fn connection_state(&self) -> ConnectionState {
        lock(&self.machine).state().clone()
    }

    /// Server of the current or last connection
    pub fn active_server(&self) -> Option<ResolvedServer> {
        lock(&self.machine).active_server().cloned()
    }

    /// Received bytes of the tunnel, monotonic within a connection
    pub fn rx_bytes(&self) -> Result<u64, EngineError> {
        let reading = self.gateway.read_rx_bytes()?;
        Ok(lock(&self.meter).record(reading))
    }

    /// Is the server list older than the configured refresh age?
    pub fn needs_server_refresh(&self) -> bool {
        self.catalog
            .needs_server_refresh(SystemTime::now(), self.config.server_list_max_age())
    }

    pub fn needs_organization_refresh(&self) -> bool {
        self.catalog.needs_organization_refresh()
    }

    // ----- Command surface -----

    /// Publish a new organization list and tell the host
    pub fn replace_organizations(&self, list: OrganizationList) -> Result<u64, EngineError> {
        self.gateway.ensure(Callback::RefreshList)?;
        let version = self.catalog.replace_organizations(list)?;
        self.gateway.refresh_list()?;
        Ok(version)
    }

    /// Publish a new server list and tell the host
    pub fn replace_servers(&self, list: ServerList) -> Result<u64, EngineError> {
        self.gateway.ensure(Callback::RefreshList)?;
        let version = self.catalog.replace_servers(list)?;
        self.gateway.refresh_list()?;
        Ok(version)
    }

    pub fn select_profile(
        &self,
        server_type: ServerType,
        identifier: &str,
        profile_id: &str,
    ) -> Result<ResolvedServer, EngineError> {
        Ok(ServerSelector::new(&self.catalog).select_profile(server_type, identifier, profile_id)?)
    }

    pub fn set_secure_location(&self, country_code: &str) -> Result<ResolvedServer, EngineError> {
        Ok(ServerSelector::new(&self.catalog).set_secure_location(country_code)?)
    }

    /// Resolve a server and start connecting to it
    pub fn connect(
        &self,
        server_type: ServerType,
        identifier: &str,
        profile_id: Option<&str>,
    ) -> Result<ConnectAttempt, EngineError> {
        let mut machine = lock(&self.machine);
        machine.check_connect()?;

        let selector = ServerSelector::new(&self.catalog);
        let resolved = match profile_id {
            Some(profile_id) => selector.preview_profile(server_type, identifier, profile_id)?,
            None => selector.resolve(server_type, identifier)?,
        };
        self.start_attempt(&mut machine, resolved, profile_id)
    }

    /// Connect to the secure internet home of an organization
    pub fn connect_organization(
        &self,
        org_id: &str,
        profile_id: Option<&str>,
    ) -> Result<ConnectAttempt, EngineError> {
        let mut machine = lock(&self.machine);
        machine.check_connect()?;

        let selector = ServerSelector::new(&self.catalog);
        let mut resolved = selector.resolve_organization(org_id)?;
        if let Some(profile_id) = profile_id {
            let organization = resolved.organization.take();
            resolved = selector.preview_profile(
                ServerType::SecureInternet,
                &resolved.server.identifier,
                profile_id,
            )?;
            resolved.organization = organization;
        }
        self.start_attempt(&mut machine, resolved, profile_id)
    }

    /// Load the token and enter Connecting. An explicit profile choice is
    /// only written to the catalog once the transition went through.
    fn start_attempt(
        &self,
        machine: &mut ConnectionStateMachine,
        resolved: ResolvedServer,
        profile_id: Option<&str>,
    ) -> Result<ConnectAttempt, EngineError> {
        let token = self
            .gateway
            .get_token(resolved.identifier(), resolved.server_type())?;
        if token.is_none() {
            debug!("No stored token for {}", resolved.identifier());
        }

        let attempt = machine.connect(resolved.clone())?;
        if let Some(profile_id) = profile_id {
            let selector = ServerSelector::new(&self.catalog);
            if let Err(e) =
                selector.select_profile(resolved.server_type(), resolved.identifier(), profile_id)
            {
                warn!("Profile choice for attempt {} not kept: {}", attempt, e);
            }
        }
        lock(&self.meter).start_session();
        lock(&self.proxy).begin_attempt(attempt);

        Ok(ConnectAttempt {
            server: resolved,
            token,
            attempt,
        })
    }

    /// The tunnel came up
    pub fn connection_established(&self) -> Result<(), EngineError> {
        lock(&self.machine).established()?;
        Ok(())
    }

    /// The attempt or the connection failed
    pub fn connection_failed(&self, reason: &str) -> Result<(), EngineError> {
        let mut machine = lock(&self.machine);
        machine.fail(reason)?;
        lock(&self.proxy).end_attempt();
        warn!("Connection failed: {}", reason);
        Ok(())
    }

    pub fn acknowledge_failure(&self) -> Result<(), EngineError> {
        lock(&self.machine).acknowledge()?;
        Ok(())
    }

    /// Start tearing the connection down; cancels an attempt in progress
    pub fn disconnect(&self) -> Result<(), EngineError> {
        let mut machine = lock(&self.machine);
        machine.disconnect()?;
        lock(&self.proxy).end_attempt();
        Ok(())
    }

    pub fn teardown_complete(&self) -> Result<(), EngineError> {
        lock(&self.machine).teardown_done()?;
        Ok(())
    }

    /// Back to Disconnected, whatever the current state
    pub fn force_reset(&self) -> Result<(), EngineError> {
        let mut machine = lock(&self.machine);
        machine.force_reset()?;
        lock(&self.proxy).end_attempt();
        Ok(())
    }

    pub fn forget_server(&self) -> Result<(), EngineError> {
        lock(&self.machine).forget_server()?;
        Ok(())
    }

    /// Hand a proxy socket to the host for the current attempt
    pub fn proxy_ready(&self, fd: ProxyDescriptor) -> Result<(), EngineError> {
        let machine = lock(&self.machine);
        if *machine.state() != ConnectionState::Connecting {
            return Err(StateError::InvalidTransition {
                from: machine.state().clone(),
                op: "hand off proxy",
            }
            .into());
        }

        let mut proxy = lock(&self.proxy);
        let attempt = proxy.claim(fd)?;
        if let Err(e) = self.gateway.setup_proxy(fd) {
            proxy.release();
            return Err(e.into());
        }
        info!("Proxy {} handed to host for attempt {}", fd, attempt);
        Ok(())
    }

    /// Persist a token obtained for a server
    pub fn store_token(
        &self,
        server_type: ServerType,
        identifier: &str,
        token: &TokenBlob,
    ) -> Result<(), EngineError> {
        self.gateway.set_token(identifier, server_type, token)?;
        Ok(())
    }

    /// Dropped-connection monitor for the current connection
    pub fn drop_monitor(&self) -> Result<DropMonitor, EngineError> {
        let machine = lock(&self.machine);
        if !machine.state().is_connected() {
            return Err(StateError::InvalidTransition {
                from: machine.state().clone(),
                op: "monitor traffic",
            }
            .into());
        }
        self.gateway.ensure(Callback::ReadRxBytes)?;

        Ok(DropMonitor::new(
            Arc::clone(&self.gateway),
            self.config.traffic_poll_interval(),
            self.config.dropped_after_polls,
        ))
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.registered {
            if let Err(e) = registry::deregister() {
                error!("Failed to release host registration: {}", e);
            }
        }
    }
}
