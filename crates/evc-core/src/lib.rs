//! eduVPN client engine core
//!
//! Owns the discovery catalog, picks servers and profiles, and drives
//! the single connection lifecycle. Everything platform specific lives
//! in the host and is reached through registered callbacks.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────── Engine ─────────────────────────────┐
//! │                                                                 │
//! │  ┌──────────────┐   ┌────────────────┐   ┌───────────────────┐  │
//! │  │ CatalogStore │──▶│ ServerSelector │──▶│ ConnectionState-  │  │
//! │  │ (Arc swaps)  │   │ (profile rule) │   │ Machine           │  │
//! │  └──────┬───────┘   └────────────────┘   └─────────┬─────────┘  │
//! │         │ refresh_list                             │ (old, new) │
//! │         ▼                                          ▼            │
//! │  ┌──────────────────────── HostGateway ──────────────────────┐  │
//! │  │ tokens · proxy fd · rx counter · state changes            │  │
//! │  └───────────────────────────┬───────────────────────────────┘  │
//! └──────────────────────────────│──────────────────────────────────┘
//!                                ▼
//!                         Host application
//! ```
//!
//! # Features
//!
//! - **Versioned catalog**: refreshes must increase the version, readers
//!   keep stable snapshots
//! - **Deterministic selection**: current profile, then default gateway,
//!   then first profile
//! - **Host veto**: the host may cancel transitions out of Connecting
//!   and Disconnecting
//! - **Drop detection**: optional rx-counter monitor on tokio

mod catalog;
mod config;
mod engine;
mod host;
mod machine;
mod proxy;
mod registry;
mod search;
mod selector;
mod token;
mod traffic;

pub use catalog::{CatalogError, CatalogKind, CatalogStore};
pub use config::{ConfigError, EngineConfig};
pub use engine::{ConnectAttempt, Engine, EngineError};
pub use host::{Callback, Host, HostCallbacks, HostError, HostGateway};
pub use machine::{ConnectionStateMachine, StateError};
pub use proxy::{ProxyDescriptor, ProxyError, ProxyHandoff};
pub use registry::{current as registered_gateway, deregister, is_registered, register};
pub use search::{score as search_score, search_organizations, search_servers};
pub use selector::{
    ResolvedServer, SelectError, SelectionWarning, ServerSelector, fill_wayf_template,
};
pub use token::TokenBlob;
pub use traffic::{DropMonitor, MonitorCancel, MonitorError, TrafficMeter};

pub use evc_types::{
    ConnectionState, ModelError, Organization, OrganizationList, SecureInternetInfo, Server,
    ServerList, ServerLocationSet, ServerProfile, ServerProfiles, ServerType,
};
