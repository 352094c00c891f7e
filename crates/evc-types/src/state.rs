//! Connection lifecycle states as seen by the host

use serde::{Deserialize, Serialize};
use std::fmt;

/// Engine connection state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ConnectionState {
    /// No server has been chosen
    NoServer,
    /// Idle, ready to connect
    Disconnected,
    /// Connection attempt in progress
    Connecting,
    /// Tunnel is up
    Connected,
    /// Tearing the tunnel down
    Disconnecting,
    /// Attempt or session failed; must be acknowledged before reconnecting
    Failed(String),
}

impl ConnectionState {
    /// Integer code handed to hosts
    pub fn code(&self) -> i32 {
        match self {
            ConnectionState::NoServer => 0,
            ConnectionState::Disconnected => 1,
            ConnectionState::Connecting => 2,
            ConnectionState::Connected => 3,
            ConnectionState::Disconnecting => 4,
            ConnectionState::Failed(_) => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::NoServer => "No_Server",
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnecting => "Disconnecting",
            ConnectionState::Failed(_) => "Failed",
        }
    }

    /// A tunnel exists or is being set up or torn down
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Disconnecting
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ConnectionState::Failed(_))
    }

    /// Failure reason, if failed
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            ConnectionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Failed(reason) => write!(f, "Failed ({reason})"),
            other => f.write_str(other.name()),
        }
    }
}
