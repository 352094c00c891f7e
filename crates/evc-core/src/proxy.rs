//! Proxy descriptor hand-off
//!
//! When a connection has to go through a local proxy, the component
//! running the proxy produces a socket descriptor. The engine passes it
//! to the host, which owns it for the rest of the connection.
//!
//! ```text
//! proxy collaborator ──fd──▶ Engine::proxy_ready ──▶ Host::setup_proxy(fd)
//!                                (once per attempt, only while Connecting)
//! ```

use std::fmt;

/// Socket descriptor handed to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProxyDescriptor(pub i32);

impl ProxyDescriptor {
    pub fn new(fd: i32) -> Self {
        Self(fd)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }
}

impl fmt::Display for ProxyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd {}", self.0)
    }
}

/// Proxy hand-off errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProxyError {
    #[error("Proxy descriptor already handed off in attempt {attempt} ({previous})")]
    AlreadyHandedOff {
        attempt: u64,
        previous: ProxyDescriptor,
    },

    #[error("No connection attempt in progress")]
    NoAttempt,
}

/// Tracks descriptor ownership per connection attempt
#[derive(Debug, Default)]
pub struct ProxyHandoff {
    attempt: Option<u64>,
    handed_off: Option<ProxyDescriptor>,
}

impl ProxyHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a new connection attempt
    pub fn begin_attempt(&mut self, attempt: u64) {
        self.attempt = Some(attempt);
        self.handed_off = None;
    }

    /// Stop tracking; later hand-offs are rejected
    pub fn end_attempt(&mut self) {
        self.attempt = None;
        self.handed_off = None;
    }

    /// Claim the hand-off slot for this attempt
    pub fn claim(&mut self, fd: ProxyDescriptor) -> Result<u64, ProxyError> {
        let attempt = self.attempt.ok_or(ProxyError::NoAttempt)?;
        if let Some(previous) = self.handed_off {
            return Err(ProxyError::AlreadyHandedOff { attempt, previous });
        }
        self.handed_off = Some(fd);
        Ok(attempt)
    }

    /// Undo a claim whose host call failed
    pub fn release(&mut self) {
        self.handed_off = None;
    }

    /// Descriptor owned by the host for the current attempt
    pub fn handed_off(&self) -> Option<ProxyDescriptor> {
        self.handed_off
    }
}
