//! Console host
//!
//! A `Host` that keeps tokens in memory, fakes an interface counter and
//! forwards every callback as a `HostEvent` over a channel for printing.

use crossbeam_channel::{Receiver, Sender};
use evc_core::{ConnectionState, Host, ProxyDescriptor, ServerType, TokenBlob};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Something the engine asked of the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    StateChanged {
        old: ConnectionState,
        new: ConnectionState,
    },
    TokenStored {
        server: String,
        server_type: ServerType,
    },
    ProxyReady(ProxyDescriptor),
    ListRefreshed,
}

pub struct ConsoleHost {
    events: Sender<HostEvent>,
    tokens: Mutex<HashMap<(String, ServerType), Vec<u8>>>,
    rx_bytes: AtomicU64,
    /// Bytes added per counter read; 0 simulates a dead link
    traffic_step: u64,
}

impl ConsoleHost {
    pub fn new(traffic_step: u64) -> (Self, Receiver<HostEvent>) {
        let (events, rx) = crossbeam_channel::unbounded();
        let host = Self {
            events,
            tokens: Mutex::new(HashMap::new()),
            rx_bytes: AtomicU64::new(0),
            traffic_step,
        };
        (host, rx)
    }

    fn emit(&self, event: HostEvent) {
        if self.events.send(event).is_err() {
            debug!("Event receiver gone");
        }
    }
}

impl Host for ConsoleHost {
    fn on_state_change(&self, old: &ConnectionState, new: &ConnectionState) -> bool {
        self.emit(HostEvent::StateChanged {
            old: old.clone(),
            new: new.clone(),
        });
        false
    }

    fn get_token(&self, server_id: &str, server_type: ServerType) -> TokenBlob {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(server_id.to_string(), server_type))
            .map(|bytes| TokenBlob::new(bytes.clone()))
            .unwrap_or_else(TokenBlob::empty)
    }

    fn set_token(&self, server_id: &str, server_type: ServerType, token: &TokenBlob) {
        self.tokens
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((server_id.to_string(), server_type), token.as_bytes().to_vec());
        self.emit(HostEvent::TokenStored {
            server: server_id.to_string(),
            server_type,
        });
    }

    fn setup_proxy(&self, fd: ProxyDescriptor) {
        self.emit(HostEvent::ProxyReady(fd));
    }

    fn refresh_list(&self) {
        self.emit(HostEvent::ListRefreshed);
    }

    fn read_rx_bytes(&self) -> u64 {
        self.rx_bytes.fetch_add(self.traffic_step, Ordering::SeqCst) + self.traffic_step
    }
}
