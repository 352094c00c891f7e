//! Host Callback Gateway
//!
//! The embedding application (the "host") supplies the pieces the engine
//! cannot do itself: persisting tokens, wiring a proxy socket, reading
//! interface counters and being told about state changes.
//!
//! ```text
//!              ┌────────────── HostCallbacks ──────────────┐
//!  engine ───▶ │ state_changed  get_token  set_token       │ ───▶ host
//!              │ setup_proxy    refresh_list  read_rx_bytes│
//!              └───────────────────────────────────────────┘
//! ```
//!
//! Every slot is optional at construction time. Calling through an empty
//! slot is a fatal `CallbackUnregistered` error, never a silent no-op.
//! Callbacks run on the engine's calling thread and must not call back
//! into the engine.

use crate::proxy::ProxyDescriptor;
use crate::token::TokenBlob;
use evc_types::{ConnectionState, ServerType};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// Callback surface implemented by the host
pub trait Host: Send + Sync {
    /// A state transition happened. Return `true` to veto it.
    fn on_state_change(&self, old: &ConnectionState, new: &ConnectionState) -> bool;

    /// Stored token for a server; an empty blob when there is none
    fn get_token(&self, server_id: &str, server_type: ServerType) -> TokenBlob;

    /// Persist a token for a server
    fn set_token(&self, server_id: &str, server_type: ServerType, token: &TokenBlob);

    /// Take ownership of a proxy socket
    fn setup_proxy(&self, fd: ProxyDescriptor);

    /// The catalog changed
    fn refresh_list(&self);

    /// Received-bytes counter of the tunnel interface
    fn read_rx_bytes(&self) -> u64;
}

type StateFn = dyn Fn(&ConnectionState, &ConnectionState) -> bool + Send + Sync;
type GetTokenFn = dyn Fn(&str, ServerType) -> TokenBlob + Send + Sync;
type SetTokenFn = dyn Fn(&str, ServerType, &TokenBlob) + Send + Sync;
type ProxyFn = dyn Fn(ProxyDescriptor) + Send + Sync;
type RefreshFn = dyn Fn() + Send + Sync;
type RxBytesFn = dyn Fn() -> u64 + Send + Sync;

/// Names of the callback slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Callback {
    StateChange,
    GetToken,
    SetToken,
    SetupProxy,
    RefreshList,
    ReadRxBytes,
}

impl Callback {
    pub fn name(&self) -> &'static str {
        match self {
            Callback::StateChange => "state_change",
            Callback::GetToken => "get_token",
            Callback::SetToken => "set_token",
            Callback::SetupProxy => "setup_proxy",
            Callback::RefreshList => "refresh_list",
            Callback::ReadRxBytes => "read_rx_bytes",
        }
    }
}

impl fmt::Display for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Host gateway errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("Callback '{0}' is not registered")]
    CallbackUnregistered(Callback),

    #[error("Host callbacks are already registered")]
    AlreadyRegistered,

    #[error("No host callbacks registered")]
    NotRegistered,
}

impl HostError {
    /// Fatal errors mean the host integration itself is broken
    pub fn is_fatal(&self) -> bool {
        matches!(self, HostError::CallbackUnregistered(_))
    }
}

/// One optional slot per callback
#[derive(Clone, Default)]
pub struct HostCallbacks {
    state_change: Option<Arc<StateFn>>,
    get_token: Option<Arc<GetTokenFn>>,
    set_token: Option<Arc<SetTokenFn>>,
    setup_proxy: Option<Arc<ProxyFn>>,
    refresh_list: Option<Arc<RefreshFn>>,
    read_rx_bytes: Option<Arc<RxBytesFn>>,
}

impl HostCallbacks {
    /// No slots filled
    pub fn new() -> Self {
        Self::default()
    }

    /// Fill every slot from a `Host` implementation
    pub fn from_host<H: Host + 'static>(host: Arc<H>) -> Self {
        let state = Arc::clone(&host);
        let get = Arc::clone(&host);
        let set = Arc::clone(&host);
        let proxy = Arc::clone(&host);
        let refresh = Arc::clone(&host);
        let rx = host;

        Self::new()
            .on_state_change(move |old, new| state.on_state_change(old, new))
            .on_get_token(move |id, ty| get.get_token(id, ty))
            .on_set_token(move |id, ty, token| set.set_token(id, ty, token))
            .on_setup_proxy(move |fd| proxy.setup_proxy(fd))
            .on_refresh_list(move || refresh.refresh_list())
            .on_read_rx_bytes(move || rx.read_rx_bytes())
    }

    pub fn on_state_change(
        mut self,
        f: impl Fn(&ConnectionState, &ConnectionState) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.state_change = Some(Arc::new(f));
        self
    }

    pub fn on_get_token(
        mut self,
        f: impl Fn(&str, ServerType) -> TokenBlob + Send + Sync + 'static,
    ) -> Self {
        self.get_token = Some(Arc::new(f));
        self
    }

    pub fn on_set_token(
        mut self,
        f: impl Fn(&str, ServerType, &TokenBlob) + Send + Sync + 'static,
    ) -> Self {
        self.set_token = Some(Arc::new(f));
        self
    }

    pub fn on_setup_proxy(mut self, f: impl Fn(ProxyDescriptor) + Send + Sync + 'static) -> Self {
        self.setup_proxy = Some(Arc::new(f));
        self
    }

    pub fn on_refresh_list(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.refresh_list = Some(Arc::new(f));
        self
    }

    pub fn on_read_rx_bytes(mut self, f: impl Fn() -> u64 + Send + Sync + 'static) -> Self {
        self.read_rx_bytes = Some(Arc::new(f));
        self
    }

    /// Is the slot for `callback` filled?
    pub fn has(&self, callback: Callback) -> bool {
        match callback {
            Callback::StateChange => self.state_change.is_some(),
            Callback::GetToken => self.get_token.is_some(),
            Callback::SetToken => self.set_token.is_some(),
            Callback::SetupProxy => self.setup_proxy.is_some(),
            Callback::RefreshList => self.refresh_list.is_some(),
            Callback::ReadRxBytes => self.read_rx_bytes.is_some(),
        }
    }
}

impl fmt::Debug for HostCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostCallbacks")
            .field("state_change", &self.state_change.is_some())
            .field("get_token", &self.get_token.is_some())
            .field("set_token", &self.set_token.is_some())
            .field("setup_proxy", &self.setup_proxy.is_some())
            .field("refresh_list", &self.refresh_list.is_some())
            .field("read_rx_bytes", &self.read_rx_bytes.is_some())
            .finish()
    }
}

fn missing<T>(callback: Callback) -> Result<T, HostError> {
    error!("Host callback '{}' is not registered", callback);
    Err(HostError::CallbackUnregistered(callback))
}

/// Typed access to the host callbacks
#[derive(Debug, Clone)]
pub struct HostGateway {
    callbacks: HostCallbacks,
}

impl HostGateway {
    pub fn new(callbacks: HostCallbacks) -> Self {
        Self { callbacks }
    }

    /// Gateway over a `Host` implementation
    pub fn from_host<H: Host + 'static>(host: Arc<H>) -> Self {
        Self::new(HostCallbacks::from_host(host))
    }

    /// Fail with `CallbackUnregistered` unless the slot is filled
    pub fn ensure(&self, callback: Callback) -> Result<(), HostError> {
        if self.callbacks.has(callback) {
            Ok(())
        } else {
            missing(callback)
        }
    }

    /// Report a transition; returns the host's veto flag
    pub fn state_changed(&self, old: &ConnectionState, new: &ConnectionState) -> Result<bool, HostError> {
        let Some(f) = &self.callbacks.state_change else {
            return missing(Callback::StateChange);
        };
        debug!("Reporting transition {} -> {}", old, new);
        Ok(f(old, new))
    }

    /// Stored token, `None` when the host has nothing
    pub fn get_token(&self, server_id: &str, server_type: ServerType) -> Result<Option<TokenBlob>, HostError> {
        let Some(f) = &self.callbacks.get_token else {
            return missing(Callback::GetToken);
        };
        let token = f(server_id, server_type);
        debug!("Loaded token for {} {}: {:?}", server_type, server_id, token);
        Ok(token.into_option())
    }

    pub fn set_token(&self, server_id: &str, server_type: ServerType, token: &TokenBlob) -> Result<(), HostError> {
        let Some(f) = &self.callbacks.set_token else {
            return missing(Callback::SetToken);
        };
        debug!("Storing token for {} {}: {:?}", server_type, server_id, token);
        f(server_id, server_type, token);
        Ok(())
    }

    pub fn setup_proxy(&self, fd: ProxyDescriptor) -> Result<(), HostError> {
        let Some(f) = &self.callbacks.setup_proxy else {
            return missing(Callback::SetupProxy);
        };
        f(fd);
        Ok(())
    }

    pub fn refresh_list(&self) -> Result<(), HostError> {
        let Some(f) = &self.callbacks.refresh_list else {
            return missing(Callback::RefreshList);
        };
        f();
        Ok(())
    }

    pub fn read_rx_bytes(&self) -> Result<u64, HostError> {
        let Some(f) = &self.callbacks.read_rx_bytes else {
            return missing(Callback::ReadRxBytes);
        };
        Ok(f())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct MemoryHost {
        tokens: Mutex<Vec<(String, ServerType, Vec<u8>)>>,
        proxies: Mutex<Vec<ProxyDescriptor>>,
        refreshes: AtomicU64,
    }

    impl Host for MemoryHost {
        fn on_state_change(&self, _old: &ConnectionState, new: &ConnectionState) -> bool {
            new.is_failed()
        }

        fn get_token(&self, server_id: &str, server_type: ServerType) -> TokenBlob {
            self.tokens
                .lock()
                .unwrap()
                .iter()
                .find(|(id, ty, _)| id == server_id && *ty == server_type)
                .map(|(_, _, bytes)| TokenBlob::new(bytes.clone()))
                .unwrap_or_else(TokenBlob::empty)
        }

        fn set_token(&self, server_id: &str, server_type: ServerType, token: &TokenBlob) {
            self.tokens
                .lock()
                .unwrap()
                .push((server_id.to_string(), server_type, token.as_bytes().to_vec()));
        }

        fn setup_proxy(&self, fd: ProxyDescriptor) {
            self.proxies.lock().unwrap().push(fd);
        }

        fn refresh_list(&self) {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
        }

        fn read_rx_bytes(&self) -> u64 {
            4096
        }
    }

    #[test]
    fn test_from_host_fills_every_slot() {
        let host = Arc::new(MemoryHost::default());
        let gateway = HostGateway::from_host(Arc::clone(&host));

        for callback in [
            Callback::StateChange,
            Callback::GetToken,
            Callback::SetToken,
            Callback::SetupProxy,
            Callback::RefreshList,
            Callback::ReadRxBytes,
        ] {
            assert!(gateway.ensure(callback).is_ok());
        }

        assert_eq!(gateway.read_rx_bytes(), Ok(4096));
        gateway.refresh_list().unwrap();
        gateway.setup_proxy(ProxyDescriptor(9)).unwrap();
        assert_eq!(host.refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(*host.proxies.lock().unwrap(), vec![ProxyDescriptor(9)]);
    }

    #[test]
    fn test_token_roundtrip_through_host() {
        let host = Arc::new(MemoryHost::default());
        let gateway = HostGateway::from_host(host);

        assert_eq!(gateway.get_token("https://a.example/", ServerType::Custom), Ok(None));

        gateway
            .set_token("https://a.example/", ServerType::Custom, &TokenBlob::from("tok"))
            .unwrap();
        let token = gateway
            .get_token("https://a.example/", ServerType::Custom)
            .unwrap()
            .unwrap();
        assert_eq!(token.as_bytes(), b"tok");

        // Same identifier under another type is a different key
        assert_eq!(
            gateway.get_token("https://a.example/", ServerType::InstituteAccess),
            Ok(None)
        );
    }

    #[test]
    fn test_veto_flag_passed_through() {
        let gateway = HostGateway::from_host(Arc::new(MemoryHost::default()));
        assert_eq!(
            gateway.state_changed(&ConnectionState::Connecting, &ConnectionState::Failed("x".into())),
            Ok(true)
        );
        assert_eq!(
            gateway.state_changed(&ConnectionState::Disconnected, &ConnectionState::Connecting),
            Ok(false)
        );
    }

    #[test]
    fn test_empty_slot_is_fatal() {
        let gateway = HostGateway::new(HostCallbacks::new().on_refresh_list(|| {}));

        let err = gateway.read_rx_bytes().unwrap_err();
        assert_eq!(err, HostError::CallbackUnregistered(Callback::ReadRxBytes));
        assert!(err.is_fatal());
        assert!(!HostError::AlreadyRegistered.is_fatal());

        assert!(gateway.refresh_list().is_ok());
        assert!(matches!(
            gateway.state_changed(&ConnectionState::Disconnected, &ConnectionState::Connecting),
            Err(HostError::CallbackUnregistered(Callback::StateChange))
        ));
    }

    #[test]
    fn test_debug_shows_filled_slots() {
        let callbacks = HostCallbacks::new().on_read_rx_bytes(|| 0);
        let debug = format!("{:?}", callbacks);
        assert!(debug.contains("read_rx_bytes: true"));
        assert!(debug.contains("get_token: false"));
    }
}
