//! Connection State Machine
//!
//! ```text
//!  NoServer ◀──forget_server── Disconnected ◀──────acknowledge────── Failed
//!     │                          │    ▲  ▲                              ▲
//!     └──────────connect─────────┤    │  └──teardown_done──┐            │
//!                                ▼    │                    │          fail
//!                           Connecting ──established──▶ Connected ──────┤
//!                                │  │                      │            │
//!                                │  └────────fail──────────┼────────────┘
//!                                └─disconnect─▶ Disconnecting ◀─disconnect
//!
//!  any ──force_reset──▶ Disconnected
//! ```
//!
//! Every transition is reported to the host as `(old, new)` before the
//! operation returns. The host may veto a transition out of Connecting
//! or Disconnecting; the machine then rolls back and reports the
//! rollback. Vetoes of other transitions are ignored.

use crate::host::{HostError, HostGateway};
use crate::selector::ResolvedServer;
use evc_types::ConnectionState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// State machine errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Transition {from} -> {to} vetoed by host")]
    TransitionVetoed {
        from: ConnectionState,
        to: ConnectionState,
    },

    #[error("Cannot {op} while {from}")]
    InvalidTransition {
        from: ConnectionState,
        op: &'static str,
    },

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

impl StateError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StateError::Host(e) if e.is_fatal())
    }
}

/// Lifecycle of the single active connection
pub struct ConnectionStateMachine {
    gateway: Arc<HostGateway>,
    state: ConnectionState,
    active: Option<ResolvedServer>,
    attempt: u64,
}

impl ConnectionStateMachine {
    /// Starts in Disconnected
    pub fn new(gateway: Arc<HostGateway>) -> Self {
        Self {
            gateway,
            state: ConnectionState::Disconnected,
            active: None,
            attempt: 0,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Server of the current or last connection
    pub fn active_server(&self) -> Option<&ResolvedServer> {
        self.active.as_ref()
    }

    /// Number of the latest connection attempt
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// Start connecting to `server`. Returns the attempt number.
    pub fn connect(&mut self, server: ResolvedServer) -> Result<u64, StateError> {
        self.check_connect()?;
        self.transition(ConnectionState::Connecting, true)?;
        self.attempt += 1;
        info!(
            "Connecting to {} (attempt {}, profile {:?})",
            server.identifier(),
            self.attempt,
            server.profile_id()
        );
        self.active = Some(server);
        Ok(self.attempt)
    }

    /// Would `connect` be accepted right now?
    pub fn check_connect(&self) -> Result<(), StateError> {
        match &self.state {
            ConnectionState::Connecting => Err(StateError::AlreadyConnecting),
            ConnectionState::Connected => Err(StateError::AlreadyConnected),
            ConnectionState::NoServer | ConnectionState::Disconnected => Ok(()),
            _ => Err(self.invalid("connect")),
        }
    }

    /// The tunnel is up
    pub fn established(&mut self) -> Result<(), StateError> {
        match self.state {
            ConnectionState::Connecting => self.transition(ConnectionState::Connected, true),
            _ => Err(self.invalid("establish")),
        }
    }

    /// The attempt or the connection failed
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), StateError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.transition(ConnectionState::Failed(reason.into()), true)
            }
            _ => Err(self.invalid("fail")),
        }
    }

    /// The host has seen the failure
    pub fn acknowledge(&mut self) -> Result<(), StateError> {
        match self.state {
            ConnectionState::Failed(_) => self.transition(ConnectionState::Disconnected, true),
            _ => Err(self.invalid("acknowledge")),
        }
    }

    /// Start tearing down; cancels an attempt in progress
    pub fn disconnect(&mut self) -> Result<(), StateError> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.transition(ConnectionState::Disconnecting, true)
            }
            _ => Err(self.invalid("disconnect")),
        }
    }

    /// Teardown finished
    pub fn teardown_done(&mut self) -> Result<(), StateError> {
        match self.state {
            ConnectionState::Disconnecting => self.transition(ConnectionState::Disconnected, true),
            _ => Err(self.invalid("finish teardown")),
        }
    }

    /// Drop the remembered server
    pub fn forget_server(&mut self) -> Result<(), StateError> {
        match self.state {
            ConnectionState::Disconnected => {
                self.transition(ConnectionState::NoServer, true)?;
                self.active = None;
                Ok(())
            }
            _ => Err(self.invalid("forget server")),
        }
    }

    /// Return to Disconnected from anywhere. Cannot be vetoed.
    pub fn force_reset(&mut self) -> Result<(), StateError> {
        if self.state == ConnectionState::Disconnected {
            return Ok(());
        }
        warn!("Forcing reset from {}", self.state);
        self.transition(ConnectionState::Disconnected, false)
    }

    fn invalid(&self, op: &'static str) -> StateError {
        StateError::InvalidTransition {
            from: self.state.clone(),
            op,
        }
    }

    fn transition(&mut self, new: ConnectionState, allow_veto: bool) -> Result<(), StateError> {
        let old = std::mem::replace(&mut self.state, new.clone());
        let vetoed = match self.gateway.state_changed(&old, &new) {
            Ok(vetoed) => vetoed,
            Err(e) => {
                self.state = old;
                return Err(e.into());
            }
        };
        debug!("State {} -> {}", old, new);

        if !vetoed {
            return Ok(());
        }
        if !(allow_veto && matches!(old, ConnectionState::Connecting | ConnectionState::Disconnecting)) {
            debug!("Ignoring veto of {} -> {}", old, new);
            return Ok(());
        }

        warn!("Host vetoed {} -> {}, rolling back", old, new);
        self.state = old.clone();
        // The rollback is final; its veto flag is not consulted
        self.gateway.state_changed(&new, &old)?;
        Err(StateError::TransitionVetoed { from: old, to: new })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Callback, HostCallbacks};
    use crate::catalog::CatalogStore;
    use crate::selector::ServerSelector;
    use evc_types::{ServerList, ServerType};
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<(ConnectionState, ConnectionState)>>>;

    fn recording_machine(
        veto: impl Fn(&ConnectionState, &ConnectionState) -> bool + Send + Sync + 'static,
    ) -> (ConnectionStateMachine, Log) {
        let log: Log = Arc::default();
        let sink = Arc::clone(&log);
        let callbacks = HostCallbacks::new().on_state_change(move |old, new| {
            sink.lock().unwrap().push((old.clone(), new.clone()));
            veto(old, new)
        });
        (
            ConnectionStateMachine::new(Arc::new(HostGateway::new(callbacks))),
            log,
        )
    }

    fn server() -> ResolvedServer {
        let store = CatalogStore::new();
        store
            .replace_servers(ServerList::new(1).with_server(evc_types::Server::new(
                ServerType::Custom,
                "https://vpn.example/",
                "VPN",
            )))
            .unwrap();
        ServerSelector::new(&store)
            .resolve(ServerType::Custom, "https://vpn.example/")
            .unwrap()
    }

    use ConnectionState::*;

    #[test]
    fn test_happy_path_reports_each_transition_once() {
        let (mut machine, log) = recording_machine(|_, _| false);

        assert_eq!(machine.connect(server()), Ok(1));
        machine.established().unwrap();
        machine.disconnect().unwrap();
        machine.teardown_done().unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Disconnected, Connecting),
                (Connecting, Connected),
                (Connected, Disconnecting),
                (Disconnecting, Disconnected),
            ]
        );
        assert_eq!(machine.state(), &Disconnected);
        assert_eq!(machine.active_server().unwrap().identifier(), "https://vpn.example/");
    }

    #[test]
    fn test_connect_twice() {
        let (mut machine, log) = recording_machine(|_, _| false);
        machine.connect(server()).unwrap();
        assert_eq!(machine.connect(server()), Err(StateError::AlreadyConnecting));

        machine.established().unwrap();
        assert_eq!(machine.connect(server()), Err(StateError::AlreadyConnected));

        let connects = log
            .lock()
            .unwrap()
            .iter()
            .filter(|(old, new)| *old == Disconnected && *new == Connecting)
            .count();
        assert_eq!(connects, 1);
    }

    #[test]
    fn test_disconnect_while_connecting() {
        let (mut machine, log) = recording_machine(|_, _| false);
        machine.connect(server()).unwrap();
        machine.disconnect().unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.iter().filter(|(_, new)| *new == Disconnecting).count(), 1);
        assert_eq!(machine.state(), &Disconnecting);
    }

    #[test]
    fn test_failure_requires_acknowledge() {
        let (mut machine, log) = recording_machine(|_, _| false);
        machine.connect(server()).unwrap();
        machine.fail("handshake timeout").unwrap();
        assert_eq!(machine.state().failure_reason(), Some("handshake timeout"));

        assert!(matches!(
            machine.connect(server()),
            Err(StateError::InvalidTransition { op: "connect", .. })
        ));

        machine.acknowledge().unwrap();
        assert_eq!(machine.connect(server()), Ok(2));

        let log = log.lock().unwrap();
        for pair in log.windows(2) {
            assert_ne!(pair[0].1, pair[1].1);
        }
    }

    #[test]
    fn test_veto_from_connecting_rolls_back() {
        let (mut machine, log) = recording_machine(|old, new| *old == Connecting && *new == Connected);
        machine.connect(server()).unwrap();

        assert_eq!(
            machine.established(),
            Err(StateError::TransitionVetoed {
                from: Connecting,
                to: Connected,
            })
        );
        assert_eq!(machine.state(), &Connecting);
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                (Disconnected, Connecting),
                (Connecting, Connected),
                (Connected, Connecting),
            ]
        );
    }

    #[test]
    fn test_veto_disconnect_while_connecting() {
        let (mut machine, log) =
            recording_machine(|old, new| *old == Connecting && *new == Disconnecting);
        machine.connect(server()).unwrap();

        assert_eq!(
            machine.disconnect(),
            Err(StateError::TransitionVetoed {
                from: Connecting,
                to: Disconnecting,
            })
        );
        assert_eq!(machine.state(), &Connecting);
        assert_eq!(
            log.lock().unwrap()[1..],
            [(Connecting, Disconnecting), (Disconnecting, Connecting)]
        );
    }

    #[test]
    fn test_veto_teardown_keeps_disconnecting() {
        let (mut machine, log) =
            recording_machine(|old, new| *old == Disconnecting && *new == Disconnected);
        machine.connect(server()).unwrap();
        machine.established().unwrap();
        machine.disconnect().unwrap();

        assert_eq!(
            machine.teardown_done(),
            Err(StateError::TransitionVetoed {
                from: Disconnecting,
                to: Disconnected,
            })
        );
        assert_eq!(machine.state(), &Disconnecting);
        assert_eq!(
            log.lock().unwrap().last(),
            Some(&(Disconnected, Disconnecting))
        );
    }

    #[test]
    fn test_veto_failure_while_connecting() {
        let (mut machine, log) = recording_machine(|_, new| new.is_failed());
        machine.connect(server()).unwrap();

        let failed = Failed("timeout".into());
        assert_eq!(
            machine.fail("timeout"),
            Err(StateError::TransitionVetoed {
                from: Connecting,
                to: failed.clone(),
            })
        );
        assert_eq!(machine.state(), &Connecting);
        assert_eq!(
            log.lock().unwrap()[1..],
            [(Connecting, failed.clone()), (failed, Connecting)]
        );
    }

    #[test]
    fn test_veto_failure_ignored_when_connected() {
        let (mut machine, _) = recording_machine(|_, new| new.is_failed());
        machine.connect(server()).unwrap();
        machine.established().unwrap();

        machine.fail("link down").unwrap();
        assert_eq!(machine.state().failure_reason(), Some("link down"));
    }

    #[test]
    fn test_veto_ignored_outside_connecting_or_disconnecting() {
        let (mut machine, _) = recording_machine(|_, _| true);
        // Disconnected -> Connecting is not vetoable
        machine.connect(server()).unwrap();
        assert_eq!(machine.state(), &Connecting);
    }

    #[test]
    fn test_force_reset() {
        let (mut machine, log) = recording_machine(|_, _| true);
        machine.force_reset().unwrap();
        assert!(log.lock().unwrap().is_empty());

        machine.connect(server()).unwrap();
        machine.force_reset().unwrap();
        assert_eq!(machine.state(), &Disconnected);
        assert_eq!(log.lock().unwrap().last(), Some(&(Connecting, Disconnected)));
    }

    #[test]
    fn test_forget_server() {
        let (mut machine, _) = recording_machine(|_, _| false);
        machine.connect(server()).unwrap();
        assert!(matches!(
            machine.forget_server(),
            Err(StateError::InvalidTransition { op: "forget server", .. })
        ));

        machine.force_reset().unwrap();
        machine.forget_server().unwrap();
        assert_eq!(machine.state(), &NoServer);
        assert!(machine.active_server().is_none());

        assert_eq!(machine.connect(server()), Ok(2));
    }

    #[test]
    fn test_invalid_operations() {
        let (mut machine, log) = recording_machine(|_, _| false);
        assert!(matches!(machine.established(), Err(StateError::InvalidTransition { .. })));
        assert!(matches!(machine.disconnect(), Err(StateError::InvalidTransition { .. })));
        assert!(matches!(machine.acknowledge(), Err(StateError::InvalidTransition { .. })));
        assert!(matches!(machine.teardown_done(), Err(StateError::InvalidTransition { .. })));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_state_callback_reverts() {
        let mut machine = ConnectionStateMachine::new(Arc::new(HostGateway::new(HostCallbacks::new())));
        let err = machine.connect(server()).unwrap_err();
        assert_eq!(err, StateError::Host(HostError::CallbackUnregistered(Callback::StateChange)));
        assert!(err.is_fatal());
        assert_eq!(machine.state(), &Disconnected);
        assert!(machine.active_server().is_none());
        assert_eq!(machine.attempt(), 0);
    }
}
