//! Process-wide host registration
//!
//! The host registers its callbacks once at startup and deregisters at
//! teardown. A second registration without a deregistration in between
//! is refused.

use crate::host::{HostCallbacks, HostError, HostGateway};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{info, warn};

static REGISTRY: RwLock<Option<Arc<HostGateway>>> = RwLock::new(None);

/// Register the host callbacks for this process
pub fn register(callbacks: HostCallbacks) -> Result<Arc<HostGateway>, HostError> {
    let mut slot = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    if slot.is_some() {
        warn!("Refusing second host registration");
        return Err(HostError::AlreadyRegistered);
    }

    let gateway = Arc::new(HostGateway::new(callbacks));
    *slot = Some(Arc::clone(&gateway));
    info!("Host callbacks registered");
    Ok(gateway)
}

/// Remove the registration; a new one is allowed afterwards
pub fn deregister() -> Result<(), HostError> {
    let mut slot = REGISTRY.write().unwrap_or_else(PoisonError::into_inner);
    match slot.take() {
        Some(_) => {
            info!("Host callbacks deregistered");
            Ok(())
        }
        None => Err(HostError::NotRegistered),
    }
}

/// The registered gateway
pub fn current() -> Result<Arc<HostGateway>, HostError> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
        .map(Arc::clone)
        .ok_or(HostError::NotRegistered)
}

/// Is a host registered?
pub fn is_registered() -> bool {
    REGISTRY.read().unwrap_or_else(PoisonError::into_inner).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn reset() {
        let _ = deregister();
    }

    #[test]
    #[serial]
    fn test_register_once() {
        reset();
        let gateway = register(HostCallbacks::new().on_read_rx_bytes(|| 7)).unwrap();
        assert_eq!(gateway.read_rx_bytes(), Ok(7));

        assert_eq!(
            register(HostCallbacks::new()).unwrap_err(),
            HostError::AlreadyRegistered
        );
        // The first registration is still in place
        assert_eq!(current().unwrap().read_rx_bytes(), Ok(7));
        reset();
    }

    #[test]
    #[serial]
    fn test_reregister_after_deregister() {
        reset();
        register(HostCallbacks::new()).unwrap();
        deregister().unwrap();
        assert!(!is_registered());
        assert_eq!(current().unwrap_err(), HostError::NotRegistered);

        register(HostCallbacks::new().on_read_rx_bytes(|| 1)).unwrap();
        assert!(is_registered());
        reset();
    }

    #[test]
    #[serial]
    fn test_deregister_without_registration() {
        reset();
        assert_eq!(deregister(), Err(HostError::NotRegistered));
    }
}
