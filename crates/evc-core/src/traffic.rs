//! Traffic counters
//!
//! The host exposes the received-bytes counter of the tunnel interface.
//! `TrafficMeter` keeps the exported value monotonic within a session;
//! `DropMonitor` watches it to guess whether the connection went dead.
//!
//! # Dropped-connection check
//!
//! ```text
//! start = rx ──tick──▶ rx > start? ──yes──▶ alive (early exit)
//!                │            │no
//!                │       (polls - 1 ticks)
//!                ▼            ▼
//!           cancelled    dropped = end <= start
//! ```
//!
//! The verdict is advisory; the engine never tears anything down by itself.

use crate::host::{HostError, HostGateway};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Per-session monotonic view of the rx counter
#[derive(Debug, Default)]
pub struct TrafficMeter {
    session: u64,
    last: Option<u64>,
}

impl TrafficMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget the previous reading; called on every new connect
    pub fn start_session(&mut self) {
        self.session += 1;
        self.last = None;
    }

    /// Record a reading and return the exported value
    pub fn record(&mut self, reading: u64) -> u64 {
        match self.last {
            Some(last) if reading < last => {
                warn!(
                    "rx counter went backwards in session {} ({} < {}), keeping {}",
                    self.session, reading, last, last
                );
                last
            }
            _ => {
                self.last = Some(reading);
                reading
            }
        }
    }

    /// Last exported value of this session
    pub fn last(&self) -> Option<u64> {
        self.last
    }

    pub fn session(&self) -> u64 {
        self.session
    }
}

/// Drop monitor errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MonitorError {
    #[error("Dropped-connection monitor was cancelled")]
    Cancelled,

    #[error("Host error: {0}")]
    Host(#[from] HostError),
}

/// Cancels a running `DropMonitor`
#[derive(Debug, Clone)]
pub struct MonitorCancel {
    tx: Arc<watch::Sender<bool>>,
}

impl MonitorCancel {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Watches the rx counter for a dead connection
pub struct DropMonitor {
    gateway: Arc<HostGateway>,
    interval: Duration,
    polls: u32,
    cancel_tx: Arc<watch::Sender<bool>>,
}

impl DropMonitor {
    /// `polls` counts the readings taken, including the first one
    pub fn new(gateway: Arc<HostGateway>, interval: Duration, polls: u32) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            gateway,
            interval,
            polls: polls.max(2),
            cancel_tx: Arc::new(tx),
        }
    }

    /// Handle for cancelling from another task
    pub fn canceller(&self) -> MonitorCancel {
        MonitorCancel {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Run the check. `Ok(true)` means the connection looks dropped.
    pub async fn run(&self) -> Result<bool, MonitorError> {
        let mut cancelled = self.cancel_tx.subscribe();
        if *cancelled.borrow_and_update() {
            return Err(MonitorError::Cancelled);
        }

        let start = self.gateway.read_rx_bytes()?;
        debug!("Drop monitor started at {} rx bytes", start);

        let mut ticker = tokio::time::interval(self.interval);
        // The first tick completes immediately
        ticker.tick().await;

        let mut end = start;
        for poll in 2..=self.polls {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = cancelled.changed() => return Err(MonitorError::Cancelled),
            }

            end = self.gateway.read_rx_bytes()?;
            debug!("Drop monitor poll {}/{}: {} rx bytes", poll, self.polls, end);
            if end > start {
                return Ok(false);
            }
        }

        let dropped = end <= start;
        if dropped {
            warn!("No traffic received for {} polls, connection looks dropped", self.polls);
        }
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{Callback, HostCallbacks};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_gateway(step: u64) -> (Arc<HostGateway>, Arc<AtomicU64>) {
        let reads = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&reads);
        let gateway = HostGateway::new(
            HostCallbacks::new()
                .on_read_rx_bytes(move || 1000 + counter.fetch_add(1, Ordering::SeqCst) * step),
        );
        (Arc::new(gateway), reads)
    }

    #[test]
    fn test_meter_clamps_lower_readings() {
        let mut meter = TrafficMeter::new();
        meter.start_session();
        assert_eq!(meter.record(100), 100);
        assert_eq!(meter.record(50), 100);
        assert_eq!(meter.record(150), 150);
        assert_eq!(meter.last(), Some(150));
    }

    #[test]
    fn test_meter_resets_per_session() {
        let mut meter = TrafficMeter::new();
        meter.start_session();
        meter.record(5000);

        meter.start_session();
        assert_eq!(meter.session(), 2);
        assert_eq!(meter.last(), None);
        assert_eq!(meter.record(10), 10);
    }

    #[tokio::test]
    async fn test_monitor_alive_when_counter_grows() {
        let (gateway, reads) = counting_gateway(64);
        let monitor = DropMonitor::new(gateway, Duration::from_millis(5), 5);

        assert_eq!(monitor.run().await, Ok(false));
        // Start reading plus one poll before the early exit
        assert_eq!(reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_monitor_dropped_when_counter_stalls() {
        let (gateway, reads) = counting_gateway(0);
        let monitor = DropMonitor::new(gateway, Duration::from_millis(5), 3);

        assert_eq!(monitor.run().await, Ok(true));
        assert_eq!(reads.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_monitor_cancel() {
        let (gateway, _) = counting_gateway(0);
        let monitor = DropMonitor::new(gateway, Duration::from_secs(60), 5);
        let cancel = monitor.canceller();

        let task = async { monitor.run().await };
        let canceller = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        };
        let (result, ()) = tokio::join!(task, canceller);
        assert_eq!(result, Err(MonitorError::Cancelled));
    }

    #[tokio::test]
    async fn test_monitor_requires_counter_callback() {
        let monitor = DropMonitor::new(
            Arc::new(HostGateway::new(HostCallbacks::new())),
            Duration::from_millis(5),
            2,
        );
        assert_eq!(
            monitor.run().await,
            Err(MonitorError::Host(HostError::CallbackUnregistered(Callback::ReadRxBytes)))
        );
    }
}
