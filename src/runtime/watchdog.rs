//! Channel operation watchdog for detecting stalled pipeline stages
//!
//! Every monitored send/recv stores its start time in an atomic slot; a
//! background thread scans the slots once per interval and warns about
//! operations blocked longer than the threshold. A stalled stacked decoder
//! (waiting on an upstream that never closes its output) shows up here.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};
use tracing::{info, warn};

const DEFAULT_THRESHOLD: Duration = Duration::from_secs(5);
const SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Shared state for a single port's operation tracking
struct PortState {
    /// Milliseconds since the watchdog epoch when the current operation
    /// started, or 0 if idle
    op_start: AtomicU64,
    has_warned: AtomicBool,
    node_name: String,
    port_name: String,
    operation: &'static str,
}

/// Handle to a port's watchdog slot, held by senders and receivers
#[derive(Clone)]
pub struct WatchdogHandle {
    state: Arc<PortState>,
    epoch: Instant,
}

impl WatchdogHandle {
    fn now(&self) -> u64 {
        // +1 keeps a start at the epoch distinguishable from "idle"
        self.epoch.elapsed().as_millis() as u64 + 1
    }

    /// Mark the start of a blocking operation
    #[inline]
    pub fn start_operation(&self) {
        self.state.op_start.store(self.now(), Ordering::Relaxed);
        self.state.has_warned.store(false, Ordering::Relaxed);
    }

    /// Mark the end of a blocking operation
    #[inline]
    pub fn finish_operation(&self) {
        if self.state.has_warned.swap(false, Ordering::Relaxed) {
            info!(
                "Unblocked: [{}] {} on port '{}'",
                self.state.node_name, self.state.operation, self.state.port_name
            );
        }
        self.state.op_start.store(0, Ordering::Relaxed);
    }
}

/// Shared watchdog state
#[derive(Clone)]
pub struct Watchdog {
    ports: Arc<Mutex<Vec<Weak<PortState>>>>,
    enabled: Arc<AtomicBool>,
    threshold: Duration,
    epoch: Instant,
}

impl Watchdog {
    /// Create a watchdog with the default 5 s threshold
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(threshold: Duration) -> Self {
        Self {
            ports: Arc::new(Mutex::new(Vec::new())),
            enabled: Arc::new(AtomicBool::new(true)),
            threshold,
            epoch: Instant::now(),
        }
    }

    /// Register a new port for monitoring
    pub fn register_port(&self, node_name: &str, operation: &'static str, port_name: &str) -> WatchdogHandle {
        let state = Arc::new(PortState {
            op_start: AtomicU64::new(0),
            has_warned: AtomicBool::new(false),
            node_name: node_name.to_string(),
            port_name: port_name.to_string(),
            operation,
        });

        self.ports
            .lock()
            .expect("watchdog port list poisoned")
            .push(Arc::downgrade(&state));

        WatchdogHandle {
            state,
            epoch: self.epoch,
        }
    }

    /// Scan all live ports, warn once per blocked operation and return the
    /// `node.port` names currently over the threshold.
    pub fn check_for_blocked(&self) -> Vec<String> {
        let now = self.epoch.elapsed().as_millis() as u64 + 1;
        let threshold_ms = self.threshold.as_millis() as u64;
        let mut blocked = Vec::new();

        let mut ports = self.ports.lock().expect("watchdog port list poisoned");
        ports.retain(|weak| {
            let Some(state) = weak.upgrade() else {
                return false;
            };
            let start = state.op_start.load(Ordering::Relaxed);
            if start > 0 {
                let duration_ms = now.saturating_sub(start);
                if duration_ms > threshold_ms {
                    blocked.push(format!("{}.{}", state.node_name, state.port_name));
                    if !state.has_warned.swap(true, Ordering::Relaxed) {
                        warn!(
                            "Blocked: [{}] {} on port '{}' for {:.1}s",
                            state.node_name,
                            state.operation,
                            state.port_name,
                            duration_ms as f64 / 1000.0
                        );
                    }
                }
            }
            true
        });
        blocked
    }

    /// Start the watchdog monitoring thread
    pub fn start_monitoring_thread(&self) -> std::thread::JoinHandle<()> {
        let watchdog = self.clone();
        std::thread::spawn(move || {
            while watchdog.enabled.load(Ordering::Relaxed) {
                std::thread::sleep(SCAN_INTERVAL);
                watchdog.check_for_blocked();
            }
        })
    }

    /// Stop the watchdog monitoring thread
    pub fn stop(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard marking an operation as in progress for its lifetime
pub struct OperationGuard<'a> {
    handle: &'a WatchdogHandle,
}

impl<'a> OperationGuard<'a> {
    #[inline]
    pub fn new(handle: &'a WatchdogHandle) -> Self {
        handle.start_operation();
        Self { handle }
    }
}

impl Drop for OperationGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.handle.finish_operation();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_long_operation() {
        let wd = Watchdog::with_threshold(Duration::from_millis(10));
        let handle = wd.register_port("ds2432", "recv", "frames");

        let guard = OperationGuard::new(&handle);
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(wd.check_for_blocked(), vec!["ds2432.frames".to_string()]);
        drop(guard);

        assert!(wd.check_for_blocked().is_empty());
    }

    #[test]
    fn test_dropped_handles_are_forgotten() {
        let wd = Watchdog::with_threshold(Duration::ZERO);
        {
            let handle = wd.register_port("pwm", "send", "annotations");
            handle.start_operation();
        }
        assert!(wd.check_for_blocked().is_empty());
        assert!(wd.ports.lock().unwrap().is_empty());
    }
}
