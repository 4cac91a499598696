//! Scanner lifecycle: subscription management with automatic restart.
//!
//! [`AirPodsScanner`] wraps an [`AdvertisementWatcher`] and owns the
//! start/stop state machine. When the watcher reports an unsolicited
//! halt, the stopped-handler retries `start` at a fixed interval, on the
//! thread that delivered the notification, until a retry succeeds or an
//! explicit stop arrives. Matching advertisements are decoded and
//! recorded in the scanner's [`DeviceRegistry`].

use crate::device::Device;
use crate::protocol;
use crate::registry::DeviceRegistry;
use crate::scanner::{APPLE_COMPANY_ID, Advertisement, AdvertisementWatcher};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::time::{Duration, Instant};

/// Interval between automatic restart attempts.
pub const RETRY_INTERVAL: Duration = Duration::from_secs(3);

/// Longest the teardown path waits for the restart loop to acknowledge
/// the stop request before proceeding anyway.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Stopped,
    Running,
}

/// Scanner for AirPods proximity-pairing advertisements.
///
/// `start`, `stop` and `is_scanning` are callable from any thread. The
/// watcher delivers events on threads it owns; none of the entry points
/// here assume a particular caller.
pub struct AirPodsScanner {
    inner: Arc<Inner>,
}

struct Inner {
    watcher: Box<dyn AdvertisementWatcher>,
    registry: Arc<DeviceRegistry>,
    state: Mutex<ScanState>,
    /// Set by an explicit `stop`; checked by the restart loop before
    /// every attempt.
    stop_requested: AtomicBool,
    shutdown_requested: AtomicBool,
    /// Time of the most recent subscribe attempt; restart waits run
    /// relative to this.
    last_start: Mutex<Instant>,
    retry_interval: Duration,
    /// Guard value: true once the stopped-handler has observed the
    /// shutdown request and exited.
    signal: Mutex<bool>,
    stop_signal: Condvar,
    exit_signal: Condvar,
}

impl AirPodsScanner {
    pub fn new(watcher: Box<dyn AdvertisementWatcher>) -> Self {
        Self::with_retry_interval(watcher, RETRY_INTERVAL)
    }

    /// Build a scanner with a custom restart interval. Tests use
    /// millisecond intervals so restart behavior runs deterministically
    /// without wall-clock waits.
    pub fn with_retry_interval(watcher: Box<dyn AdvertisementWatcher>, interval: Duration) -> Self {
        let inner = Arc::new(Inner {
            watcher,
            registry: Arc::new(DeviceRegistry::new()),
            state: Mutex::new(ScanState::Stopped),
            stop_requested: AtomicBool::new(false),
            shutdown_requested: AtomicBool::new(false),
            last_start: Mutex::new(Instant::now()),
            retry_interval: interval,
            signal: Mutex::new(false),
            stop_signal: Condvar::new(),
            exit_signal: Condvar::new(),
        });

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.watcher.on_received(Arc::new(move |advertisement: &Advertisement| {
            if let Some(inner) = weak.upgrade() {
                inner.handle_advertisement(advertisement);
            }
        }));

        let weak: Weak<Inner> = Arc::downgrade(&inner);
        inner.watcher.on_stopped(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.handle_stopped();
            }
        }));

        Self { inner }
    }

    /// Subscribe to the advertisement source.
    ///
    /// Returns false when the source reports an error; the scanner stays
    /// stopped. Calling `start` while already running re-subscribes.
    pub fn start(&self) -> bool {
        self.inner.try_start()
    }

    /// Unsubscribe from the advertisement source.
    ///
    /// Sets the explicit-stop flag first so a concurrent restart loop
    /// winds down instead of resubscribing. Returns false when the
    /// underlying unsubscribe reports an error; the scanner is
    /// considered stopped either way.
    pub fn stop(&self) -> bool {
        let inner = &self.inner;
        inner.stop_requested.store(true, Ordering::SeqCst);
        {
            let _guard = inner.signal.lock().expect("signal lock poisoned");
            inner.stop_signal.notify_all();
        }

        let stopped = match inner.watcher.unsubscribe() {
            Ok(()) => {
                info!("advertisement watcher stop succeeded");
                true
            }
            Err(err) => {
                error!("advertisement watcher stop failed: {err}");
                false
            }
        };
        *inner.state.lock().expect("state lock poisoned") = ScanState::Stopped;
        stopped
    }

    pub fn is_scanning(&self) -> bool {
        *self.inner.state.lock().expect("state lock poisoned") == ScanState::Running
    }

    /// The registry of devices observed by this scanner.
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.inner.registry)
    }

    /// Snapshot of all recorded observations.
    pub fn devices(&self) -> Vec<Device> {
        self.inner.registry.snapshot()
    }

    pub fn device_count(&self) -> usize {
        self.inner.registry.count()
    }

    pub fn clear_devices(&self) {
        self.inner.registry.clear();
    }

    /// Register a callback invoked for every recorded device.
    pub fn register_callback(&self, callback: impl Fn(&Device) + Send + Sync + 'static) {
        self.inner.registry.register_callback(callback);
    }

    /// Tear down: stop scanning and wait, bounded, for the restart loop
    /// to acknowledge. Proceeds after [`SHUTDOWN_TIMEOUT`] regardless so
    /// teardown can never hang on a wedged source.
    pub fn shutdown(&self) {
        if self.inner.shutdown_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop();

        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        let mut acknowledged = self.inner.signal.lock().expect("signal lock poisoned");
        while !*acknowledged {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let (guard, timeout) = self
                .inner
                .exit_signal
                .wait_timeout(acknowledged, deadline - now)
                .expect("signal lock poisoned");
            acknowledged = guard;
            if timeout.timed_out() {
                break;
            }
        }
    }
}

impl Drop for AirPodsScanner {
    fn drop(&mut self) {
        // Nothing to wind down after an explicit stop.
        if !self.inner.stop_requested.load(Ordering::SeqCst) {
            self.shutdown();
        }
    }
}

impl Inner {
    fn try_start(&self) -> bool {
        self.stop_requested.store(false, Ordering::SeqCst);
        *self.last_start.lock().expect("start-time lock poisoned") = Instant::now();

        match self.watcher.subscribe() {
            Ok(()) => {
                *self.state.lock().expect("state lock poisoned") = ScanState::Running;
                info!("advertisement watcher start succeeded");
                true
            }
            Err(err) => {
                *self.state.lock().expect("state lock poisoned") = ScanState::Stopped;
                error!("advertisement watcher start failed: {err}");
                false
            }
        }
    }

    /// Pipeline glue: filter by company id, decode, record, notify.
    fn handle_advertisement(&self, advertisement: &Advertisement) {
        let Some(payload) = advertisement.manufacturer_payload(APPLE_COMPANY_ID) else {
            return;
        };

        let device = Device {
            address: advertisement.address,
            rssi: advertisement.rssi,
            manufacturer_data: payload.to_vec(),
            timestamp: advertisement.timestamp,
            telemetry: protocol::decode(payload).ok(),
        };

        match &device.telemetry {
            Some(telemetry) => info!(
                "AirPods detected: {} - {}",
                telemetry.model_name(),
                telemetry.battery_summary()
            ),
            None => debug!("Apple device detected: {}", device.manufacturer_data_hex()),
        }

        self.registry.add(device);
    }

    /// Stopped notification from the source. Runs on whatever thread the
    /// source delivers it from; the restart loop below therefore blocks
    /// that thread, never a thread of ours.
    fn handle_stopped(&self) {
        *self.state.lock().expect("state lock poisoned") = ScanState::Stopped;
        info!("BLE advertisement scan stopped");

        if !self.shutdown_requested.load(Ordering::SeqCst) {
            // Unsolicited halt: retry until an explicit stop arrives or
            // a start attempt succeeds. No attempt cap, no backoff.
            loop {
                if self.stop_requested.load(Ordering::SeqCst) {
                    break;
                }
                self.wait_for_retry_window();
                if self.stop_requested.load(Ordering::SeqCst) {
                    break;
                }
                if self.try_start() {
                    break;
                }
            }
        }

        if self.shutdown_requested.load(Ordering::SeqCst) {
            let mut acknowledged = self.signal.lock().expect("signal lock poisoned");
            *acknowledged = true;
            self.exit_signal.notify_all();
        }
    }

    /// Sleep until one retry interval past the last start attempt,
    /// waking early if an explicit stop arrives. Holds only the signal
    /// lock, never the state lock.
    fn wait_for_retry_window(&self) {
        let deadline =
            *self.last_start.lock().expect("start-time lock poisoned") + self.retry_interval;
        let mut guard = self.signal.lock().expect("signal lock poisoned");
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let (next, timeout) = self
                .stop_signal
                .wait_timeout(guard, deadline - now)
                .expect("signal lock poisoned");
            guard = next;
            if timeout.timed_out() {
                return;
            }
        }
    }
}
