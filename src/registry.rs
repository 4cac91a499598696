//! Thread-safe registry of observed devices.
//!
//! The registry is an append-only observation history: no deduplication
//! by address, no merging. Consumers read full snapshots; callbacks fire
//! synchronously on every insert.

use crate::device::Device;
use std::sync::{Arc, Mutex};

/// Callback invoked with a copy of every inserted device.
pub type DeviceCallback = Arc<dyn Fn(&Device) + Send + Sync>;

struct Inner {
    devices: Vec<Device>,
    callbacks: Vec<DeviceCallback>,
}

/// Append-only collection of observed devices.
///
/// All state lives behind a single lock. Callbacks are invoked with the
/// lock released, so a callback may call back into the registry without
/// deadlocking.
pub struct DeviceRegistry {
    inner: Mutex<Inner>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                devices: Vec::new(),
                callbacks: Vec::new(),
            }),
        }
    }

    /// Append a device and notify every registered callback, in
    /// registration order, with a reference to the inserted value.
    pub fn add(&self, device: Device) {
        let callbacks = {
            let mut inner = self.inner.lock().expect("registry lock poisoned");
            inner.devices.push(device.clone());
            inner.callbacks.clone()
        };
        for callback in callbacks {
            callback(&device);
        }
    }

    /// Full copy of the current history.
    ///
    /// Taken under the lock, so concurrent inserts never produce torn
    /// reads; the caller owns the returned values outright.
    pub fn snapshot(&self) -> Vec<Device> {
        self.inner.lock().expect("registry lock poisoned").devices.clone()
    }

    /// Number of recorded observations.
    pub fn count(&self) -> usize {
        self.inner.lock().expect("registry lock poisoned").devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Drop all recorded observations. Registered callbacks survive.
    pub fn clear(&self) {
        self.inner.lock().expect("registry lock poisoned").devices.clear();
    }

    /// Register a callback for every future insert. There is no
    /// unregistration; callbacks live as long as the registry.
    pub fn register_callback(&self, callback: impl Fn(&Device) + Send + Sync + 'static) {
        self.inner
            .lock()
            .expect("registry lock poisoned")
            .callbacks
            .push(Arc::new(callback));
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
