//! BLE advertisement scanning for AirPods devices.
//!
//! This module provides a trait-based abstraction over different
//! Bluetooth scanning backends, plus the scanner lifecycle that filters
//! Apple manufacturer data, decodes telemetry, and records devices.

#[cfg(feature = "bluer")]
pub mod bluer;

#[cfg(feature = "hci")]
pub mod hci;

pub mod lifecycle;

use crate::address::BluetoothAddress;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use thiserror::Error;

/// Error type for scanner operations.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Apple manufacturer ID (little-endian bytes for pattern matching).
///
/// Bluetooth LE advertisements use little-endian byte order for
/// manufacturer IDs. This is the byte representation of 0x004C used for
/// filtering advertisements at the BlueZ monitor level.
#[cfg(feature = "bluer")]
pub const APPLE_COMPANY_ID_BYTES: [u8; 2] = [0x4C, 0x00];

/// Apple manufacturer ID for data lookup.
pub const APPLE_COMPANY_ID: u16 = 0x004C;

/// Bluetooth manufacturer-specific data type (AD type 0xFF)
#[cfg(any(feature = "bluer", feature = "hci"))]
pub const MANUFACTURER_DATA_TYPE: u8 = 0xff;

/// One observed BLE advertisement.
///
/// Transient: constructed by a backend for the duration of one received
/// event and handed to the lifecycle's handler by reference.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Radio address of the broadcaster
    pub address: BluetoothAddress,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Time the advertisement was observed
    pub timestamp: SystemTime,
    /// Manufacturer-specific data keyed by company id
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

impl Advertisement {
    /// Payload bytes for one manufacturer, without the company-id prefix.
    pub fn manufacturer_payload(&self, company_id: u16) -> Option<&[u8]> {
        self.manufacturer_data.get(&company_id).map(Vec::as_slice)
    }
}

/// Handler invoked for every received advertisement.
pub type AdvertisementHandler = Arc<dyn Fn(&Advertisement) + Send + Sync>;

/// Handler invoked whenever scanning halts, whether user-requested or due
/// to a fault. The notification carries no reason code.
pub type StoppedHandler = Arc<dyn Fn() + Send + Sync>;

/// Abstract advertisement source capability.
///
/// Backends own the event-delivery threads; handlers must therefore be
/// safe to call concurrently with consumer-thread operations. Both
/// `subscribe` and `unsubscribe` report failure synchronously.
pub trait AdvertisementWatcher: Send + Sync {
    /// Begin delivering advertisements to the received handler.
    fn subscribe(&self) -> Result<(), ScanError>;

    /// Stop delivering advertisements. The stopped handler still fires,
    /// exactly as it does for an unsolicited halt.
    fn unsubscribe(&self) -> Result<(), ScanError>;

    /// Install the handler for received advertisements.
    fn on_received(&self, handler: AdvertisementHandler);

    /// Install the handler for stopped notifications.
    fn on_stopped(&self, handler: StoppedHandler);
}

/// Shared handler storage for watcher implementations.
///
/// Handlers are cloned out of the lock before invocation, so a handler
/// may call back into the watcher without deadlocking.
#[derive(Default)]
pub(crate) struct Handlers {
    received: Mutex<Option<AdvertisementHandler>>,
    stopped: Mutex<Option<StoppedHandler>>,
}

impl Handlers {
    pub(crate) fn set_received(&self, handler: AdvertisementHandler) {
        *self.received.lock().expect("handler lock poisoned") = Some(handler);
    }

    pub(crate) fn set_stopped(&self, handler: StoppedHandler) {
        *self.stopped.lock().expect("handler lock poisoned") = Some(handler);
    }

    pub(crate) fn notify_received(&self, advertisement: &Advertisement) {
        let handler = self.received.lock().expect("handler lock poisoned").clone();
        if let Some(handler) = handler {
            handler(advertisement);
        }
    }

    pub(crate) fn notify_stopped(&self) {
        let handler = self.stopped.lock().expect("handler lock poisoned").clone();
        if let Some(handler) = handler {
            handler();
        }
    }
}

/// Available scanner backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// BlueZ D-Bus backend (requires bluetoothd daemon)
    #[cfg(feature = "bluer")]
    Bluer,
    /// Raw HCI socket backend (direct kernel access, no daemon required)
    #[cfg(feature = "hci")]
    Hci,
}

impl Default for Backend {
    fn default() -> Self {
        #[cfg(feature = "bluer")]
        return Backend::Bluer;
        #[cfg(all(feature = "hci", not(feature = "bluer")))]
        return Backend::Hci;
        #[cfg(not(any(feature = "bluer", feature = "hci")))]
        compile_error!("At least one backend feature must be enabled");
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "bluer")]
            Backend::Bluer => write!(f, "bluer"),
            #[cfg(feature = "hci")]
            Backend::Hci => write!(f, "hci"),
            #[cfg(not(any(feature = "bluer", feature = "hci")))]
            _ => unreachable!("Backend enum has no variants when no backend features are enabled"),
        }
    }
}

impl std::str::FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            #[cfg(feature = "bluer")]
            "bluer" | "bluez" => Ok(Backend::Bluer),
            #[cfg(feature = "hci")]
            "hci" | "raw" => Ok(Backend::Hci),
            _ => Err(format!("Unknown backend: {}", s)),
        }
    }
}

/// Construct the advertisement watcher for the selected backend.
pub fn create_watcher(backend: Backend) -> Result<Box<dyn AdvertisementWatcher>, ScanError> {
    match backend {
        #[cfg(feature = "bluer")]
        Backend::Bluer => Ok(Box::new(bluer::BluerWatcher::new())),
        #[cfg(feature = "hci")]
        Backend::Hci => Ok(Box::new(hci::HciWatcher::new())),
    }
}
