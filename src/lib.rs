//! `airpods-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging
//! setup and process exit codes. The core “business logic” lives in
//! [`crate::app`] and [`crate::scanner`] where it can be tested
//! deterministically with injected watchers + injected output streams.

pub mod address;
pub mod app;
pub mod device;
pub mod output;
pub mod protocol;
pub mod registry;
pub mod telemetry;

pub mod scanner;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use address::BluetoothAddress;
pub use device::Device;
pub use output::{ReportFormat, ReportFormatter};
pub use protocol::{DecodeError, can_decode, decode};
pub use registry::DeviceRegistry;
pub use scanner::lifecycle::AirPodsScanner;
pub use scanner::{Advertisement, AdvertisementWatcher, Backend, ScanError};
pub use telemetry::AirPodsTelemetry;
