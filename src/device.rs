//! Observed BLE device records.

use crate::address::BluetoothAddress;
use crate::telemetry::AirPodsTelemetry;
use std::fmt::Write as _;
use std::time::{Duration, SystemTime};

/// A Bluetooth device observed during scanning.
///
/// One record is created for every qualifying advertisement; the registry
/// keeps them as an append-only history, so repeated broadcasts from the
/// same address produce repeated entries.
#[derive(Debug, Clone)]
pub struct Device {
    /// Radio address of the broadcaster
    pub address: BluetoothAddress,
    /// Received signal strength in dBm
    pub rssi: i16,
    /// Raw manufacturer-specific payload from the advertisement
    pub manufacturer_data: Vec<u8>,
    /// Timestamp when the advertisement was observed
    pub timestamp: SystemTime,
    /// Decoded telemetry, if the payload carried a decodable format
    pub telemetry: Option<AirPodsTelemetry>,
}

impl Device {
    /// True if the payload decoded to AirPods telemetry.
    pub fn has_telemetry(&self) -> bool {
        self.telemetry.is_some()
    }

    /// Manufacturer payload as a lowercase hex string.
    pub fn manufacturer_data_hex(&self) -> String {
        let mut hex = String::with_capacity(self.manufacturer_data.len() * 2);
        for byte in &self.manufacturer_data {
            let _ = write!(hex, "{byte:02x}");
        }
        hex
    }

    /// Time elapsed since this record was observed.
    pub fn age(&self) -> Duration {
        self.timestamp.elapsed().unwrap_or_default()
    }
}

/// Devices are equal iff their addresses match; signal strength and
/// timestamp are excluded from identity.
impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Device {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_ADDRESS, device_fixture};

    #[test]
    fn test_equality_by_address_only() {
        let a = device_fixture(TEST_ADDRESS);
        let mut b = device_fixture(TEST_ADDRESS);
        b.rssi = -90;
        b.timestamp = SystemTime::UNIX_EPOCH;
        assert_eq!(a, b);

        let c = device_fixture(BluetoothAddress(0x1));
        assert_ne!(a, c);
    }

    #[test]
    fn test_manufacturer_data_hex() {
        let mut device = device_fixture(TEST_ADDRESS);
        device.manufacturer_data = vec![0x07, 0x19, 0x01, 0x14, 0x20, 0x0b, 0x88, 0x8f];
        assert_eq!(device.manufacturer_data_hex(), "07190114200b888f");
    }

    #[test]
    fn test_manufacturer_data_hex_empty() {
        let mut device = device_fixture(TEST_ADDRESS);
        device.manufacturer_data = vec![];
        assert_eq!(device.manufacturer_data_hex(), "");
    }

    #[test]
    fn test_age_is_non_negative() {
        let device = device_fixture(TEST_ADDRESS);
        // elapsed() can fail for future timestamps; age() maps that to zero
        assert!(device.age() >= Duration::ZERO);
    }
}
