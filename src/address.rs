//! Compact Bluetooth device address type.
//!
//! This module provides a 64-bit radio address representation that is
//! decoupled from any specific Bluetooth library. Advertisement watchers
//! report addresses as raw integers; for display the address is rendered
//! as a fixed-width 12-digit hex string.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

/// A Bluetooth radio address stored as a raw 64-bit integer.
///
/// Only the low 48 bits carry the public address; the value is kept as
/// delivered by the radio stack. Display renders the canonical
/// zero-padded 12-digit lowercase hex form used as the device id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BluetoothAddress(pub u64);

impl fmt::Display for BluetoothAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:012x}", self.0)
    }
}

/// Errors returned when parsing a Bluetooth address string.
#[derive(Error, Debug, PartialEq)]
pub enum ParseAddressError {
    #[error("invalid address: expected 12 hex digits, got {0}")]
    InvalidLength(usize),
    #[error("invalid address: '{0}' is not valid hex")]
    InvalidHex(String),
}

impl FromStr for BluetoothAddress {
    type Err = ParseAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the colon-separated form too, so addresses copied from
        // other Bluetooth tooling parse as-is.
        let hex: String = s.split(':').collect();
        if hex.len() != 12 {
            return Err(ParseAddressError::InvalidLength(hex.len()));
        }
        u64::from_str_radix(&hex, 16)
            .map(BluetoothAddress)
            .map_err(|_| ParseAddressError::InvalidHex(s.to_string()))
    }
}

impl From<u64> for BluetoothAddress {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<BluetoothAddress> for u64 {
    fn from(address: BluetoothAddress) -> Self {
        address.0
    }
}

#[cfg(feature = "bluer")]
impl From<bluer::Address> for BluetoothAddress {
    fn from(addr: bluer::Address) -> Self {
        let mut raw = 0u64;
        for byte in addr.0 {
            raw = (raw << 8) | u64::from(byte);
        }
        Self(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_fixed_width() {
        let addr = BluetoothAddress(0x0011_2233_4455);
        assert_eq!(format!("{}", addr), "001122334455");
    }

    #[test]
    fn test_display_pads_zeros() {
        let addr = BluetoothAddress(0x1);
        assert_eq!(format!("{}", addr), "000000000001");
    }

    #[test]
    fn test_from_str() {
        let addr: BluetoothAddress = "aabbccddeeff".parse().unwrap();
        assert_eq!(addr.0, 0xAABB_CCDD_EEFF);
    }

    #[test]
    fn test_from_str_colon_separated() {
        let addr: BluetoothAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(addr.0, 0xAABB_CCDD_EEFF);
    }

    #[test]
    fn test_from_str_invalid() {
        assert!(matches!(
            "aabb".parse::<BluetoothAddress>(),
            Err(ParseAddressError::InvalidLength(4))
        ));
        assert!(matches!(
            "gghhiijjkkll".parse::<BluetoothAddress>(),
            Err(ParseAddressError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_roundtrip_u64() {
        let addr = BluetoothAddress::from(0xAABB_CCDD_EEFFu64);
        assert_eq!(u64::from(addr), 0xAABB_CCDD_EEFF);
    }

    #[cfg(feature = "bluer")]
    #[test]
    fn test_from_bluer_address() {
        let addr: BluetoothAddress = bluer::Address([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]).into();
        assert_eq!(addr.0, 0xAABB_CCDD_EEFF);
    }

    #[test]
    fn test_hash_equality() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(BluetoothAddress(42), "test");
        assert_eq!(map.get(&BluetoothAddress(42)), Some(&"test"));
    }
}
