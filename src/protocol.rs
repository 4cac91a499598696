//! Decoder for the Apple proximity-pairing advertisement payload.
//!
//! The payload arrives as the manufacturer-specific data of a BLE
//! advertisement, without the company-id prefix. Layout (0-indexed):
//!
//! | offset | content                                      |
//! |--------|----------------------------------------------|
//! | 0      | protocol discriminator, must be `0x07`       |
//! | 1–2    | unused by this decoder                       |
//! | 3      | model id, low byte                           |
//! | 4      | model id, high byte                          |
//! | 5      | status: case battery nibble + charging bits  |
//! | 6      | battery: left/right nibbles                  |
//! | 7      | lid and in-ear flags                         |
//!
//! Decoding is stateless and total: malformed or adversarial input yields
//! an error value, never a panic. This sits on the hot path for untrusted
//! radio data.

use crate::telemetry::{AirPodsTelemetry, BatteryLevels, ChargingState, DeviceState, Side};
use thiserror::Error;

/// Protocol discriminator for proximity-pairing payloads.
pub const PROXIMITY_PAIRING_TYPE: u8 = 0x07;

/// Minimum payload length the decoder accepts.
pub const MIN_PAYLOAD_LENGTH: usize = 8;

/// Error types for payloads the decoder rejects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Payload shorter than the fixed layout requires
    #[error("payload too short: {0} bytes")]
    TooShort(usize),
    /// First byte is not the proximity-pairing discriminator
    #[error("unsupported protocol type: 0x{0:02x}")]
    UnsupportedProtocol(u8),
}

/// Check whether `data` looks like a decodable proximity-pairing payload.
///
/// Constant-time, side-effect-free, and safe on arbitrary input of any
/// length including empty. Callers should check this before [`decode`],
/// though `decode` re-validates on its own.
pub fn can_decode(data: &[u8]) -> bool {
    data.len() >= MIN_PAYLOAD_LENGTH && data[0] == PROXIMITY_PAIRING_TYPE
}

/// Decode a proximity-pairing payload into structured telemetry.
///
/// Battery nibbles are reported in steps of ten percent; values above 10
/// are passed through unclamped (the protocol marks them invalid
/// elsewhere, but the extraction applies no clamp).
pub fn decode(data: &[u8]) -> Result<AirPodsTelemetry, DecodeError> {
    if data.len() < MIN_PAYLOAD_LENGTH {
        return Err(DecodeError::TooShort(data.len()));
    }
    if data[0] != PROXIMITY_PAIRING_TYPE {
        return Err(DecodeError::UnsupportedProtocol(data[0]));
    }

    // Low byte at offset 3, high byte at offset 4.
    let model_id = u16::from(data[4]) << 8 | u16::from(data[3]);

    let status = data[5];
    let battery = data[6];
    let lid = data[7];

    let left_in_ear = (lid & 0x02) != 0;
    let right_in_ear = (lid & 0x01) != 0;

    Ok(AirPodsTelemetry {
        model_id,
        battery: BatteryLevels {
            left: ((battery & 0xF0) >> 4) * 10,
            right: (battery & 0x0F) * 10,
            case: ((status & 0xF0) >> 4) * 10,
        },
        charging: ChargingState {
            left: (status & 0x02) != 0,
            right: (status & 0x01) != 0,
            case: (status & 0x04) != 0,
        },
        state: DeviceState {
            left_in_ear,
            right_in_ear,
            both_in_case: !left_in_ear && !right_in_ear,
            lid_open: (lid & 0x04) != 0,
        },
        // The payload does not identify the transmitting bud.
        broadcasting_side: Side::Right,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::PRO_2_PAYLOAD;

    #[test]
    fn test_decode_pro_2_capture() {
        // Real capture: 07 19 01 14 20 0b 88 8f
        let telemetry = decode(&PRO_2_PAYLOAD).unwrap();

        assert_eq!(telemetry.model_name(), "AirPods Pro 2");
        assert_eq!(telemetry.model_id_hex(), "0x2014");
        assert_eq!(telemetry.battery.left, 80);
        assert_eq!(telemetry.battery.right, 80);
        assert_eq!(telemetry.battery.case, 0);
        assert!(telemetry.charging.left);
        assert!(telemetry.charging.right);
        assert!(!telemetry.charging.case);
        assert!(telemetry.state.lid_open);
        assert!(telemetry.state.left_in_ear);
        assert!(telemetry.state.right_in_ear);
        assert!(!telemetry.state.both_in_case);
        assert_eq!(telemetry.broadcasting_side, Side::Right);
    }

    #[test]
    fn test_decode_seventy_percent_battery() {
        let telemetry = decode(&[0x07, 0x19, 0x01, 0x14, 0x20, 0x0b, 0x77, 0x8f]).unwrap();
        assert_eq!(telemetry.battery.left, 70);
        assert_eq!(telemetry.battery.right, 70);
        assert_eq!(telemetry.battery.case, 0);
    }

    #[test]
    fn test_rejects_wrong_discriminator() {
        let data = [0x08, 0x19, 0x01, 0x14, 0x20, 0x03, 0x00, 0x80];
        assert!(!can_decode(&data));
        assert_eq!(decode(&data), Err(DecodeError::UnsupportedProtocol(0x08)));
    }

    #[test]
    fn test_rejects_short_payloads() {
        let data = [0x07, 0x01, 0x00];
        assert!(!can_decode(&data));
        assert_eq!(decode(&data), Err(DecodeError::TooShort(3)));

        for len in 0..MIN_PAYLOAD_LENGTH {
            let data = vec![PROXIMITY_PAIRING_TYPE; len];
            assert!(!can_decode(&data), "length {len} should not decode");
            assert!(decode(&data).is_err());
        }
    }

    #[test]
    fn test_can_decode_empty() {
        assert!(!can_decode(&[]));
    }

    #[test]
    fn test_both_in_case_derived_from_in_ear_flags() {
        for lid in 0x00..=0xFFu8 {
            let data = [0x07, 0x19, 0x01, 0x14, 0x20, 0x0b, 0x88, lid];
            let telemetry = decode(&data).unwrap();
            assert_eq!(
                telemetry.state.both_in_case,
                !(telemetry.state.left_in_ear || telemetry.state.right_in_ear)
            );
        }
    }

    #[test]
    fn test_battery_nibble_scaling() {
        for nibble in 0..=10u8 {
            let data = [0x07, 0x19, 0x01, 0x14, 0x20, 0x0b, nibble << 4 | nibble, 0x00];
            let telemetry = decode(&data).unwrap();
            assert_eq!(telemetry.battery.left, nibble * 10);
            assert_eq!(telemetry.battery.right, nibble * 10);
        }
    }

    #[test]
    fn test_battery_nibble_above_ten_unclamped() {
        // Nibbles 11-15 are invalid per the protocol but the extraction
        // applies no clamp; document the pass-through behavior.
        let data = [0x07, 0x19, 0x01, 0x14, 0x20, 0xF0, 0xFF, 0x00];
        let telemetry = decode(&data).unwrap();
        assert_eq!(telemetry.battery.left, 150);
        assert_eq!(telemetry.battery.right, 150);
        assert_eq!(telemetry.battery.case, 150);
    }

    #[test]
    fn test_unknown_model_decodes() {
        let data = [0x07, 0x19, 0x01, 0xFF, 0xFF, 0x0b, 0x88, 0x8f];
        let telemetry = decode(&data).unwrap();
        assert_eq!(telemetry.model_id, 0xFFFF);
        assert_eq!(telemetry.model_name(), "Unknown AirPods");
    }

    #[test]
    fn test_decode_arbitrary_garbage_never_panics() {
        for seed in 0..=0xFFu8 {
            let data: Vec<u8> = (0..16).map(|i| seed.wrapping_mul(31).wrapping_add(i)).collect();
            let _ = decode(&data);
            let _ = can_decode(&data);
        }
    }
}
