//! Decoded AirPods telemetry data structures.
//!
//! Values decoded from a proximity-pairing advertisement payload. Battery
//! levels are percentages reported by the protocol in steps of ten.

use std::fmt;

/// Battery levels for the three AirPods components, in percent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatteryLevels {
    /// Left earbud battery percentage
    pub left: u8,
    /// Right earbud battery percentage
    pub right: u8,
    /// Charging case battery percentage
    pub case: u8,
}

/// Per-component charging flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChargingState {
    pub left: bool,
    pub right: bool,
    pub case: bool,
}

/// Physical placement of the earbuds and the case lid.
///
/// `both_in_case` is derived: it holds exactly when neither earbud is
/// in-ear. It is never set independently of the in-ear flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceState {
    pub left_in_ear: bool,
    pub right_in_ear: bool,
    pub both_in_case: bool,
    pub lid_open: bool,
}

/// Which earbud transmitted the advertisement.
///
/// The payload does not expose this, so the decoder always reports
/// [`Side::Right`]. Callers must not treat the value as reliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

/// Telemetry decoded from one proximity-pairing advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirPodsTelemetry {
    /// Raw 16-bit model identifier from the payload
    pub model_id: u16,
    /// Battery levels for all components
    pub battery: BatteryLevels,
    /// Charging state for all components
    pub charging: ChargingState,
    /// Earbud and lid placement
    pub state: DeviceState,
    /// Broadcasting earbud indicator (fixed, see [`Side`])
    pub broadcasting_side: Side,
}

impl AirPodsTelemetry {
    /// Human-readable model name resolved from the identifier table.
    ///
    /// Unrecognized identifiers map to `"Unknown AirPods"` rather than an
    /// error, so new models still show up in reports.
    pub fn model_name(&self) -> &'static str {
        match self.model_id {
            0x2014 => "AirPods Pro 2",
            0x200E => "AirPods Pro",
            0x2013 => "AirPods 3",
            0x200F => "AirPods 2",
            _ => "Unknown AirPods",
        }
    }

    /// Model identifier rendered for display, e.g. `"0x2014"`.
    pub fn model_id_hex(&self) -> String {
        format!("0x{:04X}", self.model_id)
    }

    /// True if any component is currently charging.
    pub fn any_charging(&self) -> bool {
        self.charging.left || self.charging.right || self.charging.case
    }

    /// True if either earbud is in ear.
    pub fn any_in_ear(&self) -> bool {
        self.state.left_in_ear || self.state.right_in_ear
    }

    /// Lowest battery level across all components.
    pub fn lowest_battery(&self) -> u8 {
        self.battery
            .left
            .min(self.battery.right)
            .min(self.battery.case)
    }

    /// Compact battery summary, e.g. `"L:80% R:80% C:0%"`.
    pub fn battery_summary(&self) -> String {
        format!(
            "L:{}% R:{}% C:{}%",
            self.battery.left, self.battery.right, self.battery.case
        )
    }
}
