//! JSON scan report formatter.
//!
//! Produces the machine-readable report: scan metadata plus one entry
//! per observation, with the decoded telemetry nested or `null` when
//! the payload did not decode.

use crate::device::Device;
use crate::output::ReportFormatter;
use serde_json::{Value, json};
use std::time::SystemTime;

/// JSON report formatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

fn telemetry_json(device: &Device) -> Value {
    match &device.telemetry {
        Some(telemetry) => json!({
            "model": telemetry.model_name(),
            "model_id": telemetry.model_id_hex(),
            "left_battery": telemetry.battery.left,
            "right_battery": telemetry.battery.right,
            "case_battery": telemetry.battery.case,
            "left_charging": telemetry.charging.left,
            "right_charging": telemetry.charging.right,
            "case_charging": telemetry.charging.case,
            "left_in_ear": telemetry.state.left_in_ear,
            "right_in_ear": telemetry.state.right_in_ear,
            "both_in_case": telemetry.state.both_in_case,
            "lid_open": telemetry.state.lid_open,
            "broadcasting_ear": telemetry.broadcasting_side.to_string(),
        }),
        None => Value::Null,
    }
}

fn device_json(device: &Device) -> Value {
    json!({
        "device_id": device.address.to_string(),
        "address": device.address.0,
        "rssi": device.rssi,
        "manufacturer_data_hex": device.manufacturer_data_hex(),
        "airpods_data": telemetry_json(device),
    })
}

impl ReportFormatter for JsonFormatter {
    fn format(&self, devices: &[Device], scanned_at: SystemTime) -> String {
        let scan_timestamp = scanned_at
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let airpods_count = devices.iter().filter(|d| d.has_telemetry()).count();

        let report = json!({
            "scan_timestamp": scan_timestamp,
            "total_devices": devices.len(),
            "airpods_count": airpods_count,
            "devices": devices.iter().map(device_json).collect::<Vec<_>>(),
        });

        serde_json::to_string_pretty(&report).expect("JSON value serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_ADDRESS, device_fixture};
    use std::time::Duration;

    fn parse(report: &str) -> Value {
        serde_json::from_str(report).expect("report parses as JSON")
    }

    #[test]
    fn test_empty_report() {
        let formatter = JsonFormatter::new();
        let scanned_at = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);

        let report = parse(&formatter.format(&[], scanned_at));
        assert_eq!(report["scan_timestamp"], 1_700_000_000u64);
        assert_eq!(report["total_devices"], 0);
        assert_eq!(report["airpods_count"], 0);
        assert_eq!(report["devices"], json!([]));
    }

    #[test]
    fn test_device_with_telemetry() {
        let formatter = JsonFormatter::new();
        let device = device_fixture(TEST_ADDRESS);

        let report = parse(&formatter.format(std::slice::from_ref(&device), SystemTime::now()));
        assert_eq!(report["total_devices"], 1);
        assert_eq!(report["airpods_count"], 1);

        let entry = &report["devices"][0];
        assert_eq!(entry["device_id"], "aabbccddeeff");
        assert_eq!(entry["rssi"], -54);
        assert_eq!(entry["manufacturer_data_hex"], "07190114200b888f");

        let airpods = &entry["airpods_data"];
        assert_eq!(airpods["model"], "AirPods Pro 2");
        assert_eq!(airpods["model_id"], "0x2014");
        assert_eq!(airpods["left_battery"], 80);
        assert_eq!(airpods["right_battery"], 80);
        assert_eq!(airpods["case_battery"], 0);
        assert_eq!(airpods["left_charging"], true);
        assert_eq!(airpods["case_charging"], false);
        assert_eq!(airpods["both_in_case"], false);
        assert_eq!(airpods["lid_open"], true);
        assert_eq!(airpods["broadcasting_ear"], "right");
    }

    #[test]
    fn test_device_without_telemetry_is_null() {
        let formatter = JsonFormatter::new();
        let mut device = device_fixture(TEST_ADDRESS);
        device.telemetry = None;
        device.manufacturer_data = vec![0x10, 0x05];

        let report = parse(&formatter.format(std::slice::from_ref(&device), SystemTime::now()));
        assert_eq!(report["total_devices"], 1);
        assert_eq!(report["airpods_count"], 0);
        assert_eq!(report["devices"][0]["airpods_data"], Value::Null);
        assert_eq!(report["devices"][0]["manufacturer_data_hex"], "1005");
    }
}
