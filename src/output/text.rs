//! Human-readable scan report formatter.

use crate::device::Device;
use crate::output::ReportFormatter;
use crate::telemetry::AirPodsTelemetry;
use std::fmt::Write as _;
use std::time::SystemTime;

/// Text report formatter: one summary line per observation.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFormatter;

impl TextFormatter {
    pub fn new() -> Self {
        Self
    }
}

/// Render a left/right/case flag triple like `"L+R"` or `"none"`.
fn flag_set(left: bool, right: bool, case: Option<bool>) -> String {
    let mut parts = Vec::new();
    if left {
        parts.push("L");
    }
    if right {
        parts.push("R");
    }
    if case == Some(true) {
        parts.push("C");
    }
    if parts.is_empty() {
        "none".to_string()
    } else {
        parts.join("+")
    }
}

fn telemetry_line(telemetry: &AirPodsTelemetry) -> String {
    let mut line = format!(
        "{} {}  {}",
        telemetry.model_name(),
        telemetry.model_id_hex(),
        telemetry.battery_summary()
    );

    if telemetry.any_charging() {
        let _ = write!(
            line,
            "  charging:{}",
            flag_set(
                telemetry.charging.left,
                telemetry.charging.right,
                Some(telemetry.charging.case)
            )
        );
    }
    if telemetry.any_in_ear() {
        let _ = write!(
            line,
            "  in-ear:{}",
            flag_set(telemetry.state.left_in_ear, telemetry.state.right_in_ear, None)
        );
    } else if telemetry.state.both_in_case {
        line.push_str("  in case");
    }
    if telemetry.state.lid_open {
        line.push_str("  lid open");
    }

    line
}

fn device_line(device: &Device) -> String {
    let summary = match &device.telemetry {
        Some(telemetry) => telemetry_line(telemetry),
        None => format!("Apple device {}", device.manufacturer_data_hex()),
    };
    format!("{summary}  [{} {} dBm]", device.address, device.rssi)
}

impl ReportFormatter for TextFormatter {
    fn format(&self, devices: &[Device], _scanned_at: SystemTime) -> String {
        let airpods_count = devices.iter().filter(|d| d.has_telemetry()).count();
        let mut report = format!(
            "{} device(s) observed, {} with AirPods telemetry",
            devices.len(),
            airpods_count
        );

        for device in devices {
            let _ = write!(report, "\n{}", device_line(device));
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_ADDRESS, device_fixture};

    #[test]
    fn test_empty_report() {
        let formatter = TextFormatter::new();
        let report = formatter.format(&[], SystemTime::now());
        assert_eq!(report, "0 device(s) observed, 0 with AirPods telemetry");
    }

    #[test]
    fn test_device_with_telemetry() {
        let formatter = TextFormatter::new();
        let device = device_fixture(TEST_ADDRESS);

        let report = formatter.format(std::slice::from_ref(&device), SystemTime::now());
        assert!(report.starts_with("1 device(s) observed, 1 with AirPods telemetry\n"));
        assert!(report.contains("AirPods Pro 2 0x2014  L:80% R:80% C:0%"));
        assert!(report.contains("charging:L+R"));
        assert!(report.contains("in-ear:L+R"));
        assert!(report.contains("lid open"));
        assert!(report.contains("[aabbccddeeff -54 dBm]"));
    }

    #[test]
    fn test_device_without_telemetry() {
        let formatter = TextFormatter::new();
        let mut device = device_fixture(TEST_ADDRESS);
        device.telemetry = None;
        device.manufacturer_data = vec![0x10, 0x05, 0x0B];

        let report = formatter.format(std::slice::from_ref(&device), SystemTime::now());
        assert!(report.contains("Apple device 10050b"));
        assert!(!report.contains("charging"));
    }

    #[test]
    fn test_both_in_case_rendering() {
        let formatter = TextFormatter::new();
        let mut device = device_fixture(TEST_ADDRESS);
        let telemetry = device.telemetry.as_mut().unwrap();
        telemetry.state.left_in_ear = false;
        telemetry.state.right_in_ear = false;
        telemetry.state.both_in_case = true;

        let report = formatter.format(std::slice::from_ref(&device), SystemTime::now());
        assert!(report.contains("in case"));
        assert!(!report.contains("in-ear:"));
    }

    #[test]
    fn test_flag_set_rendering() {
        assert_eq!(flag_set(true, true, Some(true)), "L+R+C");
        assert_eq!(flag_set(true, false, None), "L");
        assert_eq!(flag_set(false, false, Some(false)), "none");
    }
}
