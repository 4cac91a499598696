use crate::address::BluetoothAddress;
use crate::device::Device;
use crate::protocol;
use crate::telemetry::AirPodsTelemetry;
use std::time::SystemTime;

/// A stable radio address for unit tests.
pub const TEST_ADDRESS: BluetoothAddress = BluetoothAddress(0xAABB_CCDD_EEFF);

/// Real AirPods Pro 2 capture used across tests.
pub const PRO_2_PAYLOAD: [u8; 8] = [0x07, 0x19, 0x01, 0x14, 0x20, 0x0b, 0x88, 0x8f];

/// Build a `Device` carrying the Pro 2 capture payload and its telemetry.
///
/// Tests can override just the fields they care about.
pub fn device_fixture(address: BluetoothAddress) -> Device {
    Device {
        address,
        rssi: -54,
        manufacturer_data: PRO_2_PAYLOAD.to_vec(),
        timestamp: SystemTime::now(),
        telemetry: Some(telemetry_fixture()),
    }
}

/// Telemetry decoded from the Pro 2 capture payload.
pub fn telemetry_fixture() -> AirPodsTelemetry {
    protocol::decode(&PRO_2_PAYLOAD).expect("fixture payload decodes")
}
