//! Raw HCI socket backend for the advertisement watcher.
//!
//! This backend scans for BLE advertisements over a raw Linux HCI socket
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.
//!
//! A poll-driven reader thread parses advertising reports into
//! [`Advertisement`] events; `unsubscribe` disables scanning and stops
//! the thread cooperatively.

use super::{
    Advertisement, AdvertisementHandler, AdvertisementWatcher, Handlers, MANUFACTURER_DATA_TYPE,
    ScanError, StoppedHandler,
};
use crate::address::BluetoothAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use log::warn;
use std::collections::HashMap;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

// HCI protocol constants
const BTPROTO_HCI: c_int = 1;
const HCI_FILTER: c_int = 2;

// HCI packet types
const HCI_EVENT_PKT: u8 = 0x04;

// HCI events
const EVT_LE_META_EVENT: u8 = 0x3E;

// LE Meta event sub-events
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

// HCI commands
const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

// Scan types
const LE_SCAN_PASSIVE: u8 = 0x00;

// Own address type
const LE_PUBLIC_ADDRESS: u8 = 0x00;

// Filter policy
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

/// Reader wake-up period for checking the shutdown flag.
const POLL_INTERVAL_MS: c_int = 200;

/// HCI socket address structure
#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// HCI filter structure for raw sockets
#[repr(C)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn new() -> Self {
        Self {
            type_mask: 0,
            event_mask: [0, 0],
            opcode: 0,
        }
    }

    fn set_ptype(&mut self, ptype: u8) {
        self.type_mask |= 1 << (ptype as u32);
    }

    fn set_event(&mut self, event: u8) {
        let bit = event as usize;
        self.event_mask[bit / 32] |= 1 << (bit % 32);
    }
}

/// LE Set Scan Parameters command
#[repr(C, packed)]
struct LeSetScanParametersCmd {
    scan_type: u8,
    interval: u16,
    window: u16,
    own_address_type: u8,
    filter_policy: u8,
}

/// LE Set Scan Enable command
#[repr(C, packed)]
struct LeSetScanEnableCmd {
    enable: u8,
    filter_dup: u8,
}

/// Create an HCI command packet
fn hci_command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(0x01); // HCI command packet type
    packet.push((opcode & 0xFF) as u8);
    packet.push((opcode >> 8) as u8);
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Open a raw HCI socket
fn open_hci_socket() -> Result<OwnedFd, ScanError> {
    // Raw Bluetooth HCI socket via libc directly since nix doesn't
    // support BTPROTO_HCI. SOCK_NONBLOCK keeps reads from wedging the
    // poll loop.
    let fd = unsafe {
        libc::socket(
            AF_BLUETOOTH,
            SOCK_RAW | SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            BTPROTO_HCI,
        )
    };

    if fd < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to create HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Bind HCI socket to a device
fn bind_hci_socket(fd: &OwnedFd, dev_id: u16) -> Result<(), ScanError> {
    let addr = SockaddrHci {
        hci_family: AF_BLUETOOTH as u16,
        hci_dev: dev_id,
        hci_channel: 0, // HCI_CHANNEL_RAW
    };

    let ret = unsafe {
        libc::bind(
            fd.as_raw_fd(),
            &addr as *const SockaddrHci as *const sockaddr,
            mem::size_of::<SockaddrHci>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to bind HCI socket: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Set HCI socket filter
fn set_hci_filter(fd: &OwnedFd) -> Result<(), ScanError> {
    let mut filter = HciFilter::new();
    filter.set_ptype(HCI_EVENT_PKT);
    filter.set_event(EVT_LE_META_EVENT);

    let ret = unsafe {
        libc::setsockopt(
            fd.as_raw_fd(),
            0, // SOL_HCI
            HCI_FILTER,
            &filter as *const HciFilter as *const c_void,
            mem::size_of::<HciFilter>() as socklen_t,
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to set HCI filter: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Send an HCI command
fn send_hci_command(fd: &OwnedFd, packet: &[u8]) -> Result<(), ScanError> {
    let ret = unsafe {
        libc::write(
            fd.as_raw_fd(),
            packet.as_ptr() as *const c_void,
            packet.len(),
        )
    };

    if ret < 0 {
        return Err(ScanError::Bluetooth(format!(
            "Failed to send HCI command: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

/// Configure and enable passive LE scanning
fn enable_le_scan(fd: &OwnedFd) -> Result<(), ScanError> {
    // Passive scan, 10ms interval, 10ms window
    let params = LeSetScanParametersCmd {
        scan_type: LE_SCAN_PASSIVE,
        interval: 0x0010, // 10ms in 0.625ms units
        window: 0x0010,   // 10ms in 0.625ms units
        own_address_type: LE_PUBLIC_ADDRESS,
        filter_policy: FILTER_POLICY_ACCEPT_ALL,
    };

    let params_bytes = unsafe {
        std::slice::from_raw_parts(
            &params as *const LeSetScanParametersCmd as *const u8,
            mem::size_of::<LeSetScanParametersCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, params_bytes);
    send_hci_command(fd, &packet)?;

    set_le_scan_enabled(fd, true)
}

fn set_le_scan_enabled(fd: &OwnedFd, enabled: bool) -> Result<(), ScanError> {
    let cmd = LeSetScanEnableCmd {
        enable: if enabled { 0x01 } else { 0x00 },
        filter_dup: 0x00, // Don't filter duplicates
    };

    let cmd_bytes = unsafe {
        std::slice::from_raw_parts(
            &cmd as *const LeSetScanEnableCmd as *const u8,
            mem::size_of::<LeSetScanEnableCmd>(),
        )
    };

    let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, cmd_bytes);
    send_hci_command(fd, &packet)
}

/// Parse one LE advertising report into an advertisement event.
///
/// Returns `None` for reports that are truncated or carry no
/// manufacturer data; filtering by company id happens downstream.
fn parse_advertising_report(data: &[u8]) -> Option<Advertisement> {
    // Skip HCI header: packet type + event code + param len + subevent
    let report = data.get(4..)?;

    let num_reports = *report.first()? as usize;
    if num_reports == 0 {
        return None;
    }

    // First report only; the kernel delivers one per packet in practice.
    // Layout: num_reports(1) event_type(1) addr_type(1) addr(6)
    //         data_len(1) data(N) rssi(1)
    if report.len() < 10 {
        return None;
    }

    // Address bytes arrive little-endian
    let mut address = 0u64;
    for (i, byte) in report[3..9].iter().enumerate() {
        address |= u64::from(*byte) << (8 * i);
    }

    let data_len = report[9] as usize;
    if report.len() < 10 + data_len + 1 {
        return None;
    }
    let ad_data = &report[10..10 + data_len];
    let rssi = i16::from(report[10 + data_len] as i8);

    // Walk the AD structures collecting manufacturer-specific entries
    let mut manufacturer_data: HashMap<u16, Vec<u8>> = HashMap::new();
    let mut offset = 0;
    while offset + 2 <= ad_data.len() {
        let len = ad_data[offset] as usize;
        if len == 0 || offset + 1 + len > ad_data.len() {
            break;
        }

        let ad_type = ad_data[offset + 1];
        if ad_type == MANUFACTURER_DATA_TYPE && len >= 3 {
            let company_id = u16::from_le_bytes([ad_data[offset + 2], ad_data[offset + 3]]);
            let payload = ad_data[offset + 4..offset + 1 + len].to_vec();
            manufacturer_data.entry(company_id).or_insert(payload);
        }

        offset += 1 + len;
    }

    if manufacturer_data.is_empty() {
        return None;
    }

    Some(Advertisement {
        address: BluetoothAddress(address),
        rssi,
        timestamp: SystemTime::now(),
        manufacturer_data,
    })
}

/// Advertisement watcher backed by a raw HCI socket.
pub struct HciWatcher {
    handlers: Arc<Handlers>,
    worker: Mutex<Option<Worker>>,
}

struct Worker {
    shutdown: Arc<AtomicBool>,
    silenced: Arc<AtomicBool>,
    /// Command socket, kept so `unsubscribe` can disable scanning
    cmd_fd: OwnedFd,
    thread: std::thread::JoinHandle<()>,
}

impl HciWatcher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Handlers::default()),
            worker: Mutex::new(None),
        }
    }
}

impl Default for HciWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HciWatcher {
    fn drop(&mut self) {
        if let Ok(mut worker) = self.worker.lock()
            && let Some(active) = worker.take()
        {
            active.silenced.store(true, Ordering::SeqCst);
            active.shutdown.store(true, Ordering::SeqCst);
            let _ = set_le_scan_enabled(&active.cmd_fd, false);
        }
    }
}

impl AdvertisementWatcher for HciWatcher {
    fn subscribe(&self) -> Result<(), ScanError> {
        let mut worker = self.worker.lock().expect("worker lock poisoned");

        // Replace any previous subscription without a stopped event.
        if let Some(previous) = worker.take() {
            previous.silenced.store(true, Ordering::SeqCst);
            previous.shutdown.store(true, Ordering::SeqCst);
            if previous.thread.thread().id() != std::thread::current().id() {
                let _ = previous.thread.join();
            }
        }

        // Event socket receives advertising reports; a separate socket
        // issues scan commands.
        let event_fd = open_hci_socket()?;
        bind_hci_socket(&event_fd, 0)?; // hci0
        set_hci_filter(&event_fd)?;

        let cmd_fd = open_hci_socket()?;
        bind_hci_socket(&cmd_fd, 0)?;
        enable_le_scan(&cmd_fd)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let silenced = Arc::new(AtomicBool::new(false));
        let handlers = Arc::clone(&self.handlers);

        let thread = std::thread::Builder::new()
            .name("hci-watcher".into())
            .spawn({
                let shutdown = Arc::clone(&shutdown);
                let silenced = Arc::clone(&silenced);
                move || run_reader(event_fd, handlers, shutdown, silenced)
            })
            .map_err(|err| ScanError::Bluetooth(format!("failed to spawn reader thread: {err}")))?;

        *worker = Some(Worker {
            shutdown,
            silenced,
            cmd_fd,
            thread,
        });
        Ok(())
    }

    fn unsubscribe(&self) -> Result<(), ScanError> {
        let mut worker = self.worker.lock().expect("worker lock poisoned");
        if let Some(active) = worker.take() {
            let disabled = set_le_scan_enabled(&active.cmd_fd, false);
            active.shutdown.store(true, Ordering::SeqCst);
            // The reader thread fires the stopped handler as it exits.
            disabled?;
        }
        Ok(())
    }

    fn on_received(&self, handler: AdvertisementHandler) {
        self.handlers.set_received(handler);
    }

    fn on_stopped(&self, handler: StoppedHandler) {
        self.handlers.set_stopped(handler);
    }
}

fn run_reader(
    fd: OwnedFd,
    handlers: Arc<Handlers>,
    shutdown: Arc<AtomicBool>,
    silenced: Arc<AtomicBool>,
) {
    let mut buf = [0u8; 258]; // Max HCI event size

    while !shutdown.load(Ordering::SeqCst) {
        let mut pollfd = libc::pollfd {
            fd: fd.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };

        let ready = unsafe { libc::poll(&mut pollfd, 1, POLL_INTERVAL_MS) };
        if ready < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            warn!("HCI poll failed: {err}");
            break;
        }
        if ready == 0 {
            continue; // timeout; re-check the shutdown flag
        }

        // Drain all available packets before polling again
        loop {
            let n = unsafe { libc::read(fd.as_raw_fd(), buf.as_mut_ptr() as *mut c_void, buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    break;
                }
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                warn!("HCI read failed: {err}");
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            if n == 0 {
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            let packet = &buf[..n as usize];

            if packet.len() >= 4
                && packet[0] == HCI_EVENT_PKT
                && packet[1] == EVT_LE_META_EVENT
                && packet[3] == EVT_LE_ADVERTISING_REPORT
                && let Some(advertisement) = parse_advertising_report(packet)
            {
                handlers.notify_received(&advertisement);
            }
        }
    }

    if !silenced.load(Ordering::SeqCst) {
        handlers.notify_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::APPLE_COMPANY_ID;

    #[test]
    fn test_hci_filter_setup() {
        let mut filter = HciFilter::new();
        filter.set_ptype(HCI_EVENT_PKT);
        filter.set_event(EVT_LE_META_EVENT);

        // HCI_EVENT_PKT (0x04) sets bit 4 in type_mask
        assert_eq!(filter.type_mask, 1 << HCI_EVENT_PKT);
        // EVT_LE_META_EVENT (0x3E = 62) sets bit 30 in event_mask[1]
        assert_eq!(filter.event_mask[1], 1 << (EVT_LE_META_EVENT % 32));
    }

    #[test]
    fn test_hci_command_packet() {
        let packet = hci_command_packet(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00]);

        assert_eq!(packet[0], 0x01); // Command packet type
        assert_eq!(packet.len(), 6); // Header + 2 params
    }

    /// Build a synthetic LE advertising report carrying one
    /// manufacturer-data AD structure.
    fn advertising_report(address: [u8; 6], company_id: u16, payload: &[u8], rssi: i8) -> Vec<u8> {
        let mut ad = vec![(payload.len() + 3) as u8, MANUFACTURER_DATA_TYPE];
        ad.extend_from_slice(&company_id.to_le_bytes());
        ad.extend_from_slice(payload);

        let mut packet = vec![
            HCI_EVENT_PKT,
            EVT_LE_META_EVENT,
            0x00, // param len (unused by the parser)
            EVT_LE_ADVERTISING_REPORT,
            0x01, // num reports
            0x00, // event type
            0x00, // addr type
        ];
        packet.extend_from_slice(&address);
        packet.push(ad.len() as u8);
        packet.extend_from_slice(&ad);
        packet.push(rssi as u8);
        packet
    }

    #[test]
    fn test_parse_advertising_report() {
        let payload = [0x07, 0x19, 0x01, 0x14, 0x20, 0x0b, 0x88, 0x8f];
        // Address bytes are little-endian on the wire
        let packet = advertising_report(
            [0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA],
            APPLE_COMPANY_ID,
            &payload,
            -54,
        );

        let advertisement = parse_advertising_report(&packet).unwrap();
        assert_eq!(advertisement.address, BluetoothAddress(0xAABB_CCDD_EEFF));
        assert_eq!(advertisement.rssi, -54);
        assert_eq!(
            advertisement.manufacturer_payload(APPLE_COMPANY_ID),
            Some(payload.as_slice())
        );
    }

    #[test]
    fn test_parse_advertising_report_ignores_non_manufacturer_ads() {
        // Flags AD structure only (0x01), no manufacturer data
        let packet = vec![
            HCI_EVENT_PKT,
            EVT_LE_META_EVENT,
            0x00,
            EVT_LE_ADVERTISING_REPORT,
            0x01, // num reports
            0x00,
            0x00,
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, // address
            0x03, // data len
            0x02, 0x01, 0x06, // flags AD
            0xC8, // rssi -56
        ];
        assert!(parse_advertising_report(&packet).is_none());
    }

    #[test]
    fn test_parse_advertising_report_truncated() {
        assert!(parse_advertising_report(&[]).is_none());
        assert!(parse_advertising_report(&[HCI_EVENT_PKT, EVT_LE_META_EVENT]).is_none());

        // Data length claims more bytes than the packet carries
        let mut packet = advertising_report([0; 6], APPLE_COMPANY_ID, &[0x07, 0x19], -60);
        packet.truncate(packet.len() - 4);
        assert!(parse_advertising_report(&packet).is_none());
    }

    #[test]
    fn test_parse_advertising_report_zero_reports() {
        let packet = vec![
            HCI_EVENT_PKT,
            EVT_LE_META_EVENT,
            0x00,
            EVT_LE_ADVERTISING_REPORT,
            0x00, // num reports
        ];
        assert!(parse_advertising_report(&packet).is_none());
    }
}
