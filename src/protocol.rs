//! Egress JSON message schema shared by every engine.
//!
//! All messages are newline-delimited JSON (NDJSON), one object per line,
//! with a required `type` tag (§6). Every message, including the
//! `wifi_scan_result`/`ble_scan_result` batches, serializes into a
//! fixed-size stack buffer via `serde_json_core` — batches are already
//! capped at [`MAX_SCAN_RESULTS`]/[`MAX_BLE_RESULTS`], so a `MAX_BATCH_LEN`
//! stack buffer covers the worst case without reaching for the allocator
//! §9 reserves for batch emission.

use heapless::{String, Vec};
use serde::Serialize;

/// MAC address string, "AA:BB:CC:DD:EE:FF".
pub type MacString = String<18>;

/// SSID / BLE name string (max 32 bytes of content + nul headroom).
pub type NameString = String<33>;

/// Firmware version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum size of a single-record serialized JSON message.
///
/// Sized for the largest non-batch record, `wifi_handshake`: a 256-byte
/// EAPOL frame hex-encodes to 512 characters, plus anonce/snonce/mic/replay
/// counter hex and field overhead.
pub const MAX_MSG_LEN: usize = 1024;

/// Buffer type for a serialized single-record JSON message.
pub type MsgBuffer = Vec<u8, MAX_MSG_LEN>;

/// Maximum size of a serialized batch message (scan results).
pub const MAX_BATCH_LEN: usize = 12 * 1024;

/// Maximum WiFi networks reported in one `wifi_scan_result` batch.
pub const MAX_SCAN_RESULTS: usize = 64;

/// Maximum BLE devices reported in one `ble_scan_result` batch.
pub const MAX_BLE_RESULTS: usize = 64;

/// 802.11 authentication mode, reported as the `encryption` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    Open,
    Wep,
    Wpa,
    #[serde(rename = "wpa2_psk")]
    Wpa2Psk,
    #[serde(rename = "wpa2_ent")]
    Wpa2Ent,
    Wpa3,
}

/// A single WiFi network discovered by an active scan.
#[derive(Debug, Clone, Serialize)]
pub struct WifiNetwork {
    pub ssid: NameString,
    pub bssid: MacString,
    pub rssi: i8,
    pub channel: u8,
    pub encryption: AuthMode,
}

/// A single BLE device discovered by a scan.
#[derive(Debug, Clone, Serialize)]
pub struct BleDeviceRecord {
    pub name: NameString,
    pub address: MacString,
    pub rssi: i8,
}

/// Egress messages, one `DeviceMessage` per emitted line.
///
/// `'a` borrows batch payloads so the batch path can serialize directly out
/// of whatever `heapless::Vec`/array the caller already built, without a
/// second copy.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum DeviceMessage<'a> {
    #[serde(rename = "status")]
    Status { data: &'a str },

    #[serde(rename = "error")]
    Error { data: &'a str },

    #[serde(rename = "sys_info")]
    SysInfo {
        chip: &'static str,
        version: &'static str,
        free_heap: u32,
        total_heap: u32,
        psram: u32,
        nfc: bool,
        cc1101: bool,
        lines_dropped: u32,
        batches_truncated: u32,
        ingress_overflows: u32,
    },

    #[serde(rename = "sys_status")]
    SysStatus { heap: u32, min_heap: u32, rssi: i8 },

    #[serde(rename = "wifi_scan_result")]
    WifiScanResult {
        count: usize,
        networks: &'a [WifiNetwork],
    },

    #[serde(rename = "ble_scan_result")]
    BleScanResult {
        count: usize,
        devices: &'a [BleDeviceRecord],
    },

    #[serde(rename = "recon")]
    Recon {
        ssid: &'a NameString,
        bssid: &'a MacString,
        rssi: i8,
        channel: u8,
    },

    #[serde(rename = "client_probe")]
    ClientProbe {
        mac: &'a MacString,
        ssid: &'a NameString,
        rssi: i8,
    },

    #[serde(rename = "pulse")]
    Pulse { val: u8, ch: u8 },

    #[serde(rename = "sniff_stats")]
    SniffStats {
        count: u32,
        m1: u32,
        m2: u32,
        complete: u32,
    },

    #[serde(rename = "wifi_handshake")]
    WifiHandshake {
        bssid: &'a MacString,
        sta_mac: &'a MacString,
        ch: u8,
        rssi: i8,
        anonce: &'a str,
        snonce: &'a str,
        mic: &'a str,
        replay_counter: &'a str,
        key_desc_type: u8,
        key_desc_version: u8,
        eapol_frame: &'a str,
        eapol_len: usize,
        timestamp: u32,
    },

    #[serde(rename = "deauth_result")]
    DeauthResult { success: bool, channel: u8 },

    #[serde(rename = "analyzer_data")]
    AnalyzerData { rssi: i8 },

    #[serde(rename = "brute_progress")]
    BruteProgress { current: u16, total: u16 },

    #[serde(rename = "csi_heartbeat")]
    CsiHeartbeat { count: u32 },
}

/// Serialize a message into a caller-provided buffer and append the NDJSON
/// newline. Returns the total length written, or `None` on overflow.
pub fn serialize_message(msg: &DeviceMessage, buf: &mut [u8]) -> Option<usize> {
    let len = serde_json_core::to_slice(msg, buf).ok()?;
    if len < buf.len() {
        buf[len] = b'\n';
        Some(len + 1)
    } else {
        None
    }
}

/// Hex-encode `data` uppercase, no separators, into `out`. Truncates rather
/// than overrunning `out`; returns the number of source bytes actually
/// encoded so callers can report a truncated length honestly.
pub fn hex_encode_uppercase<'a>(data: &[u8], out: &'a mut [u8]) -> &'a str {
    const DIGITS: &[u8; 16] = b"0123456789ABCDEF";
    let max_bytes = out.len() / 2;
    let n = data.len().min(max_bytes);
    for (i, &b) in data[..n].iter().enumerate() {
        out[i * 2] = DIGITS[(b >> 4) as usize];
        out[i * 2 + 1] = DIGITS[(b & 0x0F) as usize];
    }
    core::str::from_utf8(&out[..n * 2]).unwrap_or("")
}

/// Format a 6-byte MAC address as "AA:BB:CC:DD:EE:FF".
pub fn format_mac(mac: &[u8; 6], buf: &mut MacString) {
    use core::fmt::Write;
    buf.clear();
    let _ = write!(
        buf,
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    );
}

/// Map an RSSI in dBm to a 0..100 scale over the closed interval
/// `[-95, -30]`, clamping outside that range.
///
/// See DESIGN.md for why the reference firmware's unexplained `1.54`
/// constant is not reproduced here.
pub fn pulse_percent(rssi: i8) -> u8 {
    const LOW: i32 = -95;
    const HIGH: i32 = -30;
    let clamped = (rssi as i32).clamp(LOW, HIGH);
    (((clamped - LOW) * 100) / (HIGH - LOW)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_status_is_ndjson() {
        let msg = DeviceMessage::Status { data: "started" };
        let mut buf = [0u8; 128];
        let len = serialize_message(&msg, &mut buf).unwrap();
        assert_eq!(buf[len - 1], b'\n');
        let json = core::str::from_utf8(&buf[..len - 1]).unwrap();
        assert!(json.starts_with('{'));
        assert!(json.contains("\"type\":\"status\""));
        assert!(json.ends_with('}'));
    }

    #[test]
    fn serialize_error_contains_data() {
        let msg = DeviceMessage::Error {
            data: "Unknown command",
        };
        let mut buf = [0u8; 128];
        let len = serialize_message(&msg, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len - 1]).unwrap();
        assert!(json.contains("Unknown command"));
    }

    #[test]
    fn serialize_overflow_returns_none() {
        let msg = DeviceMessage::Status {
            data: "this message is long enough to not fit",
        };
        let mut buf = [0u8; 4];
        assert!(serialize_message(&msg, &mut buf).is_none());
    }

    #[test]
    fn hex_encode_basic() {
        let mut out = [0u8; 8];
        let s = hex_encode_uppercase(&[0xDE, 0xAD], &mut out);
        assert_eq!(s, "DEAD");
    }

    #[test]
    fn hex_encode_truncates_to_output_capacity() {
        let mut out = [0u8; 2];
        let s = hex_encode_uppercase(&[0xAA, 0xBB, 0xCC], &mut out);
        assert_eq!(s, "AA");
    }

    #[test]
    fn format_mac_uppercase_colon_separated() {
        let mac = [0xaa, 0xbb, 0xcc, 0x01, 0x02, 0x03];
        let mut s = MacString::new();
        format_mac(&mac, &mut s);
        assert_eq!(s.as_str(), "AA:BB:CC:01:02:03");
    }

    #[test]
    fn pulse_percent_bounds() {
        assert_eq!(pulse_percent(-95), 0);
        assert_eq!(pulse_percent(-30), 100);
        assert_eq!(pulse_percent(-120), 0);
        assert_eq!(pulse_percent(0), 100);
    }

    #[test]
    fn pulse_percent_midpoint() {
        // -62.5 dBm is the exact midpoint; integer math rounds down.
        let v = pulse_percent(-63);
        assert!(v == 49 || v == 50);
    }

    #[test]
    fn wifi_scan_result_batch_shape() {
        let networks = [WifiNetwork {
            ssid: NameString::try_from("Test").unwrap(),
            bssid: MacString::try_from("AA:BB:CC:DD:EE:FF").unwrap(),
            rssi: -50,
            channel: 6,
            encryption: AuthMode::Wpa2Psk,
        }];
        let msg = DeviceMessage::WifiScanResult {
            count: networks.len(),
            networks: &networks,
        };
        let mut buf = [0u8; 512];
        let len = serialize_message(&msg, &mut buf).unwrap();
        let json = core::str::from_utf8(&buf[..len - 1]).unwrap();
        assert!(json.contains("\"type\":\"wifi_scan_result\""));
        assert!(json.contains("\"wpa2_psk\""));
    }
}
