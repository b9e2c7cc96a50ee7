//! Active WiFi scan (§4.4 `scan_start`).
//!
//! Grounded on the reference firmware's `parse_wifi_frame`/`WiFiEvent`
//! shape (`scanner.rs`), generalized from "one parsed frame" to "drive a
//! whole scan and cap the batch", since the reference firmware never
//! performs an active scan of its own (it only sniffs).

use heapless::Vec;

use crate::diag::Diagnostics;
use crate::protocol::{AuthMode, WifiNetwork, MAX_SCAN_RESULTS};
use crate::serial::sanitize_ssid;

/// One network reported by the radio driver's active-scan primitive.
#[derive(Debug, Clone)]
pub struct RawScanEntry {
    pub ssid: Vec<u8, 32>,
    pub bssid: [u8; 6],
    pub rssi: i8,
    pub channel: u8,
    pub auth: AuthMode,
}

/// Capability the platform layer implements over the concrete radio driver.
/// `scan_next` is polled until it returns `None`, matching "synchronously
/// drives an active scan... collects up to MAX_SCAN_RESULTS... and returns".
pub trait WifiRadio {
    fn scan_next(&mut self) -> Option<RawScanEntry>;
}

/// Result of one `SCAN_WIFI` invocation: the capped batch plus whether
/// truncation occurred (§8: "Scan discovers 65 networks -> exactly 64
/// appear... a diagnostic notes truncation").
pub struct ScanBatch {
    pub networks: Vec<WifiNetwork, MAX_SCAN_RESULTS>,
    pub truncated: bool,
}

pub fn scan_start<R: WifiRadio>(radio: &mut R, diag: &Diagnostics) -> ScanBatch {
    let mut networks = Vec::new();
    let mut truncated = false;

    while let Some(entry) = radio.scan_next() {
        if networks.is_full() {
            truncated = true;
            continue;
        }
        let ssid = sanitize_ssid(&entry.ssid);
        let mut bssid = crate::protocol::MacString::new();
        crate::protocol::format_mac(&entry.bssid, &mut bssid);
        let _ = networks.push(WifiNetwork {
            ssid,
            bssid,
            rssi: entry.rssi,
            channel: entry.channel,
            encryption: entry.auth,
        });
    }

    if truncated {
        diag.note_batch_truncated();
    }

    ScanBatch {
        networks,
        truncated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeRadio {
        entries: Vec<RawScanEntry, 80>,
        idx: usize,
    }

    impl WifiRadio for FakeRadio {
        fn scan_next(&mut self) -> Option<RawScanEntry> {
            let e = self.entries.get(self.idx).cloned();
            self.idx += 1;
            e
        }
    }

    fn entry(n: u8) -> RawScanEntry {
        RawScanEntry {
            ssid: Vec::new(),
            bssid: [n; 6],
            rssi: -50,
            channel: 6,
            auth: AuthMode::Wpa2Psk,
        }
    }

    #[test]
    fn caps_at_max_scan_results_and_flags_truncation() {
        let mut entries = Vec::new();
        for i in 0..80u8 {
            let _ = entries.push(entry(i));
        }
        let mut radio = FakeRadio { entries, idx: 0 };
        let diag = Diagnostics::new();
        let batch = scan_start(&mut radio, &diag);
        assert_eq!(batch.networks.len(), MAX_SCAN_RESULTS);
        assert!(batch.truncated);
        assert_eq!(diag.snapshot().1, 1);
    }

    #[test]
    fn under_cap_is_not_truncated() {
        let mut entries = Vec::new();
        for i in 0..10u8 {
            let _ = entries.push(entry(i));
        }
        let mut radio = FakeRadio { entries, idx: 0 };
        let diag = Diagnostics::new();
        let batch = scan_start(&mut radio, &diag);
        assert_eq!(batch.networks.len(), 10);
        assert!(!batch.truncated);
        assert_eq!(diag.snapshot().1, 0);
    }

    #[test]
    fn hidden_ssid_reports_empty_string_with_bssid_intact() {
        let mut entries = Vec::new();
        let _ = entries.push(entry(1));
        let mut radio = FakeRadio { entries, idx: 0 };
        let diag = Diagnostics::new();
        let batch = scan_start(&mut radio, &diag);
        assert_eq!(batch.networks[0].ssid.as_str(), "");
        assert_eq!(batch.networks[0].bssid.as_str(), "01:01:01:01:01:01");
    }
}
