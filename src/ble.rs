//! The BLE engine: discovery scan and advertisement-spam (§4.5).
//!
//! Grounded on `main.rs`'s `trouble-host` `Scanner`/`Advertisement`/
//! `EventHandler` wiring and `scanner::BleAdvParser` (kept near-verbatim:
//! it already matches §3's `BleDevice` fields exactly).

use heapless::Vec;

use crate::error::{CoreError, CoreResult};
use crate::protocol::{BleDeviceRecord, MAX_BLE_RESULTS};
use crate::router::BleSpamTag;
use crate::serial::sanitize_ssid;

/// One advertisement report from the controller, before dedup/parsing.
#[derive(Debug, Clone)]
pub struct RawAdvReport {
    pub addr: [u8; 6],
    pub rssi: i8,
    pub ad_data: Vec<u8, 64>,
}

/// Parsed advertisement payload (name + manufacturer ID), mirroring the
/// reference firmware's `BleAdvParser` (kept, `service_uuids_16` dropped —
/// not part of this crate's `BleDevice` schema).
#[derive(Debug, Clone, Default)]
pub struct ParsedAdv {
    pub name: crate::protocol::NameString,
    pub manufacturer_id: u16,
}

/// Walk AD structures (`[len][type][data...]`) extracting local name and
/// manufacturer ID. Stops cleanly on a truncated structure rather than
/// panicking.
pub fn parse_adv_data(addr: &[u8; 6], ad_data: &[u8]) -> ParsedAdv {
    let _ = addr;
    let mut out = ParsedAdv::default();
    let mut pos = 0;
    while pos < ad_data.len() {
        let len = ad_data[pos] as usize;
        if len == 0 || pos + 1 + len > ad_data.len() {
            break;
        }
        let ad_type = ad_data[pos + 1];
        let data = &ad_data[pos + 2..pos + 1 + len];
        match ad_type {
            0x08 | 0x09 => out.name = sanitize_ssid(data),
            0xFF => {
                if data.len() >= 2 {
                    out.manufacturer_id = u16::from_le_bytes([data[0], data[1]]);
                }
            }
            _ => {}
        }
        pos += 1 + len;
    }
    out
}

/// Capability the platform layer implements over the concrete BLE
/// controller/host stack.
pub trait BleController {
    /// `true` once the controller stack is up.
    fn is_initialized(&self) -> bool;
    /// `true` once the host sync callback has fired.
    fn is_synced(&self) -> bool;
    fn start_scan(&mut self);
    fn stop_scan(&mut self);
    /// Poll for the next advertisement; `None` means the scan window ended.
    fn next_report(&mut self) -> Option<RawAdvReport>;
    fn start_advertising(&mut self, payload: &[u8]);
    fn stop_advertising(&mut self);
}

fn require_ready<C: BleController>(radio: &C) -> CoreResult<()> {
    if radio.is_initialized() && radio.is_synced() {
        Ok(())
    } else {
        Err(CoreError::InvalidState)
    }
}

/// Result of one `SCAN_BLE` invocation (§4.5): deduplicated by address,
/// capped at [`MAX_BLE_RESULTS`].
pub struct BleScanBatch {
    pub devices: Vec<BleDeviceRecord, MAX_BLE_RESULTS>,
    pub truncated: bool,
}

pub fn scan_start<C: BleController>(
    radio: &mut C,
    diag: &crate::diag::Diagnostics,
) -> CoreResult<BleScanBatch> {
    require_ready(radio)?;
    radio.start_scan();

    let mut devices: Vec<BleDeviceRecord, MAX_BLE_RESULTS> = Vec::new();
    let mut truncated = false;

    while let Some(report) = radio.next_report() {
        if devices.iter().any(|d| {
            let mut addr = crate::protocol::MacString::new();
            crate::protocol::format_mac(&report.addr, &mut addr);
            d.address == addr
        }) {
            continue;
        }
        if devices.is_full() {
            truncated = true;
            continue;
        }
        let parsed = parse_adv_data(&report.addr, &report.ad_data);
        let mut address = crate::protocol::MacString::new();
        crate::protocol::format_mac(&report.addr, &mut address);
        let _ = devices.push(BleDeviceRecord {
            name: parsed.name,
            address,
            rssi: report.rssi,
        });
    }

    radio.stop_scan();
    if truncated {
        diag.note_batch_truncated();
    }
    Ok(BleScanBatch { devices, truncated })
}

/// Fixed manufacturer-data payload templates for `BLE_SPAM` (§4.5). Values
/// are placeholder-shaped (correct header bytes, zeroed body) — the exact
/// vendor byte sequences are a peripheral/compliance concern outside this
/// crate's scope.
pub fn spam_payload(tag: BleSpamTag) -> Vec<u8, 32> {
    let mut v = Vec::new();
    let company_id: u16 = match tag {
        BleSpamTag::Bender => 0x004C,
        BleSpamTag::Samsung => 0x0075,
        BleSpamTag::Apple => 0x004C,
        BleSpamTag::Google => 0x00E0,
    };
    let _ = v.extend_from_slice(&company_id.to_le_bytes());
    let _ = v.extend_from_slice(&[0u8; 8]);
    v
}

pub const SPAM_MAX_COUNT: u16 = 1000;
pub const SPAM_DEFAULT_COUNT: u16 = 50;

/// Run the advertisement-spam loop (§4.5): `count` bursts of a fixed
/// template, capped at [`SPAM_MAX_COUNT`]. The burst/sleep timing itself is
/// a platform concern (`embassy_time::Timer::after`); this function drives
/// the count/yield cadence so it stays host-testable.
pub fn spam_start<C: BleController>(
    radio: &mut C,
    tag: BleSpamTag,
    count: u16,
) -> CoreResult<u16> {
    require_ready(radio)?;
    radio.stop_scan();
    let count = count.min(SPAM_MAX_COUNT);
    let payload = spam_payload(tag);

    for _ in 0..count {
        radio.start_advertising(&payload);
        radio.stop_advertising();
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeController {
        initialized: bool,
        synced: bool,
        reports: Vec<RawAdvReport, 80>,
        idx: usize,
        adv_starts: u32,
    }

    impl BleController for FakeController {
        fn is_initialized(&self) -> bool {
            self.initialized
        }
        fn is_synced(&self) -> bool {
            self.synced
        }
        fn start_scan(&mut self) {}
        fn stop_scan(&mut self) {}
        fn next_report(&mut self) -> Option<RawAdvReport> {
            let r = self.reports.get(self.idx).cloned();
            self.idx += 1;
            r
        }
        fn start_advertising(&mut self, _payload: &[u8]) {
            self.adv_starts += 1;
        }
        fn stop_advertising(&mut self) {}
    }

    fn report(n: u8, ad_data: &[u8]) -> RawAdvReport {
        let mut ad = Vec::new();
        let _ = ad.extend_from_slice(ad_data);
        RawAdvReport {
            addr: [n; 6],
            rssi: -55,
            ad_data: ad,
        }
    }

    #[test]
    fn not_ready_returns_invalid_state() {
        let mut radio = FakeController::default();
        let diag = crate::diag::Diagnostics::new();
        assert_eq!(scan_start(&mut radio, &diag).unwrap_err(), CoreError::InvalidState);
    }

    #[test]
    fn scan_dedups_by_address() {
        let mut radio = FakeController {
            initialized: true,
            synced: true,
            ..Default::default()
        };
        let _ = radio.reports.push(report(1, &[]));
        let _ = radio.reports.push(report(1, &[]));
        let _ = radio.reports.push(report(2, &[]));
        let diag = crate::diag::Diagnostics::new();
        let batch = scan_start(&mut radio, &diag).unwrap();
        assert_eq!(batch.devices.len(), 2);
    }

    #[test]
    fn parse_adv_name_and_manufacturer() {
        let ad_data = [0x06, 0x09, b'F', b'l', b'o', b'c', b'k', 0x03, 0xFF, 0xC8, 0x09];
        let parsed = parse_adv_data(&[1; 6], &ad_data);
        assert_eq!(parsed.name.as_str(), "Flock");
        assert_eq!(parsed.manufacturer_id, 0x09C8);
    }

    #[test]
    fn parse_adv_truncated_structure_stops_cleanly() {
        let ad_data = [0x0A, 0x09, b'A', b'B'];
        let parsed = parse_adv_data(&[1; 6], &ad_data);
        assert!(parsed.name.is_empty());
    }

    #[test]
    fn spam_count_capped_at_max() {
        let mut radio = FakeController {
            initialized: true,
            synced: true,
            ..Default::default()
        };
        let n = spam_start(&mut radio, BleSpamTag::Samsung, 5000).unwrap();
        assert_eq!(n, SPAM_MAX_COUNT);
        assert_eq!(radio.adv_starts, SPAM_MAX_COUNT as u32);
    }

    #[test]
    fn spam_not_ready_is_invalid_state() {
        let mut radio = FakeController::default();
        assert_eq!(
            spam_start(&mut radio, BleSpamTag::Apple, 10).unwrap_err(),
            CoreError::InvalidState
        );
    }
}
