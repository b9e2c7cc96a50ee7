//! Promiscuous-capture pipeline: packet statistics, probe/beacon/data
//! dispatch, and the EAPOL handshake assembler (§4.4).
//!
//! Grounded on `main.rs::wifi_sniffer_callback` (the reference firmware's
//! RX-callback wiring) and `scanner::parse_wifi_frame` (management-frame
//! classification via `ieee80211::match_frames!`); the EAPOL branch and
//! RECON/CSI toggles have no reference-firmware counterpart and are built
//! fresh against §4.4.

use heapless::Vec;

use ieee80211::match_frames;
use ieee80211::mgmt_frame::{BeaconFrame, ProbeRequestFrame};

use crate::protocol::{pulse_percent, NameString};
use crate::serial::sanitize_ssid;
use crate::wifi::eapol::{parse_eapol_key, Handshake, HandshakeCache};
use crate::wifi::frame::{extract_addresses, header_shape};

const RSSI_WINDOW_LEN: usize = 10;
const SNIFF_STATS_PERIOD: u32 = 100;
const PULSE_PERIOD: u32 = 10;
const CSI_HEARTBEAT_PERIOD: u32 = 50;

/// Output of feeding one captured frame through the sniffer (§4.4 step 1-2).
/// A single frame can trigger more than one event (e.g. the 10th packet of
/// a RECON-mode beacon produces both a `Pulse` and a `Recon`).
#[derive(Debug, Clone)]
pub enum SnifferEvent {
    Pulse { val: u8, ch: u8 },
    SniffStats { count: u32, m1: u32, m2: u32, complete: u32 },
    ClientProbe { mac: [u8; 6], ssid: NameString, rssi: i8 },
    Recon { ssid: NameString, bssid: [u8; 6], rssi: i8, channel: u8 },
    Handshake(Handshake),
    CsiHeartbeat { count: u32 },
}

/// Promiscuous-pipeline state: packet/RSSI statistics, mode toggles, and the
/// EAPOL handshake cache.
pub struct Sniffer {
    packet_count: u32,
    rssi_window: [i8; RSSI_WINDOW_LEN],
    rssi_window_len: usize,
    rssi_window_pos: usize,
    pub recon_enabled: bool,
    pub csi_enabled: bool,
    csi_packet_count: u32,
    cache: HandshakeCache,
}

impl Sniffer {
    pub const fn new() -> Self {
        Self {
            packet_count: 0,
            rssi_window: [0; RSSI_WINDOW_LEN],
            rssi_window_len: 0,
            rssi_window_pos: 0,
            recon_enabled: false,
            csi_enabled: false,
            csi_packet_count: 0,
            cache: HandshakeCache::new(),
        }
    }

    fn push_rssi(&mut self, rssi: i8) -> i32 {
        self.rssi_window[self.rssi_window_pos] = rssi;
        self.rssi_window_pos = (self.rssi_window_pos + 1) % RSSI_WINDOW_LEN;
        if self.rssi_window_len < RSSI_WINDOW_LEN {
            self.rssi_window_len += 1;
        }
        let sum: i32 = self.rssi_window[..self.rssi_window_len]
            .iter()
            .map(|&r| r as i32)
            .sum();
        sum / self.rssi_window_len as i32
    }

    pub fn m1_seen(&self) -> u32 {
        self.cache.m1_seen
    }
    pub fn m2_seen(&self) -> u32 {
        self.cache.m2_seen
    }
    pub fn complete(&self) -> u32 {
        self.cache.complete
    }

    /// Feed one raw 802.11 frame captured at `rssi`/`channel`.
    pub fn on_frame(
        &mut self,
        frame: &[u8],
        rssi: i8,
        channel: u8,
        now_ms: u32,
    ) -> Vec<SnifferEvent, 4> {
        let mut events = Vec::new();
        self.packet_count += 1;

        let avg = self.push_rssi(rssi);
        if self.packet_count % PULSE_PERIOD == 0 {
            let _ = events.push(SnifferEvent::Pulse {
                val: pulse_percent(avg.clamp(i8::MIN as i32, i8::MAX as i32) as i8),
                ch: channel,
            });
        }
        if self.packet_count % SNIFF_STATS_PERIOD == 0 {
            let _ = events.push(SnifferEvent::SniffStats {
                count: self.packet_count,
                m1: self.cache.m1_seen,
                m2: self.cache.m2_seen,
                complete: self.cache.complete,
            });
        }

        if self.csi_enabled {
            self.csi_packet_count += 1;
            if self.csi_packet_count % CSI_HEARTBEAT_PERIOD == 0 {
                let _ = events.push(SnifferEvent::CsiHeartbeat {
                    count: self.csi_packet_count,
                });
            }
        }

        self.dispatch(frame, rssi, channel, now_ms, &mut events);
        events
    }

    fn dispatch(
        &mut self,
        frame: &[u8],
        rssi: i8,
        channel: u8,
        now_ms: u32,
        events: &mut Vec<SnifferEvent, 4>,
    ) {
        let matched = match_frames! {
            frame,
            probe_req = ProbeRequestFrame<'_> => {
                let _ = events.push(SnifferEvent::ClientProbe {
                    mac: probe_req.header.transmitter_address.0,
                    ssid: sanitize_ssid(probe_req.body.ssid().unwrap_or("").as_bytes()),
                    rssi,
                });
                true
            }
            beacon = BeaconFrame<'_> => {
                if self.recon_enabled {
                    let _ = events.push(SnifferEvent::Recon {
                        ssid: sanitize_ssid(beacon.body.ssid().unwrap_or("").as_bytes()),
                        bssid: beacon.header.transmitter_address.0,
                        rssi,
                        channel,
                    });
                }
                true
            }
        };

        if matched.is_ok() {
            return;
        }

        let Some(shape) = header_shape(frame) else {
            return;
        };
        let frame_type = (frame[0] >> 2) & 0x3;
        if frame_type != 2 {
            return; // only Data frames carry EAPOL
        }
        let Some(addrs) = extract_addresses(frame, &shape) else {
            return;
        };
        let hdr_len = shape.header_len();
        let Some(payload) = frame.get(hdr_len..) else {
            return;
        };
        let Some(view) = parse_eapol_key(payload) else {
            return;
        };

        if view.is_m1() {
            self.cache.on_m1(addrs.bssid, addrs.sta, &view, now_ms);
        } else if view.is_m2() {
            if let Some(hs) = self
                .cache
                .on_m2(addrs.bssid, addrs.sta, &view, channel, rssi, now_ms)
            {
                let _ = events.push(SnifferEvent::Handshake(hs));
            }
        }
    }
}

impl Default for Sniffer {
    fn default() -> Self {
        Self::new()
    }
}
