//! EAPOL 4-way-handshake assembler (§4.4, §3).
//!
//! No equivalent exists in the reference firmware; this module is built
//! fresh against the spec's byte layout, following the zero-copy,
//! borrowed-slice style `ieee80211` itself uses for frame parsing elsewhere
//! in this crate.

use heapless::Vec;

/// LLC/SNAP header preceding an EAPOL payload on a data frame (§6).
pub const LLC_SNAP_EAPOL: [u8; 8] = [0xAA, 0xAA, 0x03, 0x00, 0x00, 0x00, 0x88, 0x8E];

/// Minimum EAPOL-Key body length: descriptor_type(1) + key_info(2) +
/// key_length(2) + replay_counter(8) + nonce(32) + key_iv(16) + key_rsc(8) +
/// key_id(8) + key_mic(16) + key_data_length(2) = 95 bytes.
pub const MIN_KEY_BODY_LEN: usize = 95;

pub const EAPOL_TYPE_KEY: u8 = 3;
pub const DESC_TYPE_WPA2: u8 = 0x02;
pub const DESC_TYPE_WPA1: u8 = 0xFE;

const KEY_INFO_ACK: u16 = 0x0080;
const KEY_INFO_MIC: u16 = 0x0100;
const KEY_INFO_SECURE: u16 = 0x0200;
const KEY_INFO_VERSION_MASK: u16 = 0x0007;

pub const MAX_HANDSHAKE_CACHE: usize = 16;
pub const HANDSHAKE_TTL_MS: u32 = 10_000;
pub const MAX_EAPOL_FRAME_LEN: usize = 256;

/// A borrowed view into one parsed EAPOL-Key frame.
#[derive(Debug, Clone, Copy)]
pub struct EapolKeyView<'a> {
    pub desc_type: u8,
    pub key_info: u16,
    pub replay_counter: &'a [u8],
    pub nonce: &'a [u8],
    pub mic: &'a [u8],
    /// The full EAPOL frame (version/type/length/body), as received.
    pub raw: &'a [u8],
}

impl<'a> EapolKeyView<'a> {
    pub fn is_ack(&self) -> bool {
        self.key_info & KEY_INFO_ACK != 0
    }
    pub fn is_mic_set(&self) -> bool {
        self.key_info & KEY_INFO_MIC != 0
    }
    pub fn is_secure(&self) -> bool {
        self.key_info & KEY_INFO_SECURE != 0
    }
    pub fn key_desc_version(&self) -> u8 {
        (self.key_info & KEY_INFO_VERSION_MASK) as u8
    }
    pub fn is_m1(&self) -> bool {
        self.is_ack() && !self.is_mic_set()
    }
    pub fn is_m2(&self) -> bool {
        self.is_mic_set() && !self.is_ack() && !self.is_secure()
    }
}

/// Parse a data-frame payload that is expected to carry an EAPOL-Key frame.
/// `payload` starts immediately after the 802.11 MAC header (and any
/// QoS/HTC/WDS extension).  Returns `None` for anything that isn't a
/// recognized, well-formed WPA1/WPA2 EAPOL-Key frame — the caller drops
/// those silently, per §7 ("non-fatal per-frame issues... counted and
/// dropped silently").
pub fn parse_eapol_key(payload: &[u8]) -> Option<EapolKeyView<'_>> {
    if payload.len() < LLC_SNAP_EAPOL.len() || payload[..LLC_SNAP_EAPOL.len()] != LLC_SNAP_EAPOL {
        return None;
    }
    let eapol = &payload[LLC_SNAP_EAPOL.len()..];
    if eapol.len() < 4 {
        return None;
    }
    if eapol[1] != EAPOL_TYPE_KEY {
        return None;
    }
    let body_len = u16::from_be_bytes([eapol[2], eapol[3]]) as usize;
    let body = &eapol[4..];
    if body.len() < MIN_KEY_BODY_LEN || body_len > body.len() {
        return None;
    }
    let desc_type = body[0];
    if desc_type != DESC_TYPE_WPA2 && desc_type != DESC_TYPE_WPA1 {
        return None;
    }
    let key_info = u16::from_be_bytes([body[1], body[2]]);
    let replay_counter = &body[5..13];
    let nonce = &body[13..45];
    let mic = &body[77..93];

    let frame_len = eapol.len().min(MAX_EAPOL_FRAME_LEN);
    Some(EapolKeyView {
        desc_type,
        key_info,
        replay_counter,
        nonce,
        mic,
        raw: &eapol[..frame_len],
    })
}

/// One in-flight handshake, awaiting its M2 (§3: `HandshakeCacheEntry`).
#[derive(Debug, Clone, Copy)]
struct CacheEntry {
    bssid: [u8; 6],
    sta: [u8; 6],
    anonce: [u8; 32],
    replay_counter: [u8; 8],
    desc_type: u8,
    desc_version: u8,
    last_seen_ms: u32,
    valid: bool,
}

impl CacheEntry {
    fn is_expired(&self, now_ms: u32) -> bool {
        now_ms.wrapping_sub(self.last_seen_ms) > HANDSHAKE_TTL_MS
    }
}

/// A complete 4-way-handshake capture, ready for egress (§3: `Handshake`).
#[derive(Debug, Clone)]
pub struct Handshake {
    pub bssid: [u8; 6],
    pub sta: [u8; 6],
    pub anonce: [u8; 32],
    pub snonce: [u8; 32],
    pub mic: [u8; 16],
    pub replay_counter: [u8; 8],
    pub desc_type: u8,
    pub desc_version: u8,
    pub eapol_frame: Vec<u8, MAX_EAPOL_FRAME_LEN>,
    pub channel: u8,
    pub rssi: i8,
    pub timestamp_ms: u32,
}

/// Bounded M1 cache keyed by (BSSID, STA); produces a [`Handshake`] once a
/// matching M2 arrives (§4.4, §8).
#[derive(Debug)]
pub struct HandshakeCache {
    entries: Vec<CacheEntry, MAX_HANDSHAKE_CACHE>,
    pub m1_seen: u32,
    pub m2_seen: u32,
    pub complete: u32,
}

impl HandshakeCache {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
            m1_seen: 0,
            m2_seen: 0,
            complete: 0,
        }
    }

    fn find_index(&self, bssid: &[u8; 6], sta: &[u8; 6]) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| &e.bssid == bssid && &e.sta == sta)
    }

    /// Pick the slot to evict when the cache is full and the new key isn't
    /// already present: first an invalid entry, then the oldest expired
    /// one, then simply the oldest by `last_seen_ms` (§3).
    fn victim_index(&self, now_ms: u32) -> usize {
        if let Some(i) = self.entries.iter().position(|e| !e.valid) {
            return i;
        }
        if let Some(i) = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_expired(now_ms))
            .min_by_key(|(_, e)| e.last_seen_ms)
            .map(|(i, _)| i)
        {
            return i;
        }
        self.entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.last_seen_ms)
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Ingest an M1 (Ack && !MIC) frame: upsert the cache entry for
    /// (bssid, sta).
    pub fn on_m1(&mut self, bssid: [u8; 6], sta: [u8; 6], view: &EapolKeyView, now_ms: u32) {
        self.m1_seen += 1;
        let mut anonce = [0u8; 32];
        anonce.copy_from_slice(view.nonce);
        let mut replay_counter = [0u8; 8];
        replay_counter.copy_from_slice(view.replay_counter);

        let entry = CacheEntry {
            bssid,
            sta,
            anonce,
            replay_counter,
            desc_type: view.desc_type,
            desc_version: view.key_desc_version(),
            last_seen_ms: now_ms,
            valid: true,
        };

        if let Some(i) = self.find_index(&bssid, &sta) {
            self.entries[i] = entry;
            return;
        }
        if self.entries.push(entry).is_ok() {
            return;
        }
        let victim = self.victim_index(now_ms);
        self.entries[victim] = entry;
    }

    /// Ingest an M2 (MIC && !Ack && !Secure) frame. On a cache hit with a
    /// non-expired entry, invalidates the entry and returns the assembled
    /// handshake. The entry is invalidated before this function returns,
    /// satisfying "invalidated before the emission returns" (§8).
    pub fn on_m2(
        &mut self,
        bssid: [u8; 6],
        sta: [u8; 6],
        view: &EapolKeyView,
        channel: u8,
        rssi: i8,
        now_ms: u32,
    ) -> Option<Handshake> {
        self.m2_seen += 1;
        let i = self.find_index(&bssid, &sta)?;
        if self.entries[i].is_expired(now_ms) || !self.entries[i].valid {
            return None;
        }
        let entry = self.entries[i];
        self.entries[i].valid = false;

        let mut snonce = [0u8; 32];
        snonce.copy_from_slice(view.nonce);
        let mut mic = [0u8; 16];
        mic.copy_from_slice(view.mic);
        let mut eapol_frame = Vec::new();
        let _ = eapol_frame.extend_from_slice(view.raw);

        self.complete += 1;
        Some(Handshake {
            bssid: entry.bssid,
            sta: entry.sta,
            anonce: entry.anonce,
            snonce,
            mic,
            replay_counter: entry.replay_counter,
            desc_type: entry.desc_type,
            desc_version: entry.desc_version,
            eapol_frame,
            channel,
            rssi,
            timestamp_ms: now_ms,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for HandshakeCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_key_frame(key_info: u16, nonce_byte: u8, mic_byte: u8, replay: u8) -> Vec<u8, 300> {
        let mut v: Vec<u8, 300> = Vec::new();
        let _ = v.extend_from_slice(&LLC_SNAP_EAPOL);
        let _ = v.extend_from_slice(&[0x02, EAPOL_TYPE_KEY]); // version, type
        let body_len: u16 = MIN_KEY_BODY_LEN as u16;
        let _ = v.extend_from_slice(&body_len.to_be_bytes());
        let _ = v.push(DESC_TYPE_WPA2); // desc_type
        let _ = v.extend_from_slice(&key_info.to_be_bytes());
        let _ = v.extend_from_slice(&[0u8; 2]); // key_length
        let _ = v.extend_from_slice(&[replay; 8]); // replay_counter
        let _ = v.extend_from_slice(&[nonce_byte; 32]); // nonce
        let _ = v.extend_from_slice(&[0u8; 16]); // key_iv
        let _ = v.extend_from_slice(&[0u8; 8]); // key_rsc
        let _ = v.extend_from_slice(&[0u8; 8]); // key_id
        let _ = v.extend_from_slice(&[mic_byte; 16]); // mic
        let _ = v.extend_from_slice(&[0u8; 2]); // key_data_length
        v
    }

    #[test]
    fn parse_rejects_missing_llc_snap() {
        let payload = [0u8; 50];
        assert!(parse_eapol_key(&payload).is_none());
    }

    #[test]
    fn parse_m1_frame() {
        let frame = build_key_frame(0x008A, 0x11, 0x00, 0xAA);
        let view = parse_eapol_key(&frame).unwrap();
        assert!(view.is_m1());
        assert!(!view.is_m2());
        assert_eq!(view.key_desc_version(), 2);
        assert_eq!(view.nonce[0], 0x11);
    }

    #[test]
    fn parse_m2_frame() {
        let frame = build_key_frame(0x010A, 0x22, 0x33, 0xAA);
        let view = parse_eapol_key(&frame).unwrap();
        assert!(view.is_m2());
        assert!(!view.is_m1());
        assert_eq!(view.mic[0], 0x33);
    }

    #[test]
    fn short_body_is_rejected() {
        let mut v: Vec<u8, 300> = Vec::new();
        let _ = v.extend_from_slice(&LLC_SNAP_EAPOL);
        let _ = v.extend_from_slice(&[0x02, EAPOL_TYPE_KEY, 0x00, 0x05]);
        let _ = v.extend_from_slice(&[0u8; 5]);
        assert!(parse_eapol_key(&v).is_none());
    }

    #[test]
    fn full_handshake_end_to_end() {
        let mut cache = HandshakeCache::new();
        let bssid = [0xAA; 6];
        let sta = [0xBB; 6];

        let m1 = build_key_frame(0x008A, 0x11, 0x00, 0xAA);
        let m1_view = parse_eapol_key(&m1).unwrap();
        cache.on_m1(bssid, sta, &m1_view, 1_000);

        let m2 = build_key_frame(0x010A, 0x22, 0x33, 0xAA);
        let m2_view = parse_eapol_key(&m2).unwrap();
        let hs = cache.on_m2(bssid, sta, &m2_view, 6, -40, 1_500).unwrap();

        assert_eq!(hs.anonce[0], 0x11);
        assert_eq!(hs.snonce[0], 0x22);
        assert_eq!(hs.mic[0], 0x33);
        assert_eq!(hs.channel, 6);
        assert_eq!(hs.desc_version, 2);
        assert_eq!(cache.complete, 1);
    }

    #[test]
    fn m2_without_m1_is_ignored() {
        let mut cache = HandshakeCache::new();
        let m2 = build_key_frame(0x010A, 0x22, 0x33, 0xAA);
        let view = parse_eapol_key(&m2).unwrap();
        assert!(cache
            .on_m2([1; 6], [2; 6], &view, 1, -50, 0)
            .is_none());
    }

    #[test]
    fn expired_entry_is_not_matched() {
        let mut cache = HandshakeCache::new();
        let bssid = [0xAA; 6];
        let sta = [0xBB; 6];
        let m1 = build_key_frame(0x008A, 0x11, 0x00, 0xAA);
        let view = parse_eapol_key(&m1).unwrap();
        cache.on_m1(bssid, sta, &view, 0);

        let m2 = build_key_frame(0x010A, 0x22, 0x33, 0xAA);
        let m2_view = parse_eapol_key(&m2).unwrap();
        assert!(cache
            .on_m2(bssid, sta, &m2_view, 1, -50, HANDSHAKE_TTL_MS + 1)
            .is_none());
    }

    #[test]
    fn cache_evicts_oldest_when_full() {
        let mut cache = HandshakeCache::new();
        for i in 0..MAX_HANDSHAKE_CACHE {
            let bssid = [i as u8; 6];
            let m1 = build_key_frame(0x008A, i as u8, 0x00, 0xAA);
            let view = parse_eapol_key(&m1).unwrap();
            cache.on_m1(bssid, [0xFF; 6], &view, i as u32);
        }
        assert_eq!(cache.len(), MAX_HANDSHAKE_CACHE);

        // one more insert with a fresh key must evict, not grow past capacity
        let m1 = build_key_frame(0x008A, 0xEE, 0x00, 0xAA);
        let view = parse_eapol_key(&m1).unwrap();
        cache.on_m1([0xEE; 6], [0xFF; 6], &view, MAX_HANDSHAKE_CACHE as u32);
        assert_eq!(cache.len(), MAX_HANDSHAKE_CACHE);
    }

    #[test]
    fn handshake_invalidated_before_return() {
        let mut cache = HandshakeCache::new();
        let bssid = [0xAA; 6];
        let sta = [0xBB; 6];
        let m1 = build_key_frame(0x008A, 0x11, 0x00, 0xAA);
        let view = parse_eapol_key(&m1).unwrap();
        cache.on_m1(bssid, sta, &view, 0);

        let m2 = build_key_frame(0x010A, 0x22, 0x33, 0xAA);
        let m2_view = parse_eapol_key(&m2).unwrap();
        assert!(cache.on_m2(bssid, sta, &m2_view, 6, -40, 100).is_some());
        // second M2 for the same pair must not produce a second handshake
        assert!(cache.on_m2(bssid, sta, &m2_view, 6, -40, 100).is_none());
    }
}
