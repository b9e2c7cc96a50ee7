//! Radio supervisor: the single `RadioState` cell and its mutual-exclusion
//! policy (§4.3), plus the WiFi channel-hopper's pure step function.
//!
//! The reference firmware keeps an equivalent piece of state as a handful of
//! `static` atomics and a `Mutex<Cell<FilterConfig>>` read directly by
//! `main.rs`'s tasks. This module gives that state an owned type with an
//! explicit transition function instead, so the mutual-exclusion policy is
//! one reviewable, testable place rather than scattered across call sites.

use crate::error::{CoreError, CoreResult};

/// Process-wide radio state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Idle,
    WifiScan,
    WifiSniff,
    WifiDeauthBurst,
    BleScan,
    BleSpam,
    SubghzRx,
    SubghzTx,
    SubghzRecord,
    SubghzBrute,
    SubghzAnalyze,
}

impl RadioState {
    fn radio(self) -> Radio {
        use RadioState::*;
        match self {
            Idle => Radio::None,
            WifiScan | WifiSniff | WifiDeauthBurst => Radio::Wifi,
            BleScan | BleSpam => Radio::Ble,
            SubghzRx | SubghzTx | SubghzRecord | SubghzBrute | SubghzAnalyze => Radio::SubGhz,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Radio {
    None,
    Wifi,
    Ble,
    SubGhz,
}

/// Outcome of a transition request that quiesced another radio first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub new_state: RadioState,
    /// `true` when a WiFi<->BLE handover forced the other radio to stop
    /// first; the caller must apply the 50 ms quiescence delay.
    pub quiesced_other: bool,
}

/// Owns the single `RadioState` cell and arbitrates transitions (§4.3).
///
/// Not `Sync` by itself — the platform layer wraps one in a
/// `critical_section::Mutex<RefCell<_>>` (or an `embassy_sync::Mutex`) the
/// way the reference firmware wraps its `FilterConfig`.
#[derive(Debug)]
pub struct Supervisor {
    state: RadioState,
}

impl Supervisor {
    pub const fn new() -> Self {
        Self {
            state: RadioState::Idle,
        }
    }

    pub fn state(&self) -> RadioState {
        self.state
    }

    /// Attempt to move to `to`. WiFi and BLE are mutually exclusive: moving
    /// into one while the other is active quiesces it instead of refusing.
    /// Sub-GHz is independent of both. Within a radio, only `Idle` may
    /// transition to an active state for that radio — moving from one active
    /// WiFi state straight to another active WiFi state (or BLE-to-BLE,
    /// sub-GHz-to-sub-GHz) is `Busy`, matching "starting scan while sniffing
    /// returns a busy error".
    pub fn try_transition(&mut self, to: RadioState) -> CoreResult<Transition> {
        if to == self.state {
            return Ok(Transition {
                new_state: to,
                quiesced_other: false,
            });
        }

        let current_radio = self.state.radio();
        let target_radio = to.radio();

        let quiesced_other = match (current_radio, target_radio) {
            (Radio::None, _) => false,
            (Radio::Wifi, Radio::Ble) | (Radio::Ble, Radio::Wifi) => true,
            (a, b) if a == b => return Err(CoreError::Busy),
            _ => false,
        };

        self.state = to;
        Ok(Transition {
            new_state: to,
            quiesced_other,
        })
    }

    /// `STOP`: unconditionally return to `Idle` (§5: "sets every engine's
    /// run flag to false").
    pub fn stop(&mut self) {
        self.state = RadioState::Idle;
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Biased WiFi channel schedule (§4.3: "weighted toward 1, 6, 11").
///
/// One 20-step cycle: channels 1, 6, and 11 appear 4, 3, and 3 times
/// respectively (10 of 20), and every channel 1..=13 appears at least once.
/// Because the cycle length equals the window size used by the "any
/// 20-step window" testable property, every contiguous 20-step window —
/// aligned or not — is a rotation of this same multiset.
pub const HOP_SCHEDULE: [u8; 20] = [
    1, 6, 11, 2, 6, 1, 11, 3, 6, 1, 11, 4, 5, 7, 8, 9, 10, 12, 13, 1,
];

/// Pure step function for the channel hopper: given the index of the last
/// channel visited, return the next one. Stateless and host-testable; the
/// platform task wraps this with a 250 ms sleep per step.
pub fn next_channel(step: u32) -> u8 {
    HOP_SCHEDULE[(step as usize) % HOP_SCHEDULE.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wifi_to_wifi_busy() {
        let mut s = Supervisor::new();
        s.try_transition(RadioState::WifiSniff).unwrap();
        assert_eq!(
            s.try_transition(RadioState::WifiScan),
            Err(CoreError::Busy)
        );
    }

    #[test]
    fn wifi_to_ble_quiesces() {
        let mut s = Supervisor::new();
        s.try_transition(RadioState::WifiSniff).unwrap();
        let t = s.try_transition(RadioState::BleScan).unwrap();
        assert!(t.quiesced_other);
        assert_eq!(s.state(), RadioState::BleScan);
    }

    #[test]
    fn subghz_independent_of_wifi() {
        let mut s = Supervisor::new();
        s.try_transition(RadioState::WifiSniff).unwrap();
        let t = s.try_transition(RadioState::SubghzRx).unwrap();
        assert!(!t.quiesced_other);
        assert_eq!(s.state(), RadioState::SubghzRx);
    }

    #[test]
    fn subghz_to_subghz_busy() {
        let mut s = Supervisor::new();
        s.try_transition(RadioState::SubghzRecord).unwrap();
        assert_eq!(
            s.try_transition(RadioState::SubghzBrute),
            Err(CoreError::Busy)
        );
    }

    #[test]
    fn stop_returns_to_idle() {
        let mut s = Supervisor::new();
        s.try_transition(RadioState::WifiDeauthBurst).unwrap();
        s.stop();
        assert_eq!(s.state(), RadioState::Idle);
    }

    #[test]
    fn idle_to_idle_is_a_noop_success() {
        let mut s = Supervisor::new();
        let t = s.try_transition(RadioState::Idle).unwrap();
        assert!(!t.quiesced_other);
    }

    #[test]
    fn channels_1_6_11_dominate_20_step_window() {
        let mut counts = [0u32; 14];
        for step in 0..20 {
            counts[next_channel(step) as usize] += 1;
        }
        let dominant = counts[1] + counts[6] + counts[11];
        assert!(dominant >= 9, "got {dominant}");
    }

    #[test]
    fn every_channel_visited_within_one_cycle() {
        let mut seen = [false; 14];
        for step in 0..HOP_SCHEDULE.len() as u32 {
            seen[next_channel(step) as usize] = true;
        }
        for ch in 1..=13usize {
            assert!(seen[ch], "channel {ch} never visited");
        }
    }

    #[test]
    fn any_20_step_window_matches_full_cycle_multiset() {
        // offset window by an arbitrary amount; composition must be identical
        // since the cycle length equals the window length.
        let mut counts = [0u32; 14];
        for step in 137..137 + 20 {
            counts[next_channel(step) as usize] += 1;
        }
        assert!(counts[1] + counts[6] + counts[11] >= 9);
        for ch in 1..=13usize {
            assert!(counts[ch] >= 1, "channel {ch} missing from offset window");
        }
    }
}
