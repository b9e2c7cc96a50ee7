//! Hardware capability constants for the supported board.
//!
//! A real deployment would gate these behind board-selection features the
//! way the reference firmware this crate is descended from does; this crate
//! targets a single handheld board (three radios: 802.11, BLE, sub-GHz OOK)
//! and keeps the constants here so `sys_info` and the engines have one place
//! to read them from.

/// Human-readable board identifier reported in `sys_info`.
pub const BOARD_NAME: &str = "pentest-core";

/// External PSRAM size in bytes (0 if absent).
pub const PSRAM_BYTES: u32 = 2 * 1024 * 1024;

/// Total heap size reserved at boot, in bytes.
pub const TOTAL_HEAP_BYTES: u32 = 192 * 1024;

/// Crystal frequency driving the sub-GHz transceiver's frequency synthesizer, in Hz.
pub const SUBGHZ_XTAL_HZ: u64 = 26_000_000;

/// Peripheral presence, detected at startup.
///
/// The detection step itself (probing the NFC reader and the CC1101 over
/// SPI) is a peripheral-driver concern out of scope for this crate; the core
/// only consumes the resulting booleans. A hardware init failure is logged
/// and leaves the corresponding flag `false` rather than panicking — other
/// features proceed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Peripherals {
    pub nfc: bool,
    pub cc1101: bool,
}

impl Peripherals {
    pub const fn none_detected() -> Self {
        Self {
            nfc: false,
            cc1101: false,
        }
    }

    pub const fn all_present() -> Self {
        Self {
            nfc: true,
            cc1101: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_detected_is_all_false() {
        let p = Peripherals::none_detected();
        assert!(!p.nfc);
        assert!(!p.cc1101);
    }

    #[test]
    fn all_present_is_all_true() {
        let p = Peripherals::all_present();
        assert!(p.nfc);
        assert!(p.cc1101);
    }
}
