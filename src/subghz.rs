//! The sub-GHz engine: frequency control, record-into-buffer, replay,
//! brute-force code sweep, and the RSSI analyzer (§4.6).
//!
//! No reference-firmware counterpart exists (the reference firmware is
//! WiFi/BLE only); the register-level shape below — frequency word,
//! `MARCSTATE` polling, chunked FIFO access — is grounded on the CC1101
//! register model shown in `other_examples/19a391c8_Iaphetes-cc1101__src-lib.rs.rs`
//! and `other_examples/66b9d398_rubend056-cc1101__src-lib.rs.rs`, kept
//! behind a crate-local trait rather than vendoring either driver.

use heapless::Vec;

use crate::error::{CoreError, CoreResult};

/// Crystal frequency used by the frequency-word conversion (§4.6).
pub const XTAL_HZ: f64 = 26_000_000.0;

/// `MARCSTATE` value indicating the radio has returned to idle.
pub const MARCSTATE_IDLE: u8 = 0x01;

/// Capability the platform layer implements over the concrete sub-GHz
/// transceiver.
pub trait SubGhzRadio {
    fn set_freq_word(&mut self, word: u32);
    fn strobe_calibrate(&mut self);
    fn rx_fifo_len(&mut self) -> usize;
    /// Copy up to `out.len()` bytes out of the RX FIFO; returns the number
    /// actually copied.
    fn read_fifo(&mut self, out: &mut [u8]) -> usize;
    fn tx_burst(&mut self, chunk: &[u8]);
    fn read_marcstate(&mut self) -> u8;
    fn read_rssi(&mut self) -> i8;
}

/// Convert a frequency in MHz to the transceiver's frequency-word register
/// value: `freq = round(mhz * 2^16 / 26.0)` (§4.6).
pub fn freq_word(mhz: f32) -> u32 {
    ((mhz as f64) * 65536.0 / (XTAL_HZ / 1_000_000.0)).round() as u32
}

/// Valid `SET_FREQ` range (§4.6, confirmed by §8's boundary examples: 299.9
/// and 950.0 are both rejected, so the upper bound is 928.0 inclusive, not
/// the 950.0 the command-router table loosely paraphrases — see
/// DESIGN.md).
pub fn set_frequency<R: SubGhzRadio>(radio: &mut R, mhz: f32) -> CoreResult<()> {
    if !(mhz > 300.0 && mhz <= 928.0) {
        return Err(CoreError::InvalidArgument);
    }
    radio.set_freq_word(freq_word(mhz));
    radio.strobe_calibrate();
    Ok(())
}

const RX_CHUNK_LEN: usize = 32;
const TX_CHUNK_LEN: usize = 60;

/// A record-in-progress (§4.6 `record_start`/`record_stop`, §3
/// `CaptureBuffer`). `N` bounds the buffer size; the default deployment
/// uses 32 KiB.
pub struct RecordSession<const N: usize> {
    buf: Vec<u8, N>,
    active: bool,
}

impl<const N: usize> RecordSession<N> {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// One poll step: copy up to `RX_CHUNK_LEN` bytes out of the FIFO into
    /// the capture buffer. Stops itself once the buffer fills. The platform
    /// task calls this once per millisecond (§5).
    pub fn poll(&mut self, radio: &mut impl SubGhzRadio) {
        if !self.active {
            return;
        }
        let available = radio.rx_fifo_len();
        if available == 0 {
            return;
        }
        let remaining_capacity = self.buf.capacity() - self.buf.len();
        if remaining_capacity == 0 {
            self.active = false;
            return;
        }
        let want = available.min(RX_CHUNK_LEN).min(remaining_capacity);
        let mut chunk = [0u8; RX_CHUNK_LEN];
        let got = radio.read_fifo(&mut chunk[..want]);
        let _ = self.buf.extend_from_slice(&chunk[..got]);
        if self.buf.len() == self.buf.capacity() {
            self.active = false;
        }
    }

    /// Stop recording and return the captured length. The 50 ms drain-grace
    /// period named in §4.6 is a platform-level sleep before this call, not
    /// logic this pure type needs to model.
    pub fn stop(mut self) -> usize {
        self.active = false;
        self.buf.len()
    }

    pub fn captured(&self) -> &[u8] {
        &self.buf
    }
}

impl<const N: usize> Default for RecordSession<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Transmit `buf` in <=60-byte chunks, polling `MARCSTATE` back to idle
/// after each (§4.6). `poll_budget` bounds how many `read_marcstate` polls
/// are allowed per chunk before giving up (platform sleeps ~1 ms between
/// polls, so 500 corresponds to the spec's 500 ms timeout).
pub fn replay<R: SubGhzRadio>(radio: &mut R, buf: &[u8], poll_budget: u32) -> CoreResult<()> {
    for chunk in buf.chunks(TX_CHUNK_LEN) {
        radio.tx_burst(chunk);
        let mut polls = 0;
        while radio.read_marcstate() != MARCSTATE_IDLE {
            polls += 1;
            if polls >= poll_budget {
                return Err(CoreError::Timeout);
            }
        }
    }
    Ok(())
}

/// 12-bit fixed-code sweep (§4.6 `SUBGHZ_BRUTE`). 0 = short pulse, 1 = long
/// pulse, a fixed two-byte sync trailer closes each code.
pub const BRUTE_CODE_SPACE: u16 = 4096;
pub const BRUTE_PROGRESS_PERIOD: u16 = 256;

const PULSE_SHORT: u8 = 0x01;
const PULSE_LONG: u8 = 0x03;
const SYNC_TRAILER: [u8; 2] = [0xAA, 0x55];

/// OOK-encode a 12-bit code: one pulse byte per bit, MSB first, followed by
/// the sync trailer.
pub fn encode_code(code: u16) -> Vec<u8, 14> {
    let mut out = Vec::new();
    for bit in (0..12).rev() {
        let pulse = if (code >> bit) & 1 == 1 {
            PULSE_LONG
        } else {
            PULSE_SHORT
        };
        let _ = out.push(pulse);
    }
    let _ = out.extend_from_slice(&SYNC_TRAILER);
    out
}

/// One step of the brute-force sweep: transmit `code`'s OOK encoding.
/// Returns `Some(progress)` every [`BRUTE_PROGRESS_PERIOD`] codes.
pub fn brute_step<R: SubGhzRadio>(radio: &mut R, code: u16) -> Option<(u16, u16)> {
    let frame = encode_code(code);
    radio.tx_burst(&frame);
    if (code + 1) % BRUTE_PROGRESS_PERIOD == 0 || code + 1 == BRUTE_CODE_SPACE {
        Some((code + 1, BRUTE_CODE_SPACE))
    } else {
        None
    }
}

/// One analyzer sample (§4.6: 20 Hz RSSI sampling).
pub fn analyzer_sample<R: SubGhzRadio>(radio: &mut R) -> i8 {
    radio.read_rssi()
}
