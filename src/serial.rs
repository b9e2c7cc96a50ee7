//! Serial transport: ingress line framing, egress line-atomic writes, and the
//! JSON string escaper used for untrusted byte content (raw SSIDs).
//!
//! The ingress/egress split mirrors `comm::LineReader` in the reference
//! firmware, generalized to the bounds this crate's spec calls for: an
//! 8192-byte ingress buffer with overflow-and-resync instead of silent
//! truncation, and a mutex-guarded egress path with a bounded acquisition
//! timeout so a wedged writer degrades to dropped lines instead of stalling
//! every other task.

use crate::diag::Diagnostics;
use crate::error::{CoreError, CoreResult};

/// Ingress line buffer capacity (§4.1).
pub const INGRESS_BUF_LEN: usize = 8192;

/// One event produced by feeding bytes into a [`LineFramer`].
#[derive(Debug, PartialEq, Eq)]
pub enum IngressEvent<'a> {
    /// A complete line, without the terminating `\n`/`\r\n`.
    Line(&'a [u8]),
    /// The line buffer filled without seeing a newline; it has been reset
    /// and the remainder of the line (until the next newline) is discarded.
    Overflow,
}

/// Byte-at-a-time line framer for the ingress stream.
///
/// Unlike a naive reset-on-overflow framer, this only reports `Overflow`
/// once per errant line: once the buffer fills, subsequent bytes are
/// silently discarded until a newline resynchronizes the stream. Feeding an
/// unbounded byte stream with no newline therefore produces exactly one
/// `Overflow` event, not one per buffer-length of input.
pub struct LineFramer {
    buf: [u8; INGRESS_BUF_LEN],
    pos: usize,
    discarding: bool,
}

impl LineFramer {
    pub const fn new() -> Self {
        Self {
            buf: [0; INGRESS_BUF_LEN],
            pos: 0,
            discarding: false,
        }
    }

    /// Feed one byte. Returns `Some(event)` when a line completes or an
    /// overflow is detected; `None` otherwise (still accumulating).
    pub fn feed(&mut self, byte: u8) -> Option<IngressEvent<'_>> {
        if byte == b'\n' {
            self.discarding = false;
            if self.pos == 0 {
                return None;
            }
            let mut end = self.pos;
            if end > 0 && self.buf[end - 1] == b'\r' {
                end -= 1;
            }
            let line_end = end;
            self.pos = 0;
            return Some(IngressEvent::Line(&self.buf[..line_end]));
        }

        if self.discarding {
            return None;
        }

        if self.pos == self.buf.len() {
            self.pos = 0;
            self.discarding = true;
            return Some(IngressEvent::Overflow);
        }

        self.buf[self.pos] = byte;
        self.pos += 1;
        None
    }
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

/// Hand-rolled JSON string-content escaper for raw, possibly non-UTF-8 byte
/// content (§4.1). Escapes `"`, `\`, and the named control characters to
/// their standard JSON two-character forms; every other byte below 0x20 is
/// escaped as `\u00XX`. Output is always plain ASCII and therefore always
/// valid to embed in a UTF-8 string afterwards.
///
/// Writes into `out` and returns the number of bytes written, truncating
/// (dropping the rest of `data`) rather than overrunning `out`. A byte whose
/// escape sequence would not fully fit is not written at all — the output
/// never ends mid-escape.
pub fn escape_json_str(data: &[u8], out: &mut [u8]) -> usize {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut w = 0;
    for &b in data {
        let mut tmp = [0u8; 6];
        let n = match b {
            b'"' => {
                tmp[0] = b'\\';
                tmp[1] = b'"';
                2
            }
            b'\\' => {
                tmp[0] = b'\\';
                tmp[1] = b'\\';
                2
            }
            0x08 => {
                tmp[0] = b'\\';
                tmp[1] = b'b';
                2
            }
            0x0C => {
                tmp[0] = b'\\';
                tmp[1] = b'f';
                2
            }
            b'\n' => {
                tmp[0] = b'\\';
                tmp[1] = b'n';
                2
            }
            b'\r' => {
                tmp[0] = b'\\';
                tmp[1] = b'r';
                2
            }
            b'\t' => {
                tmp[0] = b'\\';
                tmp[1] = b't';
                2
            }
            0x00..=0x1F => {
                tmp[0] = b'\\';
                tmp[1] = b'u';
                tmp[2] = b'0';
                tmp[3] = b'0';
                tmp[4] = HEX[(b >> 4) as usize];
                tmp[5] = HEX[(b & 0x0F) as usize];
                6
            }
            _ => {
                tmp[0] = b;
                1
            }
        };
        if w + n > out.len() {
            break;
        }
        out[w..w + n].copy_from_slice(&tmp[..n]);
        w += n;
    }
    w
}

/// Byte-level sink a platform layer implements over its concrete UART/USB-CDC
/// peripheral. Kept synchronous and minimal so host fakes are trivial; the
/// egress mutex timeout is what actually bounds a stalled writer.
pub trait SerialPort {
    fn write_all(&mut self, bytes: &[u8]) -> CoreResult<()>;
}

#[cfg(feature = "firmware")]
pub use egress::Egress;

#[cfg(feature = "firmware")]
mod egress {
    use super::SerialPort;
    use crate::diag::Diagnostics;
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_sync::mutex::Mutex;
    use embassy_time::{with_timeout, Duration};

    /// Mutex-guarded egress path with a bounded acquisition timeout (§4.1,
    /// §7: "Egress mutex contention beyond the timeout... line dropped").
    ///
    /// A line is either written in full or not written at all — there is no
    /// partial-write path, matching the spec's "line-atomic" egress
    /// invariant.
    pub struct Egress<P: SerialPort> {
        port: Mutex<CriticalSectionRawMutex, P>,
    }

    impl<P: SerialPort> Egress<P> {
        pub const fn new(port: P) -> Self {
            Self {
                port: Mutex::new(port),
            }
        }

        /// Acquire the port within 100ms and write `line` (already
        /// newline-terminated). On timeout or a hardware write error, counts
        /// the line as dropped and returns without writing.
        pub async fn send_line(&self, line: &[u8], diag: &Diagnostics) {
            match with_timeout(Duration::from_millis(100), self.port.lock()).await {
                Ok(mut guard) => {
                    if guard.write_all(line).is_err() {
                        diag.note_line_dropped();
                    }
                }
                Err(_) => diag.note_line_dropped(),
            }
        }
    }
}

/// Sanitize raw SSID bytes (which, unlike BLE local names, are not
/// guaranteed valid UTF-8) into a displayable, JSON-safe name string. Valid
/// UTF-8 input is copied through unchanged (the common case); invalid input
/// falls back to the byte escaper so the result is always safe to serialize.
pub fn sanitize_ssid(raw: &[u8]) -> crate::protocol::NameString {
    use crate::protocol::NameString;
    if let Ok(s) = core::str::from_utf8(raw) {
        if let Ok(name) = NameString::try_from(s) {
            return name;
        }
    }
    let mut tmp = [0u8; 64];
    let n = escape_json_str(raw, &mut tmp);
    let text = core::str::from_utf8(&tmp[..n]).unwrap_or("");
    NameString::try_from(text).unwrap_or_else(|_| {
        let mut name = NameString::new();
        let _ = name.push_str(&text[..text.len().min(name.capacity())]);
        name
    })
}
