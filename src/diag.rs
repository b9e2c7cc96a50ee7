//! Process-wide diagnostic counters, surfaced read-only through `GET_INFO`.
//!
//! These are lock-free atomics (§5: "Counters: lock-free atomics") shared by
//! Serial I/O (dropped/overflowed lines) and the 802.11 engine (truncated
//! scan batches).

use core::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Egress lines dropped: egress-mutex timeout or a hardware write error.
    pub lines_dropped: AtomicU32,
    /// Scan/BLE batches that hit their cap and were truncated.
    pub batches_truncated: AtomicU32,
    /// Ingress line-buffer overflows (line reset without a newline).
    pub ingress_overflows: AtomicU32,
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            lines_dropped: AtomicU32::new(0),
            batches_truncated: AtomicU32::new(0),
            ingress_overflows: AtomicU32::new(0),
        }
    }

    pub fn note_line_dropped(&self) {
        self.lines_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_batch_truncated(&self) {
        self.batches_truncated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_ingress_overflow(&self) {
        self.ingress_overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> (u32, u32, u32) {
        (
            self.lines_dropped.load(Ordering::Relaxed),
            self.batches_truncated.load(Ordering::Relaxed),
            self.ingress_overflows.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let d = Diagnostics::new();
        assert_eq!(d.snapshot(), (0, 0, 0));
    }

    #[test]
    fn each_counter_increments_independently() {
        let d = Diagnostics::new();
        d.note_line_dropped();
        d.note_line_dropped();
        d.note_batch_truncated();
        d.note_ingress_overflow();
        assert_eq!(d.snapshot(), (2, 1, 1));
    }
}
