//! Crate-wide error type.
//!
//! Every fallible entry point in the engines, the supervisor, and the router
//! returns `Result<T, CoreError>`. The router's only job with one of these is
//! to turn it into the exact wire string named in the per-verb error table —
//! it never invents new prose at the call site.

use core::fmt;

/// A single error kind shared by every subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    /// A subsystem is not initialized or not synced.
    NotReady,
    /// A conflicting operation is already in progress.
    Busy,
    /// Malformed MAC, out-of-range frequency, bad channel, etc.
    InvalidArgument,
    /// The supervisor refused the requested state transition.
    InvalidState,
    /// A bounded wait expired (radio TX, BLE teardown, egress mutex).
    Timeout,
    /// A peripheral was absent at startup.
    NotFound,
    /// A scan/batch/line/ingress bound was exceeded.
    CapacityExceeded,
    /// The lower-layer driver returned an error.
    HardwareError,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CoreError::NotReady => "not ready",
            CoreError::Busy => "busy",
            CoreError::InvalidArgument => "invalid argument",
            CoreError::InvalidState => "invalid state",
            CoreError::Timeout => "timeout",
            CoreError::NotFound => "not found",
            CoreError::CapacityExceeded => "capacity exceeded",
            CoreError::HardwareError => "hardware error",
        };
        f.write_str(s)
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
