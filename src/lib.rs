//! Pocket multi-radio pentest firmware core.
//!
//! Everything a handheld ESP32-S3 pentest tool needs to drive its radios
//! and speak to a host over serial: command parsing, a radio-exclusivity
//! supervisor, the 802.11/BLE/sub-GHz engines, and the NDJSON egress/ingress
//! protocol. `no_std`, no allocator — every message and batch is built in a
//! fixed-size `heapless` container, so it is testable on any host with
//! `cargo test` and runs unmodified on-device.
//!
//! Hardware bring-up (radio init, GPIO, the task executor) lives in `main`;
//! this crate is the logic those tasks call into, kept free of `esp-hal`
//! types wherever a plain capability trait will do.

#![cfg_attr(not(test), no_std)]

pub mod ble;
pub mod board;
pub mod diag;
pub mod error;
pub mod protocol;
pub mod router;
pub mod serial;
pub mod sinks;
pub mod status;
pub mod subghz;
pub mod supervisor;
pub mod wifi;
