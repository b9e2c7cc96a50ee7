//! The 802.11 engine: active scan, promiscuous sniffer with EAPOL assembly,
//! and deauthentication burst injection (§4.4).

pub mod deauth;
pub mod eapol;
pub mod frame;
pub mod scan;
pub mod sniffer;
