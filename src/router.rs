//! Command router: parses `VERB[:ARG]` ingress lines into a typed command.
//!
//! This module is pure — no I/O, no engine state — so every parse rule is a
//! plain function of a `&str` in, `ParsedCommand` out. `main.rs` owns the
//! dispatch side (routing a `ParsedCommand` to the right engine), mirroring
//! the reference firmware's split between `comm::parse_command` (pure) and
//! `comm::handle_command`/`main.rs` (stateful).

/// BLE advertisement-spam payload template selector (§4.2, §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BleSpamTag {
    Bender,
    Samsung,
    Apple,
    Google,
}

impl BleSpamTag {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "BENDER" => Some(Self::Bender),
            "SAMSUNG" => Some(Self::Samsung),
            "APPLE" => Some(Self::Apple),
            "GOOGLE" => Some(Self::Google),
            _ => None,
        }
    }
}

/// A parsed ingress line, ready for dispatch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedCommand {
    ScanWifi,
    ScanBle,
    /// `0` means "hop"; otherwise a specific 1..=13 channel.
    SniffStart(u8),
    SniffStop,
    Deauth {
        ap: [u8; 6],
        channel: Option<u8>,
    },
    BleSpam(BleSpamTag),
    SetFreq(f32),
    RxRecord,
    TxReplay,
    NfcScan,
    NfcEmulate,
    GetInfo,
    ReconStart,
    ReconStop,
    CsiStart,
    CsiStop,
    AnalyzerStart,
    AnalyzerStop,
    SubghzBrute,
    Stop,
    SysReset,
    InputUp,
    InputDown,
    InputSelect,
    InputBack,
    /// Recognized verb, malformed argument — carries the exact wire string
    /// the router must reply with (§7).
    Invalid(&'static str),
    /// Not a recognized verb at all.
    Unknown,
}

fn parse_hex_byte(s: &str) -> Option<u8> {
    if s.len() != 2 {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

fn parse_mac(tokens: &[&str]) -> Option<[u8; 6]> {
    if tokens.len() < 6 {
        return None;
    }
    let mut mac = [0u8; 6];
    for (i, slot) in mac.iter_mut().enumerate() {
        *slot = parse_hex_byte(tokens[i])?;
    }
    Some(mac)
}

fn parse_freq(arg: &str) -> Option<f32> {
    let v: f32 = arg.trim().parse().ok()?;
    if v > 300.0 && v <= 928.0 {
        Some(v)
    } else {
        None
    }
}

fn parse_channel(arg: &str) -> Option<u8> {
    let v: u8 = arg.trim().parse().ok()?;
    if v <= 13 {
        Some(v)
    } else {
        None
    }
}

/// Split `"VERB"` or `"VERB:rest"` into `(verb, Option<rest>)`.
fn split_verb(line: &str) -> (&str, Option<&str>) {
    match line.find(':') {
        Some(i) => (&line[..i], Some(&line[i + 1..])),
        None => (line, None),
    }
}

/// Parse one ingress line (already trimmed of its terminator) into a
/// [`ParsedCommand`]. Never panics on arbitrary input.
pub fn parse_command(line: &str) -> ParsedCommand {
    let (verb, arg) = split_verb(line);

    match verb {
        "SCAN_WIFI" => ParsedCommand::ScanWifi,
        "SCAN_BLE" => ParsedCommand::ScanBle,
        "SNIFF_START" => match arg {
            None => ParsedCommand::SniffStart(0),
            Some(a) => match parse_channel(a) {
                Some(ch) => ParsedCommand::SniffStart(ch),
                None => ParsedCommand::Invalid("Invalid channel"),
            },
        },
        "SNIFF_STOP" => ParsedCommand::SniffStop,
        "DEAUTH" => {
            let Some(a) = arg else {
                return ParsedCommand::Invalid("Invalid MAC format");
            };
            let mut tokens: heapless::Vec<&str, 8> = heapless::Vec::new();
            for tok in a.split(':') {
                if tokens.push(tok).is_err() {
                    break;
                }
            }
            match parse_mac(&tokens) {
                None => ParsedCommand::Invalid("Invalid MAC format"),
                Some(ap) => {
                    let channel = tokens.get(6).and_then(|c| parse_channel(c));
                    if tokens.len() > 6 && channel.is_none() {
                        ParsedCommand::Invalid("Invalid channel")
                    } else {
                        ParsedCommand::Deauth { ap, channel }
                    }
                }
            }
        }
        "BLE_SPAM" => match arg.and_then(BleSpamTag::parse) {
            Some(tag) => ParsedCommand::BleSpam(tag),
            None => ParsedCommand::Invalid("Invalid tag"),
        },
        "SET_FREQ" => match arg.and_then(parse_freq) {
            Some(v) => ParsedCommand::SetFreq(v),
            None => ParsedCommand::Invalid("Invalid frequency"),
        },
        "RX_RECORD" => ParsedCommand::RxRecord,
        "TX_REPLAY" => ParsedCommand::TxReplay,
        "NFC_SCAN" => ParsedCommand::NfcScan,
        "NFC_EMULATE" => ParsedCommand::NfcEmulate,
        "GET_INFO" => ParsedCommand::GetInfo,
        "RECON_START" => ParsedCommand::ReconStart,
        "RECON_STOP" => ParsedCommand::ReconStop,
        "CSI_START" => ParsedCommand::CsiStart,
        "CSI_STOP" => ParsedCommand::CsiStop,
        "ANALYZER_START" => ParsedCommand::AnalyzerStart,
        "ANALYZER_STOP" => ParsedCommand::AnalyzerStop,
        "SUBGHZ_BRUTE" => ParsedCommand::SubghzBrute,
        "STOP" => ParsedCommand::Stop,
        "SYS_RESET" => ParsedCommand::SysReset,
        "INPUT_UP" => ParsedCommand::InputUp,
        "INPUT_DOWN" => ParsedCommand::InputDown,
        "INPUT_SELECT" => ParsedCommand::InputSelect,
        "INPUT_BACK" => ParsedCommand::InputBack,
        _ => ParsedCommand::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_arg_verbs_parse() {
        assert_eq!(parse_command("SCAN_WIFI"), ParsedCommand::ScanWifi);
        assert_eq!(parse_command("STOP"), ParsedCommand::Stop);
        assert_eq!(parse_command("GET_INFO"), ParsedCommand::GetInfo);
    }

    #[test]
    fn unknown_verb() {
        assert_eq!(parse_command("FOO_BAR"), ParsedCommand::Unknown);
        assert_eq!(parse_command(""), ParsedCommand::Unknown);
    }

    #[test]
    fn sniff_start_hop_when_no_arg() {
        assert_eq!(parse_command("SNIFF_START"), ParsedCommand::SniffStart(0));
    }

    #[test]
    fn sniff_start_explicit_channel() {
        assert_eq!(parse_command("SNIFF_START:6"), ParsedCommand::SniffStart(6));
    }

    #[test]
    fn sniff_start_bad_channel_is_invalid() {
        assert_eq!(
            parse_command("SNIFF_START:99"),
            ParsedCommand::Invalid("Invalid channel")
        );
        assert_eq!(
            parse_command("SNIFF_START:abc"),
            ParsedCommand::Invalid("Invalid channel")
        );
    }

    #[test]
    fn deauth_ap_only() {
        match parse_command("DEAUTH:AA:BB:CC:DD:EE:FF") {
            ParsedCommand::Deauth { ap, channel } => {
                assert_eq!(ap, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
                assert_eq!(channel, None);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn deauth_with_channel() {
        match parse_command("DEAUTH:AA:BB:CC:DD:EE:FF:11") {
            ParsedCommand::Deauth { ap, channel } => {
                assert_eq!(ap, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
                assert_eq!(channel, Some(11));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn deauth_short_mac_is_invalid() {
        assert_eq!(
            parse_command("DEAUTH:AA:BB:CC"),
            ParsedCommand::Invalid("Invalid MAC format")
        );
        assert_eq!(
            parse_command("DEAUTH"),
            ParsedCommand::Invalid("Invalid MAC format")
        );
    }

    #[test]
    fn ble_spam_tags() {
        assert_eq!(
            parse_command("BLE_SPAM:SAMSUNG"),
            ParsedCommand::BleSpam(BleSpamTag::Samsung)
        );
        assert_eq!(
            parse_command("BLE_SPAM:NOPE"),
            ParsedCommand::Invalid("Invalid tag")
        );
    }

    #[test]
    fn set_freq_valid_and_boundary() {
        match parse_command("SET_FREQ:433.92") {
            ParsedCommand::SetFreq(v) => assert!((v - 433.92).abs() < 0.001),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            parse_command("SET_FREQ:299.9"),
            ParsedCommand::Invalid("Invalid frequency")
        );
        assert_eq!(
            parse_command("SET_FREQ:950.0"),
            ParsedCommand::Invalid("Invalid frequency")
        );
        // upper bound is inclusive
        match parse_command("SET_FREQ:928.0") {
            ParsedCommand::SetFreq(v) => assert!((v - 928.0).abs() < 0.001),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
