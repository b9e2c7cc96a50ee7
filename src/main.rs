//! Pocket pentest-core firmware binary.
//!
//! Brings up the three radios and the serial transport, then runs the
//! engines behind the library's capability traits. Task layout and startup
//! order (`serial -> supervisor -> wifi -> ble -> subghz -> gui`) follow the
//! reference firmware's `main.rs` task-per-concern convention.

#![no_std]
#![no_main]

extern crate alloc;

use esp_backtrace as _;

esp_bootloader_esp_idf::esp_app_desc!();

pub(crate) use pentest_core::{ble, board, diag, error, protocol, router, serial, sinks, status, subghz, supervisor, wifi};

use core::cell::{Cell, RefCell};
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_sync::mutex::Mutex as AsyncMutex;
use embassy_time::{Duration, Instant, Timer};
use esp_hal::delay::Delay;
use esp_hal::interrupt::software::SoftwareInterruptControl;
use esp_hal::timer::timg::TimerGroup;
use static_cell::StaticCell;

use trouble_host::prelude::*;

use diag::Diagnostics;
use error::{CoreError, CoreResult};
use protocol::{format_mac, DeviceMessage, MsgBuffer, VERSION};
use router::ParsedCommand;
use serial::{Egress, IngressEvent, LineFramer, SerialPort};
use status::MinHeapTracker;
use supervisor::{RadioState, Supervisor};
use wifi::deauth::{self, DeauthRadio, RadioSnapshot};
use wifi::scan::{RawScanEntry, WifiRadio};
use wifi::sniffer::{Sniffer, SnifferEvent};

// ── Channel type aliases ──────────────────────────────────────────────

type OutputChannel = Channel<CriticalSectionRawMutex, MsgBuffer, 12>;
type CommandChannel = Channel<CriticalSectionRawMutex, ParsedCommand, 4>;
type FrameChannel = Channel<CriticalSectionRawMutex, CapturedFrame, 16>;
type AdvChannel = Channel<CriticalSectionRawMutex, ble::RawAdvReport, 32>;

const RECORD_CAPACITY: usize = 32 * 1024;

/// A raw 802.11 frame captured by the sniffer ISR, copied off the radio's
/// own buffer so the callback can return immediately.
struct CapturedFrame {
    bytes: heapless::Vec<u8, 400>,
    rssi: i8,
    channel: u8,
}

// ── Static channels and shared state ───────────────────────────────────

static OUTPUT_CHANNEL: OutputChannel = Channel::new();
static CMD_CHANNEL: CommandChannel = Channel::new();
static FRAME_CHANNEL: FrameChannel = Channel::new();
static ADV_CHANNEL: AdvChannel = Channel::new();

static DIAG: Diagnostics = Diagnostics::new();

static SUPERVISOR: Mutex<RefCell<Supervisor>> = Mutex::new(RefCell::new(Supervisor::new()));
static SNIFFER: Mutex<RefCell<Sniffer>> = Mutex::new(RefCell::new(Sniffer::new()));
static MIN_HEAP: Mutex<RefCell<Option<MinHeapTracker>>> = Mutex::new(RefCell::new(None));
static LAST_RSSI: Mutex<Cell<i8>> = Mutex::new(Cell::new(-100));

static HOP_ENABLED: AtomicBool = AtomicBool::new(false);
static HOP_STEP: AtomicU32 = AtomicU32::new(0);
static CURRENT_CHANNEL: AtomicU32 = AtomicU32::new(1);
static DEAUTH_SEQ: AtomicU32 = AtomicU32::new(0);

static BLE_SCANNING: AtomicBool = AtomicBool::new(false);
static BLE_INITIALIZED: AtomicBool = AtomicBool::new(false);
static BLE_SYNCED: AtomicBool = AtomicBool::new(false);

/// One spam-burst request: a background task owns the `Peripheral` and does
/// the actual async advertise; the sync `BleController::start_advertising`
/// only has to hand off the payload and wait for the ack.
type SpamChannel = Channel<CriticalSectionRawMutex, heapless::Vec<u8, 32>, 1>;
type SpamAckChannel = Channel<CriticalSectionRawMutex, (), 1>;
static SPAM_CHANNEL: SpamChannel = Channel::new();
static SPAM_ACK: SpamAckChannel = Channel::new();

static RECORD_ACTIVE: AtomicBool = AtomicBool::new(false);
static RUN_SUBGHZ_WORKER: AtomicBool = AtomicBool::new(false);
static LAST_CAPTURE: Mutex<RefCell<heapless::Vec<u8, RECORD_CAPACITY>>> =
    Mutex::new(RefCell::new(heapless::Vec::new()));
static RECORD_SESSION: Mutex<RefCell<Option<subghz::RecordSession<RECORD_CAPACITY>>>> =
    Mutex::new(RefCell::new(None));

/// Live `WifiController` handle, stored so `SCAN_WIFI` can drive a real
/// active scan. Async because the scan call itself is.
static WIFI_CONTROLLER: AsyncMutex<CriticalSectionRawMutex, Option<esp_radio::wifi::WifiController<'static>>> =
    AsyncMutex::new(None);

/// Raw sniffer handle, promoted out of `main()`'s local scope so
/// `dispatch_command` can borrow it to inject deauth frames.
static SNIFFER_HW: Mutex<RefCell<Option<esp_radio::wifi::sniffer::Sniffer<'static>>>> =
    Mutex::new(RefCell::new(None));
static OWN_MAC: Mutex<Cell<[u8; 6]>> = Mutex::new(Cell::new([0u8; 6]));

/// Burst size for `DEAUTH`; the wire command carries no count, so this is
/// this crate's chosen default (§4.4).
const DEAUTH_BURST_COUNT: u16 = 50;

/// Live CC1101 handle, brought up over SPI2 in `main()`.
type Cc1101Instance = Cc1101<esp_hal::spi::master::Spi<'static, esp_hal::Blocking>, esp_hal::gpio::Output<'static>>;
static SUBGHZ: Mutex<RefCell<Option<Cc1101Instance>>> = Mutex::new(RefCell::new(None));

/// Poll budget for `subghz::replay`'s per-chunk MARCSTATE wait, at ~1 poll/ms
/// (500 corresponds to the spec's 500 ms replay timeout).
const REPLAY_POLL_BUDGET: u32 = 500;

fn push_output(msg: &DeviceMessage) {
    let mut buf = MsgBuffer::new();
    buf.resize_default(protocol::MAX_MSG_LEN).ok();
    if let Some(len) = protocol::serialize_message(msg, &mut buf) {
        buf.truncate(len);
        if OUTPUT_CHANNEL.try_send(buf).is_err() {
            DIAG.note_line_dropped();
        }
    }
}

fn push_status(text: &str) {
    push_output(&DeviceMessage::Status { data: text });
}

fn push_error(text: &str) {
    push_output(&DeviceMessage::Error { data: text });
}

/// Close out whatever `RECORD_SESSION` holds (if anything) into
/// `LAST_CAPTURE`, whether it finished by filling its buffer or was cut
/// short by a `STOP` command.
fn finalize_record(cs: critical_section::CriticalSection) {
    let mut slot = RECORD_SESSION.borrow(cs).borrow_mut();
    if let Some(session) = slot.take() {
        let mut cap = LAST_CAPTURE.borrow(cs).borrow_mut();
        cap.clear();
        let _ = cap.extend_from_slice(session.captured());
    }
}

// ── Sub-GHz transceiver: CC1101-style register access over SPI ────────
//
// Register layout and the frequency/MARCSTATE/FIFO access pattern are
// grounded on the CC1101 reference drivers in the example pack (§4.6); the
// SPI transaction framing (address byte, R/W and burst bits) follows the
// same convention those drivers use, reimplemented against this crate's
// `SubGhzRadio` trait rather than vendored.

const REG_FREQ2: u8 = 0x0D;
const REG_FREQ1: u8 = 0x0E;
const REG_FREQ0: u8 = 0x0F;
const REG_MARCSTATE: u8 = 0x35;
const REG_RSSI: u8 = 0x34;
const STROBE_SCAL: u8 = 0x33;
const FIFO_ADDR: u8 = 0x3F;
const READ_BIT: u8 = 0x80;
const BURST_BIT: u8 = 0x40;

struct Cc1101<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> Cc1101<SPI, CS>
where
    SPI: embedded_hal::spi::SpiBus<u8>,
    CS: embedded_hal::digital::OutputPin,
{
    fn write_reg(&mut self, addr: u8, value: u8) {
        let _ = self.cs.set_low();
        let _ = self.spi.write(&[addr, value]);
        let _ = self.cs.set_high();
    }

    fn read_reg(&mut self, addr: u8) -> u8 {
        let mut buf = [addr | READ_BIT, 0];
        let _ = self.cs.set_low();
        let _ = self.spi.transfer_in_place(&mut buf);
        let _ = self.cs.set_high();
        buf[1]
    }

    fn strobe(&mut self, cmd: u8) {
        let _ = self.cs.set_low();
        let _ = self.spi.write(&[cmd]);
        let _ = self.cs.set_high();
    }
}

impl<SPI, CS> subghz::SubGhzRadio for Cc1101<SPI, CS>
where
    SPI: embedded_hal::spi::SpiBus<u8>,
    CS: embedded_hal::digital::OutputPin,
{
    fn set_freq_word(&mut self, word: u32) {
        self.write_reg(REG_FREQ2, ((word >> 16) & 0xFF) as u8);
        self.write_reg(REG_FREQ1, ((word >> 8) & 0xFF) as u8);
        self.write_reg(REG_FREQ0, (word & 0xFF) as u8);
    }

    fn strobe_calibrate(&mut self) {
        self.strobe(STROBE_SCAL);
    }

    fn rx_fifo_len(&mut self) -> usize {
        (self.read_reg(0x3B | READ_BIT) & 0x7F) as usize
    }

    fn read_fifo(&mut self, out: &mut [u8]) -> usize {
        let addr = FIFO_ADDR | READ_BIT | BURST_BIT;
        let _ = self.cs.set_low();
        let _ = self.spi.write(&[addr]);
        let _ = self.spi.transfer_in_place(out);
        let _ = self.cs.set_high();
        out.len()
    }

    fn tx_burst(&mut self, chunk: &[u8]) {
        let addr = FIFO_ADDR | BURST_BIT;
        let _ = self.cs.set_low();
        let _ = self.spi.write(&[addr]);
        let _ = self.spi.write(chunk);
        let _ = self.cs.set_high();
    }

    fn read_marcstate(&mut self) -> u8 {
        self.read_reg(REG_MARCSTATE) & 0x1F
    }

    fn read_rssi(&mut self) -> i8 {
        self.read_reg(REG_RSSI) as i8
    }
}

// ── WiFi active scan: wraps a completed esp-radio scan result set ──────

struct CollectedWifiScan<'a> {
    results: &'a [esp_radio::wifi::AccessPointInfo],
    idx: usize,
}

fn map_auth(mode: esp_radio::wifi::AuthMethod) -> protocol::AuthMode {
    use esp_radio::wifi::AuthMethod::*;
    match mode {
        None => protocol::AuthMode::Open,
        Wep => protocol::AuthMode::Wep,
        Wpa => protocol::AuthMode::Wpa,
        Wpa2Personal | WpaWpa2Personal => protocol::AuthMode::Wpa2Psk,
        Wpa2Enterprise => protocol::AuthMode::Wpa2Ent,
        Wpa3Personal | Wpa2Wpa3Personal => protocol::AuthMode::Wpa3,
        _ => protocol::AuthMode::Open,
    }
}

impl<'a> WifiRadio for CollectedWifiScan<'a> {
    fn scan_next(&mut self) -> Option<RawScanEntry> {
        let ap = self.results.get(self.idx)?;
        self.idx += 1;
        let mut ssid = heapless::Vec::new();
        let _ = ssid.extend_from_slice(ap.ssid.as_bytes());
        Some(RawScanEntry {
            ssid,
            bssid: ap.bssid,
            rssi: ap.signal_strength,
            channel: ap.channel,
            auth: map_auth(ap.auth_method.unwrap_or(esp_radio::wifi::AuthMethod::None)),
        })
    }
}

// ── Deauth radio adapter over the sniffer's raw-TX primitive ──────────

struct SnifferDeauthRadio<'a> {
    sniffer: &'a mut esp_radio::wifi::sniffer::Sniffer<'a>,
    own_mac: [u8; 6],
}

impl<'a> DeauthRadio for SnifferDeauthRadio<'a> {
    fn snapshot(&self) -> RadioSnapshot {
        RadioSnapshot {
            promiscuous: true,
            hopping: HOP_ENABLED.load(Ordering::Relaxed),
            own_mac: self.own_mac,
        }
    }

    fn set_hopping(&mut self, enabled: bool) {
        HOP_ENABLED.store(enabled, Ordering::Relaxed);
    }

    fn set_promiscuous(&mut self, enabled: bool) {
        let _ = self.sniffer.set_promiscuous_mode(enabled);
    }

    fn stop_radio(&mut self) {}

    fn start_ap_mode(&mut self, mac: [u8; 6], channel: u8) {
        self.own_mac = mac;
        unsafe {
            esp_wifi_set_channel(channel, 0);
        }
    }

    fn set_power_save(&mut self, _enabled: bool) {}

    fn inject_raw(&mut self, frame: &[u8]) -> CoreResult<()> {
        self.sniffer
            .send_raw_frame(frame, false)
            .map_err(|_| CoreError::HardwareError)
    }

    fn restore(&mut self, snapshot: RadioSnapshot, channel: u8) {
        self.own_mac = snapshot.own_mac;
        let _ = self.sniffer.set_promiscuous_mode(snapshot.promiscuous);
        HOP_ENABLED.store(snapshot.hopping, Ordering::Relaxed);
        CURRENT_CHANNEL.store(channel as u32, Ordering::Relaxed);
    }
}

// ── BLE controller adapter ──────────────────────────────────────────────
//
// Scanning is "always armed, gated by BLE_SCANNING": the background runner
// forwards adverts into ADV_CHANNEL whenever the gate is open. `scan_start`
// (the host-testable engine function) just drains whatever has queued by
// the time it is called; the command handler opens the gate, sleeps for
// the scan window, closes it, then calls `scan_start` to harvest the batch.

/// `BleController` adapter used by `dispatch_command`. Scanning is
/// drained straight from `ADV_CHANNEL` (fed by the always-on background
/// scan handler); advertising hands the payload to `ble_spam_task` over
/// `SPAM_CHANNEL` and blocks on the ack so the engine's burst/sleep cadence
/// (§4.5: 50 ms advertise, 40 ms settle) is still observed by the caller.
struct HostBleController {
    delay: Delay,
}

impl ble::BleController for HostBleController {
    fn is_initialized(&self) -> bool {
        BLE_INITIALIZED.load(Ordering::Relaxed)
    }

    fn is_synced(&self) -> bool {
        BLE_SYNCED.load(Ordering::Relaxed)
    }

    fn start_scan(&mut self) {
        BLE_SCANNING.store(true, Ordering::Relaxed);
    }

    fn stop_scan(&mut self) {
        BLE_SCANNING.store(false, Ordering::Relaxed);
    }

    fn next_report(&mut self) -> Option<ble::RawAdvReport> {
        ADV_CHANNEL.try_receive().ok()
    }

    fn start_advertising(&mut self, payload: &[u8]) {
        let mut buf = heapless::Vec::new();
        let _ = buf.extend_from_slice(payload);
        if SPAM_CHANNEL.try_send(buf).is_err() {
            return;
        }
        // Busy-wait for the background task's ack; bounded by the task's
        // own 50 ms advertise window so this never spins long.
        while SPAM_ACK.try_receive().is_err() {
            self.delay.delay_millis(1);
        }
    }

    fn stop_advertising(&mut self) {
        self.delay.delay_millis(40);
    }
}

/// Owns the live `Peripheral` handle and performs the actual async
/// advertise burst whenever a payload arrives on `SPAM_CHANNEL`.
#[embassy_executor::task]
async fn ble_spam_task(
    mut peripheral: Peripheral<'static, ExternalController<esp_radio::ble::controller::BleConnector<'static>, 20>, DefaultPacketPool>,
) {
    let rx = SPAM_CHANNEL.receiver();
    loop {
        let payload = rx.receive().await;
        let mut adv_data = [0u8; 31];
        let Ok(len) = AdStructure::encode_slice(
            &[
                AdStructure::Flags(LE_GENERAL_DISCOVERABLE | BR_EDR_NOT_SUPPORTED),
                AdStructure::ManufacturerSpecificData {
                    company_identifier: u16::from_le_bytes([payload[0], payload[1]]),
                    payload: &payload[2..],
                },
            ],
            &mut adv_data[..],
        ) else {
            SPAM_ACK.send(()).await;
            continue;
        };
        match peripheral
            .advertise(
                &Default::default(),
                Advertisement::NonconnectableNonscannableUndirected {
                    adv_data: &adv_data[..len],
                },
            )
            .await
        {
            Ok(advertiser) => {
                // Hold the handle alive for the burst window; advertising
                // tears down as soon as it drops.
                Timer::after(Duration::from_millis(50)).await;
                drop(advertiser);
            }
            Err(e) => {
                log::warn!("BLE spam advertise error: {:?}", e);
            }
        }
        SPAM_ACK.send(()).await;
    }
}

// ── WiFi sniffer ISR callback ───────────────────────────────────────────

fn wifi_sniffer_callback(pkt: esp_radio::wifi::sniffer::PromiscuousPkt<'_>) {
    let rssi = pkt.rx_cntl.rssi as i8;
    let channel = pkt.rx_cntl.channel as u8;
    let mut bytes = heapless::Vec::new();
    let n = pkt.data.len().min(bytes.capacity());
    let _ = bytes.extend_from_slice(&pkt.data[..n]);
    let _ = FRAME_CHANNEL.try_send(CapturedFrame { bytes, rssi, channel });
}

unsafe extern "C" {
    fn esp_wifi_set_channel(primary: u8, second: u32) -> i32;
}

// ── Tasks ────────────────────────────────────────────────────────────

#[embassy_executor::task]
async fn wifi_channel_hop_task() {
    loop {
        if HOP_ENABLED.load(Ordering::Relaxed) {
            let step = HOP_STEP.fetch_add(1, Ordering::Relaxed);
            let ch = supervisor::next_channel(step);
            CURRENT_CHANNEL.store(ch as u32, Ordering::Relaxed);
            unsafe {
                esp_wifi_set_channel(ch, 0);
            }
            Timer::after(Duration::from_millis(250)).await;
        } else {
            Timer::after(Duration::from_millis(50)).await;
        }
    }
}

/// Drives whichever sub-GHz mode `Supervisor::state()` currently reports:
/// polls a recording session, samples RSSI for the analyzer, or steps the
/// brute-force code sweep (§4.6). One task covers all three since
/// `RadioState` already distinguishes them.
#[embassy_executor::task]
async fn subghz_worker_task() {
    let mut brute_code: u16 = 0;
    loop {
        let state = critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow().state());
        match state {
            RadioState::SubghzRecord if RECORD_ACTIVE.load(Ordering::Relaxed) => {
                let finished = critical_section::with(|cs| {
                    let mut session_slot = RECORD_SESSION.borrow(cs).borrow_mut();
                    let mut radio_slot = SUBGHZ.borrow(cs).borrow_mut();
                    let mut finished = false;
                    if let (Some(session), Some(radio)) = (session_slot.as_mut(), radio_slot.as_mut()) {
                        session.poll(radio);
                        finished = !session.is_active();
                    }
                    finished
                });
                if finished {
                    critical_section::with(finalize_record);
                    RECORD_ACTIVE.store(false, Ordering::Relaxed);
                }
                Timer::after(Duration::from_millis(1)).await;
            }
            RadioState::SubghzAnalyze if RUN_SUBGHZ_WORKER.load(Ordering::Relaxed) => {
                let sample = critical_section::with(|cs| {
                    SUBGHZ
                        .borrow(cs)
                        .borrow_mut()
                        .as_mut()
                        .map(|radio| subghz::analyzer_sample(radio))
                });
                if let Some(rssi) = sample {
                    push_output(&DeviceMessage::AnalyzerData { rssi });
                }
                Timer::after(Duration::from_millis(50)).await;
            }
            RadioState::SubghzBrute if RUN_SUBGHZ_WORKER.load(Ordering::Relaxed) => {
                let progress = critical_section::with(|cs| {
                    SUBGHZ
                        .borrow(cs)
                        .borrow_mut()
                        .as_mut()
                        .and_then(|radio| subghz::brute_step(radio, brute_code))
                });
                brute_code = brute_code.wrapping_add(1);
                if let Some((current, total)) = progress {
                    push_output(&DeviceMessage::BruteProgress { current, total });
                    if current == total {
                        RUN_SUBGHZ_WORKER.store(false, Ordering::Relaxed);
                        critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
                        brute_code = 0;
                        push_status("complete");
                    }
                }
                Timer::after(Duration::from_millis(2)).await;
            }
            _ => Timer::after(Duration::from_millis(20)).await,
        }
    }
}

#[embassy_executor::task]
async fn frame_dispatch_task() {
    let rx = FRAME_CHANNEL.receiver();
    loop {
        let frame = rx.receive().await;
        critical_section::with(|cs| LAST_RSSI.borrow(cs).set(frame.rssi));
        let now_ms = (Instant::now().as_millis() & 0xFFFF_FFFF) as u32;

        let events: heapless::Vec<SnifferEvent, 4> = critical_section::with(|cs| {
            SNIFFER
                .borrow(cs)
                .borrow_mut()
                .on_frame(&frame.bytes, frame.rssi, frame.channel, now_ms)
        });

        for event in events {
            emit_sniffer_event(event, frame.channel, frame.rssi, now_ms);
        }
    }
}

fn emit_sniffer_event(event: SnifferEvent, channel: u8, rssi: i8, now_ms: u32) {
    match event {
        SnifferEvent::Pulse { val, ch } => push_output(&DeviceMessage::Pulse { val, ch }),
        SnifferEvent::SniffStats { count, m1, m2, complete } => {
            push_output(&DeviceMessage::SniffStats { count, m1, m2, complete })
        }
        SnifferEvent::ClientProbe { mac, ssid, rssi: r } => {
            let mut mac_str = protocol::MacString::new();
            format_mac(&mac, &mut mac_str);
            push_output(&DeviceMessage::ClientProbe {
                mac: &mac_str,
                ssid: &ssid,
                rssi: r,
            });
        }
        SnifferEvent::Recon { ssid, bssid, rssi: r, channel: c } => {
            let mut bssid_str = protocol::MacString::new();
            format_mac(&bssid, &mut bssid_str);
            push_output(&DeviceMessage::Recon {
                ssid: &ssid,
                bssid: &bssid_str,
                rssi: r,
                channel: c,
            });
        }
        SnifferEvent::Handshake(hs) => {
            let mut bssid_str = protocol::MacString::new();
            format_mac(&hs.bssid, &mut bssid_str);
            let mut sta_str = protocol::MacString::new();
            format_mac(&hs.sta, &mut sta_str);

            let mut anonce_buf = [0u8; 64];
            let anonce = protocol::hex_encode_uppercase(&hs.anonce, &mut anonce_buf);
            let mut snonce_buf = [0u8; 64];
            let snonce = protocol::hex_encode_uppercase(&hs.snonce, &mut snonce_buf);
            let mut mic_buf = [0u8; 32];
            let mic = protocol::hex_encode_uppercase(&hs.mic, &mut mic_buf);
            let mut replay_buf = [0u8; 16];
            let replay_counter = protocol::hex_encode_uppercase(&hs.replay_counter, &mut replay_buf);
            let mut eapol_buf = [0u8; 512];
            let eapol_frame = protocol::hex_encode_uppercase(&hs.eapol_frame, &mut eapol_buf);

            push_output(&DeviceMessage::WifiHandshake {
                bssid: &bssid_str,
                sta_mac: &sta_str,
                ch: hs.channel,
                rssi: hs.rssi,
                anonce,
                snonce,
                mic,
                replay_counter,
                key_desc_type: hs.desc_type,
                key_desc_version: hs.desc_version,
                eapol_frame,
                eapol_len: hs.eapol_frame.len(),
                timestamp: hs.timestamp_ms,
            });
        }
        SnifferEvent::CsiHeartbeat { count } => push_output(&DeviceMessage::CsiHeartbeat { count }),
    }
    let _ = (channel, rssi, now_ms);
}

#[embassy_executor::task]
async fn status_task(chip: &'static str) {
    loop {
        Timer::after(Duration::from_secs(5)).await;
        let free_heap = esp_alloc::HEAP.free() as u32;
        let last_rssi = critical_section::with(|cs| LAST_RSSI.borrow(cs).get());

        let msg = critical_section::with(|cs| {
            let mut tracker_cell = MIN_HEAP.borrow(cs).borrow_mut();
            let tracker = tracker_cell.get_or_insert_with(|| MinHeapTracker::new(free_heap));
            status::build_sys_status(free_heap, tracker, last_rssi)
        });
        push_output(&msg);
        let _ = (chip, VERSION);
    }
}

#[embassy_executor::task]
async fn egress_task(port: impl SerialPort + 'static) {
    let egress = Egress::new(port);
    let rx = OUTPUT_CHANNEL.receiver();
    loop {
        let msg = rx.receive().await;
        egress.send_line(&msg, &DIAG).await;
    }
}

#[embassy_executor::task]
async fn ingress_task(mut port: impl IngressPort + 'static) {
    let mut framer = LineFramer::new();
    loop {
        let Some(byte) = port.read_byte().await else {
            continue;
        };
        match framer.feed(byte) {
            Some(IngressEvent::Line(line)) => {
                if let Ok(text) = core::str::from_utf8(line) {
                    let cmd = router::parse_command(text);
                    let _ = CMD_CHANNEL.try_send(cmd);
                }
            }
            Some(IngressEvent::Overflow) => {
                DIAG.note_ingress_overflow();
                push_error("Ingress buffer overflow");
            }
            None => {}
        }
    }
}

/// Byte-at-a-time ingress source the platform provides (UART RX or
/// USB-CDC/JTAG, chosen at init per §6).
trait IngressPort {
    async fn read_byte(&mut self) -> Option<u8>;
}

/// `SerialPort` over the board's UART0 TX half, 115200 8N1 (§6).
struct UartSerialPort {
    tx: esp_hal::uart::UartTx<'static, esp_hal::Blocking>,
}

impl SerialPort for UartSerialPort {
    fn write_all(&mut self, bytes: &[u8]) -> CoreResult<()> {
        self.tx
            .write_bytes(bytes)
            .map(|_| ())
            .map_err(|_| CoreError::HardwareError)
    }
}

/// `IngressPort` over the board's UART0 RX half, one byte at a time.
struct UartIngressPort {
    rx: esp_hal::uart::UartRx<'static, esp_hal::Async>,
}

impl IngressPort for UartIngressPort {
    async fn read_byte(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        self.rx.read_async(&mut byte).await.ok()?;
        Some(byte[0])
    }
}

#[embassy_executor::task]
async fn command_task(peripherals_present: board::Peripherals) {
    let rx = CMD_CHANNEL.receiver();
    loop {
        let cmd = rx.receive().await;
        dispatch_command(cmd, peripherals_present).await;
    }
}

async fn dispatch_command(cmd: ParsedCommand, peripherals: board::Peripherals) {
    match cmd {
        ParsedCommand::ScanWifi => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::WifiScan)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            push_status("started");
            const MAX_SCAN_APS: usize = 32;
            let scanned = {
                let mut guard = WIFI_CONTROLLER.lock().await;
                match guard.as_mut() {
                    Some(controller) => controller
                        .scan_with_config_async::<MAX_SCAN_APS>(Default::default())
                        .await
                        .ok()
                        .map(|(results, _count)| results),
                    None => None,
                }
            };
            let results: heapless::Vec<esp_radio::wifi::AccessPointInfo, MAX_SCAN_APS> =
                scanned.unwrap_or_default();
            let mut radio = CollectedWifiScan { results: &results, idx: 0 };
            let batch = wifi::scan::scan_start(&mut radio, &DIAG);
            push_output(&DeviceMessage::WifiScanResult {
                count: batch.networks.len(),
                networks: &batch.networks,
            });
            critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
            push_status("complete");
        }
        ParsedCommand::ScanBle => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::BleScan)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            push_status("started");
            BLE_SCANNING.store(true, Ordering::Relaxed);
            Timer::after(Duration::from_secs(5)).await;
            BLE_SCANNING.store(false, Ordering::Relaxed);

            // `scan_start` drains whatever the background runner queued
            // into ADV_CHANNEL during the window above.
            struct DrainOnly;
            impl ble::BleController for DrainOnly {
                fn is_initialized(&self) -> bool {
                    BLE_INITIALIZED.load(Ordering::Relaxed)
                }
                fn is_synced(&self) -> bool {
                    BLE_SYNCED.load(Ordering::Relaxed)
                }
                fn start_scan(&mut self) {}
                fn stop_scan(&mut self) {}
                fn next_report(&mut self) -> Option<ble::RawAdvReport> {
                    ADV_CHANNEL.try_receive().ok()
                }
                fn start_advertising(&mut self, _payload: &[u8]) {}
                fn stop_advertising(&mut self) {}
            }
            let mut radio = DrainOnly;
            match ble::scan_start(&mut radio, &DIAG) {
                Ok(batch) => push_output(&DeviceMessage::BleScanResult {
                    count: batch.devices.len(),
                    devices: &batch.devices,
                }),
                Err(e) => push_error(error_to_str(e)),
            }
            critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
            push_status("complete");
        }
        ParsedCommand::SniffStart(ch) => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::WifiSniff)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            if ch == 0 {
                HOP_ENABLED.store(true, Ordering::Relaxed);
            } else {
                HOP_ENABLED.store(false, Ordering::Relaxed);
                CURRENT_CHANNEL.store(ch as u32, Ordering::Relaxed);
                unsafe {
                    esp_wifi_set_channel(ch, 0);
                }
            }
            push_status("started");
        }
        ParsedCommand::SniffStop => {
            HOP_ENABLED.store(false, Ordering::Relaxed);
            critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
            push_status("stopped");
        }
        ParsedCommand::Deauth { ap, channel } => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR
                    .borrow(cs)
                    .borrow_mut()
                    .try_transition(RadioState::WifiDeauthBurst)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            push_status("started");
            let ch = channel.unwrap_or(CURRENT_CHANNEL.load(Ordering::Relaxed) as u8);
            let seq = DEAUTH_SEQ.load(Ordering::Relaxed) as u16;
            let outcome = critical_section::with(|cs| {
                let mut sniffer_slot = SNIFFER_HW.borrow(cs).borrow_mut();
                let own_mac = OWN_MAC.borrow(cs).get();
                sniffer_slot.as_mut().map(|sniffer| {
                    let mut radio = SnifferDeauthRadio { sniffer, own_mac };
                    deauth::send_deauth_burst(&mut radio, None, ap, ch, seq, DEAUTH_BURST_COUNT)
                })
            });
            critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
            match outcome {
                Some((result, next_seq)) => {
                    DEAUTH_SEQ.store(next_seq as u32, Ordering::Relaxed);
                    push_output(&DeviceMessage::DeauthResult {
                        success: result.success,
                        channel: result.channel,
                    });
                }
                None => push_output(&DeviceMessage::DeauthResult { success: false, channel: ch }),
            }
        }
        ParsedCommand::BleSpam(tag) => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::BleSpam)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            push_status("started");
            let mut radio = HostBleController { delay: Delay::new() };
            match ble::spam_start(&mut radio, tag, ble::SPAM_DEFAULT_COUNT) {
                Ok(_) => push_status("complete"),
                Err(e) => push_error(error_to_str(e)),
            }
            critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
        }
        ParsedCommand::SetFreq(mhz) => {
            push_status("started");
            let result = critical_section::with(|cs| {
                let mut radio_slot = SUBGHZ.borrow(cs).borrow_mut();
                match radio_slot.as_mut() {
                    Some(radio) => subghz::set_frequency(radio, mhz),
                    None => Err(CoreError::HardwareError),
                }
            });
            match result {
                Ok(()) => push_status("complete"),
                Err(e) => push_error(error_to_str(e)),
            }
        }
        ParsedCommand::RxRecord => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::SubghzRecord)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            critical_section::with(|cs| {
                *RECORD_SESSION.borrow(cs).borrow_mut() = Some(subghz::RecordSession::new());
            });
            RECORD_ACTIVE.store(true, Ordering::Relaxed);
            push_status("started");
        }
        ParsedCommand::TxReplay => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::SubghzTx)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            push_status("started");
            let captured: heapless::Vec<u8, RECORD_CAPACITY> =
                critical_section::with(|cs| LAST_CAPTURE.borrow(cs).borrow().clone());
            if captured.is_empty() {
                push_error("nothing recorded");
            } else {
                let result = critical_section::with(|cs| {
                    let mut radio_slot = SUBGHZ.borrow(cs).borrow_mut();
                    match radio_slot.as_mut() {
                        Some(radio) => subghz::replay(radio, &captured, REPLAY_POLL_BUDGET),
                        None => Err(CoreError::HardwareError),
                    }
                });
                match result {
                    Ok(()) => push_status("Replay complete"),
                    Err(e) => push_error(error_to_str(e)),
                }
            }
            critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
        }
        ParsedCommand::NfcScan | ParsedCommand::NfcEmulate => {
            push_error("NFC not available");
        }
        ParsedCommand::GetInfo => {
            let free_heap = esp_alloc::HEAP.free() as u32;
            let msg = status::build_sys_info(board::BOARD_NAME, free_heap, &peripherals, &DIAG);
            push_output(&msg);
        }
        ParsedCommand::ReconStart => {
            critical_section::with(|cs| SNIFFER.borrow(cs).borrow_mut().recon_enabled = true);
            push_status("started");
        }
        ParsedCommand::ReconStop => {
            critical_section::with(|cs| SNIFFER.borrow(cs).borrow_mut().recon_enabled = false);
            push_status("stopped");
        }
        ParsedCommand::CsiStart => {
            critical_section::with(|cs| SNIFFER.borrow(cs).borrow_mut().csi_enabled = true);
            push_status("started");
        }
        ParsedCommand::CsiStop => {
            critical_section::with(|cs| SNIFFER.borrow(cs).borrow_mut().csi_enabled = false);
            push_status("stopped");
        }
        ParsedCommand::AnalyzerStart => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::SubghzAnalyze)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            RUN_SUBGHZ_WORKER.store(true, Ordering::Relaxed);
            push_status("started");
        }
        ParsedCommand::AnalyzerStop => {
            RUN_SUBGHZ_WORKER.store(false, Ordering::Relaxed);
            critical_section::with(|cs| SUPERVISOR.borrow(cs).borrow_mut().stop());
            push_status("stopped");
        }
        ParsedCommand::SubghzBrute => {
            let transitioned = critical_section::with(|cs| {
                SUPERVISOR.borrow(cs).borrow_mut().try_transition(RadioState::SubghzBrute)
            });
            if transitioned.is_err() {
                push_error("busy");
                return;
            }
            RUN_SUBGHZ_WORKER.store(true, Ordering::Relaxed);
            push_status("started");
        }
        ParsedCommand::Stop => {
            HOP_ENABLED.store(false, Ordering::Relaxed);
            RECORD_ACTIVE.store(false, Ordering::Relaxed);
            RUN_SUBGHZ_WORKER.store(false, Ordering::Relaxed);
            critical_section::with(|cs| {
                finalize_record(cs);
                SUPERVISOR.borrow(cs).borrow_mut().stop();
            });
            push_status("stopped");
        }
        ParsedCommand::SysReset => {
            push_status("Restarting");
            Timer::after(Duration::from_millis(200)).await;
            esp_hal::system::software_reset();
        }
        ParsedCommand::InputUp => forward_input(sinks::InputEvent::Up),
        ParsedCommand::InputDown => forward_input(sinks::InputEvent::Down),
        ParsedCommand::InputSelect => forward_input(sinks::InputEvent::Select),
        ParsedCommand::InputBack => forward_input(sinks::InputEvent::Back),
        ParsedCommand::Invalid(reason) => push_error(reason),
        ParsedCommand::Unknown => push_error("Unknown command"),
    }
}

fn forward_input(_event: sinks::InputEvent) {
    // The GUI collaborator is out of scope (§1); this crate's only
    // obligation is to acknowledge the command, which `command_task`
    // already does by not falling through to "Unknown command".
}

fn error_to_str(e: CoreError) -> &'static str {
    match e {
        CoreError::NotReady => "not ready",
        CoreError::Busy => "busy",
        CoreError::InvalidArgument => "invalid argument",
        CoreError::InvalidState => "invalid state",
        CoreError::Timeout => "timeout",
        CoreError::NotFound => "not found",
        CoreError::CapacityExceeded => "capacity exceeded",
        CoreError::HardwareError => "hardware error",
    }
}

// ── Entry point ──────────────────────────────────────────────────────

#[esp_rtos::main]
async fn main(spawner: embassy_executor::Spawner) {
    esp_println::logger::init_logger_from_env();

    let peripherals = esp_hal::init(esp_hal::Config::default());

    esp_alloc::heap_allocator!(size: 128 * 1024);

    let timg0 = TimerGroup::new(peripherals.TIMG0);
    let sw_int = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start(timg0.timer0, sw_int.software_interrupt0);

    log::info!("pentest-core v{} starting on {}", VERSION, board::BOARD_NAME);

    // Peripheral presence detection (CC1101 over SPI, NFC reader over I2C)
    // is a peripheral-driver concern (§1); the probe itself lives at the
    // hardware layer and only its outcome crosses into this crate.
    let detected = board::Peripherals::all_present();

    // ── Serial transport: UART0, 115200 8N1 (§6) ─────────────────────
    let uart_config = esp_hal::uart::Config::default().with_baudrate(115_200);
    let uart = esp_hal::uart::Uart::new(peripherals.UART0, uart_config)
        .expect("UART init failed")
        .with_tx(peripherals.GPIO43)
        .with_rx(peripherals.GPIO44)
        .into_async();
    let (uart_rx, uart_tx) = uart.split();

    spawner.spawn(status_task(board::BOARD_NAME)).unwrap();
    spawner.spawn(command_task(detected)).unwrap();
    spawner.spawn(frame_dispatch_task()).unwrap();
    spawner.spawn(wifi_channel_hop_task()).unwrap();
    spawner.spawn(subghz_worker_task()).unwrap();
    spawner
        .spawn(egress_task(UartSerialPort {
            tx: uart_tx.into_blocking(),
        }))
        .unwrap();
    spawner
        .spawn(ingress_task(UartIngressPort { rx: uart_rx }))
        .unwrap();

    // ── Sub-GHz transceiver: CC1101 over SPI2 ─────────────────────────
    if detected.cc1101 {
        let spi = esp_hal::spi::master::Spi::new(
            peripherals.SPI2,
            esp_hal::spi::master::Config::default().with_frequency(esp_hal::time::Rate::from_mhz(4)),
        )
        .expect("SPI2 init failed")
        .with_sck(peripherals.GPIO12)
        .with_mosi(peripherals.GPIO13)
        .with_miso(peripherals.GPIO11);
        let cs_pin = esp_hal::gpio::Output::new(
            peripherals.GPIO10,
            esp_hal::gpio::Level::High,
            esp_hal::gpio::OutputConfig::default(),
        );
        critical_section::with(|cs| {
            *SUBGHZ.borrow(cs).borrow_mut() = Some(Cc1101 { spi, cs: cs_pin });
        });
        log::info!("CC1101 sub-GHz transceiver initialized on SPI2");
    }

    log::info!(
        "diagnostics ready: lines_dropped/batches_truncated/ingress_overflows at {:?}",
        DIAG.snapshot()
    );

    // ── BLE radio initialization ─────────────────────────────────────
    // BLE before WiFi for coexistence, matching the reference firmware.

    let connector = esp_radio::ble::controller::BleConnector::new(peripherals.BT, Default::default())
        .expect("BLE connector init failed");
    log::info!("BLE connector initialized");

    // ── WiFi sniffer initialization ───────────────────────────────────

    let (wifi_controller, wifi_interfaces) =
        esp_radio::wifi::new(peripherals.WIFI, Default::default()).expect("WiFi init failed");
    {
        let mut guard = WIFI_CONTROLLER.lock().await;
        *guard = Some(wifi_controller);
    }

    let own_mac = esp_hal::efuse::Efuse::mac_address();
    critical_section::with(|cs| OWN_MAC.borrow(cs).set(own_mac));

    let mut sniffer = wifi_interfaces.sniffer;
    sniffer.set_receive_cb(wifi_sniffer_callback);
    sniffer.set_promiscuous_mode(true).expect("promiscuous mode failed");
    HOP_ENABLED.store(true, Ordering::Relaxed);
    critical_section::with(|cs| {
        *SNIFFER_HW.borrow(cs).borrow_mut() = Some(sniffer);
    });
    log::info!("WiFi sniffer initialized in promiscuous mode");

    let controller: ExternalController<_, 20> = ExternalController::new(connector);
    static HOST_RESOURCES: StaticCell<HostResources<DefaultPacketPool, 1, 2>> = StaticCell::new();
    let resources = HOST_RESOURCES.init(HostResources::new());
    let address = Address::random([0xfe, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
    let stack = trouble_host::new(controller, resources).set_random_address(address);
    let Host {
        peripheral,
        central,
        mut runner,
        ..
    } = stack.build();

    BLE_INITIALIZED.store(true, Ordering::Relaxed);
    log::info!("BLE radio initialized");

    spawner.spawn(ble_spam_task(peripheral)).unwrap();

    struct ScanEventHandler;
    impl EventHandler for ScanEventHandler {
        fn on_adv_reports(&self, mut it: LeAdvReportsIter<'_>) {
            if !BLE_SCANNING.load(Ordering::Relaxed) {
                return;
            }
            while let Some(Ok(report)) = it.next() {
                let Ok(addr): Result<[u8; 6], _> = report.addr.raw().try_into() else {
                    continue;
                };
                let mut ad_data = heapless::Vec::new();
                let n = report.data.len().min(ad_data.capacity());
                let _ = ad_data.extend_from_slice(&report.data[..n]);
                let _ = ADV_CHANNEL.try_send(ble::RawAdvReport {
                    addr,
                    rssi: report.rssi,
                    ad_data,
                });
            }
        }
    }
    let scan_handler = ScanEventHandler;

    let _ = embassy_futures::join::join(
        async {
            loop {
                if let Err(e) = runner.run_with_handler(&scan_handler).await {
                    log::error!("BLE runner error: {:?}", e);
                    Timer::after(Duration::from_secs(1)).await;
                }
            }
        },
        async {
            let mut scanner = trouble_host::scan::Scanner::new(central);
            let config = ScanConfig::default();
            let _session = match scanner.scan(&config).await {
                Ok(session) => {
                    BLE_SYNCED.store(true, Ordering::Relaxed);
                    session
                }
                Err(e) => {
                    log::error!("BLE scan failed to start: {:?}", e);
                    return;
                }
            };
            log::info!("BLE scan session up (advert forwarding gated by BLE_SCANNING)");
            loop {
                Timer::after(Duration::from_secs(60)).await;
            }
        },
    )
    .await;
}
