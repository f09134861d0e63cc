//! Shared test harness: a simulated I²C slave peripheral, an observable
//! attention pin, a scripted host-side bus master, and a recording
//! application.
#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};

use i2c_hid_device::application::Application;
use i2c_hid_device::buffer::{InReport, OutBuffer};
use i2c_hid_device::device::{Device, Link};
use i2c_hid_device::report::{
    HidProtocol, ProductInfo, ReportProtocol, ReportSelector, ReportType, Version,
};
use i2c_hid_device::slave::{Address, Direction, SlaveBus, SlaveModule, SlavePeripheral};

/// One DMA segment as the peripheral sees it
struct Segment {
    ptr: *mut u8,
    len: usize,
    remaining: usize,
}

impl Segment {
    fn cursor(&self) -> usize {
        self.len - self.remaining
    }
}

/// Simulated DMA-driven I²C slave peripheral. The host driver below moves
/// bytes one at a time, firing the completion events a real peripheral
/// would raise from interrupt context.
pub struct MockPeripheral {
    listening: Option<Address>,
    tx: Option<Segment>,
    rx: Option<Segment>,
    tx_dummy: bool,
    rx_nacked: bool,
    /// Filler bytes the master clocked out past the posted data
    pub dummy_reads: usize,
    /// Master writes discarded after a NACK
    pub dropped_writes: usize,
    /// NACKs issued
    pub nack_count: usize,
}

impl MockPeripheral {
    pub fn new() -> Self {
        Self {
            listening: None,
            tx: None,
            rx: None,
            tx_dummy: false,
            rx_nacked: false,
            dummy_reads: 0,
            dropped_writes: 0,
            nack_count: 0,
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listening.is_some()
    }

    fn tx_read(&mut self) -> Option<u8> {
        let seg = self.tx.as_mut()?;
        if seg.remaining == 0 {
            return None;
        }
        // SAFETY: the controller's contract keeps posted buffers valid
        // until stop; the driver only reads between callback invocations
        let byte = unsafe { *seg.ptr.add(seg.cursor()) };
        seg.remaining -= 1;
        Some(byte)
    }

    fn rx_write(&mut self, byte: u8) -> bool {
        let Some(seg) = self.rx.as_mut() else {
            return false;
        };
        if seg.remaining == 0 {
            return false;
        }
        // SAFETY: as in `tx_read`
        unsafe { *seg.ptr.add(seg.cursor()) = byte };
        seg.remaining -= 1;
        true
    }
}

impl SlavePeripheral for MockPeripheral {
    fn listen(&mut self, addr: Address) {
        self.listening = Some(addr);
        self.tx = None;
        self.rx = None;
        self.tx_dummy = false;
        self.rx_nacked = false;
    }

    fn stop_listen(&mut self) {
        self.listening = None;
    }

    unsafe fn submit_tx(&mut self, data: *const u8, len: usize) {
        self.tx = Some(Segment {
            ptr: data as *mut u8,
            len,
            remaining: len,
        });
        self.tx_dummy = false;
    }

    unsafe fn submit_rx(&mut self, data: *mut u8, len: usize) {
        self.rx = Some(Segment {
            ptr: data,
            len,
            remaining: len,
        });
        self.rx_nacked = false;
    }

    fn send_dummy(&mut self) {
        self.tx = None;
        self.tx_dummy = true;
    }

    fn nack(&mut self) {
        self.rx_nacked = true;
        self.nack_count += 1;
    }

    fn tx_remaining(&self) -> usize {
        self.tx.as_ref().map(|s| s.remaining).unwrap_or(0)
    }

    fn rx_remaining(&self) -> usize {
        self.rx.as_ref().map(|s| s.remaining).unwrap_or(0)
    }
}

/// Attention-line GPIO with an external probe
pub struct MockPin {
    level_low: Rc<Cell<bool>>,
}

/// Observer half of [`MockPin`]
pub struct PinProbe {
    level_low: Rc<Cell<bool>>,
}

impl PinProbe {
    /// The line is active low
    pub fn is_asserted(&self) -> bool {
        self.level_low.get()
    }
}

/// Create a pin and its probe
pub fn mock_pin() -> (MockPin, PinProbe) {
    let level_low = Rc::new(Cell::new(false));
    (
        MockPin {
            level_low: level_low.clone(),
        },
        PinProbe { level_low },
    )
}

impl ErrorType for MockPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for MockPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.level_low.set(true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.level_low.set(false);
        Ok(())
    }
}

pub type TestBus = SlaveBus<MockPeripheral, MockPin>;

// --- host-side driver -----------------------------------------------------

/// Master writes one byte, firing rx-complete when a segment fills
pub fn write_byte(bus: &mut TestBus, byte: u8) {
    loop {
        let p = bus.peripheral_mut();
        if p.rx_nacked {
            p.dropped_writes += 1;
            return;
        }
        if p.rx_write(byte) {
            return;
        }
        bus.handle_rx_complete();
    }
}

/// Master reads one byte, firing tx-complete when a segment drains
pub fn read_byte(bus: &mut TestBus) -> u8 {
    loop {
        if let Some(byte) = bus.peripheral_mut().tx_read() {
            return byte;
        }
        if bus.peripheral_mut().tx_dummy {
            bus.peripheral_mut().dummy_reads += 1;
            return 0x00;
        }
        bus.handle_tx_complete();
    }
}

/// START(write) followed by the payload bytes; no stop
pub fn start_write<M: SlaveModule>(bus: &mut TestBus, module: &mut M, bytes: &[u8]) {
    bus.handle_start(module, Direction::Write);
    for &b in bytes {
        write_byte(bus, b);
    }
}

/// START(read) (initial or repeated) followed by `n` byte reads; no stop
pub fn start_read<M: SlaveModule>(bus: &mut TestBus, module: &mut M, n: usize) -> Vec<u8> {
    bus.handle_start(module, Direction::Read);
    let mut data = heapless::Vec::<u8, 512>::new();
    for _ in 0..n {
        data.push(read_byte(bus)).unwrap();
    }
    data.as_slice().to_vec()
}

/// STOP
pub fn stop<M: SlaveModule>(bus: &mut TestBus, module: &mut M) {
    bus.handle_stop(module);
}

/// Complete write transaction
pub fn write_txn<M: SlaveModule>(bus: &mut TestBus, module: &mut M, bytes: &[u8]) {
    start_write(bus, module, bytes);
    stop(bus, module);
}

/// Complete read transaction (an input pull)
pub fn read_txn<M: SlaveModule>(bus: &mut TestBus, module: &mut M, n: usize) -> Vec<u8> {
    let data = start_read(bus, module, n);
    stop(bus, module);
    data
}

/// Register query / command with reply: write, repeated-start read, stop
pub fn write_read_txn<M: SlaveModule>(
    bus: &mut TestBus,
    module: &mut M,
    bytes: &[u8],
    n: usize,
) -> Vec<u8> {
    start_write(bus, module, bytes);
    let data = start_read(bus, module, n);
    stop(bus, module);
    data
}

// --- recording application ------------------------------------------------

/// Everything the device tells the application, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    SetReport {
        ty: ReportType,
        data: Vec<u8>,
        in_lent_buffer: bool,
    },
    GetReport {
        select: ReportSelector,
    },
    InReportSent {
        data: Vec<u8>,
    },
    PowerMode {
        on: bool,
    },
    SetIdle {
        rate: u16,
        id: u8,
    },
    SetProtocol {
        protocol: HidProtocol,
    },
}

pub static TEST_DESCRIPTOR: [u8; 8] = [0x06, 0x00, 0xFF, 0x09, 0x01, 0xA1, 0x01, 0xC0];

pub static TEST_PROTOCOL: ReportProtocol = ReportProtocol {
    descriptor: &TEST_DESCRIPTOR,
    max_input_size: 16,
    max_output_size: 62,
    max_feature_size: 16,
    max_report_id: 3,
};

/// Application that records every callback and answers according to its
/// configuration flags.
pub struct TestApp {
    pub events: Vec<Event>,
    pub in_buf: [u8; 16],
    pub reply_buf: [u8; 16],
    pub out_buf: [u8; 64],
    /// Answer GET_REPORT synchronously
    pub answer_get_report: bool,
    /// Lend the output buffer from `start`
    pub lend_on_start: bool,
    /// Re-lend the output buffer from `set_report`
    pub relend_after_set: bool,
    /// Length of the report sent for GET_REPORT
    pub report_len: usize,
    /// Value returned for GET_IDLE
    pub idle: u16,
}

impl TestApp {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            in_buf: [0; 16],
            reply_buf: [0; 16],
            out_buf: [0; 64],
            answer_get_report: true,
            lend_on_start: true,
            relend_after_set: true,
            report_len: 10,
            idle: 0,
        }
    }

    fn lend_output(&mut self, link: &mut Link<'_>) {
        // SAFETY: out_buf lives inside the device, which tests keep in place
        let buf = unsafe { OutBuffer::new(&mut self.out_buf) };
        let _ = link.receive_report(buf);
    }
}

impl Application for TestApp {
    fn report_protocol(&self) -> &ReportProtocol {
        &TEST_PROTOCOL
    }

    fn start(&mut self, link: &mut Link<'_>) {
        self.events.push(Event::Start);
        if self.lend_on_start {
            self.lend_output(link);
        }
    }

    fn stop(&mut self) {
        self.events.push(Event::Stop);
    }

    fn set_report(&mut self, link: &mut Link<'_>, ty: ReportType, data: &[u8]) {
        self.events.push(Event::SetReport {
            ty,
            data: data.to_vec(),
            in_lent_buffer: data.as_ptr() == self.out_buf.as_ptr(),
        });
        if self.relend_after_set {
            self.lend_output(link);
        }
    }

    fn get_report(&mut self, link: &mut Link<'_>, select: ReportSelector, _scratch: &mut [u8]) {
        self.events.push(Event::GetReport { select });
        if self.answer_get_report {
            for (i, b) in self.reply_buf.iter_mut().enumerate() {
                *b = 0xA0 | i as u8;
            }
            self.reply_buf[0] = select.id;
            let len = self.report_len;
            // SAFETY: reply_buf lives inside the device, which tests keep in
            // place; the reply is consumed within this transaction
            let report = unsafe { InReport::new(&self.reply_buf[..len]) };
            let _ = link.send_report(report, select.ty);
        }
    }

    fn in_report_sent(&mut self, _link: &mut Link<'_>, data: &[u8]) {
        self.events.push(Event::InReportSent {
            data: data.to_vec(),
        });
    }

    fn set_power_mode(&mut self, on: bool) {
        self.events.push(Event::PowerMode { on });
    }

    fn idle_rate(&mut self, _report_id: u8) -> u16 {
        self.idle
    }

    fn set_idle_rate(&mut self, rate: u16, report_id: u8) -> bool {
        self.events.push(Event::SetIdle {
            rate,
            id: report_id,
        });
        false
    }

    fn set_protocol(&mut self, protocol: HidProtocol) -> bool {
        self.events.push(Event::SetProtocol { protocol });
        protocol == HidProtocol::Report
    }
}

// --- fixtures -------------------------------------------------------------

pub const TEST_ADDRESS: u8 = 0x2C;
pub const HID_DESC_REG: u16 = 0x0001;

/// Bus + device around a [`TestApp`], plus the attention-pin probe
pub fn test_device() -> (TestBus, Device<TestApp>, PinProbe) {
    let (pin, probe) = mock_pin();
    let mut bus = SlaveBus::new(MockPeripheral::new(), pin);
    let device = Device::new(
        TestApp::new(),
        ProductInfo::new(0x1234, 0x5678, Version::new(1, 0)),
        &mut bus,
        Address::seven_bit(TEST_ADDRESS),
        HID_DESC_REG,
    );
    (bus, device, probe)
}

/// The RESET command frame for the default register map
pub const RESET_FRAME: [u8; 4] = [0x05, 0x00, 0x00, 0x01];

/// Run the host reset handshake: RESET command, then pull the sentinel
pub fn handshake<A: Application, const S: usize>(bus: &mut TestBus, device: &mut Device<A, S>) {
    write_txn(bus, device, &RESET_FRAME);
    let sentinel = read_txn(bus, device, 2);
    assert_eq!(sentinel, [0x00, 0x00]);
}
