//! Scripted I²C master driving a keyboard device through a simulated
//! peripheral: reset handshake, descriptor reads, a key press and the LED
//! output report.
//!
//! Run with `RUST_LOG=info cargo run --example virtual_host`.

use std::cell::Cell;
use std::rc::Rc;

use embedded_hal::digital::{ErrorType, OutputPin};
use log::info;

use i2c_hid_device::keyboard::{KeyCode, KeyModifiers, KeyboardApp};
use i2c_hid_device::report::{ProductInfo, ReportType, Version};
use i2c_hid_device::slave::{Direction, SlavePeripheral};
use i2c_hid_device::{Address, Device, SlaveBus};

struct Segment {
    ptr: *mut u8,
    len: usize,
    remaining: usize,
}

/// In-process stand-in for a DMA-driven I²C slave peripheral
#[derive(Default)]
struct SimPeripheral {
    listening: bool,
    tx: Option<Segment>,
    rx: Option<Segment>,
    tx_dummy: bool,
    rx_nacked: bool,
}

impl SlavePeripheral for SimPeripheral {
    fn listen(&mut self, _addr: Address) {
        self.listening = true;
        self.tx = None;
        self.rx = None;
        self.tx_dummy = false;
        self.rx_nacked = false;
    }

    fn stop_listen(&mut self) {
        self.listening = false;
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
    }

    fn tx_remaining(&self) -> usize {
        self.tx.as_ref().map(|s| s.remaining).unwrap_or(0)
    }

    fn rx_remaining(&self) -> usize {
        self.rx.as_ref().map(|s| s.remaining).unwrap_or(0)
    }
}

/// Attention line observable from the host side
struct SimPin(Rc<Cell<bool>>);

impl ErrorType for SimPin {
    type Error = core::convert::Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set(true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set(false);
        Ok(())
    }
}

type SimBus = SlaveBus<SimPeripheral, SimPin>;

/// The host side of the wire: byte-level master emulation
struct Host {
    bus: SimBus,
    device: Device<KeyboardApp>,
    attention: Rc<Cell<bool>>,
}

impl Host {
    fn new() -> Self {
        let attention = Rc::new(Cell::new(false));
        let mut bus = SlaveBus::new(SimPeripheral::default(), SimPin(attention.clone()));
        let device = Device::new(
            KeyboardApp::new(),
            ProductInfo::new(0x1209, 0x2C2C, Version::new(1, 0)),
            &mut bus,
            Address::seven_bit(0x2C),
            0x0001,
        );
        Self {
            bus,
            device,
            attention,
        }
    }

    fn write_byte(&mut self, byte: u8) {
        loop {
            let p = self.bus.peripheral_mut();
            if p.rx_nacked {
                return;
            }
            if let Some(seg) = p.rx.as_mut() {
                if seg.remaining > 0 {
                    unsafe { *seg.ptr.add(seg.len - seg.remaining) = byte };
                    seg.remaining -= 1;
                    return;
                }
            }
            self.bus.handle_rx_complete();
        }
    }

    fn read_byte(&mut self) -> u8 {
        loop {
            let p = self.bus.peripheral_mut();
            if let Some(seg) = p.tx.as_mut() {
                if seg.remaining > 0 {
                    let byte = unsafe { *seg.ptr.add(seg.len - seg.remaining) };
                    seg.remaining -= 1;
                    return byte;
                }
            }
            if p.tx_dummy {
                return 0x00;
            }
            self.bus.handle_tx_complete();
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        info!("host ▷ {:02X?}", bytes);
        self.bus.handle_start(&mut self.device, Direction::Write);
        for &b in bytes {
            self.write_byte(b);
        }
        self.bus.handle_stop(&mut self.device);
    }

    fn write_read(&mut self, bytes: &[u8], n: usize) -> Vec<u8> {
        info!("host ▷ {:02X?} (repeated start follows)", bytes);
        self.bus.handle_start(&mut self.device, Direction::Write);
        for &b in bytes {
            self.write_byte(b);
        }
        self.bus.handle_start(&mut self.device, Direction::Read);
        let data: Vec<u8> = (0..n).map(|_| self.read_byte()).collect();
        self.bus.handle_stop(&mut self.device);
        info!("host ◁ {:02X?}", data);
        data
    }

    fn read(&mut self, n: usize) -> Vec<u8> {
        self.bus.handle_start(&mut self.device, Direction::Read);
        let data: Vec<u8> = (0..n).map(|_| self.read_byte()).collect();
        self.bus.handle_stop(&mut self.device);
        info!("host ◁ {:02X?}", data);
        data
    }

    fn attention(&self) -> bool {
        self.attention.get()
    }
}

fn main() {
    env_logger::init();
    let mut host = Host::new();

    info!("--- HID descriptor ---");
    let desc = host.write_read(&[0x01, 0x00], 30);
    let report_desc_len = u16::from_le_bytes([desc[4], desc[5]]) as usize;
    let max_input = u16::from_le_bytes([desc[10], desc[11]]) as usize;

    info!("--- report descriptor ({report_desc_len} bytes) ---");
    host.write_read(&[0x02, 0x00], report_desc_len);

    info!("--- reset handshake ---");
    host.write(&[0x05, 0x00, 0x00, 0x01]);
    assert!(host.attention(), "reset raises the attention line");
    let sentinel = host.read(2);
    assert_eq!(sentinel, [0x00, 0x00]);
    info!("link is up");

    info!("--- key press ---");
    let report = host
        .device
        .application_mut()
        .set_key_state(KeyModifiers::empty(), &[KeyCode::A]);
    host.device
        .send_report(&mut host.bus, report, ReportType::Input)
        .expect("report queued");
    assert!(host.attention());
    let frame = host.read(max_input);
    info!("input frame: {:02X?}", frame);

    let release = host
        .device
        .application_mut()
        .set_key_state(KeyModifiers::empty(), &[]);
    host.device
        .send_report(&mut host.bus, release, ReportType::Input)
        .expect("report queued");
    host.read(max_input);

    info!("--- caps lock LED on ---");
    host.write(&[0x04, 0x00, 0x04, 0x00, 0x01, 0x02]);
    info!("device LEDs: {:?}", host.device.application().leds());

    info!("--- GET_PROTOCOL ---");
    let protocol = host.write_read(&[0x05, 0x00, 0x00, 0x06, 0x06, 0x00], 4);
    assert_eq!(protocol, [0x04, 0x00, 0x01, 0x00]);

    info!("done");
}
