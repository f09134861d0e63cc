//! Reference keyboard application
//!
//! A boot-protocol-compatible keyboard speaking the report protocol: one
//! 8-byte input report (modifiers, reserved byte, six keycodes) behind
//! report id 1, and one LED output report. Useful as-is for simple
//! firmware, and as the template for writing an [`Application`].

use bitflags::bitflags;

use crate::application::Application;
use crate::buffer::{InReport, OutBuffer};
use crate::device::Link;
use crate::report::{ReportProtocol, ReportSelector, ReportType};

/// Report id of both keyboard reports
pub const KEYBOARD_REPORT_ID: u8 = 1;

/// Report descriptor: standard 101-key boot keyboard layout (USB HID 1.11
/// Appendix B.1) wrapped in report id 1
#[rustfmt::skip]
pub const KEYBOARD_REPORT_DESCRIPTOR: [u8; 65] = [
    0x05, 0x01,       // Usage Page (Generic Desktop)
    0x09, 0x06,       // Usage (Keyboard)
    0xA1, 0x01,       // Collection (Application)
    0x85, KEYBOARD_REPORT_ID, // Report ID
    0x05, 0x07,       //   Usage Page (Keyboard/Keypad)
    0x19, 0xE0,       //   Usage Minimum (Left Control)
    0x29, 0xE7,       //   Usage Maximum (Right GUI)
    0x15, 0x00,       //   Logical Minimum (0)
    0x25, 0x01,       //   Logical Maximum (1)
    0x75, 0x01,       //   Report Size (1)
    0x95, 0x08,       //   Report Count (8)
    0x81, 0x02,       //   Input (Data, Variable, Absolute)
    0x95, 0x01,       //   Report Count (1)
    0x75, 0x08,       //   Report Size (8)
    0x81, 0x01,       //   Input (Constant)
    0x95, 0x05,       //   Report Count (5)
    0x75, 0x01,       //   Report Size (1)
    0x05, 0x08,       //   Usage Page (LEDs)
    0x19, 0x01,       //   Usage Minimum (Num Lock)
    0x29, 0x05,       //   Usage Maximum (Kana)
    0x91, 0x02,       //   Output (Data, Variable, Absolute)
    0x95, 0x01,       //   Report Count (1)
    0x75, 0x03,       //   Report Size (3)
    0x91, 0x01,       //   Output (Constant)
    0x95, 0x06,       //   Report Count (6)
    0x75, 0x08,       //   Report Size (8)
    0x15, 0x00,       //   Logical Minimum (0)
    0x25, 0x65,       //   Logical Maximum (101)
    0x05, 0x07,       //   Usage Page (Keyboard/Keypad)
    0x19, 0x00,       //   Usage Minimum (0)
    0x29, 0x65,       //   Usage Maximum (101)
    0x81, 0x00,       //   Input (Data, Array)
    0xC0,             // End Collection
];

bitflags! {
    /// Keyboard modifier keys, byte 0 of the input report payload
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyModifiers: u8 {
        /// Left Control
        const LEFT_CTRL   = 0b0000_0001;
        /// Left Shift
        const LEFT_SHIFT  = 0b0000_0010;
        /// Left Alt
        const LEFT_ALT    = 0b0000_0100;
        /// Left GUI
        const LEFT_GUI    = 0b0000_1000;
        /// Right Control
        const RIGHT_CTRL  = 0b0001_0000;
        /// Right Shift
        const RIGHT_SHIFT = 0b0010_0000;
        /// Right Alt
        const RIGHT_ALT   = 0b0100_0000;
        /// Right GUI
        const RIGHT_GUI   = 0b1000_0000;
    }
}

bitflags! {
    /// Keyboard LED states delivered by the host's output report
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyboardLeds: u8 {
        /// Num Lock
        const NUM_LOCK    = 0b0000_0001;
        /// Caps Lock
        const CAPS_LOCK   = 0b0000_0010;
        /// Scroll Lock
        const SCROLL_LOCK = 0b0000_0100;
        /// Compose
        const COMPOSE     = 0b0000_1000;
        /// Kana
        const KANA        = 0b0001_0000;
    }
}

/// A HID keyboard usage code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyCode(pub u8);

impl KeyCode {
    /// No key in this slot
    pub const NONE: Self = Self(0x00);
    /// The letter A
    pub const A: Self = Self(0x04);
    /// Caps Lock
    pub const CAPS_LOCK: Self = Self(0x39);
}

/// Input report wire size: report id + modifiers + reserved + 6 keycodes
const IN_REPORT_SIZE: usize = 9;
/// Output report wire size: report id + LED byte
const OUT_REPORT_SIZE: usize = 2;

/// Report-protocol metadata of the keyboard
pub const KEYBOARD_REPORT_PROTOCOL: ReportProtocol = ReportProtocol {
    descriptor: &KEYBOARD_REPORT_DESCRIPTOR,
    max_input_size: IN_REPORT_SIZE,
    max_output_size: OUT_REPORT_SIZE,
    max_feature_size: 0,
    max_report_id: KEYBOARD_REPORT_ID,
};

/// The keyboard application state: current key report, LED state, and the
/// buffers lent to the transport.
#[derive(Default)]
pub struct KeyboardApp {
    modifiers: KeyModifiers,
    keys: [u8; 6],
    leds: KeyboardLeds,
    in_buf: [u8; IN_REPORT_SIZE],
    out_buf: [u8; OUT_REPORT_SIZE],
}

impl KeyboardApp {
    /// A keyboard with no keys pressed and all LEDs off
    pub const fn new() -> Self {
        Self {
            modifiers: KeyModifiers::empty(),
            keys: [0; 6],
            leds: KeyboardLeds::empty(),
            in_buf: [0; IN_REPORT_SIZE],
            out_buf: [0; OUT_REPORT_SIZE],
        }
    }

    /// LED state most recently set by the host
    pub fn leds(&self) -> KeyboardLeds {
        self.leds
    }

    /// Update the key state and return the report to pass to
    /// [`Device::send_report`](crate::device::Device::send_report).
    ///
    /// The report borrows the application's internal buffer: the device
    /// holding this application must stay in place and the key state must
    /// not change again until `in_report_sent` (an earlier change would put
    /// the newer state on the wire, nothing worse).
    pub fn set_key_state(&mut self, modifiers: KeyModifiers, keys: &[KeyCode]) -> InReport {
        self.modifiers = modifiers;
        self.keys = [0; 6];
        for (slot, key) in self.keys.iter_mut().zip(keys) {
            *slot = key.0;
        }
        self.compose();
        // SAFETY: in_buf lives as long as the application; staleness rules
        // are documented above
        unsafe { InReport::new(&self.in_buf) }
    }

    fn compose(&mut self) {
        self.in_buf[0] = KEYBOARD_REPORT_ID;
        self.in_buf[1] = self.modifiers.bits();
        self.in_buf[2] = 0;
        self.in_buf[3..].copy_from_slice(&self.keys);
    }

    fn lend_output(&mut self, link: &mut Link<'_>) {
        // SAFETY: out_buf lives as long as the application and is not
        // touched until `set_report` returns it
        let buf = unsafe { OutBuffer::new(&mut self.out_buf) };
        let _ = link.receive_report(buf);
    }
}

impl Application for KeyboardApp {
    fn report_protocol(&self) -> &ReportProtocol {
        &KEYBOARD_REPORT_PROTOCOL
    }

    fn start(&mut self, link: &mut Link<'_>) {
        self.lend_output(link);
    }

    fn stop(&mut self) {
        self.leds = KeyboardLeds::empty();
    }

    fn set_report(&mut self, link: &mut Link<'_>, ty: ReportType, data: &[u8]) {
        if ty == ReportType::Output && data.len() == OUT_REPORT_SIZE && data[0] == KEYBOARD_REPORT_ID
        {
            self.leds = KeyboardLeds::from_bits_truncate(data[1]);
        }
        self.lend_output(link);
    }

    fn get_report(&mut self, link: &mut Link<'_>, select: ReportSelector, _scratch: &mut [u8]) {
        if select.ty == ReportType::Input
            && (select.id == 0 || select.id == KEYBOARD_REPORT_ID)
        {
            self.compose();
            // SAFETY: in_buf lives as long as the application; the reply is
            // transmitted before this call stack unwinds to other key-state
            // updates
            let report = unsafe { InReport::new(&self.in_buf) };
            let _ = link.send_report(report, ReportType::Input);
        }
        // feature reports: none defined, let the request drop
    }
}
