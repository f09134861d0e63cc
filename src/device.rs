//! I²C-HID device protocol state machine
//!
//! Bridges the bus transfer controller and a HID application. Host
//! transactions arrive as start/stop callbacks; the device decodes the
//! register-addressed grammar, drives the attention line while input
//! reports are queued, and recovers from host-initiated resets.
//!
//! The observable sub-state is the two-valued `stage`: 0 between host
//! transactions, 1 once a register write has been received and a repeated
//! start is expected for the reply.

use crate::application::Application;
use crate::buffer::{InReport, OutBuffer};
use crate::command::{Command, Opcode};
use crate::descriptor::{
    read_u16_le, HidDescriptor, RegisterMap, HID_DESCRIPTOR_SIZE, REPORT_LENGTH_SIZE,
};
use crate::error::{HidError, Result};
use crate::report::{HidProtocol, ProductInfo, ReportSelector, ReportType};
use crate::slave::{Address, BusOps, Direction, RxChunk, SlaveModule, TxChunk};

/// Everything the transport needs outside the application and the scratch
/// buffer, split out so application callbacks can hold a [`Link`] while the
/// application itself is borrowed.
struct LinkState {
    regs: RegisterMap,
    pinfo: ProductInfo,
    address: Address,
    max_input_size: usize,
    stage: u8,
    powered: bool,
    link_active: bool,
    get_report: Option<ReportSelector>,
    output: OutBuffer,
    in_slot: Option<InReport>,
}

impl LinkState {
    fn send_report(
        &mut self,
        bus: &mut dyn BusOps,
        prefix: &mut [u8],
        data: InReport,
        ty: ReportType,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(HidError::Invalid);
        }
        if !self.link_active {
            return Err(HidError::NoTransport);
        }

        // a pending GET_REPORT redirects the matching report into the DATA
        // register reply instead of the input queue
        if let Some(select) = self.get_report {
            // SAFETY: non-empty, and valid per the caller's contract
            if select.answered_by(ty, unsafe { data.first() }) {
                prefix[..REPORT_LENGTH_SIZE].copy_from_slice(&(data.len() as u16).to_le_bytes());
                // SAFETY: the prefix lives in device scratch; the report
                // bytes are valid until stop per the caller's contract
                unsafe {
                    bus.send(
                        TxChunk::new(&prefix[..REPORT_LENGTH_SIZE]),
                        Some(TxChunk::from_raw(data.as_ptr(), data.len())),
                    );
                }
                self.get_report = None;
                return Ok(());
            }
        }

        match ty {
            ReportType::Input => {
                if data.len() > self.max_input_size {
                    return Err(HidError::Invalid);
                }
                if self.in_slot.is_some() {
                    return Err(HidError::Busy);
                }
                self.in_slot = Some(data);
                bus.set_pin_interrupt(true);
                Ok(())
            }
            // feature reports need a pending GET_REPORT; output reports
            // never travel device-to-host
            _ => Err(HidError::Invalid),
        }
    }

    fn receive_report(&mut self, buf: OutBuffer) -> Result<()> {
        if buf.is_empty() {
            return Err(HidError::Invalid);
        }
        if !self.link_active {
            return Err(HidError::NoTransport);
        }
        if self.stage != 0 {
            // a host write may be streaming into the current binding
            return Err(HidError::Busy);
        }
        self.output = buf;
        Ok(())
    }
}

/// Transport handle passed into [`Application`] callbacks.
///
/// Exposes the same send/receive operations as the device itself, so a
/// callback can answer the host synchronously (GET_REPORT) or re-lend its
/// output buffer (`set_report`).
pub struct Link<'a> {
    state: &'a mut LinkState,
    bus: &'a mut dyn BusOps,
    prefix: &'a mut [u8],
}

impl Link<'_> {
    /// Send a report to the host; see [`Device::send_report`]
    pub fn send_report(&mut self, data: InReport, ty: ReportType) -> Result<()> {
        self.state.send_report(self.bus, self.prefix, data, ty)
    }

    /// Lend the buffer for the next host-to-device report; see
    /// [`Device::receive_report`]
    pub fn receive_report(&mut self, buf: OutBuffer) -> Result<()> {
        self.state.receive_report(buf)
    }

    /// Link power state as set by the host
    pub fn powered(&self) -> bool {
        self.state.powered
    }
}

/// The I²C-HID device.
///
/// Owns one application, a scratch buffer of `SCRATCH` bytes (at least the
/// HID descriptor size and at least one maximum input frame) and the
/// protocol state. Implements [`SlaveModule`]; wire its `on_start`/`on_stop`
/// through a [`SlaveBus`](crate::slave::SlaveBus) handling the peripheral
/// interrupts.
///
/// The device and bus pair is shared between interrupt and thread context
/// by the integrator (typically a critical-section protected cell); every
/// method takes `&mut self` and relies on that exclusivity.
pub struct Device<A: Application, const SCRATCH: usize = { HID_DESCRIPTOR_SIZE }> {
    app: A,
    state: LinkState,
    buffer: [u8; SCRATCH],
}

impl<A: Application, const SCRATCH: usize> Device<A, SCRATCH> {
    /// Create the device and begin listening at `address`.
    ///
    /// `hid_descriptor_reg` is the register the host reads the HID
    /// descriptor from (conventionally `0x0001`, advertised out of band).
    ///
    /// Panics if `SCRATCH` cannot hold the HID descriptor or a maximum
    /// input frame.
    pub fn new(
        app: A,
        pinfo: ProductInfo,
        bus: &mut dyn BusOps,
        address: Address,
        hid_descriptor_reg: u16,
    ) -> Self {
        let max_input_size = app.report_protocol().max_input_size;
        assert!(SCRATCH >= HID_DESCRIPTOR_SIZE);
        assert!(SCRATCH >= REPORT_LENGTH_SIZE + max_input_size);

        let device = Self {
            app,
            state: LinkState {
                regs: RegisterMap::new(hid_descriptor_reg),
                pinfo,
                address,
                max_input_size,
                stage: 0,
                powered: false,
                link_active: false,
                get_report: None,
                output: OutBuffer::unbound(),
                in_slot: None,
            },
            buffer: [0; SCRATCH],
        };
        bus.listen(address);
        device
    }

    /// Take the device off the bus: release the attention line, stop
    /// listening, stop the application and flush all queues.
    pub fn shutdown(&mut self, bus: &mut dyn BusOps) {
        bus.set_pin_interrupt(false);
        bus.stop_listen();
        if self.state.link_active {
            self.state.link_active = false;
            self.app.stop();
        }
        self.state.get_report = None;
        self.state.in_slot = None;
        self.state.output = OutBuffer::unbound();
        self.state.stage = 0;
    }

    /// Reset the link: stop the application, flush the input queue and
    /// queue the zero-length frame the host reads as the reset sentinel.
    /// Invoked by the RESET opcode; callable directly for a device-initiated
    /// reset.
    pub fn link_reset(&mut self, bus: &mut dyn BusOps) {
        #[cfg(feature = "defmt")]
        defmt::info!("i2c-hid: link reset");
        if self.state.link_active {
            self.state.link_active = false;
            self.app.stop();
        }
        self.state.get_report = None;
        self.state.in_slot = None;
        self.queue_input(bus, InReport::empty());
    }

    /// Send a report to the host.
    ///
    /// INPUT reports go through the single-slot queue and raise the
    /// attention line; a report answering a pending GET_REPORT (any type)
    /// is redirected into the reply. Fails `Busy` when the queue is
    /// occupied, `Invalid` for empty/oversized data or a FEATURE report
    /// without a pending request, `NoTransport` before the reset handshake.
    pub fn send_report(
        &mut self,
        bus: &mut dyn BusOps,
        data: InReport,
        ty: ReportType,
    ) -> Result<()> {
        let (prefix, _) = self.buffer.split_at_mut(REPORT_LENGTH_SIZE);
        self.state.send_report(bus, prefix, data, ty)
    }

    /// Lend the buffer that receives the next host-to-device report.
    /// The binding is consumed by one delivery and must be renewed from
    /// `set_report` (or later).
    pub fn receive_report(&mut self, buf: OutBuffer) -> Result<()> {
        self.state.receive_report(buf)
    }

    /// Slave address the device listens on
    pub fn bus_address(&self) -> Address {
        self.state.address
    }

    /// Register the host reads the HID descriptor from
    pub fn hid_descriptor_reg_address(&self) -> u16 {
        self.state.regs.hid_descriptor
    }

    /// Current HID descriptor image
    pub fn hid_descriptor(&self) -> HidDescriptor {
        HidDescriptor::new(&self.state.regs, self.app.report_protocol(), &self.state.pinfo)
    }

    /// Link power state, mutated only through SET_POWER
    pub fn power_state(&self) -> bool {
        self.state.powered
    }

    /// Whether the host has completed the reset handshake
    pub fn link_active(&self) -> bool {
        self.state.link_active
    }

    /// Whether an input report is waiting for the host
    pub fn input_queued(&self) -> bool {
        self.state.in_slot.is_some()
    }

    /// Borrow the application
    pub fn application(&self) -> &A {
        &self.app
    }

    /// Borrow the application mutably
    pub fn application_mut(&mut self) -> &mut A {
        &mut self.app
    }

    /// Run `f` with the application and a [`Link`] over this device's
    /// transport state. The scratch tail handed to `f` is free assembly
    /// space.
    fn with_link<R>(
        &mut self,
        bus: &mut dyn BusOps,
        f: impl FnOnce(&mut A, &mut Link<'_>, &mut [u8]) -> R,
    ) -> R {
        let Self { app, state, buffer } = self;
        let (prefix, tail) = buffer.split_at_mut(REPORT_LENGTH_SIZE);
        let mut link = Link { state, bus, prefix };
        f(app, &mut link, tail)
    }

    fn queue_input(&mut self, bus: &mut dyn BusOps, data: InReport) -> bool {
        if self.state.in_slot.is_some() {
            return false;
        }
        self.state.in_slot = Some(data);
        bus.set_pin_interrupt(true);
        true
    }

    /// Input pull: the host answered the attention line with a bare read.
    /// Emit `[u16 length][report bytes]`, or the zero sentinel when nothing
    /// is queued (reset completion or presence probe).
    fn get_input(&mut self, bus: &mut dyn BusOps) -> bool {
        let frame_len = REPORT_LENGTH_SIZE + self.state.max_input_size;
        let frame = &mut self.buffer[..frame_len];
        match self.state.in_slot {
            Some(report) if !report.is_empty() => {
                frame[..REPORT_LENGTH_SIZE].copy_from_slice(&(report.len() as u16).to_le_bytes());
                // SAFETY: queued bytes stay valid until `in_report_sent`
                let bytes = unsafe { report.as_slice() };
                frame[REPORT_LENGTH_SIZE..REPORT_LENGTH_SIZE + bytes.len()].copy_from_slice(bytes);
                frame[REPORT_LENGTH_SIZE + bytes.len()..].fill(0);
            }
            _ => {
                frame.fill(0);
            }
        }

        // the slave cannot bound the read; the master clocks the full frame
        // SAFETY: scratch is owned by the device and outlives the transfer
        unsafe { bus.send(TxChunk::new(&self.buffer[..frame_len]), None) };

        // released here rather than at stop, so the host cannot re-trigger
        // on a report that is already on its way out
        bus.set_pin_interrupt(false);
        true
    }

    /// Reply phase of a register query or command transaction. `len` bytes
    /// of register address (and command frame) have been received.
    fn reply_request(&mut self, bus: &mut dyn BusOps, len: usize) -> bool {
        let len = len.min(SCRATCH);
        if len < 2 {
            return false;
        }
        let Some(reg) = read_u16_le(&self.buffer[..len], 0) else {
            return false;
        };

        if len == 2 {
            if reg == self.state.regs.hid_descriptor {
                let desc = self.hid_descriptor();
                let n = desc.write_to(&mut self.buffer);
                // SAFETY: scratch outlives the transfer
                unsafe { bus.send(TxChunk::new(&self.buffer[..n]), None) };
                true
            } else if reg == RegisterMap::REPORT_DESCRIPTOR {
                let descriptor = self.app.report_protocol().descriptor;
                // SAFETY: the report descriptor is 'static
                unsafe { bus.send(TxChunk::new(descriptor), None) };
                true
            } else {
                false
            }
        } else if reg == RegisterMap::COMMAND {
            self.get_command(bus, len)
        } else {
            false
        }
    }

    /// Dispatch a readable command (the host follows with a repeated-start
    /// read). The frame is `[command][DATA register]`, already in scratch.
    fn get_command(&mut self, bus: &mut dyn BusOps, len: usize) -> bool {
        let Some(cmd) = Command::parse(&self.buffer[2..len]) else {
            return false;
        };
        let data_reg_at = 2 + cmd.wire_len;
        if len != data_reg_at + 2
            || read_u16_le(&self.buffer[..len], data_reg_at) != Some(RegisterMap::DATA)
        {
            return false;
        }

        match cmd.opcode {
            Opcode::GetReport => {
                let Some(select) = cmd.selector() else {
                    return false;
                };
                self.handle_get_report(bus, select)
            }
            Opcode::GetIdle => {
                let rate = self.app.idle_rate(cmd.report_id);
                self.send_short_data(bus, rate);
                true
            }
            Opcode::GetProtocol => {
                let protocol = self.app.protocol() as u16;
                self.send_short_data(bus, protocol);
                true
            }
            _ => false,
        }
    }

    /// Ask the application for a report. A synchronous `send_report` with
    /// matching selector lands in the reply; otherwise the request is
    /// unanswered and the read phase is rejected.
    fn handle_get_report(&mut self, bus: &mut dyn BusOps, select: ReportSelector) -> bool {
        self.state.get_report = Some(select);
        self.with_link(bus, |app, link, scratch| {
            app.get_report(link, select, scratch)
        });
        self.state.get_report.take().is_none()
    }

    /// Reply `[u16 4][u16 value]` for the short getter commands
    fn send_short_data(&mut self, bus: &mut dyn BusOps, value: u16) {
        self.buffer[..2].copy_from_slice(&4u16.to_le_bytes());
        self.buffer[2..4].copy_from_slice(&value.to_le_bytes());
        // SAFETY: scratch outlives the transfer
        unsafe { bus.send(TxChunk::new(&self.buffer[..4]), None) };
    }

    /// A write transaction completed; dispatch on the register prefix
    fn process_write(&mut self, bus: &mut dyn BusOps, total: usize) {
        if total < 2 {
            return;
        }
        match read_u16_le(&self.buffer, 0) {
            Some(RegisterMap::OUTPUT_REPORT) => self.set_output_report(bus, total),
            Some(RegisterMap::COMMAND) => self.set_command(bus, total),
            _ => {
                #[cfg(feature = "defmt")]
                defmt::trace!("i2c-hid: write to unknown register dropped");
            }
        }
    }

    /// OUTPUT register write: `[reg][u16 length][report bytes]` where the
    /// length field counts itself
    fn set_output_report(&mut self, bus: &mut dyn BusOps, total: usize) {
        const HEADER: usize = 2 + REPORT_LENGTH_SIZE;
        let Some(inner) = read_u16_le(&self.buffer, 2) else {
            return;
        };
        let inner = inner as usize;
        if total != 2 + inner || inner <= REPORT_LENGTH_SIZE {
            return;
        }
        self.deliver_report(bus, ReportType::Output, HEADER, total);
    }

    /// Write-only command dispatch at stop
    fn set_command(&mut self, bus: &mut dyn BusOps, total: usize) {
        let avail = total.min(SCRATCH);
        let Some(cmd) = Command::parse(&self.buffer[2..avail]) else {
            return;
        };
        let body = total - 2;
        let data_reg_at = 2 + cmd.wire_len;
        let has_data_reg = body > cmd.wire_len + 2
            && read_u16_le(&self.buffer[..avail], data_reg_at) == Some(RegisterMap::DATA);

        match cmd.opcode {
            Opcode::Reset => {
                if body == cmd.wire_len {
                    self.link_reset(bus);
                }
            }
            Opcode::SetPower => {
                if body == cmd.wire_len {
                    self.set_power(!cmd.sleep);
                }
            }
            Opcode::SetReport => {
                if !has_data_reg {
                    return;
                }
                let Some(ty) = cmd.report_type() else {
                    return;
                };
                let Some(inner) = read_u16_le(&self.buffer[..avail], data_reg_at + 2) else {
                    return;
                };
                let inner = inner as usize;
                if total != data_reg_at + 2 + inner || inner <= REPORT_LENGTH_SIZE {
                    return;
                }
                self.deliver_report(bus, ty, data_reg_at + 2 + REPORT_LENGTH_SIZE, total);
            }
            Opcode::SetIdle => {
                if body != cmd.wire_len + 2 + 4 || !has_data_reg {
                    return;
                }
                if read_u16_le(&self.buffer[..avail], data_reg_at + 2) != Some(4) {
                    return;
                }
                let Some(rate) = read_u16_le(&self.buffer[..avail], data_reg_at + 4) else {
                    return;
                };
                self.app.set_idle_rate(rate, cmd.report_id);
            }
            Opcode::SetProtocol => {
                if body != cmd.wire_len + 2 + 4 || !has_data_reg {
                    return;
                }
                if read_u16_le(&self.buffer[..avail], data_reg_at + 2) != Some(4) {
                    return;
                }
                let Some(protocol) = read_u16_le(&self.buffer[..avail], data_reg_at + 4)
                    .and_then(HidProtocol::from_wire)
                else {
                    return;
                };
                self.app.set_protocol(protocol);
            }
            // readable commands answer in the reply phase instead
            _ => {}
        }
    }

    /// Assemble the payload of a host write at the start of the lent output
    /// buffer and deliver it. `header` is the payload offset on the wire;
    /// bytes beyond scratch already streamed into the buffer as the second
    /// receive segment.
    fn deliver_report(&mut self, bus: &mut dyn BusOps, ty: ReportType, header: usize, total: usize) {
        let payload = total - header;
        let out = self.state.output;
        if out.is_empty() || payload > out.len() {
            #[cfg(feature = "defmt")]
            defmt::trace!("i2c-hid: host report dropped, no receive buffer");
            return;
        }

        // SAFETY: the binding is live until delivery per `receive_report`
        let dst = unsafe { out.as_mut_slice() };
        if total > SCRATCH {
            let tail = total - SCRATCH;
            let head = SCRATCH - header;
            // the tail landed at the buffer start; move it up, then fill
            // the head from scratch (overlap-safe)
            dst.copy_within(..tail, head);
            dst[..head].copy_from_slice(&self.buffer[header..SCRATCH]);
        } else {
            dst[..payload].copy_from_slice(&self.buffer[header..total]);
        }

        // returned to the application before the callback so it can re-lend
        self.state.output = OutBuffer::unbound();
        self.with_link(bus, |app, link, _| app.set_report(link, ty, &dst[..payload]));
    }

    fn set_power(&mut self, on: bool) {
        if self.state.powered != on {
            self.state.powered = on;
            self.app.set_power_mode(on);
        }
    }

    /// Stop of an input pull. Pop the queue if the host read the whole
    /// frame; a popped zero-length frame is the completed reset handshake.
    fn process_input_complete(&mut self, bus: &mut dyn BusOps, total: usize) {
        match self.state.in_slot {
            Some(report) if REPORT_LENGTH_SIZE + report.len() <= total => {
                self.state.in_slot = None;
                if report.is_empty() {
                    self.state.link_active = true;
                    self.with_link(bus, |app, link, _| app.start(link));
                } else {
                    // SAFETY: queued bytes stay valid until this callback
                    // returns
                    let data = unsafe { report.as_slice() };
                    self.with_link(bus, |app, link, _| app.in_report_sent(link, data));
                }
            }
            _ => {}
        }

        // partial read keeps the report queued; a callback may also have
        // queued the next one
        if self.state.in_slot.is_some() {
            bus.set_pin_interrupt(true);
        }
    }
}

impl<A: Application, const SCRATCH: usize> SlaveModule for Device<A, SCRATCH> {
    fn on_start(&mut self, bus: &mut dyn BusOps, dir: Direction, transferred: usize) -> bool {
        if self.state.stage == 0 {
            debug_assert_eq!(transferred, 0);
            match dir {
                // no register write first: the host is pulling an input
                // report on the attention line
                Direction::Read => self.get_input(bus),
                Direction::Write => {
                    let second = (!self.state.output.is_empty()).then(|| {
                        RxChunk::from_raw(self.state.output.as_mut_ptr(), self.state.output.len())
                    });
                    // SAFETY: scratch is device-owned; the output buffer is
                    // lent until delivery per `receive_report`
                    unsafe { bus.receive(RxChunk::new(&mut self.buffer), second) };
                    self.state.stage = 1;
                    true
                }
            }
        } else if dir == Direction::Read {
            // repeated start: reply to the received register/command
            self.reply_request(bus, transferred)
        } else {
            false
        }
    }

    fn on_stop(&mut self, bus: &mut dyn BusOps, dir: Direction, transferred: usize) {
        // reset first so callbacks observe an idle transport
        let stage = core::mem::replace(&mut self.state.stage, 0);
        match dir {
            Direction::Write => self.process_write(bus, transferred),
            Direction::Read if stage == 0 => self.process_input_complete(bus, transferred),
            // reply transmit complete, nothing to clean up
            Direction::Read => {}
        }
    }
}
