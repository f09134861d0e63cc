//! I²C slave transfer controller
//!
//! Sits between a DMA-driven I²C slave peripheral and a protocol module.
//! The peripheral raises four interrupt-context events (address-matched
//! start, tx complete, rx complete, stop); the controller keeps the
//! two-segment buffer bookkeeping, converts DMA countdown counters into
//! transferred-byte counts, and forwards start/stop to the registered
//! module. One module per controller.

use embedded_hal::digital::OutputPin;

/// Transfer direction as seen from the bus master
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master sends, slave receives
    Write,
    /// Master receives, slave sends
    Read,
}

/// I²C slave address, 7- or 10-bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Address(u16);

impl Address {
    const TEN_BIT_MARK: u16 = 0x7800;
    const MODE_MASK: u16 = 0x7C00;

    /// A 7-bit address (upper bit ignored)
    pub const fn seven_bit(code: u8) -> Self {
        Self((code & 0x7F) as u16)
    }

    /// A 10-bit address (upper bits ignored)
    pub const fn ten_bit(code: u16) -> Self {
        Self((code & 0x3FF) | Self::TEN_BIT_MARK)
    }

    /// Whether this is a 10-bit address
    pub fn is_ten_bit(&self) -> bool {
        (self.0 & Self::MODE_MASK) == Self::TEN_BIT_MARK
    }

    /// Address code including the 10-bit marker
    pub fn raw(&self) -> u16 {
        self.0
    }

    /// Bare address code
    pub fn code(&self) -> u16 {
        if self.is_ten_bit() {
            self.0 & 0x3FF
        } else {
            self.0 & 0x7F
        }
    }
}

/// A transmit buffer segment handed to the peripheral DMA
#[derive(Debug, Clone, Copy)]
pub struct TxChunk {
    pub(crate) ptr: *const u8,
    pub(crate) len: usize,
}

impl TxChunk {
    /// Describe `data` as a DMA source. Posting it (via [`BusOps::send`])
    /// carries the validity obligation; creating the descriptor does not.
    pub fn new(data: &[u8]) -> Self {
        Self {
            ptr: data.as_ptr(),
            len: data.len(),
        }
    }

    pub(crate) const fn from_raw(ptr: *const u8, len: usize) -> Self {
        Self { ptr, len }
    }
}

/// A receive buffer segment handed to the peripheral DMA
#[derive(Debug, Clone, Copy)]
pub struct RxChunk {
    pub(crate) ptr: *mut u8,
    pub(crate) len: usize,
}

impl RxChunk {
    /// Describe `data` as a DMA target; see [`TxChunk::new`]
    pub fn new(data: &mut [u8]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
        }
    }

    pub(crate) const fn from_raw(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }
}

/// Capability interface of a DMA-driven I²C slave peripheral.
///
/// Implementations wrap the vendor HAL. All methods are called from the
/// peripheral's own interrupt context or from code the integrator serializes
/// against it; the controller never calls them re-entrantly.
pub trait SlavePeripheral {
    /// Enable address matching at `addr` and start listening
    fn listen(&mut self, addr: Address);
    /// Disable listening entirely
    fn stop_listen(&mut self);
    /// Queue a transmit DMA of `len` bytes starting at `data`.
    ///
    /// # Safety
    ///
    /// The bytes must stay valid and unmodified until the transfer's stop
    /// event.
    unsafe fn submit_tx(&mut self, data: *const u8, len: usize);
    /// Queue a receive DMA of `len` bytes into `data`.
    ///
    /// # Safety
    ///
    /// The buffer must stay valid and otherwise untouched until the
    /// transfer's stop event.
    unsafe fn submit_rx(&mut self, data: *mut u8, len: usize);
    /// Clock out filler bytes until the master stops reading
    fn send_dummy(&mut self);
    /// Refuse further master writes (not possible in the read direction)
    fn nack(&mut self);
    /// Bytes left in the current transmit DMA
    fn tx_remaining(&self) -> usize;
    /// Bytes left in the current receive DMA
    fn rx_remaining(&self) -> usize;
}

/// Bus operations available to the protocol module.
///
/// Object-safe so the module's own callbacks can hand the bus on without
/// naming the peripheral type.
pub trait BusOps {
    /// Post a transmit of one or two segments; the second follows the first
    /// without a byte gap.
    ///
    /// # Safety
    ///
    /// All segment bytes must stay valid and unmodified until the
    /// transaction's stop callback runs.
    unsafe fn send(&mut self, first: TxChunk, second: Option<TxChunk>);
    /// Post a receive of one or two segments.
    ///
    /// # Safety
    ///
    /// All segment buffers must stay valid and otherwise untouched until the
    /// transaction's stop callback runs.
    unsafe fn receive(&mut self, first: RxChunk, second: Option<RxChunk>);
    /// Drive the attention (interrupt-out) line; active low
    fn set_pin_interrupt(&mut self, asserted: bool);
    /// Begin listening at `addr`
    fn listen(&mut self, addr: Address);
    /// Stop listening
    fn stop_listen(&mut self);
}

/// Protocol module registered with a [`SlaveBus`].
///
/// Both callbacks run in the peripheral's interrupt context. `transferred`
/// counts the bytes moved in the transaction so far (at a repeated start)
/// or in total (at stop).
pub trait SlaveModule {
    /// A start or repeated start matched the slave address. Return `false`
    /// to reject the transaction; the controller then NACKs a write or
    /// clocks dummy bytes for a read.
    fn on_start(&mut self, bus: &mut dyn BusOps, dir: Direction, transferred: usize) -> bool;
    /// The master issued a stop
    fn on_stop(&mut self, bus: &mut dyn BusOps, dir: Direction, transferred: usize);
}

/// The transfer controller: owns the peripheral, the attention line and the
/// per-transfer segment state.
pub struct SlaveBus<P: SlavePeripheral, L: OutputPin> {
    periph: P,
    int_pin: L,
    address: Option<Address>,
    first_len: usize,
    second_len: usize,
    // armed second segment; cleared when engaged or unused
    second: Option<*mut u8>,
    last_dir: Direction,
}

impl<P: SlavePeripheral, L: OutputPin> SlaveBus<P, L> {
    /// Wrap a peripheral and the attention-line GPIO. The line starts
    /// released (high).
    pub fn new(periph: P, mut int_pin: L) -> Self {
        int_pin.set_high().ok();
        Self {
            periph,
            int_pin,
            address: None,
            first_len: 0,
            second_len: 0,
            second: None,
            last_dir: Direction::Write,
        }
    }

    /// Release the peripheral and pin
    pub fn free(mut self) -> (P, L) {
        self.periph.stop_listen();
        self.int_pin.set_high().ok();
        (self.periph, self.int_pin)
    }

    /// Bytes the master has moved through the posted segments, given the
    /// relevant DMA countdown. An armed (not yet engaged) second segment has
    /// not been posted and does not count.
    fn transferred(&self, remaining: usize) -> usize {
        let mut posted = self.first_len;
        if posted > 0 {
            if self.second.is_none() {
                posted += self.second_len;
            }
            posted = posted.saturating_sub(remaining);
        }
        posted
    }

    /// Address-match event. `dir` is the direction of the transfer the
    /// master is starting.
    pub fn handle_start<M: SlaveModule>(&mut self, module: &mut M, dir: Direction) {
        let remaining = match dir {
            Direction::Write => self.periph.tx_remaining(),
            Direction::Read => self.periph.rx_remaining(),
        };
        let transferred = self.transferred(remaining);
        self.last_dir = dir;

        let accepted = module.on_start(self, dir, transferred);
        if !accepted {
            // a slave has no way to NACK a read, so feed the master junk
            match dir {
                Direction::Write => self.periph.nack(),
                Direction::Read => self.periph.send_dummy(),
            }
        }
    }

    /// The transmit DMA drained its segment
    pub fn handle_tx_complete(&mut self) {
        match self.second.take() {
            // SAFETY: posting obligation was taken by the `send` that armed
            // this segment
            Some(data) => unsafe { self.periph.submit_tx(data, self.second_len) },
            None => self.periph.send_dummy(),
        }
    }

    /// The receive DMA filled its segment
    pub fn handle_rx_complete(&mut self) {
        match self.second.take() {
            // SAFETY: posting obligation was taken by the `receive` that
            // armed this segment
            Some(data) => unsafe { self.periph.submit_rx(data, self.second_len) },
            None => self.periph.nack(),
        }
    }

    /// Stop event: notify the module, clear bookkeeping, re-arm listening
    pub fn handle_stop<M: SlaveModule>(&mut self, module: &mut M) {
        let remaining = match self.last_dir {
            Direction::Write => self.periph.rx_remaining(),
            Direction::Read => self.periph.tx_remaining(),
        };
        let transferred = self.transferred(remaining);
        let dir = self.last_dir;

        module.on_stop(self, dir, transferred);

        self.first_len = 0;
        self.second_len = 0;
        self.second = None;
        if let Some(addr) = self.address {
            self.periph.listen(addr);
        }
    }

    /// Borrow the peripheral
    pub fn peripheral(&self) -> &P {
        &self.periph
    }

    /// Borrow the peripheral mutably
    pub fn peripheral_mut(&mut self) -> &mut P {
        &mut self.periph
    }
}

impl<P: SlavePeripheral, L: OutputPin> BusOps for SlaveBus<P, L> {
    unsafe fn send(&mut self, first: TxChunk, second: Option<TxChunk>) {
        self.first_len = first.len;
        match second {
            Some(seg) if seg.len > 0 => {
                self.second_len = seg.len;
                self.second = Some(seg.ptr as *mut u8);
            }
            _ => {
                self.second_len = 0;
                self.second = None;
            }
        }
        // SAFETY: forwarded from the caller's contract
        unsafe { self.periph.submit_tx(first.ptr, first.len) };
    }

    unsafe fn receive(&mut self, first: RxChunk, second: Option<RxChunk>) {
        self.first_len = first.len;
        match second {
            Some(seg) if seg.len > 0 => {
                self.second_len = seg.len;
                self.second = Some(seg.ptr);
            }
            _ => {
                self.second_len = 0;
                self.second = None;
            }
        }
        // SAFETY: forwarded from the caller's contract
        unsafe { self.periph.submit_rx(first.ptr, first.len) };
    }

    fn set_pin_interrupt(&mut self, asserted: bool) {
        // active low logic
        if asserted {
            self.int_pin.set_low().ok();
        } else {
            self.int_pin.set_high().ok();
        }
    }

    fn listen(&mut self, addr: Address) {
        self.address = Some(addr);
        self.periph.listen(addr);
    }

    fn stop_listen(&mut self) {
        self.address = None;
        self.periph.stop_listen();
    }
}
