#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! HID over I²C, device side
//!
//! Implements the device role of the Microsoft HID-over-I²C protocol
//! (v1.0): the device is the I²C slave, raises an active-low attention line
//! when it has input reports, and answers the host's register-addressed
//! reads, writes and commands.
//!
//! # Core Components
//!
//! - [`slave`] - transfer controller between a DMA-driven I²C slave
//!   peripheral and the protocol engine
//! - [`device`] - the protocol state machine
//! - [`application`] - the contract a HID application implements
//! - [`descriptor`] / [`command`] - wire formats
//! - [`keyboard`] - reference keyboard application
//!
//! # Integration
//!
//! The crate contains no hardware access. Implement
//! [`SlavePeripheral`](slave::SlavePeripheral) over the vendor HAL, hand it
//! and the attention-line GPIO to [`SlaveBus`](slave::SlaveBus), and forward
//! the peripheral's four interrupt events to `handle_start`,
//! `handle_tx_complete`, `handle_rx_complete` and `handle_stop`. The
//! [`Device`] and [`SlaveBus`] pair is shared between interrupt handlers
//! and thread context by the integrator, typically inside a
//! critical-section protected cell; all protocol work happens on the ISR
//! stack and never blocks.

#[cfg(feature = "defmt")]
use defmt as _;

pub mod application;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod keyboard;
pub mod report;
pub mod slave;

pub use application::Application;
pub use buffer::{InReport, OutBuffer};
pub use descriptor::{HidDescriptor, RegisterMap};
pub use device::{Device, Link};
pub use error::{HidError, Result};
pub use report::{
    HidProtocol, ProductInfo, ReportProtocol, ReportSelector, ReportType, Version,
};
pub use slave::{Address, Direction, SlaveBus, SlaveModule, SlavePeripheral};
