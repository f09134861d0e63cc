//! I²C-HID command frame decoding
//!
//! A command frame is 2 bytes, `[flags, opcode]`, extended to 3 when the
//! report id does not fit the low nibble of the flags byte (the nibble is
//! then 0xF and the full 8-bit id follows the opcode).

use crate::report::{ReportSelector, ReportType};

/// Command opcodes defined by the I²C-HID specification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Opcode {
    /// Reset the link at any time
    Reset = 0x1,
    /// Host retrieves a report (input/feature)
    GetReport = 0x2,
    /// Host sets a report (output/feature)
    SetReport = 0x3,
    /// Host retrieves the idle rate of a top-level collection
    GetIdle = 0x4,
    /// Host sets the idle rate of a top-level collection
    SetIdle = 0x5,
    /// Host retrieves the protocol mode
    GetProtocol = 0x6,
    /// Host sets the protocol mode
    SetProtocol = 0x7,
    /// Host indicates the preferred power setting
    SetPower = 0x8,
}

impl Opcode {
    fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x1 => Some(Self::Reset),
            0x2 => Some(Self::GetReport),
            0x3 => Some(Self::SetReport),
            0x4 => Some(Self::GetIdle),
            0x5 => Some(Self::SetIdle),
            0x6 => Some(Self::GetProtocol),
            0x7 => Some(Self::SetProtocol),
            0x8 => Some(Self::SetPower),
            _ => None,
        }
    }

    // Only the report-addressed opcodes may carry the extended id byte.
    fn may_extend(&self) -> bool {
        matches!(
            self,
            Self::GetReport | Self::SetReport | Self::GetIdle | Self::SetIdle
        )
    }
}

/// A decoded command frame
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Command {
    /// Decoded opcode
    pub opcode: Opcode,
    /// Report type nibble (raw; 0 when the opcode carries none)
    type_nibble: u8,
    /// Report id, from the flags nibble or the extension byte
    pub report_id: u8,
    /// Sleep bit of SET_POWER
    pub sleep: bool,
    /// Encoded frame length, 2 or 3 bytes
    pub wire_len: usize,
}

impl Command {
    /// Decode the leading command frame of `bytes`. `None` when the frame is
    /// truncated or the opcode is unknown/reserved.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let flags = *bytes.first()?;
        let opcode = Opcode::from_wire(*bytes.get(1)?)?;

        let extended = opcode.may_extend() && (flags & 0xF) == 0xF;
        let (report_id, wire_len) = if extended {
            (*bytes.get(2)?, 3)
        } else {
            (flags & 0xF, 2)
        };

        Some(Self {
            opcode,
            type_nibble: (flags >> 4) & 0x3,
            report_id,
            sleep: (flags & 0x1) != 0,
            wire_len,
        })
    }

    /// Report type addressed by the frame, when the nibble is valid
    pub fn report_type(&self) -> Option<ReportType> {
        ReportType::from_wire(self.type_nibble)
    }

    /// Full report selector, when the type nibble is valid
    pub fn selector(&self) -> Option<ReportSelector> {
        Some(ReportSelector::new(self.report_type()?, self.report_id))
    }
}
