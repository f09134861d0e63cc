//! I²C-HID descriptor and register map
//!
//! The HID descriptor is a fixed 30-byte little-endian structure the host
//! reads first; it carries the register addresses for everything else, the
//! report-descriptor length, and the maximum report sizes (each inflated by
//! the 2-byte length prefix used on the wire). The wire contract is the byte
//! layout produced by [`HidDescriptor::write_to`], not the struct itself.

use crate::report::{ProductInfo, ReportProtocol, Version};

/// I²C-HID specification version implemented by this device
pub const SPEC_VERSION: Version = Version::new(1, 0);

/// Size of the HID descriptor on the wire
pub const HID_DESCRIPTOR_SIZE: usize = 30;

/// Size of the `[u16 length]` prefix every report frame carries
pub const REPORT_LENGTH_SIZE: usize = 2;

/// The device's sparse register map.
///
/// Only the HID-descriptor register is configurable (it is the one address
/// the host must know in advance, typically from ACPI); the rest are fixed
/// constants advertised through the HID descriptor.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterMap {
    /// Register at which the host reads the 30-byte HID descriptor
    pub hid_descriptor: u16,
}

impl RegisterMap {
    /// Default HID-descriptor register address
    pub const DEFAULT_HID_DESCRIPTOR: u16 = 0x0001;
    /// Read: raw report-descriptor bytes
    pub const REPORT_DESCRIPTOR: u16 = 0x0002;
    /// Advertised in the HID descriptor; never addressed on the wire
    pub const INPUT_REPORT: u16 = 0x0003;
    /// Write: `[u16 length][report bytes]`
    pub const OUTPUT_REPORT: u16 = 0x0004;
    /// Write: opcode frames
    pub const COMMAND: u16 = 0x0005;
    /// Addressed indirectly after COMMAND for replies and payloads
    pub const DATA: u16 = 0x0006;

    /// Map with the given HID-descriptor register
    pub const fn new(hid_descriptor: u16) -> Self {
        Self { hid_descriptor }
    }
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self::new(Self::DEFAULT_HID_DESCRIPTOR)
    }
}

/// In-memory image of the 30-byte HID descriptor.
///
/// Reconstructed on every read so a host-initiated reset observes current
/// values without the device caching wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HidDescriptor {
    /// Total descriptor length, always 30
    pub hid_desc_length: u16,
    /// BCD protocol version, 0x0100
    pub bcd_version: u16,
    /// Report descriptor length in bytes
    pub report_desc_length: u16,
    /// Register for reading the report descriptor
    pub report_desc_register: u16,
    /// Register named in input-pull transactions (informational only)
    pub input_register: u16,
    /// Largest input frame: 2 + max input report size
    pub max_input_length: u16,
    /// Register for OUTPUT report writes
    pub output_register: u16,
    /// Largest output frame: 2 + max output report size
    pub max_output_length: u16,
    /// Register for command frames
    pub command_register: u16,
    /// Register for command payloads and replies
    pub data_register: u16,
    /// Vendor id
    pub vendor_id: u16,
    /// Product id
    pub product_id: u16,
    /// Product version
    pub version_id: u16,
}

impl HidDescriptor {
    /// Assemble the descriptor from the register map, the report-protocol
    /// metadata and the product identity
    pub fn new(regs: &RegisterMap, protocol: &ReportProtocol, pinfo: &ProductInfo) -> Self {
        Self {
            hid_desc_length: HID_DESCRIPTOR_SIZE as u16,
            bcd_version: SPEC_VERSION.bcd(),
            report_desc_length: protocol.descriptor.len() as u16,
            report_desc_register: RegisterMap::REPORT_DESCRIPTOR,
            input_register: RegisterMap::INPUT_REPORT,
            max_input_length: (REPORT_LENGTH_SIZE + protocol.max_input_size) as u16,
            output_register: RegisterMap::OUTPUT_REPORT,
            max_output_length: (REPORT_LENGTH_SIZE + protocol.max_output_size) as u16,
            command_register: RegisterMap::COMMAND,
            data_register: RegisterMap::DATA,
            vendor_id: pinfo.vendor_id,
            product_id: pinfo.product_id,
            version_id: pinfo.version.bcd(),
        }
    }

    /// Serialize into `buf` in wire order; returns the number of bytes
    /// written. `buf` must hold at least [`HID_DESCRIPTOR_SIZE`] bytes.
    pub fn write_to(&self, buf: &mut [u8]) -> usize {
        let fields = [
            self.hid_desc_length,
            self.bcd_version,
            self.report_desc_length,
            self.report_desc_register,
            self.input_register,
            self.max_input_length,
            self.output_register,
            self.max_output_length,
            self.command_register,
            self.data_register,
            self.vendor_id,
            self.product_id,
            self.version_id,
        ];
        for (i, field) in fields.iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&field.to_le_bytes());
        }
        // 4 reserved bytes
        buf[26..HID_DESCRIPTOR_SIZE].fill(0);
        HID_DESCRIPTOR_SIZE
    }
}

/// Read a little-endian u16 at `offset`; `None` when out of range
pub(crate) fn read_u16_le(buf: &[u8], offset: usize) -> Option<u16> {
    let bytes = buf.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}
