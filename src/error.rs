//! Transport-facing error types

use core::fmt;

/// HID transport operation result type
pub type Result<T> = core::result::Result<T, HidError>;

/// Errors surfaced to the application at the `send_report`/`receive_report`
/// call sites. Host-side protocol violations never appear here; malformed
/// frames are dropped on the bus (the host sees a NACK or dummy bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidError {
    /// Transient: the single-slot input queue is occupied, or the output
    /// buffer binding is being filled by an active host write
    Busy,
    /// Permanent for this call: empty buffer, or a report type that is not
    /// sendable from the current context
    Invalid,
    /// No host link established (before the first RESET handshake, or after
    /// RESET until the host reads the sentinel)
    NoTransport,
}

impl fmt::Display for HidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => write!(f, "Busy"),
            Self::Invalid => write!(f, "Invalid"),
            Self::NoTransport => write!(f, "No transport"),
        }
    }
}

impl HidError {
    /// Check if the same call can succeed later without intervention
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::NoTransport)
    }
}
