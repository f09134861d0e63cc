//! Report buffers lent across interrupt contexts
//!
//! The device never copies report payloads it does not have to: queued input
//! reports and the output target buffer are references into application
//! storage that the bus DMA reads or writes while the application continues
//! to own the memory. Rust references cannot express a borrow that is held
//! across interrupt returns, so these handles carry a raw pointer plus a
//! documented validity window instead.

use core::ptr;

/// Borrowed input (or feature) report bytes.
///
/// Held by the device from `send_report` until the matching completion: the
/// `in_report_sent` callback for queued input reports, or the transaction's
/// STOP for a GET_REPORT reply.
#[derive(Debug, Clone, Copy)]
pub struct InReport {
    ptr: *const u8,
    len: usize,
}

impl InReport {
    /// Wrap borrowed report bytes.
    ///
    /// # Safety
    ///
    /// The bytes must remain valid, unmoved and unmodified until the device
    /// releases them: for an INPUT report, when `in_report_sent` returns (or
    /// the send failed); for a GET_REPORT reply, when the host transaction
    /// stops. Overwriting the buffer earlier puts stale bytes on the wire.
    pub unsafe fn new(data: &[u8]) -> Self {
        Self {
            ptr: data.as_ptr(),
            len: data.len(),
        }
    }

    /// Wrap static report bytes; the validity window is trivially satisfied
    pub fn from_static(data: &'static [u8]) -> Self {
        Self {
            ptr: data.as_ptr(),
            len: data.len(),
        }
    }

    /// The zero-length report used as the reset sentinel
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: ptr::null(),
            len: 0,
        }
    }

    /// Report length in bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether this is the zero-length sentinel
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the bytes.
    ///
    /// # Safety
    ///
    /// Only within the validity window promised to [`InReport::new`], and the
    /// report must be non-empty.
    pub(crate) unsafe fn as_slice<'a>(&self) -> &'a [u8] {
        // SAFETY: non-null and valid per the constructor contract
        unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
    }

    /// First byte (the report id when ids are used).
    ///
    /// # Safety
    ///
    /// Same window as [`InReport::as_slice`]; the report must be non-empty.
    pub(crate) unsafe fn first(&self) -> u8 {
        // SAFETY: caller guarantees len > 0
        unsafe { *self.ptr }
    }

    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.ptr
    }
}

// The pointee is application storage pinned for the transfer; the handle
// itself is freely movable between contexts.
unsafe impl Send for InReport {}

/// Mutable target buffer for host-to-device reports.
///
/// Lent by the application through `receive_report`; the device streams the
/// next OUTPUT (or SET_REPORT) payload into it and returns it to the
/// application as the `data` argument of `set_report`. The binding is
/// cleared before `set_report` runs, so the callback may immediately re-lend.
#[derive(Debug, Clone, Copy)]
pub struct OutBuffer {
    ptr: *mut u8,
    len: usize,
}

impl OutBuffer {
    /// Wrap a borrowed receive buffer.
    ///
    /// # Safety
    ///
    /// The buffer must remain valid and unmoved, and must not be read or
    /// written by the application, until the device delivers it back through
    /// `set_report` (or the binding is replaced by another `receive_report`).
    pub unsafe fn new(data: &mut [u8]) -> Self {
        Self {
            ptr: data.as_mut_ptr(),
            len: data.len(),
        }
    }

    /// The unbound state
    pub(crate) const fn unbound() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    /// Capacity in bytes, 0 when unbound
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether no buffer is currently bound
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// View the buffer.
    ///
    /// # Safety
    ///
    /// Only while the binding is live and no bus transfer is writing into it.
    pub(crate) unsafe fn as_mut_slice<'a>(&self) -> &'a mut [u8] {
        // SAFETY: non-null and valid per the constructor contract
        unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    pub(crate) fn as_mut_ptr(&self) -> *mut u8 {
        self.ptr
    }
}

unsafe impl Send for OutBuffer {}
