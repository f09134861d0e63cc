//! HID application contract
//!
//! The application produces INPUT/FEATURE reports and consumes
//! OUTPUT/FEATURE reports; the device owns one application and drives these
//! callbacks from the bus interrupt context. Callbacks must finish quickly
//! and must not block or allocate.

use crate::device::Link;
use crate::report::{HidProtocol, ReportProtocol, ReportSelector, ReportType};

/// A HID application bound to one [`Device`](crate::device::Device).
///
/// Each callback that may want to answer the host receives a [`Link`]
/// handle exposing `send_report` and `receive_report`; calls on the handle
/// are re-entrant-safe with respect to the device (a `send_report` from
/// inside `get_report` is routed into the pending reply).
pub trait Application {
    /// Report descriptor and derived sizes; immutable for the application's
    /// lifetime
    fn report_protocol(&self) -> &ReportProtocol;

    /// The link came up (the host completed the reset handshake). The
    /// application always starts in REPORT protocol. Use the link to lend
    /// the first output buffer.
    fn start(&mut self, link: &mut Link<'_>);

    /// The link is going down; release any per-session state
    fn stop(&mut self) {}

    /// A host-to-device report arrived. `data` is a prefix of the buffer
    /// previously lent via `receive_report`; the binding is already cleared,
    /// so the callback may lend the next buffer immediately.
    fn set_report(&mut self, link: &mut Link<'_>, ty: ReportType, data: &[u8]);

    /// The host requested a report. Answer by calling `link.send_report`
    /// with matching type and id before returning; otherwise the request is
    /// dropped. `scratch` is spare assembly space valid for this call only.
    fn get_report(&mut self, link: &mut Link<'_>, select: ReportSelector, scratch: &mut [u8]);

    /// The most recently queued input report finished transmitting; its
    /// bytes may be reused
    fn in_report_sent(&mut self, link: &mut Link<'_>, data: &[u8]) {
        let _ = (link, data);
    }

    /// The host changed the link power state (advisory; may arrive outside
    /// the `start`/`stop` window)
    fn set_power_mode(&mut self, on: bool) {
        let _ = on;
    }

    /// Current idle rate of the addressed collection. Idle tracking is
    /// accepted as a no-op on this transport.
    fn idle_rate(&mut self, report_id: u8) -> u16 {
        let _ = report_id;
        0
    }

    /// Host sets the idle rate; `false` rejects the request
    fn set_idle_rate(&mut self, rate: u16, report_id: u8) -> bool {
        let _ = (rate, report_id);
        false
    }

    /// Currently selected protocol mode
    fn protocol(&self) -> HidProtocol {
        HidProtocol::Report
    }

    /// Host switches protocol mode; `false` rejects. BOOT is only
    /// meaningful for legacy keyboard/mouse applications.
    fn set_protocol(&mut self, protocol: HidProtocol) -> bool {
        protocol == HidProtocol::Report
    }
}
