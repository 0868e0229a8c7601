//! Wires the negotiated capability set and every input event flowing
//! through a connection into the [`InputObserver`] and [`RDPMITMState`],
//! the way the original MITM's `RDPMITM` glued its sub-observers onto one
//! shared connection state. Fast-path and slow-path input share the same
//! final scancode/mouse handling since both carry the same underlying
//! events over two different wire framings (`[MS-RDPBCGR] 2.2.8.1`).

use pyrdp_pdu::capability_sets::CapabilitySet;
use pyrdp_pdu::fastpath::{FastPathInputEvent, FastPathKeyboardFlags};
use pyrdp_pdu::input::{InputEvent, KeyboardFlags, MouseEvent, ScanCodeEvent};
use pyrdp_pdu::slowpath::{ShareControlPdu, ShareDataPdu};
use pyrdp_session::RDPMITMState;

use crate::input::InputObserver;

/// Per-connection MITM logic: the negotiated capabilities (feeding the
/// drawing-order engine's glyph cache gate) plus the input observer and
/// its shared state. Exists once per client connection; a MITM proxy
/// serving many clients holds one of these per session.
pub struct MitmSession {
    pub state: RDPMITMState,
    pub orders: pyrdp_graphics::OrdersEngine,
    input: InputObserver,
}

impl Default for MitmSession {
    fn default() -> Self {
        Self::new()
    }
}

impl MitmSession {
    pub fn new() -> Self {
        Self {
            state: RDPMITMState::new(),
            orders: pyrdp_graphics::OrdersEngine::new(),
            input: InputObserver::new(),
        }
    }

    /// Applies a `GENERAL` capability's desktop resolution (if present) and
    /// hands every capability set to the drawing-order engine so it can
    /// gate `CACHE_GLYPH`. Called once the client's `ConfirmActive` (or the
    /// server's `DemandActive`, whichever this proxy observes first with a
    /// resolution) is seen.
    pub fn on_capabilities(&mut self, capability_sets: &[CapabilitySet]) {
        self.orders.on_capabilities(capability_sets);
    }

    /// The client's core connection data advertises the desktop size the
    /// server will render into; the login-region heuristic needs it to
    /// turn a raw pixel click into a resolution-independent fraction.
    pub fn on_desktop_size(&mut self, width: u16, height: u16) {
        self.state.window_size = (u32::from(width), u32::from(height));
    }

    /// A slow-path Share Control PDU arrived. `DemandActive`/`ConfirmActive`
    /// feed the capability exchange; `Data(Input)` carries keystrokes and
    /// mouse events.
    pub fn on_share_control(&mut self, pdu: &ShareControlPdu) {
        match pdu {
            ShareControlPdu::DemandActive(demand) => self.on_capabilities(&demand.pdu.capability_sets),
            ShareControlPdu::ConfirmActive(confirm) => self.on_capabilities(&confirm.pdu.capability_sets),
            ShareControlPdu::Data(header) => {
                if let ShareDataPdu::Input(input) = &header.pdu {
                    for event in &input.0 {
                        self.on_input_event(event);
                    }
                }
            }
            ShareControlPdu::DeactivateAll | ShareControlPdu::Other(..) => {}
        }
    }

    fn on_input_event(&mut self, event: &InputEvent) {
        match event {
            InputEvent::ScanCode(scan_code) => self.input.on_scan_code(&mut self.state, scan_code),
            InputEvent::Mouse(mouse) => self.input.on_mouse(&mut self.state, mouse),
            InputEvent::Sync(_) | InputEvent::Unused(_) | InputEvent::Unicode(_) | InputEvent::MouseX(_) => {}
        }
    }

    /// A fast-path input event arrived. Keyboard and mouse events are
    /// translated into the same shapes [`InputObserver`] consumes from the
    /// slow path, so login-candidate detection behaves identically
    /// regardless of which framing the client negotiated.
    pub fn on_fast_path_input(&mut self, event: &FastPathInputEvent) {
        match event {
            FastPathInputEvent::KeyboardEvent(flags, key_code) => {
                let scan_code = ScanCodeEvent {
                    flags: translate_keyboard_flags(*flags),
                    key_code: u16::from(*key_code),
                };
                self.input.on_scan_code(&mut self.state, &scan_code);
            }
            FastPathInputEvent::Mouse(mouse) => self.input.on_mouse(&mut self.state, mouse),
            FastPathInputEvent::UnicodeKeyboardEvent(..)
            | FastPathInputEvent::MouseX(_)
            | FastPathInputEvent::QoeTimestamp(_)
            | FastPathInputEvent::Sync(_) => {}
        }
    }

    /// Decodes and dispatches one update PDU's drawing orders. A no-op
    /// until the client has advertised `CAPSTYPE_ORDER` capability, mirroring
    /// the original renderer which never builds its order parser otherwise.
    pub fn on_orders_update(&mut self, payload: &[u8], frontend: &mut dyn pyrdp_graphics::GdiFrontend) {
        self.orders.parse_update(payload, frontend);
    }
}

fn translate_keyboard_flags(flags: FastPathKeyboardFlags) -> KeyboardFlags {
    let mut out = KeyboardFlags::empty();
    if flags.contains(FastPathKeyboardFlags::RELEASE) {
        out |= KeyboardFlags::RELEASE;
    } else {
        out |= KeyboardFlags::DOWN;
    }
    if flags.contains(FastPathKeyboardFlags::EXTENDED) {
        out |= KeyboardFlags::EXTENDED;
    }
    if flags.contains(FastPathKeyboardFlags::EXTENDED_1) {
        out |= KeyboardFlags::EXTENDED_1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrdp_pdu::input::PointerFlags;

    #[test]
    fn fast_path_scancode_feeds_the_same_login_heuristic_as_slow_path() {
        let mut session = MitmSession::new();

        let press = FastPathInputEvent::KeyboardEvent(FastPathKeyboardFlags::empty(), 0x1E); // 'a'
        session.on_fast_path_input(&press);
        assert_eq!(session.state.input_buffer, "a");
    }

    #[test]
    fn fast_path_mouse_reuses_login_region_heuristic() {
        let mut session = MitmSession::new();
        session.on_desktop_size(1000, 1000);
        session.state.input_buffer = "typed".to_string();

        let event = FastPathInputEvent::Mouse(MouseEvent {
            flags: PointerFlags::DOWN,
            number_of_wheel_rotation_units: 0,
            x_position: 550,
            y_position: 550,
        });
        session.on_fast_path_input(&event);

        assert_eq!(session.state.credentials_candidate.as_deref(), Some("typed"));
    }
}
