//! Slow-path input event PDUs (`TS_INPUT_EVENT` / `TS_INPUT_PDU_DATA`),
//! `[MS-RDPBCGR] 2.2.8.1.1.3`. These travel client-to-server inside a
//! [`crate::slowpath::ShareDataPdu::Input`] and are the slow-path twin of
//! [`crate::fastpath::FastPathInputEvent`] — both feed the same keystroke
//! and pointer-movement observer.

use crate::{ensure_fixed_part_size, invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SyncToggleFlags: u32 {
        const SCROLL_LOCK = 0x1;
        const NUM_LOCK = 0x2;
        const CAPS_LOCK = 0x4;
        const KANA_LOCK = 0x8;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct KeyboardFlags: u16 {
        const EXTENDED = 0x0100;
        const EXTENDED_1 = 0x0200;
        const DOWN = 0x4000;
        const RELEASE = 0x8000;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PointerFlags: u16 {
        const WHEEL_NEGATIVE = 0x0100;
        const VERTICAL_WHEEL = 0x0200;
        const HORIZONTAL_WHEEL = 0x0400;
        const MOVE = 0x0800;
        const LEFT_BUTTON = 0x1000;
        const RIGHT_BUTTON = 0x2000;
        const MIDDLE_BUTTON_OR_WHEEL = 0x4000;
        const DOWN = 0x8000;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PointerXFlags: u16 {
        const DOWN = 0x8000;
        const BUTTON1 = 0x0001;
        const BUTTON2 = 0x0002;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncEvent {
    pub flags: SyncToggleFlags,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnusedEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanCodeEvent {
    pub flags: KeyboardFlags,
    pub key_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeEvent {
    pub flags: KeyboardFlags,
    pub unicode_code: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseEvent {
    pub flags: PointerFlags,
    pub number_of_wheel_rotation_units: i16,
    pub x_position: u16,
    pub y_position: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MouseXEvent {
    pub flags: PointerXFlags,
    pub x_position: u16,
    pub y_position: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Sync(SyncEvent),
    Unused(UnusedEvent),
    ScanCode(ScanCodeEvent),
    Unicode(UnicodeEvent),
    Mouse(MouseEvent),
    MouseX(MouseXEvent),
}

impl InputEvent {
    const NAME: &'static str = "InputEvent";
    const FIXED_PART_SIZE: usize = 4 /* eventTime */ + 2 /* eventType */;

    const TYPE_SYNC: u16 = 0x0000;
    const TYPE_UNUSED: u16 = 0x0002;
    const TYPE_SCANCODE: u16 = 0x0004;
    const TYPE_UNICODE: u16 = 0x0005;
    const TYPE_MOUSE: u16 = 0x8001;
    const TYPE_MOUSEX: u16 = 0x8002;

    fn event_type(&self) -> u16 {
        match self {
            Self::Sync(_) => Self::TYPE_SYNC,
            Self::Unused(_) => Self::TYPE_UNUSED,
            Self::ScanCode(_) => Self::TYPE_SCANCODE,
            Self::Unicode(_) => Self::TYPE_UNICODE,
            Self::Mouse(_) => Self::TYPE_MOUSE,
            Self::MouseX(_) => Self::TYPE_MOUSEX,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            Self::Sync(_) => 6,
            Self::Unused(_) => 6,
            Self::ScanCode(_) | Self::Unicode(_) => 6,
            Self::Mouse(_) | Self::MouseX(_) => 6,
        }
    }
}

impl Encode for InputEvent {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u32(0); // eventTime, ignored by the server
        dst.write_u16(self.event_type());

        match self {
            Self::Sync(event) => {
                dst.write_u16(0); // pad2Octets
                dst.write_u32(event.flags.bits());
            }
            Self::Unused(_) => dst.write_slice(&[0u8; 6]),
            Self::ScanCode(event) => {
                dst.write_u16(event.flags.bits());
                dst.write_u16(event.key_code);
                dst.write_u16(0); // padding
            }
            Self::Unicode(event) => {
                dst.write_u16(event.flags.bits());
                dst.write_u16(event.unicode_code);
                dst.write_u16(0); // padding
            }
            Self::Mouse(event) => {
                let wheel_negative = if event.number_of_wheel_rotation_units < 0 {
                    PointerFlags::WHEEL_NEGATIVE.bits()
                } else {
                    0
                };
                let wheel_rotation = u16::from(event.number_of_wheel_rotation_units as u8);
                dst.write_u16(event.flags.bits() | wheel_negative | wheel_rotation);
                dst.write_u16(event.x_position);
                dst.write_u16(event.y_position);
            }
            Self::MouseX(event) => {
                dst.write_u16(event.flags.bits());
                dst.write_u16(event.x_position);
                dst.write_u16(event.y_position);
            }
        }

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.body_size()
    }
}

impl<'de> Decode<'de> for InputEvent {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _event_time = src.read_u32();
        let event_type = src.read_u16();

        crate::ensure_size!(ctx: Self::NAME, in: src, size: 6);

        Ok(match event_type {
            Self::TYPE_SYNC => {
                src.advance(2); // pad2Octets
                let flags = SyncToggleFlags::from_bits_truncate(src.read_u32());
                Self::Sync(SyncEvent { flags })
            }
            Self::TYPE_UNUSED => {
                src.advance(6);
                Self::Unused(UnusedEvent)
            }
            Self::TYPE_SCANCODE => {
                let flags = KeyboardFlags::from_bits_truncate(src.read_u16());
                let key_code = src.read_u16();
                src.advance(2); // padding
                Self::ScanCode(ScanCodeEvent { flags, key_code })
            }
            Self::TYPE_UNICODE => {
                let flags = KeyboardFlags::from_bits_truncate(src.read_u16());
                let unicode_code = src.read_u16();
                src.advance(2); // padding
                Self::Unicode(UnicodeEvent { flags, unicode_code })
            }
            Self::TYPE_MOUSE => {
                let flags_raw = src.read_u16();
                let flags = PointerFlags::from_bits_truncate(flags_raw);
                let wheel_rotation_bits = flags_raw as u8;
                let number_of_wheel_rotation_units = if flags.contains(PointerFlags::WHEEL_NEGATIVE) {
                    -i16::from(wheel_rotation_bits)
                } else {
                    i16::from(wheel_rotation_bits)
                };
                let x_position = src.read_u16();
                let y_position = src.read_u16();
                Self::Mouse(MouseEvent {
                    flags,
                    number_of_wheel_rotation_units,
                    x_position,
                    y_position,
                })
            }
            Self::TYPE_MOUSEX => {
                let flags = PointerXFlags::from_bits_truncate(src.read_u16());
                let x_position = src.read_u16();
                let y_position = src.read_u16();
                Self::MouseX(MouseXEvent {
                    flags,
                    x_position,
                    y_position,
                })
            }
            _ => return Err(invalid_field_err!(Self::NAME, "eventType", "unknown input event type")),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEventPdu(pub Vec<InputEvent>);

impl Pdu for InputEventPdu {
    const NAME: &'static str = "InputEventPdu";
}

impl InputEventPdu {
    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for InputEventPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u16(self.0.len() as u16);
        dst.write_u16(0); // pad2Octets

        for event in &self.0 {
            event.encode(dst)?;
        }

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.0.iter().map(Encode::size).sum::<usize>()
    }
}

impl<'de> Decode<'de> for InputEventPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let number_of_events = src.read_u16();
        src.advance(2); // pad2Octets

        let events = (0..number_of_events)
            .map(|_| InputEvent::decode(src))
            .collect::<PduResult<Vec<_>>>()?;

        Ok(Self(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_code_event_round_trips() {
        let event = InputEvent::ScanCode(ScanCodeEvent {
            flags: KeyboardFlags::DOWN,
            key_code: 0x1E, // 'A'
        });
        let mut buf = vec![0u8; event.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            event.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(InputEvent::decode(&mut src).unwrap(), event);
    }

    #[test]
    fn mouse_wheel_negative_round_trips() {
        let event = InputEvent::Mouse(MouseEvent {
            flags: PointerFlags::VERTICAL_WHEEL,
            number_of_wheel_rotation_units: -40,
            x_position: 10,
            y_position: 20,
        });
        let mut buf = vec![0u8; event.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            event.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(InputEvent::decode(&mut src).unwrap(), event);
    }

    #[test]
    fn input_event_pdu_round_trips_mixed_events() {
        let pdu = InputEventPdu(vec![
            InputEvent::Sync(SyncEvent {
                flags: SyncToggleFlags::CAPS_LOCK,
            }),
            InputEvent::Unicode(UnicodeEvent {
                flags: KeyboardFlags::empty(),
                unicode_code: 'h' as u16,
            }),
        ]);
        let mut buf = vec![0u8; pdu.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            pdu.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(InputEventPdu::decode(&mut src).unwrap(), pdu);
    }
}
