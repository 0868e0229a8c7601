//! Fast-path input/output framing (`[MS-RDPBCGR] 2.2.9.1`), the low-overhead
//! twin of [`crate::slowpath`] used once the connection sequence is done:
//! client-to-server keyboard/mouse events and server-to-client graphics
//! updates both travel through here instead of through MCS `SendData*`/
//! share-control framing.

use crate::client_info::CompressionType;
use crate::input::{KeyboardFlags as SlowKeyboardFlags, MouseEvent, MouseXEvent, PointerFlags, PointerXFlags};
use crate::slowpath::CompressionFlags;
use crate::{cast_length, ensure_fixed_part_size, invalid_field_err, per, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EncryptionFlags: u8 {
        const SECURE_CHECKSUM = 0x1;
        const ENCRYPTED = 0x2;
    }
}

const COMPRESSION_SHARE_MASK: u8 = 0xF;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct CompressionUsed: u8 {
        const USED = 0x2;
    }
}

/// Header shared by `TS_FP_INPUT_PDU` and `TS_FP_UPDATE_PDU`: one byte of
/// action/flags bits followed by a PER length that may be 1 or 2 octets.
fn read_header_byte(src: &mut ReadCursor<'_>) -> PduResult<(u8, EncryptionFlags)> {
    crate::ensure_size!(ctx: "FastPathHeader", in: src, size: 1);
    let header = src.read_u8();
    let flags = EncryptionFlags::from_bits_truncate((header >> 6) & 0x3);
    Ok((header, flags))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathInputHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
    pub num_events: u8,
}

impl FastPathInputHeader {
    const NAME: &'static str = "FastPathInputHeader";
    const FIXED_PART_SIZE: usize = 1;
}

impl Encode for FastPathInputHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        let mut header = 0u8;
        if self.num_events < 16 {
            header |= self.num_events << 2;
        }
        header |= self.flags.bits() << 6;
        dst.write_u8(header);

        per::write_length(dst, cast_length!(Self::NAME, "length", self.data_length + self.size())?);
        if self.num_events > 15 {
            dst.write_u8(self.num_events);
        }

        Ok(())
    }

    fn size(&self) -> usize {
        let num_events_length = if self.num_events < 16 { 0 } else { 1 };
        Self::FIXED_PART_SIZE + per::sizeof_length(self.data_length as u16 + num_events_length as u16 + 1) + num_events_length
    }
}

impl<'de> Decode<'de> for FastPathInputHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let (header, flags) = read_header_byte(src)?;
        let mut num_events = (header >> 2) & 0xF;

        let (length, sizeof_length) = per::read_length(src)?;

        if !flags.is_empty() {
            return Err(invalid_field_err!(Self::NAME, "flags", "encrypted fast-path input not supported"));
        }

        let num_events_length = if num_events == 0 {
            crate::ensure_size!(ctx: Self::NAME, in: src, size: 1);
            num_events = src.read_u8();
            1
        } else {
            0
        };

        let consumed = sizeof_length + 1 + num_events_length;
        let data_length = (length as usize)
            .checked_sub(consumed)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "length", "fast-path input length underflow"))?;

        Ok(Self {
            flags,
            data_length,
            num_events,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum FastPathInputEventType {
    ScanCode,
    Mouse,
    MouseX,
    Sync,
    Unicode,
    QoeTimestamp,
}

impl FastPathInputEventType {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::ScanCode),
            0x1 => Some(Self::Mouse),
            0x2 => Some(Self::MouseX),
            0x3 => Some(Self::Sync),
            0x4 => Some(Self::Unicode),
            0x6 => Some(Self::QoeTimestamp),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::ScanCode => 0x0,
            Self::Mouse => 0x1,
            Self::MouseX => 0x2,
            Self::Sync => 0x3,
            Self::Unicode => 0x4,
            Self::QoeTimestamp => 0x6,
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FastPathKeyboardFlags: u8 {
        const RELEASE = 0x01;
        const EXTENDED = 0x02;
        const EXTENDED_1 = 0x04;
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FastPathSyncFlags: u8 {
        const SCROLL_LOCK = 0x01;
        const NUM_LOCK = 0x02;
        const CAPS_LOCK = 0x04;
        const KANA_LOCK = 0x08;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FastPathInputEvent {
    KeyboardEvent(FastPathKeyboardFlags, u8),
    UnicodeKeyboardEvent(FastPathKeyboardFlags, u16),
    Mouse(MouseEvent),
    MouseX(MouseXEvent),
    QoeTimestamp(u32),
    Sync(FastPathSyncFlags),
}

impl FastPathInputEvent {
    const NAME: &'static str = "FastPathInputEvent";
    const FIXED_PART_SIZE: usize = 1;

    fn event_code(&self) -> FastPathInputEventType {
        match self {
            Self::KeyboardEvent(..) => FastPathInputEventType::ScanCode,
            Self::UnicodeKeyboardEvent(..) => FastPathInputEventType::Unicode,
            Self::Mouse(_) => FastPathInputEventType::Mouse,
            Self::MouseX(_) => FastPathInputEventType::MouseX,
            Self::QoeTimestamp(_) => FastPathInputEventType::QoeTimestamp,
            Self::Sync(_) => FastPathInputEventType::Sync,
        }
    }

    fn event_flags_bits(&self) -> u8 {
        match self {
            Self::KeyboardEvent(flags, _) | Self::UnicodeKeyboardEvent(flags, _) => flags.bits(),
            Self::Sync(flags) => flags.bits(),
            _ => 0,
        }
    }
}

/// Encodes one mouse PDU's pointer-flags-and-position body without the
/// slow-path input event's 6-byte `eventTime`/`eventType` envelope.
fn encode_mouse_body(dst: &mut WriteCursor<'_>, event: &MouseEvent) {
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

fn decode_mouse_body(src: &mut ReadCursor<'_>) -> PduResult<MouseEvent> {
    crate::ensure_size!(ctx: FastPathInputEvent::NAME, in: src, size: 6);
    let flags_raw = src.read_u16();
    let flags = PointerFlags::from_bits_truncate(flags_raw);
    let wheel_rotation_bits = flags_raw as u8;
    let number_of_wheel_rotation_units = if flags.contains(PointerFlags::WHEEL_NEGATIVE) {
        -i16::from(wheel_rotation_bits)
    } else {
        i16::from(wheel_rotation_bits)
    };
    Ok(MouseEvent {
        flags,
        number_of_wheel_rotation_units,
        x_position: src.read_u16(),
        y_position: src.read_u16(),
    })
}

fn encode_mouse_x_body(dst: &mut WriteCursor<'_>, event: &MouseXEvent) {
    dst.write_u16(event.flags.bits());
    dst.write_u16(event.x_position);
    dst.write_u16(event.y_position);
}

fn decode_mouse_x_body(src: &mut ReadCursor<'_>) -> PduResult<MouseXEvent> {
    crate::ensure_size!(ctx: FastPathInputEvent::NAME, in: src, size: 6);
    Ok(MouseXEvent {
        flags: PointerXFlags::from_bits_truncate(src.read_u16()),
        x_position: src.read_u16(),
        y_position: src.read_u16(),
    })
}

impl Encode for FastPathInputEvent {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let header = self.event_flags_bits() | (self.event_code().to_u8() << 5);
        dst.write_u8(header);

        match self {
            Self::KeyboardEvent(_, code) => dst.write_u8(*code),
            Self::UnicodeKeyboardEvent(_, code) => dst.write_u16(*code),
            Self::Mouse(event) => encode_mouse_body(dst, event),
            Self::MouseX(event) => encode_mouse_x_body(dst, event),
            Self::QoeTimestamp(stamp) => dst.write_u32(*stamp),
            Self::Sync(_) => {}
        }

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + match self {
                Self::KeyboardEvent(..) => 1,
                Self::UnicodeKeyboardEvent(..) => 2,
                Self::Mouse(_) | Self::MouseX(_) => 6,
                Self::QoeTimestamp(_) => 4,
                Self::Sync(_) => 0,
            }
    }
}

impl<'de> Decode<'de> for FastPathInputEvent {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let flags_bits = header & 0x1F;
        let code = FastPathInputEventType::from_u8(header >> 5)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "code", "unsupported fast-path input event code"))?;

        Ok(match code {
            FastPathInputEventType::ScanCode => {
                crate::ensure_size!(ctx: Self::NAME, in: src, size: 1);
                let code = src.read_u8();
                let flags = FastPathKeyboardFlags::from_bits_truncate(flags_bits);
                Self::KeyboardEvent(flags, code)
            }
            FastPathInputEventType::Unicode => {
                crate::ensure_size!(ctx: Self::NAME, in: src, size: 2);
                let code = src.read_u16();
                let flags = FastPathKeyboardFlags::from_bits_truncate(flags_bits);
                Self::UnicodeKeyboardEvent(flags, code)
            }
            FastPathInputEventType::Mouse => Self::Mouse(decode_mouse_body(src)?),
            FastPathInputEventType::MouseX => Self::MouseX(decode_mouse_x_body(src)?),
            FastPathInputEventType::Sync => Self::Sync(FastPathSyncFlags::from_bits_truncate(flags_bits)),
            FastPathInputEventType::QoeTimestamp => {
                crate::ensure_size!(ctx: Self::NAME, in: src, size: 4);
                Self::QoeTimestamp(src.read_u32())
            }
        })
    }
}

/// `TS_FP_INPUT_PDU`, carrying the events a client sends once fast-path
/// input negotiated via [`crate::capability_sets::InputFlags::FASTPATH_INPUT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathInput(pub Vec<FastPathInputEvent>);

impl Pdu for FastPathInput {
    const NAME: &'static str = "FastPathInput";
}

impl Encode for FastPathInput {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let data_length = self.0.iter().map(Encode::size).sum::<usize>();
        let header = FastPathInputHeader {
            num_events: cast_length!(Self::NAME, "numEvents", self.0.len())?,
            flags: EncryptionFlags::empty(),
            data_length,
        };
        header.encode(dst)?;

        for event in &self.0 {
            event.encode(dst)?;
        }

        Ok(())
    }

    fn size(&self) -> usize {
        let data_length = self.0.iter().map(Encode::size).sum::<usize>();
        let header = FastPathInputHeader {
            num_events: self.0.len().min(255) as u8,
            flags: EncryptionFlags::empty(),
            data_length,
        };
        header.size() + data_length
    }
}

impl<'de> Decode<'de> for FastPathInput {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = FastPathInputHeader::decode(src)?;
        let events = (0..header.num_events)
            .map(|_| FastPathInputEvent::decode(src))
            .collect::<PduResult<Vec<_>>>()?;
        Ok(Self(events))
    }
}

/// `TS_FP_UPDATE_PDU` header: same action/length framing as
/// [`FastPathInputHeader`] but carrying exactly one update instead of a
/// batch, as emitted server-to-client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathUpdateHeader {
    pub flags: EncryptionFlags,
    pub data_length: usize,
}

impl FastPathUpdateHeader {
    const NAME: &'static str = "FastPathUpdateHeader";
    const FIXED_PART_SIZE: usize = 1;
}

impl Encode for FastPathUpdateHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        let header = self.flags.bits() << 6;
        dst.write_u8(header);

        let length = cast_length!(Self::NAME, "length", self.data_length + self.size())?;
        per::write_length(dst, length);

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + per::sizeof_length(self.data_length as u16)
    }
}

impl<'de> Decode<'de> for FastPathUpdateHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let (_header, flags) = read_header_byte(src)?;
        let (length, sizeof_length) = per::read_length(src)?;

        let consumed = sizeof_length + 1;
        let data_length = (length as usize)
            .checked_sub(consumed)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "length", "fast-path update length underflow"))?;

        Ok(Self { flags, data_length })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Fragmentation {
    Single,
    Last,
    First,
    Next,
}

impl Fragmentation {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Single),
            0x1 => Some(Self::Last),
            0x2 => Some(Self::First),
            0x3 => Some(Self::Next),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Single => 0x0,
            Self::Last => 0x1,
            Self::First => 0x2,
            Self::Next => 0x3,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UpdateCode {
    Orders,
    Bitmap,
    Palette,
    Synchronize,
    SurfaceCommands,
    HiddenPointer,
    DefaultPointer,
    PositionPointer,
    ColorPointer,
    CachedPointer,
    NewPointer,
    LargePointer,
}

impl UpdateCode {
    fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Orders),
            0x1 => Some(Self::Bitmap),
            0x2 => Some(Self::Palette),
            0x3 => Some(Self::Synchronize),
            0x4 => Some(Self::SurfaceCommands),
            0x5 => Some(Self::HiddenPointer),
            0x6 => Some(Self::DefaultPointer),
            0x8 => Some(Self::PositionPointer),
            0x9 => Some(Self::ColorPointer),
            0xa => Some(Self::CachedPointer),
            0xb => Some(Self::NewPointer),
            0xc => Some(Self::LargePointer),
            _ => None,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Orders => 0x0,
            Self::Bitmap => 0x1,
            Self::Palette => 0x2,
            Self::Synchronize => 0x3,
            Self::SurfaceCommands => 0x4,
            Self::HiddenPointer => 0x5,
            Self::DefaultPointer => 0x6,
            Self::PositionPointer => 0x8,
            Self::ColorPointer => 0x9,
            Self::CachedPointer => 0xa,
            Self::NewPointer => 0xb,
            Self::LargePointer => 0xc,
        }
    }
}

/// `TS_FP_UPDATE`, a single server-to-client update. The payload is kept as
/// an opaque, possibly-compressed byte slice: decoding graphics orders and
/// bitmap/pointer cache data is [`crate`]'s graphics crate's job once this
/// proxy needs to inspect (rather than merely relay/record) drawing traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastPathUpdatePdu<'a> {
    pub fragmentation: Fragmentation,
    pub update_code: UpdateCode,
    pub compression_flags: Option<CompressionFlags>,
    pub compression_type: Option<CompressionType>,
    pub data: &'a [u8],
}

impl FastPathUpdatePdu<'_> {
    const NAME: &'static str = "FastPathUpdatePdu";
    const FIXED_PART_SIZE: usize = 1;
}

impl Encode for FastPathUpdatePdu<'_> {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let mut header = self.update_code.to_u8() | (self.fragmentation.to_u8() << 4);
        if self.compression_flags.is_some() {
            header |= CompressionUsed::USED.bits() << 6;
        }
        dst.write_u8(header);

        if self.compression_flags.is_some() {
            let compression_flags_with_type = self.compression_flags.map(|f| f.bits()).unwrap_or(0)
                | self.compression_type.map(CompressionType::to_u8).unwrap_or(0);
            dst.write_u8(compression_flags_with_type);
        }

        dst.write_u16(cast_length!(Self::NAME, "size", self.data.len())?);
        dst.write_slice(self.data);

        Ok(())
    }

    fn size(&self) -> usize {
        let compression_flags_size = if self.compression_flags.is_some() { 1 } else { 0 };
        Self::FIXED_PART_SIZE + compression_flags_size + 2 + self.data.len()
    }
}

impl<'de> Decode<'de> for FastPathUpdatePdu<'de> {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let header = src.read_u8();
        let update_code =
            UpdateCode::from_u8(header & 0xF).ok_or_else(|| invalid_field_err!(Self::NAME, "updateCode", "invalid update code"))?;
        let fragmentation = Fragmentation::from_u8((header >> 4) & 0x3)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "fragmentation", "invalid fragmentation"))?;
        let compression_used = (header >> 6) & CompressionUsed::USED.bits() != 0;

        let (compression_flags, compression_type) = if compression_used {
            crate::ensure_size!(ctx: Self::NAME, in: src, size: 1 + 2);
            let compression_flags_with_type = src.read_u8();
            let compression_flags = CompressionFlags::from_bits_truncate(compression_flags_with_type & !COMPRESSION_SHARE_MASK);
            let compression_type = CompressionType::from_u8(compression_flags_with_type & COMPRESSION_SHARE_MASK)
                .ok_or_else(|| invalid_field_err!(Self::NAME, "compressionFlags", "invalid compression type"))?;
            (Some(compression_flags), Some(compression_type))
        } else {
            crate::ensure_size!(ctx: Self::NAME, in: src, size: 2);
            (None, None)
        };

        let data_length = usize::from(src.read_u16());
        let data = src.try_read_slice(Self::NAME, data_length)?;

        Ok(Self {
            fragmentation,
            update_code,
            compression_flags,
            compression_type,
            data,
        })
    }
}

/// Exposed so callers translating between fast-path keyboard flags and the
/// slow-path [`crate::input::KeyboardFlags`] (e.g. when normalizing
/// recorded input for replay) share one conversion point.
impl From<FastPathKeyboardFlags> for SlowKeyboardFlags {
    fn from(value: FastPathKeyboardFlags) -> Self {
        let mut out = SlowKeyboardFlags::empty();
        if value.contains(FastPathKeyboardFlags::EXTENDED) {
            out |= SlowKeyboardFlags::EXTENDED;
        }
        if value.contains(FastPathKeyboardFlags::EXTENDED_1) {
            out |= SlowKeyboardFlags::EXTENDED_1;
        }
        out |= if value.contains(FastPathKeyboardFlags::RELEASE) {
            SlowKeyboardFlags::RELEASE
        } else {
            SlowKeyboardFlags::DOWN
        };
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_path_input_round_trips_mixed_events() {
        let pdu = FastPathInput(vec![
            FastPathInputEvent::KeyboardEvent(FastPathKeyboardFlags::empty(), 0x1E),
            FastPathInputEvent::Mouse(MouseEvent {
                flags: PointerFlags::LEFT_BUTTON | PointerFlags::DOWN,
                number_of_wheel_rotation_units: 0,
                x_position: 100,
                y_position: 200,
            }),
        ]);
        let mut buf = vec![0u8; pdu.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            pdu.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(FastPathInput::decode(&mut src).unwrap(), pdu);
    }

    #[test]
    fn fast_path_update_round_trips_uncompressed() {
        let data = [1u8, 2, 3, 4, 5];
        let pdu = FastPathUpdatePdu {
            fragmentation: Fragmentation::Single,
            update_code: UpdateCode::Bitmap,
            compression_flags: None,
            compression_type: None,
            data: &data,
        };
        let mut buf = vec![0u8; pdu.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            pdu.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(FastPathUpdatePdu::decode(&mut src).unwrap(), pdu);
    }

    #[test]
    fn keyboard_flags_translate_release_to_slow_path() {
        let fast = FastPathKeyboardFlags::RELEASE | FastPathKeyboardFlags::EXTENDED;
        let slow: SlowKeyboardFlags = fast.into();
        assert!(slow.contains(SlowKeyboardFlags::RELEASE));
        assert!(slow.contains(SlowKeyboardFlags::EXTENDED));
        assert!(!slow.contains(SlowKeyboardFlags::DOWN));
    }
}
