//! The subset of `TS_DEMAND_ACTIVE_PDU`/`TS_CONFIRM_ACTIVE_PDU` capability
//! sets this proxy inspects or rewrites (general, bitmap, order, input,
//! virtual channel, glyph cache). Every other capability set type is
//! preserved as an opaque byte blob so it is relayed verbatim without this
//! crate having to understand it.

use crate::{cast_length, ensure_fixed_part_size, invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

const CAPABILITY_HEADER_SIZE: usize = 4;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GeneralExtraFlags: u16 {
        const FASTPATH_OUTPUT_SUPPORTED = 0x0001;
        const NO_BITMAP_COMPRESSION_HDR = 0x0400;
        const LONG_CREDENTIALS_SUPPORTED = 0x0004;
        const AUTORECONNECT_SUPPORTED = 0x0008;
        const ENC_SALTED_CHECKSUM = 0x0010;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct General {
    pub major_platform_type: u16,
    pub minor_platform_type: u16,
    pub extra_flags: GeneralExtraFlags,
    pub refresh_rect_support: bool,
    pub suppress_output_support: bool,
}

impl General {
    const NAME: &'static str = "General";
    const FIXED_PART_SIZE: usize = 20;
    const PROTOCOL_VER: u16 = 0x0200;
}

impl Encode for General {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.major_platform_type);
        dst.write_u16(self.minor_platform_type);
        dst.write_u16(Self::PROTOCOL_VER);
        dst.write_u16(0); // padding
        dst.write_u16(0); // generalCompressionTypes
        dst.write_u16(self.extra_flags.bits());
        dst.write_u16(0); // updateCapabilityFlag
        dst.write_u16(0); // remoteUnshareFlag
        dst.write_u16(0); // generalCompressionLevel
        dst.write_u8(u8::from(self.refresh_rect_support));
        dst.write_u8(u8::from(self.suppress_output_support));

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for General {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let major_platform_type = src.read_u16();
        let minor_platform_type = src.read_u16();

        let protocol_ver = src.read_u16();
        if protocol_ver != Self::PROTOCOL_VER {
            return Err(invalid_field_err!(Self::NAME, "protocolVersion", "unsupported protocol version"));
        }

        src.advance(2); // padding
        src.advance(2); // generalCompressionTypes
        let extra_flags = GeneralExtraFlags::from_bits_truncate(src.read_u16());
        src.advance(2); // updateCapabilityFlag
        src.advance(2); // remoteUnshareFlag
        src.advance(2); // generalCompressionLevel
        let refresh_rect_support = src.read_u8() != 0;
        let suppress_output_support = src.read_u8() != 0;

        Ok(Self {
            major_platform_type,
            minor_platform_type,
            extra_flags,
            refresh_rect_support,
            suppress_output_support,
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BitmapDrawingFlags: u8 {
        const ALLOW_DYNAMIC_COLOR_FIDELITY = 0x02;
        const ALLOW_COLOR_SUBSAMPLING = 0x04;
        const ALLOW_SKIP_ALPHA = 0x08;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    pub pref_bits_per_pix: u16,
    pub desktop_width: u16,
    pub desktop_height: u16,
    pub desktop_resize_flag: bool,
    pub drawing_flags: BitmapDrawingFlags,
}

impl Bitmap {
    const NAME: &'static str = "Bitmap";
    const FIXED_PART_SIZE: usize = 24;
}

impl Encode for Bitmap {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.pref_bits_per_pix);
        dst.write_u16(1); // receive1BitPerPixel
        dst.write_u16(1); // receive4BitsPerPixel
        dst.write_u16(1); // receive8BitsPerPixel
        dst.write_u16(self.desktop_width);
        dst.write_u16(self.desktop_height);
        dst.write_u16(0); // padding
        dst.write_u16(u16::from(self.desktop_resize_flag));
        dst.write_u16(1); // bitmapCompressionFlag
        dst.write_u8(0); // highColorFlags
        dst.write_u8(self.drawing_flags.bits());
        dst.write_u16(1); // multipleRectangleSupport
        dst.write_u16(0); // padding

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Bitmap {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let pref_bits_per_pix = src.read_u16();
        src.advance(2); // receive1BitPerPixel
        src.advance(2); // receive4BitsPerPixel
        src.advance(2); // receive8BitsPerPixel
        let desktop_width = src.read_u16();
        let desktop_height = src.read_u16();
        src.advance(2); // padding
        let desktop_resize_flag = src.read_u16() != 0;
        src.advance(2); // bitmapCompressionFlag, always set on the wire
        src.advance(1); // highColorFlags
        let drawing_flags = BitmapDrawingFlags::from_bits_truncate(src.read_u8());
        src.advance(2); // multipleRectangleSupport
        src.advance(2); // padding

        Ok(Self {
            pref_bits_per_pix,
            desktop_width,
            desktop_height,
            desktop_resize_flag,
            drawing_flags,
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OrderFlags: u16 {
        const NEGOTIATE_ORDER_SUPPORT = 0x0002;
        const ZERO_BOUNDS_DELTAS_SUPPORT = 0x0008;
        const COLOR_INDEX_SUPPORT = 0x0020;
        const SOLID_PATTERN_BRUSH_ONLY = 0x0040;
        const ORDER_FLAGS_EXTRA_FLAGS = 0x0080;
    }
}

/// Index into [`Order::order_support`]; this proxy only ever reads
/// [`OrderSupportIndex::GlyphIndex`] to gate text-order decoding.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum OrderSupportIndex {
    GlyphIndex = 0x1B,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub order_flags: OrderFlags,
    pub order_support: [u8; 32],
    pub desktop_save_size: u32,
    pub text_ansi_code_page: u16,
}

impl Order {
    const NAME: &'static str = "Order";
    const FIXED_PART_SIZE: usize = 84;

    pub fn supports(&self, index: OrderSupportIndex) -> bool {
        self.order_support[index as usize] != 0
    }
}

impl Encode for Order {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u64(0); // terminalDescriptor (16 bytes)
        dst.write_u64(0);
        dst.write_u32(0); // padding
        dst.write_u16(1); // desktopSaveXGranularity
        dst.write_u16(20); // desktopSaveYGranularity
        dst.write_u16(0); // padding
        dst.write_u16(1); // maximumOrderLevel
        dst.write_u16(0); // numberFonts
        dst.write_u16(self.order_flags.bits());
        dst.write_slice(&self.order_support);
        dst.write_u16(0); // textFlags
        dst.write_u16(0); // orderSupportExFlags
        dst.write_u32(0); // padding
        dst.write_u32(self.desktop_save_size);
        dst.write_u16(0); // padding
        dst.write_u16(0); // padding
        dst.write_u16(self.text_ansi_code_page);
        dst.write_u16(0); // padding

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Order {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        src.advance(16); // terminalDescriptor
        src.advance(4); // padding
        src.advance(2); // desktopSaveXGranularity
        src.advance(2); // desktopSaveYGranularity
        src.advance(2); // padding
        src.advance(2); // maximumOrderLevel
        src.advance(2); // numberFonts

        let order_flags = OrderFlags::from_bits_truncate(src.read_u16());
        let order_support = src.read_array();

        src.advance(2); // textFlags
        src.advance(2); // orderSupportExFlags
        src.advance(4); // padding
        let desktop_save_size = src.read_u32();
        src.advance(2); // padding
        src.advance(2); // padding
        let text_ansi_code_page = src.read_u16();
        src.advance(2); // padding

        Ok(Self {
            order_flags,
            order_support,
            desktop_save_size,
            text_ansi_code_page,
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InputFlags: u16 {
        const SCANCODES = 0x0001;
        const MOUSEX = 0x0004;
        const FASTPATH_INPUT = 0x0008;
        const UNICODE = 0x0010;
        const FASTPATH_INPUT_2 = 0x0020;
        const MOUSE_RELATIVE = 0x0080;
        const TS_MOUSE_HWHEEL = 0x0100;
        const TS_QOE_TIMESTAMPS = 0x0200;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub input_flags: InputFlags,
    pub keyboard_layout: u32,
    pub keyboard_type: u32,
    pub keyboard_subtype: u32,
    pub keyboard_function_key: u32,
}

impl Input {
    const NAME: &'static str = "Input";
    // Fixed part plus the 64-byte keyboardImeFilename tail this proxy never inspects.
    const FIXED_PART_SIZE: usize = 20 + 64;
}

impl Encode for Input {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);

        dst.write_u16(self.input_flags.bits());
        dst.write_u16(0); // padding
        dst.write_u32(self.keyboard_layout);
        dst.write_u32(self.keyboard_type);
        dst.write_u32(self.keyboard_subtype);
        dst.write_u32(self.keyboard_function_key);
        dst.write_slice(&[0u8; 64]); // keyboardImeFilename

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for Input {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let input_flags = InputFlags::from_bits_truncate(src.read_u16());
        src.advance(2); // padding
        let keyboard_layout = src.read_u32();
        let keyboard_type = src.read_u32();
        let keyboard_subtype = src.read_u32();
        let keyboard_function_key = src.read_u32();
        src.advance(64); // keyboardImeFilename

        Ok(Self {
            input_flags,
            keyboard_layout,
            keyboard_type,
            keyboard_subtype,
            keyboard_function_key,
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VirtualChannelFlags: u32 {
        const COMPRESSION_SERVER_TO_CLIENT = 1;
        const COMPRESSION_CLIENT_TO_SERVER_8K = 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualChannel {
    pub flags: VirtualChannelFlags,
    pub chunk_size: Option<u32>,
}

impl VirtualChannel {
    const NAME: &'static str = "VirtualChannel";
    const FIXED_PART_SIZE: usize = 4;
}

impl Encode for VirtualChannel {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u32(self.flags.bits());
        if let Some(chunk_size) = self.chunk_size {
            dst.write_u32(chunk_size);
        }

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.chunk_size.map_or(0, |_| 4)
    }
}

impl<'de> Decode<'de> for VirtualChannel {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let flags = VirtualChannelFlags::from_bits_truncate(src.read_u32());
        // chunkSize is optional on the wire; an older peer may omit it.
        let chunk_size = src.try_read_u32(Self::NAME).ok();

        Ok(Self { flags, chunk_size })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct CacheDefinition {
    pub entries: u16,
    pub max_cell_size: u16,
}

impl CacheDefinition {
    const NAME: &'static str = "CacheDefinition";
    const FIXED_PART_SIZE: usize = 4;

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);
        dst.write_u16(self.entries);
        dst.write_u16(self.max_cell_size);
        Ok(())
    }

    fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);
        Ok(Self {
            entries: src.read_u16(),
            max_cell_size: src.read_u16(),
        })
    }
}

pub const GLYPH_CACHE_NUM: usize = 10;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GlyphSupportLevel {
    None,
    Partial,
    Full,
    Encode,
}

impl GlyphSupportLevel {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::None),
            1 => Some(Self::Partial),
            2 => Some(Self::Full),
            3 => Some(Self::Encode),
            _ => None,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Self::None => 0,
            Self::Partial => 1,
            Self::Full => 2,
            Self::Encode => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlyphCache {
    pub glyph_cache: [CacheDefinition; GLYPH_CACHE_NUM],
    pub frag_cache: CacheDefinition,
    pub glyph_support_level: GlyphSupportLevel,
}

impl GlyphCache {
    const NAME: &'static str = "GlyphCache";
    const FIXED_PART_SIZE: usize = GLYPH_CACHE_NUM * CacheDefinition::FIXED_PART_SIZE + 4 + 2 + 2;
}

impl Encode for GlyphCache {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        for def in &self.glyph_cache {
            def.encode(dst)?;
        }
        self.frag_cache.encode(dst)?;
        dst.write_u16(self.glyph_support_level.to_u16());
        dst.write_u16(0); // padding
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for GlyphCache {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let mut glyph_cache = [CacheDefinition::default(); GLYPH_CACHE_NUM];
        for def in &mut glyph_cache {
            *def = CacheDefinition::decode(src)?;
        }
        let frag_cache = CacheDefinition::decode(src)?;

        crate::ensure_size!(ctx: Self::NAME, in: src, size: 4);
        let glyph_support_level = GlyphSupportLevel::from_u16(src.read_u16())
            .ok_or_else(|| invalid_field_err!(Self::NAME, "glyphSupportLevel", "unknown glyph support level"))?;
        src.advance(2); // padding

        Ok(Self {
            glyph_cache,
            frag_cache,
            glyph_support_level,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilitySet {
    General(General),
    Bitmap(Bitmap),
    Order(Order),
    Input(Input),
    VirtualChannel(VirtualChannel),
    GlyphCache(GlyphCache),
    /// Every capability set type this proxy doesn't need to inspect,
    /// relayed back out byte-for-byte.
    Other(u16, Vec<u8>),
}

impl CapabilitySet {
    const NAME: &'static str = "CapabilitySet";

    const TYPE_GENERAL: u16 = 0x01;
    const TYPE_BITMAP: u16 = 0x02;
    const TYPE_ORDER: u16 = 0x03;
    const TYPE_INPUT: u16 = 0x0D;
    const TYPE_GLYPH_CACHE: u16 = 0x10;
    const TYPE_VIRTUAL_CHANNEL: u16 = 0x14;

    fn capability_type(&self) -> u16 {
        match self {
            Self::General(_) => Self::TYPE_GENERAL,
            Self::Bitmap(_) => Self::TYPE_BITMAP,
            Self::Order(_) => Self::TYPE_ORDER,
            Self::Input(_) => Self::TYPE_INPUT,
            Self::GlyphCache(_) => Self::TYPE_GLYPH_CACHE,
            Self::VirtualChannel(_) => Self::TYPE_VIRTUAL_CHANNEL,
            Self::Other(ty, _) => *ty,
        }
    }

    fn body_size(&self) -> usize {
        match self {
            Self::General(capset) => capset.size(),
            Self::Bitmap(capset) => capset.size(),
            Self::Order(capset) => capset.size(),
            Self::Input(capset) => capset.size(),
            Self::GlyphCache(capset) => capset.size(),
            Self::VirtualChannel(capset) => capset.size(),
            Self::Other(_, buffer) => buffer.len(),
        }
    }
}

impl Encode for CapabilitySet {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u16(self.capability_type());
        dst.write_u16(cast_length!(Self::NAME, "len", self.size())?);

        match self {
            Self::General(capset) => capset.encode(dst),
            Self::Bitmap(capset) => capset.encode(dst),
            Self::Order(capset) => capset.encode(dst),
            Self::Input(capset) => capset.encode(dst),
            Self::GlyphCache(capset) => capset.encode(dst),
            Self::VirtualChannel(capset) => capset.encode(dst),
            Self::Other(_, buffer) => {
                dst.write_slice(buffer);
                Ok(())
            }
        }
    }

    fn size(&self) -> usize {
        CAPABILITY_HEADER_SIZE + self.body_size()
    }
}

impl<'de> Decode<'de> for CapabilitySet {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        crate::ensure_size!(ctx: Self::NAME, in: src, size: CAPABILITY_HEADER_SIZE);

        let capability_type = src.read_u16();
        let length = usize::from(src.read_u16());
        if length < CAPABILITY_HEADER_SIZE {
            return Err(invalid_field_err!(Self::NAME, "lengthCapability", "capability set shorter than its header"));
        }
        let body_length = length - CAPABILITY_HEADER_SIZE;
        let body = src.try_read_slice(Self::NAME, body_length)?;
        let mut body_src = ReadCursor::new(body);

        Ok(match capability_type {
            Self::TYPE_GENERAL => Self::General(General::decode(&mut body_src)?),
            Self::TYPE_BITMAP => Self::Bitmap(Bitmap::decode(&mut body_src)?),
            Self::TYPE_ORDER => Self::Order(Order::decode(&mut body_src)?),
            Self::TYPE_INPUT => Self::Input(Input::decode(&mut body_src)?),
            Self::TYPE_GLYPH_CACHE => Self::GlyphCache(GlyphCache::decode(&mut body_src)?),
            Self::TYPE_VIRTUAL_CHANNEL => Self::VirtualChannel(VirtualChannel::decode(&mut body_src)?),
            other => Self::Other(other, body.to_vec()),
        })
    }
}

/// `TS_DEMAND_ACTIVE_PDU`'s data section: source descriptor plus the
/// capability set list. The server sends this to open capability
/// negotiation; the client mirrors it back wrapped in
/// [`ClientConfirmActive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DemandActive {
    pub source_descriptor: String,
    pub capability_sets: Vec<CapabilitySet>,
}

impl Pdu for DemandActive {
    const NAME: &'static str = "DemandActive";
}

impl DemandActive {
    const FIXED_PART_SIZE: usize = 2 + 2;
}

impl Encode for DemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let combined_length =
            self.capability_sets.iter().map(Encode::size).sum::<usize>() + 2 /* numberCapabilities */ + 2 /* pad2Octets */;

        dst.write_u16(cast_length!(Self::NAME, "sourceDescLen", self.source_descriptor.len() + 1)?);
        dst.write_u16(cast_length!(Self::NAME, "combinedLen", combined_length)?);
        dst.write_slice(self.source_descriptor.as_bytes());
        dst.write_u8(0); // null terminator
        dst.write_u16(cast_length!(Self::NAME, "numberCapabilities", self.capability_sets.len())?);
        dst.write_u16(0); // pad2Octets

        for capability_set in &self.capability_sets {
            capability_set.encode(dst)?;
        }

        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
            + self.source_descriptor.len()
            + 1
            + 2
            + 2
            + self.capability_sets.iter().map(Encode::size).sum::<usize>()
    }
}

impl<'de> Decode<'de> for DemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let source_descriptor_length = usize::from(src.read_u16());
        let _combined_capabilities_length = src.read_u16();

        let descriptor_bytes = src.try_read_slice(Self::NAME, source_descriptor_length)?;
        let source_descriptor = String::from_utf8_lossy(descriptor_bytes)
            .trim_end_matches('\0')
            .to_owned();

        crate::ensure_size!(ctx: Self::NAME, in: src, size: 4);
        let capability_sets_count = usize::from(src.read_u16());
        src.advance(2); // pad2Octets

        let mut capability_sets = Vec::with_capacity(capability_sets_count);
        for _ in 0..capability_sets_count {
            capability_sets.push(CapabilitySet::decode(src)?);
        }

        Ok(Self {
            source_descriptor,
            capability_sets,
        })
    }
}

/// `TS_DEMAND_ACTIVE_PDU` (`[MS-RDPBCGR] 2.2.1.13.1`), sent server to
/// client to open capability negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDemandActive {
    pub pdu: DemandActive,
}

impl Pdu for ServerDemandActive {
    const NAME: &'static str = "ServerDemandActive";
}

impl ServerDemandActive {
    const FIXED_PART_SIZE: usize = 4; // sessionId, ignored by the client
}

impl Encode for ServerDemandActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());
        self.pdu.encode(dst)?;
        dst.write_u32(0); // sessionId
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ServerDemandActive {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let pdu = DemandActive::decode(src)?;
        crate::ensure_size!(ctx: Self::NAME, in: src, size: 4);
        src.advance(4); // sessionId
        Ok(Self { pdu })
    }
}

/// `TS_CONFIRM_ACTIVE_PDU` (`[MS-RDPBCGR] 2.2.1.13.2`), the client's echo
/// of [`ServerDemandActive`] with its own capability sets substituted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfirmActive {
    pub originator_id: u16,
    pub pdu: DemandActive,
}

impl Pdu for ClientConfirmActive {
    const NAME: &'static str = "ClientConfirmActive";
}

impl ClientConfirmActive {
    const FIXED_PART_SIZE: usize = 2;
}

impl Encode for ClientConfirmActive {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);
        dst.write_u16(self.originator_id);
        self.pdu.encode(dst)
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ClientConfirmActive {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);
        let originator_id = src.read_u16();
        let pdu = DemandActive::decode(src)?;
        Ok(Self { originator_id, pdu })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn general_round_trips() {
        let capset = General {
            major_platform_type: 1,
            minor_platform_type: 3,
            extra_flags: GeneralExtraFlags::FASTPATH_OUTPUT_SUPPORTED,
            refresh_rect_support: true,
            suppress_output_support: false,
        };
        let mut buf = vec![0u8; capset.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            capset.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(General::decode(&mut src).unwrap(), capset);
    }

    #[test]
    fn virtual_channel_tolerates_missing_chunk_size() {
        let buf = [0x01, 0x00, 0x00, 0x00];
        let mut src = ReadCursor::new(&buf);
        let capset = VirtualChannel::decode(&mut src).unwrap();
        assert_eq!(capset.chunk_size, None);
        assert_eq!(capset.flags, VirtualChannelFlags::COMPRESSION_SERVER_TO_CLIENT);
    }

    #[test]
    fn order_reports_glyph_index_support() {
        let mut order_support = [0u8; 32];
        order_support[OrderSupportIndex::GlyphIndex as usize] = 1;
        let order = Order {
            order_flags: OrderFlags::NEGOTIATE_ORDER_SUPPORT,
            order_support,
            desktop_save_size: 0,
            text_ansi_code_page: 0,
        };
        assert!(order.supports(OrderSupportIndex::GlyphIndex));
    }

    #[test]
    fn unknown_capability_set_round_trips_as_opaque_blob() {
        let capset = CapabilitySet::Other(0x09, vec![1, 2, 3, 4]);
        let mut buf = vec![0u8; capset.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            capset.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(CapabilitySet::decode(&mut src).unwrap(), capset);
    }

    #[test]
    fn demand_active_round_trips_with_mixed_capability_sets() {
        let demand_active = DemandActive {
            source_descriptor: "RDP".into(),
            capability_sets: vec![
                CapabilitySet::General(General {
                    major_platform_type: 1,
                    minor_platform_type: 3,
                    extra_flags: GeneralExtraFlags::empty(),
                    refresh_rect_support: false,
                    suppress_output_support: false,
                }),
                CapabilitySet::Other(0x09, vec![0xAA, 0xBB]),
            ],
        };
        let mut buf = vec![0u8; demand_active.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            demand_active.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(DemandActive::decode(&mut src).unwrap(), demand_active);
    }
}
