//! Clipboard virtual channel (`cliprdr`), `[MS-RDPECLIP]`. This proxy relays
//! clipboard traffic unchanged; it decodes just enough to log what's moving
//! across the channel (format negotiation, data requests/responses) without
//! needing a full redirector implementation, mirroring the original
//! PyRDP clipboard layer's role as a thin pass-through on top of the generic
//! virtual-channel framing.

use pyrdp_core::{ReadCursor, WriteCursor};
use pyrdp_pdu::{cast_length, ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_svc::{CompressionCondition, StaticChannelId, StaticVirtualChannel};

/// `CLIPRDR_HEADER`, `[MS-RDPECLIP] 2.2.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipboardPduHeader {
    pub msg_type: u16,
    pub msg_flags: u16,
    pub data_len: u32,
}

impl Pdu for ClipboardPduHeader {
    const NAME: &'static str = "ClipboardPduHeader";
}

impl ClipboardPduHeader {
    const FIXED_PART_SIZE: usize = 8;
}

impl Encode for ClipboardPduHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);
        dst.write_u16(self.msg_type);
        dst.write_u16(self.msg_flags);
        dst.write_u32(self.data_len);
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for ClipboardPduHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);
        Ok(Self {
            msg_type: src.read_u16(),
            msg_flags: src.read_u16(),
            data_len: src.read_u32(),
        })
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GeneralCapabilityFlags: u32 {
        const USE_LONG_FORMAT_NAMES = 0x0000_0002;
        const STREAM_FILECLIP_ENABLED = 0x0000_0004;
        const FILECLIP_NO_FILE_PATHS = 0x0000_0008;
        const CAN_LOCK_CLIPDATA = 0x0000_0010;
        const HUGE_FILE_SUPPORT_ENABLED = 0x0000_0020;
    }
}

/// A clipboard format announced in a Format List PDU (long form: `formatId`
/// plus a null-terminated UTF-16 format name, empty for the predefined
/// numeric formats such as `CF_TEXT`/`CF_UNICODETEXT`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardFormat {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClipboardPdu {
    MonitorReady,
    FormatList(Vec<ClipboardFormat>),
    FormatListResponse,
    FormatDataRequest { requested_format_id: u32 },
    FormatDataResponse { data: Vec<u8> },
    ClipCaps { flags: GeneralCapabilityFlags },
    /// Every message type this proxy doesn't need to inspect further
    /// (lock/unlock clipdata, temp directory, file-contents request/
    /// response), relayed back out byte-for-byte.
    Other(u16, Vec<u8>),
}

impl ClipboardPdu {
    const NAME: &'static str = "ClipboardPdu";

    const MSG_MONITOR_READY: u16 = 0x0001;
    const MSG_FORMAT_LIST: u16 = 0x0002;
    const MSG_FORMAT_LIST_RESPONSE: u16 = 0x0003;
    const MSG_FORMAT_DATA_REQUEST: u16 = 0x0004;
    const MSG_FORMAT_DATA_RESPONSE: u16 = 0x0005;
    const MSG_CLIP_CAPS: u16 = 0x0007;

    fn msg_type(&self) -> u16 {
        match self {
            Self::MonitorReady => Self::MSG_MONITOR_READY,
            Self::FormatList(_) => Self::MSG_FORMAT_LIST,
            Self::FormatListResponse => Self::MSG_FORMAT_LIST_RESPONSE,
            Self::FormatDataRequest { .. } => Self::MSG_FORMAT_DATA_REQUEST,
            Self::FormatDataResponse { .. } => Self::MSG_FORMAT_DATA_RESPONSE,
            Self::ClipCaps { .. } => Self::MSG_CLIP_CAPS,
            Self::Other(ty, _) => *ty,
        }
    }

    fn data_len(&self) -> usize {
        match self {
            Self::MonitorReady | Self::FormatListResponse => 0,
            Self::FormatList(formats) => formats.iter().map(|f| 4 + (f.name.len() + 1) * 2).sum(),
            Self::FormatDataRequest { .. } => 4,
            Self::FormatDataResponse { data } => data.len(),
            Self::ClipCaps { .. } => 4 /* cCapabilitiesSets + pad */ + 4 /* capabilitySetType + lengthCapability */ + 4,
            Self::Other(_, buffer) => buffer.len(),
        }
    }
}

impl Pdu for ClipboardPdu {
    const NAME: &'static str = "ClipboardPdu";
}

impl Encode for ClipboardPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let data_len = self.data_len();
        ensure_size!(ctx: Self::NAME, in: dst, size: ClipboardPduHeader::FIXED_PART_SIZE + data_len);

        ClipboardPduHeader {
            msg_type: self.msg_type(),
            msg_flags: 0,
            data_len: cast_length!(Self::NAME, "dataLen", data_len)?,
        }
        .encode(dst)?;

        match self {
            Self::MonitorReady | Self::FormatListResponse => {}
            Self::FormatList(formats) => {
                for format in formats {
                    dst.write_u32(format.id);
                    for unit in format.name.encode_utf16() {
                        dst.write_u16(unit);
                    }
                    dst.write_u16(0); // null terminator
                }
            }
            Self::FormatDataRequest { requested_format_id } => dst.write_u32(*requested_format_id),
            Self::FormatDataResponse { data } => dst.write_slice(data),
            Self::ClipCaps { flags } => {
                dst.write_u16(1); // cCapabilitiesSets
                dst.write_u16(0); // pad1
                dst.write_u16(1); // capabilitySetType: CB_CAPSTYPE_GENERAL
                dst.write_u16(12); // lengthCapability
                dst.write_u32(1); // version: CB_CAPS_VERSION_1
                dst.write_u32(flags.bits());
            }
            Self::Other(_, buffer) => dst.write_slice(buffer),
        }

        Ok(())
    }

    fn size(&self) -> usize {
        ClipboardPduHeader::FIXED_PART_SIZE + self.data_len()
    }
}

impl<'de> Decode<'de> for ClipboardPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let header = ClipboardPduHeader::decode(src)?;
        let body = src.try_read_slice(Self::NAME, header.data_len as usize)?;
        let mut body_src = ReadCursor::new(body);

        Ok(match header.msg_type {
            ClipboardPdu::MSG_MONITOR_READY => Self::MonitorReady,
            ClipboardPdu::MSG_FORMAT_LIST_RESPONSE => Self::FormatListResponse,
            ClipboardPdu::MSG_FORMAT_LIST => {
                let mut formats = Vec::new();
                while body_src.len() >= 4 {
                    let id = body_src.read_u32();
                    let mut units = Vec::new();
                    loop {
                        if body_src.len() < 2 {
                            break;
                        }
                        let unit = body_src.read_u16();
                        if unit == 0 {
                            break;
                        }
                        units.push(unit);
                    }
                    let name = String::from_utf16_lossy(&units);
                    formats.push(ClipboardFormat { id, name });
                }
                Self::FormatList(formats)
            }
            ClipboardPdu::MSG_FORMAT_DATA_REQUEST => {
                ensure_size!(ctx: Self::NAME, in: body_src, size: 4);
                Self::FormatDataRequest {
                    requested_format_id: body_src.read_u32(),
                }
            }
            ClipboardPdu::MSG_FORMAT_DATA_RESPONSE => Self::FormatDataResponse {
                data: body_src.read_remaining().to_vec(),
            },
            ClipboardPdu::MSG_CLIP_CAPS => {
                ensure_size!(ctx: Self::NAME, in: body_src, size: 4);
                let _capability_sets = body_src.read_u16();
                body_src.advance(2); // pad1
                let mut flags = GeneralCapabilityFlags::empty();
                if body_src.len() >= 12 {
                    let _capability_set_type = body_src.read_u16();
                    let _length_capability = body_src.read_u16();
                    let _version = body_src.read_u32();
                    flags = GeneralCapabilityFlags::from_bits_truncate(body_src.read_u32());
                }
                Self::ClipCaps { flags }
            }
            other => {
                if header.data_len == 0 && body.is_empty() {
                    Self::Other(other, Vec::new())
                } else {
                    Self::Other(other, body.to_vec())
                }
            }
        })
    }
}

/// The `cliprdr` static virtual channel handler: decodes each reassembled
/// PDU purely for observability and re-encodes it unchanged, since this
/// proxy relays clipboard content rather than rewriting it.
#[derive(Debug, Default)]
pub struct ClipboardChannel;

impl StaticVirtualChannel for ClipboardChannel {
    fn channel_name(&self) -> &'static str {
        "cliprdr"
    }

    fn compression_condition(&self) -> CompressionCondition {
        CompressionCondition::Never
    }

    fn process(&mut self, channel_id: StaticChannelId, payload: &[u8]) -> PduResult<Vec<u8>> {
        let pdu = ClipboardPdu::decode(&mut ReadCursor::new(payload))
            .map_err(|err| invalid_field_err!(Self::NAME, "payload", "malformed clipboard PDU").with_source(err))?;

        tracing::debug!(channel_id, ?pdu, "clipboard PDU");

        let mut buf = vec![0u8; pdu.size()];
        pdu.encode(&mut WriteCursor::new(&mut buf))?;
        Ok(buf)
    }
}

impl ClipboardChannel {
    const NAME: &'static str = "ClipboardChannel";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_list_round_trips() {
        let pdu = ClipboardPdu::FormatList(vec![
            ClipboardFormat {
                id: 13, // CF_UNICODETEXT
                name: String::new(),
            },
            ClipboardFormat {
                id: 49332,
                name: "HTML Format".to_owned(),
            },
        ]);
        let mut buf = vec![0u8; pdu.size()];
        pdu.encode(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(ClipboardPdu::decode(&mut ReadCursor::new(&buf)).unwrap(), pdu);
    }

    #[test]
    fn format_data_response_round_trips() {
        let pdu = ClipboardPdu::FormatDataResponse {
            data: b"hello clipboard".to_vec(),
        };
        let mut buf = vec![0u8; pdu.size()];
        pdu.encode(&mut WriteCursor::new(&mut buf)).unwrap();
        assert_eq!(ClipboardPdu::decode(&mut ReadCursor::new(&buf)).unwrap(), pdu);
    }

    #[test]
    fn channel_relays_payload_unchanged_in_shape() {
        let mut channel = ClipboardChannel;
        let pdu = ClipboardPdu::FormatDataRequest {
            requested_format_id: 13,
        };
        let mut buf = vec![0u8; pdu.size()];
        pdu.encode(&mut WriteCursor::new(&mut buf)).unwrap();

        let relayed = channel.process(1001, &buf).unwrap();
        assert_eq!(ClipboardPdu::decode(&mut ReadCursor::new(&relayed)).unwrap(), pdu);
    }
}
