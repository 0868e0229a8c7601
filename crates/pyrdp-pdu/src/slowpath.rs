//! Slow-path share control / share data framing
//! (`[MS-RDPBCGR] 2.2.1.13`/`2.2.8.1.1.1`) carried inside the
//! basic-security-encrypted MCS `SendDataRequest`/`SendDataIndication`
//! payload once the RDP security layer is up.
//!
//! Only the data PDU kinds this proxy actively parses (capability
//! exchange, synchronize/control handshake, fonts, input, shutdown, server
//! error info) get a typed variant; everything else is kept as an opaque
//! [`ShareDataPdu::Other`] blob so the relay never has to understand a PDU
//! it doesn't act on.

use crate::capability_sets::{ClientConfirmActive, ServerDemandActive};
use crate::client_info::CompressionType;
use crate::input::InputEventPdu;
use crate::nt_status::NtStatus;
use crate::{cast_length, ensure_fixed_part_size, invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BasicSecurityHeaderFlags: u16 {
        const EXCHANGE_PKT = 0x0001;
        const ENCRYPT = 0x0008;
        const RESET_SEQNO = 0x0010;
        const IGNORE_SEQNO = 0x0020;
        const INFO_PKT = 0x0040;
        const LICENSE_PKT = 0x0080;
        const REDIRECTION_PKT = 0x0400;
        const SECURE_CHECKSUM = 0x0800;
        const AUTODETECT_REQ = 0x1000;
        const AUTODETECT_RSP = 0x2000;
        const HEARTBEAT = 0x4000;
        const FLAGSHI_VALID = 0x8000;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicSecurityHeader {
    pub flags: BasicSecurityHeaderFlags,
}

impl Pdu for BasicSecurityHeader {
    const NAME: &'static str = "BasicSecurityHeader";
}

impl BasicSecurityHeader {
    pub const FIXED_PART_SIZE: usize = 4;
}

impl Encode for BasicSecurityHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        ensure_fixed_part_size!(in: dst);
        dst.write_u16(self.flags.bits());
        dst.write_u16(0); // flagsHi, unused
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for BasicSecurityHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);
        let flags = BasicSecurityHeaderFlags::from_bits_truncate(src.read_u16());
        src.advance(2); // flagsHi
        Ok(Self { flags })
    }
}

const PROTOCOL_VERSION: u16 = 0x10;
const SHARE_CONTROL_HEADER_MASK: u16 = 0xF;
const SHARE_CONTROL_HEADER_SIZE: usize = 6 + 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareControlHeader {
    pub pdu_source: u16,
    pub share_id: u32,
    pub pdu: ShareControlPdu,
}

impl Pdu for ShareControlHeader {
    const NAME: &'static str = "ShareControlHeader";
}

impl ShareControlHeader {
    const FIXED_PART_SIZE: usize = SHARE_CONTROL_HEADER_SIZE;
}

impl Encode for ShareControlHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        let pdu_type_with_version = PROTOCOL_VERSION | self.pdu.pdu_type();
        dst.write_u16(cast_length!(Self::NAME, "totalLength", self.size())?);
        dst.write_u16(pdu_type_with_version);
        dst.write_u16(self.pdu_source);
        dst.write_u32(self.share_id);
        self.pdu.encode(dst)
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ShareControlHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let _total_length = src.read_u16();
        let pdu_type_with_version = src.read_u16();
        let pdu_source = src.read_u16();
        let share_id = src.read_u32();

        let pdu_type = pdu_type_with_version & SHARE_CONTROL_HEADER_MASK;
        let pdu = ShareControlPdu::decode_by_type(src, pdu_type)?;

        Ok(Self {
            pdu_source,
            share_id,
            pdu,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareControlPdu {
    DemandActive(ServerDemandActive),
    ConfirmActive(ClientConfirmActive),
    Data(ShareDataHeader),
    DeactivateAll,
    /// Server Redirect and any other control PDU this proxy doesn't act on.
    Other(u16, Vec<u8>),
}

impl ShareControlPdu {
    const NAME: &'static str = "ShareControlPdu";

    const TYPE_DEMAND_ACTIVE: u16 = 0x1;
    const TYPE_CONFIRM_ACTIVE: u16 = 0x3;
    const TYPE_DEACTIVATE_ALL: u16 = 0x6;
    const TYPE_DATA: u16 = 0x7;

    fn pdu_type(&self) -> u16 {
        match self {
            Self::DemandActive(_) => Self::TYPE_DEMAND_ACTIVE,
            Self::ConfirmActive(_) => Self::TYPE_CONFIRM_ACTIVE,
            Self::Data(_) => Self::TYPE_DATA,
            Self::DeactivateAll => Self::TYPE_DEACTIVATE_ALL,
            Self::Other(ty, _) => *ty,
        }
    }

    fn size(&self) -> usize {
        match self {
            Self::DemandActive(pdu) => pdu.size(),
            Self::ConfirmActive(pdu) => pdu.size(),
            Self::Data(header) => header.size(),
            Self::DeactivateAll => 3, // sourceDescriptorLength(2) + sourceDescriptor(1)
            Self::Other(_, buffer) => buffer.len(),
        }
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        match self {
            Self::DemandActive(pdu) => pdu.encode(dst),
            Self::ConfirmActive(pdu) => pdu.encode(dst),
            Self::Data(header) => header.encode(dst),
            Self::DeactivateAll => {
                dst.write_u16(1);
                dst.write_u8(0);
                Ok(())
            }
            Self::Other(_, buffer) => {
                dst.write_slice(buffer);
                Ok(())
            }
        }
    }

    fn decode_by_type(src: &mut ReadCursor<'_>, pdu_type: u16) -> PduResult<Self> {
        match pdu_type {
            Self::TYPE_DEMAND_ACTIVE => Ok(Self::DemandActive(ServerDemandActive::decode(src)?)),
            Self::TYPE_CONFIRM_ACTIVE => Ok(Self::ConfirmActive(ClientConfirmActive::decode(src)?)),
            Self::TYPE_DATA => Ok(Self::Data(ShareDataHeader::decode(src)?)),
            Self::TYPE_DEACTIVATE_ALL => {
                let source_descriptor_length = usize::from(src.read_u16());
                src.try_read_slice(Self::NAME, source_descriptor_length)?;
                Ok(Self::DeactivateAll)
            }
            other => {
                let rest = src.read_remaining();
                Ok(Self::Other(other, rest.to_vec()))
            }
        }
    }
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompressionFlags: u8 {
        const COMPRESSED = 0x20;
        const AT_FRONT = 0x40;
        const FLUSHED = 0x80;
    }
}

const SHARE_DATA_HEADER_SIZE: usize = 1 + 1 + 2 + 1 + 1 + 2;
const SHARE_DATA_HEADER_COMPRESSION_MASK: u8 = 0xF;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareDataHeader {
    pub stream_priority: u8,
    pub compression_flags: CompressionFlags,
    pub compression_type: CompressionType,
    pub pdu: ShareDataPdu,
}

impl ShareDataHeader {
    const NAME: &'static str = "ShareDataHeader";
    const FIXED_PART_SIZE: usize = SHARE_DATA_HEADER_SIZE;
}

impl Encode for ShareDataHeader {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::ensure_size!(ctx: Self::NAME, in: dst, size: self.size());

        dst.write_u8(0); // pad1
        dst.write_u8(self.stream_priority);
        dst.write_u16(cast_length!(Self::NAME, "uncompressedLength", self.pdu.size() + 4)?);
        dst.write_u8(self.pdu.pdu_type());
        dst.write_u8(self.compression_flags.bits() | self.compression_type.to_u8());
        dst.write_u16(0); // compressedLength

        self.pdu.encode(dst)
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE + self.pdu.size()
    }
}

impl<'de> Decode<'de> for ShareDataHeader {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        src.advance(1); // pad1
        let stream_priority = src.read_u8();
        let _uncompressed_length = src.read_u16();
        let pdu_type = src.read_u8();
        let compression_flags_with_type = src.read_u8();
        let _compressed_length = src.read_u16();

        let compression_flags =
            CompressionFlags::from_bits_truncate(compression_flags_with_type & !SHARE_DATA_HEADER_COMPRESSION_MASK);
        let compression_type = CompressionType::from_u8(compression_flags_with_type & SHARE_DATA_HEADER_COMPRESSION_MASK)
            .unwrap_or(CompressionType::K8);

        let pdu = ShareDataPdu::decode_by_type(src, pdu_type)?;

        Ok(Self {
            stream_priority,
            compression_flags,
            compression_type,
            pdu,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ControlAction {
    RequestControl,
    GrantedControl,
    Detach,
    Cooperate,
}

impl ControlAction {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::RequestControl),
            2 => Some(Self::GrantedControl),
            3 => Some(Self::Detach),
            4 => Some(Self::Cooperate),
            _ => None,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            Self::RequestControl => 1,
            Self::GrantedControl => 2,
            Self::Detach => 3,
            Self::Cooperate => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizePdu {
    pub target_user_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPdu {
    pub action: ControlAction,
    pub grant_id: u16,
    pub control_id: u32,
}

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FontSequenceFlags: u16 {
        const FIRST = 1;
        const LAST = 2;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FontPdu {
    pub number: u16,
    pub total_number: u16,
    pub flags: FontSequenceFlags,
    pub entry_size: u16,
}

impl Default for FontPdu {
    fn default() -> Self {
        Self {
            number: 0,
            total_number: 0,
            flags: FontSequenceFlags::FIRST | FontSequenceFlags::LAST,
            entry_size: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSetErrorInfoPdu {
    pub error_info: NtStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareDataPdu {
    Synchronize(SynchronizePdu),
    Control(ControlPdu),
    FontList(FontPdu),
    FontMap(FontPdu),
    Input(InputEventPdu),
    ServerSetErrorInfo(ServerSetErrorInfoPdu),
    ShutdownRequest,
    ShutdownDenied,
    Other(u8, Vec<u8>),
}

impl ShareDataPdu {
    const NAME: &'static str = "ShareDataPdu";

    const TYPE_SYNCHRONIZE: u8 = 0x1F;
    const TYPE_CONTROL: u8 = 0x14;
    const TYPE_INPUT: u8 = 0x1C;
    const TYPE_FONT_LIST: u8 = 0x27;
    const TYPE_FONT_MAP: u8 = 0x28;
    const TYPE_SET_ERROR_INFO: u8 = 0x2F;
    const TYPE_SHUTDOWN_REQUEST: u8 = 0x24;
    const TYPE_SHUTDOWN_DENIED: u8 = 0x25;

    fn pdu_type(&self) -> u8 {
        match self {
            Self::Synchronize(_) => Self::TYPE_SYNCHRONIZE,
            Self::Control(_) => Self::TYPE_CONTROL,
            Self::Input(_) => Self::TYPE_INPUT,
            Self::FontList(_) => Self::TYPE_FONT_LIST,
            Self::FontMap(_) => Self::TYPE_FONT_MAP,
            Self::ServerSetErrorInfo(_) => Self::TYPE_SET_ERROR_INFO,
            Self::ShutdownRequest => Self::TYPE_SHUTDOWN_REQUEST,
            Self::ShutdownDenied => Self::TYPE_SHUTDOWN_DENIED,
            Self::Other(ty, _) => *ty,
        }
    }

    fn size(&self) -> usize {
        match self {
            Self::Synchronize(_) => 4,
            Self::Control(_) => 8,
            Self::Input(pdu) => pdu.size(),
            Self::FontList(_) | Self::FontMap(_) => 8,
            Self::ServerSetErrorInfo(_) => 4,
            Self::ShutdownRequest | Self::ShutdownDenied => 0,
            Self::Other(_, buffer) => buffer.len(),
        }
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        match self {
            Self::Synchronize(pdu) => {
                dst.write_u16(1); // synchronize message type
                dst.write_u16(pdu.target_user_id);
                Ok(())
            }
            Self::Control(pdu) => {
                dst.write_u16(pdu.action.to_u16());
                dst.write_u16(pdu.grant_id);
                dst.write_u32(pdu.control_id);
                Ok(())
            }
            Self::Input(pdu) => pdu.encode(dst),
            Self::FontList(pdu) | Self::FontMap(pdu) => {
                dst.write_u16(pdu.number);
                dst.write_u16(pdu.total_number);
                dst.write_u16(pdu.flags.bits());
                dst.write_u16(pdu.entry_size);
                Ok(())
            }
            Self::ServerSetErrorInfo(pdu) => {
                dst.write_u32(pdu.error_info.to_u32());
                Ok(())
            }
            Self::ShutdownRequest | Self::ShutdownDenied => Ok(()),
            Self::Other(_, buffer) => {
                dst.write_slice(buffer);
                Ok(())
            }
        }
    }

    fn decode_by_type(src: &mut ReadCursor<'_>, pdu_type: u8) -> PduResult<Self> {
        match pdu_type {
            Self::TYPE_SYNCHRONIZE => {
                crate::ensure_size!(ctx: Self::NAME, in: src, size: 4);
                let message_type = src.read_u16();
                if message_type != 1 {
                    return Err(invalid_field_err!(Self::NAME, "messageType", "invalid synchronize message type"));
                }
                Ok(Self::Synchronize(SynchronizePdu {
                    target_user_id: src.read_u16(),
                }))
            }
            Self::TYPE_CONTROL => {
                crate::ensure_size!(ctx: Self::NAME, in: src, size: 8);
                let action = ControlAction::from_u16(src.read_u16())
                    .ok_or_else(|| invalid_field_err!(Self::NAME, "action", "invalid control action"))?;
                let grant_id = src.read_u16();
                let control_id = src.read_u32();
                Ok(Self::Control(ControlPdu {
                    action,
                    grant_id,
                    control_id,
                }))
            }
            Self::TYPE_INPUT => Ok(Self::Input(InputEventPdu::decode(src)?)),
            Self::TYPE_FONT_LIST | Self::TYPE_FONT_MAP => {
                crate::ensure_size!(ctx: Self::NAME, in: src, size: 8);
                let pdu = FontPdu {
                    number: src.read_u16(),
                    total_number: src.read_u16(),
                    flags: FontSequenceFlags::from_bits_truncate(src.read_u16()),
                    entry_size: src.read_u16(),
                };
                Ok(if pdu_type == Self::TYPE_FONT_LIST {
                    Self::FontList(pdu)
                } else {
                    Self::FontMap(pdu)
                })
            }
            Self::TYPE_SET_ERROR_INFO => {
                crate::ensure_size!(ctx: Self::NAME, in: src, size: 4);
                Ok(Self::ServerSetErrorInfo(ServerSetErrorInfoPdu {
                    error_info: NtStatus::from_u32(src.read_u32()),
                }))
            }
            Self::TYPE_SHUTDOWN_REQUEST => Ok(Self::ShutdownRequest),
            Self::TYPE_SHUTDOWN_DENIED => Ok(Self::ShutdownDenied),
            other => Ok(Self::Other(other, src.read_remaining().to_vec())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchronize_round_trips_through_share_data_header() {
        let header = ShareDataHeader {
            stream_priority: 2,
            compression_flags: CompressionFlags::empty(),
            compression_type: CompressionType::K8,
            pdu: ShareDataPdu::Synchronize(SynchronizePdu { target_user_id: 1002 }),
        };
        let mut buf = vec![0u8; header.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            header.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(ShareDataHeader::decode(&mut src).unwrap(), header);
    }

    #[test]
    fn unknown_share_data_pdu_kept_as_opaque_tail() {
        let mut src = ReadCursor::new(&[0xAA, 0xBB, 0xCC]);
        let pdu = ShareDataPdu::decode_by_type(&mut src, 0x02 /* Update, unmodeled */).unwrap();
        assert_eq!(pdu, ShareDataPdu::Other(0x02, vec![0xAA, 0xBB, 0xCC]));
    }

    #[test]
    fn deactivate_all_consumes_source_descriptor() {
        let mut src = ReadCursor::new(&[0x01, 0x00, 0x00]);
        let pdu = ShareControlPdu::decode_by_type(&mut src, 0x6).unwrap();
        assert_eq!(pdu, ShareControlPdu::DeactivateAll);
        assert!(src.is_empty());
    }
}
