//! T.125 Multipoint Communication Service (MCS) PDUs carried inside X.224
//! data TPDUs: domain erection, user attach, channel join, data transfer,
//! and provider-initiated disconnect, plus the BER-encoded
//! `Connect-Initial`/`Connect-Response` pair exchanged before any of those.
//!
//! Unlike the teacher's `ironrdp-pdu::mcs`, the decoders here are tolerant:
//! a handful of fields that a strict implementation would reject on a short
//! or malformed read instead fall back to a sane default and let the session
//! continue, because this proxy must relay whatever a real client or server
//! sends rather than refuse it.

use crate::{ber, ensure_fixed_part_size, ensure_size, invalid_field_err, per, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

pub const RESULT_ENUM_LENGTH: u8 = 16;

/// Base offset added to MCS user/channel ids so that a freshly attached
/// user's own channel (`userId`) and the RDP "user channel" sit above the
/// reserved static channel range.
pub const USERCHANNEL_BASE: u16 = 1001;

const SEND_DATA_PRIORITY_AND_SEGMENTATION: u8 = 0x70;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
enum DomainMcsPdu {
    ErectDomainRequest = 1,
    DisconnectProviderUltimatum = 8,
    AttachUserRequest = 10,
    AttachUserConfirm = 11,
    ChannelJoinRequest = 14,
    ChannelJoinConfirm = 15,
    SendDataRequest = 25,
    SendDataIndication = 26,
}

impl DomainMcsPdu {
    fn from_choice(choice: u8) -> Option<Self> {
        Self::from_u8(choice >> 2)
    }

    fn to_choice(self) -> u8 {
        (self as u8) << 2
    }

    fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ErectDomainRequest),
            8 => Some(Self::DisconnectProviderUltimatum),
            10 => Some(Self::AttachUserRequest),
            11 => Some(Self::AttachUserConfirm),
            14 => Some(Self::ChannelJoinRequest),
            15 => Some(Self::ChannelJoinConfirm),
            25 => Some(Self::SendDataRequest),
            26 => Some(Self::SendDataIndication),
            _ => None,
        }
    }
}

fn read_mcspdu_header(src: &mut ReadCursor<'_>, ctx: &'static str) -> PduResult<DomainMcsPdu> {
    let choice = src.try_read_u8(ctx)?;
    DomainMcsPdu::from_choice(choice).ok_or_else(|| invalid_field_err!(ctx, "domain-mcspdu", "unexpected choice value"))
}

fn write_mcspdu_header(dst: &mut WriteCursor<'_>, pdu: DomainMcsPdu, options: u8) {
    dst.write_u8(pdu.to_choice() | options);
}

/// Domain PDU requesting domain erection. `sub_height`/`sub_interval` are
/// never inspected by this proxy; a client that sends a truncated PDU still
/// gets relayed rather than dropped, with both fields defaulting to `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErectDomainPdu {
    pub sub_height: u32,
    pub sub_interval: u32,
}

impl Pdu for ErectDomainPdu {
    const NAME: &'static str = "ErectDomainPdu";
}

impl Encode for ErectDomainPdu {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::ErectDomainRequest, 0);
        per::write_u32(dst, self.sub_height);
        per::write_u32(dst, self.sub_interval);
        Ok(())
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::sizeof_u32(self.sub_height) + per::sizeof_u32(self.sub_interval)
    }
}

impl<'de> Decode<'de> for ErectDomainPdu {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let pdu = read_mcspdu_header(src, Self::NAME)?;
        if pdu != DomainMcsPdu::ErectDomainRequest {
            return Err(invalid_field_err!(Self::NAME, "domain-mcspdu", "expected erectDomainRequest"));
        }

        let sub_height = per::read_u32(src).unwrap_or(0);
        let sub_interval = per::read_u32(src).unwrap_or(0);

        Ok(Self { sub_height, sub_interval })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachUserRequest;

impl Pdu for AttachUserRequest {
    const NAME: &'static str = "AttachUserRequest";
}

impl Encode for AttachUserRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::AttachUserRequest, 0);
        Ok(())
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE
    }
}

impl<'de> Decode<'de> for AttachUserRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let pdu = read_mcspdu_header(src, Self::NAME)?;
        if pdu != DomainMcsPdu::AttachUserRequest {
            return Err(invalid_field_err!(Self::NAME, "domain-mcspdu", "expected attachUserRequest"));
        }
        Ok(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachUserConfirm {
    pub result: u8,
    pub initiator_id: u16,
}

impl Pdu for AttachUserConfirm {
    const NAME: &'static str = "AttachUserConfirm";
}

impl Encode for AttachUserConfirm {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::AttachUserConfirm, 2);
        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, USERCHANNEL_BASE)?;
        Ok(())
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE
    }
}

impl<'de> Decode<'de> for AttachUserConfirm {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let pdu = read_mcspdu_header(src, Self::NAME)?;
        if pdu != DomainMcsPdu::AttachUserConfirm {
            return Err(invalid_field_err!(Self::NAME, "domain-mcspdu", "expected attachUserConfirm"));
        }

        let result = per::read_enum(src, RESULT_ENUM_LENGTH)?;
        let initiator_id = per::read_u16(src, USERCHANNEL_BASE)?;

        Ok(Self { result, initiator_id })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelJoinRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
}

impl Pdu for ChannelJoinRequest {
    const NAME: &'static str = "ChannelJoinRequest";
}

impl Encode for ChannelJoinRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::ChannelJoinRequest, 0);
        per::write_u16(dst, self.initiator_id, USERCHANNEL_BASE)?;
        per::write_u16(dst, self.channel_id, 0)?;
        Ok(())
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::U16_SIZE * 2
    }
}

impl<'de> Decode<'de> for ChannelJoinRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let pdu = read_mcspdu_header(src, Self::NAME)?;
        if pdu != DomainMcsPdu::ChannelJoinRequest {
            return Err(invalid_field_err!(Self::NAME, "domain-mcspdu", "expected channelJoinRequest"));
        }

        let initiator_id = per::read_u16(src, USERCHANNEL_BASE)?;
        let channel_id = per::read_u16(src, 0)?;

        Ok(Self { initiator_id, channel_id })
    }
}

/// Channel join confirmation. Real servers always send the joined
/// `channel_id`, but it is formally OPTIONAL in T.125 when `result` is
/// non-zero; a decode that runs out of input after `requested_channel_id`
/// falls back to treating the join as confirmed onto the requested channel
/// rather than failing the whole PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelJoinConfirm {
    pub result: u8,
    pub initiator_id: u16,
    pub requested_channel_id: u16,
    pub channel_id: u16,
}

impl Pdu for ChannelJoinConfirm {
    const NAME: &'static str = "ChannelJoinConfirm";
}

impl Encode for ChannelJoinConfirm {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::ChannelJoinConfirm, 2);
        per::write_enum(dst, self.result);
        per::write_u16(dst, self.initiator_id, USERCHANNEL_BASE)?;
        per::write_u16(dst, self.requested_channel_id, 0)?;
        per::write_u16(dst, self.channel_id, 0)?;
        Ok(())
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::ENUM_SIZE + per::U16_SIZE * 3
    }
}

impl<'de> Decode<'de> for ChannelJoinConfirm {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let pdu = read_mcspdu_header(src, Self::NAME)?;
        if pdu != DomainMcsPdu::ChannelJoinConfirm {
            return Err(invalid_field_err!(Self::NAME, "domain-mcspdu", "expected channelJoinConfirm"));
        }

        let result = per::read_enum(src, RESULT_ENUM_LENGTH)?;
        let initiator_id = per::read_u16(src, USERCHANNEL_BASE)?;
        let requested_channel_id = per::read_u16(src, 0)?;
        let channel_id = per::read_u16(src, 0).unwrap_or(requested_channel_id);

        Ok(Self {
            result,
            initiator_id,
            requested_channel_id,
            channel_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataRequest {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Vec<u8>,
}

impl Pdu for SendDataRequest {
    const NAME: &'static str = "SendDataRequest";
}

impl Encode for SendDataRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::SendDataRequest, 0);
        per::write_u16(dst, self.initiator_id, USERCHANNEL_BASE)?;
        per::write_u16(dst, self.channel_id, 0)?;
        dst.write_u8(SEND_DATA_PRIORITY_AND_SEGMENTATION);
        per::write_length(dst, crate::cast_length!(Self::NAME, "userData", self.user_data.len())?);
        dst.write_slice(&self.user_data);
        Ok(())
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::U16_SIZE * 2 + 1 + per::sizeof_length(self.user_data.len() as u16) + self.user_data.len()
    }
}

impl<'de> Decode<'de> for SendDataRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        decode_send_data(src, Self::NAME, DomainMcsPdu::SendDataRequest).map(|(initiator_id, channel_id, user_data)| Self {
            initiator_id,
            channel_id,
            user_data,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendDataIndication {
    pub initiator_id: u16,
    pub channel_id: u16,
    pub user_data: Vec<u8>,
}

impl Pdu for SendDataIndication {
    const NAME: &'static str = "SendDataIndication";
}

impl Encode for SendDataIndication {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        write_mcspdu_header(dst, DomainMcsPdu::SendDataIndication, 0);
        per::write_u16(dst, self.initiator_id, USERCHANNEL_BASE)?;
        per::write_u16(dst, self.channel_id, 0)?;
        dst.write_u8(SEND_DATA_PRIORITY_AND_SEGMENTATION);
        per::write_length(dst, crate::cast_length!(Self::NAME, "userData", self.user_data.len())?);
        dst.write_slice(&self.user_data);
        Ok(())
    }

    fn size(&self) -> usize {
        per::CHOICE_SIZE + per::U16_SIZE * 2 + 1 + per::sizeof_length(self.user_data.len() as u16) + self.user_data.len()
    }
}

impl<'de> Decode<'de> for SendDataIndication {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        decode_send_data(src, Self::NAME, DomainMcsPdu::SendDataIndication).map(|(initiator_id, channel_id, user_data)| Self {
            initiator_id,
            channel_id,
            user_data,
        })
    }
}

fn decode_send_data(src: &mut ReadCursor<'_>, name: &'static str, expected: DomainMcsPdu) -> PduResult<(u16, u16, Vec<u8>)> {
    let pdu = read_mcspdu_header(src, name)?;
    if pdu != expected {
        return Err(invalid_field_err!(name, "domain-mcspdu", "unexpected MCS PDU choice"));
    }

    let initiator_id = per::read_u16(src, USERCHANNEL_BASE)?;
    let channel_id = per::read_u16(src, 0)?;

    // dataPriority + segmentation, never inspected by this proxy
    ensure_size!(ctx: name, in: src, size: 1);
    src.advance(1);

    let (length, _) = per::read_length(src)?;
    let length = usize::from(length);
    ensure_size!(ctx: name, in: src, size: length);
    let user_data = src.read_slice(length).to_vec();

    Ok((initiator_id, channel_id, user_data))
}

/// The reason carried by `DisconnectProviderUltimatum`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum DisconnectReason {
    DomainDisconnected = 0,
    ProviderInitiated = 1,
    TokenPurged = 2,
    UserRequested = 3,
    ChannelPurged = 4,
}

impl DisconnectReason {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DomainDisconnected),
            1 => Some(Self::ProviderInitiated),
            2 => Some(Self::TokenPurged),
            3 => Some(Self::UserRequested),
            4 => Some(Self::ChannelPurged),
            _ => None,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisconnectProviderUltimatum {
    pub reason: DisconnectReason,
}

impl Pdu for DisconnectProviderUltimatum {
    const NAME: &'static str = "DisconnectProviderUltimatum";
}

impl DisconnectProviderUltimatum {
    pub const FIXED_PART_SIZE: usize = 2;
}

impl Encode for DisconnectProviderUltimatum {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let domain_mcspdu = DomainMcsPdu::DisconnectProviderUltimatum as u8;
        let reason = self.reason as u8;

        let b1 = (domain_mcspdu << 2) | ((reason >> 1) & 0x03);
        let b2 = reason << 7;
        dst.write_array([b1, b2]);
        Ok(())
    }

    fn size(&self) -> usize {
        Self::FIXED_PART_SIZE
    }
}

impl<'de> Decode<'de> for DisconnectProviderUltimatum {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        // PER encoded (ALIGNED variant of BASIC-PER) PDU contents, e.g. `21 80`:
        //
        //   0x21 = 00100001: choice(6 bits) = disconnectProviderUltimatum(8), reason high bit
        //   0x80 = 10000000: reason low bits, then padding
        ensure_fixed_part_size!(in: src);
        let [b1, b2] = src.read_array();

        let domain_mcspdu_choice = b1 >> 2;
        let reason = ((b1 & 0x03) << 1) | (b2 >> 7);

        let pdu = DomainMcsPdu::from_u8(domain_mcspdu_choice)
            .ok_or_else(|| invalid_field_err!(Self::NAME, "domain-mcspdu", "unexpected choice value"))?;
        if pdu != DomainMcsPdu::DisconnectProviderUltimatum {
            return Err(invalid_field_err!(Self::NAME, "domain-mcspdu", "expected disconnectProviderUltimatum"));
        }

        Ok(Self {
            reason: DisconnectReason::from_u8(reason).ok_or_else(|| invalid_field_err!(Self::NAME, "reason", "unknown variant"))?,
        })
    }
}

/// One side's view of the negotiated domain limits (channel/user/token
/// counts, throughput, max PDU size). `min()`/`target()`/`max()` are the
/// canonical triple every RDP client offers in `Connect-Initial`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainParameters {
    pub max_channel_ids: u32,
    pub max_user_ids: u32,
    pub max_token_ids: u32,
    pub num_priorities: u32,
    pub min_throughput: u32,
    pub max_height: u32,
    pub max_mcs_pdu_size: u32,
    pub protocol_version: u32,
}

impl DomainParameters {
    pub fn min() -> Self {
        Self {
            max_channel_ids: 1,
            max_user_ids: 1,
            max_token_ids: 1,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 1056,
            protocol_version: 2,
        }
    }

    pub fn target() -> Self {
        Self {
            max_channel_ids: 34,
            max_user_ids: 2,
            max_token_ids: 0,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 65535,
            protocol_version: 2,
        }
    }

    pub fn max() -> Self {
        Self {
            max_channel_ids: 65535,
            max_user_ids: 64535,
            max_token_ids: 65535,
            num_priorities: 1,
            min_throughput: 0,
            max_height: 1,
            max_mcs_pdu_size: 65535,
            protocol_version: 2,
        }
    }

    /// Downgrades `requested` so every field sits within `[min, max]`,
    /// clamping rather than rejecting the connection outright.
    pub fn downgrade(requested: &Self, min: &Self, max: &Self) -> Self {
        fn clamp(value: u32, lo: u32, hi: u32) -> u32 {
            value.clamp(lo.min(hi), lo.max(hi))
        }

        Self {
            max_channel_ids: clamp(requested.max_channel_ids, min.max_channel_ids, max.max_channel_ids),
            max_user_ids: clamp(requested.max_user_ids, min.max_user_ids, max.max_user_ids),
            max_token_ids: clamp(requested.max_token_ids, min.max_token_ids, max.max_token_ids),
            num_priorities: clamp(requested.num_priorities, min.num_priorities, max.num_priorities),
            min_throughput: requested.min_throughput,
            max_height: clamp(requested.max_height, min.max_height, max.max_height),
            max_mcs_pdu_size: clamp(requested.max_mcs_pdu_size, min.max_mcs_pdu_size, max.max_mcs_pdu_size),
            protocol_version: requested.protocol_version,
        }
    }

    fn fields_buffer_ber_length(&self) -> usize {
        ber::sizeof_integer(self.max_channel_ids)
            + ber::sizeof_integer(self.max_user_ids)
            + ber::sizeof_integer(self.max_token_ids)
            + ber::sizeof_integer(self.num_priorities)
            + ber::sizeof_integer(self.min_throughput)
            + ber::sizeof_integer(self.max_height)
            + ber::sizeof_integer(self.max_mcs_pdu_size)
            + ber::sizeof_integer(self.protocol_version)
    }
}

impl Pdu for DomainParameters {
    const NAME: &'static str = "DomainParameters";
}

impl Encode for DomainParameters {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let body_len = self.fields_buffer_ber_length();
        ber::write_sequence_tag(dst, crate::cast_length!(Self::NAME, "seq", body_len)?)?;
        ber::write_integer(dst, self.max_channel_ids)?;
        ber::write_integer(dst, self.max_user_ids)?;
        ber::write_integer(dst, self.max_token_ids)?;
        ber::write_integer(dst, self.num_priorities)?;
        ber::write_integer(dst, self.min_throughput)?;
        ber::write_integer(dst, self.max_height)?;
        ber::write_integer(dst, self.max_mcs_pdu_size)?;
        ber::write_integer(dst, self.protocol_version)?;
        Ok(())
    }

    fn size(&self) -> usize {
        let body_len = self.fields_buffer_ber_length();
        body_len + ber::sizeof_sequence_tag(body_len as u16)
    }
}

impl<'de> Decode<'de> for DomainParameters {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ber::read_sequence_tag(src)?;
        Ok(Self {
            max_channel_ids: ber::read_integer(src)? as u32,
            max_user_ids: ber::read_integer(src)? as u32,
            max_token_ids: ber::read_integer(src)? as u32,
            num_priorities: ber::read_integer(src)? as u32,
            min_throughput: ber::read_integer(src)? as u32,
            max_height: ber::read_integer(src)? as u32,
            max_mcs_pdu_size: ber::read_integer(src)? as u32,
            protocol_version: ber::read_integer(src)? as u32,
        })
    }
}

const MCS_TYPE_CONNECT_INITIAL: u8 = 0x65;
const MCS_TYPE_CONNECT_RESPONSE: u8 = 0x66;

/// A BER `BOOLEAN` or single-byte `ENUMERATED` is always tag + length + one
/// value byte.
const BER_SIZEOF_BOOL_OR_ENUMERATED: usize = 3;

/// `Connect-Initial`, carried inside the first X.224 data TPDU from the
/// client. `gcc_user_data` is the opaque GCC `ClientGccBlocks` blob (client
/// core/security/network/cluster data): this proxy relays it byte-for-byte
/// and only inspects the bytes that matter to the MITM state machine
/// (notably the client's requested color depth and channel list, parsed out
/// of this blob by `pyrdp-mitm`), rather than fully modeling every GCC data
/// block the way a general-purpose RDP client library would.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectInitial {
    pub calling_domain_selector: Vec<u8>,
    pub called_domain_selector: Vec<u8>,
    pub upward_flag: bool,
    pub target_parameters: DomainParameters,
    pub min_parameters: DomainParameters,
    pub max_parameters: DomainParameters,
    pub gcc_user_data: Vec<u8>,
}

impl ConnectInitial {
    fn fields_buffer_ber_length(&self) -> usize {
        ber::sizeof_octet_string(self.calling_domain_selector.len() as u16)
            + ber::sizeof_octet_string(self.called_domain_selector.len() as u16)
            + BER_SIZEOF_BOOL_OR_ENUMERATED
            + (self.target_parameters.size() + self.min_parameters.size() + self.max_parameters.size())
            + ber::sizeof_octet_string(self.gcc_user_data.len() as u16)
    }
}

impl Pdu for ConnectInitial {
    const NAME: &'static str = "ConnectInitial";
}

impl Encode for ConnectInitial {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let body_len = self.fields_buffer_ber_length();
        ber::write_application_tag(dst, MCS_TYPE_CONNECT_INITIAL, body_len as u16)?;
        ber::write_octet_string(dst, &self.calling_domain_selector)?;
        ber::write_octet_string(dst, &self.called_domain_selector)?;
        ber::write_bool(dst, self.upward_flag)?;
        self.target_parameters.encode(dst)?;
        self.min_parameters.encode(dst)?;
        self.max_parameters.encode(dst)?;
        ber::write_octet_string(dst, &self.gcc_user_data)?;
        Ok(())
    }

    fn size(&self) -> usize {
        let body_len = self.fields_buffer_ber_length();
        body_len + ber::sizeof_application_tag(MCS_TYPE_CONNECT_INITIAL, body_len as u16)
    }
}

impl<'de> Decode<'de> for ConnectInitial {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ber::read_application_tag(src, MCS_TYPE_CONNECT_INITIAL)?;
        let calling_domain_selector = ber::read_octet_string(src)?;
        let called_domain_selector = ber::read_octet_string(src)?;
        let upward_flag = ber::read_bool(src)?;
        let target_parameters = DomainParameters::decode(src)?;
        let min_parameters = DomainParameters::decode(src)?;
        let max_parameters = DomainParameters::decode(src)?;
        let gcc_user_data = ber::read_octet_string(src)?;

        Ok(Self {
            calling_domain_selector,
            called_domain_selector,
            upward_flag,
            target_parameters,
            min_parameters,
            max_parameters,
            gcc_user_data,
        })
    }
}

/// `Connect-Response`, the server's answer to `Connect-Initial`.
/// `gcc_user_data` is the opaque GCC `ServerGccBlocks` blob, for the same
/// reason `ConnectInitial::gcc_user_data` is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectResponse {
    pub called_connect_id: u32,
    pub domain_parameters: DomainParameters,
    pub gcc_user_data: Vec<u8>,
}

impl ConnectResponse {
    fn fields_buffer_ber_length(&self) -> usize {
        BER_SIZEOF_BOOL_OR_ENUMERATED
            + ber::sizeof_integer(self.called_connect_id)
            + self.domain_parameters.size()
            + ber::sizeof_octet_string(self.gcc_user_data.len() as u16)
    }
}

impl Pdu for ConnectResponse {
    const NAME: &'static str = "ConnectResponse";
}

impl Encode for ConnectResponse {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let body_len = self.fields_buffer_ber_length();
        ber::write_application_tag(dst, MCS_TYPE_CONNECT_RESPONSE, body_len as u16)?;
        ber::write_enumerated(dst, 0)?;
        ber::write_integer(dst, self.called_connect_id)?;
        self.domain_parameters.encode(dst)?;
        ber::write_octet_string(dst, &self.gcc_user_data)?;
        Ok(())
    }

    fn size(&self) -> usize {
        let body_len = self.fields_buffer_ber_length();
        body_len + ber::sizeof_application_tag(MCS_TYPE_CONNECT_RESPONSE, body_len as u16)
    }
}

impl<'de> Decode<'de> for ConnectResponse {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        ber::read_application_tag(src, MCS_TYPE_CONNECT_RESPONSE)?;
        ber::read_enumerated(src, RESULT_ENUM_LENGTH)?;
        let called_connect_id = ber::read_integer(src)? as u32;
        let domain_parameters = DomainParameters::decode(src)?;
        let gcc_user_data = ber::read_octet_string(src)?;

        Ok(Self {
            called_connect_id,
            domain_parameters,
            gcc_user_data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_parameters_target_matches_canonical_rdp_client_values() {
        let target = DomainParameters::target();
        assert_eq!(
            (
                target.max_channel_ids,
                target.max_user_ids,
                target.max_token_ids,
                target.num_priorities,
                target.min_throughput,
                target.max_height,
                target.max_mcs_pdu_size,
                target.protocol_version,
            ),
            (34, 2, 0, 1, 0, 1, 65535, 2)
        );
    }

    #[test]
    fn erect_domain_pdu_tolerates_truncated_body() {
        // Only the choice byte is present; subHeight/subInterval are missing.
        let buf = [DomainMcsPdu::ErectDomainRequest.to_choice()];
        let mut cur = ReadCursor::new(&buf);
        let pdu = ErectDomainPdu::decode(&mut cur).unwrap();
        assert_eq!(pdu.sub_height, 0);
        assert_eq!(pdu.sub_interval, 0);
    }

    #[test]
    fn channel_join_confirm_defaults_missing_channel_id_to_requested() {
        let mut buf = [0u8; 16];
        let written = {
            let mut dst = WriteCursor::new(&mut buf);
            write_mcspdu_header(&mut dst, DomainMcsPdu::ChannelJoinConfirm, 2);
            per::write_enum(&mut dst, 0);
            per::write_u16(&mut dst, 1002, USERCHANNEL_BASE).unwrap();
            per::write_u16(&mut dst, 1003, 0).unwrap();
            dst.pos()
        };

        let mut cur = ReadCursor::new(&buf[..written]);
        let confirm = ChannelJoinConfirm::decode(&mut cur).unwrap();
        assert_eq!(confirm.requested_channel_id, 1003);
        assert_eq!(confirm.channel_id, 1003);
    }

    #[test]
    fn channel_join_request_round_trips() {
        let request = ChannelJoinRequest {
            initiator_id: 1003,
            channel_id: 1004,
        };
        let mut buf = [0u8; 16];
        let written = {
            let mut dst = WriteCursor::new(&mut buf);
            request.encode(&mut dst).unwrap();
            dst.pos()
        };
        let mut cur = ReadCursor::new(&buf[..written]);
        assert_eq!(ChannelJoinRequest::decode(&mut cur).unwrap(), request);
    }

    #[test]
    fn disconnect_provider_ultimatum_decodes_bit_packed_reason() {
        // 0x21 = choice(8)<<2 | high bit of reason(3); 0x80 = low bit of reason in MSB
        let buf = [0x21, 0x80];
        let mut cur = ReadCursor::new(&buf);
        let pdu = DisconnectProviderUltimatum::decode(&mut cur).unwrap();
        assert_eq!(pdu.reason, DisconnectReason::UserRequested);
    }

    #[test]
    fn domain_parameters_downgrade_clamps_into_range() {
        let min = DomainParameters::min();
        let max = DomainParameters::max();
        let mut requested = DomainParameters::target();
        requested.max_channel_ids = 5; // below target's min of 1, above min's 1: stays as-is after clamp
        let downgraded = DomainParameters::downgrade(&requested, &min, &max);
        assert!(downgraded.max_channel_ids >= min.max_channel_ids);
        assert!(downgraded.max_channel_ids <= max.max_channel_ids);
    }
}
