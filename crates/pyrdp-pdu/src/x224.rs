//! X.224 connection-mode TPDUs: the TPDU header itself, the
//! Connection-Request/Connection-Confirm pair carrying the RDP Negotiation
//! block that picks the security protocol (RDP Standard Security, TLS,
//! CredSSP/Hybrid), and the Data TPDU that wraps every MCS PDU after the
//! connection is up.
//!
//! RDP uses only class-0 ("simple class") TPDUs, so `dst-ref`/`src-ref`/
//! `class` are always zero on the wire and are not modeled as fields here.

use crate::{ensure_fixed_part_size, ensure_size, invalid_field_err, Decode, Encode, Pdu, PduResult};
use pyrdp_core::{ReadCursor, WriteCursor};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TpduCode(u8);

impl TpduCode {
    pub const CONNECTION_REQUEST: Self = Self(0xE0);
    pub const CONNECTION_CONFIRM: Self = Self(0xD0);
    pub const DISCONNECT_REQUEST: Self = Self(0x80);
    pub const DATA: Self = Self(0xF0);
    pub const ERROR: Self = Self(0x70);

    pub fn header_fixed_part_size(self) -> usize {
        if self == Self::DATA {
            TpduHeader::DATA_FIXED_PART_SIZE
        } else {
            TpduHeader::NOT_DATA_FIXED_PART_SIZE
        }
    }
}

impl From<u8> for TpduCode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<TpduCode> for u8 {
    fn from(value: TpduCode) -> Self {
        value.0
    }
}

/// `LI + Code [+ DST-REF + SRC-REF + Class]` (the latter three are omitted
/// for Data TPDUs, which carry only an EOT byte instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TpduHeader {
    pub li: u8,
    pub code: TpduCode,
}

impl TpduHeader {
    pub const DATA_FIXED_PART_SIZE: usize = 3;
    pub const NOT_DATA_FIXED_PART_SIZE: usize = 7;
    const FIXED_PART_SIZE: usize = Self::DATA_FIXED_PART_SIZE;

    pub fn read(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        ensure_fixed_part_size!(in: src);

        let li = src.read_u8();
        let code = TpduCode::from(src.read_u8());

        if li == 0b1111_1111 {
            return Err(invalid_field_err!("TpduHeader", "li", "reserved extension value"));
        }

        if code == TpduCode::DATA {
            src.advance(1); // EOT
        } else {
            ensure_size!(ctx: "TpduHeader", in: src, size: 5);
            src.advance(5); // DST-REF, SRC-REF, class
        }

        Ok(Self { li, code })
    }

    pub fn write(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        const EOT_BYTE: u8 = 0x80;

        ensure_fixed_part_size!(in: dst);
        dst.write_u8(self.li);
        dst.write_u8(u8::from(self.code));

        if self.code == TpduCode::DATA {
            dst.write_u8(EOT_BYTE);
        } else {
            ensure_size!(ctx: "TpduHeader", in: dst, size: 5);
            dst.write_u16(0);
            dst.write_u16(0);
            dst.write_u8(0);
        }

        Ok(())
    }

    pub fn fixed_part_size(&self) -> usize {
        self.code.header_fixed_part_size()
    }

    /// Size of the whole TPDU header, LI field included.
    pub fn size(&self) -> usize {
        usize::from(self.li) + 1
    }
}

bitflags::bitflags! {
    /// `RDP_NEG_REQ`/`RDP_NEG_RSP` protocol bits ([MS-RDPBCGR] 2.2.1.1.1).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SecurityProtocol: u32 {
        const RDP = 0x0000_0000;
        const SSL = 0x0000_0001;
        const HYBRID = 0x0000_0002;
        const RDSTLS = 0x0000_0004;
        const HYBRID_EX = 0x0000_0008;
    }
}

const NEG_TYPE_REQUEST: u8 = 0x01;
const NEG_TYPE_RESPONSE: u8 = 0x02;
const NEG_TYPE_FAILURE: u8 = 0x03;
const NEG_BLOCK_LENGTH: u16 = 8;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NegotiationRequestFlags: u8 {
        const RESTRICTED_ADMIN_MODE_REQUIRED = 0x01;
        const REDIRECTED_AUTHENTICATION_MODE_REQUIRED = 0x02;
        const CORRELATION_INFO_PRESENT = 0x08;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiationRequest {
    pub flags: NegotiationRequestFlags,
    pub requested_protocols: SecurityProtocol,
}

impl NegotiationRequest {
    pub const SIZE: usize = 8;

    fn decode(src: &mut ReadCursor<'_>) -> PduResult<Self> {
        let flags = NegotiationRequestFlags::from_bits_truncate(src.read_u8());
        let length = src.read_u16();
        if length != NEG_BLOCK_LENGTH {
            return Err(invalid_field_err!("NegotiationRequest", "length", "must be 8"));
        }
        let requested_protocols = SecurityProtocol::from_bits_truncate(src.read_u32());
        Ok(Self { flags, requested_protocols })
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) {
        dst.write_u8(NEG_TYPE_REQUEST);
        dst.write_u8(self.flags.bits());
        dst.write_u16(NEG_BLOCK_LENGTH);
        dst.write_u32(self.requested_protocols.bits());
    }
}

/// `RDP_NEG_RSP` outcome: either the server picked a protocol, or it
/// refused the connection with a failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationResponse {
    Selected { flags: u8, protocol: SecurityProtocol },
    Failure { flags: u8, failure_code: u32 },
}

impl NegotiationResponse {
    pub const SIZE: usize = 8;

    fn decode(src: &mut ReadCursor<'_>, neg_type: u8) -> PduResult<Self> {
        let flags = src.read_u8();
        let length = src.read_u16();
        if length != NEG_BLOCK_LENGTH {
            return Err(invalid_field_err!("NegotiationResponse", "length", "must be 8"));
        }
        let value = src.read_u32();

        match neg_type {
            NEG_TYPE_RESPONSE => Ok(Self::Selected {
                flags,
                protocol: SecurityProtocol::from_bits_truncate(value),
            }),
            NEG_TYPE_FAILURE => Ok(Self::Failure { flags, failure_code: value }),
            _ => Err(invalid_field_err!("NegotiationResponse", "type", "unexpected negotiation message type")),
        }
    }

    fn encode(&self, dst: &mut WriteCursor<'_>) {
        match self {
            Self::Selected { flags, protocol } => {
                dst.write_u8(NEG_TYPE_RESPONSE);
                dst.write_u8(*flags);
                dst.write_u16(NEG_BLOCK_LENGTH);
                dst.write_u32(protocol.bits());
            }
            Self::Failure { flags, failure_code } => {
                dst.write_u8(NEG_TYPE_FAILURE);
                dst.write_u8(*flags);
                dst.write_u16(NEG_BLOCK_LENGTH);
                dst.write_u32(*failure_code);
            }
        }
    }
}

/// Connection-Request TPDU (client to server). `cookie` is the raw
/// `Cookie:`/routing-token line preceding the negotiation block, kept as
/// opaque bytes since this proxy relays it unmodified. A negotiation block
/// that fails to parse is treated as absent rather than as a hard error,
/// since plenty of legacy clients simply omit it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequest {
    pub cookie: Vec<u8>,
    pub negotiation_request: Option<NegotiationRequest>,
}

impl Pdu for ConnectionRequest {
    const NAME: &'static str = "X224ConnectionRequest";
}

impl ConnectionRequest {
    fn tpdu_user_data_size(&self) -> usize {
        self.cookie.len() + self.negotiation_request.map_or(0, |_| NegotiationRequest::SIZE)
    }
}

impl Encode for ConnectionRequest {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let user_data_size = self.tpdu_user_data_size();
        let header = TpduHeader {
            li: crate::cast_length!(Self::NAME, "li", TpduHeader::NOT_DATA_FIXED_PART_SIZE - 1)?,
            code: TpduCode::CONNECTION_REQUEST,
        };

        crate::tpkt::TpktHeader {
            packet_length: crate::cast_length!(Self::NAME, "packet_length", self.size())?,
        }
        .encode(dst)?;
        header.write(dst)?;

        ensure_size!(ctx: Self::NAME, in: dst, size: user_data_size);
        dst.write_slice(&self.cookie);
        if let Some(neg) = &self.negotiation_request {
            neg.encode(dst);
        }

        Ok(())
    }

    fn size(&self) -> usize {
        crate::tpkt::TpktHeader::SIZE + TpduHeader::NOT_DATA_FIXED_PART_SIZE + self.tpdu_user_data_size()
    }
}

impl<'de> Decode<'de> for ConnectionRequest {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let tpkt = crate::tpkt::TpktHeader::decode(src)?;
        let tpdu = TpduHeader::read(src)?;
        if tpdu.code != TpduCode::CONNECTION_REQUEST {
            return Err(invalid_field_err!(Self::NAME, "code", "expected connection request TPDU"));
        }

        let user_data_size = tpkt.packet_length().saturating_sub(crate::tpkt::TpktHeader::SIZE + tpdu.size());
        ensure_size!(ctx: Self::NAME, in: src, size: user_data_size);
        let user_data = src.read_slice(user_data_size);

        let (cookie, negotiation_request) = split_trailing_negotiation_request(user_data);

        Ok(Self {
            cookie: cookie.to_vec(),
            negotiation_request,
        })
    }
}

fn split_trailing_negotiation_request(user_data: &[u8]) -> (&[u8], Option<NegotiationRequest>) {
    if user_data.len() < NegotiationRequest::SIZE {
        return (user_data, None);
    }

    let split_at = user_data.len() - NegotiationRequest::SIZE;
    let (cookie, tail) = user_data.split_at(split_at);
    if tail[0] != NEG_TYPE_REQUEST {
        return (user_data, None);
    }

    let mut cur = ReadCursor::new(tail);
    cur.advance(1);
    match NegotiationRequest::decode(&mut cur) {
        Ok(req) => (cookie, Some(req)),
        Err(_) => (user_data, None),
    }
}

/// Connection-Confirm TPDU (server to client).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfirm {
    pub negotiation_response: Option<NegotiationResponse>,
}

impl Pdu for ConnectionConfirm {
    const NAME: &'static str = "X224ConnectionConfirm";
}

impl ConnectionConfirm {
    fn tpdu_user_data_size(&self) -> usize {
        self.negotiation_response.map_or(0, |_| NegotiationResponse::SIZE)
    }
}

impl Encode for ConnectionConfirm {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        let header = TpduHeader {
            li: crate::cast_length!(Self::NAME, "li", TpduHeader::NOT_DATA_FIXED_PART_SIZE - 1)?,
            code: TpduCode::CONNECTION_CONFIRM,
        };

        crate::tpkt::TpktHeader {
            packet_length: crate::cast_length!(Self::NAME, "packet_length", self.size())?,
        }
        .encode(dst)?;
        header.write(dst)?;

        if let Some(resp) = &self.negotiation_response {
            ensure_size!(ctx: Self::NAME, in: dst, size: NegotiationResponse::SIZE);
            resp.encode(dst);
        }

        Ok(())
    }

    fn size(&self) -> usize {
        crate::tpkt::TpktHeader::SIZE + TpduHeader::NOT_DATA_FIXED_PART_SIZE + self.tpdu_user_data_size()
    }
}

impl<'de> Decode<'de> for ConnectionConfirm {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let tpkt = crate::tpkt::TpktHeader::decode(src)?;
        let tpdu = TpduHeader::read(src)?;
        if tpdu.code != TpduCode::CONNECTION_CONFIRM {
            return Err(invalid_field_err!(Self::NAME, "code", "expected connection confirm TPDU"));
        }

        let user_data_size = tpkt.packet_length().saturating_sub(crate::tpkt::TpktHeader::SIZE + tpdu.size());
        ensure_size!(ctx: Self::NAME, in: src, size: user_data_size);
        let user_data = src.read_slice(user_data_size);

        let negotiation_response = if user_data.len() >= NegotiationResponse::SIZE {
            let mut cur = ReadCursor::new(user_data);
            let neg_type = cur.read_u8();
            NegotiationResponse::decode(&mut cur, neg_type).ok()
        } else {
            None
        };

        Ok(Self { negotiation_response })
    }
}

/// Data TPDU: the thin X.224 envelope around every MCS PDU exchanged once
/// the connection is established.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct X224Data {
    pub data: Vec<u8>,
}

impl Pdu for X224Data {
    const NAME: &'static str = "X224Data";
}

impl Encode for X224Data {
    fn encode(&self, dst: &mut WriteCursor<'_>) -> PduResult<()> {
        crate::tpkt::TpktHeader {
            packet_length: crate::cast_length!(Self::NAME, "packet_length", self.size())?,
        }
        .encode(dst)?;

        TpduHeader {
            li: crate::cast_length!(Self::NAME, "li", TpduHeader::DATA_FIXED_PART_SIZE - 1)?,
            code: TpduCode::DATA,
        }
        .write(dst)?;

        ensure_size!(ctx: Self::NAME, in: dst, size: self.data.len());
        dst.write_slice(&self.data);

        Ok(())
    }

    fn size(&self) -> usize {
        crate::tpkt::TpktHeader::SIZE + TpduHeader::DATA_FIXED_PART_SIZE + self.data.len()
    }
}

impl<'de> Decode<'de> for X224Data {
    fn decode(src: &mut ReadCursor<'de>) -> PduResult<Self> {
        let tpkt = crate::tpkt::TpktHeader::decode(src)?;
        let tpdu = TpduHeader::read(src)?;
        if tpdu.code != TpduCode::DATA {
            return Err(invalid_field_err!(Self::NAME, "code", "expected data TPDU"));
        }

        let user_data_size = tpkt.packet_length().saturating_sub(crate::tpkt::TpktHeader::SIZE + tpdu.size());
        ensure_size!(ctx: Self::NAME, in: src, size: user_data_size);
        Ok(Self {
            data: src.read_slice(user_data_size).to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_request_round_trips_with_negotiation() {
        let req = ConnectionRequest {
            cookie: b"Cookie: mstshash=user\r\n".to_vec(),
            negotiation_request: Some(NegotiationRequest {
                flags: NegotiationRequestFlags::empty(),
                requested_protocols: SecurityProtocol::SSL | SecurityProtocol::HYBRID,
            }),
        };

        let mut buf = vec![0u8; req.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            req.encode(&mut dst).unwrap();
        }

        let mut src = ReadCursor::new(&buf);
        let decoded = ConnectionRequest::decode(&mut src).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn connection_request_without_negotiation_keeps_cookie_intact() {
        let req = ConnectionRequest {
            cookie: b"short".to_vec(),
            negotiation_request: None,
        };

        let mut buf = vec![0u8; req.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            req.encode(&mut dst).unwrap();
        }

        let mut src = ReadCursor::new(&buf);
        let decoded = ConnectionRequest::decode(&mut src).unwrap();
        assert_eq!(decoded.cookie, b"short");
        assert!(decoded.negotiation_request.is_none());
    }

    #[test]
    fn connection_confirm_round_trips_with_selected_protocol() {
        let confirm = ConnectionConfirm {
            negotiation_response: Some(NegotiationResponse::Selected {
                flags: 0,
                protocol: SecurityProtocol::HYBRID,
            }),
        };

        let mut buf = vec![0u8; confirm.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            confirm.encode(&mut dst).unwrap();
        }

        let mut src = ReadCursor::new(&buf);
        assert_eq!(ConnectionConfirm::decode(&mut src).unwrap(), confirm);
    }

    #[test]
    fn data_tpdu_round_trips() {
        let pdu = X224Data { data: vec![1, 2, 3, 4] };
        let mut buf = vec![0u8; pdu.size()];
        {
            let mut dst = WriteCursor::new(&mut buf);
            pdu.encode(&mut dst).unwrap();
        }
        let mut src = ReadCursor::new(&buf);
        assert_eq!(X224Data::decode(&mut src).unwrap(), pdu);
    }
}
